use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use didim_core::auth::password::{check_password_strength, hash_password, verify_password};
use didim_core::auth::TokenPair;
use didim_core::domain::user::{
    is_plausible_email, normalize_email, NewUser, User, UserDetail, UserPatch,
};
use didim_core::naver::NaverLoginError;
use didim_core::storage::users::{self, UserConflict, UserWrite};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{self, AuthUser, REFRESH_COOKIE};
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;

const NAVER_PROVIDER: &str = "naver";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts/signup/", post(signup))
        .route("/accounts/login/", post(login))
        .route("/accounts/logout/", post(logout))
        .route("/accounts/token/refresh/", post(refresh))
        .route("/accounts/user/", get(current_user).patch(update_current_user))
        .route("/accounts/naver/callback/", post(naver_callback))
}

#[derive(Debug, Serialize)]
struct AuthResponse<U> {
    access: String,
    refresh: String,
    user: U,
}

#[derive(Debug, Deserialize)]
struct SignupRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password1: String,
    #[serde(default)]
    password2: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    nickname: Option<String>,
}

fn conflict_message(conflict: UserConflict) -> &'static str {
    match conflict {
        UserConflict::Email | UserConflict::Username => "이미 사용 중인 이메일입니다.",
        UserConflict::Nickname => "이미 사용 중인 닉네임입니다.",
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn signed_in(
    state: &AppState,
    status: StatusCode,
    pair: TokenPair,
    user: impl Serialize,
) -> impl IntoResponse {
    let cookies = auth::token_cookies(state, &pair);
    (
        status,
        cookies,
        Json(AuthResponse {
            access: pair.access,
            refresh: pair.refresh,
            user,
        }),
    )
}

async fn signup(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);
    if !is_plausible_email(&email) {
        return Err(ApiError::bad_request("유효한 이메일 주소를 입력하세요."));
    }
    if req.password1 != req.password2 {
        return Err(ApiError::bad_request("비밀번호가 일치하지 않습니다."));
    }
    check_password_strength(&req.password1).map_err(ApiError::BadRequest)?;
    let nickname = blank_to_none(req.nickname);

    let pool = state.db()?;
    if users::find_by_email(pool, &email).await?.is_some() {
        return Err(ApiError::bad_request(conflict_message(UserConflict::Email)));
    }
    if let Some(nickname) = &nickname {
        if users::nickname_taken(pool, nickname, None).await? {
            return Err(ApiError::bad_request(conflict_message(UserConflict::Nickname)));
        }
    }

    let new_user = NewUser {
        username: email.clone(),
        email,
        password_hash: Some(hash_password(&req.password1)?),
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        nickname,
    };
    let user = match users::create_user(pool, &new_user).await? {
        UserWrite::Saved(user) => user,
        UserWrite::Conflict(conflict) => {
            return Err(ApiError::bad_request(conflict_message(conflict)))
        }
    };
    tracing::info!(user_id = user.id, "user signed up");

    let pair = state.jwt.issue_token_pair(user.id)?;
    Ok(signed_in(&state, StatusCode::CREATED, pair, user.detail()))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    const BAD_CREDENTIALS: &str = "이메일 또는 비밀번호가 올바르지 않습니다.";

    let pool = state.db()?;
    let email = normalize_email(&req.email);
    let user = users::find_by_email(pool, &email)
        .await?
        .ok_or_else(|| ApiError::bad_request(BAD_CREDENTIALS))?;
    let matches = user
        .password_hash
        .as_deref()
        .is_some_and(|hash| verify_password(&req.password, hash));
    if !matches {
        return Err(ApiError::bad_request(BAD_CREDENTIALS));
    }

    let pair = state.jwt.issue_token_pair(user.id)?;
    Ok(signed_in(&state, StatusCode::OK, pair, user.detail()))
}

async fn logout() -> impl IntoResponse {
    (
        auth::cleared_cookies(),
        Json(json!({ "message": "로그아웃되었습니다." })),
    )
}

#[derive(Debug, Default, Deserialize)]
struct RefreshRequest {
    #[serde(default)]
    refresh: Option<String>,
}

async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let from_body = body.and_then(|Json(req)| blank_to_none(req.refresh));
    let token = from_body
        .or_else(|| auth::cookie_value(&headers, REFRESH_COOKIE).map(str::to_string))
        .ok_or_else(|| ApiError::Unauthorized("refresh 토큰이 필요합니다.".into()))?;

    let claims = state
        .jwt
        .decode_refresh(&token)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
    let access = state
        .jwt
        .issue(claims.sub, didim_core::auth::TokenKind::Access)?;
    Ok((auth::access_cookie(&state, &access), Json(json!({ "access": access }))))
}

async fn load_user(state: &AppState, user_id: i64) -> Result<User, ApiError> {
    users::find_by_id(state.db()?, user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("사용자를 찾을 수 없습니다.".into()))
}

async fn current_user(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserDetail>, ApiError> {
    Ok(Json(load_user(&state, user.user_id).await?.detail()))
}

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    profile_image_url: Option<String>,
}

async fn update_current_user(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserDetail>, ApiError> {
    let pool = state.db()?;
    let nickname = match req.nickname {
        Some(raw) => {
            let nickname = raw.trim().to_string();
            if nickname.is_empty() {
                return Err(ApiError::bad_request("닉네임을 입력하세요."));
            }
            if users::nickname_taken(pool, &nickname, Some(user.user_id)).await? {
                return Err(ApiError::bad_request(conflict_message(UserConflict::Nickname)));
            }
            Some(nickname)
        }
        None => None,
    };

    let patch = UserPatch {
        nickname,
        first_name: req.first_name.map(|v| v.trim().to_string()),
        last_name: req.last_name.map(|v| v.trim().to_string()),
        profile_image_url: req.profile_image_url.map(|v| v.trim().to_string()),
    };
    match users::update_user(pool, user.user_id, &patch).await? {
        UserWrite::Saved(updated) => Ok(Json(updated.detail())),
        UserWrite::Conflict(conflict) => Err(ApiError::bad_request(conflict_message(conflict))),
    }
}

#[derive(Debug, Deserialize)]
struct NaverCallbackRequest {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Serialize)]
struct SocialUser {
    pk: i64,
    email: String,
    first_name: String,
    last_name: String,
}

fn naver_error(err: anyhow::Error) -> ApiError {
    match err.downcast_ref::<NaverLoginError>() {
        Some(login_err) => ApiError::BadRequest(login_err.to_string()),
        None => ApiError::from(err),
    }
}

async fn naver_callback(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NaverCallbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let code = blank_to_none(req.code).ok_or_else(|| ApiError::bad_request("code가 필요합니다."))?;
    let naver = state.naver()?;
    let pool = state.db()?;

    let token = naver
        .exchange_code(&code, req.state.as_deref())
        .await
        .map_err(naver_error)?;
    let profile = naver.fetch_profile(&token).await.map_err(naver_error)?;
    let user = users::resolve_social_user(pool, NAVER_PROVIDER, &profile).await?;

    let pair = state.jwt.issue_token_pair(user.id)?;
    let social = SocialUser {
        pk: user.id,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
    };
    Ok(signed_in(&state, StatusCode::OK, pair, social))
}
