use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName};
use axum::response::AppendHeaders;
use didim_core::auth::TokenPair;

use crate::error::ApiError;
use crate::state::AppState;

pub const ACCESS_COOKIE: &str = "didim-auth";
pub const REFRESH_COOKIE: &str = "didim-refresh";

/// Authenticated caller, from the access cookie or a Bearer header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
}

/// Caller identity when present; invalid tokens count as anonymous.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuthUser(pub Option<i64>);

pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = cookie_value(&parts.headers, ACCESS_COOKIE)
            .or_else(|| bearer_token(&parts.headers))
            .ok_or_else(|| ApiError::Unauthorized("인증 정보가 제공되지 않았습니다.".into()))?;
        let claims = state
            .jwt
            .decode_access(token)
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
        Ok(AuthUser { user_id: claims.sub })
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match AuthUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeAuthUser(Some(user.user_id))),
            Err(_) => Ok(MaybeAuthUser(None)),
        }
    }
}

fn cookie(name: &str, value: &str, max_age_secs: i64) -> String {
    format!("{name}={value}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age_secs}")
}

pub type CookieHeaders = AppendHeaders<[(HeaderName, String); 2]>;

pub fn token_cookies(state: &AppState, pair: &TokenPair) -> CookieHeaders {
    AppendHeaders([
        (
            SET_COOKIE,
            cookie(ACCESS_COOKIE, &pair.access, state.jwt.access_ttl().num_seconds()),
        ),
        (
            SET_COOKIE,
            cookie(REFRESH_COOKIE, &pair.refresh, state.jwt.refresh_ttl().num_seconds()),
        ),
    ])
}

pub fn access_cookie(state: &AppState, access: &str) -> AppendHeaders<[(HeaderName, String); 1]> {
    AppendHeaders([(
        SET_COOKIE,
        cookie(ACCESS_COOKIE, access, state.jwt.access_ttl().num_seconds()),
    )])
}

pub fn cleared_cookies() -> CookieHeaders {
    AppendHeaders([
        (SET_COOKIE, cookie(ACCESS_COOKIE, "", 0)),
        (SET_COOKIE, cookie(REFRESH_COOKIE, "", 0)),
    ])
}
