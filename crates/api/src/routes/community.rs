use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use didim_core::domain::community::{CommentView, LikeState, PostDetailView, PostView};
use didim_core::storage::community;
use serde::Deserialize;
use sqlx::PgPool;

use crate::auth::{AuthUser, MaybeAuthUser};
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;

const POST_NOT_FOUND: &str = "게시글을 찾을 수 없습니다.";
const COMMENT_NOT_FOUND: &str = "댓글을 찾을 수 없습니다.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/community/posts/", get(list_posts).post(create_post))
        .route(
            "/api/community/posts/:id/",
            get(post_detail).patch(update_post).delete(delete_post),
        )
        .route("/api/community/posts/:id/like/", post(toggle_like))
        .route(
            "/api/community/posts/:id/comments/",
            get(list_comments).post(create_comment),
        )
        .route(
            "/api/community/posts/:id/comments/:comment_id/",
            patch(update_comment).delete(delete_comment),
        )
}

#[derive(Debug, Deserialize)]
struct ContentRequest {
    #[serde(default)]
    content: String,
}

impl ContentRequest {
    fn content(&self) -> Result<&str, ApiError> {
        let content = self.content.trim();
        if content.is_empty() {
            return Err(ApiError::bad_request("내용을 입력하세요."));
        }
        Ok(content)
    }
}

async fn detail_view(
    pool: &PgPool,
    post_id: i64,
    viewer: Option<i64>,
) -> Result<PostDetailView, ApiError> {
    let post = community::find_post(pool, post_id, viewer)
        .await?
        .ok_or_else(|| ApiError::not_found(POST_NOT_FOUND))?;
    let comments = community::list_comments(pool, post_id)
        .await?
        .into_iter()
        .map(|c| c.into_view(viewer))
        .collect();
    Ok(PostDetailView {
        post: post.into_view(viewer),
        comments,
    })
}

/// 404 when the post is gone, 403 when `user_id` did not write it.
async fn ensure_post_owner(
    pool: &PgPool,
    post_id: i64,
    user_id: i64,
    action: &str,
) -> Result<(), ApiError> {
    match community::post_author(pool, post_id).await? {
        None => Err(ApiError::not_found(POST_NOT_FOUND)),
        Some(author) if author != user_id => Err(ApiError::forbidden(format!(
            "본인이 작성한 글만 {action}할 수 있습니다."
        ))),
        Some(_) => Ok(()),
    }
}

async fn list_posts(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
) -> Result<Json<Vec<PostView>>, ApiError> {
    let posts = community::list_posts(state.db()?, viewer.0).await?;
    Ok(Json(posts.into_iter().map(|p| p.into_view(viewer.0)).collect()))
}

async fn create_post(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<ContentRequest>,
) -> Result<(StatusCode, Json<PostView>), ApiError> {
    let content = req.content()?;
    let post = community::create_post(state.db()?, user.user_id, content).await?;
    tracing::info!(post_id = post.id, author_id = user.user_id, "post created");
    Ok((StatusCode::CREATED, Json(post.into_view(Some(user.user_id)))))
}

async fn post_detail(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(id): Path<i64>,
) -> Result<Json<PostDetailView>, ApiError> {
    Ok(Json(detail_view(state.db()?, id, viewer.0).await?))
}

async fn update_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<ContentRequest>,
) -> Result<Json<PostDetailView>, ApiError> {
    let pool = state.db()?;
    ensure_post_owner(pool, id, user.user_id, "수정").await?;
    community::update_post(pool, id, req.content()?).await?;
    Ok(Json(detail_view(pool, id, Some(user.user_id)).await?))
}

async fn delete_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let pool = state.db()?;
    ensure_post_owner(pool, id, user.user_id, "삭제").await?;
    community::delete_post(pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_like(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<LikeState>, ApiError> {
    community::toggle_like(state.db()?, id, user.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(POST_NOT_FOUND))
}

async fn list_comments(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<Vec<CommentView>>, ApiError> {
    let pool = state.db()?;
    if community::post_author(pool, post_id).await?.is_none() {
        return Err(ApiError::not_found(POST_NOT_FOUND));
    }
    let comments = community::list_comments(pool, post_id).await?;
    Ok(Json(comments.into_iter().map(|c| c.into_view(viewer.0)).collect()))
}

async fn create_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<i64>,
    ApiJson(req): ApiJson<ContentRequest>,
) -> Result<(StatusCode, Json<CommentView>), ApiError> {
    let content = req.content()?;
    let pool = state.db()?;
    if community::post_author(pool, post_id).await?.is_none() {
        return Err(ApiError::not_found(POST_NOT_FOUND));
    }
    let comment = community::create_comment(pool, post_id, user.user_id, content).await?;
    Ok((StatusCode::CREATED, Json(comment.into_view(Some(user.user_id)))))
}

async fn owned_comment(
    pool: &PgPool,
    post_id: i64,
    comment_id: i64,
    user_id: i64,
    action: &str,
) -> Result<(), ApiError> {
    let comment = community::find_comment(pool, post_id, comment_id)
        .await?
        .ok_or_else(|| ApiError::not_found(COMMENT_NOT_FOUND))?;
    if comment.author_id != user_id {
        return Err(ApiError::forbidden(format!(
            "본인이 작성한 댓글만 {action}할 수 있습니다."
        )));
    }
    Ok(())
}

async fn update_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path((post_id, comment_id)): Path<(i64, i64)>,
    ApiJson(req): ApiJson<ContentRequest>,
) -> Result<Json<CommentView>, ApiError> {
    let pool = state.db()?;
    owned_comment(pool, post_id, comment_id, user.user_id, "수정").await?;
    community::update_comment(pool, comment_id, req.content()?).await?;
    let comment = community::find_comment(pool, post_id, comment_id)
        .await?
        .ok_or_else(|| ApiError::not_found(COMMENT_NOT_FOUND))?;
    Ok(Json(comment.into_view(Some(user.user_id))))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let pool = state.db()?;
    owned_comment(pool, post_id, comment_id, user.user_id, "삭제").await?;
    community::delete_comment(pool, comment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
