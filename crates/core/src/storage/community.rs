use crate::domain::community::{CommentRow, LikeState, PostRow};
use anyhow::Context;
use sqlx::PgPool;

// $1 is the viewer (nullable) for is_liked.
const POST_SELECT: &str = "SELECT p.id, p.author_id, u.username AS author_username, \
       u.first_name AS author_first_name, u.nickname AS author_nickname, \
       u.profile_image_url AS author_profile_image_url, p.content, p.created_at, p.updated_at, \
       (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) AS like_count, \
       (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count, \
       EXISTS (SELECT 1 FROM post_likes l WHERE l.post_id = p.id AND l.user_id = $1) AS is_liked \
     FROM posts p JOIN users u ON u.id = p.author_id";

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.author_id, u.username AS author_username, \
       u.first_name AS author_first_name, u.nickname AS author_nickname, \
       u.profile_image_url AS author_profile_image_url, c.content, c.created_at, c.updated_at \
     FROM comments c JOIN users u ON u.id = c.author_id";

/// Newest first.
pub async fn list_posts(pool: &PgPool, viewer: Option<i64>) -> anyhow::Result<Vec<PostRow>> {
    sqlx::query_as::<_, PostRow>(&format!(
        "{POST_SELECT} ORDER BY p.created_at DESC, p.id DESC"
    ))
    .bind(viewer)
    .fetch_all(pool)
    .await
    .context("select posts failed")
}

pub async fn find_post(
    pool: &PgPool,
    post_id: i64,
    viewer: Option<i64>,
) -> anyhow::Result<Option<PostRow>> {
    sqlx::query_as::<_, PostRow>(&format!("{POST_SELECT} WHERE p.id = $2"))
        .bind(viewer)
        .bind(post_id)
        .fetch_optional(pool)
        .await
        .context("select post failed")
}

pub async fn post_author(pool: &PgPool, post_id: i64) -> anyhow::Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT author_id FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(pool)
        .await
        .context("select post author failed")?;
    Ok(row.map(|(id,)| id))
}

pub async fn create_post(pool: &PgPool, author_id: i64, content: &str) -> anyhow::Result<PostRow> {
    let (id,): (i64,) =
        sqlx::query_as("INSERT INTO posts (author_id, content) VALUES ($1, $2) RETURNING id")
            .bind(author_id)
            .bind(content)
            .fetch_one(pool)
            .await
            .context("insert post failed")?;
    find_post(pool, id, Some(author_id))
        .await?
        .context("post vanished after insert")
}

pub async fn update_post(pool: &PgPool, post_id: i64, content: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE posts SET content = $2, updated_at = now() WHERE id = $1")
        .bind(post_id)
        .bind(content)
        .execute(pool)
        .await
        .context("update post failed")?;
    Ok(())
}

pub async fn delete_post(pool: &PgPool, post_id: i64) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(post_id)
        .execute(pool)
        .await
        .context("delete post failed")?;
    Ok(())
}

/// Adds the like when absent, removes it when present. `None` when the post is gone.
pub async fn toggle_like(
    pool: &PgPool,
    post_id: i64,
    user_id: i64,
) -> anyhow::Result<Option<LikeState>> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let post: Option<(i64,)> = sqlx::query_as("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await
        .context("lock post failed")?;
    if post.is_none() {
        return Ok(None);
    }

    let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("delete post_likes failed")?
        .rows_affected();
    if removed == 0 {
        sqlx::query("INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2)")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("insert post_likes failed")?;
    }

    let (like_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM post_likes WHERE post_id = $1")
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await
        .context("count post_likes failed")?;

    tx.commit().await.context("commit transaction failed")?;
    Ok(Some(LikeState {
        is_liked: removed == 0,
        like_count,
    }))
}

/// Oldest first.
pub async fn list_comments(pool: &PgPool, post_id: i64) -> anyhow::Result<Vec<CommentRow>> {
    sqlx::query_as::<_, CommentRow>(&format!(
        "{COMMENT_SELECT} WHERE c.post_id = $1 ORDER BY c.created_at, c.id"
    ))
    .bind(post_id)
    .fetch_all(pool)
    .await
    .context("select comments failed")
}

pub async fn find_comment(
    pool: &PgPool,
    post_id: i64,
    comment_id: i64,
) -> anyhow::Result<Option<CommentRow>> {
    sqlx::query_as::<_, CommentRow>(&format!(
        "{COMMENT_SELECT} WHERE c.post_id = $1 AND c.id = $2"
    ))
    .bind(post_id)
    .bind(comment_id)
    .fetch_optional(pool)
    .await
    .context("select comment failed")
}

pub async fn create_comment(
    pool: &PgPool,
    post_id: i64,
    author_id: i64,
    content: &str,
) -> anyhow::Result<CommentRow> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO comments (post_id, author_id, content) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(post_id)
    .bind(author_id)
    .bind(content)
    .fetch_one(pool)
    .await
    .context("insert comment failed")?;
    find_comment(pool, post_id, id)
        .await?
        .context("comment vanished after insert")
}

pub async fn update_comment(pool: &PgPool, comment_id: i64, content: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE comments SET content = $2, updated_at = now() WHERE id = $1")
        .bind(comment_id)
        .bind(content)
        .execute(pool)
        .await
        .context("update comment failed")?;
    Ok(())
}

pub async fn delete_comment(pool: &PgPool, comment_id: i64) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment_id)
        .execute(pool)
        .await
        .context("delete comment failed")?;
    Ok(())
}
