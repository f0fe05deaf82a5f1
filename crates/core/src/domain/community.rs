use crate::domain::user::{display_initial, Author};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Post joined with its author and aggregate counts.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub author_first_name: String,
    pub author_nickname: Option<String>,
    pub author_profile_image_url: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub like_count: i64,
    pub comment_count: i64,
    pub is_liked: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub author_first_name: String,
    pub author_nickname: Option<String>,
    pub author_profile_image_url: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub id: i64,
    pub author: Author,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub like_count: i64,
    pub comment_count: i64,
    pub is_liked: bool,
    pub is_owner: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDetailView {
    #[serde(flatten)]
    pub post: PostView,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: i64,
    pub author: Author,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_owner: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeState {
    pub is_liked: bool,
    pub like_count: i64,
}

fn author(
    pk: i64,
    username: &str,
    first_name: &str,
    nickname: Option<String>,
    profile_image_url: Option<String>,
) -> Author {
    Author {
        pk,
        display_initial: display_initial(first_name, nickname.as_deref(), username),
        nickname,
        profile_image_url,
    }
}

impl PostRow {
    pub fn into_view(self, viewer: Option<i64>) -> PostView {
        PostView {
            id: self.id,
            is_owner: viewer == Some(self.author_id),
            author: author(
                self.author_id,
                &self.author_username,
                &self.author_first_name,
                self.author_nickname,
                self.author_profile_image_url,
            ),
            content: self.content,
            created_at: self.created_at,
            updated_at: self.updated_at,
            like_count: self.like_count,
            comment_count: self.comment_count,
            is_liked: self.is_liked,
        }
    }
}

impl CommentRow {
    pub fn into_view(self, viewer: Option<i64>) -> CommentView {
        CommentView {
            id: self.id,
            is_owner: viewer == Some(self.author_id),
            author: author(
                self.author_id,
                &self.author_username,
                &self.author_first_name,
                self.author_nickname,
                self.author_profile_image_url,
            ),
            content: self.content,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
