use chrono::{DateTime, Utc};
use serde::Serialize;
use validator::ValidateEmail;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub profile_image_url: Option<String>,
    pub date_joined: DateTime<Utc>,
}

impl User {
    /// Letter shown in place of a missing profile image.
    pub fn display_initial(&self) -> String {
        display_initial(&self.first_name, self.nickname.as_deref(), &self.username)
    }

    pub fn detail(&self) -> UserDetail {
        UserDetail {
            pk: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            nickname: self.nickname.clone(),
            profile_image_url: self.profile_image_url.clone(),
            display_initial: self.display_initial(),
        }
    }
}

pub fn display_initial(first_name: &str, nickname: Option<&str>, username: &str) -> String {
    [Some(first_name), nickname, Some(username)]
        .into_iter()
        .flatten()
        .find_map(|s| s.trim().chars().next())
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDetail {
    pub pk: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub profile_image_url: Option<String>,
    pub display_initial: String,
}

/// Compact author block embedded in posts and comments.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Author {
    pub pk: i64,
    pub nickname: Option<String>,
    pub profile_image_url: Option<String>,
    pub display_initial: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub nickname: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// RFC 5322-ish check from `validator`, plus a dotted domain.
pub fn is_plausible_email(email: &str) -> bool {
    email.validate_email()
        && email
            .rsplit_once('@')
            .is_some_and(|(_, domain)| domain.contains('.'))
}
