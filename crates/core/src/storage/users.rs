use crate::domain::user::{NewUser, User, UserPatch};
use crate::naver::NaverProfile;
use anyhow::Context;
use sqlx::PgPool;

use super::unique_violation;

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, nickname, \
                            profile_image_url, date_joined";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserConflict {
    Email,
    Nickname,
    Username,
}

impl UserConflict {
    fn from_constraint(name: &str) -> Self {
        match name {
            "users_nickname_key" => UserConflict::Nickname,
            "users_username_key" => UserConflict::Username,
            _ => UserConflict::Email,
        }
    }
}

#[derive(Debug)]
pub enum UserWrite {
    Saved(User),
    Conflict(UserConflict),
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> anyhow::Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("select user by id failed")
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email <> '' AND lower(email) = lower($1)"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("select user by email failed")
}

pub async fn nickname_taken(
    pool: &PgPool,
    nickname: &str,
    except_user: Option<i64>,
) -> anyhow::Result<bool> {
    let (taken,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM users \
         WHERE nickname = $1 AND ($2::BIGINT IS NULL OR id <> $2))",
    )
    .bind(nickname)
    .bind(except_user)
    .fetch_one(pool)
    .await
    .context("nickname lookup failed")?;
    Ok(taken)
}

pub async fn create_user(pool: &PgPool, new_user: &NewUser) -> anyhow::Result<UserWrite> {
    let res = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, email, password_hash, first_name, last_name, nickname) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
    ))
    .bind(&new_user.username)
    .bind(&new_user.email)
    .bind(&new_user.password_hash)
    .bind(&new_user.first_name)
    .bind(&new_user.last_name)
    .bind(&new_user.nickname)
    .fetch_one(pool)
    .await;

    match res {
        Ok(user) => Ok(UserWrite::Saved(user)),
        Err(err) => match unique_violation(&err) {
            Some(constraint) => Ok(UserWrite::Conflict(UserConflict::from_constraint(&constraint))),
            None => Err(err).context("insert user failed"),
        },
    }
}

/// Applies the provided fields; `None` leaves a column unchanged.
pub async fn update_user(pool: &PgPool, id: i64, patch: &UserPatch) -> anyhow::Result<UserWrite> {
    let res = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET \
           nickname = COALESCE($2, nickname), \
           first_name = COALESCE($3, first_name), \
           last_name = COALESCE($4, last_name), \
           profile_image_url = COALESCE($5, profile_image_url) \
         WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(&patch.nickname)
    .bind(&patch.first_name)
    .bind(&patch.last_name)
    .bind(&patch.profile_image_url)
    .fetch_one(pool)
    .await;

    match res {
        Ok(user) => Ok(UserWrite::Saved(user)),
        Err(err) => match unique_violation(&err) {
            Some(constraint) => Ok(UserWrite::Conflict(UserConflict::from_constraint(&constraint))),
            None => Err(err).context("update user failed"),
        },
    }
}

/// Resolves the local user for a social login: linked account first, then a
/// user with the same email (which gets linked), then a new `{provider}_{uid}` user.
pub async fn resolve_social_user(
    pool: &PgPool,
    provider: &str,
    profile: &NaverProfile,
) -> anyhow::Result<User> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let linked = sqlx::query_as::<_, User>(
        "SELECT u.id, u.username, u.email, u.password_hash, u.first_name, u.last_name, u.nickname, \
                u.profile_image_url, u.date_joined \
         FROM users u JOIN social_accounts s ON s.user_id = u.id \
         WHERE s.provider = $1 AND s.uid = $2",
    )
    .bind(provider)
    .bind(&profile.id)
    .fetch_optional(&mut *tx)
    .await
    .context("select social account failed")?;
    if let Some(user) = linked {
        tx.commit().await.context("commit transaction failed")?;
        return Ok(user);
    }

    let email = profile.email.as_deref().map(str::trim).unwrap_or("");
    let by_email = if email.is_empty() {
        None
    } else {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email <> '' AND lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&mut *tx)
        .await
        .context("select user by email failed")?
    };

    let user = match by_email {
        Some(user) => user,
        None => sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, first_name) VALUES ($1, $2, $3) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(format!("{provider}_{}", profile.id))
        .bind(email.to_lowercase())
        .bind(profile.name.as_deref().unwrap_or(""))
        .fetch_one(&mut *tx)
        .await
        .context("insert social user failed")?,
    };

    let extra = serde_json::to_value(profile).context("serialize social profile failed")?;
    sqlx::query(
        "INSERT INTO social_accounts (user_id, provider, uid, extra_data) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (provider, uid) DO NOTHING",
    )
    .bind(user.id)
    .bind(provider)
    .bind(&profile.id)
    .bind(extra)
    .execute(&mut *tx)
    .await
    .context("insert social account failed")?;

    tx.commit().await.context("commit transaction failed")?;
    tracing::info!(user_id = user.id, provider, "linked social account");
    Ok(user)
}
