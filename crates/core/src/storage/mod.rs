use anyhow::Context;

pub mod ai;
pub mod community;
pub mod finance;
pub mod lock;
pub mod stocks;
pub mod subscriptions;
pub mod users;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Rows per multi-VALUES statement; override with UPSERT_BATCH_SIZE.
pub(crate) fn upsert_chunk_size() -> anyhow::Result<usize> {
    let size = std::env::var("UPSERT_BATCH_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(200);
    anyhow::ensure!(size >= 1, "UPSERT_BATCH_SIZE must be >= 1");
    Ok(size)
}

/// Name of the violated unique constraint, if `err` is a unique violation.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}
