use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks belong to the Postgres session, so the lock holds on to the
// connection that took it until `release`.
const LOCK_NAMESPACE: i64 = 0x4449_4449_4D00; // "DIDIM"

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestJob {
    KrxDaily,
    DepositCatalog,
    CommodityImport,
}

impl IngestJob {
    fn tag(self) -> i64 {
        match self {
            IngestJob::KrxDaily => 1,
            IngestJob::DepositCatalog => 2,
            IngestJob::CommodityImport => 3,
        }
    }
}

pub fn lock_key(job: IngestJob, date: NaiveDate) -> i64 {
    LOCK_NAMESPACE ^ (job.tag() << 32) ^ i64::from(date.num_days_from_ce())
}

pub struct IngestLock {
    conn: PoolConnection<Postgres>,
    key: i64,
}

impl IngestLock {
    /// Returns `None` when another session already holds the lock.
    pub async fn try_acquire(
        pool: &sqlx::PgPool,
        job: IngestJob,
        date: NaiveDate,
    ) -> anyhow::Result<Option<Self>> {
        let key = lock_key(job, date);
        let mut conn = pool
            .acquire()
            .await
            .context("failed to acquire connection for advisory lock")?;
        let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;
        Ok(acquired.0.then_some(Self { conn, key }))
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        let key = self.key;
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={key})"))?;
        Ok(())
    }
}
