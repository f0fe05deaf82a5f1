use crate::domain::subscription::{Payment, PaymentStatus, Plan, Subscription, SubscriptionStatus};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

const PLAN_COLUMNS: &str = "id, name, price, duration_days, description, is_active";

const PAYMENT_COLUMNS: &str =
    "id, subscription_id, amount, status, payment_key, order_id, paid_at, created_at";

pub async fn active_plans(pool: &PgPool) -> anyhow::Result<Vec<Plan>> {
    sqlx::query_as::<_, Plan>(&format!(
        "SELECT {PLAN_COLUMNS} FROM plans WHERE is_active ORDER BY price, id"
    ))
    .fetch_all(pool)
    .await
    .context("select plans failed")
}

pub async fn find_active_plan(pool: &PgPool, plan_id: i64) -> anyhow::Result<Option<Plan>> {
    sqlx::query_as::<_, Plan>(&format!(
        "SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1 AND is_active"
    ))
    .bind(plan_id)
    .fetch_optional(pool)
    .await
    .context("select plan failed")
}

pub async fn find_subscription(
    pool: &PgPool,
    user_id: i64,
) -> anyhow::Result<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        "SELECT s.id, s.user_id, s.plan_id, p.name AS plan_name, p.price AS plan_price, \
           p.duration_days AS plan_duration_days, p.description AS plan_description, \
           s.status, s.billing_key, s.customer_key, s.started_at, s.expires_at, s.cancelled_at \
         FROM subscriptions s LEFT JOIN plans p ON p.id = s.plan_id \
         WHERE s.user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("select subscription failed")
}

pub struct ChargeRecord<'a> {
    pub user_id: i64,
    pub plan: &'a Plan,
    pub order_id: &'a str,
    pub billing_key: &'a str,
    pub customer_key: &'a str,
}

pub async fn record_failed_charge(pool: &PgPool, charge: &ChargeRecord<'_>) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO payments (user_id, amount, status, order_id) VALUES ($1, $2, $3, $4)")
        .bind(charge.user_id)
        .bind(charge.plan.price)
        .bind(PaymentStatus::Failed.as_str())
        .bind(charge.order_id)
        .execute(pool)
        .await
        .context("insert failed payment failed")?;
    Ok(())
}

/// Records the completed payment, (re)activates the user's single subscription
/// for `plan.duration_days` from `now` and links the two.
pub async fn record_successful_charge(
    pool: &PgPool,
    charge: &ChargeRecord<'_>,
    payment_key: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<Subscription> {
    let expires_at = now + Duration::days(i64::from(charge.plan.duration_days));
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let (payment_id,): (i64,) = sqlx::query_as(
        "INSERT INTO payments (user_id, amount, status, payment_key, order_id, paid_at) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
    )
    .bind(charge.user_id)
    .bind(charge.plan.price)
    .bind(PaymentStatus::Completed.as_str())
    .bind(payment_key)
    .bind(charge.order_id)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .context("insert payment failed")?;

    let (subscription_id,): (i64,) = sqlx::query_as(
        "INSERT INTO subscriptions (user_id, plan_id, status, billing_key, customer_key, \
           started_at, expires_at, cancelled_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, NULL) \
         ON CONFLICT (user_id) DO UPDATE SET plan_id = EXCLUDED.plan_id, status = EXCLUDED.status, \
           billing_key = EXCLUDED.billing_key, customer_key = EXCLUDED.customer_key, \
           started_at = EXCLUDED.started_at, expires_at = EXCLUDED.expires_at, \
           cancelled_at = NULL, updated_at = now() \
         RETURNING id",
    )
    .bind(charge.user_id)
    .bind(charge.plan.id)
    .bind(SubscriptionStatus::Active.as_str())
    .bind(charge.billing_key)
    .bind(charge.customer_key)
    .bind(now)
    .bind(expires_at)
    .fetch_one(&mut *tx)
    .await
    .context("upsert subscription failed")?;

    sqlx::query("UPDATE payments SET subscription_id = $2 WHERE id = $1")
        .bind(payment_id)
        .bind(subscription_id)
        .execute(&mut *tx)
        .await
        .context("link payment failed")?;

    tx.commit().await.context("commit transaction failed")?;

    find_subscription(pool, charge.user_id)
        .await?
        .context("subscription vanished after upsert")
}

pub async fn cancel_subscription(
    pool: &PgPool,
    subscription_id: i64,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE subscriptions SET status = $2, cancelled_at = $3, updated_at = now() WHERE id = $1",
    )
    .bind(subscription_id)
    .bind(SubscriptionStatus::Cancelled.as_str())
    .bind(now)
    .execute(pool)
    .await
    .context("cancel subscription failed")?;
    Ok(())
}

/// Newest first.
pub async fn list_payments(pool: &PgPool, user_id: i64) -> anyhow::Result<Vec<Payment>> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = $1 \
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("select payments failed")
}
