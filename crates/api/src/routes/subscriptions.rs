use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use didim_core::domain::subscription::{new_order_id, order_name, Payment, Plan};
use didim_core::payments::{ChargeRequest, TossRejection};
use didim_core::storage::subscriptions::{self, ChargeRecord};
use didim_core::storage::users;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/subscriptions/plans/", get(plans))
        .route("/api/subscriptions/status/", get(status))
        .route("/api/subscriptions/billing-key/", post(issue_billing_key))
        .route("/api/subscriptions/subscribe/", post(subscribe))
        .route("/api/subscriptions/cancel/", post(cancel))
        .route("/api/subscriptions/payments/", get(payments))
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Provider refusals become 400 with the provider body; anything else is a 500.
fn provider_failure(message: &str, err: anyhow::Error) -> ApiError {
    match err.downcast_ref::<TossRejection>() {
        Some(rejection) => ApiError::Rejected {
            message: message.to_string(),
            detail: rejection.detail.clone(),
        },
        None => ApiError::internal(message, err),
    }
}

async fn plans(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<Plan>>, ApiError> {
    Ok(Json(subscriptions::active_plans(state.db()?).await?))
}

async fn status(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();
    let subscription = subscriptions::find_subscription(state.db()?, user.user_id).await?;
    let has_subscription = subscription.as_ref().is_some_and(|s| s.is_active_at(now));
    Ok(Json(json!({
        "has_subscription": has_subscription,
        "subscription": subscription.map(|s| s.view(now)),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BillingKeyRequest {
    #[serde(default)]
    auth_key: Option<String>,
    #[serde(default)]
    customer_key: Option<String>,
}

async fn issue_billing_key(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<BillingKeyRequest>,
) -> Result<Json<Value>, ApiError> {
    let (Some(auth_key), Some(customer_key)) = (present(req.auth_key), present(req.customer_key))
    else {
        return Err(ApiError::bad_request("authKey와 customerKey가 필요합니다."));
    };
    let toss = state.toss()?;

    let auth = toss
        .issue_billing_key(&auth_key, &customer_key)
        .await
        .map_err(|e| provider_failure("빌링키 발급 실패", e))?;
    tracing::info!(user_id = user.user_id, "billing key issued");
    Ok(Json(json!({
        "success": true,
        "billingKey": auth.billing_key,
        "customerKey": auth.customer_key,
        "card": auth.card,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeRequest {
    #[serde(default)]
    billing_key: Option<String>,
    #[serde(default)]
    customer_key: Option<String>,
    #[serde(default)]
    plan_id: Option<i64>,
}

async fn subscribe(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<SubscribeRequest>,
) -> Result<Json<Value>, ApiError> {
    let (Some(billing_key), Some(customer_key), Some(plan_id)) =
        (present(req.billing_key), present(req.customer_key), req.plan_id)
    else {
        return Err(ApiError::bad_request("필수 정보가 누락되었습니다."));
    };
    let pool = state.db()?;
    let toss = state.toss()?;
    let now = Utc::now();

    if let Some(existing) = subscriptions::find_subscription(pool, user.user_id).await? {
        if existing.is_active_at(now) {
            return Err(ApiError::bad_request("이미 구독 중입니다."));
        }
    }
    let plan = subscriptions::find_active_plan(pool, plan_id)
        .await?
        .ok_or_else(|| ApiError::bad_request("유효하지 않은 플랜입니다."))?;
    let account = users::find_by_id(pool, user.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("사용자를 찾을 수 없습니다.".into()))?;

    let order_id = new_order_id(user.user_id);
    let title = order_name(&plan.name);
    let record = ChargeRecord {
        user_id: user.user_id,
        plan: &plan,
        order_id: &order_id,
        billing_key: &billing_key,
        customer_key: &customer_key,
    };
    let charge = toss
        .charge(
            &billing_key,
            &ChargeRequest {
                customer_key: &customer_key,
                amount: plan.price,
                order_id: &order_id,
                order_name: &title,
                customer_email: &account.email,
            },
        )
        .await;

    let charged = match charge {
        Ok(charged) => charged,
        Err(err) => {
            subscriptions::record_failed_charge(pool, &record).await?;
            tracing::warn!(user_id = user.user_id, %order_id, "subscription charge failed");
            return Err(provider_failure("결제 실패", err));
        }
    };

    let subscription =
        subscriptions::record_successful_charge(pool, &record, charged.payment_key.as_deref(), now)
            .await?;
    tracing::info!(user_id = user.user_id, %order_id, plan_id, "subscription activated");
    Ok(Json(json!({
        "success": true,
        "message": "구독이 완료되었습니다.",
        "subscription": subscription.view(now),
    })))
}

async fn cancel(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, ApiError> {
    let pool = state.db()?;
    let subscription = subscriptions::find_subscription(pool, user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("구독 정보가 없습니다."))?;
    if subscription.is_cancelled() {
        return Err(ApiError::bad_request("이미 취소된 구독입니다."));
    }

    subscriptions::cancel_subscription(pool, subscription.id, Utc::now()).await?;
    tracing::info!(
        user_id = user.user_id,
        subscription_id = subscription.id,
        "subscription cancelled"
    );
    Ok(Json(json!({
        "success": true,
        "message": "구독이 취소되었습니다. 만료일까지 서비스를 이용할 수 있습니다.",
        "expires_at": subscription.expires_at,
    })))
}

async fn payments(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Payment>>, ApiError> {
    Ok(Json(subscriptions::list_payments(state.db()?, user.user_id).await?))
}
