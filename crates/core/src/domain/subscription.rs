use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub duration_days: i32,
    pub description: String,
    #[serde(skip_serializing)]
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

/// Subscription row joined with its (nullable) plan.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: Option<i64>,
    pub plan_name: Option<String>,
    pub plan_price: Option<i64>,
    pub plan_duration_days: Option<i32>,
    pub plan_description: Option<String>,
    pub status: String,
    pub billing_key: Option<String>,
    pub customer_key: Option<String>,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active.as_str() && self.expires_at > now
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == SubscriptionStatus::Cancelled.as_str()
    }

    pub fn plan(&self) -> Option<Plan> {
        Some(Plan {
            id: self.plan_id?,
            name: self.plan_name.clone()?,
            price: self.plan_price?,
            duration_days: self.plan_duration_days?,
            description: self.plan_description.clone().unwrap_or_default(),
            is_active: true,
        })
    }

    pub fn view(&self, now: DateTime<Utc>) -> SubscriptionView {
        SubscriptionView {
            id: self.id,
            plan: self.plan(),
            status: self.status.clone(),
            is_active: self.is_active_at(now),
            started_at: self.started_at,
            expires_at: self.expires_at,
            cancelled_at: self.cancelled_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub id: i64,
    pub plan: Option<Plan>,
    pub status: String,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: i64,
    #[serde(skip_serializing)]
    pub subscription_id: Option<i64>,
    pub amount: i64,
    pub status: String,
    #[serde(skip_serializing)]
    pub payment_key: Option<String>,
    pub order_id: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub fn new_order_id(user_id: i64) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("DIDIM_{user_id}_{}", &hex[..8])
}

pub fn order_name(plan_name: &str) -> String {
    format!("DIDIM {plan_name} 구독")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn subscription(status: SubscriptionStatus, expires_in: Duration) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: 1,
            user_id: 1,
            plan_id: Some(1),
            plan_name: Some("Premium".into()),
            plan_price: Some(4900),
            plan_duration_days: Some(30),
            plan_description: None,
            status: status.as_str().into(),
            billing_key: Some("bk".into()),
            customer_key: Some("ck".into()),
            started_at: now,
            expires_at: now + expires_in,
            cancelled_at: None,
        }
    }

    #[test]
    fn order_id_shape() {
        let id = new_order_id(42);
        let suffix = id.strip_prefix("DIDIM_42_").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(new_order_id(42), id);
    }

    #[test]
    fn active_requires_status_and_future_expiry() {
        let now = Utc::now();
        assert!(subscription(SubscriptionStatus::Active, Duration::days(1)).is_active_at(now));
        assert!(!subscription(SubscriptionStatus::Active, Duration::days(-1)).is_active_at(now));
        assert!(!subscription(SubscriptionStatus::Cancelled, Duration::days(1)).is_active_at(now));
    }

    #[test]
    fn view_nests_plan_and_hides_billing_key() {
        let sub = subscription(SubscriptionStatus::Active, Duration::days(1));
        let json = serde_json::to_value(sub.view(Utc::now())).unwrap();
        assert!(json.get("billing_key").is_none());
        assert_eq!(json["is_active"], true);
        assert_eq!(json["plan"]["price"], 4900);
        assert!(json["plan"].get("is_active").is_none());
        assert_eq!(order_name("Premium"), "DIDIM Premium 구독");

        let orphan = Subscription { plan_id: None, ..sub };
        assert!(orphan.view(Utc::now()).plan.is_none());
    }
}
