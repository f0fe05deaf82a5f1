pub mod toss;

pub use toss::{BillingAuthorization, ChargeRequest, ChargeResult, TossClient, TossRejection};
