use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub mod accounts;
pub mod ai;
pub mod community;
pub mod finance;
pub mod stocks;
pub mod subscriptions;

async fn healthz() -> &'static str {
    "ok"
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .merge(accounts::router())
        .merge(stocks::router())
        .merge(finance::router())
        .merge(ai::router())
        .merge(community::router())
        .merge(subscriptions::router())
}
