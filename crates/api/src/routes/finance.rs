use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use didim_core::domain::finance::{
    commodity_latest, Commodity, CommodityPrice, DepositFilter, ProductDetail, ProductSummary,
    ProductType, UserProductView,
};
use didim_core::storage::finance::{self, JoinOutcome};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{AuthUser, MaybeAuthUser};
use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 100;
const MAX_HISTORY_LIMIT: i64 = 5000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/finance/deposits/", get(list_deposits))
        .route("/api/finance/deposits/:id/", get(deposit_detail))
        .route("/api/finance/my-products/", get(my_products))
        .route(
            "/api/finance/products/:id/join/",
            post(join_product).delete(leave_product),
        )
        .route("/api/finance/gold/", get(gold_history))
        .route("/api/finance/silver/", get(silver_history))
        .route("/api/finance/commodities/", get(commodities))
}

#[derive(Debug, Deserialize)]
struct DepositQuery {
    #[serde(default, rename = "type")]
    product_type: Option<String>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    bank: Option<String>,
}

async fn list_deposits(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    ApiQuery(query): ApiQuery<DepositQuery>,
) -> Result<Json<Vec<ProductSummary>>, ApiError> {
    let filter = DepositFilter {
        product_type: query.product_type.as_deref().and_then(ProductType::parse),
        search: query.search,
        bank: query.bank,
    };
    Ok(Json(
        finance::list_products(state.db()?, &filter, viewer.0, None).await?,
    ))
}

async fn deposit_detail(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ProductDetail>, ApiError> {
    finance::product_detail(state.db()?, id, viewer.0)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("상품을 찾을 수 없습니다."))
}

async fn my_products(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<UserProductView>>, ApiError> {
    Ok(Json(finance::my_products(state.db()?, user.user_id).await?))
}

#[derive(Debug, Default, Deserialize)]
struct JoinRequest {
    #[serde(default)]
    option_id: Option<i64>,
    #[serde(default)]
    memo: Option<String>,
}

async fn join_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    body: Option<Json<JoinRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let memo = req.memo.unwrap_or_default();
    match finance::join_product(state.db()?, user.user_id, id, req.option_id, memo.trim()).await? {
        JoinOutcome::Joined(view) => Ok((
            StatusCode::CREATED,
            Json(json!({ "message": "상품에 가입했습니다.", "data": view })),
        )),
        JoinOutcome::AlreadyJoined => Err(ApiError::bad_request("이미 가입한 상품입니다.")),
        JoinOutcome::ProductNotFound => Err(ApiError::not_found("상품을 찾을 수 없습니다.")),
    }
}

async fn leave_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if finance::leave_product(state.db()?, user.user_id, id).await? {
        Ok(Json(json!({ "message": "상품을 해지했습니다." })))
    } else {
        Err(ApiError::not_found("가입한 상품이 아닙니다."))
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default, rename = "type")]
    commodity: Option<String>,
    #[serde(default)]
    limit: Option<String>,
}

impl HistoryQuery {
    fn limit(&self) -> i64 {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

async fn history(
    state: &AppState,
    commodity: Commodity,
    limit: i64,
) -> Result<Vec<CommodityPrice>, ApiError> {
    Ok(finance::commodity_history(state.db()?, commodity, limit).await?)
}

async fn gold_history(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<Vec<CommodityPrice>>, ApiError> {
    Ok(Json(history(&state, Commodity::Gold, query.limit()).await?))
}

async fn silver_history(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<Vec<CommodityPrice>>, ApiError> {
    Ok(Json(history(&state, Commodity::Silver, query.limit()).await?))
}

async fn commodities(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let commodity = Commodity::parse_lenient(query.commodity.as_deref());
    let recent = history(&state, commodity, 2).await?;
    let rows = history(&state, commodity, query.limit()).await?;
    Ok(Json(json!({
        "type": commodity.as_str(),
        "latest": commodity_latest(&recent),
        "history": rows,
    })))
}
