use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::Utc;
use didim_core::domain::stock::{ChartPeriod, ChartPoint, StockSummary, WatchlistEntry};
use didim_core::naver::{NewsItem, NEWS_DEFAULT_DISPLAY};
use didim_core::storage::stocks;
use didim_core::time::kr_market::kst_date;
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/stocks/search/", get(search))
        .route("/api/stocks/watchlist/", get(watchlist).post(add_to_watchlist))
        .route("/api/stocks/watchlist/:ticker/", delete(remove_from_watchlist))
        .route("/api/stocks/:ticker/", get(detail))
        .route("/api/stocks/:ticker/chart/", get(chart))
        .route("/api/stocks/:ticker/news/", get(news))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<StockSummary>>, ApiError> {
    let q = query.q.unwrap_or_default();
    if q.trim().is_empty() {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(stocks::search(state.db()?, &q).await?))
}

async fn detail(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<StockSummary>, ApiError> {
    stocks::find_summary(state.db()?, &ticker)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Stock not found"))
}

#[derive(Debug, Deserialize)]
struct ChartQuery {
    #[serde(default)]
    period: Option<String>,
}

async fn chart(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    ApiQuery(query): ApiQuery<ChartQuery>,
) -> Result<Json<Vec<ChartPoint>>, ApiError> {
    let end = kst_date(Utc::now());
    let start = ChartPeriod::parse(query.period.as_deref()).start_date(end);
    Ok(Json(stocks::chart(state.db()?, &ticker, start, end).await?))
}

#[derive(Debug, Deserialize)]
struct NewsQuery {
    #[serde(default)]
    display: Option<String>,
}

async fn news(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    ApiQuery(query): ApiQuery<NewsQuery>,
) -> Result<Json<Vec<NewsItem>>, ApiError> {
    let display = query
        .display
        .as_deref()
        .and_then(|d| d.trim().parse::<u32>().ok())
        .unwrap_or(NEWS_DEFAULT_DISPLAY);
    let naver = state.naver()?;
    let search_term = match stocks::find_stock(state.db()?, &ticker).await? {
        Some(stock) => stock.name,
        None => ticker.clone(),
    };

    let items = naver
        .search_news(&search_term, display)
        .await
        .map_err(|e| ApiError::internal("뉴스 조회 실패", e))?;
    Ok(Json(items))
}

async fn watchlist(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<WatchlistEntry>>, ApiError> {
    Ok(Json(stocks::watchlist(state.db()?, user.user_id).await?))
}

#[derive(Debug, Deserialize)]
struct WatchRequest {
    #[serde(default)]
    ticker: Option<String>,
}

async fn add_to_watchlist(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<WatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ticker = req
        .ticker
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("Ticker is required"))?;
    let pool = state.db()?;
    let stock = stocks::find_stock(pool, &ticker)
        .await?
        .ok_or_else(|| ApiError::bad_request("Stock not found"))?;

    if stocks::add_to_watchlist(pool, user.user_id, &stock.ticker).await? {
        Ok((
            StatusCode::CREATED,
            Json(json!({ "status": "added", "message": format!("{} 추가됨", stock.name) })),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(json!({ "status": "already_exists", "message": "이미 관심목록에 있습니다." })),
        ))
    }
}

async fn remove_from_watchlist(
    State(state): State<AppState>,
    user: AuthUser,
    Path(ticker): Path<String>,
) -> Result<StatusCode, ApiError> {
    if stocks::remove_from_watchlist(state.db()?, user.user_id, &ticker).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Not found in watchlist"))
    }
}
