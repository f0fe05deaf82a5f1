use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use didim_core::ai::{self, AnalysisSubject};
use didim_core::domain::finance::{DepositFilter, ProductType};
use didim_core::domain::survey::{RecommendationRow, SurveyAnswers, SurveyView};
use didim_core::llm::error::LlmDiagnosticsError;
use didim_core::llm::prompts::RecommendationCandidates;
use didim_core::storage::ai::{self as ai_store, PgAnalysisStore};
use didim_core::storage::{finance, stocks};
use serde_json::Value;
use validator::{Validate, ValidationErrors};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;

const CANDIDATE_PRODUCTS: i64 = 5;
const CANDIDATE_STOCKS: i64 = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/ai/analyze/:ticker/", get(analyze))
        .route("/api/ai/survey/", get(get_survey).post(submit_survey))
        .route("/api/ai/recommend/", get(latest_recommendation).post(recommend))
}

fn llm_failure(message: &str, err: anyhow::Error) -> ApiError {
    if let Some(diag) = err.downcast_ref::<LlmDiagnosticsError>() {
        tracing::warn!(
            provider = ?diag.provider,
            stage = diag.stage,
            detail = %diag.detail,
            raw_output = diag.raw_output.as_deref().unwrap_or(""),
            "LLM call failed"
        );
    }
    ApiError::internal(message, err)
}

async fn analyze(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let pool = state.db()?;
    let store = PgAnalysisStore::new(pool.clone());
    if let Some(cached) = ai::cached_analysis(&store, &ticker, Utc::now()).await? {
        tracing::debug!(%ticker, "serving cached AI analysis");
        return Ok(Json(cached));
    }

    let llm = state.llm()?;
    let known = stocks::find_stock(pool, &ticker).await?.map(|s| {
        let asset_type = s.asset_type();
        (s.name, asset_type)
    });
    let subject = AnalysisSubject::new(&ticker, known);

    let data = ai::generate_analysis(&store, llm, &subject)
        .await
        .map_err(|e| llm_failure("AI 분석 생성 실패", e))?;
    Ok(Json(data))
}

fn invalid_fields(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .keys()
        .map(|k| k.to_string())
        .collect();
    fields.sort();
    format!("허용 범위를 벗어난 값입니다: {}", fields.join(", "))
}

async fn submit_survey(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(answers): ApiJson<SurveyAnswers>,
) -> Result<Json<SurveyView>, ApiError> {
    answers
        .validate()
        .map_err(|e| ApiError::BadRequest(invalid_fields(&e)))?;

    let (survey, created) = ai_store::upsert_survey(state.db()?, user.user_id, &answers).await?;
    tracing::info!(user_id = user.user_id, created, "survey saved");
    Ok(Json(survey.view()))
}

async fn get_survey(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<SurveyView>, ApiError> {
    ai_store::find_survey(state.db()?, user.user_id)
        .await?
        .map(|s| Json(s.view()))
        .ok_or_else(|| ApiError::not_found("설문 정보가 없습니다."))
}

async fn recommend(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<(StatusCode, Json<RecommendationRow>), ApiError> {
    let pool = state.db()?;
    let survey = ai_store::find_survey(pool, user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("설문 정보가 없습니다."))?;
    let llm = state.llm()?;
    let answers = survey.answers();

    let filter = |product_type| DepositFilter {
        product_type: Some(product_type),
        ..Default::default()
    };
    let top = Some(CANDIDATE_PRODUCTS);
    let candidates = RecommendationCandidates {
        deposits: finance::list_products(pool, &filter(ProductType::Deposit), None, top).await?,
        savings: finance::list_products(pool, &filter(ProductType::Saving), None, top).await?,
        stocks: stocks::top_by_market_cap(pool, CANDIDATE_STOCKS).await?,
    };

    let recommendation = ai::generate_recommendation(llm, &answers, &candidates)
        .await
        .map_err(|e| llm_failure("AI 추천 생성 실패", e))?;
    let data = serde_json::to_value(&recommendation).map_err(anyhow::Error::from)?;
    let row =
        ai_store::insert_recommendation(pool, user.user_id, answers.risk_profile(), &data).await?;
    tracing::info!(user_id = user.user_id, recommendation_id = row.id, "recommendation stored");
    Ok((StatusCode::CREATED, Json(row)))
}

async fn latest_recommendation(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<RecommendationRow>, ApiError> {
    ai_store::latest_recommendation(state.db()?, user.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("추천 내역이 없습니다."))
}
