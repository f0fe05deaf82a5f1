use crate::ai::AnalysisStore;
use crate::domain::survey::{RecommendationRow, RiskProfile, SurveyAnswers, SurveyRow};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

/// Postgres-backed analysis cache over `stock_ai_analyses`.
#[derive(Debug, Clone)]
pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn latest_since(
        &self,
        ticker: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Option<Value>> {
        let row: Option<(Value,)> = sqlx::query_as(
            "SELECT data FROM stock_ai_analyses \
             WHERE ticker = $1 AND created_at >= $2 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(ticker)
        .bind(since)
        .fetch_optional(&self.pool)
        .await
        .context("select stock_ai_analyses failed")?;
        Ok(row.map(|(data,)| data))
    }

    async fn save(&self, ticker: &str, data: &Value) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO stock_ai_analyses (ticker, data) VALUES ($1, $2)")
            .bind(ticker)
            .bind(data)
            .execute(&self.pool)
            .await
            .context("insert stock_ai_analyses failed")?;
        Ok(())
    }
}

const SURVEY_COLUMNS: &str = "id, user_id, savings, investment, income, q2_goal, q3_period, \
     q4_knowledge, q5_experience, q6_expected_return, q7_risk_tolerance, q8_monthly_saving, \
     q9_loss_reaction, q10_interest, created_at, updated_at";

fn option_index(value: i64, field: &str) -> anyhow::Result<i32> {
    i32::try_from(value).with_context(|| format!("{field} out of range"))
}

pub async fn find_survey(pool: &PgPool, user_id: i64) -> anyhow::Result<Option<SurveyRow>> {
    sqlx::query_as::<_, SurveyRow>(&format!(
        "SELECT {SURVEY_COLUMNS} FROM user_finance_surveys WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("select user_finance_surveys failed")
}

/// One survey per user; resubmitting replaces the answers.
pub async fn upsert_survey(
    pool: &PgPool,
    user_id: i64,
    answers: &SurveyAnswers,
) -> anyhow::Result<(SurveyRow, bool)> {
    let row: (i64, bool) = sqlx::query_as(
        "INSERT INTO user_finance_surveys (user_id, savings, investment, income, q2_goal, \
           q3_period, q4_knowledge, q5_experience, q6_expected_return, q7_risk_tolerance, \
           q8_monthly_saving, q9_loss_reaction, q10_interest) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (user_id) DO UPDATE SET savings = EXCLUDED.savings, \
           investment = EXCLUDED.investment, income = EXCLUDED.income, q2_goal = EXCLUDED.q2_goal, \
           q3_period = EXCLUDED.q3_period, q4_knowledge = EXCLUDED.q4_knowledge, \
           q5_experience = EXCLUDED.q5_experience, \
           q6_expected_return = EXCLUDED.q6_expected_return, \
           q7_risk_tolerance = EXCLUDED.q7_risk_tolerance, \
           q8_monthly_saving = EXCLUDED.q8_monthly_saving, \
           q9_loss_reaction = EXCLUDED.q9_loss_reaction, q10_interest = EXCLUDED.q10_interest, \
           updated_at = now() \
         RETURNING id, (xmax = 0) AS inserted",
    )
    .bind(user_id)
    .bind(answers.savings)
    .bind(answers.investment)
    .bind(answers.income)
    .bind(option_index(answers.q2_goal, "q2_goal")?)
    .bind(option_index(answers.q3_period, "q3_period")?)
    .bind(option_index(answers.q4_knowledge, "q4_knowledge")?)
    .bind(option_index(answers.q5_experience, "q5_experience")?)
    .bind(option_index(answers.q6_expected_return, "q6_expected_return")?)
    .bind(option_index(answers.q7_risk_tolerance, "q7_risk_tolerance")?)
    .bind(option_index(answers.q8_monthly_saving, "q8_monthly_saving")?)
    .bind(option_index(answers.q9_loss_reaction, "q9_loss_reaction")?)
    .bind(option_index(answers.q10_interest, "q10_interest")?)
    .fetch_one(pool)
    .await
    .context("upsert user_finance_surveys failed")?;

    let (_, inserted) = row;
    let survey = find_survey(pool, user_id)
        .await?
        .context("survey vanished after upsert")?;
    Ok((survey, inserted))
}

pub async fn insert_recommendation(
    pool: &PgPool,
    user_id: i64,
    profile: RiskProfile,
    data: &Value,
) -> anyhow::Result<RecommendationRow> {
    sqlx::query_as::<_, RecommendationRow>(
        "INSERT INTO user_ai_recommendations (user_id, risk_profile, data) VALUES ($1, $2, $3) \
         RETURNING id, risk_profile, data, created_at",
    )
    .bind(user_id)
    .bind(profile.label())
    .bind(data)
    .fetch_one(pool)
    .await
    .context("insert user_ai_recommendations failed")
}

pub async fn latest_recommendation(
    pool: &PgPool,
    user_id: i64,
) -> anyhow::Result<Option<RecommendationRow>> {
    sqlx::query_as::<_, RecommendationRow>(
        "SELECT id, risk_profile, data, created_at FROM user_ai_recommendations \
         WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("select user_ai_recommendations failed")
}
