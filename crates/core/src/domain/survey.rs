use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Survey answers as submitted. Every question is a zero-based option index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SurveyAnswers {
    #[validate(range(min = 0))]
    pub savings: i64,
    #[validate(range(min = 0))]
    pub investment: i64,
    #[validate(range(min = 0))]
    pub income: i64,
    #[validate(range(min = 0, max = 4))]
    pub q2_goal: i64,
    #[validate(range(min = 0, max = 4))]
    pub q3_period: i64,
    #[validate(range(min = 0, max = 3))]
    pub q4_knowledge: i64,
    #[validate(range(min = 0, max = 4))]
    pub q5_experience: i64,
    #[validate(range(min = 0, max = 4))]
    pub q6_expected_return: i64,
    #[validate(range(min = 0, max = 4))]
    pub q7_risk_tolerance: i64,
    #[validate(range(min = 0, max = 4))]
    pub q8_monthly_saving: i64,
    #[validate(range(min = 0, max = 3))]
    pub q9_loss_reaction: i64,
    #[validate(range(min = 0, max = 4))]
    pub q10_interest: i64,
}

// Upper bounds of q3..=q9.
const RISK_MAX: i64 = 4 + 3 + 4 + 4 + 4 + 4 + 3;

impl SurveyAnswers {
    /// Sum of the risk-bearing answers scaled to 0..=100, rounded half up.
    pub fn risk_score(&self) -> i64 {
        let raw = self.q3_period
            + self.q4_knowledge
            + self.q5_experience
            + self.q6_expected_return
            + self.q7_risk_tolerance
            + self.q8_monthly_saving
            + self.q9_loss_reaction;
        let raw = raw.clamp(0, RISK_MAX);
        (raw * 200 + RISK_MAX) / (2 * RISK_MAX)
    }

    pub fn risk_profile(&self) -> RiskProfile {
        RiskProfile::from_score(self.risk_score())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskProfile {
    #[serde(rename = "안정형")]
    Stable,
    #[serde(rename = "안정추구형")]
    StabilitySeeking,
    #[serde(rename = "위험중립형")]
    RiskNeutral,
    #[serde(rename = "적극투자형")]
    Active,
    #[serde(rename = "공격투자형")]
    Aggressive,
}

impl RiskProfile {
    pub fn from_score(score: i64) -> Self {
        match score {
            s if s < 20 => RiskProfile::Stable,
            s if s < 40 => RiskProfile::StabilitySeeking,
            s if s < 60 => RiskProfile::RiskNeutral,
            s if s < 80 => RiskProfile::Active,
            _ => RiskProfile::Aggressive,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskProfile::Stable => "안정형",
            RiskProfile::StabilitySeeking => "안정추구형",
            RiskProfile::RiskNeutral => "위험중립형",
            RiskProfile::Active => "적극투자형",
            RiskProfile::Aggressive => "공격투자형",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SurveyRow {
    pub id: i64,
    pub user_id: i64,
    pub savings: i64,
    pub investment: i64,
    pub income: i64,
    pub q2_goal: i32,
    pub q3_period: i32,
    pub q4_knowledge: i32,
    pub q5_experience: i32,
    pub q6_expected_return: i32,
    pub q7_risk_tolerance: i32,
    pub q8_monthly_saving: i32,
    pub q9_loss_reaction: i32,
    pub q10_interest: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SurveyRow {
    pub fn answers(&self) -> SurveyAnswers {
        SurveyAnswers {
            savings: self.savings,
            investment: self.investment,
            income: self.income,
            q2_goal: self.q2_goal.into(),
            q3_period: self.q3_period.into(),
            q4_knowledge: self.q4_knowledge.into(),
            q5_experience: self.q5_experience.into(),
            q6_expected_return: self.q6_expected_return.into(),
            q7_risk_tolerance: self.q7_risk_tolerance.into(),
            q8_monthly_saving: self.q8_monthly_saving.into(),
            q9_loss_reaction: self.q9_loss_reaction.into(),
            q10_interest: self.q10_interest.into(),
        }
    }

    pub fn view(&self) -> SurveyView {
        let answers = self.answers();
        SurveyView {
            id: self.id,
            risk_score: answers.risk_score(),
            risk_profile: answers.risk_profile(),
            answers,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveyView {
    pub id: i64,
    #[serde(flatten)]
    pub answers: SurveyAnswers,
    pub risk_score: i64,
    pub risk_profile: RiskProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RecommendationRow {
    pub id: i64,
    pub risk_profile: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
