use crate::domain::contract::Recommendation;
use crate::domain::stock::AssetType;
use crate::domain::survey::SurveyAnswers;
use crate::llm::prompts::{self, RecommendationCandidates};
use crate::llm::{json, LlmClient};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

pub const ANALYSIS_TTL_HOURS: i64 = 24;

/// Persistence seam for cached stock analyses.
#[async_trait::async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn latest_since(&self, ticker: &str, since: DateTime<Utc>)
        -> anyhow::Result<Option<Value>>;

    async fn save(&self, ticker: &str, data: &Value) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct AnalysisSubject {
    pub ticker: String,
    pub name: String,
    pub asset_type: AssetType,
}

impl AnalysisSubject {
    /// Unknown stocks are analysed under their ticker as a plain stock.
    pub fn new(ticker: &str, known: Option<(String, AssetType)>) -> Self {
        let (name, asset_type) = known.unwrap_or_else(|| (ticker.to_string(), AssetType::Stock));
        Self {
            ticker: ticker.to_string(),
            name,
            asset_type,
        }
    }
}

/// An analysis for `ticker` saved within the last [`ANALYSIS_TTL_HOURS`].
pub async fn cached_analysis(
    store: &dyn AnalysisStore,
    ticker: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<Value>> {
    let since = now - Duration::hours(ANALYSIS_TTL_HOURS);
    store.latest_since(ticker, since).await
}

/// Asks the LLM for a fresh analysis, validates it and stores it.
pub async fn generate_analysis(
    store: &dyn AnalysisStore,
    llm: &dyn LlmClient,
    subject: &AnalysisSubject,
) -> anyhow::Result<Value> {
    let prompt = prompts::analysis_prompt(&subject.ticker, &subject.name, subject.asset_type);
    let text = llm.generate_text(&prompt).await?;
    let analysis = json::parse_analysis(llm.provider(), &text, &subject.ticker)?;
    let data = serde_json::to_value(&analysis).context("failed to serialize analysis")?;

    store.save(&subject.ticker, &data).await?;
    tracing::info!(ticker = %subject.ticker, "stored new AI analysis");
    Ok(data)
}

pub async fn generate_recommendation(
    llm: &dyn LlmClient,
    answers: &SurveyAnswers,
    candidates: &RecommendationCandidates,
) -> anyhow::Result<Recommendation> {
    let prompt = prompts::recommendation_prompt(
        answers,
        answers.risk_score(),
        answers.risk_profile(),
        candidates,
    );
    let text = llm.generate_text(&prompt).await?;
    json::parse_recommendation(llm.provider(), &text, &candidates.candidate_set())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Provider;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<(String, Value, DateTime<Utc>)>>,
    }

    #[async_trait::async_trait]
    impl AnalysisStore for MemoryStore {
        async fn latest_since(
            &self,
            ticker: &str,
            since: DateTime<Utc>,
        ) -> anyhow::Result<Option<Value>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .rev()
                .find(|(t, _, at)| t == ticker && *at >= since)
                .map(|(_, v, _)| v.clone()))
        }

        async fn save(&self, ticker: &str, data: &Value) -> anyhow::Result<()> {
            self.rows
                .lock()
                .unwrap()
                .push((ticker.to_string(), data.clone(), Utc::now()));
            Ok(())
        }
    }

    struct CountingLlm {
        calls: AtomicUsize,
        reply: String,
    }

    #[async_trait::async_trait]
    impl LlmClient for CountingLlm {
        fn provider(&self) -> Provider {
            Provider::Gemini
        }

        async fn generate_text(&self, _prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn llm() -> CountingLlm {
        CountingLlm {
            calls: AtomicUsize::new(0),
            reply: json!({
                "opinion": {"action": "매수", "title": "t", "reason": "r"},
                "summary": {"summary_1": "a", "summary_2": "b", "summary_3": "c"},
                "related_stocks": [{"name": "SK하이닉스", "code": "000660", "reason": "x"}]
            })
            .to_string(),
        }
    }

    #[tokio::test]
    async fn fresh_cache_is_served_per_ticker() {
        let store = MemoryStore::default();
        let cached = json!({"cached": true});
        store.rows.lock().unwrap().push((
            "005930".into(),
            cached.clone(),
            Utc::now() - Duration::hours(23),
        ));

        let out = cached_analysis(&store, "005930", Utc::now()).await.unwrap();
        assert_eq!(out, Some(cached));
        assert!(cached_analysis(&store, "000660", Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn stale_cache_regenerates_and_stores() {
        let store = MemoryStore::default();
        store.rows.lock().unwrap().push((
            "005930".into(),
            json!({"cached": true}),
            Utc::now() - Duration::hours(25),
        ));
        let llm = llm();
        let known = Some(("삼성전자".to_string(), AssetType::Stock));
        let subject = AnalysisSubject::new("005930", known);

        assert!(cached_analysis(&store, "005930", Utc::now())
            .await
            .unwrap()
            .is_none());

        let out = generate_analysis(&store, &llm, &subject).await.unwrap();
        assert_eq!(out["opinion"]["action"], "매수");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.rows.lock().unwrap().len(), 2);

        let again = cached_analysis(&store, "005930", Utc::now()).await.unwrap();
        assert_eq!(again, Some(out));
    }

    #[tokio::test]
    async fn invalid_reply_is_not_stored() {
        let store = MemoryStore::default();
        let llm = CountingLlm {
            calls: AtomicUsize::new(0),
            reply: "not json".to_string(),
        };
        let subject = AnalysisSubject::new("005930", None);
        assert!(generate_analysis(&store, &llm, &subject).await.is_err());
        assert!(store.rows.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_subject_falls_back_to_ticker() {
        let s = AnalysisSubject::new("123456", None);
        assert_eq!(s.name, "123456");
        assert_eq!(s.asset_type, AssetType::Stock);
    }
}
