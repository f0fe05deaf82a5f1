use crate::domain::contract::{
    CandidateSet, LlmRecommendation, LlmStockAnalysis, Recommendation, StockAnalysis,
};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::Provider;
use serde::de::DeserializeOwned;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```).
        let mut inner = trimmed;
        if let Some(after_first) = inner.split_once('\n').map(|(_, rest)| rest) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

fn decode<T: DeserializeOwned>(provider: Provider, text: &str) -> anyhow::Result<T> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    serde_json::from_str::<T>(&json_str).map_err(|err| {
        LlmDiagnosticsError::parse(provider, format!("invalid JSON: {err}"), text).into()
    })
}

pub fn parse_analysis(
    provider: Provider,
    text: &str,
    ticker: &str,
) -> anyhow::Result<StockAnalysis> {
    let raw = decode::<LlmStockAnalysis>(provider, text)?;
    raw.validate_and_into_analysis(ticker)
        .map_err(|err| LlmDiagnosticsError::parse(provider, err.to_string(), text).into())
}

pub fn parse_recommendation(
    provider: Provider,
    text: &str,
    candidates: &CandidateSet,
) -> anyhow::Result<Recommendation> {
    let raw = decode::<LlmRecommendation>(provider, text)?;
    raw.validate_and_into_recommendation(candidates)
        .map_err(|err| LlmDiagnosticsError::parse(provider, err.to_string(), text).into())
}
