use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{LlmClient, Provider};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_gemini_api_key()?.to_string();
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::new(api_key, base_url, model, Duration::from_secs(timeout_secs))
    }

    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            http,
            api_key,
            base_url,
            model,
        })
    }

    fn diagnostics(stage: &'static str, detail: String, text: String) -> LlmDiagnosticsError {
        let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
        LlmDiagnosticsError {
            provider: Provider::Gemini,
            stage,
            detail,
            raw_output: Some(text),
            raw_response_json,
        }
    }

    fn response_text(res: &GenerateContentResponse) -> Option<String> {
        let candidate = res.candidates.first()?;
        let text = candidate
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        (!text.trim().is_empty()).then_some(text)
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn generate_text(&self, prompt: &str) -> anyhow::Result<String> {
        let req = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                response_mime_type: "application/json",
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let res = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&req)
            .send()
            .await
            // The URL carries the API key.
            .map_err(reqwest::Error::without_url)
            .context("Gemini request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to read Gemini response body")?;
        if !status.is_success() {
            return Err(Self::diagnostics("http", format!("status={status}"), text).into());
        }

        let parsed = match serde_json::from_str::<GenerateContentResponse>(&text) {
            Ok(parsed) => parsed,
            Err(err) => {
                return Err(Self::diagnostics("decode", err.to_string(), text).into());
            }
        };
        match Self::response_text(&parsed) {
            Some(out) => Ok(out),
            None => {
                let detail = "no candidates returned".to_string();
                Err(Self::diagnostics("empty", detail, text).into())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    content: Content,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client(base_url: String) -> GeminiClient {
        GeminiClient::new(
            "test-key".to_string(),
            base_url,
            DEFAULT_MODEL.to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn returns_first_candidate_text() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "{\"ok\":true}"}]}}]
        });
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_query(Matcher::UrlEncoded("key".into(), "test-key".into()))
            .match_body(Matcher::PartialJson(json!({
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let text = client(server.url()).generate_text("hi").await.unwrap();
        assert_eq!(text, "{\"ok\":true}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_carries_diagnostics() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("{\"error\":{\"message\":\"quota\"}}")
            .create_async()
            .await;

        let err = client(server.url()).generate_text("hi").await.unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "http");
        assert!(diag.raw_response_json.is_some());
    }

    #[tokio::test]
    async fn empty_candidates_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{\"candidates\":[]}")
            .create_async()
            .await;

        let err = client(server.url()).generate_text("hi").await.unwrap_err();
        assert_eq!(err.downcast_ref::<LlmDiagnosticsError>().unwrap().stage, "empty");
    }

    #[tokio::test]
    async fn transport_error_does_not_leak_api_key() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = GeminiClient::new(
            "SECRET_KEY_123".to_string(),
            format!("http://127.0.0.1:{port}"),
            DEFAULT_MODEL.to_string(),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = client.generate_text("hi").await.unwrap_err();
        let rendered = format!("{err:?} {err:#}");
        assert!(rendered.contains("Gemini request failed"));
        assert!(!rendered.contains("SECRET_KEY_123"));
    }
}
