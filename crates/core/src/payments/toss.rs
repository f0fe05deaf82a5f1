use crate::config::Settings;
use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.tosspayments.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Non-2xx answer from Toss. `detail` is the provider's JSON body.
#[derive(Debug, Clone)]
pub struct TossRejection {
    pub status: u16,
    pub detail: Value,
}

impl fmt::Display for TossRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.detail.get("code").and_then(Value::as_str).unwrap_or("");
        write!(f, "Toss rejected request (status={}, code={code})", self.status)
    }
}

impl std::error::Error for TossRejection {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingAuthorization {
    pub billing_key: String,
    pub customer_key: String,
    pub card: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest<'a> {
    pub customer_key: &'a str,
    pub amount: i64,
    pub order_id: &'a str,
    pub order_name: &'a str,
    pub customer_email: &'a str,
}

#[derive(Debug, Clone)]
pub struct ChargeResult {
    pub payment_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TossClient {
    http: reqwest::Client,
    authorization: String,
    base_url: String,
}

impl TossClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let secret = settings.require_toss_secret_key()?;
        let base_url =
            std::env::var("TOSS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(secret, base_url)
    }

    pub fn new(secret_key: &str, base_url: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            http,
            authorization: basic_auth_header(secret_key),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> anyhow::Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let res = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .json(body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Toss request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to read Toss response body")?;
        let json = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        if !status.is_success() {
            tracing::warn!(%status, path, detail = %json, "Toss API rejected request");
            return Err(TossRejection {
                status: status.as_u16(),
                detail: json,
            }
            .into());
        }
        Ok(json)
    }

    pub async fn issue_billing_key(
        &self,
        auth_key: &str,
        customer_key: &str,
    ) -> anyhow::Result<BillingAuthorization> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct IssueRequest<'a> {
            auth_key: &'a str,
            customer_key: &'a str,
        }

        let json = self
            .post_json(
                "/v1/billing/authorizations/issue",
                &IssueRequest {
                    auth_key,
                    customer_key,
                },
            )
            .await?;
        let parsed = serde_json::from_value::<IssueResponse>(json)
            .context("failed to decode Toss billing key response")?;
        Ok(BillingAuthorization {
            billing_key: parsed.billing_key,
            customer_key: customer_key.to_string(),
            card: parsed.card.unwrap_or_else(|| Value::Object(Default::default())),
        })
    }

    pub async fn charge(
        &self,
        billing_key: &str,
        req: &ChargeRequest<'_>,
    ) -> anyhow::Result<ChargeResult> {
        let path = format!("/v1/billing/{billing_key}");
        let json = self.post_json(&path, req).await?;
        let payment_key = json
            .get("paymentKey")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(ChargeResult { payment_key })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueResponse {
    billing_key: String,
    #[serde(default)]
    card: Option<Value>,
}

pub fn basic_auth_header(secret_key: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{secret_key}:")))
}
