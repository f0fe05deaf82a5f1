use crate::config::Settings;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_AUTH_BASE_URL: &str = "https://nid.naver.com";
const DEFAULT_API_BASE_URL: &str = "https://openapi.naver.com";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub const NEWS_DEFAULT_DISPLAY: u32 = 10;
pub const NEWS_MAX_DISPLAY: u32 = 100;

/// Failures the caller reports as a client error rather than a server fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NaverLoginError {
    TokenIssueFailed,
    ProfileLookupFailed,
}

impl std::fmt::Display for NaverLoginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NaverLoginError::TokenIssueFailed => write!(f, "네이버 토큰 발급 실패"),
            NaverLoginError::ProfileLookupFailed => write!(f, "네이버 프로필 조회 실패"),
        }
    }
}

impl std::error::Error for NaverLoginError {}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NaverProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

#[derive(Debug, Clone)]
pub struct NaverClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    auth_base_url: String,
    api_base_url: String,
}

impl NaverClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let (client_id, client_secret) = settings.require_naver_credentials()?;
        let auth_base_url = std::env::var("NAVER_AUTH_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_AUTH_BASE_URL.to_string());
        let api_base_url = std::env::var("NAVER_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        Self::new(
            client_id.to_string(),
            client_secret.to_string(),
            auth_base_url,
            api_base_url,
        )
    }

    pub fn new(
        client_id: String,
        client_secret: String,
        auth_base_url: String,
        api_base_url: String,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            http,
            client_id,
            client_secret,
            auth_base_url: auth_base_url.trim_end_matches('/').to_string(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn exchange_code(&self, code: &str, state: Option<&str>) -> anyhow::Result<String> {
        let url = format!("{}/oauth2.0/token", self.auth_base_url);
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
        ];
        if let Some(state) = state {
            form.push(("state", state));
        }

        let res = self
            .http
            .post(url)
            .form(&form)
            .send()
            .await
            .context("Naver token request failed")?;
        let status = res.status();
        let body: serde_json::Value = match res.json().await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%status, error = %err, "Naver token response is not JSON");
                return Err(NaverLoginError::TokenIssueFailed.into());
            }
        };

        match body.get("access_token").and_then(|v| v.as_str()) {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => {
                tracing::warn!(
                    %status,
                    error = body.get("error").and_then(|v| v.as_str()).unwrap_or(""),
                    "Naver token exchange returned no access_token"
                );
                Err(NaverLoginError::TokenIssueFailed.into())
            }
        }
    }

    pub async fn fetch_profile(&self, access_token: &str) -> anyhow::Result<NaverProfile> {
        let url = format!("{}/v1/nid/me", self.api_base_url);
        let res = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Naver profile request failed")?;
        let body: ProfileEnvelope = match res.json().await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "failed to decode Naver profile response");
                return Err(NaverLoginError::ProfileLookupFailed.into());
            }
        };
        if body.resultcode != "00" {
            tracing::warn!(resultcode = %body.resultcode, "Naver profile lookup rejected");
            return Err(NaverLoginError::ProfileLookupFailed.into());
        }
        body.response
            .filter(|p| !p.id.is_empty())
            .ok_or_else(|| NaverLoginError::ProfileLookupFailed.into())
    }

    pub async fn search_news(&self, query: &str, display: u32) -> anyhow::Result<Vec<NewsItem>> {
        let url = format!("{}/v1/search/news.json", self.api_base_url);
        let display = display.clamp(1, NEWS_MAX_DISPLAY).to_string();
        let res = self
            .http
            .get(url)
            .header("X-Naver-Client-Id", &self.client_id)
            .header("X-Naver-Client-Secret", &self.client_secret)
            .query(&[("query", query), ("display", display.as_str()), ("sort", "date")])
            .send()
            .await
            .context("Naver news request failed")?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            bail!("Naver news search failed: status={status} body={text}");
        }
        let body: NewsEnvelope = res
            .json()
            .await
            .context("failed to decode Naver news response")?;

        Ok(body
            .items
            .into_iter()
            .map(|item| NewsItem {
                title: strip_markup(&item.title),
                link: item.link,
                description: strip_markup(&item.description),
                pub_date: item.pub_date,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    #[serde(default)]
    resultcode: String,
    #[serde(default)]
    response: Option<NaverProfile>,
}

#[derive(Debug, Deserialize)]
struct NewsEnvelope {
    #[serde(default)]
    items: Vec<RawNewsItem>,
}

#[derive(Debug, Deserialize)]
struct RawNewsItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "pubDate")]
    pub_date: String,
}

/// Drops the `<b>` highlight tags and decodes the entities Naver emits.
pub fn strip_markup(s: &str) -> String {
    s.replace("<b>", "")
        .replace("</b>", "")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
