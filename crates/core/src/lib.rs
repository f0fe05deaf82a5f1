pub mod ai;
pub mod auth;
pub mod domain;
pub mod ingest;
pub mod llm;
pub mod naver;
pub mod payments;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    const DEFAULT_ACCESS_TTL_MINUTES: i64 = 60;
    const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;
    const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub jwt_secret: Option<String>,
        pub jwt_access_ttl_minutes: i64,
        pub jwt_refresh_ttl_days: i64,
        pub cors_allowed_origins: Vec<String>,
        pub krx_api_key: Option<String>,
        pub fss_api_key: Option<String>,
        pub gemini_api_key: Option<String>,
        pub naver_client_id: Option<String>,
        pub naver_client_secret: Option<String>,
        pub toss_secret_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let jwt_access_ttl_minutes =
                parse_env_or("JWT_ACCESS_TTL_MINUTES", DEFAULT_ACCESS_TTL_MINUTES)?;
            let jwt_refresh_ttl_days =
                parse_env_or("JWT_REFRESH_TTL_DAYS", DEFAULT_REFRESH_TTL_DAYS)?;
            anyhow::ensure!(jwt_access_ttl_minutes > 0, "JWT_ACCESS_TTL_MINUTES must be > 0");
            anyhow::ensure!(jwt_refresh_ttl_days > 0, "JWT_REFRESH_TTL_DAYS must be > 0");

            let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                jwt_secret: std::env::var("JWT_SECRET").ok(),
                jwt_access_ttl_minutes,
                jwt_refresh_ttl_days,
                cors_allowed_origins,
                krx_api_key: std::env::var("KRX_API_KEY").ok(),
                fss_api_key: std::env::var("FSS_API_KEY").ok(),
                gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
                naver_client_id: std::env::var("NAVER_CLIENT_ID").ok(),
                naver_client_secret: std::env::var("NAVER_CLIENT_SECRET").ok(),
                toss_secret_key: std::env::var("TOSS_SECRET_KEY").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_jwt_secret(&self) -> anyhow::Result<&str> {
            self.jwt_secret.as_deref().context("JWT_SECRET is required")
        }

        pub fn require_krx_api_key(&self) -> anyhow::Result<&str> {
            self.krx_api_key.as_deref().context("KRX_API_KEY is required")
        }

        pub fn require_fss_api_key(&self) -> anyhow::Result<&str> {
            self.fss_api_key.as_deref().context("FSS_API_KEY is required")
        }

        pub fn require_gemini_api_key(&self) -> anyhow::Result<&str> {
            self.gemini_api_key
                .as_deref()
                .context("GEMINI_API_KEY is required")
        }

        pub fn require_naver_credentials(&self) -> anyhow::Result<(&str, &str)> {
            let id = self
                .naver_client_id
                .as_deref()
                .context("NAVER_CLIENT_ID is required")?;
            let secret = self
                .naver_client_secret
                .as_deref()
                .context("NAVER_CLIENT_SECRET is required")?;
            Ok((id, secret))
        }

        pub fn require_toss_secret_key(&self) -> anyhow::Result<&str> {
            self.toss_secret_key
                .as_deref()
                .context("TOSS_SECRET_KEY is required")
        }
    }

    fn parse_env_or(key: &str, default: i64) -> anyhow::Result<i64> {
        match std::env::var(key) {
            Ok(v) => v
                .trim()
                .parse::<i64>()
                .with_context(|| format!("{key} must be an integer (got {v:?})")),
            Err(_) => Ok(default),
        }
    }
}
