use std::sync::Arc;

use didim_api::{build_router, cors_layer, AppState};
use didim_core::auth::JwtKeys;
use didim_core::config::Settings;
use didim_core::llm::gemini::GeminiClient;
use didim_core::llm::LlmClient;
use didim_core::naver::NaverClient;
use didim_core::payments::TossClient;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let mut state = AppState::new(JwtKeys::from_settings(&settings)?);
    state.pool = connect_db(&settings).await;
    state.llm = optional("gemini", GeminiClient::from_settings(&settings))
        .map(|c| Arc::new(c) as Arc<dyn LlmClient>);
    state.naver = optional("naver", NaverClient::from_settings(&settings));
    state.toss = optional("toss", TossClient::from_settings(&settings));

    let app = build_router(state).layer(cors_layer(&settings.cors_allowed_origins));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Starts without the database rather than failing; handlers answer 503.
async fn connect_db(settings: &Settings) -> Option<PgPool> {
    let db_url = match settings.require_database_url() {
        Ok(url) => url,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            return None;
        }
    };

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
            return None;
        }
    };

    match didim_core::storage::migrate(&pool).await {
        Ok(()) => Some(pool),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
            None
        }
    }
}

fn optional<T>(name: &str, client: anyhow::Result<T>) -> Option<T> {
    match client {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(client = name, error = %e, "client disabled");
            None
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
