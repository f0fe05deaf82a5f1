use std::sync::Arc;

use didim_core::auth::JwtKeys;
use didim_core::llm::LlmClient;
use didim_core::naver::NaverClient;
use didim_core::payments::TossClient;
use sqlx::PgPool;

use crate::error::ApiError;

/// Shared handler state. Every outbound dependency is optional so the server
/// can start without it; handlers that need a missing one answer 503.
#[derive(Clone)]
pub struct AppState {
    pub pool: Option<PgPool>,
    pub jwt: JwtKeys,
    pub llm: Option<Arc<dyn LlmClient>>,
    pub naver: Option<NaverClient>,
    pub toss: Option<TossClient>,
}

impl AppState {
    pub fn new(jwt: JwtKeys) -> Self {
        Self {
            pool: None,
            jwt,
            llm: None,
            naver: None,
            toss: None,
        }
    }

    pub fn db(&self) -> Result<&PgPool, ApiError> {
        self.pool
            .as_ref()
            .ok_or_else(|| ApiError::Unavailable("데이터베이스를 사용할 수 없습니다.".into()))
    }

    pub fn llm(&self) -> Result<&dyn LlmClient, ApiError> {
        self.llm
            .as_deref()
            .ok_or_else(|| ApiError::Unavailable("AI 서비스를 사용할 수 없습니다.".into()))
    }

    pub fn naver(&self) -> Result<&NaverClient, ApiError> {
        self.naver
            .as_ref()
            .ok_or_else(|| ApiError::Unavailable("네이버 연동이 설정되지 않았습니다.".into()))
    }

    pub fn toss(&self) -> Result<&TossClient, ApiError> {
        self.toss
            .as_ref()
            .ok_or_else(|| ApiError::Unavailable("결제 연동이 설정되지 않았습니다.".into()))
    }
}
