use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    routes::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Credentialed CORS for the configured front-end origins. Unparseable origins are skipped.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Duration;
    use didim_core::auth::{JwtKeys, TokenKind};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const TEST_SECRET: &str = "router-test-secret-with-at-least-32-chars";

    fn keys() -> JwtKeys {
        JwtKeys::new(TEST_SECRET, Duration::minutes(5), Duration::days(1))
    }

    fn app() -> Router {
        build_router(AppState::new(keys()))
    }

    async fn read_json(res: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn survey_body(q4_knowledge: i64) -> String {
        json!({
            "savings": 1_000_000,
            "investment": 500_000,
            "income": 3_000_000,
            "q2_goal": 1,
            "q3_period": 2,
            "q4_knowledge": q4_knowledge,
            "q5_experience": 1,
            "q6_expected_return": 2,
            "q7_risk_tolerance": 2,
            "q8_monthly_saving": 1,
            "q9_loss_reaction": 1,
            "q10_interest": 0
        })
        .to_string()
    }

    #[tokio::test]
    async fn healthz_is_ok_without_database() {
        let res = app()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn protected_route_without_token_is_unauthorized() {
        let res = app()
            .oneshot(
                Request::builder()
                    .uri("/api/stocks/watchlist/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(read_json(res).await["error"].is_string());
    }

    #[tokio::test]
    async fn refresh_token_cannot_authenticate_requests() {
        let refresh = keys().issue(1, TokenKind::Refresh).unwrap();
        let res = app()
            .oneshot(
                Request::builder()
                    .uri("/api/ai/survey/")
                    .header("authorization", format!("Bearer {refresh}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn out_of_range_survey_answer_is_bad_request() {
        let token = keys().issue(7, TokenKind::Access).unwrap();
        let res = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/ai/survey/")
                    .header("content-type", "application/json")
                    .header("cookie", format!("didim-auth={token}"))
                    .body(Body::from(survey_body(9)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = read_json(res).await;
        assert!(body["error"].as_str().unwrap().contains("q4_knowledge"));
    }

    #[tokio::test]
    async fn valid_survey_without_database_is_unavailable() {
        let token = keys().issue(7, TokenKind::Access).unwrap();
        let res = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/ai/survey/")
                    .header("content-type", "application/json")
                    .header("cookie", format!("didim-auth={token}"))
                    .body(Body::from(survey_body(2)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn public_route_in_degraded_mode_is_unavailable() {
        let res = app()
            .oneshot(
                Request::builder()
                    .uri("/api/stocks/search/?q=samsung")
                    .header("authorization", "Bearer not-a-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn empty_search_needs_no_database() {
        let res = app()
            .oneshot(
                Request::builder()
                    .uri("/api/stocks/search/?q=")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(read_json(res).await, json!([]));
    }

    #[tokio::test]
    async fn signup_rejects_mismatched_passwords_before_touching_database() {
        let res = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/accounts/signup/")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({
                            "email": "a@example.com",
                            "password1": "longenough1",
                            "password2": "longenough2",
                            "first_name": "",
                            "last_name": ""
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signup_rejects_short_password_in_korean() {
        let res = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/accounts/signup/")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({
                            "email": "a@example.com",
                            "password1": "abc12",
                            "password2": "abc12",
                            "first_name": "",
                            "last_name": ""
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = read_json(res).await;
        assert!(body["error"].as_str().unwrap().contains("비밀번호가 너무 짧습니다"));
    }

    #[tokio::test]
    async fn logout_clears_both_cookies() {
        let res = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/accounts/logout/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cookies: Vec<_> = res
            .headers()
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }
}
