//! End-to-end checks against a real Postgres. Skipped unless TEST_DATABASE_URL is set.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Duration;
use didim_api::{build_router, AppState};
use didim_core::auth::{JwtKeys, TokenKind};
use didim_core::domain::user::NewUser;
use didim_core::payments::TossClient;
use didim_core::storage::users::{self, UserWrite};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

const TEST_SECRET: &str = "contract-test-secret-with-at-least-32-chars";

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect TEST_DATABASE_URL");
    didim_core::storage::migrate(&pool).await.expect("migrate");
    Some(pool)
}

fn keys() -> JwtKeys {
    JwtKeys::new(TEST_SECRET, Duration::minutes(5), Duration::days(1))
}

fn state(pool: &PgPool) -> AppState {
    let mut state = AppState::new(keys());
    state.pool = Some(pool.clone());
    state
}

fn app(pool: &PgPool) -> Router {
    build_router(state(pool))
}

fn app_with_toss(pool: &PgPool, toss_base_url: String) -> Router {
    let mut state = state(pool);
    state.toss = Some(TossClient::new("test_sk", toss_base_url).unwrap());
    build_router(state)
}

fn unique(prefix: &str) -> String {
    format!("{prefix}{}", &uuid::Uuid::new_v4().simple().to_string()[..10])
}

async fn insert_stock(pool: &PgPool, name: &str) -> String {
    let ticker = unique("T");
    sqlx::query(
        "INSERT INTO stocks (ticker, name, asset_type, market_type) \
         VALUES ($1, $2, 'STOCK', 'KOSPI')",
    )
    .bind(&ticker)
    .bind(name)
    .execute(pool)
    .await
    .unwrap();
    ticker
}

/// Inserts a deposit product with one 12-month option and returns (product_id, option_id).
async fn insert_product(pool: &PgPool, name: &str) -> (i64, i64) {
    let product_id: i64 = sqlx::query_scalar(
        "INSERT INTO deposit_products (fin_co_no, fin_prdt_cd, kor_co_nm, fin_prdt_nm) \
         VALUES ($1, $2, '테스트은행', $3) RETURNING id",
    )
    .bind(unique("C"))
    .bind(unique("P"))
    .bind(name)
    .fetch_one(pool)
    .await
    .unwrap();
    let option_id: i64 = sqlx::query_scalar(
        "INSERT INTO deposit_options (product_id, intr_rate_type, save_trm, intr_rate, intr_rate2) \
         VALUES ($1, 'S', 12, 3.10, 3.50) RETURNING id",
    )
    .bind(product_id)
    .fetch_one(pool)
    .await
    .unwrap();
    (product_id, option_id)
}

async fn insert_plan(pool: &PgPool) -> i64 {
    sqlx::query_scalar("INSERT INTO plans (name, price) VALUES ('Premium', 4900) RETURNING id")
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn insert_subscription(pool: &PgPool, user_id: i64, plan_id: Option<i64>) {
    sqlx::query(
        "INSERT INTO subscriptions (user_id, plan_id, status, started_at, expires_at) \
         VALUES ($1, $2, 'active', now(), now() + interval '10 days')",
    )
    .bind(user_id)
    .bind(plan_id)
    .execute(pool)
    .await
    .unwrap();
}

async fn create_user(pool: &PgPool, nickname: &str) -> i64 {
    let email = format!("{}@example.com", uuid::Uuid::new_v4().simple());
    let new_user = NewUser {
        username: email.clone(),
        email,
        password_hash: None,
        first_name: String::new(),
        last_name: String::new(),
        nickname: Some(format!("{nickname}-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])),
    };
    match users::create_user(pool, &new_user).await.expect("create user") {
        UserWrite::Saved(user) => user.id,
        UserWrite::Conflict(c) => panic!("unexpected conflict: {c:?}"),
    }
}

fn authed(method: &str, uri: &str, user_id: i64, body: Option<Value>) -> Request<Body> {
    let token = keys().issue(user_id, TokenKind::Access).unwrap();
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("cookie", format!("didim-auth={token}"));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn read_json(res: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn creating_a_post_returns_created_with_author() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let author = create_user(&pool, "writer").await;

    let res = app(&pool)
        .oneshot(authed(
            "POST",
            "/api/community/posts/",
            author,
            Some(json!({ "content": "첫 글입니다" })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = read_json(res).await;
    assert_eq!(body["author"]["pk"], author);
    assert_eq!(body["content"], "첫 글입니다");
    assert_eq!(body["like_count"], 0);
    assert_eq!(body["is_owner"], true);
}

#[tokio::test]
async fn liking_twice_toggles() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let author = create_user(&pool, "author").await;
    let fan = create_user(&pool, "fan").await;

    let res = app(&pool)
        .oneshot(authed(
            "POST",
            "/api/community/posts/",
            author,
            Some(json!({ "content": "좋아요 테스트" })),
        ))
        .await
        .unwrap();
    let post_id = read_json(res).await["id"].as_i64().unwrap();
    let like_uri = format!("/api/community/posts/{post_id}/like/");

    let res = app(&pool).oneshot(authed("POST", &like_uri, fan, None)).await.unwrap();
    let first = read_json(res).await;
    assert_eq!(first, json!({ "is_liked": true, "like_count": 1 }));

    let res = app(&pool).oneshot(authed("POST", &like_uri, fan, None)).await.unwrap();
    let second = read_json(res).await;
    assert_eq!(second, json!({ "is_liked": false, "like_count": 0 }));
}

#[tokio::test]
async fn editing_someone_elses_post_is_forbidden() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let author = create_user(&pool, "owner").await;
    let other = create_user(&pool, "other").await;

    let res = app(&pool)
        .oneshot(authed(
            "POST",
            "/api/community/posts/",
            author,
            Some(json!({ "content": "원본" })),
        ))
        .await
        .unwrap();
    let post_id = read_json(res).await["id"].as_i64().unwrap();

    let res = app(&pool)
        .oneshot(authed(
            "PATCH",
            &format!("/api/community/posts/{post_id}/"),
            other,
            Some(json!({ "content": "수정" })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn survey_upsert_keeps_one_row_per_user() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool, "saver").await;
    let answers = |q3: i64| {
        json!({
            "savings": 100, "investment": 0, "income": 200,
            "q2_goal": 0, "q3_period": q3, "q4_knowledge": 0, "q5_experience": 0,
            "q6_expected_return": 0, "q7_risk_tolerance": 0, "q8_monthly_saving": 0,
            "q9_loss_reaction": 0, "q10_interest": 0
        })
    };

    let first = app(&pool)
        .oneshot(authed("POST", "/api/ai/survey/", user, Some(answers(0))))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = read_json(first).await;

    let second = read_json(
        app(&pool)
            .oneshot(authed("POST", "/api/ai/survey/", user, Some(answers(4))))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["q3_period"], 4);
    assert_eq!(second["risk_profile"], "안정형");
}

#[tokio::test]
async fn watchlist_add_is_idempotent_and_delete_reports_missing() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool, "watcher").await;
    let ticker = insert_stock(&pool, "디딤전자").await;
    let body = json!({ "ticker": ticker });

    let first = app(&pool)
        .oneshot(authed("POST", "/api/stocks/watchlist/", user, Some(body.clone())))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = read_json(first).await;
    assert_eq!(first["status"], "added");
    assert_eq!(first["message"], "디딤전자 추가됨");

    let second = app(&pool)
        .oneshot(authed("POST", "/api/stocks/watchlist/", user, Some(body)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(read_json(second).await["status"], "already_exists");

    let missing = app(&pool)
        .oneshot(authed("DELETE", "/api/stocks/watchlist/NOPE000/", user, None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let removed = app(&pool)
        .oneshot(authed("DELETE", &format!("/api/stocks/watchlist/{ticker}/"), user, None))
        .await
        .unwrap();
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn joining_with_foreign_option_stores_no_option_and_second_join_fails() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool, "joiner").await;
    let (product_id, _) = insert_product(&pool, "디딤 정기예금").await;
    let (_, foreign_option) = insert_product(&pool, "다른 적금").await;
    let uri = format!("/api/finance/products/{product_id}/join/");

    let res = app(&pool)
        .oneshot(authed(
            "POST",
            &uri,
            user,
            Some(json!({ "option_id": foreign_option, "memo": "월급 통장" })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = read_json(res).await;
    assert!(body["data"]["option"].is_null());
    assert_eq!(body["data"]["product"]["id"], product_id);

    let stored: Option<i64> = sqlx::query_scalar(
        "SELECT option_id FROM user_products WHERE user_id = $1 AND product_id = $2",
    )
    .bind(user)
    .bind(product_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(stored, None);

    let again = app(&pool)
        .oneshot(authed("POST", &uri, user, Some(json!({}))))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_without_subscription_is_not_found() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool, "nosub").await;

    let res = app(&pool)
        .oneshot(authed("POST", "/api/subscriptions/cancel/", user, None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancelling_twice_is_rejected() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool, "canceller").await;
    insert_subscription(&pool, user, None).await;

    let first = app(&pool)
        .oneshot(authed("POST", "/api/subscriptions/cancel/", user, None))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let body = read_json(first).await;
    assert_eq!(body["success"], true);
    assert!(body["expires_at"].is_string());

    let second = app(&pool)
        .oneshot(authed("POST", "/api/subscriptions/cancel/", user, None))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(second).await["error"], "이미 취소된 구독입니다.");
}

#[tokio::test]
async fn subscribing_while_active_is_rejected() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool, "subscriber").await;
    let plan_id = insert_plan(&pool).await;
    insert_subscription(&pool, user, Some(plan_id)).await;

    // Never contacted: the active subscription is checked first.
    let res = app_with_toss(&pool, "http://127.0.0.1:9".to_string())
        .oneshot(authed(
            "POST",
            "/api/subscriptions/subscribe/",
            user,
            Some(json!({ "billingKey": "bk", "customerKey": "ck", "planId": plan_id })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(res).await["error"], "이미 구독 중입니다.");
}

#[tokio::test]
async fn rejected_charge_records_failed_payment() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool, "declined").await;
    let plan_id = insert_plan(&pool).await;

    let mut toss = mockito::Server::new_async().await;
    let charge = toss
        .mock("POST", "/v1/billing/bk_declined")
        .with_status(400)
        .with_body(json!({ "code": "REJECT_CARD_COMPANY", "message": "한도 초과" }).to_string())
        .create_async()
        .await;

    let res = app_with_toss(&pool, toss.url())
        .oneshot(authed(
            "POST",
            "/api/subscriptions/subscribe/",
            user,
            Some(json!({ "billingKey": "bk_declined", "customerKey": "ck", "planId": plan_id })),
        ))
        .await
        .unwrap();
    charge.assert_async().await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = read_json(res).await;
    assert_eq!(body["error"], "결제 실패");
    assert_eq!(body["detail"]["code"], "REJECT_CARD_COMPANY");

    let payments = read_json(
        app(&pool)
            .oneshot(authed("GET", "/api/subscriptions/payments/", user, None))
            .await
            .unwrap(),
    )
    .await;
    let payments = payments.as_array().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["status"], "failed");
    assert_eq!(payments[0]["amount"], 4900);
    assert!(payments[0]["order_id"]
        .as_str()
        .unwrap()
        .starts_with(&format!("DIDIM_{user}_")));

    let subscribed: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM subscriptions WHERE user_id = $1)")
            .bind(user)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(!subscribed);
}

#[tokio::test]
async fn cached_analysis_is_served_without_llm() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let ticker = unique("A");
    let cached = json!({ "opinion": { "action": "관망", "title": "t", "reason": "r" } });
    sqlx::query("INSERT INTO stock_ai_analyses (ticker, data) VALUES ($1, $2)")
        .bind(&ticker)
        .bind(&cached)
        .execute(&pool)
        .await
        .unwrap();

    // No LLM configured on this state.
    let res = app(&pool)
        .oneshot(
            Request::builder()
                .uri(format!("/api/ai/analyze/{ticker}/"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(read_json(res).await, cached);

    let miss = app(&pool)
        .oneshot(
            Request::builder()
                .uri(format!("/api/ai/analyze/{}/", unique("A")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(miss.status(), StatusCode::SERVICE_UNAVAILABLE);
}
