#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use classlink::auth::{create_jwt, Role};
use classlink::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use classlink::repo::inmem::InMemRepo;
use classlink::routes::{config, AppState};
use classlink::session::SessionHub;
use classlink::storage::FsFileStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    std::env::set_var("CLASSLINK_DATA_DIR", tempfile::tempdir().unwrap().path());
}

/// Tight limits for the action under test, generous everywhere else.
fn tight_cfg() -> RateLimitConfig {
    RateLimitConfig {
        login_limit: 2,
        login_window: Duration::from_secs(300),
        message_limit: 1,
        message_window: Duration::from_secs(300),
        report_limit: 100,
        report_window: Duration::from_secs(300),
        upload_limit: 100,
        upload_window: Duration::from_secs(3600),
    }
}

fn state_with_limits(cfg: RateLimitConfig) -> AppState {
    AppState {
        repo: Arc::new(InMemRepo::new()),
        file_store: Arc::new(FsFileStore::new()),
        sessions: SessionHub::new(),
        limiter: RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg),
    }
}

#[actix_web::test]
#[serial_test::serial]
async fn login_attempts_are_throttled_per_email() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state_with_limits(tight_cfg())))
            .configure(config),
    )
    .await;

    // failures still consume the budget
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({"email": "sam@example.com", "password": "wrong"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({"email": "sam@example.com", "password": "wrong"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 429);

    // a different email has its own window
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({"email": "other@example.com", "password": "wrong"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
#[serial_test::serial]
async fn message_sends_are_throttled_per_user() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state_with_limits(tight_cfg())))
            .configure(config),
    )
    .await;

    let token = create_jwt("t-1", Role::Teacher, "sess-t1").unwrap();
    let body = json!({
        "receiver_id": "p-1",
        "receiver_name": "Sam",
        "content": "hello",
        "subject": null, "message_type": null, "student_name": null
    });

    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(&body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(&body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 429);

    // another sender is unaffected
    let other = create_jwt("t-2", Role::Teacher, "sess-t2").unwrap();
    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(("Authorization", format!("Bearer {other}")))
        .set_json(&body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
}

#[tokio::test]
async fn window_expiry_frees_slots() {
    let rl = InMemoryRateLimiter::new(true);
    let window = Duration::from_millis(50);
    assert!(rl.check("k", 1, window));
    assert!(!rl.check("k", 1, window));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(rl.check("k", 1, window));
}

#[std::prelude::v1::test]
fn disabled_limiter_never_blocks() {
    let rl = InMemoryRateLimiter::new(false);
    for _ in 0..100 {
        assert!(rl.check("k", 1, Duration::from_secs(300)));
    }
}
