#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use mobius::auth::create_jwt;
use mobius::models::{Message, Thread};
use mobius::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use mobius::repo::inmem::InMemRepo;
use mobius::{config, AppState};
use serde_json::json;
use std::sync::Arc;

fn ensure_secret() {
    if std::env::var("JWT_SECRET").is_err() {
        std::env::set_var("JWT_SECRET", "integration-test-secret-0123456789abcdef");
    }
}

fn app_state() -> AppState {
    ensure_secret();
    std::env::set_var("MOBIUS_DATA_DIR", tempfile::tempdir().unwrap().path());
    AppState {
        repo: Arc::new(InMemRepo::new()),
        admin_handle: "admin".into(),
        rate: RateLimiterFacade::new(InMemoryRateLimiter::new(false), RateLimitConfig::from_env()),
    }
}

fn token(handle: &str) -> String {
    ensure_secret();
    create_jwt(handle).unwrap()
}

macro_rules! call {
    ($app:expr, $req:expr) => {
        test::call_service(&mut $app, $req.to_request()).await
    };
}

macro_rules! register {
    ($app:expr, $handle:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/register")
            .set_json(&json!({"handle": $handle, "password": "pw-for-tests"}))
            .to_request();
        let resp = test::call_service(&mut $app, req).await;
        assert_eq!(resp.status(), 201);
    }};
}

#[actix_rt::test]
async fn admin_deletes_messages_and_purges_threads() {
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(app_state())).configure(config),
    )
    .await;
    register!(app, "poster");
    register!(app, "admin");
    let user = token("poster");
    let admin = token("admin");

    // thread with two posts
    let resp = call!(app, test::TestRequest::post()
        .uri("/api/v1/threads")
        .insert_header(("Authorization", format!("Bearer {user}")))
        .set_json(&json!({"title": "荒れたスレ"})));
    let thread: Thread = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let mut ids = Vec::new();
    for body in ["keep me", "delete me"] {
        let resp = call!(app, test::TestRequest::post()
            .uri(&format!("/api/v1/threads/{}/messages", thread.id))
            .insert_header(("Authorization", format!("Bearer {user}")))
            .set_json(&json!({"body": body})));
        let msg: Message = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        ids.push(msg.id);
    }

    // authority is handle equality, so the poster is turned away
    let resp = call!(app, test::TestRequest::delete()
        .uri(&format!("/api/v1/admin/messages/{}", ids[1]))
        .insert_header(("Authorization", format!("Bearer {user}"))));
    assert_eq!(resp.status(), 403);

    // admin removes one message
    let resp = call!(app, test::TestRequest::delete()
        .uri(&format!("/api/v1/admin/messages/{}", ids[1]))
        .insert_header(("Authorization", format!("Bearer {admin}"))));
    assert_eq!(resp.status(), 204);
    // gone is gone
    let resp = call!(app, test::TestRequest::delete()
        .uri(&format!("/api/v1/admin/messages/{}", ids[1]))
        .insert_header(("Authorization", format!("Bearer {admin}"))));
    assert_eq!(resp.status(), 404);

    let resp = call!(app, test::TestRequest::get()
        .uri(&format!("/api/v1/threads/{}/messages", thread.id)));
    let feed: Vec<Message> = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].body, "keep me");

    // purge the rest of the history
    let resp = call!(app, test::TestRequest::delete()
        .uri(&format!("/api/v1/admin/threads/{}/messages", thread.id))
        .insert_header(("Authorization", format!("Bearer {admin}"))));
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["purged"], 1);

    let resp = call!(app, test::TestRequest::get()
        .uri(&format!("/api/v1/threads/{}/messages", thread.id)));
    let feed: Vec<Message> = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(feed.is_empty());

    // purging a thread that never existed
    let resp = call!(app, test::TestRequest::delete()
        .uri("/api/v1/admin/threads/4242/messages")
        .insert_header(("Authorization", format!("Bearer {admin}"))));
    assert_eq!(resp.status(), 404);
}

#[actix_rt::test]
async fn admin_identity_listing_hides_digests() {
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(app_state())).configure(config),
    )
    .await;
    register!(app, "admin");
    register!(app, "someone");
    let admin = token("admin");
    let user = token("someone");

    let resp = call!(app, test::TestRequest::get()
        .uri("/api/v1/admin/identities")
        .insert_header(("Authorization", format!("Bearer {user}"))));
    assert_eq!(resp.status(), 403);

    let resp = call!(app, test::TestRequest::get()
        .uri("/api/v1/admin/identities")
        .insert_header(("Authorization", format!("Bearer {admin}"))));
    assert_eq!(resp.status(), 200);
    let raw = test::read_body(resp).await;
    let listed: Vec<serde_json::Value> = serde_json::from_slice(&raw).unwrap();
    let handles: Vec<&str> = listed.iter().map(|i| i["handle"].as_str().unwrap()).collect();
    assert_eq!(handles, vec!["admin", "someone"]);
    // credential digests must never leave the store
    assert!(!String::from_utf8_lossy(&raw).contains("digest"));
}
