#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use mobius::auth::create_jwt;
use mobius::models::Message;
use mobius::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use mobius::repo::inmem::InMemRepo;
use mobius::{config, AppState};
use serde_json::json;
use std::collections::HashSet;
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

#[actix_web::test]
async fn topic_sample_offers_four_distinct_themes() {
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(app_state())).configure(config),
    )
    .await;

    for _ in 0..5 {
        let resp = call!(app, test::TestRequest::get().uri("/api/v1/topics/sample"));
        assert_eq!(resp.status(), 200);
        let offers: Vec<serde_json::Value> = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(offers.len(), 4);
        let themes: HashSet<String> = offers
            .iter()
            .map(|o| o["theme"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(themes.len(), 4);
        for offer in &offers {
            assert_eq!(offer["prompts"].as_array().unwrap().len(), 3);
        }
    }
}

#[actix_web::test]
async fn prompt_rotation_wraps_modulo_three() {
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(app_state())).configure(config),
    )
    .await;

    let mut prompts = Vec::new();
    for index in [0, 1, 2, 3] {
        let resp = call!(app, test::TestRequest::get()
            .uri(&format!("/api/v1/topics/%E7%8C%AB/prompt/{index}")));
        assert_eq!(resp.status(), 200);
        let card: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(card["theme"], "猫");
        prompts.push(card["prompt"].as_str().unwrap().to_string());
    }
    // index 3 wraps back onto card 0
    assert_eq!(prompts[3], prompts[0]);
    assert_ne!(prompts[0], prompts[1]);

    let resp = call!(app, test::TestRequest::get().uri("/api/v1/topics/nope/prompt/0"));
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn first_themed_message_wins_and_later_selections_lose() {
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(app_state())).configure(config),
    )
    .await;
    register!(app, "aoi");
    register!(app, "beni");
    let a = token("aoi");
    let b = token("beni");

    // unthemed so far
    let resp = call!(app, test::TestRequest::get()
        .uri("/api/v1/chat/beni")
        .insert_header(("Authorization", format!("Bearer {a}"))));
    let view: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(view["theme"].is_null());
    assert!(view["prompts"].is_null());

    // A picked 猫 locally and sends the first message: that append makes the
    // theme durable
    let resp = call!(app, test::TestRequest::post()
        .uri("/api/v1/chat/beni/messages")
        .insert_header(("Authorization", format!("Bearer {a}")))
        .set_json(&json!({"body": "hello", "theme": "猫"})));
    assert_eq!(resp.status(), 201);
    let msg: Message = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(msg.theme.as_deref(), Some("猫"));

    // B had independently picked ゲーム but sent nothing before A; B's send
    // is still tagged 猫 by inference from the log
    let resp = call!(app, test::TestRequest::post()
        .uri("/api/v1/chat/aoi/messages")
        .insert_header(("Authorization", format!("Bearer {b}")))
        .set_json(&json!({"body": "hi", "theme": "ゲーム"})));
    assert_eq!(resp.status(), 201);
    let msg: Message = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(msg.theme.as_deref(), Some("猫"));

    // untagged traffic leaves the theme untouched, and the view carries the
    // theme's three prompt cards
    let resp = call!(app, test::TestRequest::post()
        .uri("/api/v1/chat/aoi/messages")
        .insert_header(("Authorization", format!("Bearer {b}")))
        .set_json(&json!({"body": "no tag"})));
    assert_eq!(resp.status(), 201);
    let resp = call!(app, test::TestRequest::get()
        .uri("/api/v1/chat/beni")
        .insert_header(("Authorization", format!("Bearer {a}"))));
    let view: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(view["theme"], "猫");
    assert_eq!(view["prompts"].as_array().unwrap().len(), 3);
}

#[actix_web::test]
async fn chat_message_validation() {
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(app_state())).configure(config),
    )
    .await;
    register!(app, "aoi");
    register!(app, "beni");
    let a = token("aoi");

    // a theme outside the fixed catalog is rejected
    let resp = call!(app, test::TestRequest::post()
        .uri("/api/v1/chat/beni/messages")
        .insert_header(("Authorization", format!("Bearer {a}")))
        .set_json(&json!({"body": "hello", "theme": "円周率"})));
    assert_eq!(resp.status(), 422);

    // whitespace-only bodies never reach the log
    let resp = call!(app, test::TestRequest::post()
        .uri("/api/v1/chat/beni/messages")
        .insert_header(("Authorization", format!("Bearer {a}")))
        .set_json(&json!({"body": " \r\n "})));
    assert_eq!(resp.status(), 422);

    // messaging an unknown handle
    let resp = call!(app, test::TestRequest::post()
        .uri("/api/v1/chat/ghost/messages")
        .insert_header(("Authorization", format!("Bearer {a}")))
        .set_json(&json!({"body": "hello"})));
    assert_eq!(resp.status(), 404);

    // nothing durable happened: conversation is still empty and unthemed
    let resp = call!(app, test::TestRequest::get()
        .uri("/api/v1/chat/beni")
        .insert_header(("Authorization", format!("Bearer {a}"))));
    let view: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(view["message_count"], 0);
    assert!(view["theme"].is_null());
}
