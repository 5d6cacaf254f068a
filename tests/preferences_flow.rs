mod common;

use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use common::{body_json, TestApp};
use postpilot::history::DeliveryTrigger;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct PreferencesBody {
    user_id: String,
    email: String,
    industry: String,
    tone: String,
    template: String,
    temperature: f64,
    delivery_time: Option<String>,
    timezone: Option<String>,
    auto_generate: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[tokio::test]
async fn saved_preferences_round_trip() -> Result<()> {
    let app = TestApp::new();
    app.entitle("ada@example.com").await;
    let token = app.token("ada", "ada@example.com")?;

    let response = app
        .put_json(
            "/api/preferences",
            &json!({
                "industry": "Fintech",
                "tone": "conversational",
                "template": "numbered-list-style-linkedin-style",
                "temperature": 1.5,
                "delivery_time": "09:00",
                "timezone": "America/New_York",
                "auto_generate": true
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let saved: PreferencesBody = body_json(response).await?;
    assert_eq!(saved.temperature, 1.0);

    let response = app.get("/api/preferences", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let loaded: PreferencesBody = body_json(response).await?;
    assert_eq!(loaded.user_id, "ada");
    assert_eq!(loaded.email, "ada@example.com");
    assert_eq!(loaded.industry, "Fintech");
    assert_eq!(loaded.tone, "conversational");
    assert_eq!(loaded.template, "numbered-list-style-linkedin-style");
    assert_eq!(loaded.temperature, 1.0);
    assert_eq!(loaded.delivery_time.as_deref(), Some("09:00"));
    assert_eq!(loaded.timezone.as_deref(), Some("America/New_York"));
    assert!(loaded.auto_generate);
    Ok(())
}

#[tokio::test]
async fn legacy_template_without_style_defaults_to_x_style() -> Result<()> {
    let app = TestApp::new();
    app.entitle("ada@example.com").await;
    let token = app.token("ada", "ada@example.com")?;

    let response = app
        .put_json(
            "/api/preferences",
            &json!({ "industry": "Retail", "template": "tips-format" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let saved: PreferencesBody = body_json(response).await?;
    assert_eq!(saved.template, "tips-format-style-x-style");
    assert!(!saved.auto_generate);
    Ok(())
}

#[tokio::test]
async fn saving_requires_an_active_subscription() -> Result<()> {
    let app = TestApp::new();
    let token = app.token("bob", "bob@example.com")?;

    let response = app
        .put_json(
            "/api/preferences",
            &json!({ "industry": "Retail" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.get("/api/preferences", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn invalid_preferences_are_rejected() -> Result<()> {
    let app = TestApp::new();
    app.entitle("ada@example.com").await;
    let token = app.token("ada", "ada@example.com")?;

    let response = app
        .put_json(
            "/api/preferences",
            &json!({ "industry": "Retail", "template": "haiku-style-x-style" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = body_json(response).await?;
    assert!(body.error.contains("haiku"));

    let response = app
        .put_json(
            "/api/preferences",
            &json!({ "industry": "Retail", "auto_generate": true, "timezone": "Europe/Paris" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .put_json(
            "/api/preferences",
            &json!({ "industry": "Retail", "timezone": "Atlantis/Capital" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn preferences_require_a_valid_token() -> Result<()> {
    let app = TestApp::new();

    let response = app.get("/api/preferences", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/preferences", Some("not-a-jwt")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn force_send_today_dispatches_in_the_background() -> Result<()> {
    let app = TestApp::new();
    app.entitle("ada@example.com").await;
    let token = app.token("ada", "ada@example.com")?;

    let response = app
        .put_json(
            "/api/preferences",
            &json!({
                "industry": "Fintech",
                "delivery_time": "09:00",
                "timezone": "America/New_York",
                "auto_generate": true,
                "force_send_today": true
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let mut history = Vec::new();
    for _ in 0..100 {
        history = app.ledger.history().await;
        if !history.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].trigger, DeliveryTrigger::Forced);
    assert_eq!(app.mailer.sent().await.len(), 1);
    Ok(())
}
