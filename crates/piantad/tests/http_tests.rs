//! Router tests: secrets, request validation, chat and ingest flows.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use piantad::config::DaemonConfig;
use piantad::{router, AppState, MemoryStore, PlantStore, ScriptedModel};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const MODEL_OUTPUT: &str = r#"{"decision":{"water":"wait","light":"ok","urgency":"low","confidence":0.8},"motivation":{"summary":"Sto bene."}}"#;

fn app(store: MemoryStore, model: ScriptedModel, configure: impl FnOnce(&mut DaemonConfig)) -> Router {
    let mut config = DaemonConfig::default();
    config.llm.model = "primary".into();
    configure(&mut config);
    router(AppState::new(config, Arc::new(store), Arc::new(model)))
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let app = app(MemoryStore::new(), ScriptedModel::new(), |_| {});
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_chat_invalid_json_and_missing_message() {
    let model = ScriptedModel::new().reply("primary", MODEL_OUTPUT);
    let (status, body) = send(app(MemoryStore::new(), model.clone(), |_| {}), post("/chat", "{nope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid JSON");

    let (status, body) = send(app(MemoryStore::new(), model.clone(), |_| {}), post("/chat", r#"{"message":"  "}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing message");
    assert!(model.calls().is_empty());
}

#[tokio::test]
async fn test_chat_secret_enforced_only_when_configured() {
    let model = ScriptedModel::new().reply("primary", MODEL_OUTPUT);
    let locked = app(MemoryStore::new(), model.clone(), |c| c.auth.chat_secret = "s3cret".into());
    let (status, body) = send(locked, post("/chat", r#"{"message":"ciao"}"#)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let locked = app(MemoryStore::new(), model.clone(), |c| c.auth.chat_secret = "s3cret".into());
    let mut request = post("/chat", r#"{"message":"ciao"}"#);
    request
        .headers_mut()
        .insert("x-chat-secret", "s3cret".parse().unwrap());
    let (status, _) = send(locked, request).await;
    assert_eq!(status, StatusCode::OK);

    let open = app(MemoryStore::new(), model, |_| {});
    let (status, _) = send(open, post("/chat", r#"{"message":"ciao"}"#)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_chat_reply_fields_and_persistence() {
    let store = MemoryStore::new();
    let model = ScriptedModel::new().reply("primary", MODEL_OUTPUT);
    let body = json!({
        "message": "Sei ancora viva?",
        "plant_id": "p1",
        "plant": {"name": "Pepe", "type": "peperoncino"},
        "reading": {"moisture": 45, "lux": 5000}
    });
    let (status, out) = send(app(store.clone(), model, |_| {}), post("/chat", &body.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    let reply = out["reply"].as_str().unwrap();
    assert!(reply.starts_with("Risposta: Si, sono viva."), "{}", reply);
    assert_eq!(out["confidence"], 0.8);
    assert_eq!(out["needs_photo"], false);
    assert!(out.get("follow_up_due_at").is_some());

    assert_eq!(store.message_count(), 2);
    let audit = &store.decisions()[0];
    assert_eq!(audit["reading"]["moisture"], 45.0);
}

#[tokio::test]
async fn test_chat_model_failure_is_bad_gateway() {
    let (status, body) = send(
        app(MemoryStore::new(), ScriptedModel::new(), |_| {}),
        post("/chat", r#"{"message":"ciao"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Anthropic error");
    assert!(body["detail"].as_str().unwrap().contains("primary"));
}

#[tokio::test]
async fn test_chat_rejects_unsupported_image() {
    let body = json!({
        "message": "Guarda",
        "images": [{"media_type": "image/bmp", "data": "AAAA"}]
    });
    let model = ScriptedModel::new().reply("primary", MODEL_OUTPUT);
    let (status, _) = send(app(MemoryStore::new(), model.clone(), |_| {}), post("/chat", &body.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(model.calls().is_empty());
}

#[tokio::test]
async fn test_ingest_flow() {
    let store = MemoryStore::new();
    let secret = |c: &mut DaemonConfig| c.auth.ingest_secret = "dev".into();

    let (status, _) = send(
        app(store.clone(), ScriptedModel::new(), secret),
        post("/ingest", r#"{"plant_id":"p1","moisture":40,"lux":900}"#),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut request = post("/ingest", r#"{"plant_id":"p1","moisture":"40","lux":900,"temperature":21.5}"#);
    request
        .headers_mut()
        .insert("x-ingest-secret", "dev".parse().unwrap());
    let (status, body) = send(app(store.clone(), ScriptedModel::new(), secret), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["data"][0]["id"], 1);

    let readings = store.recent_readings("p1", 5).await.unwrap();
    assert_eq!(readings[0].moisture(), Some(40.0));
    assert_eq!(readings[0].temperature(), Some(21.5));
}

#[tokio::test]
async fn test_ingest_validation_messages() {
    let cases = [
        (r#"{"plant_id":"p1","moisture":"wet","lux":1}"#, "moisture and lux must be numbers"),
        (r#"{"plant_id":"p1","moisture":1,"lux":1,"temperature":"hot"}"#, "temperature must be a number"),
        (r#"{"plant_id":" ","moisture":1,"lux":1}"#, "plant_id is required"),
        ("not json", "Invalid JSON"),
    ];
    for (payload, expected) in cases {
        let (status, body) = send(
            app(MemoryStore::new(), ScriptedModel::new(), |_| {}),
            post("/ingest", payload),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", payload);
        assert_eq!(body["error"], expected);
    }
}
