use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use aegis::config::Config;
use aegis::routes;
use aegis::state::AppState;

async fn test_app(dir: &std::path::Path) -> (Router, AppState) {
    let mut config = Config::for_data_dir(dir);
    config.auth.bcrypt_cost = 4;
    let state = AppState::build(config, None)
        .await
        .expect("Failed to build app state");
    (routes::router(state.clone()), state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/identity/register",
        Some(json!({"username": "ranger", "email": "ranger@example.org", "pin": "12345678"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn test_register_hides_credential() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _state) = test_app(temp_dir.path()).await;

    let body = register(&app).await;
    assert_eq!(body["username"], "ranger");
    assert!(body.get("credential").is_none());

    let (status, body) = send(&app, Method::GET, "/api/identity", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ranger@example.org");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _state) = test_app(temp_dir.path()).await;
    register(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/identity/register",
        Some(json!({"username": "ranger", "email": "x@example.org", "pin": "87654321"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_logout_then_login() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _state) = test_app(temp_dir.path()).await;
    register(&app).await;

    let (status, _) = send(&app, Method::POST, "/api/identity/logout", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::GET, "/api/identity", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "not_authenticated");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/identity/login",
        Some(json!({"username": "ranger", "pin": "11111111"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/identity/login",
        Some(json!({"username": "ranger", "pin": "12345678"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "ranger");
}

#[tokio::test]
async fn test_submit_requires_identity() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = test_app(temp_dir.path()).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/reports",
        Some(json!({"type": "Fire", "severity": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "not_authenticated");
    assert_eq!(state.reconciler.refresh_view().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_submit_and_list_reports() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _state) = test_app(temp_dir.path()).await;
    register(&app).await;

    let (status, first) = send(
        &app,
        Method::POST,
        "/api/reports",
        Some(json!({
            "type": "Fire",
            "severity": 5,
            "notes": "visible smoke",
            "coordinates": {"latitude": -1.2921, "longitude": 36.8219}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["type"], "Fire");
    assert_eq!(first["syncState"], "pending_sync");
    assert_eq!(first["status"], "pending");
    assert_eq!(first["reporterUsername"], "ranger");

    let (status, second) = send(
        &app,
        Method::POST,
        "/api/reports",
        Some(json!({"type": "power line", "severity": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["type"], "PowerLine");

    let (status, listed) = send(&app, Method::GET, "/api/reports", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![second["id"].as_i64().unwrap(), first["id"].as_i64().unwrap()]
    );
}

#[tokio::test]
async fn test_submit_validation_errors() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _state) = test_app(temp_dir.path()).await;
    register(&app).await;

    let (status, body) = send(&app, Method::POST, "/api/reports", Some(json!({"severity": 3}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_type");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/reports",
        Some(json!({"type": "Flood", "severity": 9})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");

    let (_, listed) = send(&app, Method::GET, "/api/reports", None).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_form_style_payloads() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _state) = test_app(temp_dir.path()).await;
    register(&app).await;

    // The web form posts severity as text
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/reports",
        Some(json!({"type": "Fire", "severity": "5", "notes": "visible smoke"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["severity"], 5);

    // Malformed bodies use the same error shape as validation failures
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/reports",
        Some(json!({"type": "Fire", "severity": [5]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/connectivity",
        Some(json!({"online": "yes"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn test_status_and_sync_without_remote() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _state) = test_app(temp_dir.path()).await;
    register(&app).await;
    send(
        &app,
        Method::POST,
        "/api/reports",
        Some(json!({"type": "Landslide", "severity": 4})),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/connectivity",
        Some(json!({"online": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online"], true);

    // No remote configured: the pass runs but nothing leaves the device
    let (status, summary) = send(&app, Method::POST, "/api/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["delivered"], 0);
    assert_eq!(summary["pendingAfter"], 1);

    let (status, body) = send(&app, Method::GET, "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online"], true);
    assert_eq!(body["remoteConfigured"], false);
    assert_eq!(body["total"], 1);
    assert_eq!(body["pending"], 1);
    assert_eq!(body["synced"], 0);
}

#[tokio::test]
async fn test_deliver_unknown_report_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _state) = test_app(temp_dir.path()).await;

    let (status, body) = send(&app, Method::POST, "/api/reports/42/deliver", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_incident_types_table() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _state) = test_app(temp_dir.path()).await;

    let (status, body) = send(&app, Method::GET, "/api/incident-types", None).await;
    assert_eq!(status, StatusCode::OK);
    let types = body.as_array().unwrap();
    assert_eq!(types.len(), 5);
    assert_eq!(types[3]["type"], "PowerLine");
    assert_eq!(types[3]["label"], "Power Line");
    assert!(types.iter().all(|t| t["icon"].is_string() && t["color"].is_string()));
}
