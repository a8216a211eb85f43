//! HTTP API integration tests

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use wasrv::client::{ClientEvent, MessagePayload};
use wasrv::routes::create_routes;
use wasrv::store::api_keys::{create_user, generate_key, insert_api_key, NewApiKey};
use wasrv::store::instances::{create_instance, STATUS_CONNECTED, STATUS_DISCONNECTED};
use wasrv::{AppConfig, AppState, DeviceLifecycleManager, Store};

mod common;
use common::{manager, wait_for, MockClient};

const BOUNDARY: &str = "wasrv-test-boundary";

struct TestApp {
    router: Router,
    client: Arc<MockClient>,
    manager: DeviceLifecycleManager,
    store: Store,
    key: String,
    _dir: tempfile::TempDir,
}

async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let client = MockClient::new();
    let manager = manager(client.clone(), dir.path(), Duration::from_millis(50));

    let store = Store::in_memory().await.unwrap();
    store.init_schema().await.unwrap();
    let user_id = create_user(store.pool(), "Zainab", "zainab@example.com")
        .await
        .unwrap();
    let key = generate_key();
    insert_api_key(
        store.pool(),
        user_id,
        &key,
        &NewApiKey {
            name: "integration".into(),
            cost: Some(4),
            ..NewApiKey::default()
        },
    )
    .await
    .unwrap();
    create_instance(store.pool(), user_id, "shop-1", "Shop", STATUS_CONNECTED)
        .await
        .unwrap();
    create_instance(store.pool(), user_id, "shop-old", "Old", STATUS_DISCONNECTED)
        .await
        .unwrap();

    let mut config = AppConfig::default();
    config.media.max_upload_bytes = 1024;
    let state = Arc::new(AppState::new(
        Arc::new(config),
        manager.clone(),
        store.clone(),
    ));

    TestApp {
        router: create_routes(state),
        client,
        manager,
        store,
        key,
        _dir: dir,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, key: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("authorization", format!("Bearer {}", key));
    }
    let body = body.map_or_else(Body::empty, |v| Body::from(v.to_string()));
    builder.body(body).unwrap()
}

/// `fields` are text parts; `file` is (filename, content type, bytes)
fn multipart_request(
    uri: &str,
    key: Option<&str>,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, content_type, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body)).unwrap()
}

// ============================================================================
// Device routes
// ============================================================================

#[tokio::test]
async fn test_device_start_status_and_conflict() {
    let app = test_app().await;

    let (status, body) = send(&app.router, json_request("GET", "/api/devices", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (status, body) = send(
        &app.router,
        json_request("POST", "/api/devices/dev-1/start", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "starting", "device": "dev-1"}));

    let (status, body) = send(
        &app.router,
        json_request("POST", "/api/devices/dev-1/start", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], 409);

    let (status, body) = send(
        &app.router,
        json_request("GET", "/api/devices/dev-1/status", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "starting");
    assert!(body["qrCode"].is_null());
    assert!(body["lastUpdate"].is_string());

    app.client
        .emit("dev-1", ClientEvent::Qr("2@scan-me".into()))
        .await;
    assert!(
        wait_for(Duration::from_secs(2), || app.manager.status("dev-1").is_some_and(
            |s| s.qr_code.is_some()
        ))
        .await
    );
    let (_, body) = send(&app.router, json_request("GET", "/api/devices", None, None)).await;
    assert_eq!(body["dev-1"]["status"], "waiting_for_scan");
    assert!(body["dev-1"]["qrCode"]
        .as_str()
        .unwrap()
        .starts_with("data:image/svg+xml;base64,"));
}

#[tokio::test]
async fn test_device_status_errors() {
    let app = test_app().await;

    let (status, _) = send(
        &app.router,
        json_request("GET", "/api/devices/ghost/status", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        json_request("POST", "/api/devices/bad.id/start", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.client.fail_connects(true);
    let (status, body) = send(
        &app.router,
        json_request("POST", "/api/devices/dev-1/start", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Handshake failed"));
}

#[tokio::test]
async fn test_device_send_text() {
    let app = test_app().await;
    let request = || {
        json_request(
            "POST",
            "/api/devices/dev-1/send",
            None,
            Some(json!({"to": "923001234567@s.whatsapp.net", "message": "hello"})),
        )
    };

    let (status, _) = send(&app.router, request()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.manager.start("dev-1", false).await.unwrap();
    let (status, body) = send(&app.router, request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "sent", "to": "923001234567@s.whatsapp.net", "type": "text"})
    );
    assert_eq!(
        app.client.last_handle("dev-1").unwrap().sent(),
        vec![(
            "923001234567@c.us".to_string(),
            MessagePayload::Text("hello".into())
        )]
    );

    app.client.last_handle("dev-1").unwrap().fail_sends(true);
    let (status, body) = send(&app.router, request()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("not on WhatsApp"));

    let (status, _) = send(
        &app.router,
        json_request(
            "POST",
            "/api/devices/dev-1/send",
            None,
            Some(json!({"to": "923001234567"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_device_send_media() {
    let app = test_app().await;

    let (status, _) = send(
        &app.router,
        multipart_request(
            "/api/devices/dev-1/send-media",
            None,
            &[("to", "923001234567")],
            Some(("cat.png", "image/png", b"\x89PNG")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.manager.start("dev-1", false).await.unwrap();

    let (status, body) = send(
        &app.router,
        multipart_request(
            "/api/devices/dev-1/send-media",
            None,
            &[("to", "923001234567"), ("caption", "look")],
            Some(("cat.png", "image/png", b"\x89PNG")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "image");
    assert_eq!(body["filename"], "cat.png");

    let (status, body) = send(
        &app.router,
        multipart_request(
            "/api/devices/dev-1/send-media",
            None,
            &[("to", "923001234567")],
            Some(("invoice.pdf", "application/pdf", b"%PDF-1.7")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "document");

    let sent = app.client.last_handle("dev-1").unwrap().sent();
    assert_eq!(sent.len(), 2);
    match &sent[0].1 {
        MessagePayload::Media(media) => {
            assert!(!media.as_document);
            assert_eq!(media.caption.as_deref(), Some("look"));
            assert_eq!(media.mime_type, "image/png");
        },
        other => panic!("expected media, got {:?}", other),
    }

    let (status, body) = send(
        &app.router,
        multipart_request(
            "/api/devices/dev-1/send-media",
            None,
            &[("to", "923001234567")],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "No file uploaded");

    let big = vec![0u8; 2048];
    let (status, _) = send(
        &app.router,
        multipart_request(
            "/api/devices/dev-1/send-media",
            None,
            &[("to", "923001234567")],
            Some(("big.bin", "application/octet-stream", &big)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_device_remove_is_idempotent() {
    let app = test_app().await;
    app.manager.start("dev-1", false).await.unwrap();

    for _ in 0..2 {
        let (status, body) = send(
            &app.router,
            json_request("DELETE", "/api/devices/dev-1", None, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "removed");
        assert_eq!(body["device"], "dev-1");
    }
    assert!(app.manager.status("dev-1").is_none());
}

// ============================================================================
// Tenant routes
// ============================================================================

#[tokio::test]
async fn test_tenant_routes_require_key() {
    let app = test_app().await;

    let (status, body) = send(
        &app.router,
        json_request("GET", "/api/v1/instances", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "API key required");

    let (status, _) = send(
        &app.router,
        json_request("GET", "/api/v1/instances", Some("sk_not_ours"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = format!("{}forged", &app.key[..8]);
    let (status, _) = send(
        &app.router,
        json_request("GET", "/api/instances", Some(&forged), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Device routes stay open
    let (status, _) = send(&app.router, json_request("GET", "/api/devices", None, None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_usage_limit_returns_429() {
    let app = test_app().await;
    let user_id = create_user(app.store.pool(), "Limited", "limited@example.com")
        .await
        .unwrap();
    let key = generate_key();
    insert_api_key(
        app.store.pool(),
        user_id,
        &key,
        &NewApiKey {
            usage_limit: Some(1),
            cost: Some(4),
            ..NewApiKey::default()
        },
    )
    .await
    .unwrap();

    let (status, _) = send(
        &app.router,
        json_request("GET", "/api/v1/instances", Some(&key), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app.router,
        json_request("GET", "/api/v1/instances", Some(&key), None),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_v1_send_message_flow() {
    let app = test_app().await;
    let key = Some(app.key.as_str());
    let body = json!({"to": "300-1234567", "message": "Order shipped"});

    let (status, reply) = send(
        &app.router,
        json_request("POST", "/api/v1/send-message", key, Some(json!({"to": "1"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["error"]["message"], "Missing required fields");

    // Instance is connected in the store but has no live session
    let (status, _) = send(
        &app.router,
        json_request("POST", "/api/v1/send-message", key, Some(body.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    app.manager.start("shop-1", false).await.unwrap();
    let (status, reply) = send(
        &app.router,
        json_request("POST", "/api/v1/send-message", key, Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["success"], true);
    assert_eq!(reply["message"], "Message sent successfully");
    assert_eq!(reply["data"]["to"], "923001234567@s.whatsapp.net");
    assert_eq!(reply["data"]["instance_id"], "shop-1");
    assert_eq!(reply["data"]["instance_name"], "Shop");

    let sent = app.client.last_handle("shop-1").unwrap().sent();
    assert_eq!(sent[0].0, "923001234567@c.us");
}

#[tokio::test]
async fn test_v1_send_media_validation() {
    let app = test_app().await;
    let key = Some(app.key.as_str());
    app.manager.start("shop-1", false).await.unwrap();

    let (status, reply) = send(
        &app.router,
        multipart_request(
            "/api/v1/send-media",
            key,
            &[("to", "923001234567"), ("type", "video")],
            Some(("clip.mp4", "video/mp4", b"....")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["error"]["message"], "Invalid type");

    let (status, _) = send(
        &app.router,
        multipart_request(
            "/api/v1/send-media",
            key,
            &[("to", "923001234567")],
            Some(("a.pdf", "application/pdf", b"%PDF")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, reply) = send(
        &app.router,
        multipart_request(
            "/api/v1/send-media",
            key,
            &[("to", "923001234567"), ("type", "document"), ("instance_id", "shop-1")],
            Some(("a.pdf", "application/pdf", b"%PDF")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["data"]["type"], "document");
    assert_eq!(reply["data"]["filename"], "a.pdf");
    assert_eq!(reply["data"]["caption"], "");

    let sent = app.client.last_handle("shop-1").unwrap().sent();
    assert!(matches!(&sent[0].1, MessagePayload::Media(m) if m.as_document));
}

#[tokio::test]
async fn test_instance_listing_and_delete() {
    let app = test_app().await;
    let key = Some(app.key.as_str());

    let (status, reply) = send(
        &app.router,
        json_request("GET", "/api/v1/instances", key, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = reply["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["instance_id"], "shop-1");

    let (_, reply) = send(&app.router, json_request("GET", "/api/instances", key, None)).await;
    assert_eq!(reply["instances"][0]["id"], "shop-1");

    let (status, _) = send(
        &app.router,
        json_request("DELETE", "/api/v1/instances/other", key, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.manager.start("shop-1", false).await.unwrap();
    let (status, reply) = send(
        &app.router,
        json_request("DELETE", "/api/v1/instances/shop-1", key, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["data"]["instance_name"], "Shop");
    assert!(app.manager.status("shop-1").is_none());

    let (_, reply) = send(
        &app.router,
        json_request("GET", "/api/v1/instances", key, None),
    )
    .await;
    assert!(reply["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_legacy_send_message() {
    let app = test_app().await;
    let key = Some(app.key.as_str());

    let (status, _) = send(
        &app.router,
        json_request(
            "POST",
            "/api/send-message",
            key,
            Some(json!({"to": "923001234567", "message": "hi"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app.router,
        json_request(
            "POST",
            "/api/send-message",
            key,
            Some(json!({"instanceId": "shop-old", "to": "923001234567", "message": "hi"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(
        &app.router,
        json_request(
            "POST",
            "/api/send-message",
            key,
            Some(json!({"instanceId": "nobody", "to": "923001234567", "message": "hi"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.manager.start("shop-1", false).await.unwrap();
    let (status, reply) = send(
        &app.router,
        json_request(
            "POST",
            "/api/send-message",
            key,
            Some(json!({"instanceId": "shop-1", "to": "923001234567", "message": "hi"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["data"]["to"], "923001234567@s.whatsapp.net");
}

#[tokio::test]
async fn test_health_reports_database() {
    let app = test_app().await;
    let (status, body) = send(&app.router, json_request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "wasrv");
    assert_eq!(body["checks"]["database"]["status"], "healthy");
}
