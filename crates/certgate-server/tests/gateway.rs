//! End-to-end tests through the router
//!
//! Requests are sent with `oneshot` and carry a `PeerCertificate` extension,
//! standing in for the verdict the TLS listener attaches to each request.

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use certgate_core::authorization::{FORBIDDEN_MESSAGE, UNAUTHENTICATED_MESSAGE};
use certgate_core::{derive_user_id, PeerCertificate};
use certgate_server::{create_router, AppState, GatewayConfig, MemoryStore, UserDirectory};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const MERGE: &str = "application/merge-patch+json";
const JSON_PATCH: &str = "application/json-patch+json";

// =============================================================================
// Helpers
// =============================================================================

fn app() -> Router {
    let directory = UserDirectory::new(Arc::new(MemoryStore::new()));
    create_router(Arc::new(AppState {
        directory,
        config: GatewayConfig::default(),
    }))
}

fn trusted(name: &str) -> Option<PeerCertificate> {
    Some(PeerCertificate::trusted(name.as_bytes().to_vec()))
}

fn untrusted(name: &str) -> Option<PeerCertificate> {
    Some(PeerCertificate::untrusted(name.as_bytes().to_vec(), "UnknownIssuer"))
}

fn user_id(name: &str) -> String {
    derive_user_id(name.as_bytes()).unwrap().into_string()
}

struct Call<'a> {
    method: Method,
    uri: &'a str,
    peer: Option<PeerCertificate>,
    content_type: Option<&'a str>,
    body: String,
}

impl<'a> Call<'a> {
    fn new(method: Method, uri: &'a str, peer: Option<PeerCertificate>) -> Self {
        Self {
            method,
            uri,
            peer,
            content_type: None,
            body: String::new(),
        }
    }

    fn json(mut self, body: Value) -> Self {
        self.body = body.to_string();
        self.content_type.get_or_insert("application/json");
        self
    }

    fn content_type(mut self, content_type: &'a str) -> Self {
        self.content_type = Some(content_type);
        self
    }

    fn raw(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    async fn send(self, app: &Router) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        if let Some(content_type) = self.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        let mut request = builder.body(Body::from(self.body)).unwrap();
        if let Some(peer) = self.peer {
            request.extensions_mut().insert(peer);
        }

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }
}

async fn create(app: &Router, name: &str) -> Value {
    let (status, body) = Call::new(Method::POST, "/users", trusted(name)).send(app).await;
    assert_eq!(status, StatusCode::OK, "create failed: {}", body);
    body
}

async fn merge_patch(app: &Router, name: &str, info: Value) -> (StatusCode, Value) {
    Call::new(Method::PATCH, "/users", trusted(name))
        .content_type(MERGE)
        .raw(&json!({ "info": info }).to_string())
        .send(app)
        .await
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_needs_no_certificate() {
    let app = app();

    let (status, body) = Call::new(Method::GET, "/", None).send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("Up and running"));

    let (status, body) = Call::new(Method::GET, "/health", None).send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    create(&app, "alice").await;
    let (status, body) = Call::new(Method::GET, "/ready", None).send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_count"], 1);
}

#[tokio::test]
async fn test_unknown_route() {
    let (status, body) = Call::new(Method::GET, "/nowhere", trusted("alice"))
        .send(&app())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["statusCode"], 404);
}

// =============================================================================
// Authentication and authorization
// =============================================================================

#[tokio::test]
async fn test_missing_certificate_is_401() {
    let app = app();
    for (method, uri) in [
        (Method::POST, "/users"),
        (Method::GET, "/users/info"),
        (Method::PATCH, "/users"),
    ] {
        let (status, body) = Call::new(method, uri, None).send(&app).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body,
            json!({"statusCode": 401, "message": UNAUTHENTICATED_MESSAGE})
        );
    }

    let (status, _) = Call::new(Method::GET, "/users/info", Some(PeerCertificate::absent()))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_untrusted_may_only_create() {
    let app = app();

    let (status, body) = Call::new(Method::POST, "/users", untrusted("mallory"))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["_id"], json!(user_id("mallory")));

    let (status, _) = Call::new(Method::POST, "/user", untrusted("trudy"))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);

    for (method, uri) in [(Method::GET, "/users/info"), (Method::PATCH, "/users")] {
        let (status, body) = Call::new(method, uri, untrusted("mallory")).send(&app).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], FORBIDDEN_MESSAGE);
    }
}

// =============================================================================
// Creation
// =============================================================================

#[tokio::test]
async fn test_create_returns_record() {
    let app = app();
    let body = create(&app, "alice").await;

    assert_eq!(body["_id"], json!(user_id("alice")));
    assert_eq!(body["cert"], json!("YWxpY2U="));
    assert_eq!(body["aliases"], json!([]));
    assert_eq!(body["info"], json!({}));
    assert!(body.get("revision").is_none());
}

#[tokio::test]
async fn test_create_twice_conflicts() {
    let app = app();
    create(&app, "alice").await;

    let (status, body) = Call::new(Method::POST, "/users", trusted("alice"))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "User with given ID already exists");
}

#[tokio::test]
async fn test_create_with_aliases() {
    let app = app();

    let (status, body) = Call::new(Method::POST, "/users", trusted("alice"))
        .json(json!({"aliases": "al"}))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["aliases"], json!(["al"]));

    let (status, body) = Call::new(Method::POST, "/users?aliases=b1,b2", trusted("bob"))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["aliases"], json!(["b1", "b2"]));

    let (status, body) = Call::new(Method::POST, "/users", trusted("carol"))
        .json(json!({"aliases": ["c1", "al"]}))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Alias 'al' is already taken");

    let (status, body) = Call::new(Method::POST, "/users", trusted("dave"))
        .json(json!({"aliases": ["ok", " "]}))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Aliases must be non-empty strings");
}

#[tokio::test]
async fn test_malformed_body() {
    let (status, body) = Call::new(Method::POST, "/users", trusted("alice"))
        .content_type("application/json")
        .raw("{\"aliases\": ")
        .send(&app())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["statusCode"], 400);
    assert!(body["extra"]["line"].is_number());
}

#[tokio::test]
async fn test_wrong_shape_body() {
    let (status, body) = Call::new(Method::POST, "/users", trusted("alice"))
        .json(json!({"aliases": 5}))
        .send(&app())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid request body: "));
}

// =============================================================================
// Reading info
// =============================================================================

#[tokio::test]
async fn test_info_for_unknown_user() {
    let (status, body) = Call::new(Method::GET, "/users/info", trusted("ghost"))
        .send(&app())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["message"],
        json!(format!("User '{}' not found", user_id("ghost")))
    );
}

#[tokio::test]
async fn test_info_projection() {
    let app = app();
    create(&app, "alice").await;
    let (status, _) = merge_patch(
        &app,
        "alice",
        json!({"profile": {"name": "Alice", "langs": ["en", "fr", "de"]}, "tier": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = Call::new(Method::GET, "/users/info", trusted("alice"))
        .send(&app)
        .await;
    assert_eq!(body["tier"], 2);

    let (_, body) = Call::new(
        Method::GET,
        "/users/info?keys=profile.name%20profile.langs.2,missing",
        trusted("alice"),
    )
    .send(&app)
    .await;
    assert_eq!(body, json!({"profile": {"name": "Alice", "langs": ["de"]}}));

    let (status, body) = Call::new(Method::GET, "/users/info/profile?keys=name", trusted("alice"))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "Alice"}));

    let (status, body) = Call::new(Method::GET, "/users/info/billing", trusted("alice"))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Namespace 'billing' not found");
}

#[tokio::test]
async fn test_namespace_with_dot_in_name() {
    let app = app();
    create(&app, "alice").await;
    let (status, _) = merge_patch(&app, "alice", json!({"a.b": {"x": 2, "y": 3}})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = Call::new(Method::GET, "/users/info/a.b?keys=x", trusted("alice"))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"x": 2}));
}

// =============================================================================
// Patching
// =============================================================================

#[tokio::test]
async fn test_merge_patch_flow() {
    let app = app();
    create(&app, "alice").await;

    let (status, body) = merge_patch(&app, "alice", json!({"a": 0, "b": 2, "c": 3})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    merge_patch(&app, "alice", json!({"a": 1, "b": null})).await;
    let (_, info) = Call::new(Method::GET, "/users/info", trusted("alice"))
        .send(&app)
        .await;
    assert_eq!(info, json!({"a": 1, "c": 3}));

    // idempotent
    merge_patch(&app, "alice", json!({"a": 1, "b": null})).await;
    let (_, again) = Call::new(Method::GET, "/users/info", trusted("alice"))
        .send(&app)
        .await;
    assert_eq!(again, info);
}

#[tokio::test]
async fn test_json_patch_flow() {
    let app = app();
    create(&app, "alice").await;
    merge_patch(&app, "alice", json!({"a": 1})).await;

    let (status, _) = Call::new(Method::PATCH, "/users", trusted("alice"))
        .content_type("application/json-patch+json; charset=utf-8")
        .raw(&json!({"info": [{"op": "replace", "path": "/a", "value": 5}]}).to_string())
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, info) = Call::new(Method::GET, "/users/info", trusted("alice"))
        .send(&app)
        .await;
    assert_eq!(info, json!({"a": 5}));
}

#[tokio::test]
async fn test_invalid_json_patch_is_500() {
    let app = app();
    create(&app, "alice").await;
    merge_patch(&app, "alice", json!({"a": 1})).await;

    let (status, body) = Call::new(Method::PATCH, "/users", trusted("alice"))
        .content_type(JSON_PATCH)
        .raw(&json!({"info": [{"op": "replace", "path": "/missing", "value": 5}]}).to_string())
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("Failed to validate the patch."));
    assert!(message.contains(r#"{"a":1}"#));
    assert!(body["stack"].is_string());

    // the document is untouched
    let (_, info) = Call::new(Method::GET, "/users/info", trusted("alice"))
        .send(&app)
        .await;
    assert_eq!(info, json!({"a": 1}));
}

#[tokio::test]
async fn test_patch_request_validation() {
    let app = app();
    create(&app, "alice").await;
    let body = json!({"info": {"a": 1}}).to_string();

    let (status, resp) = Call::new(Method::PATCH, "/users", trusted("alice"))
        .raw(&body)
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["message"], "Missing content-type header specifying patch type");

    let (status, resp) = Call::new(Method::PATCH, "/users", trusted("alice"))
        .content_type("application/json")
        .raw(&body)
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["message"], "Content-type header value is invalid");

    let (status, resp) = Call::new(Method::PATCH, "/users", trusted("alice"))
        .content_type(MERGE)
        .raw("{}")
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["message"], "Missing patch information");

    let (status, _) = Call::new(Method::PATCH, "/users", trusted("alice"))
        .content_type(JSON_PATCH)
        .raw(&json!({"info": []}).to_string())
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patch_unknown_user() {
    let (status, _) = merge_patch(&app(), "ghost", json!({"a": 1})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_alias_patch() {
    let app = app();
    Call::new(Method::POST, "/users?aliases=a1,a2", trusted("alice"))
        .send(&app)
        .await;
    Call::new(Method::POST, "/users?aliases=b1", trusted("bob"))
        .send(&app)
        .await;

    let (status, _) = Call::new(Method::PATCH, "/users", trusted("alice"))
        .content_type(MERGE)
        .raw(&json!({"aliases": {"a1": false, "a3": true}}).to_string())
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = Call::new(Method::PATCH, "/users", trusted("bob"))
        .content_type(MERGE)
        .raw(&json!({"aliases": {"a3": true}}).to_string())
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Alias 'a3' is already taken");

    // a1 was released and can be claimed
    let (status, _) = Call::new(Method::PATCH, "/users", trusted("bob"))
        .content_type(MERGE)
        .raw(&json!({"aliases": {"a1": true}}).to_string())
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
}
