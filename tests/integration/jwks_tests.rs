//! JWKS key set integration tests.
//!
//! Tests verify:
//! - Keys are loaded from a served JWKS document
//! - A failed refresh keeps the previously trusted keys
//! - The background refresher swaps in a rotated key set
//! - Tokens signed with a published key pass the identity verifier

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use image_converter::server::{IdentityVerifier, JwksKeySet, KeySource};

use super::test_utils::{claims_for, sign_token, TEST_AUDIENCE, TEST_DOMAIN, TEST_KID, TEST_SUBJECT};

/// base64url of `integration-test-secret`, the secret `sign_token` uses.
const TEST_SECRET_B64: &str = "aW50ZWdyYXRpb24tdGVzdC1zZWNyZXQ";

/// What the JWKS endpoint currently answers.
#[derive(Clone)]
struct Published(Arc<Mutex<(StatusCode, Value)>>);

impl Published {
    fn new(body: Value) -> Self {
        Self(Arc::new(Mutex::new((StatusCode::OK, body))))
    }

    fn set(&self, status: StatusCode, body: Value) {
        *self.0.lock().unwrap() = (status, body);
    }
}

async fn jwks_handler(State(published): State<Published>) -> Response {
    let (status, body) = published.0.lock().unwrap().clone();
    (status, Json(body)).into_response()
}

/// Serve `published` on an ephemeral local port and return the JWKS URL.
async fn serve_jwks(published: Published) -> String {
    let app = Router::new()
        .route("/.well-known/jwks.json", get(jwks_handler))
        .with_state(published);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/.well-known/jwks.json", addr)
}

fn oct_set(kid: &str, k: &str) -> Value {
    json!({
        "keys": [{ "kty": "oct", "kid": kid, "alg": "HS256", "k": k }]
    })
}

#[tokio::test]
async fn test_fetch_loads_published_keys() {
    let url = serve_jwks(Published::new(oct_set("k1", "c2VjcmV0"))).await;

    let keys = JwksKeySet::fetch(url).await.unwrap();
    assert!(keys.key_for_id("k1").is_some());
    assert!(keys.key_for_id("k2").is_none());
}

#[tokio::test]
async fn test_fetch_fails_on_empty_set() {
    let url = serve_jwks(Published::new(json!({ "keys": [] }))).await;

    assert!(JwksKeySet::fetch(url).await.is_err());
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_keys() {
    let published = Published::new(oct_set("k1", "c2VjcmV0"));
    let url = serve_jwks(published.clone()).await;
    let keys = JwksKeySet::fetch(url).await.unwrap();

    published.set(StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "down" }));
    assert!(keys.refresh().await.is_err());
    assert!(keys.key_for_id("k1").is_some());

    // A document with no usable keys is also a failure
    published.set(StatusCode::OK, json!({ "keys": [] }));
    assert!(keys.refresh().await.is_err());
    assert!(keys.key_for_id("k1").is_some());
}

#[tokio::test]
async fn test_refresh_swaps_rotated_keys() {
    let published = Published::new(oct_set("k1", "c2VjcmV0"));
    let url = serve_jwks(published.clone()).await;
    let keys = JwksKeySet::fetch(url).await.unwrap();

    published.set(StatusCode::OK, oct_set("k2", "c2VjcmV0"));
    assert_eq!(keys.refresh().await.unwrap(), 1);

    assert!(keys.key_for_id("k1").is_none());
    assert!(keys.key_for_id("k2").is_some());
}

#[tokio::test]
async fn test_background_refresh_picks_up_rotation() {
    let published = Published::new(oct_set("k1", "c2VjcmV0"));
    let url = serve_jwks(published.clone()).await;
    let keys = Arc::new(JwksKeySet::fetch(url).await.unwrap());

    published.set(StatusCode::OK, oct_set("k2", "c2VjcmV0"));
    let refresher = Arc::clone(&keys).spawn_refresh(Duration::from_millis(50));

    let rotated = tokio::time::timeout(Duration::from_secs(5), async {
        while keys.key_for_id("k2").is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    refresher.abort();

    assert!(rotated.is_ok(), "rotated key set was never swapped in");
    assert!(keys.key_for_id("k1").is_none());
}

#[tokio::test]
async fn test_verifier_accepts_token_signed_with_published_key() {
    let url = serve_jwks(Published::new(oct_set(TEST_KID, TEST_SECRET_B64))).await;
    let keys = Arc::new(JwksKeySet::fetch(url).await.unwrap());
    let verifier = IdentityVerifier::new(keys, TEST_DOMAIN, TEST_AUDIENCE);

    let header = format!("Bearer {}", sign_token(&claims_for(TEST_SUBJECT)));
    let principal = verifier.verify(Some(&header)).unwrap();
    assert_eq!(principal.subject, TEST_SUBJECT);
}
