//! Test utilities for integration tests.
//!
//! This module provides an in-memory account store, token minting against a
//! static HS256 key set, and helpers for building test images and requests.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::Router;
use chrono::{Duration as ChronoDuration, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use jsonwebtoken::{encode, get_current_timestamp, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use image_converter::codec::{CodecRegistry, ConversionFormat};
use image_converter::error::StorageError;
use image_converter::io::ReadLimits;
use image_converter::server::{create_router, IdentityVerifier, RouterConfig, StaticKeySet};
use image_converter::store::{AccountStore, ConversionRecord, PlanUsage, UserProfile};
use image_converter::ConversionService;

// =============================================================================
// Identity
// =============================================================================

pub const TEST_SECRET: &[u8] = b"integration-test-secret";
pub const TEST_KID: &str = "integration-key";
pub const TEST_DOMAIN: &str = "auth.example.com";
pub const TEST_ISSUER: &str = "https://auth.example.com/";
pub const TEST_AUDIENCE: &str = "https://converter.example.com";
pub const TEST_SUBJECT: &str = "auth0|alice";

/// Verifier trusting only the HS256 test key.
pub fn test_verifier() -> IdentityVerifier {
    let keys = StaticKeySet::new().with_hmac_secret(TEST_KID, TEST_SECRET);
    IdentityVerifier::new(Arc::new(keys), TEST_DOMAIN, TEST_AUDIENCE)
}

/// Claims that pass every check for `subject`, expiring in an hour.
pub fn claims_for(subject: &str) -> Value {
    json!({
        "sub": subject,
        "aud": TEST_AUDIENCE,
        "iss": TEST_ISSUER,
        "exp": get_current_timestamp() + 3600,
    })
}

/// Sign arbitrary claims with the test key.
pub fn sign_token(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(TEST_KID.to_string());
    encode(&header, claims, &EncodingKey::from_secret(TEST_SECRET)).unwrap()
}

/// `Authorization` header value for a valid token.
pub fn bearer(subject: &str) -> String {
    format!("Bearer {}", sign_token(&claims_for(subject)))
}

/// `Authorization` header value for arbitrary claims.
pub fn bearer_with(claims: &Value) -> String {
    format!("Bearer {}", sign_token(claims))
}

// =============================================================================
// Mock Account Store
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Plan {
    max_interactions: i64,
    max_file_size_mb: i64,
}

/// In-memory account store with failure injection.
///
/// Quota counts come from the recorded conversions, so a successful request
/// feeds later quota decisions exactly like the real store.
#[derive(Default)]
pub struct MockAccountStore {
    plans: RwLock<HashMap<String, Plan>>,
    conversions: RwLock<Vec<ConversionRecord>>,
    users: RwLock<HashMap<String, UserProfile>>,
    plan_lookups: AtomicUsize,
    fail_plan_lookups: AtomicBool,
    fail_inserts: AtomicBool,
    fail_user_writes: AtomicBool,
    fail_ping: AtomicBool,
}

impl MockAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `subject` a plan.
    pub fn with_plan(
        mut self,
        subject: impl Into<String>,
        max_interactions: i64,
        max_file_size_mb: i64,
    ) -> Self {
        self.plans.get_mut().insert(
            subject.into(),
            Plan {
                max_interactions,
                max_file_size_mb,
            },
        );
        self
    }

    pub fn with_user(mut self, profile: UserProfile) -> Self {
        self.users
            .get_mut()
            .insert(profile.auth_id.clone(), profile);
        self
    }

    /// Add a past conversion for `subject`, `age` before now.
    pub async fn seed_conversion(&self, subject: &str, age: ChronoDuration) {
        self.conversions.write().await.push(ConversionRecord {
            subject: subject.to_string(),
            source: ConversionFormat::Png,
            target: ConversionFormat::Jpeg,
            size_bytes: 1024,
            recorded_at: Utc::now() - age,
        });
    }

    pub async fn conversions(&self) -> Vec<ConversionRecord> {
        self.conversions.read().await.clone()
    }

    pub async fn user(&self, auth_id: &str) -> Option<UserProfile> {
        self.users.read().await.get(auth_id).cloned()
    }

    pub fn plan_lookups(&self) -> usize {
        self.plan_lookups.load(Ordering::SeqCst)
    }

    pub fn set_fail_plan_lookups(&self, fail: bool) {
        self.fail_plan_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_user_writes(&self, fail: bool) {
        self.fail_user_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_ping(&self, fail: bool) {
        self.fail_ping.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccountStore for MockAccountStore {
    async fn plan_usage(&self, subject: &str) -> Result<PlanUsage, StorageError> {
        self.plan_lookups.fetch_add(1, Ordering::SeqCst);

        if self.fail_plan_lookups.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionFailure(
                "connection refused".to_string(),
            ));
        }

        let plan = self
            .plans
            .read()
            .await
            .get(subject)
            .copied()
            .ok_or_else(|| StorageError::NotFound(subject.to_string()))?;

        let window_start = Utc::now() - ChronoDuration::hours(24);
        let recent = self
            .conversions
            .read()
            .await
            .iter()
            .filter(|record| record.subject == subject && record.recorded_at > window_start)
            .count();

        Ok(PlanUsage {
            max_interactions: plan.max_interactions,
            max_file_size_mb: plan.max_file_size_mb,
            recent_conversions: recent as i64,
        })
    }

    async fn insert_conversion(&self, record: &ConversionRecord) -> Result<(), StorageError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StorageError::Query("insert rejected".to_string()));
        }
        self.conversions.write().await.push(record.clone());
        Ok(())
    }

    async fn upsert_user(&self, profile: &UserProfile) -> Result<(), StorageError> {
        if self.fail_user_writes.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionFailure("pool closed".to_string()));
        }
        self.users
            .write()
            .await
            .insert(profile.auth_id.clone(), profile.clone());
        Ok(())
    }

    async fn find_user(&self, auth_id: &str) -> Result<Option<UserProfile>, StorageError> {
        Ok(self.users.read().await.get(auth_id).cloned())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        if self.fail_ping.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionFailure("unreachable".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Router
// =============================================================================

/// Router over a shared store with default read limits.
pub fn test_router(store: &Arc<MockAccountStore>) -> Router {
    test_router_with_limits(store, ReadLimits::default())
}

pub fn test_router_with_limits(store: &Arc<MockAccountStore>, limits: ReadLimits) -> Router {
    let service =
        ConversionService::with_shared_store(Arc::clone(store), CodecRegistry::standard(), limits);
    create_router(
        service,
        test_verifier(),
        RouterConfig::new().with_tracing(false),
    )
}

/// Store where the test subject may convert `max_interactions` times a day,
/// up to `max_file_size_mb` per upload.
pub fn store_with_plan(max_interactions: i64, max_file_size_mb: i64) -> Arc<MockAccountStore> {
    Arc::new(MockAccountStore::new().with_plan(TEST_SUBJECT, max_interactions, max_file_size_mb))
}

// =============================================================================
// Requests
// =============================================================================

/// POST a body to a conversion route as `subject`.
pub fn convert_request(path: &str, subject: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::AUTHORIZATION, bearer(subject))
        .body(body.into())
        .unwrap()
}

/// POST a body to a conversion route with an explicit Authorization value.
pub fn convert_request_with_auth(
    path: &str,
    authorization: Option<&str>,
    body: impl Into<Body>,
) -> Request<Body> {
    let mut builder = Request::builder().method(Method::POST).uri(path);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(body.into()).unwrap()
}

// =============================================================================
// Images
// =============================================================================

/// A deterministic RGB gradient.
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    });
    DynamicImage::ImageRgb8(img)
}

/// A deterministic RGBA gradient with varying, never fully transparent, alpha.
pub fn translucent(width: u32, height: u32) -> DynamicImage {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 5 % 256) as u8, (y * 3 % 256) as u8, 128, ((x * y) % 255 + 1) as u8])
    });
    DynamicImage::ImageRgba8(img)
}

pub fn image_format(format: ConversionFormat) -> ImageFormat {
    match format {
        ConversionFormat::Jpeg => ImageFormat::Jpeg,
        ConversionFormat::Png => ImageFormat::Png,
        ConversionFormat::Webp => ImageFormat::WebP,
    }
}

/// Encode an image in `format` with the image crate's defaults.
pub fn encode_as(image: &DynamicImage, format: ConversionFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, image_format(format)).unwrap();
    buf.into_inner()
}

/// Encoded test image of the given size and format.
pub fn sample_image(format: ConversionFormat, width: u32, height: u32) -> Vec<u8> {
    encode_as(&gradient(width, height), format)
}

/// Decode response bytes, asserting they are in `format`.
pub fn decode_as(data: &[u8], format: ConversionFormat) -> DynamicImage {
    image::load_from_memory_with_format(data, image_format(format))
        .unwrap_or_else(|e| panic!("Response is not a valid {}: {}", format, e))
}

/// All six ordered pairs of distinct formats.
pub fn all_pairs() -> Vec<(ConversionFormat, ConversionFormat)> {
    let mut pairs = Vec::new();
    for source in ConversionFormat::ALL {
        for target in ConversionFormat::ALL {
            if source != target {
                pairs.push((source, target));
            }
        }
    }
    pairs
}

/// Route path for a pair, e.g. `/png/webp`.
pub fn route(source: ConversionFormat, target: ConversionFormat) -> String {
    format!("/{}/{}", source.tag(), target.tag())
}
