//! # Image Converter
//!
//! An authenticated, quota-bounded HTTP service that converts uploaded images
//! between JPEG, PNG and WebP.
//!
//! ## Features
//!
//! - **Bearer authentication**: JWTs verified against the identity provider's
//!   published key set, with a fixed audience/issuer/expiry/subject policy
//! - **Per-account quotas**: conversions per trailing 24 hours and a maximum
//!   upload size, both from the account's plan
//! - **Bounded uploads**: bodies are capped at the plan's size and must
//!   arrive before a size-scaled deadline
//! - **Usage recording**: every completed conversion is appended to storage
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`codec`] - Format tags, the codec registry, decoders and encoders
//! - [`io`] - Size- and time-bounded body reads
//! - [`store`] - Account storage trait and the Postgres implementation
//! - [`quota`] - Quota decisions and usage recording
//! - [`convert`] - The conversion pipeline
//! - [`server`] - Axum-based HTTP server, authentication and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use image_converter::{
//!     CodecRegistry, ConversionService, IdentityVerifier, PgAccountStore, ReadLimits,
//!     RouterConfig, StaticKeySet, create_router,
//! };
//! use image_converter::store::ConnectOptions;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = PgAccountStore::connect("postgres://localhost/converter", ConnectOptions::default())
//!         .await
//!         .unwrap();
//!     let service = ConversionService::new(store, CodecRegistry::standard(), ReadLimits::default());
//!
//!     let keys = StaticKeySet::new().with_hmac_secret("key-1", b"shared-secret");
//!     let verifier = IdentityVerifier::new(Arc::new(keys), "tenant.example.com", "https://api.example.com");
//!
//!     let router = create_router(service, verifier, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod codec;
pub mod config;
pub mod convert;
pub mod error;
pub mod io;
pub mod quota;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use codec::{CodecRegistry, Conversion, ConversionFormat, Decoder, Encoder, JPEG_QUALITY};
pub use config::Config;
pub use convert::{ConversionRequest, ConversionResponse, ConversionService};
pub use error::{
    CodecError, ConfigError, ConversionError, KeySetError, RecordingError, StorageError,
};
pub use io::{read_bounded, BoundedReadOutcome, ReadLimits};
pub use quota::{QuotaDecision, QuotaGate, UsageRecorder};
pub use server::{
    auth_middleware, create_router, jwks_url, AppState, AuthError, ClaimFailure, ErrorResponse,
    IdentityVerifier, JwksKeySet, KeySource, Principal, RouterConfig, StaticKeySet, VerifyingKey,
};
pub use store::{AccountStore, ConversionRecord, PgAccountStore, PlanUsage, UserProfile};
