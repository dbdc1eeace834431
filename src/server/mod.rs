//! HTTP server layer for the image conversion service.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │                  POST /{source}/{target}                        │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (requests)  │  │ (bearer JWT)│  │  (router config)        │  │
//! │  └─────────────┘  └──────┬──────┘  └─────────────────────────┘  │
//! │                          │                                      │
//! │                   ┌──────┴──────┐                               │
//! │                   │    keys     │                               │
//! │                   │ (JWKS set)  │                               │
//! │                   └─────────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod keys;
pub mod routes;

pub use auth::{auth_middleware, AuthError, ClaimFailure, IdentityVerifier, Principal};
pub use handlers::{AppState, ErrorResponse, HealthResponse, UserError};
pub use keys::{
    jwks_url, JwksKeySet, KeySource, StaticKeySet, VerifyingKey, DEFAULT_JWKS_REFRESH_SECS,
};
pub use routes::{create_router, RouterConfig};
