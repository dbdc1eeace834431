//! Router configuration for the image conversion service.
//!
//! # Route Structure
//!
//! ```text
//! /health                 - Health check (public)
//! /{source}/{target}      - One POST route per registered conversion (protected)
//! /users                  - Upsert the caller's profile (protected)
//! /users/{auth_id}        - Fetch the caller's profile (protected)
//! ```
//!
//! CORS is the outermost layer and answers every `OPTIONS` request itself,
//! so preflights never reach authentication.
//!
//! # Example
//!
//! ```ignore
//! use image_converter::codec::CodecRegistry;
//! use image_converter::convert::ConversionService;
//! use image_converter::server::{create_router, IdentityVerifier, RouterConfig};
//!
//! let service = ConversionService::new(store, CodecRegistry::standard(), limits);
//! let verifier = IdentityVerifier::new(keys, "tenant.example.com", "https://api.example.com");
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(service, verifier, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, IdentityVerifier, Principal};
use super::handlers::{
    convert_handler, get_user_handler, health_handler, upsert_user_handler, AppState,
};
use crate::convert::ConversionService;
use crate::store::AccountStore;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a router configuration.
    ///
    /// By default CORS allows any origin and tracing is enabled.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// Conversion routes are generated from the service's codec registry, so
/// only registered pairs are reachable.
pub fn create_router<S>(
    service: ConversionService<S>,
    verifier: IdentityVerifier,
    config: RouterConfig,
) -> Router
where
    S: AccountStore + 'static,
{
    let app_state = AppState::new(service);
    let cors = build_cors_layer(&config);

    let mut protected_routes = Router::new()
        .route("/users", post(upsert_user_handler::<S>))
        .route("/users/{auth_id}", get(get_user_handler::<S>));

    for &conversion in app_state.service.registry().conversions() {
        protected_routes = protected_routes.route(
            &conversion.route_path(),
            post(
                move |State(state): State<AppState<S>>, principal: Principal, body: Body| {
                    convert_handler(state, principal, conversion, body)
                },
            ),
        );
    }

    // route_layer keeps unknown paths at 404 instead of 401
    let protected_routes = protected_routes
        .route_layer(middleware::from_fn_with_state(verifier, auth_middleware))
        .with_state(app_state.clone());

    let public_routes = Router::new()
        .route("/health", get(health_handler::<S>))
        .with_state(app_state);

    let router = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
///
/// Credentials are only allowed with an explicit origin list.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins).allow_credentials(true)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
