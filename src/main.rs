//! Image Converter - authenticated, quota-bounded image conversion.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_converter::{
    codec::CodecRegistry,
    config::Config,
    convert::ConversionService,
    server::{create_router, jwks_url, IdentityVerifier, JwksKeySet, RouterConfig},
    store::PgAccountStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    run_serve(config).await
}

async fn run_serve(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting image converter"
    );
    info!("Configuration:");
    info!(
        "  Upload deadline: at least {}s, at least {} KB/s",
        config.min_conversion_secs, config.min_transfer_kbps
    );
    info!("  Database pool: {} connections", config.db_max_connections);

    // Connect to the account store
    let store = match PgAccountStore::connect(&config.database_url, config.connect_options()).await
    {
        Ok(store) => store,
        Err(e) => {
            error!(
                attempts = config.db_connect_attempts,
                "Failed to connect to the database: {}", e
            );
            return ExitCode::FAILURE;
        }
    };

    // Load the identity provider's signing keys
    let keys = match JwksKeySet::fetch(jwks_url(&config.auth_domain)).await {
        Ok(keys) => Arc::new(keys),
        Err(e) => {
            error!("Failed to load identity key set: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let _refresh = Arc::clone(&keys).spawn_refresh(config.jwks_refresh_interval());

    let verifier = IdentityVerifier::new(keys, &config.auth_domain, config.auth_audience.clone());
    info!("  Token issuer: {}", verifier.issuer());
    info!("  Token audience: {}", verifier.audience());

    let registry = CodecRegistry::standard();
    for conversion in registry.conversions() {
        info!("  Route: POST {}", conversion.route_path());
    }

    let service = ConversionService::new(store, registry, config.read_limits());
    let router = create_router(service, verifier, build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "image_converter=debug,tower_http=debug"
    } else {
        "image_converter=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new();

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}
