//! Configuration management for the image conversion service.
//!
//! Options come from command-line arguments via clap, with environment
//! variable fallbacks using the `CONVERTER_` prefix.
//!
//! # Environment Variables
//!
//! - `CONVERTER_HOST` - Server bind address (default: 0.0.0.0)
//! - `CONVERTER_PORT` - Server port (default: 3000)
//! - `CONVERTER_DATABASE_URL` - Postgres connection URL (required)
//! - `CONVERTER_AUTH_DOMAIN` - Trusted identity provider domain (required)
//! - `CONVERTER_AUTH_AUDIENCE` - Expected token audience (required)
//! - `CONVERTER_JWKS_REFRESH_SECS` - Key set refresh interval (default: 3600)
//! - `CONVERTER_MIN_CONVERSION_SECS` - Upload deadline floor (default: 5)
//! - `CONVERTER_MIN_TRANSFER_KBPS` - Slowest accepted upload rate (default: 20)
//! - `CONVERTER_CORS_ORIGINS` - Allowed origins, comma-separated (default: any)
//! - `CONVERTER_DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `CONVERTER_DB_CONNECT_ATTEMPTS` - Startup connection attempts (default: 10)
//! - `CONVERTER_DB_CONNECT_RETRY_MS` - Delay between attempts (default: 200)

use std::time::Duration;

use clap::Parser;

use crate::error::ConfigError;
use crate::io::{ReadLimits, DEFAULT_MIN_CONVERSION_SECS, DEFAULT_MIN_TRANSFER_KBPS};
use crate::server::DEFAULT_JWKS_REFRESH_SECS;
use crate::store::ConnectOptions;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default size of the shared database pool.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Default number of startup connection attempts.
pub const DEFAULT_DB_CONNECT_ATTEMPTS: u32 = 10;

/// Default delay between startup connection attempts, in milliseconds.
pub const DEFAULT_DB_CONNECT_RETRY_MS: u64 = 200;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Image Converter - authenticated, quota-bounded image conversion.
///
/// Converts uploaded images between JPEG, PNG and WebP for callers holding
/// a bearer token from the trusted identity provider.
#[derive(Parser, Debug, Clone)]
#[command(name = "image-converter")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "CONVERTER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "CONVERTER_PORT")]
    pub port: u16,

    // =========================================================================
    // Database Configuration
    // =========================================================================
    /// Postgres connection URL.
    #[arg(long, env = "CONVERTER_DATABASE_URL")]
    pub database_url: String,

    /// Maximum pooled database connections.
    #[arg(long, default_value_t = DEFAULT_DB_MAX_CONNECTIONS, env = "CONVERTER_DB_MAX_CONNECTIONS")]
    pub db_max_connections: u32,

    /// Connection attempts at startup before giving up.
    #[arg(long, default_value_t = DEFAULT_DB_CONNECT_ATTEMPTS, env = "CONVERTER_DB_CONNECT_ATTEMPTS")]
    pub db_connect_attempts: u32,

    /// Delay between startup connection attempts, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_DB_CONNECT_RETRY_MS, env = "CONVERTER_DB_CONNECT_RETRY_MS")]
    pub db_connect_retry_ms: u64,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// Domain of the trusted identity provider, e.g. `tenant.auth0.com`.
    ///
    /// Tokens must be issued by `https://<domain>/` and signed by a key from
    /// `https://<domain>/.well-known/jwks.json`.
    #[arg(long, env = "CONVERTER_AUTH_DOMAIN")]
    pub auth_domain: String,

    /// Audience that tokens must be issued for.
    #[arg(long, env = "CONVERTER_AUTH_AUDIENCE")]
    pub auth_audience: String,

    /// Interval between key set refreshes, in seconds.
    #[arg(long, default_value_t = DEFAULT_JWKS_REFRESH_SECS, env = "CONVERTER_JWKS_REFRESH_SECS")]
    pub jwks_refresh_secs: u64,

    // =========================================================================
    // Upload Configuration
    // =========================================================================
    /// Minimum time allowed for any upload, in seconds.
    #[arg(long, default_value_t = DEFAULT_MIN_CONVERSION_SECS, env = "CONVERTER_MIN_CONVERSION_SECS")]
    pub min_conversion_secs: u64,

    /// Slowest accepted upload rate, in KB/s.
    ///
    /// Larger plan limits get proportionally longer deadlines.
    #[arg(long, default_value_t = DEFAULT_MIN_TRANSFER_KBPS, env = "CONVERTER_MIN_TRANSFER_KBPS")]
    pub min_transfer_kbps: u64,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "CONVERTER_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: "Database URL",
                flag: "--database-url",
                env: "CONVERTER_DATABASE_URL",
            });
        }

        if self.auth_domain.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: "Auth domain",
                flag: "--auth-domain",
                env: "CONVERTER_AUTH_DOMAIN",
            });
        }

        if self.auth_audience.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: "Auth audience",
                flag: "--auth-audience",
                env: "CONVERTER_AUTH_AUDIENCE",
            });
        }

        if self.auth_domain.contains("://") {
            return Err(ConfigError::Invalid {
                name: "auth_domain",
                message: "must be a bare host name without a scheme".to_string(),
            });
        }

        if let Err(e) = url::Url::parse(&format!("https://{}/", self.auth_domain)) {
            return Err(ConfigError::Invalid {
                name: "auth_domain",
                message: format!("is not a valid host name: {}", e),
            });
        }

        if self.min_conversion_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "min_conversion_secs",
                message: "must be greater than 0".to_string(),
            });
        }

        if self.min_transfer_kbps == 0 {
            return Err(ConfigError::Invalid {
                name: "min_transfer_kbps",
                message: "must be greater than 0".to_string(),
            });
        }

        if self.jwks_refresh_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "jwks_refresh_secs",
                message: "must be greater than 0".to_string(),
            });
        }

        if self.db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "db_max_connections",
                message: "must be greater than 0".to_string(),
            });
        }

        if self.db_connect_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "db_connect_attempts",
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Timing policy for bounded upload reads.
    pub fn read_limits(&self) -> ReadLimits {
        ReadLimits::new(self.min_conversion_secs, self.min_transfer_kbps)
    }

    /// Pool and startup retry settings for the account store.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            max_connections: self.db_max_connections,
            attempts: self.db_connect_attempts,
            retry_delay: Duration::from_millis(self.db_connect_retry_ms),
        }
    }

    pub fn jwks_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.jwks_refresh_secs)
    }
}

// =============================================================================
// Tests
// =============================================================================
