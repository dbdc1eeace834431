//! PostgreSQL-backed implementation of `AccountStore`.
//!
//! Schema (owned by the database migrations, not this crate):
//!
//! ```text
//! account_types(account_type_id, max_interactions, max_file_size_mb)
//! users(user_id, auth_id UNIQUE, email, nickname, account_type_id)
//! conversions(user_id, starting_type, resulting_type, file_size_kb, created_at)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use crate::error::StorageError;

use super::{AccountStore, ConversionRecord, PlanUsage, UserProfile};

const PLAN_USAGE_QUERY: &str = r#"
    SELECT
        at.max_interactions::BIGINT,
        at.max_file_size_mb::BIGINT,
        COALESCE(c.count, 0)::BIGINT AS recent_conversions
    FROM users u
    JOIN account_types at ON u.account_type_id = at.account_type_id
    LEFT JOIN (
        SELECT user_id, COUNT(*) AS count
        FROM conversions
        WHERE created_at >= NOW() - INTERVAL '24 hours'
        GROUP BY user_id
    ) c ON u.user_id = c.user_id
    WHERE u.auth_id = $1
"#;

const INSERT_CONVERSION_QUERY: &str = r#"
    INSERT INTO conversions (user_id, starting_type, resulting_type, file_size_kb, created_at)
    VALUES (
        (SELECT user_id FROM users WHERE auth_id = $1),
        $2, $3, $4, $5
    )
"#;

const UPSERT_USER_QUERY: &str = r#"
    INSERT INTO users (auth_id, email, nickname, account_type_id)
    VALUES ($1, $2, $3, $4::INTEGER)
    ON CONFLICT (auth_id) DO UPDATE
        SET email = EXCLUDED.email,
            nickname = EXCLUDED.nickname,
            account_type_id = EXCLUDED.account_type_id
"#;

const FIND_USER_QUERY: &str = r#"
    SELECT auth_id, nickname, email, account_type_id::TEXT
    FROM users
    WHERE auth_id = $1
"#;

// =============================================================================
// Connection
// =============================================================================

/// Pool and startup retry settings.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    /// Maximum pooled connections shared by all requests
    pub max_connections: u32,

    /// Connection attempts before giving up
    pub attempts: u32,

    /// Fixed delay between attempts
    pub retry_delay: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            attempts: 10,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// `AccountStore` over a shared `sqlx` Postgres pool.
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database, retrying a bounded number of times.
    ///
    /// The database container commonly starts after the service, so early
    /// failures are expected and logged at warn level.
    pub async fn connect(url: &str, options: ConnectOptions) -> Result<Self, StorageError> {
        let attempts = options.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let result = PgPoolOptions::new()
                .max_connections(options.max_connections)
                .connect(url)
                .await;

            match result {
                Ok(pool) => {
                    info!(attempt, "Connected to Postgres");
                    return Ok(Self::new(pool));
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Database connection failed, retrying"
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::time::sleep(options.retry_delay).await;
            }
        }

        Err(StorageError::ConnectionFailure(last_error))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map sqlx errors onto the storage taxonomy.
fn storage_error(err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StorageError::ConnectionFailure(err.to_string()),
        other => StorageError::Query(other.to_string()),
    }
}

/// Whole kilobytes needed to hold `bytes`, rounded up.
fn size_in_kb(bytes: u64) -> i64 {
    i64::try_from(bytes.div_ceil(1024)).unwrap_or(i64::MAX)
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn plan_usage(&self, subject: &str) -> Result<PlanUsage, StorageError> {
        let row: Option<(i64, i64, i64)> = sqlx::query_as(PLAN_USAGE_QUERY)
            .bind(subject)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        let (max_interactions, max_file_size_mb, recent_conversions) =
            row.ok_or_else(|| StorageError::NotFound(subject.to_string()))?;

        Ok(PlanUsage {
            max_interactions,
            max_file_size_mb,
            recent_conversions,
        })
    }

    async fn insert_conversion(&self, record: &ConversionRecord) -> Result<(), StorageError> {
        sqlx::query(INSERT_CONVERSION_QUERY)
            .bind(&record.subject)
            .bind(record.source.tag())
            .bind(record.target.tag())
            .bind(size_in_kb(record.size_bytes))
            .bind(record.recorded_at)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn upsert_user(&self, profile: &UserProfile) -> Result<(), StorageError> {
        sqlx::query(UPSERT_USER_QUERY)
            .bind(&profile.auth_id)
            .bind(&profile.email)
            .bind(&profile.name)
            .bind(&profile.account_type_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn find_user(&self, auth_id: &str) -> Result<Option<UserProfile>, StorageError> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(FIND_USER_QUERY)
            .bind(auth_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.map(|(auth_id, name, email, account_type_id)| UserProfile {
            auth_id,
            name,
            email,
            account_type_id,
        }))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
