//! Persistent account storage.
//!
//! The conversion pipeline only needs two queries from storage: a plan and
//! usage lookup for quota decisions, and an append of completed conversions.
//! The user profile endpoints add an upsert and a lookup by auth id.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   QuotaGate  /  UsageRecorder  /  HTTP  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           AccountStore Trait            │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │    PgAccountStore (sqlx, PostgreSQL)    │
//! └─────────────────────────────────────────┘
//! ```

mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{Conversion, ConversionFormat};
use crate::error::StorageError;

pub use postgres::{ConnectOptions, PgAccountStore};

// =============================================================================
// Records
// =============================================================================

/// Plan limits joined with the trailing 24-hour conversion count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanUsage {
    /// Conversions allowed per rolling 24-hour window
    pub max_interactions: i64,

    /// Largest accepted upload in megabytes
    pub max_file_size_mb: i64,

    /// Conversions performed in the trailing 24 hours
    pub recent_conversions: i64,
}

/// Immutable fact of one completed conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRecord {
    pub subject: String,
    pub source: ConversionFormat,
    pub target: ConversionFormat,
    /// Size of the uploaded file in bytes
    pub size_bytes: u64,
    pub recorded_at: DateTime<Utc>,
}

impl ConversionRecord {
    /// Record a conversion completed now.
    pub fn new(subject: impl Into<String>, conversion: Conversion, size_bytes: u64) -> Self {
        Self {
            subject: subject.into(),
            source: conversion.source(),
            target: conversion.target(),
            size_bytes,
            recorded_at: Utc::now(),
        }
    }
}

/// A user profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Identity provider subject, e.g. `google-oauth2|1234`
    pub auth_id: String,
    pub name: String,
    pub email: String,
    pub account_type_id: String,
}

// =============================================================================
// AccountStore Trait
// =============================================================================

/// Storage backend for accounts, plans, and conversion history.
///
/// Implementations must be shareable across concurrent requests.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Plan limits and trailing 24-hour usage for a subject, in one round trip.
    ///
    /// A subject with no prior conversions has `recent_conversions == 0`.
    /// An unknown subject is `StorageError::NotFound`.
    async fn plan_usage(&self, subject: &str) -> Result<PlanUsage, StorageError>;

    /// Append a completed conversion.
    async fn insert_conversion(&self, record: &ConversionRecord) -> Result<(), StorageError>;

    /// Create or update a user profile keyed by `auth_id`.
    async fn upsert_user(&self, profile: &UserProfile) -> Result<(), StorageError>;

    /// Look up a user profile.
    async fn find_user(&self, auth_id: &str) -> Result<Option<UserProfile>, StorageError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StorageError>;
}
