//! Quota decisions from plan limits and recent usage.

use std::sync::Arc;

use tracing::debug;

use crate::error::StorageError;
use crate::io::MEGABYTE;
use crate::store::{AccountStore, PlanUsage};

/// Whether a subject may convert now, and the largest upload it may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    /// `recent_conversions < max_interactions`
    pub allowed: bool,

    /// Upload ceiling in bytes, populated even when `allowed` is false
    pub max_upload_size_bytes: u64,
}

impl QuotaDecision {
    /// Derive a decision from plan usage.
    ///
    /// Negative limits from storage are treated as zero.
    pub fn from_usage(usage: &PlanUsage) -> Self {
        let max_mb = u64::try_from(usage.max_file_size_mb).unwrap_or(0);

        Self {
            allowed: usage.recent_conversions < usage.max_interactions,
            max_upload_size_bytes: max_mb.saturating_mul(MEGABYTE),
        }
    }
}

/// Answers quota questions for a subject against the account store.
pub struct QuotaGate<S: AccountStore> {
    store: Arc<S>,
}

impl<S: AccountStore> QuotaGate<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Evaluate the subject's quota with a single store round trip.
    ///
    /// An exhausted quota is an `allowed == false` decision, not an error.
    pub async fn evaluate(&self, subject: &str) -> Result<QuotaDecision, StorageError> {
        let usage = self.store.plan_usage(subject).await?;
        let decision = QuotaDecision::from_usage(&usage);

        debug!(
            subject,
            recent = usage.recent_conversions,
            max = usage.max_interactions,
            allowed = decision.allowed,
            "Evaluated quota"
        );

        Ok(decision)
    }
}

impl<S: AccountStore> Clone for QuotaGate<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}
