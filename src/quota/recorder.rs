//! Append-only recording of completed conversions.

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::RecordingError;
use crate::store::{AccountStore, ConversionRecord};

/// Writes conversion records that feed future quota decisions.
pub struct UsageRecorder<S: AccountStore> {
    store: Arc<S>,
}

impl<S: AccountStore> UsageRecorder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append a record. Failures are returned to the caller, never dropped.
    pub async fn record(&self, record: &ConversionRecord) -> Result<(), RecordingError> {
        match self.store.insert_conversion(record).await {
            Ok(()) => {
                debug!(
                    subject = %record.subject,
                    source = %record.source,
                    target = %record.target,
                    bytes = record.size_bytes,
                    "Recorded conversion"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    subject = %record.subject,
                    source = %record.source,
                    target = %record.target,
                    error = %e,
                    "Failed to record conversion"
                );
                Err(RecordingError(e))
            }
        }
    }
}

impl<S: AccountStore> Clone for UsageRecorder<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}
