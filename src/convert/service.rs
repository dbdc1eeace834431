//! Conversion service orchestrating the quota-bounded pipeline.
//!
//! # Pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      ConversionService                          │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                       convert()                           │  │
//! │  │  1. Evaluate quota      4. Encode target format           │  │
//! │  │  2. Bounded body read   5. Record conversion              │  │
//! │  │  3. Decode source       6. Return encoded bytes           │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │         │                    │                    │             │
//! │         ▼                    ▼                    ▼             │
//! │   ┌───────────┐      ┌──────────────┐    ┌───────────────┐     │
//! │   │ QuotaGate │      │ CodecRegistry│    │ UsageRecorder │     │
//! │   └───────────┘      └──────────────┘    └───────────────┘     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Identity verification happens before the service is reached (router
//! middleware). Each gate is cheaper than the next and short-circuits the
//! rest, so the order above is fixed.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::codec::{CodecRegistry, Conversion};
use crate::error::ConversionError;
use crate::io::{read_bounded, BoundedReadOutcome, ReadLimits};
use crate::quota::{QuotaGate, UsageRecorder};
use crate::store::{AccountStore, ConversionRecord};

// =============================================================================
// Request / Response
// =============================================================================

/// One conversion request from a verified caller.
pub struct ConversionRequest {
    /// Verified subject of the caller
    pub subject: String,

    /// Registered conversion selected by the route
    pub conversion: Conversion,

    /// Raw upload body, not yet read
    pub body: Body,
}

impl ConversionRequest {
    pub fn new(subject: impl Into<String>, conversion: Conversion, body: Body) -> Self {
        Self {
            subject: subject.into(),
            conversion,
            body,
        }
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone)]
pub struct ConversionResponse {
    /// Encoded image in the target format
    pub data: Bytes,

    /// Content type of `data`
    pub content_type: &'static str,

    /// Size of the accepted upload in bytes
    pub source_bytes: u64,
}

// =============================================================================
// Conversion Service
// =============================================================================

/// Runs quota check, bounded read, decode, encode, and recording in order.
pub struct ConversionService<S: AccountStore> {
    store: Arc<S>,
    registry: CodecRegistry,
    quota: QuotaGate<S>,
    recorder: UsageRecorder<S>,
    limits: ReadLimits,
}

impl<S: AccountStore> ConversionService<S> {
    /// Create a service over a store and a startup-built registry.
    pub fn new(store: S, registry: CodecRegistry, limits: ReadLimits) -> Self {
        Self::with_shared_store(Arc::new(store), registry, limits)
    }

    /// Create a service sharing an existing store handle.
    pub fn with_shared_store(store: Arc<S>, registry: CodecRegistry, limits: ReadLimits) -> Self {
        Self {
            quota: QuotaGate::new(Arc::clone(&store)),
            recorder: UsageRecorder::new(Arc::clone(&store)),
            store,
            registry,
            limits,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    /// Run the full pipeline for one request.
    ///
    /// # Errors
    ///
    /// - `Storage` if the quota lookup fails
    /// - `QuotaExceeded` if the trailing 24-hour quota is used up
    /// - `PayloadTooLarge`, `Timeout`, or `Read` from the bounded read
    /// - `Codec` if the upload does not decode or the image does not encode
    /// - `Recording` if the completed conversion could not be recorded
    pub async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionResponse, ConversionError> {
        let ConversionRequest {
            subject,
            conversion,
            body,
        } = request;

        // Resolve codecs first so an unregistered pair never touches storage
        let (decoder, encoder) = self.registry.codecs_for(conversion)?;

        let decision = self.quota.evaluate(&subject).await?;
        if !decision.allowed {
            debug!(subject = %subject, "Conversion quota exhausted");
            return Err(ConversionError::QuotaExceeded {
                max_upload_size_bytes: decision.max_upload_size_bytes,
            });
        }

        let max_bytes = decision.max_upload_size_bytes;
        let deadline = self.limits.deadline_for(max_bytes);
        let data = self.read_upload(body, max_bytes, deadline).await?;
        let source_bytes = data.len() as u64;

        debug!(
            subject = %subject,
            source = %conversion.source(),
            target = %conversion.target(),
            bytes = source_bytes,
            "Upload received"
        );

        let image = decoder.decode(&data)?;
        let encoded = encoder.encode(&image)?;

        let record = ConversionRecord::new(subject.as_str(), conversion, source_bytes);
        self.recorder.record(&record).await?;

        info!(
            subject = %subject,
            source = %conversion.source(),
            target = %conversion.target(),
            source_bytes,
            output_bytes = encoded.len(),
            "Conversion completed"
        );

        Ok(ConversionResponse {
            data: encoded,
            content_type: encoder.content_type(),
            source_bytes,
        })
    }

    async fn read_upload(
        &self,
        body: Body,
        max_bytes: u64,
        deadline: Duration,
    ) -> Result<Bytes, ConversionError> {
        match read_bounded(body, max_bytes, deadline).await {
            BoundedReadOutcome::Ok(data) => Ok(data),
            BoundedReadOutcome::TooLarge => Err(ConversionError::PayloadTooLarge {
                limit_bytes: max_bytes,
            }),
            BoundedReadOutcome::TimedOut => Err(ConversionError::Timeout { deadline }),
            BoundedReadOutcome::OtherIoError(message) => {
                warn!(error = %message, "Failed to read upload");
                Err(ConversionError::Read { message })
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
