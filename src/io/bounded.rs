//! Size- and time-bounded request body reads.
//!
//! An upload is read under two limits at once:
//!
//! - **Byte ceiling**: the account's maximum file size. The body is wrapped
//!   in [`Limited`], so a frame that would cross the ceiling aborts the read
//!   before it is buffered. A body of exactly the ceiling is accepted.
//! - **Deadline**: `max(min_conversion_secs, ceiling_in_kb / min_transfer_kbps)`.
//!   Tiny files always get the floor and large allowances scale with a
//!   minimum acceptable transfer rate.
//!
//! # Concurrency
//!
//! ```text
//!            ┌──────────────────────┐
//!  body ───▶ │ spawned read task    │──┐
//!            └──────────────────────┘  │   tokio::select!
//!            ┌──────────────────────┐  ├──▶ first to finish wins
//!            │ deadline timer       │──┘
//!            └──────────────────────┘
//! ```
//!
//! The read runs on its own task, so the deadline clock is independent of
//! how the client paces its frames. When the timer wins, the read task is
//! aborted and its eventual result is discarded. The task handle is held in
//! an abort-on-drop guard, so the read is also released if the waiting
//! request future is itself dropped.

use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tokio::task::JoinHandle;

/// Default minimum time allowed for any upload, in seconds.
pub const DEFAULT_MIN_CONVERSION_SECS: u64 = 5;

/// Default minimum acceptable transfer rate, in KB/s.
pub const DEFAULT_MIN_TRANSFER_KBPS: u64 = 20;

/// Bytes per kilobyte.
pub const KILOBYTE: u64 = 1024;

/// Bytes per megabyte.
pub const MEGABYTE: u64 = KILOBYTE * 1024;

// =============================================================================
// Read Limits
// =============================================================================

/// Timing policy for bounded reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    /// Floor on the deadline regardless of file size
    pub min_conversion_secs: u64,

    /// Slowest transfer rate that still completes within the deadline
    pub min_transfer_kbps: u64,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            min_conversion_secs: DEFAULT_MIN_CONVERSION_SECS,
            min_transfer_kbps: DEFAULT_MIN_TRANSFER_KBPS,
        }
    }
}

impl ReadLimits {
    pub fn new(min_conversion_secs: u64, min_transfer_kbps: u64) -> Self {
        Self {
            min_conversion_secs,
            min_transfer_kbps,
        }
    }

    /// Deadline for reading a body of at most `max_bytes`.
    pub fn deadline_for(&self, max_bytes: u64) -> Duration {
        let floor = self.min_conversion_secs as f64;
        let max_kb = max_bytes as f64 / KILOBYTE as f64;
        let transfer_secs = max_kb / self.min_transfer_kbps.max(1) as f64;

        Duration::from_secs_f64(floor.max(transfer_secs))
    }
}

// =============================================================================
// Bounded Read
// =============================================================================

/// Result of one bounded read attempt.
#[derive(Debug)]
pub enum BoundedReadOutcome {
    /// The whole body, at most the byte ceiling
    Ok(Bytes),

    /// The body exceeded the byte ceiling
    TooLarge,

    /// The deadline fired before the body completed
    TimedOut,

    /// Any other read failure, with its cause
    OtherIoError(String),
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Read `body` into memory under a byte ceiling and a deadline.
pub async fn read_bounded(body: Body, max_bytes: u64, deadline: Duration) -> BoundedReadOutcome {
    let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX);

    let mut read = AbortOnDrop(tokio::spawn(async move {
        Limited::new(body, limit)
            .collect()
            .await
            .map(|collected| collected.to_bytes())
    }));

    tokio::select! {
        // A read that finishes on the same tick as the timer still counts
        biased;

        joined = &mut read.0 => match joined {
            Ok(Ok(bytes)) => BoundedReadOutcome::Ok(bytes),
            Ok(Err(err)) if err.is::<LengthLimitError>() => BoundedReadOutcome::TooLarge,
            Ok(Err(err)) => BoundedReadOutcome::OtherIoError(err.to_string()),
            Err(join_err) => BoundedReadOutcome::OtherIoError(join_err.to_string()),
        },
        _ = tokio::time::sleep(deadline) => BoundedReadOutcome::TimedOut,
    }
}

// =============================================================================
// Tests
// =============================================================================
