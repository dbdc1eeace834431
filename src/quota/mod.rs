//! Per-account quota enforcement.
//!
//! - [`QuotaGate`]: decides whether a subject may convert and how large its
//!   upload may be
//! - [`UsageRecorder`]: appends completed conversions for future decisions
//!
//! The gate's read and the recorder's write are separate statements, so two
//! concurrent conversions for the same subject can both pass the gate when
//! one conversion is left. Quota is a best-effort bound under concurrency.

mod gate;
mod recorder;

pub use gate::{QuotaDecision, QuotaGate};
pub use recorder::UsageRecorder;
