//! Upload I/O.
//!
//! Request bodies are read fully into memory before decoding, under the
//! caller's byte ceiling and a size-scaled deadline. See [`read_bounded`].

mod bounded;

pub use bounded::{
    read_bounded, BoundedReadOutcome, ReadLimits, DEFAULT_MIN_CONVERSION_SECS,
    DEFAULT_MIN_TRANSFER_KBPS, KILOBYTE, MEGABYTE,
};
