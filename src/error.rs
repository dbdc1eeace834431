use std::time::Duration;

use thiserror::Error;

use crate::codec::ConversionFormat;

/// Errors from the persistent account store.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// No account row exists for the subject
    #[error("Account not found: {0}")]
    NotFound(String),

    /// The store could not be reached or the pool is exhausted
    #[error("Storage connection failure: {0}")]
    ConnectionFailure(String),

    /// The store was reachable but the query failed
    #[error("Storage query failed: {0}")]
    Query(String),
}

/// Errors from the codec registry and the decode/encode step.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Uploaded bytes are not a valid image of the route's source format
    #[error("not a valid {format}: {message}")]
    DecodeFailed {
        format: ConversionFormat,
        message: String,
    },

    /// The decoded image could not be written in the target format
    #[error("Failed to encode {format}: {message}")]
    EncodeFailed {
        format: ConversionFormat,
        message: String,
    },

    /// A same-format pair was registered
    #[error("Conversion from {0} to itself is not supported")]
    SameFormat(ConversionFormat),

    /// The pair was never registered with the codec registry
    #[error("No codec registered for {from} -> {to}")]
    Unregistered {
        from: ConversionFormat,
        to: ConversionFormat,
    },
}

/// Failure to append a conversion record after a successful encode.
#[derive(Debug, Clone, Error)]
#[error("Failed to record conversion: {0}")]
pub struct RecordingError(#[from] pub StorageError);

/// Errors from the trusted key set used to verify bearer tokens.
#[derive(Debug, Clone, Error)]
pub enum KeySetError {
    /// The key set could not be downloaded
    #[error("Failed to fetch key set from {url}: {message}")]
    Fetch { url: String, message: String },

    /// The downloaded document held no usable verification keys
    #[error("Key set at {0} contains no usable keys")]
    Empty(String),
}

/// Every way a conversion request can be rejected once the caller is known.
#[derive(Debug, Clone, Error)]
pub enum ConversionError {
    /// The quota lookup itself failed
    #[error("Failed to check conversion permissions: {0}")]
    Storage(#[from] StorageError),

    /// The account has used up its conversions for the trailing 24 hours
    #[error("Conversion quota exhausted for the last 24 hours")]
    QuotaExceeded { max_upload_size_bytes: u64 },

    /// The upload exceeded the account's file size limit
    #[error("The file exceeds the account limit of {limit_bytes} bytes")]
    PayloadTooLarge { limit_bytes: u64 },

    /// The upload did not complete before its deadline
    #[error("Upload did not complete within {deadline:?}")]
    Timeout { deadline: Duration },

    /// The body could not be read for any other reason
    #[error("Failed to read file: {message}")]
    Read { message: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Recording(#[from] RecordingError),
}

/// Configuration validation errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A required option is empty
    #[error("{name} is required. Set {flag} or {env}")]
    Missing {
        name: &'static str,
        flag: &'static str,
        env: &'static str,
    },

    /// An option is present but out of range
    #[error("{name} {message}")]
    Invalid { name: &'static str, message: String },
}
