//! Codec registry and image formats.
//!
//! - [`ConversionFormat`]: the closed set of supported formats
//! - [`Conversion`]: an ordered `(source, target)` pair of distinct formats
//! - [`CodecRegistry`]: startup-built table of conversions and their codecs

mod format;
mod registry;

pub use format::ConversionFormat;
pub use registry::{CodecRegistry, Conversion, Decoder, Encoder, JPEG_QUALITY};
