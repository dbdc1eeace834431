//! Conversion pipeline.
//!
//! [`ConversionService`] is the composition root of the core: it takes a
//! verified subject and a raw upload and runs quota check, bounded read,
//! decode, encode, and usage recording in that order.

mod service;

pub use service::{ConversionRequest, ConversionResponse, ConversionService};
