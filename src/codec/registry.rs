//! Codec registry mapping formats to their decoder and encoder.
//!
//! The registry is built once at startup from a list of `(source, target)`
//! pairs. Each registered pair becomes one conversion route. Registering a
//! pair whose source and target are the same format is rejected while the
//! registry is being built, so a bad route table stops the process before it
//! serves traffic.
//!
//! # Encoding policy
//!
//! - **JPEG** is written at a fixed quality of [`JPEG_QUALITY`]
//! - **PNG** and **WebP** are written losslessly
//!
//! These are constants. Requests cannot tune them.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageReader};

use crate::error::CodecError;

use super::format::ConversionFormat;

/// JPEG quality used for every JPEG encode.
pub const JPEG_QUALITY: u8 = 90;

// =============================================================================
// Conversion
// =============================================================================

/// An ordered pair of distinct formats.
///
/// The only way to build one is [`Conversion::new`], which rejects
/// same-format pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Conversion {
    source: ConversionFormat,
    target: ConversionFormat,
}

impl Conversion {
    /// Create a conversion, rejecting `source == target`.
    pub fn new(source: ConversionFormat, target: ConversionFormat) -> Result<Self, CodecError> {
        if source == target {
            return Err(CodecError::SameFormat(source));
        }
        Ok(Self { source, target })
    }

    pub fn source(&self) -> ConversionFormat {
        self.source
    }

    pub fn target(&self) -> ConversionFormat {
        self.target
    }

    /// Route path serving this conversion, e.g. `/jpeg/png`.
    pub fn route_path(&self) -> String {
        format!("/{}/{}", self.source.tag(), self.target.tag())
    }
}

// =============================================================================
// Decoder / Encoder
// =============================================================================

/// Decodes raw bytes of one format into an in-memory image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoder {
    format: ConversionFormat,
}

impl Decoder {
    pub fn format(&self) -> ConversionFormat {
        self.format
    }

    /// Decode the whole buffer as this decoder's format.
    ///
    /// Empty, truncated, or mislabeled input is a `DecodeFailed` error.
    pub fn decode(&self, data: &[u8]) -> Result<DynamicImage, CodecError> {
        let reader = ImageReader::with_format(Cursor::new(data), self.format.image_format());

        reader.decode().map_err(|e| CodecError::DecodeFailed {
            format: self.format,
            message: e.to_string(),
        })
    }
}

/// Encodes an in-memory image into one format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoder {
    format: ConversionFormat,
}

impl Encoder {
    pub fn format(&self) -> ConversionFormat {
        self.format
    }

    /// Content type of the bytes produced by [`Encoder::encode`].
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    /// Encode the image according to the fixed per-format policy.
    pub fn encode(&self, image: &DynamicImage) -> Result<Bytes, CodecError> {
        let mut output = Vec::new();

        let result = match self.format {
            // JPEG has no alpha channel
            ConversionFormat::Jpeg => {
                JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY)
                    .encode_image(&image.to_rgb8())
            }
            ConversionFormat::Png => image.write_with_encoder(PngEncoder::new(&mut output)),
            ConversionFormat::Webp => {
                // The lossless WebP encoder only takes 8-bit samples
                let eight_bit = if image.color().has_alpha() {
                    DynamicImage::ImageRgba8(image.to_rgba8())
                } else {
                    DynamicImage::ImageRgb8(image.to_rgb8())
                };
                eight_bit.write_with_encoder(WebPEncoder::new_lossless(&mut output))
            }
        };

        result.map_err(|e| CodecError::EncodeFailed {
            format: self.format,
            message: e.to_string(),
        })?;

        Ok(Bytes::from(output))
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Fixed table of registered conversions.
#[derive(Debug, Clone, Default)]
pub struct CodecRegistry {
    conversions: Vec<Conversion>,
}

impl CodecRegistry {
    /// Create a registry with no conversions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every ordered pair of distinct formats (six routes).
    pub fn standard() -> Self {
        let conversions = ConversionFormat::ALL
            .into_iter()
            .flat_map(|source| {
                ConversionFormat::ALL
                    .into_iter()
                    .filter_map(move |target| Conversion::new(source, target).ok())
            })
            .collect();

        Self { conversions }
    }

    /// Build a registry from explicit pairs, failing on the first
    /// same-format pair.
    pub fn from_pairs(pairs: &[(ConversionFormat, ConversionFormat)]) -> Result<Self, CodecError> {
        let mut registry = Self::empty();
        for &(source, target) in pairs {
            registry.register(source, target)?;
        }
        Ok(registry)
    }

    /// Register a conversion. Registering the same pair twice is a no-op.
    pub fn register(
        &mut self,
        source: ConversionFormat,
        target: ConversionFormat,
    ) -> Result<Conversion, CodecError> {
        let conversion = Conversion::new(source, target)?;
        if !self.conversions.contains(&conversion) {
            self.conversions.push(conversion);
        }
        Ok(conversion)
    }

    /// All registered conversions, in registration order.
    pub fn conversions(&self) -> &[Conversion] {
        &self.conversions
    }

    /// Look up a registered conversion.
    pub fn lookup(&self, source: ConversionFormat, target: ConversionFormat) -> Option<Conversion> {
        self.conversions
            .iter()
            .copied()
            .find(|c| c.source == source && c.target == target)
    }

    /// Decoder for a format that is the source of some registered conversion.
    pub fn decoder_for(&self, format: ConversionFormat) -> Option<Decoder> {
        self.conversions
            .iter()
            .any(|c| c.source == format)
            .then_some(Decoder { format })
    }

    /// Encoder for a format that is the target of some registered conversion.
    pub fn encoder_for(&self, format: ConversionFormat) -> Option<Encoder> {
        self.conversions
            .iter()
            .any(|c| c.target == format)
            .then_some(Encoder { format })
    }

    /// Decoder and encoder for a registered conversion.
    pub fn codecs_for(&self, conversion: Conversion) -> Result<(Decoder, Encoder), CodecError> {
        let unregistered = || CodecError::Unregistered {
            from: conversion.source,
            to: conversion.target,
        };

        self.lookup(conversion.source, conversion.target)
            .ok_or_else(unregistered)?;
        let decoder = self.decoder_for(conversion.source).ok_or_else(unregistered)?;
        let encoder = self.encoder_for(conversion.target).ok_or_else(unregistered)?;
        Ok((decoder, encoder))
    }
}

// =============================================================================
// Tests
// =============================================================================
