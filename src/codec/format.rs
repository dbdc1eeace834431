//! Image formats accepted and produced by the conversion endpoints.

use std::fmt;

use image::ImageFormat;
use serde::{Deserialize, Serialize};

/// One of the closed set of formats the service converts between.
///
/// The format of an upload is decided purely by the route it was posted to;
/// the request `Content-Type` is never inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionFormat {
    Jpeg,
    Png,
    Webp,
}

impl ConversionFormat {
    /// Every supported format, in route registration order.
    pub const ALL: [ConversionFormat; 3] = [
        ConversionFormat::Jpeg,
        ConversionFormat::Png,
        ConversionFormat::Webp,
    ];

    /// Tag used in route paths and conversion records (e.g. `"jpeg"`).
    pub fn tag(self) -> &'static str {
        match self {
            ConversionFormat::Jpeg => "jpeg",
            ConversionFormat::Png => "png",
            ConversionFormat::Webp => "webp",
        }
    }

    /// Parse a route tag. Tags are lowercase and exact.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.tag() == tag)
    }

    /// MIME type of an encoded image in this format.
    pub fn content_type(self) -> &'static str {
        match self {
            ConversionFormat::Jpeg => "image/jpeg",
            ConversionFormat::Png => "image/png",
            ConversionFormat::Webp => "image/webp",
        }
    }

    /// The matching `image` crate format.
    pub fn image_format(self) -> ImageFormat {
        match self {
            ConversionFormat::Jpeg => ImageFormat::Jpeg,
            ConversionFormat::Png => ImageFormat::Png,
            ConversionFormat::Webp => ImageFormat::WebP,
        }
    }
}

impl fmt::Display for ConversionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
