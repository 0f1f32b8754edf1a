//! Output formats.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A tile format a layer can produce.
///
/// Each format has a MIME type used on the wire, a short file extension used
/// in URLs and storage keys, and an internal name used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeType {
    Png,
    Png8,
    Jpeg,
    Gif,
    Kml,
}

impl MimeType {
    pub const ALL: [MimeType; 5] = [
        MimeType::Png,
        MimeType::Png8,
        MimeType::Jpeg,
        MimeType::Gif,
        MimeType::Kml,
    ];

    /// MIME type sent to clients and upstream servers.
    pub fn format(&self) -> &'static str {
        match self {
            MimeType::Png => "image/png",
            MimeType::Png8 => "image/png; mode=8bit",
            MimeType::Jpeg => "image/jpeg",
            MimeType::Gif => "image/gif",
            MimeType::Kml => "application/vnd.google-earth.kml+xml",
        }
    }

    /// File extension, also the format segment of URLs.
    pub fn extension(&self) -> &'static str {
        match self {
            MimeType::Png => "png",
            MimeType::Png8 => "png8",
            MimeType::Jpeg => "jpeg",
            MimeType::Gif => "gif",
            MimeType::Kml => "kml",
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, MimeType::Kml)
    }

    /// Whether the format can carry transparency.
    pub fn supports_transparency(&self) -> bool {
        matches!(self, MimeType::Png | MimeType::Png8 | MimeType::Gif)
    }

    /// Parse a MIME type string, ignoring case and surrounding whitespace.
    pub fn from_format(format: &str) -> Option<MimeType> {
        let normalized = format.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "image/png" | "image/png24" | "image/png; mode=24bit" => Some(MimeType::Png),
            "image/png8" | "image/png; mode=8bit" => Some(MimeType::Png8),
            "image/jpeg" | "image/jpg" => Some(MimeType::Jpeg),
            "image/gif" => Some(MimeType::Gif),
            "application/vnd.google-earth.kml+xml" | "application/vnd.google-earth.kml" => {
                Some(MimeType::Kml)
            }
            _ => None,
        }
    }

    /// Parse a file extension.
    pub fn from_extension(extension: &str) -> Option<MimeType> {
        match extension.trim().to_ascii_lowercase().as_str() {
            "png" => Some(MimeType::Png),
            "png8" => Some(MimeType::Png8),
            "jpeg" | "jpg" => Some(MimeType::Jpeg),
            "gif" => Some(MimeType::Gif),
            "kml" => Some(MimeType::Kml),
            _ => None,
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.format())
    }
}

/// Accepts either a MIME type or an extension.
impl FromStr for MimeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MimeType::from_format(s)
            .or_else(|| MimeType::from_extension(s))
            .ok_or_else(|| format!("unsupported format: {}", s))
    }
}
