//! Parameter types for image operations.
//!
//! These types describe *what* to do, not *how* to do it. They are the
//! interface between the editing [`session`](crate::session) (which owns the
//! user-editable state) and the [`backend`](super::backend) (which does the
//! actual pixel work). This separation allows swapping backends (e.g. for
//! testing with a mock) without changing session logic.
//!
//! ## Types
//!
//! - [`Quality`]: Encoder quality (1–100). Clamped and truncated on construction.
//! - [`OutputFormat`]: Target container: JPEG, WebP or PNG, with a stable numeric code.
//! - [`ResizeStrategy`]: How target width/height interact with the source aspect ratio.
//! - [`TransformParameters`]: The user-editable bundle the session mutates.
//! - [`TransformRequest`]: The parsed, numeric view of the parameters handed to a backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quality setting for image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    /// Convert a fractional UI value. Fractions are truncated, not rounded.
    pub fn from_ui(value: f32) -> Self {
        if value.is_nan() {
            return Self::default();
        }
        Self::new(value.clamp(0.0, 100.0) as u32)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(100)
    }
}

/// Output container format.
///
/// The discriminants are the serialization codes and define the total order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg = 0,
    Webp = 1,
    Png = 2,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [Self::Jpeg, Self::Webp, Self::Png];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.code() == code)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Png => "png",
        }
    }

    /// Whether `quality` influences the container's encoding.
    pub fn is_lossy(self) -> bool {
        !matches!(self, Self::Png)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Png => "png",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            "png" => Ok(Self::Png),
            other => Err(format!("unknown output format '{other}' (expected jpeg, webp or png)")),
        }
    }
}

/// How the target width/height are interpreted against the source aspect ratio.
///
/// - `Exact`: stretch to exactly the target dimensions.
/// - `Fit`: scale to fit inside the target box, preserving aspect. A missing
///   field is derived from the other one.
/// - `FillCrop`: scale to cover the target box, then center-crop.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeStrategy {
    #[default]
    Exact = 0,
    Fit = 1,
    FillCrop = 2,
}

impl ResizeStrategy {
    pub const ALL: [ResizeStrategy; 3] = [Self::Exact, Self::Fit, Self::FillCrop];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }
}

impl fmt::Display for ResizeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exact => "exact",
            Self::Fit => "fit",
            Self::FillCrop => "fill-crop",
        };
        f.write_str(name)
    }
}

impl FromStr for ResizeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "fit" | "fit-preserve-aspect" => Ok(Self::Fit),
            "fill" | "fill-crop" | "crop" => Ok(Self::FillCrop),
            other => Err(format!(
                "unknown resize strategy '{other}' (expected exact, fit or fill-crop)"
            )),
        }
    }
}

/// The user-editable transform configuration.
///
/// Width and height are kept as text because they mirror editable fields:
/// an empty string means "derive from the source".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformParameters {
    pub width: String,
    pub height: String,
    pub quality: f32,
    pub format: OutputFormat,
    pub strategy: ResizeStrategy,
    /// Degrees, normalized to `0..360` in quarter turns.
    pub rotation: i32,
    pub flipped: bool,
    /// Encoded size of the last preview, in bytes. Advisory only.
    pub size_estimate: u64,
}

impl Default for TransformParameters {
    fn default() -> Self {
        Self {
            width: String::new(),
            height: String::new(),
            quality: 100.0,
            format: OutputFormat::default(),
            strategy: ResizeStrategy::default(),
            rotation: 0,
            flipped: false,
            size_estimate: 0,
        }
    }
}

impl TransformParameters {
    /// Fresh parameters whose target fields mirror the given source dimensions.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self {
            width: width.to_string(),
            height: height.to_string(),
            ..Self::default()
        }
    }

    pub fn target_width(&self) -> Option<u32> {
        parse_dimension(&self.width)
    }

    pub fn target_height(&self) -> Option<u32> {
        parse_dimension(&self.height)
    }

    pub fn quality(&self) -> Quality {
        Quality::from_ui(self.quality)
    }

    /// Number of clockwise quarter turns (0–3).
    pub fn quarter_turns(&self) -> u8 {
        (self.rotation.rem_euclid(360) / 90) as u8
    }

    pub fn request(&self) -> TransformRequest {
        TransformRequest {
            width: self.target_width(),
            height: self.target_height(),
            format: self.format,
            quality: self.quality(),
            strategy: self.strategy,
            quarter_turns: self.quarter_turns(),
            flipped: self.flipped,
        }
    }
}

fn parse_dimension(field: &str) -> Option<u32> {
    field.trim().parse::<u32>().ok().filter(|&v| v > 0)
}

/// Parsed transform description handed to an [`ImageBackend`](super::ImageBackend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformRequest {
    /// Target width of the final canvas; `None` derives it from the source.
    pub width: Option<u32>,
    /// Target height of the final canvas; `None` derives it from the source.
    pub height: Option<u32>,
    pub format: OutputFormat,
    pub quality: Quality,
    pub strategy: ResizeStrategy,
    pub quarter_turns: u8,
    pub flipped: bool,
}

impl Default for TransformRequest {
    fn default() -> Self {
        TransformParameters::default().request()
    }
}
