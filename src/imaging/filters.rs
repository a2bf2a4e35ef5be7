//! Pixel filters.
//!
//! [`Filter`] is a closed set of filters, each variant carrying its own
//! strongly-typed parameter (a scalar, a named pair, a 4×4 matrix, or nothing).
//! Every variant has a pure apply function; all filters keep the image
//! dimensions and return RGBA8 output.
//!
//! Filters can be written on the command line as `name`, `name=value` or
//! `name=a,b`:
//!
//! ```
//! # use shrinker::imaging::Filter;
//! let f: Filter = "white_balance=6500,10".parse().unwrap();
//! assert_eq!(f, Filter::WhiteBalance { temperature: 6500.0, tint: 10.0 });
//! ```

use image::imageops;
use image::{DynamicImage, GenericImageView, Rgb, Rgb32FImage, Rgba, Rgba32FImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FilterParseError {
    #[error("unknown filter '{0}'")]
    Unknown(String),
    #[error("filter '{filter}': '{value}' is not a number")]
    BadValue { filter: String, value: String },
    #[error("filter '{filter}' takes {expected} value(s), got {got}")]
    WrongArity {
        filter: String,
        expected: usize,
        got: usize,
    },
}

pub const IDENTITY_MATRIX: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// A configured filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter", content = "value", rename_all = "snake_case")]
pub enum Filter {
    Brightness(f32),
    Contrast(f32),
    /// Hue rotation in degrees.
    Hue(f32),
    Saturation(f32),
    /// Exposure in stops.
    Exposure(f32),
    WhiteBalance { temperature: f32, tint: f32 },
    Monochrome(f32),
    Gamma(f32),
    Sepia(f32),
    Sharpen(f32),
    Negative,
    Solarize(f32),
    Vibrance(f32),
    BlackAndWhite,
    GaussianBlur(f32),
    BoxBlur(f32),
    Emboss(f32),
    Laplacian,
    SobelEdgeDetection,
    Vignette { start: f32, end: f32 },
    /// Color levels per channel.
    Posterize(f32),
    Opacity(f32),
    /// Row-major 4×4 matrix applied to RGBA.
    ColorMatrix([f32; 16]),
    SwirlDistortion { angle: f32, radius: f32 },
    BulgeDistortion { radius: f32, scale: f32 },
}

/// Payload-free discriminant of [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Brightness,
    Contrast,
    Hue,
    Saturation,
    Exposure,
    WhiteBalance,
    Monochrome,
    Gamma,
    Sepia,
    Sharpen,
    Negative,
    Solarize,
    Vibrance,
    BlackAndWhite,
    GaussianBlur,
    BoxBlur,
    Emboss,
    Laplacian,
    SobelEdgeDetection,
    Vignette,
    Posterize,
    Opacity,
    ColorMatrix,
    SwirlDistortion,
    BulgeDistortion,
}

impl FilterKind {
    pub const ALL: [FilterKind; 25] = [
        Self::Brightness,
        Self::Contrast,
        Self::Hue,
        Self::Saturation,
        Self::Exposure,
        Self::WhiteBalance,
        Self::Monochrome,
        Self::Gamma,
        Self::Sepia,
        Self::Sharpen,
        Self::Negative,
        Self::Solarize,
        Self::Vibrance,
        Self::BlackAndWhite,
        Self::GaussianBlur,
        Self::BoxBlur,
        Self::Emboss,
        Self::Laplacian,
        Self::SobelEdgeDetection,
        Self::Vignette,
        Self::Posterize,
        Self::Opacity,
        Self::ColorMatrix,
        Self::SwirlDistortion,
        Self::BulgeDistortion,
    ];

    /// Command-line / serialized name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Brightness => "brightness",
            Self::Contrast => "contrast",
            Self::Hue => "hue",
            Self::Saturation => "saturation",
            Self::Exposure => "exposure",
            Self::WhiteBalance => "white_balance",
            Self::Monochrome => "monochrome",
            Self::Gamma => "gamma",
            Self::Sepia => "sepia",
            Self::Sharpen => "sharpen",
            Self::Negative => "negative",
            Self::Solarize => "solarize",
            Self::Vibrance => "vibrance",
            Self::BlackAndWhite => "black_and_white",
            Self::GaussianBlur => "gaussian_blur",
            Self::BoxBlur => "box_blur",
            Self::Emboss => "emboss",
            Self::Laplacian => "laplacian",
            Self::SobelEdgeDetection => "sobel_edge_detection",
            Self::Vignette => "vignette",
            Self::Posterize => "posterize",
            Self::Opacity => "opacity",
            Self::ColorMatrix => "color_matrix",
            Self::SwirlDistortion => "swirl_distortion",
            Self::BulgeDistortion => "bulge_distortion",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Number of numeric values the filter takes.
    pub fn arity(self) -> usize {
        match self {
            Self::Negative
            | Self::BlackAndWhite
            | Self::Laplacian
            | Self::SobelEdgeDetection => 0,
            Self::WhiteBalance
            | Self::Vignette
            | Self::SwirlDistortion
            | Self::BulgeDistortion => 2,
            Self::ColorMatrix => 16,
            _ => 1,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Filter {
    /// A fresh filter of the given kind with its default value.
    pub fn default_for(kind: FilterKind) -> Self {
        match kind {
            FilterKind::Brightness => Self::Brightness(0.0),
            FilterKind::Contrast => Self::Contrast(1.0),
            FilterKind::Hue => Self::Hue(90.0),
            FilterKind::Saturation => Self::Saturation(1.0),
            FilterKind::Exposure => Self::Exposure(0.0),
            FilterKind::WhiteBalance => Self::WhiteBalance {
                temperature: 5000.0,
                tint: 0.0,
            },
            FilterKind::Monochrome => Self::Monochrome(1.0),
            FilterKind::Gamma => Self::Gamma(1.0),
            FilterKind::Sepia => Self::Sepia(1.0),
            FilterKind::Sharpen => Self::Sharpen(1.0),
            FilterKind::Negative => Self::Negative,
            FilterKind::Solarize => Self::Solarize(0.5),
            FilterKind::Vibrance => Self::Vibrance(0.0),
            FilterKind::BlackAndWhite => Self::BlackAndWhite,
            FilterKind::GaussianBlur => Self::GaussianBlur(2.0),
            FilterKind::BoxBlur => Self::BoxBlur(1.0),
            FilterKind::Emboss => Self::Emboss(1.0),
            FilterKind::Laplacian => Self::Laplacian,
            FilterKind::SobelEdgeDetection => Self::SobelEdgeDetection,
            FilterKind::Vignette => Self::Vignette {
                start: 0.3,
                end: 0.75,
            },
            FilterKind::Posterize => Self::Posterize(5.0),
            FilterKind::Opacity => Self::Opacity(1.0),
            FilterKind::ColorMatrix => Self::ColorMatrix(IDENTITY_MATRIX),
            FilterKind::SwirlDistortion => Self::SwirlDistortion {
                angle: 1.0,
                radius: 0.5,
            },
            FilterKind::BulgeDistortion => Self::BulgeDistortion {
                radius: 0.25,
                scale: 0.5,
            },
        }
    }

    /// Build a filter from positional values (see [`FilterKind::arity`]).
    pub fn with_values(kind: FilterKind, values: &[f32]) -> Result<Self, FilterParseError> {
        if values.len() != kind.arity() {
            return Err(FilterParseError::WrongArity {
                filter: kind.name().to_string(),
                expected: kind.arity(),
                got: values.len(),
            });
        }
        let v = |i: usize| values[i];
        let filter = match kind {
            FilterKind::Brightness => Self::Brightness(v(0)),
            FilterKind::Contrast => Self::Contrast(v(0)),
            FilterKind::Hue => Self::Hue(v(0)),
            FilterKind::Saturation => Self::Saturation(v(0)),
            FilterKind::Exposure => Self::Exposure(v(0)),
            FilterKind::WhiteBalance => Self::WhiteBalance {
                temperature: v(0),
                tint: v(1),
            },
            FilterKind::Monochrome => Self::Monochrome(v(0)),
            FilterKind::Gamma => Self::Gamma(v(0)),
            FilterKind::Sepia => Self::Sepia(v(0)),
            FilterKind::Sharpen => Self::Sharpen(v(0)),
            FilterKind::Solarize => Self::Solarize(v(0)),
            FilterKind::Vibrance => Self::Vibrance(v(0)),
            FilterKind::GaussianBlur => Self::GaussianBlur(v(0)),
            FilterKind::BoxBlur => Self::BoxBlur(v(0)),
            FilterKind::Emboss => Self::Emboss(v(0)),
            FilterKind::Vignette => Self::Vignette {
                start: v(0),
                end: v(1),
            },
            FilterKind::Posterize => Self::Posterize(v(0)),
            FilterKind::Opacity => Self::Opacity(v(0)),
            FilterKind::ColorMatrix => {
                let mut matrix = [0.0; 16];
                matrix.copy_from_slice(values);
                Self::ColorMatrix(matrix)
            }
            FilterKind::SwirlDistortion => Self::SwirlDistortion {
                angle: v(0),
                radius: v(1),
            },
            FilterKind::BulgeDistortion => Self::BulgeDistortion {
                radius: v(0),
                scale: v(1),
            },
            FilterKind::Negative
            | FilterKind::BlackAndWhite
            | FilterKind::Laplacian
            | FilterKind::SobelEdgeDetection => Self::default_for(kind),
        };
        Ok(filter)
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Self::Brightness(_) => FilterKind::Brightness,
            Self::Contrast(_) => FilterKind::Contrast,
            Self::Hue(_) => FilterKind::Hue,
            Self::Saturation(_) => FilterKind::Saturation,
            Self::Exposure(_) => FilterKind::Exposure,
            Self::WhiteBalance { .. } => FilterKind::WhiteBalance,
            Self::Monochrome(_) => FilterKind::Monochrome,
            Self::Gamma(_) => FilterKind::Gamma,
            Self::Sepia(_) => FilterKind::Sepia,
            Self::Sharpen(_) => FilterKind::Sharpen,
            Self::Negative => FilterKind::Negative,
            Self::Solarize(_) => FilterKind::Solarize,
            Self::Vibrance(_) => FilterKind::Vibrance,
            Self::BlackAndWhite => FilterKind::BlackAndWhite,
            Self::GaussianBlur(_) => FilterKind::GaussianBlur,
            Self::BoxBlur(_) => FilterKind::BoxBlur,
            Self::Emboss(_) => FilterKind::Emboss,
            Self::Laplacian => FilterKind::Laplacian,
            Self::SobelEdgeDetection => FilterKind::SobelEdgeDetection,
            Self::Vignette { .. } => FilterKind::Vignette,
            Self::Posterize(_) => FilterKind::Posterize,
            Self::Opacity(_) => FilterKind::Opacity,
            Self::ColorMatrix(_) => FilterKind::ColorMatrix,
            Self::SwirlDistortion { .. } => FilterKind::SwirlDistortion,
            Self::BulgeDistortion { .. } => FilterKind::BulgeDistortion,
        }
    }

    /// Human-readable title.
    pub fn title(&self) -> &'static str {
        match self.kind() {
            FilterKind::Brightness => "Brightness",
            FilterKind::Contrast => "Contrast",
            FilterKind::Hue => "Hue",
            FilterKind::Saturation => "Saturation",
            FilterKind::Exposure => "Exposure",
            FilterKind::WhiteBalance => "White balance",
            FilterKind::Monochrome => "Monochrome",
            FilterKind::Gamma => "Gamma",
            FilterKind::Sepia => "Sepia",
            FilterKind::Sharpen => "Sharpen",
            FilterKind::Negative => "Negative",
            FilterKind::Solarize => "Solarize",
            FilterKind::Vibrance => "Vibrance",
            FilterKind::BlackAndWhite => "Black and white",
            FilterKind::GaussianBlur => "Gaussian blur",
            FilterKind::BoxBlur => "Box blur",
            FilterKind::Emboss => "Emboss",
            FilterKind::Laplacian => "Laplacian",
            FilterKind::SobelEdgeDetection => "Sobel edge detection",
            FilterKind::Vignette => "Vignette",
            FilterKind::Posterize => "Posterize",
            FilterKind::Opacity => "Opacity",
            FilterKind::ColorMatrix => "Color matrix",
            FilterKind::SwirlDistortion => "Swirl distortion",
            FilterKind::BulgeDistortion => "Bulge distortion",
        }
    }

    /// Range the UI slider for this filter's primary value spans.
    ///
    /// `None` for filters without a value and for the color matrix.
    pub fn value_range(&self) -> Option<RangeInclusive<f32>> {
        let range = match self.kind() {
            FilterKind::Brightness => -1.0..=1.0,
            FilterKind::Contrast => 0.0..=4.0,
            FilterKind::Hue => 0.0..=360.0,
            FilterKind::Saturation => 0.0..=2.0,
            FilterKind::Exposure => -10.0..=10.0,
            FilterKind::WhiteBalance => 2000.0..=8000.0,
            FilterKind::Monochrome | FilterKind::Sepia | FilterKind::Solarize => 0.0..=1.0,
            FilterKind::Gamma => 0.0..=3.0,
            FilterKind::Sharpen => -4.0..=4.0,
            FilterKind::Vibrance => -1.2..=1.2,
            FilterKind::GaussianBlur | FilterKind::BoxBlur => 0.0..=25.0,
            FilterKind::Emboss => 0.0..=4.0,
            FilterKind::Vignette | FilterKind::Opacity => 0.0..=1.0,
            FilterKind::Posterize => 1.0..=40.0,
            FilterKind::SwirlDistortion => -2.0..=2.0,
            FilterKind::BulgeDistortion => 0.0..=1.0,
            FilterKind::Negative
            | FilterKind::BlackAndWhite
            | FilterKind::Laplacian
            | FilterKind::SobelEdgeDetection
            | FilterKind::ColorMatrix => return None,
        };
        Some(range)
    }

    /// Apply the filter, returning a new RGBA8 image of the same size.
    pub fn apply(&self, image: &DynamicImage) -> DynamicImage {
        match *self {
            Self::Brightness(v) => map_pixels(image, |[r, g, b, a]| [r + v, g + v, b + v, a]),
            Self::Contrast(v) => map_pixels(image, |[r, g, b, a]| {
                let c = |x: f32| (x - 0.5) * v + 0.5;
                [c(r), c(g), c(b), a]
            }),
            Self::Hue(degrees) => to_rgba8(image.huerotate(degrees.round() as i32)),
            Self::Saturation(v) => map_pixels(image, |[r, g, b, a]| {
                let l = luminance(r, g, b);
                let c = |x: f32| l + (x - l) * v;
                [c(r), c(g), c(b), a]
            }),
            Self::Exposure(stops) => {
                let k = 2f32.powf(stops);
                map_pixels(image, |[r, g, b, a]| [r * k, g * k, b * k, a])
            }
            Self::WhiteBalance { temperature, tint } => {
                let delta = temperature - 5000.0;
                let warmth = if delta < 0.0 { 0.0004 } else { 0.00006 } * delta;
                let green = 1.0 - tint / 1000.0;
                map_pixels(image, |[r, g, b, a]| {
                    [r * (1.0 + warmth), g * green, b * (1.0 - warmth), a]
                })
            }
            Self::Monochrome(intensity) => map_pixels(image, |[r, g, b, a]| {
                let l = luminance(r, g, b);
                [mix(r, l, intensity), mix(g, l, intensity), mix(b, l, intensity), a]
            }),
            Self::Gamma(gamma) => map_pixels(image, |[r, g, b, a]| {
                [r.powf(gamma), g.powf(gamma), b.powf(gamma), a]
            }),
            Self::Sepia(intensity) => map_pixels(image, |[r, g, b, a]| {
                let sr = 0.393 * r + 0.769 * g + 0.189 * b;
                let sg = 0.349 * r + 0.686 * g + 0.168 * b;
                let sb = 0.272 * r + 0.534 * g + 0.131 * b;
                [mix(r, sr, intensity), mix(g, sg, intensity), mix(b, sb, intensity), a]
            }),
            Self::Sharpen(amount) => {
                if amount <= 0.0 {
                    to_rgba8(image.clone())
                } else {
                    to_rgba8(image.unsharpen(amount, 0))
                }
            }
            Self::Negative => {
                let mut out = image.to_rgba8();
                image::imageops::invert(&mut out);
                DynamicImage::ImageRgba8(out)
            }
            Self::Solarize(threshold) => map_pixels(image, |[r, g, b, a]| {
                if luminance(r, g, b) < threshold {
                    [r, g, b, a]
                } else {
                    [1.0 - r, 1.0 - g, 1.0 - b, a]
                }
            }),
            Self::Vibrance(v) => map_pixels(image, |[r, g, b, a]| {
                let average = (r + g + b) / 3.0;
                let max = r.max(g).max(b);
                let amount = (max - average) * (-v * 3.0);
                [mix(r, max, amount), mix(g, max, amount), mix(b, max, amount), a]
            }),
            Self::BlackAndWhite => map_pixels(image, |[r, g, b, a]| {
                let l = luminance(r, g, b);
                [l, l, l, a]
            }),
            Self::GaussianBlur(sigma) => {
                if sigma <= 0.0 {
                    to_rgba8(image.clone())
                } else {
                    to_rgba8(image.blur(sigma))
                }
            }
            Self::BoxBlur(radius) => box_blur(image, radius.max(0.0).round() as u32),
            Self::Emboss(i) => convolve3x3(
                image,
                &[-2.0 * i, -i, 0.0, -i, 1.0, i, 0.0, i, 2.0 * i],
            ),
            Self::Laplacian => {
                convolve3x3(image, &[0.0, 1.0, 0.0, 1.0, -4.0, 1.0, 0.0, 1.0, 0.0])
            }
            Self::SobelEdgeDetection => sobel(image),
            Self::Vignette { start, end } => vignette(image, start, end),
            Self::Posterize(levels) => {
                let levels = levels.max(1.0).floor();
                map_pixels(image, |[r, g, b, a]| {
                    let q = |x: f32| (x * levels + 0.5).floor() / levels;
                    [q(r), q(g), q(b), a]
                })
            }
            Self::Opacity(v) => map_pixels(image, |[r, g, b, a]| [r, g, b, a * v]),
            Self::ColorMatrix(m) => map_pixels(image, |p| {
                let row = |i: usize| {
                    let r = &m[i * 4..i * 4 + 4];
                    r[0] * p[0] + r[1] * p[1] + r[2] * p[2] + r[3] * p[3]
                };
                [row(0), row(1), row(2), row(3)]
            }),
            Self::SwirlDistortion { angle, radius } => swirl(image, angle, radius),
            Self::BulgeDistortion { radius, scale } => bulge(image, radius, scale),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.kind().name();
        let values: Vec<f32> = match *self {
            Self::Brightness(v)
            | Self::Contrast(v)
            | Self::Hue(v)
            | Self::Saturation(v)
            | Self::Exposure(v)
            | Self::Monochrome(v)
            | Self::Gamma(v)
            | Self::Sepia(v)
            | Self::Sharpen(v)
            | Self::Solarize(v)
            | Self::Vibrance(v)
            | Self::GaussianBlur(v)
            | Self::BoxBlur(v)
            | Self::Emboss(v)
            | Self::Posterize(v)
            | Self::Opacity(v) => vec![v],
            Self::WhiteBalance { temperature, tint } => vec![temperature, tint],
            Self::Vignette { start, end } => vec![start, end],
            Self::SwirlDistortion { angle, radius } => vec![angle, radius],
            Self::BulgeDistortion { radius, scale } => vec![radius, scale],
            Self::ColorMatrix(m) => m.to_vec(),
            Self::Negative | Self::BlackAndWhite | Self::Laplacian | Self::SobelEdgeDetection => {
                Vec::new()
            }
        };
        if values.is_empty() {
            return f.write_str(name);
        }
        let joined: Vec<String> = values.iter().map(f32::to_string).collect();
        write!(f, "{}={}", name, joined.join(","))
    }
}

impl FromStr for Filter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, values) = match s.split_once('=') {
            Some((name, values)) => (name, Some(values)),
            None => (s, None),
        };
        let kind =
            FilterKind::from_name(name).ok_or_else(|| FilterParseError::Unknown(name.to_string()))?;

        let Some(values) = values else {
            return Ok(Self::default_for(kind));
        };
        let parsed = values
            .split(',')
            .map(|v| {
                v.trim().parse::<f32>().map_err(|_| FilterParseError::BadValue {
                    filter: kind.name().to_string(),
                    value: v.trim().to_string(),
                })
            })
            .collect::<Result<Vec<f32>, _>>()?;
        Self::with_values(kind, &parsed)
    }
}

/// Apply filters in order.
pub fn apply_filters(image: &DynamicImage, filters: &[Filter]) -> DynamicImage {
    filters
        .iter()
        .fold(image.clone(), |acc, filter| filter.apply(&acc))
}

// =============================================================================
// Pixel helpers
// =============================================================================

fn luminance(r: f32, g: f32, b: f32) -> f32 {
    0.2125 * r + 0.7154 * g + 0.0721 * b
}

fn mix(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn to_rgba8(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgba8(_) => image,
        other => DynamicImage::ImageRgba8(other.to_rgba8()),
    }
}

/// Map every pixel through `f` in normalized float space. Output is clamped.
fn map_pixels(image: &DynamicImage, f: impl Fn([f32; 4]) -> [f32; 4]) -> DynamicImage {
    let mut buf = image.to_rgba32f();
    for pixel in buf.pixels_mut() {
        pixel.0 = f(pixel.0).map(|c| c.clamp(0.0, 1.0));
    }
    DynamicImage::ImageRgba8(DynamicImage::ImageRgba32F(buf).to_rgba8())
}

fn clamped_get(buf: &Rgba32FImage, x: i64, y: i64) -> [f32; 4] {
    let (w, h) = buf.dimensions();
    let x = x.clamp(0, i64::from(w) - 1) as u32;
    let y = y.clamp(0, i64::from(h) - 1) as u32;
    buf.get_pixel(x, y).0
}

/// 3×3 convolution on color channels via [`imageops::filter3x3`].
///
/// The source is padded with one replicated pixel on every side so the
/// border is filtered too. Alpha is taken from the source unchanged.
fn convolve3x3(image: &DynamicImage, kernel: &[f32; 9]) -> DynamicImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return to_rgba8(image.clone());
    }
    let src = image.to_rgba32f();
    let padded = Rgb32FImage::from_fn(w + 2, h + 2, |x, y| {
        let [r, g, b, _] = clamped_get(&src, i64::from(x) - 1, i64::from(y) - 1);
        Rgb([r, g, b])
    });
    let filtered = imageops::filter3x3(&padded, kernel);
    let out = Rgba32FImage::from_fn(w, h, |x, y| {
        let [r, g, b] = filtered.get_pixel(x + 1, y + 1).0;
        Rgba([r, g, b, src.get_pixel(x, y).0[3]])
    });
    DynamicImage::ImageRgba8(DynamicImage::ImageRgba32F(out).to_rgba8())
}

/// Gradient magnitude of the luma channel, saturating at white.
fn sobel(image: &DynamicImage) -> DynamicImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return to_rgba8(image.clone());
    }
    let gradients = imageproc::gradients::sobel_gradients(&image.to_luma8());
    let src = image.to_rgba8();
    let out = RgbaImage::from_fn(w, h, |x, y| {
        let m = gradients.get_pixel(x, y).0[0].min(255) as u8;
        Rgba([m, m, m, src.get_pixel(x, y).0[3]])
    });
    DynamicImage::ImageRgba8(out)
}

/// Separable box blur with the given radius in pixels.
fn box_blur(image: &DynamicImage, radius: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    if radius == 0 || w == 0 || h == 0 {
        return to_rgba8(image.clone());
    }
    let r = i64::from(radius);
    let taps = (2 * r + 1) as f32;
    let average = |buf: &Rgba32FImage, x: u32, y: u32, horizontal: bool| {
        let mut acc = [0.0f32; 4];
        for d in -r..=r {
            let p = if horizontal {
                clamped_get(buf, i64::from(x) + d, i64::from(y))
            } else {
                clamped_get(buf, i64::from(x), i64::from(y) + d)
            };
            for c in 0..4 {
                acc[c] += p[c];
            }
        }
        Rgba(acc.map(|c| c / taps))
    };

    let src = image.to_rgba32f();
    let pass = Rgba32FImage::from_fn(w, h, |x, y| average(&src, x, y, true));
    let out = Rgba32FImage::from_fn(w, h, |x, y| average(&pass, x, y, false));
    DynamicImage::ImageRgba8(DynamicImage::ImageRgba32F(out).to_rgba8())
}

fn vignette(image: &DynamicImage, start: f32, end: f32) -> DynamicImage {
    let (w, h) = image.dimensions();
    let mut buf = image.to_rgba32f();
    for (x, y, pixel) in buf.enumerate_pixels_mut() {
        let u = (x as f32 + 0.5) / w as f32 - 0.5;
        let v = (y as f32 + 0.5) / h as f32 - 0.5;
        let darken = smoothstep(start, end, (u * u + v * v).sqrt());
        let [r, g, b, a] = pixel.0;
        pixel.0 = [r * (1.0 - darken), g * (1.0 - darken), b * (1.0 - darken), a];
    }
    DynamicImage::ImageRgba8(DynamicImage::ImageRgba32F(buf).to_rgba8())
}

/// Rebuild the image by sampling the source at `f(x, y)` (pixel-center coordinates).
fn remap(image: &DynamicImage, f: impl Fn(f32, f32) -> (f32, f32)) -> DynamicImage {
    let src = image.to_rgba8();
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return DynamicImage::ImageRgba8(src);
    }
    let out = RgbaImage::from_fn(w, h, |x, y| {
        let (sx, sy) = f(x as f32 + 0.5, y as f32 + 0.5);
        let sx = (sx.floor() as i64).clamp(0, i64::from(w) - 1) as u32;
        let sy = (sy.floor() as i64).clamp(0, i64::from(h) - 1) as u32;
        *src.get_pixel(sx, sy)
    });
    DynamicImage::ImageRgba8(out)
}

fn swirl(image: &DynamicImage, angle: f32, radius: f32) -> DynamicImage {
    let (w, h) = image.dimensions();
    let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
    let reach = radius * w.min(h) as f32;
    remap(image, |x, y| {
        let (dx, dy) = (x - cx, y - cy);
        let dist = (dx * dx + dy * dy).sqrt();
        if reach <= 0.0 || dist >= reach {
            return (x, y);
        }
        let percent = (reach - dist) / reach;
        let theta = percent * percent * angle * 8.0;
        let (sin, cos) = theta.sin_cos();
        (cx + dx * cos - dy * sin, cy + dx * sin + dy * cos)
    })
}

fn bulge(image: &DynamicImage, radius: f32, scale: f32) -> DynamicImage {
    let (w, h) = image.dimensions();
    let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
    let reach = radius * w.min(h) as f32;
    remap(image, |x, y| {
        let (dx, dy) = (x - cx, y - cy);
        let dist = (dx * dx + dy * dy).sqrt();
        if reach <= 0.0 || dist >= reach {
            return (x, y);
        }
        let percent = 1.0 - ((reach - dist) / reach) * scale;
        let percent = percent * percent;
        (cx + dx * percent, cy + dy * percent)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::gradient_image;

    fn solid(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([r, g, b, 255])))
    }

    fn center_pixel(image: &DynamicImage) -> [u8; 4] {
        image.to_rgba8().get_pixel(4, 4).0
    }

    #[test]
    fn every_filter_preserves_dimensions() {
        let img = gradient_image(31, 17);
        for kind in FilterKind::ALL {
            let out = Filter::default_for(kind).apply(&img);
            assert_eq!(out.dimensions(), (31, 17), "{kind}");
        }
    }

    #[test]
    fn brightness_raises_channels() {
        let out = Filter::Brightness(0.5).apply(&solid(0, 0, 0));
        let [r, g, b, a] = center_pixel(&out);
        assert!((126..=129).contains(&r));
        assert_eq!((r, g, b, a), (r, r, r, 255));
    }

    #[test]
    fn neutral_defaults_are_identity() {
        let img = solid(40, 120, 200);
        for filter in [
            Filter::Brightness(0.0),
            Filter::Contrast(1.0),
            Filter::Saturation(1.0),
            Filter::Exposure(0.0),
            Filter::Gamma(1.0),
            Filter::ColorMatrix(IDENTITY_MATRIX),
            Filter::Opacity(1.0),
        ] {
            assert_eq!(center_pixel(&filter.apply(&img)), [40, 120, 200, 255], "{filter}");
        }
    }

    #[test]
    fn negative_inverts_colors() {
        let out = Filter::Negative.apply(&solid(10, 20, 30));
        assert_eq!(center_pixel(&out), [245, 235, 225, 255]);
    }

    #[test]
    fn black_and_white_equalizes_channels() {
        let [r, g, b, _] = center_pixel(&Filter::BlackAndWhite.apply(&solid(200, 30, 90)));
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn posterize_snaps_to_levels() {
        let out = Filter::Posterize(1.0).apply(&solid(100, 200, 30));
        assert_eq!(center_pixel(&out), [0, 255, 0, 255]);
    }

    #[test]
    fn opacity_scales_alpha() {
        let out = Filter::Opacity(0.5).apply(&solid(10, 10, 10));
        assert!((126..=129).contains(&center_pixel(&out)[3]));
    }

    #[test]
    fn laplacian_of_flat_image_is_black_and_opaque() {
        let out = Filter::Laplacian.apply(&solid(90, 90, 90));
        assert_eq!(center_pixel(&out), [0, 0, 0, 255]);
    }

    #[test]
    fn emboss_of_flat_image_is_unchanged_to_the_border() {
        let out = Filter::Emboss(1.0).apply(&solid(90, 140, 30)).to_rgba8();
        assert_eq!(out.get_pixel(4, 4).0, [90, 140, 30, 255]);
        assert_eq!(out.get_pixel(0, 0).0, [90, 140, 30, 255]);
        assert_eq!(out.get_pixel(7, 7).0, [90, 140, 30, 255]);
    }

    #[test]
    fn laplacian_keeps_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([90, 90, 90, 100])));
        assert_eq!(center_pixel(&Filter::Laplacian.apply(&img)), [0, 0, 0, 100]);
    }

    #[test]
    fn sobel_marks_edges_only() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(16, 16, |x, _| {
            if x < 8 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        }));
        let out = Filter::SobelEdgeDetection.apply(&img).to_rgba8();
        assert_eq!(out.get_pixel(2, 8).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(13, 8).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(8, 8).0, [255, 255, 255, 255]);
    }

    #[test]
    fn box_blur_keeps_flat_image() {
        let out = Filter::BoxBlur(3.0).apply(&solid(70, 80, 90));
        assert_eq!(center_pixel(&out), [70, 80, 90, 255]);
    }

    #[test]
    fn vignette_darkens_corners_not_center() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            64,
            64,
            Rgba([200, 200, 200, 255]),
        ));
        let out = Filter::default_for(FilterKind::Vignette).apply(&img).to_rgba8();
        assert_eq!(out.get_pixel(32, 32).0[0], 200);
        assert!(out.get_pixel(0, 0).0[0] < 100);
    }

    #[test]
    fn swirl_with_zero_radius_is_identity() {
        let img = gradient_image(16, 16);
        let out = Filter::SwirlDistortion {
            angle: 1.0,
            radius: 0.0,
        }
        .apply(&img);
        assert_eq!(out.to_rgba8(), img.to_rgba8());
    }

    #[test]
    fn apply_filters_runs_in_order() {
        let img = solid(0, 0, 0);
        let out = apply_filters(&img, &[Filter::Negative, Filter::Brightness(-1.0)]);
        assert_eq!(center_pixel(&out), [0, 0, 0, 255]);
        let out = apply_filters(&img, &[Filter::Brightness(-1.0), Filter::Negative]);
        assert_eq!(center_pixel(&out), [255, 255, 255, 255]);
    }

    #[test]
    fn parse_scalar_pair_and_bare_names() {
        assert_eq!("contrast=1.5".parse::<Filter>(), Ok(Filter::Contrast(1.5)));
        assert_eq!(
            "vignette=0.2,0.9".parse::<Filter>(),
            Ok(Filter::Vignette { start: 0.2, end: 0.9 })
        );
        assert_eq!("negative".parse::<Filter>(), Ok(Filter::Negative));
        assert_eq!("gaussian-blur".parse::<Filter>(), Ok(Filter::GaussianBlur(2.0)));
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            "glow".parse::<Filter>(),
            Err(FilterParseError::Unknown(_))
        ));
        assert!(matches!(
            "contrast=high".parse::<Filter>(),
            Err(FilterParseError::BadValue { .. })
        ));
        assert!(matches!(
            "vignette=0.5".parse::<Filter>(),
            Err(FilterParseError::WrongArity {
                expected: 2,
                got: 1,
                ..
            })
        ));
    }

    #[test]
    fn display_parses_back() {
        for kind in FilterKind::ALL {
            let filter = Filter::default_for(kind);
            assert_eq!(filter.to_string().parse::<Filter>(), Ok(filter));
        }
    }

    #[test]
    fn serde_uses_filter_tag() {
        let json = serde_json::to_string(&Filter::Sepia(0.8)).unwrap();
        assert_eq!(json, r#"{"filter":"sepia","value":0.8}"#);
        let json = r#"{"filter":"white_balance","value":{"temperature":6000.0,"tint":5.0}}"#;
        let parsed: Filter = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed,
            Filter::WhiteBalance {
                temperature: 6000.0,
                tint: 5.0
            }
        );
    }

    #[test]
    fn value_ranges_contain_defaults() {
        for kind in FilterKind::ALL {
            let filter = Filter::default_for(kind);
            let primary = match filter {
                Filter::WhiteBalance { temperature, .. } => Some(temperature),
                Filter::Vignette { start, .. } => Some(start),
                Filter::SwirlDistortion { angle, .. } => Some(angle),
                Filter::BulgeDistortion { radius, .. } => Some(radius),
                _ => filter.to_string().split_once('=').map(|(_, v)| v.parse().unwrap()),
            };
            if let (Some(range), Some(value)) = (filter.value_range(), primary) {
                assert!(range.contains(&value), "{kind}: {value} not in {range:?}");
            }
        }
    }
}
