//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take parameters, compute the request, and call the backend.

use super::backend::{BackendError, ImageBackend, Preview, Rendered};
use super::calculations::calculate_percent_dimensions;
use super::params::TransformParameters;
use image::DynamicImage;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Generate a preview for the given parameters.
pub fn generate_preview(
    backend: &impl ImageBackend,
    source: &DynamicImage,
    params: &TransformParameters,
    max_edge: u32,
) -> Result<Preview> {
    backend.preview(source, &params.request(), max_edge)
}

/// Render the export payload for the given parameters.
pub fn render<B: ImageBackend + ?Sized>(
    backend: &B,
    source: &DynamicImage,
    params: &TransformParameters,
) -> Result<Rendered> {
    backend.render(source, &params.request())
}

/// Parameters produced by a percentage preset: dimensions scaled from the
/// source and quality set to the same percentage. Other fields are kept.
pub fn plan_percent_preset(
    current: &TransformParameters,
    source: (u32, u32),
    percent: u8,
) -> TransformParameters {
    let (w, h) = calculate_percent_dimensions(source, percent);
    // Fields describe the rotated canvas.
    let (w, h) = if current.quarter_turns() % 2 == 1 {
        (h, w)
    } else {
        (w, h)
    };
    TransformParameters {
        width: w.to_string(),
        height: h.to_string(),
        quality: f32::from(percent),
        ..current.clone()
    }
}
