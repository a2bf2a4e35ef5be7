//! Pure calculation functions for image dimensions and dimension fields.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::ResizeStrategy;

/// Default ceiling for width/height text fields.
pub const DEFAULT_DIMENSION_CEILING: u32 = 20_000;

/// Normalize a width/height text field.
///
/// - Empty input stays empty
/// - Anything that is not an ASCII digit (punctuation, whitespace) is stripped
/// - A value that parses to zero becomes empty, forcing default sizing
/// - A value above `ceiling` clamps to `ceiling`
///
/// ```
/// # use shrinker::imaging::restrict;
/// assert_eq!(restrict("25000", 20000), "20000");
/// assert_eq!(restrict("  12,3", 20000), "123");
/// assert_eq!(restrict("0", 20000), "");
/// ```
pub fn restrict(input: &str, ceiling: u32) -> String {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return String::new();
    }

    // Digit strings too long for u64 are certainly above the ceiling.
    let value = digits.parse::<u64>().unwrap_or(u64::MAX);
    if value == 0 {
        String::new()
    } else if value > u64::from(ceiling) {
        ceiling.to_string()
    } else {
        value.to_string()
    }
}

/// Dimensions that fit inside `bounds` while preserving the source aspect ratio.
///
/// A missing bound is derived from the other one; with both missing the
/// source dimensions are returned unchanged.
pub fn calculate_fit_dimensions(
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
) -> (u32, u32) {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 {
        return (width.unwrap_or(src_w), height.unwrap_or(src_h));
    }

    let aspect = src_w as f64 / src_h as f64;
    match (width, height) {
        (None, None) => source,
        (Some(w), None) => (w, scaled(w as f64 / aspect)),
        (None, Some(h)) => (scaled(h as f64 * aspect), h),
        (Some(w), Some(h)) => {
            let ratio = (w as f64 / src_w as f64).min(h as f64 / src_h as f64);
            (scaled(src_w as f64 * ratio), scaled(src_h as f64 * ratio))
        }
    }
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = scaled(h as f64 * src_aspect);
        (w, h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = scaled(w as f64 / src_aspect);
        (w, h)
    }
}

/// Final canvas dimensions produced by a resize step.
///
/// For `Exact` and `FillCrop`, a missing field falls back to the matching
/// source dimension.
pub fn calculate_target_dimensions(
    strategy: ResizeStrategy,
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
) -> (u32, u32) {
    match strategy {
        ResizeStrategy::Fit => calculate_fit_dimensions(source, width, height),
        ResizeStrategy::Exact | ResizeStrategy::FillCrop => (
            width.unwrap_or(source.0).max(1),
            height.unwrap_or(source.1).max(1),
        ),
    }
}

/// Scale dimensions by a whole percentage, never below 1px.
pub fn calculate_percent_dimensions(source: (u32, u32), percent: u8) -> (u32, u32) {
    let factor = f64::from(percent) / 100.0;
    (
        scaled(source.0 as f64 * factor),
        scaled(source.1 as f64 * factor),
    )
}

/// Shrink dimensions so the longer edge is at most `max_edge`. Never enlarges.
pub fn calculate_display_dimensions(dims: (u32, u32), max_edge: u32) -> (u32, u32) {
    let (w, h) = dims;
    let longer = w.max(h);
    if longer <= max_edge || longer == 0 {
        return dims;
    }
    let ratio = max_edge as f64 / longer as f64;
    (scaled(w as f64 * ratio), scaled(h as f64 * ratio))
}

/// Whether the declared width + height fields exceed the preview threshold.
///
/// Unparsable fields count as zero.
pub fn exceeds_preview_threshold(width: &str, height: &str, threshold: u64) -> bool {
    let w = width.trim().parse::<u64>().unwrap_or(0);
    let h = height.trim().parse::<u64>().unwrap_or(0);
    w.saturating_add(h) > threshold
}

fn scaled(value: f64) -> u32 {
    (value.round() as u32).max(1)
}
