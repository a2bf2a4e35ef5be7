//! Image processing built on the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::into_dimensions` |
//! | **Resize → rotate → flip** | Lanczos3 + `rotate90`/`fliph` |
//! | **Encode** | JPEG and WebP (quality), PNG |
//! | **Filters** | per-pixel float math, `blur`, `unsharpen`, `huerotate`, `filter3x3`, `imageproc` Sobel |
//! | **Palette** | median cut over a downsampled copy |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math and field restriction
//! - **Parameters**: Data structures describing the requested transform
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend
//! - **Filters** and **Palette**: standalone pixel operations

pub mod backend;
mod calculations;
pub mod filters;
pub mod operations;
pub mod palette;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend, Preview, Rendered};
pub use calculations::{
    DEFAULT_DIMENSION_CEILING, calculate_display_dimensions, calculate_fit_dimensions,
    calculate_percent_dimensions, calculate_target_dimensions, exceeds_preview_threshold,
    restrict,
};
pub use filters::{Filter, FilterKind, FilterParseError, apply_filters};
pub use operations::{generate_preview, plan_percent_preset, render};
pub use palette::{DEFAULT_PALETTE_COLORS, Swatch, generate_palette};
pub use params::{OutputFormat, Quality, ResizeStrategy, TransformParameters, TransformRequest};
pub use rust_backend::{
    RustBackend, decode_bytes, encode, identify, is_supported_input, load_image,
    supported_input_extensions,
};
