//! Image processing backend on the `image` crate, with libwebp for WebP.
//!
//! Everything is statically linked into the binary. The WebP encoder is
//! libwebp, built from source by the `webp` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP) | `image::load_from_memory` / `ImageReader` |
//! | Resize | `resize_exact` with `Lanczos3`, then `crop_imm` for fill-crop |
//! | Rotate / flip | `rotate90` / `rotate180` / `rotate270` / `fliph` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality 1–100) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Encode → WebP | `webp::Encoder` (lossy, quality 1–100) |
//! | Display downscale | `DynamicImage::thumbnail_exact` |
//!
//! The transform order is fixed: resize → rotate → flip. Target width/height
//! describe the final canvas, so for odd quarter turns the resize step works
//! on the swapped pair.

use super::backend::{BackendError, Dimensions, ImageBackend, Preview, Rendered};
use super::calculations::{
    calculate_display_dimensions, calculate_fill_dimensions, calculate_target_dimensions,
};
use super::params::{OutputFormat, Quality, ResizeStrategy, TransformRequest};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use std::path::Path;
use std::sync::LazyLock;

const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Whether a path carries one of the [`supported_input_extensions`].
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            supported_input_extensions()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
}

/// Backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk.
pub fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| BackendError::Decode(format!("{}: {}", path.display(), e)))
}

/// Read image dimensions from the file header without decoding pixels.
pub fn identify(path: &Path) -> Result<Dimensions, BackendError> {
    let (width, height) = ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|e| BackendError::Decode(format!("{}: {}", path.display(), e)))?;
    Ok(Dimensions { width, height })
}

/// Decode an in-memory encoded image.
pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    image::load_from_memory(bytes).map_err(|e| BackendError::Decode(e.to_string()))
}

/// Encode an image into memory.
///
/// JPEG drops alpha; PNG and WebP keep it. `quality` applies to JPEG and
/// WebP.
pub fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: Quality,
) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let result = match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new(&mut buf);
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)
        }
        OutputFormat::Webp => return encode_webp(img, quality),
    };
    result.map_err(|e| BackendError::Encode(format!("{format}: {e}")))?;
    Ok(buf)
}

fn encode_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let rgba = img.to_rgba8();
    let encoded = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
        .encode_simple(false, quality.value() as f32)
        .map_err(|e| BackendError::Encode(format!("webp: {e:?}")))?;
    Ok(encoded.to_vec())
}

/// Apply resize → rotate → flip.
pub fn apply_transform(source: &DynamicImage, request: &TransformRequest) -> DynamicImage {
    let resized = resize(source, request);
    let rotated = match request.quarter_turns % 4 {
        1 => resized.rotate90(),
        2 => resized.rotate180(),
        3 => resized.rotate270(),
        _ => resized,
    };
    if request.flipped {
        rotated.fliph()
    } else {
        rotated
    }
}

fn resize(source: &DynamicImage, request: &TransformRequest) -> DynamicImage {
    let (width, height) = if request.quarter_turns % 2 == 1 {
        (request.height, request.width)
    } else {
        (request.width, request.height)
    };
    let source_dims = source.dimensions();
    let (tw, th) = calculate_target_dimensions(request.strategy, source_dims, width, height);
    if (tw, th) == source_dims {
        return source.clone();
    }

    match request.strategy {
        ResizeStrategy::FillCrop => {
            let (fw, fh) = calculate_fill_dimensions(source_dims, (tw, th));
            let filled = source.resize_exact(fw, fh, FilterType::Lanczos3);
            // Center crop to the target box.
            filled.crop_imm(fw.saturating_sub(tw) / 2, fh.saturating_sub(th) / 2, tw, th)
        }
        ResizeStrategy::Exact | ResizeStrategy::Fit => {
            source.resize_exact(tw, th, FilterType::Lanczos3)
        }
    }
}

impl ImageBackend for RustBackend {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError> {
        decode_bytes(bytes)
    }

    fn preview(
        &self,
        source: &DynamicImage,
        request: &TransformRequest,
        max_edge: u32,
    ) -> Result<Preview, BackendError> {
        let transformed = apply_transform(source, request);
        let encoded = encode(&transformed, request.format, request.quality)?;
        let (width, height) = transformed.dimensions();

        let (dw, dh) = calculate_display_dimensions((width, height), max_edge);
        let image = if (dw, dh) == (width, height) {
            transformed
        } else {
            transformed.thumbnail_exact(dw, dh)
        };

        Ok(Preview {
            image,
            width,
            height,
            encoded_size: encoded.len() as u64,
        })
    }

    fn render(
        &self,
        source: &DynamicImage,
        request: &TransformRequest,
    ) -> Result<Rendered, BackendError> {
        let transformed = apply_transform(source, request);
        let bytes = encode(&transformed, request.format, request.quality)?;
        let (width, height) = transformed.dimensions();
        Ok(Rendered {
            bytes,
            width,
            height,
        })
    }
}
