//! Shared test utilities for the shrinker test suite.
//!
//! Synthetic images and encoded fixtures so tests never depend on files
//! checked into the repository.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let img = gradient_image(64, 48);
//! let bytes = jpeg_bytes(&img);
//! let tagged = with_exif_make(&bytes, "TestCam");
//! ```

use image::{DynamicImage, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

// =========================================================================
// Images
// =========================================================================

/// RGB gradient: red grows left to right, green top to bottom.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgb([r, g, 128])
    });
    DynamicImage::ImageRgb8(img)
}

/// Encode an image as JPEG with the encoder default quality.
pub fn jpeg_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Jpeg).unwrap();
    buf.into_inner()
}

/// Write a gradient JPEG of the given size to `path`.
pub fn write_test_jpeg(path: &Path, width: u32, height: u32) {
    std::fs::write(path, jpeg_bytes(&gradient_image(width, height))).unwrap();
}

// =========================================================================
// EXIF fixtures
// =========================================================================

/// Insert an APP1 EXIF segment carrying a single `Make` tag right after SOI.
///
/// The TIFF payload is little-endian with one IFD0 entry. `make` must be
/// longer than three bytes so the value lives out of line.
pub fn with_exif_make(jpeg: &[u8], make: &str) -> Vec<u8> {
    assert!(make.len() >= 4, "make must not fit inline");
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "not a JPEG");

    let value_offset: u32 = 8 + 2 + 12 + 4;
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());
    tiff.extend_from_slice(&1u16.to_le_bytes());
    // Make, ASCII, count includes NUL.
    tiff.extend_from_slice(&0x010Fu16.to_le_bytes());
    tiff.extend_from_slice(&2u16.to_le_bytes());
    tiff.extend_from_slice(&(make.len() as u32 + 1).to_le_bytes());
    tiff.extend_from_slice(&value_offset.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    tiff.extend_from_slice(make.as_bytes());
    tiff.push(0);

    let segment_len = (2 + 6 + tiff.len()) as u16;
    let mut out = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Write a gradient JPEG with an EXIF `Make` tag to `path`.
pub fn write_test_jpeg_with_make(path: &Path, width: u32, height: u32, make: &str) {
    let bytes = with_exif_make(&jpeg_bytes(&gradient_image(width, height)), make);
    std::fs::write(path, bytes).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn exif_fixture_still_decodes() {
        let bytes = with_exif_make(&jpeg_bytes(&gradient_image(20, 10)), "TestCam");
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!(img.dimensions(), (20, 10));
    }
}
