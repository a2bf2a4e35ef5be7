//! Image metadata tags.
//!
//! A loaded image carries an optional [`MetadataTags`] map: EXIF tag name to
//! display string. The session lets callers edit it and the exporter hands it
//! to the sink after the pixels are written.
//!
//! ## Vocabulary
//!
//! Only the tags listed in [`KNOWN_TAGS`] are read from files, and
//! [`MetadataTags::clear`] removes exactly those. Tags set by hand outside the
//! vocabulary survive a clear, which mirrors how platform EXIF editors treat
//! attributes they do not know about.
//!
//! ## Sources
//!
//! - **Embedded EXIF**, read via `kamadak-exif` ([`read_exif_tags`],
//!   [`read_exif_from_bytes`]) and written via `little_exif`
//!   ([`write_exif_tags`]). Files without an EXIF block yield an empty map.
//! - **Sidecar JSON**: `photo.jpg` ↔ `photo.exif.json` in the same directory
//!   ([`write_sidecar`], [`read_sidecar`]). The sidecar keeps the full edited
//!   map, including tags that have no EXIF encoding here.
//!
//! ## Writable tags
//!
//! | Tag | Accepted value |
//! |---|---|
//! | `Make`, `Model`, `Software`, `Artist`, `Copyright`, `ImageDescription`, `LensMake`, `LensModel` | any text |
//! | `DateTimeOriginal` | `2024-03-07 09:05:01` or `2024:03:07 09:05:01` |
//! | `ExposureTime` | `1/250 s`, `0.004` |
//! | `FNumber` | `f/2.8`, `2.8` |
//! | `FocalLength` | `50 mm`, `50` |
//! | `PhotographicSensitivity` | `400` |

use chrono::NaiveDateTime;
use little_exif::exif_tag::ExifTag;
use little_exif::metadata::Metadata;
use little_exif::rational::uR64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("EXIF error: {0}")]
    Exif(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MetadataError>;

/// Tags read from EXIF and removed by [`MetadataTags::clear`].
///
/// Names follow `kamadak-exif`'s `Tag` display names.
pub const KNOWN_TAGS: &[&str] = &[
    "Make",
    "Model",
    "Software",
    "Artist",
    "Copyright",
    "ImageDescription",
    "DateTime",
    "DateTimeOriginal",
    "DateTimeDigitized",
    "Orientation",
    "ExposureTime",
    "FNumber",
    "ExposureProgram",
    "PhotographicSensitivity",
    "ExposureBiasValue",
    "MeteringMode",
    "Flash",
    "FocalLength",
    "FocalLengthIn35mmFilm",
    "WhiteBalance",
    "LensMake",
    "LensModel",
    "GPSLatitudeRef",
    "GPSLatitude",
    "GPSLongitudeRef",
    "GPSLongitude",
    "GPSAltitudeRef",
    "GPSAltitude",
    "GPSTimeStamp",
    "GPSDateStamp",
];

/// Tag name → value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataTags(BTreeMap<String, String>);

impl MetadataTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.0.get(tag).map(String::as_str)
    }

    /// Set a tag. An empty value removes it.
    pub fn set(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        let (tag, value) = (tag.into(), value.into());
        if value.is_empty() {
            self.0.remove(&tag);
        } else {
            self.0.insert(tag, value);
        }
    }

    pub fn remove(&mut self, tag: &str) -> Option<String> {
        self.0.remove(tag)
    }

    /// Remove every tag in [`KNOWN_TAGS`].
    pub fn clear(&mut self) {
        for tag in KNOWN_TAGS {
            self.0.remove(*tag);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tags in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetadataTags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Self::new();
        for (k, v) in iter {
            tags.set(k, v);
        }
        tags
    }
}

// ============================================================================
// EXIF reading
// ============================================================================

/// Read the known EXIF tags from an image file.
pub fn read_exif_tags(path: &Path) -> Result<MetadataTags> {
    let mut reader = BufReader::new(File::open(path)?);
    read_container(&mut reader)
}

/// Read the known EXIF tags from an encoded image in memory.
pub fn read_exif_from_bytes(bytes: &[u8]) -> Result<MetadataTags> {
    read_container(&mut Cursor::new(bytes))
}

fn read_container<R: std::io::BufRead + std::io::Seek>(reader: &mut R) -> Result<MetadataTags> {
    match exif::Reader::new().read_from_container(reader) {
        Ok(exif) => Ok(collect_tags(&exif)),
        Err(exif::Error::NotFound(_)) => Ok(MetadataTags::new()),
        Err(exif::Error::Io(e)) => Err(MetadataError::Io(e)),
        Err(e) => Err(MetadataError::Exif(e.to_string())),
    }
}

fn collect_tags(exif: &exif::Exif) -> MetadataTags {
    exif.fields()
        .filter(|field| field.ifd_num == exif::In::PRIMARY)
        .filter_map(|field| {
            let name = field.tag.to_string();
            if !KNOWN_TAGS.contains(&name.as_str()) {
                return None;
            }
            let value = field
                .display_value()
                .with_unit(exif)
                .to_string()
                .trim_matches('"')
                .trim()
                .to_string();
            Some((name, value))
        })
        .collect()
}

// ============================================================================
// EXIF writing
// ============================================================================

/// Embed the tags that have an EXIF encoding into the image file at `path`.
///
/// EXIF already in the file is kept; matching tags are replaced. Returns the
/// number of tags embedded. Values that do not parse are skipped, as is
/// `Orientation`: exported pixels are already upright.
pub fn write_exif_tags(path: &Path, tags: &MetadataTags) -> Result<usize> {
    let encoded: Vec<ExifTag> = tags
        .iter()
        .filter_map(|(name, value)| exif_tag(name, value))
        .collect();
    if encoded.is_empty() {
        return Ok(0);
    }
    if !path.is_file() {
        return Err(MetadataError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }

    let mut exif = Metadata::new_from_path(path).unwrap_or_else(|_| Metadata::new());
    let count = encoded.len();
    for tag in encoded {
        exif.set_tag(tag);
    }
    exif.write_to_file(path)
        .map_err(|e| MetadataError::Exif(format!("{}: {}", path.display(), e)))?;
    Ok(count)
}

fn exif_tag(name: &str, value: &str) -> Option<ExifTag> {
    let text = || value.trim().to_string();
    let tag = match name {
        "Make" => ExifTag::Make(text()),
        "Model" => ExifTag::Model(text()),
        "Software" => ExifTag::Software(text()),
        "Artist" => ExifTag::Artist(text()),
        "Copyright" => ExifTag::Copyright(text()),
        "ImageDescription" => ExifTag::ImageDescription(text()),
        "LensMake" => ExifTag::LensMake(text()),
        "LensModel" => ExifTag::LensModel(text()),
        "DateTimeOriginal" => ExifTag::DateTimeOriginal(exif_datetime(value)?),
        "ExposureTime" => ExifTag::ExposureTime(vec![rational(strip_unit(value, "s"))?]),
        "FNumber" => ExifTag::FNumber(vec![rational(value.trim().trim_start_matches("f/"))?]),
        "FocalLength" => ExifTag::FocalLength(vec![rational(strip_unit(value, "mm"))?]),
        "PhotographicSensitivity" => ExifTag::ISO(vec![value.trim().parse().ok()?]),
        _ => return None,
    };
    Some(tag)
}

fn strip_unit<'a>(value: &'a str, unit: &str) -> &'a str {
    value.trim().trim_end_matches(unit).trim()
}

/// `"1/250"` or a positive decimal (kept to three places).
fn rational(value: &str) -> Option<uR64> {
    let (nominator, denominator) = match value.split_once('/') {
        Some((n, d)) => (n.trim().parse().ok()?, d.trim().parse().ok()?),
        None => {
            let decimal: f64 = value.parse().ok()?;
            if !decimal.is_finite() || decimal <= 0.0 {
                return None;
            }
            ((decimal * 1000.0).round() as u32, 1000)
        }
    };
    (denominator != 0).then_some(uR64 {
        nominator,
        denominator,
    })
}

/// EXIF wants `YYYY:MM:DD HH:MM:SS`; tags read back display with dashes.
fn exif_datetime(value: &str) -> Option<String> {
    ["%Y-%m-%d %H:%M:%S", "%Y:%m:%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value.trim(), format).ok())
        .map(|dt| dt.format("%Y:%m:%d %H:%M:%S").to_string())
}

// ============================================================================
// Sidecar files
// ============================================================================

/// `dir/photo.jpg` → `dir/photo.exif.json`
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    image_path.with_extension("exif.json")
}

/// Write `tags` as pretty JSON next to `image_path`. Returns the sidecar path.
pub fn write_sidecar(image_path: &Path, tags: &MetadataTags) -> Result<PathBuf> {
    let path = sidecar_path(image_path);
    std::fs::write(&path, serde_json::to_string_pretty(tags)?)?;
    Ok(path)
}

/// Read the sidecar for `image_path`, if one exists.
pub fn read_sidecar(image_path: &Path) -> Result<Option<MetadataTags>> {
    let path = sidecar_path(image_path);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        gradient_image, jpeg_bytes, with_exif_make, write_test_jpeg, write_test_jpeg_with_make,
    };
    use tempfile::TempDir;

    // =========================================================================
    // MetadataTags
    // =========================================================================

    #[test]
    fn set_get_remove() {
        let mut tags = MetadataTags::new();
        tags.set("Make", "Canon");
        assert_eq!(tags.get("Make"), Some("Canon"));
        assert_eq!(tags.remove("Make"), Some("Canon".to_string()));
        assert!(tags.is_empty());
    }

    #[test]
    fn set_empty_value_removes() {
        let mut tags: MetadataTags = [("Model", "X100")].into_iter().collect();
        tags.set("Model", "");
        assert_eq!(tags.get("Model"), None);
    }

    #[test]
    fn clear_only_removes_known_tags() {
        let mut tags: MetadataTags = [
            ("Make", "Canon"),
            ("GPSLatitude", "51 deg"),
            ("XPComment", "kept"),
        ]
        .into_iter()
        .collect();
        tags.clear();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.get("XPComment"), Some("kept"));
    }

    #[test]
    fn iter_is_name_ordered() {
        let tags: MetadataTags = [("Model", "b"), ("Make", "a")].into_iter().collect();
        let names: Vec<&str> = tags.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Make", "Model"]);
    }

    // =========================================================================
    // EXIF reading
    // =========================================================================

    #[test]
    fn reads_make_from_bytes() {
        let bytes = with_exif_make(&jpeg_bytes(&gradient_image(16, 16)), "TestCam");
        let tags = read_exif_from_bytes(&bytes).unwrap();
        assert_eq!(tags.get("Make"), Some("TestCam"));
    }

    #[test]
    fn reads_make_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tagged.jpg");
        write_test_jpeg_with_make(&path, 32, 24, "Fujifilm");
        let tags = read_exif_tags(&path).unwrap();
        assert_eq!(tags.get("Make"), Some("Fujifilm"));
    }

    #[test]
    fn image_without_exif_yields_empty_tags() {
        let tags = read_exif_from_bytes(&jpeg_bytes(&gradient_image(8, 8))).unwrap();
        assert!(tags.is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = read_exif_tags(Path::new("/nonexistent/photo.jpg"));
        assert!(matches!(result, Err(MetadataError::Io(_))));
    }

    // =========================================================================
    // EXIF writing
    // =========================================================================

    #[test]
    fn written_tags_read_back_from_jpeg() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.jpg");
        write_test_jpeg(&path, 32, 24);
        let tags: MetadataTags = [
            ("Make", "Canon"),
            ("Artist", "Ada"),
            ("DateTimeOriginal", "2024-03-07 09:05:01"),
            ("XPComment", "sidecar only"),
        ]
        .into_iter()
        .collect();

        assert_eq!(write_exif_tags(&path, &tags).unwrap(), 3);

        let read = read_exif_tags(&path).unwrap();
        assert_eq!(read.get("Make"), Some("Canon"));
        assert_eq!(read.get("Artist"), Some("Ada"));
        assert_eq!(read.get("DateTimeOriginal"), Some("2024-03-07 09:05:01"));
        assert_eq!(read.get("XPComment"), None);
        assert!(image::open(&path).is_ok());
    }

    #[test]
    fn nothing_writable_leaves_file_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.jpg");
        write_test_jpeg(&path, 8, 8);
        let before = std::fs::read(&path).unwrap();

        let tags: MetadataTags = [("Orientation", "1"), ("FNumber", "wide open")]
            .into_iter()
            .collect();
        assert_eq!(write_exif_tags(&path, &tags).unwrap(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn writing_to_missing_file_is_io_error() {
        let tags: MetadataTags = [("Make", "Canon")].into_iter().collect();
        let result = write_exif_tags(Path::new("/nonexistent/out.jpg"), &tags);
        assert!(matches!(result, Err(MetadataError::Io(_))));
    }

    #[test]
    fn numeric_values_parse_from_display_form() {
        let r = rational("1/250").unwrap();
        assert_eq!((r.nominator, r.denominator), (1, 250));
        let r = rational("2.8").unwrap();
        assert_eq!((r.nominator, r.denominator), (2800, 1000));
        assert!(rational("1/0").is_none());
        assert!(rational("-3").is_none());
        assert_eq!(strip_unit("50 mm", "mm"), "50");
        assert_eq!(strip_unit(" 1/250 s", "s"), "1/250");
    }

    #[test]
    fn datetime_accepts_both_separators() {
        assert_eq!(
            exif_datetime("2024-03-07 09:05:01").as_deref(),
            Some("2024:03:07 09:05:01")
        );
        assert_eq!(
            exif_datetime("2024:03:07 09:05:01").as_deref(),
            Some("2024:03:07 09:05:01")
        );
        assert_eq!(exif_datetime("yesterday"), None);
    }

    // =========================================================================
    // Sidecars
    // =========================================================================

    #[test]
    fn sidecar_path_replaces_extension() {
        assert_eq!(
            sidecar_path(Path::new("/out/ResizedImage20240101_120000.jpg")),
            PathBuf::from("/out/ResizedImage20240101_120000.exif.json")
        );
    }

    #[test]
    fn sidecar_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let image = tmp.path().join("photo.png");
        let tags: MetadataTags = [("Artist", "Ada")].into_iter().collect();

        let written = write_sidecar(&image, &tags).unwrap();
        assert!(written.exists());
        assert_eq!(read_sidecar(&image).unwrap(), Some(tags));
    }

    #[test]
    fn missing_sidecar_is_none() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(read_sidecar(&tmp.path().join("none.jpg")).unwrap(), None);
    }

    #[test]
    fn malformed_sidecar_is_json_error() {
        let tmp = TempDir::new().unwrap();
        let image = tmp.path().join("bad.jpg");
        std::fs::write(sidecar_path(&image), "{not json").unwrap();
        assert!(matches!(read_sidecar(&image), Err(MetadataError::Json(_))));
    }
}
