//! Editor configuration module.
//!
//! Handles loading, validating, and merging `shrinker.toml`. Stock defaults
//! are the base layer; a user file overrides just the keys it names.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [limits]
//! dimension_ceiling = 20000   # Largest value a width/height field accepts
//! oversize_threshold = 10000  # width + height above this skips the preview
//!
//! [preview]
//! debounce_ms = 400           # Quiet period before a preview recompute
//! max_edge = 1024             # Longer edge of the display copy
//!
//! [export]
//! filename_prefix = "ResizedImage"
//! format = "jpeg"             # jpeg, webp or png
//! quality = 100               # 1-100, lossy formats only
//!
//! [palette]
//! colors = 32
//!
//! [processing]
//! max_processes = 4           # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{DEFAULT_DIMENSION_CEILING, DEFAULT_PALETTE_COLORS, OutputFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "shrinker.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Editor configuration loaded from `shrinker.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditorConfig {
    /// Bounds on the editable dimension fields.
    pub limits: LimitsConfig,
    /// Debounce and display settings for the live preview.
    pub preview: PreviewConfig,
    /// Export naming and encoding defaults.
    pub export: ExportConfig,
    /// Palette extraction settings.
    pub palette: PaletteConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl EditorConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.dimension_ceiling == 0 {
            return Err(ConfigError::Validation(
                "limits.dimension_ceiling must be non-zero".into(),
            ));
        }
        if self.export.quality == 0 || self.export.quality > 100 {
            return Err(ConfigError::Validation(
                "export.quality must be 1-100".into(),
            ));
        }
        if self.preview.max_edge == 0 {
            return Err(ConfigError::Validation(
                "preview.max_edge must be non-zero".into(),
            ));
        }
        if self.palette.colors == 0 {
            return Err(ConfigError::Validation(
                "palette.colors must be non-zero".into(),
            ));
        }
        if self.export.filename_prefix.contains(['/', '\\']) {
            return Err(ConfigError::Validation(
                "export.filename_prefix must not contain path separators".into(),
            ));
        }
        Ok(())
    }
}

/// Bounds on the editable dimension fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Width/height fields clamp to this value.
    pub dimension_ceiling: u32,
    /// When width + height exceeds this, the preview is skipped.
    pub oversize_threshold: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            dimension_ceiling: DEFAULT_DIMENSION_CEILING,
            oversize_threshold: 10_000,
        }
    }
}

/// Live preview settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Quiet period after the last edit before recomputing, in milliseconds.
    pub debounce_ms: u64,
    /// Longer edge of the display copy, in pixels.
    pub max_edge: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 400,
            max_edge: 1024,
        }
    }
}

/// Export naming and encoding defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Prepended to the `yyyyMMdd_HHmmss` timestamp.
    pub filename_prefix: String,
    pub format: OutputFormat,
    pub quality: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            filename_prefix: "ResizedImage".to_string(),
            format: OutputFormat::Jpeg,
            quality: 100,
        }
    }
}

/// Palette extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaletteConfig {
    pub colors: usize,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            colors: DEFAULT_PALETTE_COLORS,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(EditorConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<EditorConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: EditorConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<EditorConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `shrinker.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# shrinker configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Dimension fields
# ---------------------------------------------------------------------------
[limits]
# Width/height input above this value is clamped to it.
dimension_ceiling = 20000

# When target width + height exceeds this, the live preview is skipped
# and the previous dimensions are kept.
oversize_threshold = 10000

# ---------------------------------------------------------------------------
# Live preview
# ---------------------------------------------------------------------------
[preview]
# Quiet period after the last edit before the preview is recomputed (ms).
debounce_ms = 400

# Longer edge of the downscaled display copy (px).
max_edge = 1024

# ---------------------------------------------------------------------------
# Export
# ---------------------------------------------------------------------------
[export]
# Files are named <prefix><yyyyMMdd_HHmmss>.<ext>
filename_prefix = "ResizedImage"

# Output format: "jpeg", "webp" or "png".
format = "jpeg"

# Encoding quality (1 = worst, 100 = best). Ignored for lossless output.
quality = 100

# ---------------------------------------------------------------------------
# Palette
# ---------------------------------------------------------------------------
[palette]
# Maximum number of swatches extracted.
colors = 32

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for batch resizing. Omit for auto (= CPU cores).
# Values above the core count are clamped down.
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = EditorConfig::default();
        assert_eq!(config.limits.dimension_ceiling, 20_000);
        assert_eq!(config.limits.oversize_threshold, 10_000);
        assert_eq!(config.preview.debounce_ms, 400);
        assert_eq!(config.preview.max_edge, 1024);
        assert_eq!(config.export.filename_prefix, "ResizedImage");
        assert_eq!(config.export.format, OutputFormat::Jpeg);
        assert_eq!(config.export.quality, 100);
        assert_eq!(config.palette.colors, 32);
        assert_eq!(config.processing.max_processes, None);
    }

    #[test]
    fn parse_partial_config() {
        let config: EditorConfig = toml::from_str(
            r#"
[export]
format = "webp"
"#,
        )
        .unwrap();
        assert_eq!(config.export.format, OutputFormat::Webp);
        assert_eq!(config.export.quality, 100);
        assert_eq!(config.preview.debounce_ms, 400);
    }

    // =========================================================================
    // load_config
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("shrinker.toml")).unwrap();
        assert_eq!(config, EditorConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shrinker.toml");
        fs::write(
            &path,
            r#"
[preview]
debounce_ms = 150

[processing]
max_processes = 2
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.preview.debounce_ms, 150);
        assert_eq!(config.preview.max_edge, 1024);
        assert_eq!(config.processing.max_processes, Some(2));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shrinker.toml");
        fs::write(&path, "[preview\ndebounce_ms = ").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shrinker.toml");
        fs::write(&path, "[export]\nquality = 0\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // Processing
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(cores + 64),
        };
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_never_zero() {
        let config = ProcessingConfig {
            max_processes: Some(0),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[export]
quality = 100
format = "jpeg"
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[export]
quality = 70
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let export = merged.get("export").unwrap();
        assert_eq!(export.get("quality").unwrap().as_integer(), Some(70));
        assert_eq!(export.get("format").unwrap().as_str(), Some("jpeg"));
    }

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("a = 1\nb = 2").unwrap();
        let overlay: toml::Value = toml::from_str("a = 10").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("a").unwrap().as_integer(), Some(10));
        assert_eq!(merged.get("b").unwrap().as_integer(), Some(2));
    }

    // =========================================================================
    // Unknown key rejection
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let result: Result<EditorConfig, _> = toml::from_str("[preview]\ndebounce = 10\n");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<EditorConfig, _> = toml::from_str("[previews]\nmax_edge = 10\n");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_format_rejected() {
        let result: Result<EditorConfig, _> = toml::from_str("[export]\nformat = \"gif\"\n");
        assert!(result.is_err());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(EditorConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = EditorConfig::default();
        config.export.quality = 101;
        assert!(config.validate().is_err());

        let mut config = EditorConfig::default();
        config.limits.dimension_ceiling = 0;
        assert!(config.validate().is_err());

        let mut config = EditorConfig::default();
        config.export.filename_prefix = "../out".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_config_with_overlay() {
        let overlay: toml::Value = toml::from_str("[palette]\ncolors = 8\n").unwrap();
        let config = resolve_config(stock_defaults_value(), Some(overlay)).unwrap();
        assert_eq!(config.palette.colors, 8);
        assert_eq!(config.export.quality, 100);
    }

    // =========================================================================
    // Stock config
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: EditorConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, EditorConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in ["[limits]", "[preview]", "[export]", "[palette]", "[processing]"] {
            assert!(content.contains(section), "missing {section}");
        }
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value();
        assert!(val.is_table());
        for section in ["limits", "preview", "export", "palette", "processing"] {
            assert!(val.get(section).is_some(), "missing {section}");
        }
    }
}
