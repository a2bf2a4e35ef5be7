//! CLI output formatting.
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.
//!
//! # Output Format
//!
//! ## Resize
//!
//! ```text
//! 001 dawn.jpg → ResizedImage20240307_090501.jpg
//!     1200×800 jpeg, 184.2 KB
//!     Tags: dawn.exif.json
//! 002 notes.png
//!     Error: Decode failed: ...
//!
//! Exported 1 of 2 images
//! ```
//!
//! ## Preview
//!
//! ```text
//! Source: 4000×3000
//! Target: 1200×900 webp q80 fit
//! Rotation: 90°, flipped
//! Preview: 1200×900, ~212.5 KB
//! Preset: 30%
//! ```
//!
//! ## Filter list
//!
//! ```text
//! contrast               Contrast               contrast=1
//! white_balance          White balance          white_balance=5000,0
//! ```
//!
//! ## Palette
//!
//! ```text
//! 001 #1f2a44  38.2%
//! 002 #d9c9a3  21.0%
//! ```

use crate::export::ExportReport;
use crate::imaging::{Filter, FilterKind, Swatch};
use crate::metadata::MetadataTags;
use crate::session::SessionSnapshot;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count (1024-based, one decimal above bytes).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

// ============================================================================
// Resize
// ============================================================================

/// Outcome of one file in a batch resize.
#[derive(Debug)]
pub struct BatchItem {
    pub source_name: String,
    pub result: Result<ExportReport, String>,
    /// Name of the sidecar written next to the output, if any.
    pub sidecar: Option<String>,
}

pub fn format_export_report(report: &ExportReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{}×{}, {}",
        report.width,
        report.height,
        format_bytes(report.bytes_written)
    )];
    if let Some(err) = &report.metadata_error {
        lines.push(format!("Tags not written: {err}"));
    }
    lines
}

pub fn format_batch_output(items: &[BatchItem]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut exported = 0;

    for (i, item) in items.iter().enumerate() {
        match &item.result {
            Ok(report) => {
                exported += 1;
                lines.push(format!(
                    "{} {} → {}",
                    format_index(i + 1),
                    item.source_name,
                    report.file_name
                ));
                for line in format_export_report(report) {
                    lines.push(format!("{}{}", indent(1), line));
                }
                if let Some(sidecar) = &item.sidecar {
                    lines.push(format!("{}Tags: {}", indent(1), sidecar));
                }
            }
            Err(err) => {
                lines.push(format!("{} {}", format_index(i + 1), item.source_name));
                lines.push(format!("{}Error: {}", indent(1), err));
            }
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!("Exported {} of {} images", exported, items.len()));
    lines
}

pub fn print_batch_output(items: &[BatchItem]) {
    for line in format_batch_output(items) {
        println!("{}", line);
    }
}

// ============================================================================
// Preview
// ============================================================================

pub fn format_preview(snapshot: &SessionSnapshot) -> Vec<String> {
    let mut lines = Vec::new();
    let params = &snapshot.params;

    if let Some((w, h)) = snapshot.source_dims {
        lines.push(format!("Source: {}×{}", w, h));
    }

    let field = |value: &str| {
        if value.is_empty() {
            "auto".to_string()
        } else {
            value.to_string()
        }
    };
    let quality = if params.format.is_lossy() {
        format!(" q{}", params.quality().value())
    } else {
        String::new()
    };
    lines.push(format!(
        "Target: {}×{} {}{} {}",
        field(&params.width),
        field(&params.height),
        params.format,
        quality,
        params.strategy
    ));

    if params.rotation != 0 || params.flipped {
        let flip = if params.flipped { ", flipped" } else { "" };
        lines.push(format!("Rotation: {}°{}", params.rotation, flip));
    }

    match (&snapshot.preview, snapshot.preview_dims) {
        (Some(_), Some((w, h))) => lines.push(format!(
            "Preview: {}×{}, ~{}",
            w,
            h,
            format_bytes(params.size_estimate)
        )),
        _ => lines.push("Preview: skipped (target too large)".to_string()),
    }

    if snapshot.telegram {
        lines.push("Preset: Telegram sticker".to_string());
    } else if let Some(percent) = snapshot.preset {
        lines.push(format!("Preset: {}%", percent));
    }
    lines
}

pub fn print_preview(snapshot: &SessionSnapshot) {
    for line in format_preview(snapshot) {
        println!("{}", line);
    }
}

// ============================================================================
// Palette
// ============================================================================

pub fn format_palette(swatches: &[Swatch]) -> Vec<String> {
    let total: u64 = swatches.iter().map(|s| u64::from(s.population)).sum();
    swatches
        .iter()
        .enumerate()
        .map(|(i, swatch)| {
            let share = if total == 0 {
                0.0
            } else {
                f64::from(swatch.population) * 100.0 / total as f64
            };
            format!("{} {} {:>5.1}%", format_index(i + 1), swatch.hex(), share)
        })
        .collect()
}

pub fn print_palette(swatches: &[Swatch]) {
    for line in format_palette(swatches) {
        println!("{}", line);
    }
}

// ============================================================================
// Filters
// ============================================================================

/// One line per filter: CLI name, title, and the default in CLI syntax.
pub fn format_filter_list(kinds: &[FilterKind]) -> Vec<String> {
    kinds
        .iter()
        .map(|&kind| {
            let filter = Filter::default_for(kind);
            format!("{:<22} {:<22} {}", kind.name(), filter.title(), filter)
        })
        .collect()
}

pub fn print_filter_list(kinds: &[FilterKind]) {
    for line in format_filter_list(kinds) {
        println!("{}", line);
    }
}

// ============================================================================
// Tags
// ============================================================================

/// `Name: value` lines, names padded to a common width.
pub fn format_tags(tags: &MetadataTags) -> Vec<String> {
    if tags.is_empty() {
        return vec!["No EXIF tags".to_string()];
    }
    let width = tags.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    tags.iter()
        .map(|(name, value)| {
            let label = format!("{name}:");
            format!("{:<width$}  {}", label, value, width = width + 1)
        })
        .collect()
}

pub fn print_tags(tags: &MetadataTags) {
    for line in format_tags(tags) {
        println!("{}", line);
    }
}
