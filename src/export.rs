//! Full-resolution export.
//!
//! ```text
//! writable? → render (resize → rotate → flip → encode) → write + flush
//!           → re-decode → apply metadata
//! ```
//!
//! The writable check happens before any pixel work, so an unavailable
//! destination costs nothing. Metadata is best effort: a failing metadata
//! step is reported in [`ExportReport::metadata_error`] while the exported
//! pixels stay in place.
//!
//! The re-decoded image is returned so the session can continue editing
//! from exactly what was written.

use crate::imaging::{BackendError, ImageBackend, OutputFormat, TransformParameters, operations};
use crate::metadata::MetadataTags;
use crate::sink::{ExportSink, SinkError};
use chrono::NaiveDateTime;
use image::{DynamicImage, GenericImageView};
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("no image loaded")]
    NoImage,
    #[error("an export is already running")]
    Busy,
    #[error("destination unavailable: {0}")]
    SinkUnavailable(String),
    #[error("image processing failed: {0}")]
    Imaging(#[from] BackendError),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("export task failed: {0}")]
    Task(String),
}

impl From<SinkError> for ExportError {
    fn from(e: SinkError) -> Self {
        match e {
            SinkError::Unavailable(msg) => ExportError::SinkUnavailable(msg),
            SinkError::Io(e) => ExportError::Io(e),
            SinkError::Metadata(msg) => ExportError::Task(msg),
        }
    }
}

/// Everything an export needs, snapshotted from the session.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub source: Arc<DynamicImage>,
    pub params: TransformParameters,
    pub tags: Option<MetadataTags>,
    pub file_name: String,
}

#[derive(Debug)]
pub struct ExportReport {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub bytes_written: u64,
    /// Set when the pixels were written but the metadata step failed.
    pub metadata_error: Option<SinkError>,
}

#[derive(Debug)]
pub struct ExportOutcome {
    pub report: ExportReport,
    /// The written file, decoded again.
    pub image: DynamicImage,
}

/// `<prefix><yyyyMMdd_HHmmss>.<ext>`
pub fn export_file_name(prefix: &str, format: OutputFormat, at: NaiveDateTime) -> String {
    format!(
        "{}{}.{}",
        prefix,
        at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Run an export synchronously. Call from a blocking context.
#[tracing::instrument(skip_all, fields(file = %job.file_name, format = %job.params.format))]
pub fn export_image<B, S>(
    backend: &B,
    job: &ExportJob,
    sink: &mut S,
) -> Result<ExportOutcome, ExportError>
where
    B: ImageBackend + ?Sized,
    S: ExportSink + ?Sized,
{
    if !sink.is_writable() {
        warn!("Destination is not writable");
        return Err(ExportError::SinkUnavailable(format!(
            "cannot write {}",
            job.file_name
        )));
    }

    let rendered = operations::render(backend, &job.source, &job.params)?;
    {
        let mut writer = sink.open(&job.file_name)?;
        writer.write_all(&rendered.bytes)?;
        writer.flush()?;
    }

    let image = backend.decode(&rendered.bytes)?;
    let (width, height) = image.dimensions();

    let metadata_error = job.tags.as_ref().and_then(|tags| {
        sink.apply_metadata(&job.file_name, tags)
            .inspect_err(|e| warn!(error = %e, "Metadata was not applied"))
            .err()
    });

    info!(
        width,
        height,
        bytes = rendered.bytes.len(),
        "Exported {}",
        job.file_name
    );

    Ok(ExportOutcome {
        report: ExportReport {
            file_name: job.file_name.clone(),
            width,
            height,
            bytes_written: rendered.bytes.len() as u64,
            metadata_error,
        },
        image,
    })
}
