//! Export destinations.
//!
//! The exporter never touches paths directly. It asks an [`ExportSink`]
//! whether it can accept a file, opens a writer for the encoded bytes, and
//! finally hands over the metadata tags for the written file.
//!
//! - [`DirectorySink`]: files in a directory, tags embedded as EXIF plus a
//!   `<stem>.exif.json` sidecar
//! - [`MemorySink`]: shared in-memory store, used by tests and embedders that
//!   want the bytes rather than a file

use crate::metadata::{self, MetadataTags};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("destination unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata write failed: {0}")]
    Metadata(String),
}

/// A destination for exported images.
pub trait ExportSink: Send {
    /// Whether the destination can currently accept a file.
    fn is_writable(&self) -> bool;

    /// Open a writer for a new file called `name`.
    fn open(&mut self, name: &str) -> Result<Box<dyn Write + '_>, SinkError>;

    /// Attach metadata tags to the already written file `name`.
    fn apply_metadata(&mut self, name: &str, tags: &MetadataTags) -> Result<(), SinkError>;
}

impl<S: ExportSink + ?Sized> ExportSink for Box<S> {
    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }

    fn open(&mut self, name: &str) -> Result<Box<dyn Write + '_>, SinkError> {
        (**self).open(name)
    }

    fn apply_metadata(&mut self, name: &str, tags: &MetadataTags) -> Result<(), SinkError> {
        (**self).apply_metadata(name, tags)
    }
}

// ============================================================================
// Directory
// ============================================================================

/// Writes files into a directory, creating it on demand.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of a file written by this sink.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl ExportSink for DirectorySink {
    fn is_writable(&self) -> bool {
        std::fs::create_dir_all(&self.dir).is_ok()
            && std::fs::metadata(&self.dir)
                .map(|m| m.is_dir() && !m.permissions().readonly())
                .unwrap_or(false)
    }

    fn open(&mut self, name: &str) -> Result<Box<dyn Write + '_>, SinkError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| SinkError::Unavailable(format!("{}: {}", self.dir.display(), e)))?;
        let file = File::create(self.path_for(name))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    /// Writes the sidecar first, then embeds what EXIF can carry.
    fn apply_metadata(&mut self, name: &str, tags: &MetadataTags) -> Result<(), SinkError> {
        let path = self.path_for(name);
        metadata::write_sidecar(&path, tags).map_err(|e| SinkError::Metadata(e.to_string()))?;
        let embedded = metadata::write_exif_tags(&path, tags)
            .map_err(|e| SinkError::Metadata(e.to_string()))?;
        debug!(file = name, embedded, sidecar = tags.len(), "Metadata written");
        Ok(())
    }
}

// ============================================================================
// Memory
// ============================================================================

type Store<T> = Arc<Mutex<BTreeMap<String, T>>>;

fn lock<T>(store: &Mutex<T>) -> MutexGuard<'_, T> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory sink. Clones share the same store.
#[derive(Debug, Clone)]
pub struct MemorySink {
    files: Store<Vec<u8>>,
    tags: Store<MetadataTags>,
    writable: bool,
    fail_metadata: bool,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            files: Arc::default(),
            tags: Arc::default(),
            writable: true,
            fail_metadata: false,
        }
    }

    /// A sink that reports itself unwritable.
    pub fn unwritable() -> Self {
        Self {
            writable: false,
            ..Self::new()
        }
    }

    /// A sink whose metadata step always fails.
    pub fn failing_metadata() -> Self {
        Self {
            fail_metadata: true,
            ..Self::new()
        }
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        lock(&self.files).get(name).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        lock(&self.files).keys().cloned().collect()
    }

    pub fn tags(&self, name: &str) -> Option<MetadataTags> {
        lock(&self.tags).get(name).cloned()
    }
}

struct MemoryWriter {
    name: String,
    files: Store<Vec<u8>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        lock(&self.files)
            .entry(self.name.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl ExportSink for MemorySink {
    fn is_writable(&self) -> bool {
        self.writable
    }

    fn open(&mut self, name: &str) -> Result<Box<dyn Write + '_>, SinkError> {
        if !self.writable {
            return Err(SinkError::Unavailable("memory sink is read-only".to_string()));
        }
        lock(&self.files).insert(name.to_string(), Vec::new());
        Ok(Box::new(MemoryWriter {
            name: name.to_string(),
            files: Arc::clone(&self.files),
        }))
    }

    fn apply_metadata(&mut self, name: &str, tags: &MetadataTags) -> Result<(), SinkError> {
        if self.fail_metadata {
            return Err(SinkError::Metadata(format!("{name}: rejected")));
        }
        lock(&self.tags).insert(name.to_string(), tags.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn directory_sink_creates_dir_and_writes() {
        let tmp = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(tmp.path().join("out/nested"));
        assert!(sink.is_writable());

        {
            let mut w = sink.open("a.jpg").unwrap();
            w.write_all(b"hello").unwrap();
            w.flush().unwrap();
        }
        assert_eq!(std::fs::read(sink.path_for("a.jpg")).unwrap(), b"hello");
    }

    #[test]
    fn directory_under_a_file_is_unwritable() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let sink = DirectorySink::new(blocker.join("sub"));
        assert!(!sink.is_writable());
    }

    fn write_jpeg(sink: &mut DirectorySink, name: &str) {
        let mut bytes = std::io::Cursor::new(Vec::new());
        crate::test_helpers::gradient_image(24, 16)
            .write_to(&mut bytes, image::ImageFormat::Jpeg)
            .unwrap();
        let mut w = sink.open(name).unwrap();
        w.write_all(bytes.get_ref()).unwrap();
        w.flush().unwrap();
    }

    #[test]
    fn directory_sink_embeds_exif_and_writes_sidecar() {
        let tmp = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(tmp.path());
        write_jpeg(&mut sink, "photo.jpg");
        let tags: MetadataTags = [("Make", "Canon"), ("Artist", "Ada"), ("XPComment", "note")]
            .into_iter()
            .collect();
        sink.apply_metadata("photo.jpg", &tags).unwrap();

        let path = sink.path_for("photo.jpg");
        let embedded = metadata::read_exif_tags(&path).unwrap();
        assert_eq!(embedded.get("Make"), Some("Canon"));
        assert_eq!(embedded.get("Artist"), Some("Ada"));
        assert_eq!(metadata::read_sidecar(&path).unwrap(), Some(tags));
    }

    #[test]
    fn directory_sink_metadata_for_missing_file_fails() {
        let tmp = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(tmp.path());
        let tags: MetadataTags = [("Make", "Canon")].into_iter().collect();
        let result = sink.apply_metadata("never-written.jpg", &tags);
        assert!(matches!(result, Err(SinkError::Metadata(_))));
    }

    #[test]
    fn memory_sink_clones_share_store() {
        let sink = MemorySink::new();
        let mut writer_side = sink.clone();
        writer_side
            .open("x.png")
            .unwrap()
            .write_all(b"abc")
            .unwrap();
        assert_eq!(sink.file("x.png"), Some(b"abc".to_vec()));
        assert_eq!(sink.file_names(), vec!["x.png".to_string()]);
    }

    #[test]
    fn memory_sink_flags() {
        let mut sink = MemorySink::unwritable();
        assert!(!sink.is_writable());
        assert!(matches!(sink.open("x"), Err(SinkError::Unavailable(_))));

        let mut sink = MemorySink::failing_metadata();
        let result = sink.apply_metadata("x", &MetadataTags::new());
        assert!(matches!(result, Err(SinkError::Metadata(_))));
    }

    #[test]
    fn boxed_sink_delegates() {
        let inner = MemorySink::new();
        let mut boxed: Box<dyn ExportSink> = Box::new(inner.clone());
        boxed.open("y").unwrap().write_all(b"1").unwrap();
        assert_eq!(inner.file("y"), Some(b"1".to_vec()));
    }
}
