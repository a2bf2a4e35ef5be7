//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations every backend must
//! support: decode, preview, and render.
//!
//! - **decode**: bytes → raster image
//! - **preview**: transform + measure the encoded size + downscale for display
//! - **render**: transform + encode at full resolution (the export payload)
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Everything is statically linked into the binary.

use super::params::TransformRequest;
use image::DynamicImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Output of a preview operation.
#[derive(Debug, Clone)]
pub struct Preview {
    /// Display copy, downscaled so its longer edge fits the requested maximum.
    pub image: DynamicImage,
    /// Width of the transformed image before display downscaling.
    pub width: u32,
    /// Height of the transformed image before display downscaling.
    pub height: u32,
    /// Bytes the transformed image occupies when encoded with the request's format/quality.
    pub encoded_size: u64,
}

/// Output of a render operation: the encoded export payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// Every backend must implement all three operations so the session and the
/// exporter stay backend-agnostic. Implementations are called from blocking
/// worker threads and must be `Send + Sync`.
pub trait ImageBackend: Send + Sync {
    /// Decode an encoded image.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError>;

    /// Apply the transform, measure the encoded size, and produce a display copy.
    fn preview(
        &self,
        source: &DynamicImage,
        request: &TransformRequest,
        max_edge: u32,
    ) -> Result<Preview, BackendError>;

    /// Apply the transform and encode at full resolution.
    fn render(
        &self,
        source: &DynamicImage,
        request: &TransformRequest,
    ) -> Result<Rendered, BackendError>;
}

impl<T: ImageBackend + ?Sized> ImageBackend for Arc<T> {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError> {
        (**self).decode(bytes)
    }

    fn preview(
        &self,
        source: &DynamicImage,
        request: &TransformRequest,
        max_edge: u32,
    ) -> Result<Preview, BackendError> {
        (**self).preview(source, request, max_edge)
    }

    fn render(
        &self,
        source: &DynamicImage,
        request: &TransformRequest,
    ) -> Result<Rendered, BackendError> {
        (**self).render(source, request)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::calculations::calculate_target_dimensions;
    use crate::imaging::params::{OutputFormat, ResizeStrategy};
    use image::GenericImageView;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Encoded size every mock preview reports.
    pub const MOCK_ENCODED_SIZE: u64 = 4096;

    /// Mock backend that records operations without doing pixel work.
    ///
    /// Dimensions are computed with the real calculation functions so callers
    /// can assert on reconciled width/height fields. Uses Mutex (not RefCell)
    /// so it is Sync and works from blocking worker threads.
    #[derive(Default)]
    pub struct MockBackend {
        pub operations: Mutex<Vec<RecordedOp>>,
        pub fail_preview: AtomicBool,
        pub fail_render: AtomicBool,
        pub fail_decode: AtomicBool,
        pub preview_delay: Option<Duration>,
        last_render: Mutex<Option<(u32, u32)>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Decode(usize),
        Preview {
            width: u32,
            height: u32,
            format: OutputFormat,
            quality: u32,
            quarter_turns: u8,
            flipped: bool,
        },
        Render {
            width: u32,
            height: u32,
            format: OutputFormat,
            quality: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_preview_delay(delay: Duration) -> Self {
            Self {
                preview_delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn preview_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Preview { .. }))
                .count()
        }

        pub fn render_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Render { .. }))
                .count()
        }

        fn final_dimensions(source: &DynamicImage, request: &TransformRequest) -> (u32, u32) {
            let odd = request.quarter_turns % 2 == 1;
            let (w, h) = if odd {
                (request.height, request.width)
            } else {
                (request.width, request.height)
            };
            let (rw, rh) =
                calculate_target_dimensions(request.strategy, source.dimensions(), w, h);
            if odd { (rh, rw) } else { (rw, rh) }
        }
    }

    impl ImageBackend for MockBackend {
        fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Decode(bytes.len()));
            if self.fail_decode.load(Ordering::SeqCst) {
                return Err(BackendError::Decode("mock decode failure".to_string()));
            }
            let (w, h) = self.last_render.lock().unwrap().unwrap_or((1, 1));
            Ok(DynamicImage::new_rgb8(w, h))
        }

        fn preview(
            &self,
            source: &DynamicImage,
            request: &TransformRequest,
            _max_edge: u32,
        ) -> Result<Preview, BackendError> {
            if let Some(delay) = self.preview_delay {
                std::thread::sleep(delay);
            }
            let (width, height) = Self::final_dimensions(source, request);
            self.operations.lock().unwrap().push(RecordedOp::Preview {
                width,
                height,
                format: request.format,
                quality: request.quality.value(),
                quarter_turns: request.quarter_turns,
                flipped: request.flipped,
            });
            if self.fail_preview.load(Ordering::SeqCst) {
                return Err(BackendError::Encode("mock preview failure".to_string()));
            }
            Ok(Preview {
                image: DynamicImage::new_rgb8(1, 1),
                width,
                height,
                encoded_size: MOCK_ENCODED_SIZE,
            })
        }

        fn render(
            &self,
            source: &DynamicImage,
            request: &TransformRequest,
        ) -> Result<Rendered, BackendError> {
            let (width, height) = Self::final_dimensions(source, request);
            self.operations.lock().unwrap().push(RecordedOp::Render {
                width,
                height,
                format: request.format,
                quality: request.quality.value(),
            });
            if self.fail_render.load(Ordering::SeqCst) {
                return Err(BackendError::Encode("mock render failure".to_string()));
            }
            *self.last_render.lock().unwrap() = Some((width, height));
            Ok(Rendered {
                bytes: b"mock-encoded".to_vec(),
                width,
                height,
            })
        }
    }

    #[test]
    fn mock_records_preview() {
        let backend = MockBackend::new();
        let source = DynamicImage::new_rgb8(1000, 500);
        let request = TransformRequest {
            width: Some(400),
            strategy: ResizeStrategy::Fit,
            ..TransformRequest::default()
        };

        let preview = backend.preview(&source, &request, 1024).unwrap();
        assert_eq!((preview.width, preview.height), (400, 200));
        assert_eq!(preview.encoded_size, MOCK_ENCODED_SIZE);

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Preview {
                width: 400,
                height: 200,
                ..
            }
        ));
    }

    #[test]
    fn mock_render_then_decode_matches_dimensions() {
        let backend = MockBackend::new();
        let source = DynamicImage::new_rgb8(300, 200);
        let request = TransformRequest {
            quarter_turns: 1,
            ..TransformRequest::default()
        };

        let rendered = backend.render(&source, &request).unwrap();
        assert_eq!((rendered.width, rendered.height), (200, 300));

        let decoded = backend.decode(&rendered.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (200, 300));
    }

    #[test]
    fn mock_failure_flags() {
        let backend = MockBackend::new();
        backend.fail_preview.store(true, Ordering::SeqCst);
        let source = DynamicImage::new_rgb8(10, 10);
        let result = backend.preview(&source, &TransformRequest::default(), 1024);
        assert!(matches!(result, Err(BackendError::Encode(_))));
    }

    #[test]
    fn arc_backend_delegates() {
        let backend = Arc::new(MockBackend::new());
        let source = DynamicImage::new_rgb8(10, 10);
        backend
            .render(&source, &TransformRequest::default())
            .unwrap();
        assert_eq!(backend.render_count(), 1);
    }
}
