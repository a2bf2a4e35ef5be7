//! Editing session: image state, parameter edits and the debounced preview.
//!
//! A [`Session`] is a cheap, cloneable handle. Setters are synchronous and
//! only hold a mutex for the duration of the field update; anything that
//! touches pixels runs as a Tokio task on the runtime the session was bound
//! to, with the CPU part on `spawn_blocking`.
//!
//! ## Recompute
//!
//! Every edit that changes the parameters bumps a generation counter, aborts
//! the pending recompute task and spawns a new one that sleeps for the
//! debounce window before doing any work. A task only publishes its result
//! while its generation is still the latest one, so a burst of edits ends in
//! exactly one preview.
//!
//! ```text
//! edit ─┬─ gen=1 ─ sleep ✗ (aborted)
//! edit ─┼─ gen=2 ─ sleep ✗ (aborted)
//! edit ─┴─ gen=3 ─ sleep ─ preview ─ publish
//! ```
//!
//! When the declared width + height exceeds the oversize threshold the
//! preview is skipped and hidden; for `Fit` the fields snap back to the last
//! known preview dimensions.
//!
//! ## Export
//!
//! At most one export runs at a time. The export itself is a spawned task, so
//! it completes even if the awaiting caller goes away. On success the session
//! continues from the re-decoded written image with rotation and flip reset.

use crate::config::EditorConfig;
use crate::export::{ExportError, ExportJob, ExportReport, export_file_name, export_image};
use crate::imaging::{
    BackendError, DEFAULT_DIMENSION_CEILING, ImageBackend, OutputFormat, ResizeStrategy,
    TransformParameters, exceeds_preview_threshold, generate_preview, plan_percent_preset,
    restrict,
};
use crate::metadata::MetadataTags;
use crate::sink::ExportSink;
use image::{DynamicImage, GenericImageView};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Edge length of the Telegram sticker preset.
pub const TELEGRAM_EDGE: u32 = 512;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("could not load image: {0}")]
    Decode(#[from] BackendError),
}

/// Runtime knobs of a session, usually derived from [`EditorConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub debounce: Duration,
    pub oversize_threshold: u64,
    pub dimension_ceiling: u32,
    pub preview_max_edge: u32,
    pub filename_prefix: String,
    /// Format fresh parameters start with.
    pub default_format: OutputFormat,
    /// Quality fresh parameters start with.
    pub default_quality: f32,
}

impl SessionConfig {
    pub fn from_editor_config(config: &EditorConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.preview.debounce_ms),
            oversize_threshold: config.limits.oversize_threshold,
            dimension_ceiling: config.limits.dimension_ceiling,
            preview_max_edge: config.preview.max_edge,
            filename_prefix: config.export.filename_prefix.clone(),
            default_format: config.export.format,
            default_quality: config.export.quality as f32,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_editor_config(&EditorConfig::default())
    }
}

/// Preset bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// 512×512, PNG, quality 100, fit inside.
    Telegram,
    /// Scale the source by a percentage and use the same number as quality.
    Percent(u8),
}

impl Preset {
    /// Parameters after applying the preset to `current`.
    ///
    /// Percent presets need the source dimensions and return `None` without them.
    pub fn plan(
        self,
        current: &TransformParameters,
        source: Option<(u32, u32)>,
    ) -> Option<TransformParameters> {
        match self {
            Preset::Telegram => Some(TransformParameters {
                width: TELEGRAM_EDGE.to_string(),
                height: TELEGRAM_EDGE.to_string(),
                format: OutputFormat::Png,
                quality: 100.0,
                strategy: ResizeStrategy::Fit,
                ..current.clone()
            }),
            Preset::Percent(percent) => {
                source.map(|dims| plan_percent_preset(current, dims, percent.clamp(1, 100)))
            }
        }
    }
}

/// Notifications published by background tasks.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PreviewReady {
        generation: u64,
        width: u32,
        height: u32,
        size_estimate: u64,
    },
    PreviewSkipped {
        generation: u64,
    },
    PreviewFailed {
        generation: u64,
        error: String,
    },
    Exported {
        file_name: String,
        width: u32,
        height: u32,
        bytes_written: u64,
    },
}

/// Point-in-time copy of the observable session state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub params: TransformParameters,
    pub source: Option<Arc<DynamicImage>>,
    pub source_dims: Option<(u32, u32)>,
    pub preview: Option<Arc<DynamicImage>>,
    pub preview_dims: Option<(u32, u32)>,
    pub tags: Option<MetadataTags>,
    /// Active percentage preset.
    pub preset: Option<u8>,
    /// Whether the Telegram preset is active.
    pub telegram: bool,
    pub loading: bool,
    pub exporting: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    source: Option<Arc<DynamicImage>>,
    tags: Option<MetadataTags>,
    params: TransformParameters,
    preview: Option<Arc<DynamicImage>>,
    preview_dims: Option<(u32, u32)>,
    preset: Option<u8>,
    telegram: bool,
    loading: bool,
}

/// What an edit does besides replacing the parameters.
#[derive(Debug, Clone, Copy)]
struct Effects {
    clear_preset: bool,
    clear_telegram: bool,
    recompute: bool,
}

struct Inner<B> {
    backend: Arc<B>,
    config: SessionConfig,
    runtime: Handle,
    state: Mutex<SessionState>,
    generation: AtomicU64,
    recompute: Mutex<Option<JoinHandle<()>>>,
    exporting: AtomicBool,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to an editing session. Clones share the same state.
pub struct Session<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for Session<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: ImageBackend + 'static> Session<B> {
    /// Create a session whose background work runs on `runtime`.
    pub fn new(backend: B, config: SessionConfig, runtime: Handle) -> Self {
        Self::build(backend, config, runtime, None)
    }

    /// Like [`Session::new`], also returning a receiver for [`SessionEvent`]s.
    pub fn with_events(
        backend: B,
        config: SessionConfig,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::build(backend, config, runtime, Some(tx)), rx)
    }

    fn build(
        backend: B,
        config: SessionConfig,
        runtime: Handle,
        events: Option<mpsc::UnboundedSender<SessionEvent>>,
    ) -> Self {
        let state = SessionState {
            params: Self::fresh_params(&config, None),
            ..SessionState::default()
        };
        Self {
            inner: Arc::new(Inner {
                backend: Arc::new(backend),
                config,
                runtime,
                state: Mutex::new(state),
                generation: AtomicU64::new(0),
                recompute: Mutex::new(None),
                exporting: AtomicBool::new(false),
                events,
            }),
        }
    }

    fn fresh_params(config: &SessionConfig, dims: Option<(u32, u32)>) -> TransformParameters {
        let base = match dims {
            Some((w, h)) => TransformParameters::from_dimensions(w, h),
            None => TransformParameters::default(),
        };
        TransformParameters {
            format: config.default_format,
            quality: config.default_quality,
            ..base
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.inner.state)
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.inner.events {
            // A dropped receiver just means nobody is listening.
            let _ = tx.send(event);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    // ========================================================================
    // Image state
    // ========================================================================

    /// Replace the source image. Parameters reset to its dimensions.
    pub fn load_image(&self, image: DynamicImage, tags: Option<MetadataTags>) {
        let dims = image.dimensions();
        info!(width = dims.0, height = dims.1, "Loaded image");
        let mut state = self.state();
        let size_estimate = state.params.size_estimate;
        *state = SessionState {
            source: Some(Arc::new(image)),
            tags,
            params: TransformParameters {
                size_estimate,
                ..Self::fresh_params(&self.inner.config, Some(dims))
            },
            ..SessionState::default()
        };
        self.schedule_recompute(&mut state);
    }

    /// Decode `bytes` with the session backend and load the result.
    ///
    /// On failure the session state is left untouched.
    pub async fn load_bytes(
        &self,
        bytes: &[u8],
        tags: Option<MetadataTags>,
    ) -> Result<(), SessionError> {
        let backend = Arc::clone(&self.inner.backend);
        let bytes = bytes.to_vec();
        let image = self
            .inner
            .runtime
            .spawn_blocking(move || backend.decode(&bytes))
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))??;
        self.load_image(image, tags);
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            params: state.params.clone(),
            source: state.source.clone(),
            source_dims: state.source.as_ref().map(|s| s.dimensions()),
            preview: state.preview.clone(),
            preview_dims: state.preview_dims,
            tags: state.tags.clone(),
            preset: state.preset,
            telegram: state.telegram,
            loading: state.loading,
            exporting: self.inner.exporting.load(Ordering::SeqCst),
        }
    }

    pub fn params(&self) -> TransformParameters {
        self.state().params.clone()
    }

    /// Number of recomputes scheduled so far.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Parameter edits
    // ========================================================================

    /// Replace the parameters with `edit(state)` and apply the effects.
    ///
    /// Returns `false` (and does nothing) when the parameters are unchanged.
    fn update(
        &self,
        edit: impl FnOnce(&SessionState) -> (TransformParameters, Effects),
    ) -> bool {
        let mut state = self.state();
        let (params, effects) = edit(&*state);
        if params == state.params {
            return false;
        }
        state.params = params;
        if effects.clear_preset {
            state.preset = None;
        }
        if effects.clear_telegram {
            state.telegram = false;
        }
        if effects.recompute {
            self.schedule_recompute(&mut state);
        }
        true
    }

    fn ceiling(&self) -> u32 {
        match self.inner.config.dimension_ceiling {
            0 => DEFAULT_DIMENSION_CEILING,
            c => c,
        }
    }

    /// Store a new quality (0–100). While the format is PNG nothing is recomputed.
    pub fn set_quality(&self, quality: f32) {
        let quality = if quality.is_nan() {
            0.0
        } else {
            quality.clamp(0.0, 100.0)
        };
        self.update(|state| {
            let params = TransformParameters {
                quality,
                ..state.params.clone()
            };
            let effects = Effects {
                clear_preset: true,
                clear_telegram: false,
                recompute: state.params.format != OutputFormat::Png,
            };
            (params, effects)
        });
    }

    /// Set the width field. Input goes through [`restrict`].
    pub fn set_target_width(&self, input: &str) {
        let width = restrict(input, self.ceiling());
        self.update(|state| {
            let params = TransformParameters {
                width,
                ..state.params.clone()
            };
            (params, Effects::all())
        });
    }

    /// Set the height field. Input goes through [`restrict`].
    pub fn set_target_height(&self, input: &str) {
        let height = restrict(input, self.ceiling());
        self.update(|state| {
            let params = TransformParameters {
                height,
                ..state.params.clone()
            };
            (params, Effects::all())
        });
    }

    pub fn set_format(&self, format: OutputFormat) {
        self.update(|state| {
            let params = TransformParameters {
                format,
                ..state.params.clone()
            };
            let effects = Effects {
                clear_preset: false,
                clear_telegram: format != OutputFormat::Png,
                recompute: true,
            };
            (params, effects)
        });
    }

    pub fn set_resize_strategy(&self, strategy: ResizeStrategy) {
        self.update(|state| {
            let params = TransformParameters {
                strategy,
                ..state.params.clone()
            };
            let effects = Effects {
                clear_preset: false,
                clear_telegram: strategy != ResizeStrategy::Fit,
                recompute: true,
            };
            (params, effects)
        });
    }

    /// Rotate 90° counter-clockwise. Width and height swap.
    pub fn rotate_left(&self) {
        self.rotate_by(-90);
    }

    /// Rotate 90° clockwise. Width and height swap.
    pub fn rotate_right(&self) {
        self.rotate_by(90);
    }

    fn rotate_by(&self, degrees: i32) {
        self.update(|state| {
            let current = &state.params;
            let params = TransformParameters {
                rotation: (current.rotation + degrees).rem_euclid(360),
                width: current.height.clone(),
                height: current.width.clone(),
                ..current.clone()
            };
            (params, Effects::transform_only())
        });
    }

    pub fn set_flipped(&self, flipped: bool) {
        self.update(|state| {
            let params = TransformParameters {
                flipped,
                ..state.params.clone()
            };
            (params, Effects::transform_only())
        });
    }

    pub fn toggle_flip(&self) {
        self.update(|state| {
            let params = TransformParameters {
                flipped: !state.params.flipped,
                ..state.params.clone()
            };
            (params, Effects::transform_only())
        });
    }

    /// Replace the whole parameter bundle.
    ///
    /// Width/height go through [`restrict`]; the size estimate is kept.
    pub fn set_parameters(&self, params: TransformParameters) {
        let ceiling = self.ceiling();
        self.update(|state| {
            let params = TransformParameters {
                width: restrict(&params.width, ceiling),
                height: restrict(&params.height, ceiling),
                rotation: params.rotation.rem_euclid(360) / 90 * 90,
                size_estimate: state.params.size_estimate,
                ..params
            };
            (params, Effects::all())
        });
    }

    /// Apply a preset bundle.
    ///
    /// The preset markers are set even when the parameters already match;
    /// a recompute is scheduled only if they changed.
    pub fn apply_preset(&self, preset: Preset) {
        let mut state = self.state();
        let source_dims = state.source.as_ref().map(|s| s.dimensions());
        let Some(params) = preset.plan(&state.params, source_dims) else {
            debug!("Percent preset ignored without an image");
            return;
        };
        match preset {
            Preset::Telegram => {
                state.preset = None;
                state.telegram = true;
            }
            Preset::Percent(percent) => {
                state.preset = Some(percent.clamp(1, 100));
                state.telegram = false;
            }
        }
        if params != state.params {
            state.params = params;
            self.schedule_recompute(&mut state);
        }
    }

    /// Reset the parameters to the source dimensions and configured defaults.
    pub fn reset_values(&self) {
        let config = &self.inner.config;
        self.update(|state| {
            let dims = state.source.as_ref().map(|s| s.dimensions());
            let params = TransformParameters {
                size_estimate: state.params.size_estimate,
                ..Self::fresh_params(config, dims)
            };
            (params, Effects::all())
        });
    }

    // ========================================================================
    // Metadata tags
    // ========================================================================

    pub fn tags(&self) -> Option<MetadataTags> {
        self.state().tags.clone()
    }

    pub fn set_tag(&self, tag: &str, value: &str) {
        self.state()
            .tags
            .get_or_insert_with(MetadataTags::new)
            .set(tag, value);
    }

    pub fn remove_tag(&self, tag: &str) {
        if let Some(tags) = self.state().tags.as_mut() {
            tags.remove(tag);
        }
    }

    /// Remove every known EXIF tag.
    pub fn clear_tags(&self) {
        if let Some(tags) = self.state().tags.as_mut() {
            tags.clear();
        }
    }

    // ========================================================================
    // Recompute
    // ========================================================================

    /// Claim the next generation and replace the pending recompute.
    ///
    /// Takes the state guard so the new parameters and their generation
    /// become visible together. Lock order is state, then recompute slot.
    fn schedule_recompute(&self, state: &mut SessionState) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        state.loading = true;
        debug!(generation, "Scheduling preview recompute");

        let mut slot = lock(&self.inner.recompute);
        if let Some(pending) = slot.take() {
            pending.abort();
        }
        let session = self.clone();
        *slot = Some(
            self.inner
                .runtime
                .spawn(async move { session.recompute(generation).await }),
        );
    }

    async fn recompute(&self, generation: u64) {
        tokio::time::sleep(self.inner.config.debounce).await;
        if !self.is_current(generation) {
            return;
        }

        let (source, params) = {
            let state = self.state();
            (state.source.clone(), state.params.clone())
        };
        let Some(source) = source else {
            self.finish(generation, |state| state.loading = false);
            return;
        };

        if exceeds_preview_threshold(
            &params.width,
            &params.height,
            self.inner.config.oversize_threshold,
        ) {
            debug!(generation, "Target exceeds preview threshold, skipping");
            let published = self.finish(generation, |state| {
                state.preview = None;
                if state.params.strategy == ResizeStrategy::Fit {
                    if let Some((w, h)) = state.preview_dims {
                        state.params.width = w.to_string();
                        state.params.height = h.to_string();
                    }
                }
                state.loading = false;
            });
            if published {
                self.emit(SessionEvent::PreviewSkipped { generation });
            }
            return;
        }

        let backend = Arc::clone(&self.inner.backend);
        let max_edge = self.inner.config.preview_max_edge;
        let result = self
            .inner
            .runtime
            .spawn_blocking(move || generate_preview(&backend, &source, &params, max_edge))
            .await
            .map_err(|e| BackendError::Encode(e.to_string()))
            .and_then(|r| r);

        match result {
            Ok(preview) => {
                let (width, height, size) = (preview.width, preview.height, preview.encoded_size);
                let published = self.finish(generation, |state| {
                    state.preview = Some(Arc::new(preview.image));
                    state.preview_dims = Some((width, height));
                    state.params.size_estimate = size;
                    if state.params.strategy == ResizeStrategy::Fit {
                        state.params.width = width.to_string();
                        state.params.height = height.to_string();
                    }
                    state.loading = false;
                });
                if published {
                    debug!(generation, width, height, size, "Preview ready");
                    self.emit(SessionEvent::PreviewReady {
                        generation,
                        width,
                        height,
                        size_estimate: size,
                    });
                }
            }
            Err(e) => {
                let published = self.finish(generation, |state| state.loading = false);
                if published {
                    warn!(generation, error = %e, "Preview generation failed");
                    self.emit(SessionEvent::PreviewFailed {
                        generation,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    /// Apply `publish` if `generation` is still the latest. Returns whether it ran.
    fn finish(&self, generation: u64, publish: impl FnOnce(&mut SessionState)) -> bool {
        let mut state = self.state();
        if !self.is_current(generation) {
            debug!(generation, "Discarding stale recompute");
            return false;
        }
        publish(&mut *state);
        true
    }

    /// Wait until no recompute is pending.
    pub async fn settle(&self) {
        loop {
            let pending = lock(&self.inner.recompute).take();
            match pending {
                Some(handle) => {
                    // Aborted tasks resolve with a cancellation error.
                    let _ = handle.await;
                }
                None => break,
            }
        }
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Export the current image to `sink`.
    ///
    /// Fails with [`ExportError::Busy`] while another export runs.
    pub async fn export<S>(&self, sink: S) -> Result<ExportReport, ExportError>
    where
        S: ExportSink + 'static,
    {
        if self
            .inner
            .exporting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ExportError::Busy);
        }

        let job = {
            let state = self.state();
            match &state.source {
                Some(source) => ExportJob {
                    source: Arc::clone(source),
                    params: state.params.clone(),
                    tags: state.tags.clone(),
                    file_name: export_file_name(
                        &self.inner.config.filename_prefix,
                        state.params.format,
                        chrono::Local::now().naive_local(),
                    ),
                },
                None => {
                    self.inner.exporting.store(false, Ordering::SeqCst);
                    return Err(ExportError::NoImage);
                }
            }
        };

        let session = self.clone();
        let task = self.inner.runtime.spawn(async move {
            let backend = Arc::clone(&session.inner.backend);
            let result = session
                .inner
                .runtime
                .spawn_blocking(move || {
                    let mut sink = sink;
                    export_image(&backend, &job, &mut sink)
                })
                .await
                .map_err(|e| ExportError::Task(e.to_string()))
                .and_then(|r| r);

            let report = match result {
                Ok(outcome) => {
                    session.adopt_export(outcome.image);
                    session.emit(SessionEvent::Exported {
                        file_name: outcome.report.file_name.clone(),
                        width: outcome.report.width,
                        height: outcome.report.height,
                        bytes_written: outcome.report.bytes_written,
                    });
                    Ok(outcome.report)
                }
                Err(e) => {
                    warn!(error = %e, "Export failed");
                    Err(e)
                }
            };
            session.inner.exporting.store(false, Ordering::SeqCst);
            report
        });

        task.await.map_err(|e| ExportError::Task(e.to_string()))?
    }

    /// Continue editing from the written image.
    fn adopt_export(&self, image: DynamicImage) {
        let mut state = self.state();
        state.source = Some(Arc::new(image));
        state.params.rotation = 0;
        state.params.flipped = false;
        self.schedule_recompute(&mut state);
    }
}

impl Effects {
    fn all() -> Self {
        Self {
            clear_preset: true,
            clear_telegram: true,
            recompute: true,
        }
    }

    fn transform_only() -> Self {
        Self {
            clear_preset: false,
            clear_telegram: false,
            recompute: true,
        }
    }
}
