//! # Shrinker
//!
//! The core of an image resizer: load a photo, edit a small set of transform
//! parameters, watch a debounced preview with an encoded-size estimate, and
//! export a full-resolution file with its EXIF tags.
//!
//! # Architecture
//!
//! ```text
//!            edits                     debounce + generation check
//! caller ──────────▶ session ──────────────────────────────▶ backend.preview
//!                      │                                        (blocking pool)
//!                      │ export (one at a time)
//!                      ▼
//!                   exporter ──▶ backend.render ──▶ sink.open / write
//!                                                 └▶ sink.apply_metadata
//! ```
//!
//! Parameter logic (text fields, presets, rotation bookkeeping) is pure and
//! lives next to the types it manipulates. Pixel work goes through the
//! [`imaging::ImageBackend`] trait so the session and exporter can be tested
//! against a mock without encoding a single image.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Parameters, dimension math, the backend trait and its `image`-crate implementation, filters, palette extraction |
//! | [`session`] | Editing state, setters with preset bookkeeping, debounced preview recompute, export orchestration |
//! | [`export`] | Full-resolution render, write, re-decode and metadata step |
//! | [`sink`] | Export destinations: directory on disk or in-memory store |
//! | [`metadata`] | EXIF tag map, reading via `kamadak-exif`, writing via `little_exif`, JSON sidecars |
//! | [`config`] | `shrinker.toml` loading, validation and stock defaults |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Width and Height Are Text
//!
//! The editable size fields are strings, because they mirror input boxes:
//! empty means "derive from the source", and every edit is normalized by
//! [`imaging::restrict`]. Numbers are parsed only when a backend request is
//! built.
//!
//! ## Last Edit Wins
//!
//! Each parameter change bumps a generation counter and replaces the pending
//! recompute, under the same lock that writes the parameters. Only a task
//! whose generation is still current may publish, so a slow preview can
//! never overwrite a newer one.
//!
//! ## Statically Linked Imaging
//!
//! Decoding, resizing and JPEG/PNG encoding use the `image` crate. Lossy WebP
//! comes from libwebp, compiled from source by the `webp` crate, so the
//! binary still has no system dependencies.

pub mod config;
pub mod export;
pub mod imaging;
pub mod metadata;
pub mod output;
pub mod session;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_helpers;
