//! Pipeline stages for document loading and agent runs.
//!
//! Each submodule implements exactly one step. The orchestrator
//! ([`crate::orchestrator`]) strings them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode          (load a document, once)
//! (path)    (pdfium)   (JPEG/base64)
//!
//! extract ──▶ invoke                   (every run)
//! (page text) (agents over context)
//! ```
//!
//! 1. [`input`]   — validate that the user-supplied path is a readable PDF
//! 2. [`render`]  — rasterise the first pages; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`encode`]  — JPEG-encode and base64-wrap each page thumbnail
//! 4. [`extract`] — transcribe each selected page with the native model and
//!    build the aggregated context
//! 5. [`invoke`]  — run one agent over the context; the only stage that
//!    degrades failures instead of returning them

pub mod encode;
pub mod extract;
pub mod input;
pub mod invoke;
pub mod render;
