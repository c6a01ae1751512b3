//! PDF rasterisation: turn a PDF file into a [`Document`] of page thumbnails.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves both rendering and JPEG encoding onto
//! the blocking pool so the Tokio worker threads never stall.
//!
//! Only the first `max_pages` pages are ever rendered; the rest of the
//! document is invisible to the pipeline.

use crate::config::PipelineConfig;
use crate::document::{Document, PdfPage};
use crate::error::AgentFlowError;
use crate::pipeline::{encode, input};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Validate, rasterise and encode `path` into a [`Document`].
///
/// Pages are numbered from 1 and all start unselected.
pub async fn load_document(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<Document, AgentFlowError> {
    let path = input::resolve_input(path)?;
    let settings = RenderSettings {
        max_pages: config.max_pages,
        scale: config.render_scale,
        max_pixels: config.max_rendered_pixels,
        jpeg_quality: config.jpeg_quality,
    };

    let task_path = path.clone();
    let pages = tokio::task::spawn_blocking(move || render_pages_blocking(&task_path, settings))
        .await
        .map_err(|e| AgentFlowError::Internal(format!("Render task panicked: {}", e)))??;

    Ok(Document::new(Some(path), pages))
}

#[derive(Debug, Clone, Copy)]
struct RenderSettings {
    max_pages: usize,
    scale: f32,
    max_pixels: u32,
    jpeg_quality: u8,
}

/// Bind pdfium from `PDFIUM_LIB_PATH`, the working directory, or the system.
pub fn bind_pdfium() -> Result<Pdfium, AgentFlowError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(p) if !p.is_empty() => {
            debug!("Binding pdfium from PDFIUM_LIB_PATH={}", p);
            Pdfium::bind_to_library(PathBuf::from(p))
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| AgentFlowError::PdfiumBindingFailed(e.to_string()))?;

    Ok(Pdfium::new(bindings))
}

fn render_pages_blocking(
    pdf_path: &Path,
    settings: RenderSettings,
) -> Result<Vec<PdfPage>, AgentFlowError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            AgentFlowError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        } else {
            AgentFlowError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    let render_count = total_pages.min(settings.max_pages);
    info!("PDF loaded: {} pages, rendering {}", total_pages, render_count);
    if render_count < total_pages {
        warn!(
            "Only the first {} of {} pages are available",
            render_count, total_pages
        );
    }

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(settings.scale)
        .set_maximum_width(settings.max_pixels as i32)
        .set_maximum_height(settings.max_pixels as i32);

    let mut results = Vec::with_capacity(render_count);

    for idx in 0..render_count {
        let page_number = idx + 1;
        let page = pages
            .get(idx as u16)
            .map_err(|e| AgentFlowError::RasterisationFailed {
                page: page_number,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            AgentFlowError::RasterisationFailed {
                page: page_number,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_number,
            image.width(),
            image.height()
        );

        let thumbnail = encode::encode_page(&image, settings.jpeg_quality).map_err(|e| {
            AgentFlowError::EncodingFailed {
                page: page_number,
                detail: e.to_string(),
            }
        })?;

        results.push(PdfPage::new(page_number, thumbnail));
    }

    Ok(results)
}
