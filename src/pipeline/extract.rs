//! Page transcription: one page image in, its visible text out.
//!
//! This module only talks to the generation service and assembles the
//! aggregated context. What a failure means for the run (abort or
//! placeholder) is decided by the orchestrator.

use crate::config::PipelineConfig;
use crate::credential::Credential;
use crate::document::PdfPage;
use crate::error::GenerationError;
use crate::generation::{GenerationRequest, GenerationService};
use crate::prompts::{page_segment, TRANSCRIBE_PAGE_PROMPT};
use std::time::Instant;
use tracing::debug;

/// Transcribe one page with the native model.
///
/// Returns the service's text as-is (possibly empty). Every error is returned
/// to the caller unchanged.
pub async fn extract_page(
    service: &dyn GenerationService,
    page: &PdfPage,
    credential: &Credential,
    config: &PipelineConfig,
) -> Result<String, GenerationError> {
    let start = Instant::now();
    let request = GenerationRequest::new(config.native_model.as_str())
        .image(page.thumbnail.clone())
        .text(TRANSCRIBE_PAGE_PROMPT);

    let generation = service.generate(&request, credential).await?;
    debug!(
        "Page {}: transcribed {} chars in {:?}",
        page.page_number,
        generation.text.chars().count(),
        start.elapsed()
    );
    Ok(generation.text)
}

/// Concatenate page texts into the aggregated context, ascending by page.
pub fn aggregate_context<'a, I>(pages: I) -> String
where
    I: IntoIterator<Item = (usize, &'a str)>,
{
    let mut pages: Vec<(usize, &str)> = pages.into_iter().collect();
    pages.sort_by_key(|(n, _)| *n);
    pages
        .into_iter()
        .map(|(n, text)| page_segment(n, text))
        .collect()
}
