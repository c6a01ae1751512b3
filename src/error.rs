//! Error types for the agentflow library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`AgentFlowError`] — **Fatal**: the operation cannot proceed (bad input
//!   file, missing credential, a rejected credential mid-run, an extraction
//!   failure under the abort policy). Returned as `Err(AgentFlowError)` from
//!   the top-level entry points.
//!
//! * [`PageError`] — **Non-fatal**: a single page could not be transcribed but
//!   the run continued with a placeholder. Stored inside
//!   [`crate::output::RunSummary`] so callers can see which pages degraded.
//!
//! * [`GenerationError`] — a single call to the generation service failed.
//!   The orchestrator inspects [`GenerationError::is_credential`] to decide
//!   whether the failure aborts the run or degrades one step.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the agentflow library.
#[derive(Debug, Error)]
pub enum AgentFlowError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password; encrypted documents are not supported.
    #[error("PDF '{path}' is encrypted and cannot be opened.")]
    PasswordRequired { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The rendered page could not be encoded as JPEG.
    #[error("Image encoding failed for page {page}: {detail}")]
    EncodingFailed { page: usize, detail: String },

    /// A page number that does not exist in the loaded document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Run guard refusals ────────────────────────────────────────────────
    /// No credential is configured for the generation service.
    #[error("API Key is required. Configure it with --api-key or GEMINI_API_KEY.")]
    CredentialMissing,

    /// A run was requested with no page selected.
    #[error("No pages selected; select at least one page before running")]
    NoPagesSelected,

    /// A run was requested with an empty agent pipeline.
    #[error("No agents configured; add at least one agent before running")]
    NoAgentsConfigured,

    // ── Run failures ──────────────────────────────────────────────────────
    /// The generation service rejected the credential during a run.
    #[error("API Key rejected by the generation service: {detail}")]
    CredentialRejected { detail: String },

    /// Text extraction failed for a page and the run was aborted.
    #[error("Failed to extract text from page {page}: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    /// The agent targets a provider that cannot be executed and fallback is off.
    #[error("Agent '{agent}' targets provider '{provider}', which is not available, and fallback is disabled")]
    ProviderUnavailable { agent: String, provider: String },

    // ── Configuration store ───────────────────────────────────────────────
    /// No agent with this id exists in the pipeline.
    #[error("No agent with id '{id}' in the pipeline")]
    UnknownAgent { id: String },

    /// No history snapshot with this id exists.
    #[error("No saved configuration with id '{id}'")]
    UnknownSnapshot { id: String },

    // ── Notes ─────────────────────────────────────────────────────────────
    /// The notes rewrite call failed; run state is unaffected.
    #[error("Failed to optimize notes: {detail}")]
    NotesOptimizationFailed { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing the persisted credential failed.
    #[error("Credential store '{path}' is unusable: {detail}")]
    CredentialStoreFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentFlowError {
    /// True when the caller should prompt for a (new) credential.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            AgentFlowError::CredentialMissing | AgentFlowError::CredentialRejected { .. }
        )
    }
}

/// A non-fatal error for a single page.
///
/// Recorded in [`crate::output::RunSummary::page_errors`] when the
/// placeholder extraction policy lets the run continue past a bad page.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The transcription call failed for this page.
    #[error("Page {page}: text extraction failed: {detail}")]
    ExtractionFailed { page: usize, detail: String },
}

/// Failure of one call to the generation service.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// The service refused the credential (HTTP 401/403).
    #[error("API Key rejected (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The service returned a non-success status.
    #[error("Generation API error (HTTP {status}): {detail}")]
    Api { status: u16, detail: String },

    /// The request never produced an HTTP response.
    #[error("Network error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Any other provider failure, carried as its message.
    #[error("{0}")]
    Other(String),
}

impl GenerationError {
    /// Whether this failure is credential-related.
    ///
    /// Structural variants are classified directly; free-form messages fall
    /// back to [`is_credential_message`].
    pub fn is_credential(&self) -> bool {
        match self {
            GenerationError::Rejected { .. } => true,
            GenerationError::Api { status, detail } => {
                *status == 401 || *status == 403 || is_credential_message(detail)
            }
            GenerationError::Transport(msg)
            | GenerationError::Malformed(msg)
            | GenerationError::Other(msg) => is_credential_message(msg),
        }
    }
}

static RE_CREDENTIAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)api[ _-]?key|\b403\b|permission[_ ]denied|\bforbidden\b")
        .expect("credential pattern is valid")
});

/// Message-substring classification of credential failures.
///
/// Matches "API Key" in any case and spacing, and 403-like signals.
pub fn is_credential_message(message: &str) -> bool {
    RE_CREDENTIAL.is_match(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_message_detection() {
        assert!(is_credential_message("API Key is required"));
        assert!(is_credential_message("API key not valid. Please pass a valid API key."));
        assert!(is_credential_message("request failed with status 403"));
        assert!(is_credential_message("PERMISSION_DENIED"));
        assert!(!is_credential_message("model overloaded, try again later"));
        assert!(!is_credential_message("HTTP 4030 bytes"));
    }

    #[test]
    fn rejected_is_credential() {
        let e = GenerationError::Rejected {
            status: 403,
            detail: "forbidden".into(),
        };
        assert!(e.is_credential());
        assert!(e.to_string().contains("API Key"));
    }

    #[test]
    fn api_error_classification() {
        let overloaded = GenerationError::Api {
            status: 503,
            detail: "overloaded".into(),
        };
        assert!(!overloaded.is_credential());

        let bad_key = GenerationError::Api {
            status: 400,
            detail: "API key not valid".into(),
        };
        assert!(bad_key.is_credential());
    }

    #[test]
    fn fatal_error_classification() {
        assert!(AgentFlowError::CredentialMissing.is_credential_error());
        assert!(AgentFlowError::CredentialRejected {
            detail: "x".into()
        }
        .is_credential_error());
        assert!(!AgentFlowError::NoPagesSelected.is_credential_error());
        assert!(!AgentFlowError::PermissionDenied {
            path: PathBuf::from("/tmp/a.pdf")
        }
        .is_credential_error());
        assert!(!AgentFlowError::ExtractionFailed {
            page: 2,
            detail: "timeout".into()
        }
        .is_credential_error());
    }

    #[test]
    fn extraction_failed_display() {
        let e = AgentFlowError::ExtractionFailed {
            page: 3,
            detail: "timeout".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 3"), "got: {msg}");
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn page_error_display() {
        let e = PageError::ExtractionFailed {
            page: 5,
            detail: "overloaded".into(),
        };
        assert!(e.to_string().contains("Page 5"));
    }
}
