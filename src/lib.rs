//! # agentflow
//!
//! Run a pipeline of LLM agents over selected pages of a PDF.
//!
//! ## Why this crate?
//!
//! Reading a contract, a report or a paper usually means asking the same
//! questions every time: summarise it, flag the risks, pull out the numbers.
//! agentflow turns those questions into an ordered, editable list of
//! *agents*. The selected pages are transcribed once by a vision model, and
//! every agent then works from the same aggregated text plus one page image,
//! with a running cost estimate alongside.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Load     validate %PDF, rasterise first 20 pages (pdfium, spawn_blocking)
//!  ├─ 2. Encode   JPEG q80 → base64 thumbnails; user selects pages
//!  ├─ 3. Extract  one vision call per selected page → aggregated context
//!  ├─ 4. Agents   one call per agent, in order, appended as they finish
//!  └─ 5. Review   results + running cost; quote into notes, export
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agentflow::{Credential, GeminiClient, Pipeline, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(Arc::new(GeminiClient::new()), PipelineConfig::default());
//!     let mut session = pipeline.new_session();
//!     session.use_credential(Credential::new(std::env::var("GEMINI_API_KEY")?).ok_or("empty key")?);
//!
//!     pipeline.open_document(&mut session, "contract.pdf").await?;
//!     if let Some(doc) = session.document_mut() {
//!         doc.select_only(&[1, 2])?;
//!     }
//!
//!     let summary = pipeline.run(&mut session).await?;
//!     println!("{}", summary.to_markdown());
//!     eprintln!("total cost: {}", agentflow::cost::format_cost(session.total_cost()));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `agentflow` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! agentflow = { version = "0.1", default-features = false }
//! ```
//!
//! ## Providers
//!
//! Agents name a provider (`gemini`, `openai`, `anthropic`) and a model. Only
//! Gemini is executed natively; other providers run on the native model when
//! the agent allows fallback. Costs use these per-1M-token rates:
//!
//! | Model | $/1M in | $/1M out |
//! |-------|---------|----------|
//! | `gemini-2.5-flash` | $0.10 | $0.40 |
//! | `gemini-2.5-pro`   | $2.50 | $10.00 |
//! | `gpt-4o`           | $5.00 | $15.00 |
//! | `claude-3.5-sonnet`| $3.00 | $15.00 |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod agent;
pub mod config;
pub mod cost;
pub mod credential;
pub mod document;
pub mod error;
pub mod generation;
pub mod notes;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use agent::{default_agents, resolve_provider, AgentConfig, AgentUpdate, ExecutionPlan, Provider};
pub use config::{ExtractionPolicy, PipelineConfig, PipelineConfigBuilder};
pub use credential::{Credential, CredentialStore};
pub use document::{Document, PageImage, PdfPage};
pub use error::{AgentFlowError, GenerationError, PageError};
pub use generation::{
    GeminiClient, Generation, GenerationRequest, GenerationService, LlmProviderService, RequestPart,
};
pub use notes::Notes;
pub use orchestrator::{Pipeline, Session};
pub use output::{ExecutionResult, ResultStatus, RunStats, RunStatus, RunSummary};
pub use pipeline::render::load_document;
pub use progress::{NoopProgressCallback, ProgressCallback, RunProgressCallback};
pub use store::{ConfigurationStore, Direction, ProjectConfig};
