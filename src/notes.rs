//! The notes scratchpad.
//!
//! Notes collect quotes from agent results while the user reviews a run. They
//! can be rewritten into tidy Markdown by the native model and exported to a
//! dated file. Nothing here touches run state.

use crate::config::PipelineConfig;
use crate::credential::Credential;
use crate::error::AgentFlowError;
use crate::generation::{GenerationRequest, GenerationService};
use crate::output::ExecutionResult;
use crate::prompts::optimize_notes_prompt;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Characters of the quoted text kept by [`Notes::append_reference`].
pub const QUOTE_CHARS: usize = 150;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Notes {
    text: String,
}

impl Notes {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// True when there is nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn push_str(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Append a block quote of the first 150 characters of `text`, attributed
    /// to `source`.
    pub fn append_reference(&mut self, text: &str, source: &str) {
        let quoted: String = text.chars().take(QUOTE_CHARS).collect();
        self.text
            .push_str(&format!("\n> {quoted}...\n(Source: {source})\n"));
    }

    /// Quote an agent result, attributed to the agent.
    pub fn append_result(&mut self, result: &ExecutionResult) {
        self.append_reference(&result.output, &result.agent_name);
    }

    /// Rewrite the notes as structured Markdown with the native model.
    ///
    /// Blank notes are left alone and `Ok(false)` is returned. An empty reply
    /// keeps the notes unchanged. On failure the notes are untouched.
    pub async fn optimize(
        &mut self,
        service: &dyn GenerationService,
        credential: Option<&Credential>,
        config: &PipelineConfig,
    ) -> Result<bool, AgentFlowError> {
        if self.is_blank() {
            return Ok(false);
        }
        let credential = credential.ok_or(AgentFlowError::CredentialMissing)?;

        let request = GenerationRequest::new(config.native_model.as_str())
            .text(optimize_notes_prompt(&self.text));
        let generation = service.generate(&request, credential).await.map_err(|e| {
            AgentFlowError::NotesOptimizationFailed {
                detail: e.to_string(),
            }
        })?;

        if generation.text.trim().is_empty() {
            debug!("Notes optimization returned nothing; keeping notes");
            return Ok(false);
        }
        self.text = generation.text;
        info!("Notes optimized ({} chars)", self.text.chars().count());
        Ok(true)
    }

    /// Write the notes to `AgentFlow-Notes-<YYYY-MM-DD>.md` inside `dir`.
    ///
    /// Blank notes write nothing and return `Ok(None)`.
    pub fn export(&self, dir: impl AsRef<Path>) -> Result<Option<PathBuf>, AgentFlowError> {
        if self.is_blank() {
            return Ok(None);
        }
        let dir = dir.as_ref();
        let path = dir.join(export_file_name(Utc::now().date_naive()));

        std::fs::create_dir_all(dir).map_err(|e| AgentFlowError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;

        // Atomic write: write to temp, then rename
        let tmp = path.with_extension("md.tmp");
        std::fs::write(&tmp, &self.text).map_err(|e| AgentFlowError::OutputWriteFailed {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| AgentFlowError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;

        info!("Notes written to: {}", path.display());
        Ok(Some(path))
    }
}

/// File name for notes exported on `date`.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("AgentFlow-Notes-{}.md", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::generation::Generation;
    use async_trait::async_trait;

    struct Reply(Result<Generation, GenerationError>);

    #[async_trait]
    impl GenerationService for Reply {
        async fn generate(
            &self,
            request: &GenerationRequest,
            _credential: &Credential,
        ) -> Result<Generation, GenerationError> {
            assert!(request.prompt_text().contains("Raw Notes:"));
            self.0.clone()
        }
    }

    #[test]
    fn reference_quotes_first_150_chars() {
        let mut notes = Notes::default();
        let long = "x".repeat(400);
        notes.append_reference(&long, "Summarizer");
        let expected = format!("\n> {}...\n(Source: Summarizer)\n", "x".repeat(150));
        assert_eq!(notes.as_str(), expected);
    }

    #[test]
    fn reference_keeps_short_text_whole() {
        let mut notes = Notes::new("start");
        notes.append_reference("short", "Risk Analyst");
        assert_eq!(notes.as_str(), "start\n> short...\n(Source: Risk Analyst)\n");
    }

    #[test]
    fn reference_counts_chars_not_bytes() {
        let mut notes = Notes::default();
        notes.append_reference(&"é".repeat(200), "A");
        assert!(notes.as_str().contains(&format!("> {}...", "é".repeat(150))));
    }

    #[test]
    fn file_name_uses_iso_date() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(export_file_name(d), "AgentFlow-Notes-2025-03-07.md");
    }

    #[test]
    fn export_writes_dated_file() {
        let dir = tempfile::tempdir().unwrap();
        let notes = Notes::new("# Findings\n- one\n");
        let path = notes.export(dir.path()).unwrap().unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("AgentFlow-Notes-"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Findings\n- one\n");
        assert!(!path.with_extension("md.tmp").exists());
    }

    #[test]
    fn export_blank_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Notes::new("  \n").export(dir.path()).unwrap().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn optimize_replaces_text() {
        let mut notes = Notes::new("raw notes");
        let svc = Reply(Ok(Generation::text("# Clean")));
        let key = Credential::new("k").unwrap();
        let changed = notes
            .optimize(&svc, Some(&key), &PipelineConfig::default())
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(notes.as_str(), "# Clean");
    }

    #[tokio::test]
    async fn optimize_failure_keeps_notes() {
        let mut notes = Notes::new("raw notes");
        let svc = Reply(Err(GenerationError::Transport("offline".into())));
        let key = Credential::new("k").unwrap();
        let err = notes
            .optimize(&svc, Some(&key), &PipelineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentFlowError::NotesOptimizationFailed { .. }));
        assert_eq!(notes.as_str(), "raw notes");
    }

    #[tokio::test]
    async fn optimize_blank_or_keyless() {
        let svc = Reply(Ok(Generation::text("unused")));
        let mut blank = Notes::new(" ");
        assert!(!blank
            .optimize(&svc, None, &PipelineConfig::default())
            .await
            .unwrap());

        let mut notes = Notes::new("raw");
        let err = notes
            .optimize(&svc, None, &PipelineConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_credential_error());
    }

    #[tokio::test]
    async fn optimize_empty_reply_keeps_notes() {
        let mut notes = Notes::new("raw");
        let svc = Reply(Ok(Generation::text("")));
        let key = Credential::new("k").unwrap();
        assert!(!notes
            .optimize(&svc, Some(&key), &PipelineConfig::default())
            .await
            .unwrap());
        assert_eq!(notes.as_str(), "raw");
    }
}
