//! Pipeline configuration.
//!
//! Every knob that shapes a run lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Agents themselves are *not* configuration here;
//! they belong to the session's [`crate::store::ConfigurationStore`] because
//! users edit them between runs.

use crate::agent::NATIVE_MODEL;
use crate::error::AgentFlowError;
use crate::progress::RunProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Most pages ever rasterised from one document.
pub const MAX_PAGES: usize = 20;

/// Configuration for document loading and pipeline runs.
///
/// # Example
/// ```rust
/// use agentflow::{ExtractionPolicy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .max_pages(5)
///     .extraction_policy(ExtractionPolicy::Placeholder)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, 5);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Model used for page transcription and as the fallback target.
    /// Default: `gemini-2.5-flash`.
    pub native_model: String,

    /// Rasterised pages per document. Default and upper bound:
    /// [`MAX_PAGES`]; the setting can only lower the cap.
    ///
    /// Pages beyond the cap are never rendered and cannot be selected.
    pub max_pages: usize,

    /// Render scale relative to the page's natural size. Default: 1.5.
    pub render_scale: f32,

    /// Longest rendered edge in pixels, applied on top of `render_scale`.
    /// Default: 2000.
    pub max_rendered_pixels: u32,

    /// JPEG quality of page thumbnails (1–100). Default: 80.
    pub jpeg_quality: u8,

    /// Maximum tokens an agent may generate. Default: 2048.
    pub max_output_tokens: u32,

    /// What a non-credential page-extraction failure does to the run.
    /// Default: [`ExtractionPolicy::Abort`].
    pub extraction_policy: ExtractionPolicy,

    /// Number of configuration snapshots kept in history. Default: 10.
    pub history_capacity: usize,

    /// Receives run events as they happen.
    pub progress_callback: Option<Arc<dyn RunProgressCallback>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            native_model: NATIVE_MODEL.to_string(),
            max_pages: MAX_PAGES,
            render_scale: 1.5,
            max_rendered_pixels: 2000,
            jpeg_quality: 80,
            max_output_tokens: 2048,
            extraction_policy: ExtractionPolicy::default(),
            history_capacity: 10,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("native_model", &self.native_model)
            .field("max_pages", &self.max_pages)
            .field("render_scale", &self.render_scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("extraction_policy", &self.extraction_policy)
            .field("history_capacity", &self.history_capacity)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn RunProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn native_model(mut self, model: impl Into<String>) -> Self {
        self.config.native_model = model.into();
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn extraction_policy(mut self, policy: ExtractionPolicy) -> Self {
        self.config.extraction_policy = policy;
        self
    }

    pub fn history_capacity(mut self, n: usize) -> Self {
        self.config.history_capacity = n;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn RunProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, AgentFlowError> {
        let c = &self.config;
        if c.native_model.trim().is_empty() {
            return Err(AgentFlowError::InvalidConfig(
                "native model must not be empty".into(),
            ));
        }
        if !(1..=MAX_PAGES).contains(&c.max_pages) {
            return Err(AgentFlowError::InvalidConfig(format!(
                "max_pages must be 1–{MAX_PAGES}, got {}",
                c.max_pages
            )));
        }
        if !(0.1..=8.0).contains(&c.render_scale) {
            return Err(AgentFlowError::InvalidConfig(format!(
                "render scale must be 0.1–8.0, got {}",
                c.render_scale
            )));
        }
        if c.max_output_tokens == 0 {
            return Err(AgentFlowError::InvalidConfig(
                "max_output_tokens must be ≥ 1".into(),
            ));
        }
        if c.history_capacity == 0 {
            return Err(AgentFlowError::InvalidConfig(
                "history capacity must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// What happens when one page's transcription fails for a reason other than
/// the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPolicy {
    /// The whole run ends in the Error state. (default)
    #[default]
    Abort,
    /// The page contributes a placeholder and a [`crate::error::PageError`]
    /// is recorded; the run continues.
    Placeholder,
}

impl std::str::FromStr for ExtractionPolicy {
    type Err = AgentFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(ExtractionPolicy::Abort),
            "placeholder" | "continue" => Ok(ExtractionPolicy::Placeholder),
            other => Err(AgentFlowError::InvalidConfig(format!(
                "unknown extraction policy '{other}' (expected abort or placeholder)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_document_loading_contract() {
        let c = PipelineConfig::default();
        assert_eq!(c.max_pages, 20);
        assert_eq!(c.render_scale, 1.5);
        assert_eq!(c.jpeg_quality, 80);
        assert_eq!(c.max_output_tokens, 2048);
        assert_eq!(c.history_capacity, 10);
        assert_eq!(c.native_model, "gemini-2.5-flash");
        assert_eq!(c.extraction_policy, ExtractionPolicy::Abort);
    }

    #[test]
    fn builder_rejects_zero_pages() {
        assert!(PipelineConfig::builder().max_pages(0).build().is_err());
    }

    #[test]
    fn max_pages_can_only_lower_the_cap() {
        assert_eq!(PipelineConfig::builder().max_pages(2).build().unwrap().max_pages, 2);
        assert_eq!(
            PipelineConfig::builder().max_pages(MAX_PAGES).build().unwrap().max_pages,
            MAX_PAGES
        );
        assert!(matches!(
            PipelineConfig::builder().max_pages(MAX_PAGES + 1).build(),
            Err(AgentFlowError::InvalidConfig(_))
        ));
    }

    #[test]
    fn builder_rejects_bad_scale() {
        assert!(PipelineConfig::builder().render_scale(0.0).build().is_err());
    }

    #[test]
    fn builder_clamps_quality() {
        let c = PipelineConfig::builder().jpeg_quality(0).build().unwrap();
        assert_eq!(c.jpeg_quality, 1);
    }

    #[test]
    fn policy_parses() {
        assert_eq!("abort".parse::<ExtractionPolicy>().unwrap(), ExtractionPolicy::Abort);
        assert_eq!(
            "Placeholder".parse::<ExtractionPolicy>().unwrap(),
            ExtractionPolicy::Placeholder
        );
        assert!("skip".parse::<ExtractionPolicy>().is_err());
    }
}
