//! Run results and statistics.

use crate::agent::Provider;
use crate::error::PageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the session's pipeline: Idle → Processing → {Completed, Error}.
///
/// Completed and Error are terminal until the next run, which passes through
/// Processing again. There is no cancelled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Processing,
    Completed,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Idle => "idle",
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        })
    }
}

/// How one agent step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    /// The step degraded to an error message; its cost is zero.
    Failed,
    /// The agent's provider was replaced by the native one.
    FallbackTriggered,
}

/// One agent's output within a run. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub agent_id: String,
    pub agent_name: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
    pub cost: f64,
    pub status: ResultStatus,
    pub provider_used: Provider,
    pub model_used: String,
    /// Estimated tokens (prompt + response, 4 chars per token).
    pub tokens: u64,
}

/// Aggregate numbers for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub pages_extracted: usize,
    pub pages_failed: usize,
    pub agents_run: usize,
    pub agents_failed: usize,
    pub fallbacks: usize,
    /// Sum of this run's step costs.
    pub run_cost: f64,
    /// Session total after this run.
    pub total_cost: f64,
    pub context_chars: usize,
    pub extraction_duration_ms: u64,
    pub agent_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a completed run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// In pipeline order.
    pub results: Vec<ExecutionResult>,
    /// Pages that degraded to a placeholder.
    pub page_errors: Vec<PageError>,
    pub stats: RunStats,
}

impl RunSummary {
    /// Render the results as a Markdown report.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            out.push_str(&format!("## {}\n\n", result.agent_name));
            out.push_str(&format!(
                "*{} · {} · {} · {}*\n\n",
                result.provider_used,
                result.model_used,
                crate::cost::format_cost(result.cost),
                match result.status {
                    ResultStatus::Success => "success",
                    ResultStatus::Failed => "failed",
                    ResultStatus::FallbackTriggered => "fallback",
                }
            ));
            out.push_str(result.output.trim_end());
            out.push_str("\n\n");
        }
        out.push_str(&format!(
            "---\n\nRun cost: {}  ·  Total cost: {}\n",
            crate::cost::format_cost(self.stats.run_cost),
            crate::cost::format_cost(self.stats.total_cost)
        ));
        out
    }
}
