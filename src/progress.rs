//! Progress-callback trait for run events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe a
//! run as it happens: each page transcription, each agent result (with the
//! running cost), and the final state. Results are reported the moment they
//! are appended, so a UI can render them incrementally.
//!
//! The same trait carries the "credential required" signal: when a run is
//! refused for lack of a credential, or aborted because the service rejected
//! it, [`RunProgressCallback::on_credential_required`] fires so the host can
//! prompt for a new key.
//!
//! # Example
//!
//! ```rust
//! use agentflow::{ExecutionResult, PipelineConfig, RunProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     agents_done: AtomicUsize,
//! }
//!
//! impl RunProgressCallback for CountingCallback {
//!     fn on_agent_complete(&self, result: &ExecutionResult, total_cost: f64) {
//!         self.agents_done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} done, total ${:.5}", result.agent_name, total_cost);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { agents_done: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder()
//!     .progress_callback(cb as Arc<dyn RunProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{ExecutionResult, RunStatus};
use std::sync::Arc;

/// Called by the orchestrator as a run progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Calls arrive strictly in run order from a single
/// task, but the trait is `Send + Sync` so implementations can be shared with
/// other tasks (a UI thread, a channel forwarder).
pub trait RunProgressCallback: Send + Sync {
    /// Called once after the run guard passed.
    ///
    /// # Arguments
    /// * `pages`  — number of selected pages to transcribe
    /// * `agents` — number of agents in the pipeline snapshot
    fn on_run_start(&self, pages: usize, agents: usize) {
        let _ = (pages, agents);
    }

    /// Called just before a page is sent for transcription.
    fn on_page_start(&self, page_number: usize, total_pages: usize) {
        let _ = (page_number, total_pages);
    }

    /// Called when a page's text is available.
    ///
    /// * `text_len` — character count of the transcription
    fn on_page_complete(&self, page_number: usize, total_pages: usize, text_len: usize) {
        let _ = (page_number, total_pages, text_len);
    }

    /// Called when a page's transcription failed (whether or not the run
    /// continues afterwards).
    fn on_page_error(&self, page_number: usize, total_pages: usize, error: String) {
        let _ = (page_number, total_pages, error);
    }

    /// Called just before an agent is invoked.
    ///
    /// * `index` — 0-based position in the pipeline
    fn on_agent_start(&self, index: usize, total_agents: usize, agent_name: &str) {
        let _ = (index, total_agents, agent_name);
    }

    /// Called right after an agent's result was appended.
    ///
    /// * `total_cost` — cumulative cost including this step
    fn on_agent_complete(&self, result: &ExecutionResult, total_cost: f64) {
        let _ = (result, total_cost);
    }

    /// Called once when the run reaches Completed or Error.
    fn on_run_complete(&self, status: RunStatus, results: usize) {
        let _ = (status, results);
    }

    /// The host should ask the user for a (new) credential.
    fn on_credential_required(&self, reason: String) {
        let _ = reason;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        page_starts: AtomicUsize,
        page_errors: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl RunProgressCallback for TrackingCallback {
        fn on_page_start(&self, _page_number: usize, _total_pages: usize) {
            self.page_starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_number: usize, _total_pages: usize, _error: String) {
            self.page_errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_credential_required(&self, reason: String) {
            self.prompts.lock().unwrap().push(reason);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(2, 3);
        cb.on_page_start(1, 2);
        cb.on_page_complete(1, 2, 42);
        cb.on_page_error(2, 2, "some error".to_string());
        cb.on_agent_start(0, 3, "Summarizer");
        cb.on_run_complete(RunStatus::Completed, 3);
        cb.on_credential_required("missing".to_string());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_page_start(1, 2);
        tracker.on_page_start(2, 2);
        tracker.on_page_error(2, 2, "timeout".to_string());
        tracker.on_credential_required("API Key rejected".to_string());

        assert_eq!(tracker.page_starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.page_errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.prompts.lock().unwrap().len(), 1);
    }

    #[test]
    fn arc_dyn_callback_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn RunProgressCallback>();
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(1, 1);
    }
}
