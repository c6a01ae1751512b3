//! Session state and the pipeline run.
//!
//! A [`Session`] owns everything a user works with: the credential, the agent
//! pipeline and its history, the loaded document, the latest results with the
//! running cost, and the notes. A [`Pipeline`] binds a generation service to a
//! [`PipelineConfig`] and runs a session through
//! Idle → Processing → {Completed, Error}.
//!
//! ## Run order
//!
//! A run is a flat task list executed by one sequential runner:
//!
//! ```text
//! Extract(p1) … Extract(pn) ─▶ Invoke(a1) … Invoke(am)
//! ```
//!
//! Exactly one external call is in flight at any time. Each agent result is
//! appended to the session, and the running total updated, before the next
//! agent starts.

use crate::agent::AgentConfig;
use crate::config::{ExtractionPolicy, PipelineConfig};
use crate::cost;
use crate::credential::{Credential, CredentialStore};
use crate::document::{Document, PdfPage};
use crate::error::{AgentFlowError, GenerationError, PageError};
use crate::generation::GenerationService;
use crate::notes::Notes;
use crate::output::{ExecutionResult, ResultStatus, RunStats, RunStatus, RunSummary};
use crate::pipeline::{extract, invoke, render};
use crate::progress::RunProgressCallback;
use crate::prompts::EXTRACTION_PLACEHOLDER;
use crate::store::ConfigurationStore;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything one user session holds.
#[derive(Debug, Default)]
pub struct Session {
    credential: Option<Credential>,
    credential_store: Option<CredentialStore>,
    store: ConfigurationStore,
    document: Option<Document>,
    status: RunStatus,
    results: Vec<ExecutionResult>,
    total_cost: f64,
    last_error: Option<String>,
    notes: Notes,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session backed by `store`; a previously saved credential is loaded
    /// now and every later [`Session::set_credential`] is persisted.
    pub fn with_credential_store(store: CredentialStore) -> Result<Self, AgentFlowError> {
        let credential = store.load()?;
        debug!(
            "Credential store {}: {}",
            store.path().display(),
            if credential.is_some() { "key loaded" } else { "no key" }
        );
        Ok(Self {
            credential,
            credential_store: Some(store),
            ..Self::default()
        })
    }

    pub fn with_configuration(mut self, store: ConfigurationStore) -> Self {
        self.store = store;
        self
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Replace the credential, persisting it when a store is attached.
    pub fn set_credential(&mut self, credential: Credential) -> Result<(), AgentFlowError> {
        if let Some(store) = &self.credential_store {
            store.save(&credential)?;
        }
        self.credential = Some(credential);
        Ok(())
    }

    /// Use `credential` for this session only.
    pub fn use_credential(&mut self, credential: Credential) {
        self.credential = Some(credential);
    }

    pub fn configuration(&self) -> &ConfigurationStore {
        &self.store
    }

    pub fn configuration_mut(&mut self) -> &mut ConfigurationStore {
        &mut self.store
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn document_mut(&mut self) -> Option<&mut Document> {
        self.document.as_mut()
    }

    /// Replace the loaded document. Results and cost are kept.
    pub fn set_document(&mut self, document: Document) {
        self.document = Some(document);
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Results of the latest run, in pipeline order. Grows while a run is
    /// in progress and keeps whatever was produced if the run failed.
    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    /// Cumulative cost across every run of this session.
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn notes(&self) -> &Notes {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut Notes {
        &mut self.notes
    }
}

/// One unit of work in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    /// Index into the run's selected pages.
    Extract(usize),
    /// Index into the run's agent snapshot.
    Invoke(usize),
}

fn plan_tasks(pages: usize, agents: usize) -> Vec<Task> {
    (0..pages)
        .map(Task::Extract)
        .chain((0..agents).map(Task::Invoke))
        .collect()
}

/// A generation service plus the configuration it runs with.
#[derive(Clone)]
pub struct Pipeline {
    service: Arc<dyn GenerationService>,
    config: PipelineConfig,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("service", &"<dyn GenerationService>")
            .field("config", &self.config)
            .finish()
    }
}

impl Pipeline {
    pub fn new(service: Arc<dyn GenerationService>, config: PipelineConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn service(&self) -> &dyn GenerationService {
        self.service.as_ref()
    }

    /// A fresh session whose history capacity follows this pipeline's config.
    pub fn new_session(&self) -> Session {
        Session::new().with_configuration(
            ConfigurationStore::default().with_history_capacity(self.config.history_capacity),
        )
    }

    /// Rasterise `path` and make it the session's document.
    pub async fn open_document(
        &self,
        session: &mut Session,
        path: impl AsRef<Path>,
    ) -> Result<usize, AgentFlowError> {
        let document = render::load_document(path, &self.config).await?;
        let pages = document.len();
        session.set_document(document);
        Ok(pages)
    }

    /// Rewrite the session's notes with the native model.
    pub async fn optimize_notes(&self, session: &mut Session) -> Result<bool, AgentFlowError> {
        let credential = session.credential.clone();
        let result = session
            .notes
            .optimize(self.service.as_ref(), credential.as_ref(), &self.config)
            .await;
        if let Err(e) = &result {
            if e.is_credential_error() {
                self.notify(|cb| cb.on_credential_required(e.to_string()));
            }
        }
        result
    }

    /// Run every selected page through extraction and every agent through
    /// the aggregated context.
    ///
    /// # Errors
    /// * Guard refusals, checked in this order and leaving the session
    ///   untouched: [`AgentFlowError::CredentialMissing`],
    ///   [`AgentFlowError::NoPagesSelected`], [`AgentFlowError::NoAgentsConfigured`].
    /// * Run failures, which leave the session in [`RunStatus::Error`] with
    ///   any results produced so far: [`AgentFlowError::CredentialRejected`],
    ///   [`AgentFlowError::ExtractionFailed`] (abort policy only).
    pub async fn run(&self, session: &mut Session) -> Result<RunSummary, AgentFlowError> {
        // ── Guard ────────────────────────────────────────────────────────────
        let credential = match session.credential.clone() {
            Some(c) => c,
            None => {
                let err = AgentFlowError::CredentialMissing;
                self.notify(|cb| cb.on_credential_required(err.to_string()));
                return Err(err);
            }
        };
        let pages: Vec<PdfPage> = session
            .document
            .as_ref()
            .map(|d| d.selected_pages().cloned().collect())
            .unwrap_or_default();
        if pages.is_empty() {
            return Err(AgentFlowError::NoPagesSelected);
        }
        if session.store.agents().is_empty() {
            return Err(AgentFlowError::NoAgentsConfigured);
        }

        // ── Start ────────────────────────────────────────────────────────────
        session.store.save_snapshot();
        let agents: Vec<AgentConfig> = session.store.agents().to_vec();
        session.results.clear();
        session.last_error = None;
        session.status = RunStatus::Processing;
        info!(
            "Starting run: {} pages, {} agents",
            pages.len(),
            agents.len()
        );
        self.notify(|cb| cb.on_run_start(pages.len(), agents.len()));

        match self.execute(session, &credential, &pages, &agents).await {
            Ok(summary) => {
                session.status = RunStatus::Completed;
                info!(
                    "Run complete: {} results, run cost {}, session total {}",
                    summary.results.len(),
                    cost::format_cost(summary.stats.run_cost),
                    cost::format_cost(session.total_cost)
                );
                self.notify(|cb| cb.on_run_complete(RunStatus::Completed, summary.results.len()));
                Ok(summary)
            }
            Err(e) => {
                session.status = RunStatus::Error;
                session.last_error = Some(e.to_string());
                warn!("Run failed: {}", e);
                if e.is_credential_error() {
                    self.notify(|cb| cb.on_credential_required(e.to_string()));
                }
                let produced = session.results.len();
                self.notify(|cb| cb.on_run_complete(RunStatus::Error, produced));
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        session: &mut Session,
        credential: &Credential,
        pages: &[PdfPage],
        agents: &[AgentConfig],
    ) -> Result<RunSummary, AgentFlowError> {
        let total_start = Instant::now();
        let service = self.service.as_ref();
        let total_pages = pages.len();
        let total_agents = agents.len();
        let image = pages.first().map(|p| p.thumbnail.clone());

        let mut texts: Vec<(usize, String)> = Vec::with_capacity(total_pages);
        let mut page_errors = Vec::new();
        let mut context: Option<String> = None;
        let mut stats = RunStats::default();
        let mut agent_start = Instant::now();

        for task in plan_tasks(total_pages, total_agents) {
            match task {
                Task::Extract(idx) => {
                    let page = &pages[idx];
                    let n = page.page_number;
                    self.notify(|cb| cb.on_page_start(n, total_pages));

                    match extract::extract_page(service, page, credential, &self.config).await {
                        Ok(text) => {
                            self.notify(|cb| {
                                cb.on_page_complete(n, total_pages, text.chars().count())
                            });
                            if let Some(doc) = session.document.as_mut() {
                                doc.cache_extracted_text(n, &text);
                            }
                            stats.pages_extracted += 1;
                            texts.push((n, text));
                        }
                        Err(e) => {
                            self.notify(|cb| cb.on_page_error(n, total_pages, e.to_string()));
                            let text = self.extraction_failure(n, e, &mut page_errors)?;
                            stats.pages_failed += 1;
                            texts.push((n, text));
                        }
                    }
                }
                Task::Invoke(idx) => {
                    if context.is_none() {
                        stats.extraction_duration_ms = total_start.elapsed().as_millis() as u64;
                        let ctx = extract::aggregate_context(
                            texts.iter().map(|(n, t)| (*n, t.as_str())),
                        );
                        stats.context_chars = ctx.chars().count();
                        debug!("Aggregated context: {} chars", stats.context_chars);
                        context = Some(ctx);
                        agent_start = Instant::now();
                    }
                    let ctx = context.as_deref().unwrap_or_default();
                    let agent = &agents[idx];
                    self.notify(|cb| cb.on_agent_start(idx, total_agents, &agent.name));

                    let invocation = invoke::invoke_agent(
                        service,
                        agent,
                        ctx,
                        image.as_ref(),
                        credential,
                        &self.config,
                    )
                    .await
                    .map_err(credential_rejected)?;

                    let step_cost = if invocation.is_degraded() {
                        0.0
                    } else {
                        cost::estimate(
                            &invocation.model_used,
                            (stats.context_chars / 4) as u64,
                            invocation.tokens,
                        )
                    };

                    match invocation.status {
                        ResultStatus::Failed => stats.agents_failed += 1,
                        ResultStatus::FallbackTriggered => stats.fallbacks += 1,
                        ResultStatus::Success => {}
                    }
                    stats.agents_run += 1;
                    stats.run_cost += step_cost;

                    let result = ExecutionResult {
                        agent_id: agent.id.clone(),
                        agent_name: agent.name.clone(),
                        output: invocation.output,
                        timestamp: Utc::now(),
                        cost: step_cost,
                        status: invocation.status,
                        provider_used: invocation.provider_used,
                        model_used: invocation.model_used,
                        tokens: invocation.tokens,
                    };
                    session.total_cost += step_cost;
                    session.results.push(result);
                    let total_cost = session.total_cost;
                    if let Some(appended) = session.results.last() {
                        self.notify(|cb| cb.on_agent_complete(appended, total_cost));
                    }
                }
            }
        }

        stats.agent_duration_ms = agent_start.elapsed().as_millis() as u64;
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        stats.total_cost = session.total_cost;

        Ok(RunSummary {
            results: session.results.clone(),
            page_errors,
            stats,
        })
    }

    /// Decide what a failed page contributes, or end the run.
    fn extraction_failure(
        &self,
        page: usize,
        error: GenerationError,
        page_errors: &mut Vec<PageError>,
    ) -> Result<String, AgentFlowError> {
        if error.is_credential() {
            return Err(credential_rejected(error));
        }
        match self.config.extraction_policy {
            ExtractionPolicy::Abort => Err(AgentFlowError::ExtractionFailed {
                page,
                detail: error.to_string(),
            }),
            ExtractionPolicy::Placeholder => {
                warn!("Page {}: extraction failed, using placeholder: {}", page, error);
                page_errors.push(PageError::ExtractionFailed {
                    page,
                    detail: error.to_string(),
                });
                Ok(EXTRACTION_PLACEHOLDER.to_string())
            }
        }
    }

    fn notify(&self, f: impl FnOnce(&dyn RunProgressCallback)) {
        if let Some(cb) = &self.config.progress_callback {
            f(cb.as_ref());
        }
    }
}

fn credential_rejected(error: GenerationError) -> AgentFlowError {
    AgentFlowError::CredentialRejected {
        detail: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_extract_before_invoke() {
        assert_eq!(
            plan_tasks(2, 2),
            vec![
                Task::Extract(0),
                Task::Extract(1),
                Task::Invoke(0),
                Task::Invoke(1)
            ]
        );
    }

    #[test]
    fn fresh_session_is_idle() {
        let s = Session::new();
        assert_eq!(s.status(), RunStatus::Idle);
        assert!(s.results().is_empty());
        assert_eq!(s.total_cost(), 0.0);
        assert!(s.credential().is_none());
        assert_eq!(s.configuration().agents().len(), 2);
    }

    #[test]
    fn credential_store_round_trip_through_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let mut s = Session::with_credential_store(CredentialStore::new(&path)).unwrap();
        assert!(s.credential().is_none());
        s.set_credential(Credential::new("abc123").unwrap()).unwrap();

        let reloaded = Session::with_credential_store(CredentialStore::new(&path)).unwrap();
        assert_eq!(reloaded.credential().unwrap().expose(), "abc123");
    }

    #[test]
    fn use_credential_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let mut s = Session::with_credential_store(CredentialStore::new(&path)).unwrap();
        s.use_credential(Credential::new("temp").unwrap());
        assert!(!path.exists());
    }
}
