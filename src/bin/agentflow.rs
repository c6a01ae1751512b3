//! CLI binary for agentflow.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `PipelineConfig` and a `Session`, runs the agent pipeline once and prints
//! the results.

use agentflow::{
    default_agents, AgentConfig, ConfigurationStore, Credential, CredentialStore,
    ExecutionResult, ExtractionPolicy, GeminiClient, GenerationService, LlmProviderService,
    Pipeline, PipelineConfig, ProgressCallback, RunProgressCallback, ResultStatus,
    RunStats, RunStatus, RunSummary, Session,
};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar covering every page transcription and
/// every agent step, with a log line per finished step.
struct CliProgressCallback {
    bar: ProgressBar,
    step_started: Mutex<Option<Instant>>,
    page_errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            step_started: Mutex::new(None),
            page_errors: AtomicUsize::new(0),
        })
    }

    fn start_step(&self) {
        if let Ok(mut started) = self.step_started.lock() {
            *started = Some(Instant::now());
        }
    }

    fn step_secs(&self) -> f64 {
        self.step_started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, pages: usize, agents: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} steps  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length((pages + agents) as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Running");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Transcribing {pages} pages, then running {agents} agents…"))
        ));
    }

    fn on_page_start(&self, page_number: usize, _total_pages: usize) {
        self.start_step();
        self.bar.set_message(format!("page {page_number}"));
    }

    fn on_page_complete(&self, page_number: usize, _total_pages: usize, text_len: usize) {
        let secs = self.step_secs();
        self.bar.println(format!(
            "  {} Page {:>3}  {:<8}  {}",
            green("✓"),
            page_number,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_number: usize, _total_pages: usize, error: String) {
        let secs = self.step_secs();
        self.page_errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}  {}  {}",
            red("✗"),
            page_number,
            red(&truncate(&error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_agent_start(&self, index: usize, total_agents: usize, agent_name: &str) {
        self.start_step();
        self.bar
            .set_message(format!("agent {}/{}: {agent_name}", index + 1, total_agents));
    }

    fn on_agent_complete(&self, result: &ExecutionResult, total_cost: f64) {
        let secs = self.step_secs();
        let mark = match result.status {
            agentflow::ResultStatus::Success => green("✓"),
            agentflow::ResultStatus::FallbackTriggered => yellow("↪"),
            agentflow::ResultStatus::Failed => red("✗"),
        };
        self.bar.println(format!(
            "  {} {:<20} {}  {}  {}",
            mark,
            truncate(&result.agent_name, 20),
            dim(&result.model_used),
            dim(&format!("{} (total {})", agentflow::cost::format_cost(result.cost),
                agentflow::cost::format_cost(total_cost))),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, status: RunStatus, results: usize) {
        self.bar.finish_and_clear();
        match status {
            RunStatus::Completed => {
                let failed_pages = self.page_errors.load(Ordering::SeqCst);
                if failed_pages == 0 {
                    eprintln!("{} {} agent results", green("✔"), bold(&results.to_string()));
                } else {
                    eprintln!(
                        "{} {} agent results  ({} pages used a placeholder)",
                        cyan("⚠"),
                        bold(&results.to_string()),
                        red(&failed_pages.to_string())
                    );
                }
            }
            _ => eprintln!("{} run failed after {} agent results", red("✘"), results),
        }
    }

    fn on_credential_required(&self, reason: String) {
        self.bar.println(format!(
            "{} {}\n   {}",
            yellow("⚿"),
            reason,
            dim("Pass --api-key or set GEMINI_API_KEY; add --save-key to remember it.")
        ));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the default agents (Summarizer, Risk Analyst) over pages 1-3
  agentflow --pages 1-3 contract.pdf

  # Remember the API key for later runs
  agentflow --api-key AIza... --save-key contract.pdf

  # Custom agent pipeline, JSON output to a file
  agentflow --agents agents.json --json -o results.json report.pdf

  # Print the default agents as a template for --agents
  agentflow --print-agents

  # Keep going when a page cannot be transcribed
  agentflow --extraction-policy placeholder scan.pdf

  # Quote every result into notes, tidy them up and export
  agentflow --notes-dir ./notes --optimize-notes paper.pdf

  # Show which pages are available (no API key needed)
  agentflow --list-pages paper.pdf

AGENTS FILE:
  A JSON array of agents, run in order:
  [{"id":"1","name":"Summarizer","role":"Analyst","model":"gemini-2.5-flash",
    "provider":"gemini","prompt_template":"Summarize ...","temperature":0.3,
    "fallback_enabled":true}]
  Providers: gemini (native), openai, anthropic. Non-native agents run on the
  native model when fallback_enabled is true, and are skipped otherwise.

COST RATES (per 1M tokens, input / output):
  gemini-2.5-flash   $0.10 / $0.40   (also used for unknown models)
  gemini-2.5-pro     $2.50 / $10.00
  gpt-4o             $5.00 / $15.00
  claude-3.5-sonnet  $3.00 / $15.00

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY           Gemini API key
  AGENTFLOW_MODEL          Native model for transcription and fallback
  AGENTFLOW_LLM_PROVIDER   Serve calls through an edgequake-llm provider instead
  PDFIUM_LIB_PATH          Path to an existing libpdfium
"#;

/// Run a pipeline of LLM agents over selected PDF pages.
#[derive(Parser, Debug)]
#[command(
    name = "agentflow",
    version,
    about = "Run a pipeline of LLM agents over selected PDF pages",
    long_about = "Transcribe selected pages of a PDF with a vision model, then run an ordered \
list of agents (summariser, risk analyst, …) over the aggregated text, with a running cost \
estimate.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    #[arg(required_unless_present = "print_agents")]
    input: Option<PathBuf>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "AGENTFLOW_PAGES", default_value = "all")]
    pages: String,

    /// JSON file with the agent pipeline (defaults to the built-in agents).
    #[arg(long, env = "AGENTFLOW_AGENTS")]
    agents: Option<PathBuf>,

    /// Print the default agent pipeline as JSON and exit.
    #[arg(long)]
    print_agents: bool,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Persist --api-key to the credential store.
    #[arg(long, requires = "api_key")]
    save_key: bool,

    /// Credential store file (default: <config dir>/agentflow/credentials.json).
    #[arg(long, env = "AGENTFLOW_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// What a failed page transcription does: abort or placeholder.
    #[arg(long, env = "AGENTFLOW_EXTRACTION_POLICY", default_value = "abort")]
    extraction_policy: String,

    /// Native model used for transcription and fallback.
    #[arg(long, env = "AGENTFLOW_MODEL")]
    model: Option<String>,

    /// Serve calls through an edgequake-llm provider (openai, anthropic, gemini, ollama …).
    #[arg(long, env = "AGENTFLOW_LLM_PROVIDER")]
    llm_provider: Option<String>,

    /// Max output tokens per agent.
    #[arg(long, env = "AGENTFLOW_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: u32,

    /// Write results to this file instead of stdout.
    #[arg(short, long, env = "AGENTFLOW_OUTPUT")]
    output: Option<PathBuf>,

    /// Output the run summary as JSON instead of Markdown.
    #[arg(long, env = "AGENTFLOW_JSON")]
    json: bool,

    /// Quote every result into notes and export them to this directory.
    #[arg(long, env = "AGENTFLOW_NOTES_DIR")]
    notes_dir: Option<PathBuf>,

    /// Rewrite the notes with the model before exporting.
    #[arg(long, requires = "notes_dir")]
    optimize_notes: bool,

    /// List the available pages and exit (no API key needed).
    #[arg(long)]
    list_pages: bool,

    /// Disable progress bar.
    #[arg(long, env = "AGENTFLOW_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "AGENTFLOW_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "AGENTFLOW_QUIET")]
    quiet: bool,
}

/// Parsed `--pages` value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PageSpec {
    All,
    /// Inclusive, 1-indexed; clamped to the document when applied.
    Range(usize, usize),
    Pages(Vec<usize>),
}

impl PageSpec {
    /// Pages to select in a `total`-page document, or `None` for all of them.
    fn resolve(&self, total: usize) -> Option<Vec<usize>> {
        match self {
            PageSpec::All => None,
            PageSpec::Range(start, end) => Some((*start..=(*end).min(total)).collect()),
            PageSpec::Pages(pages) => Some(pages.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides all the feedback that matters; library logs
    // are limited to errors while it is visible.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list_pages;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.print_agents {
        println!(
            "{}",
            serde_json::to_string_pretty(&default_agents()).context("Failed to serialise agents")?
        );
        return Ok(());
    }
    let input = cli
        .input
        .clone()
        .context("A PDF path is required")?;

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn RunProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let service = build_service(&cli, &config)?;
    let pipeline = Pipeline::new(service, config);

    // ── Session ──────────────────────────────────────────────────────────
    let agents = load_agents(cli.agents.as_deref()).await?;
    let credential_store = match &cli.credentials {
        Some(path) => CredentialStore::new(path),
        None => CredentialStore::default_location().context("No credential store location")?,
    };
    let mut session = Session::with_credential_store(credential_store)
        .context("Failed to read the credential store")?
        .with_configuration(agents.with_history_capacity(pipeline.config().history_capacity));

    if let Some(key) = cli.api_key.as_deref().and_then(Credential::new) {
        if cli.save_key {
            session
                .set_credential(key)
                .context("Failed to save the API key")?;
            if !cli.quiet {
                eprintln!("{} API key saved", green("✔"));
            }
        } else {
            session.use_credential(key);
        }
    }

    // ── Load document ────────────────────────────────────────────────────
    let loaded = pipeline
        .open_document(&mut session, &input)
        .await
        .with_context(|| format!("Failed to load {}", input.display()))?;

    if cli.list_pages {
        if let Some(doc) = session.document() {
            println!("File:   {}", input.display());
            println!("Pages:  {}", loaded);
            for page in doc.pages() {
                println!(
                    "  {:>3}  {} KiB thumbnail",
                    page.page_number,
                    page.thumbnail.data.len() * 3 / 4 / 1024
                );
            }
        }
        return Ok(());
    }

    let spec = parse_pages(&cli.pages)?;
    if let Some(doc) = session.document_mut() {
        match spec.resolve(doc.len()) {
            None => doc.select_all(),
            Some(pages) if pages.is_empty() => anyhow::bail!(
                "--pages {} selects nothing in a {}-page document",
                cli.pages,
                doc.len()
            ),
            Some(pages) => doc
                .select_only(&pages)
                .context("Invalid --pages selection")?,
        }
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let (summary, failure) = match pipeline.run(&mut session).await {
        Ok(summary) => (summary, None),
        Err(e) if session.results().is_empty() => {
            return Err(anyhow::Error::new(e).context("Pipeline run failed"));
        }
        Err(e) => {
            // Results produced before the failure are still written out.
            let partial = partial_summary(session.results(), session.total_cost());
            (partial, Some(e))
        }
    };

    let rendered = if cli.json {
        serde_json::to_string_pretty(&summary).context("Failed to serialise output")?
    } else {
        summary.to_markdown()
    };

    match &cli.output {
        Some(path) => {
            write_atomic(path, &rendered).await?;
            if !cli.quiet {
                eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            if !rendered.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "   {} pages  /  {} agents  ({} fallback, {} failed)  —  {}  —  {}ms",
            summary.stats.pages_extracted + summary.stats.pages_failed,
            summary.stats.agents_run,
            summary.stats.fallbacks,
            summary.stats.agents_failed,
            agentflow::cost::format_cost(summary.stats.total_cost),
            summary.stats.total_duration_ms,
        );
    }

    if let Some(e) = failure {
        return Err(anyhow::Error::new(e).context(format!(
            "Pipeline run failed after {} agent result(s)",
            summary.results.len()
        )));
    }

    // ── Notes ────────────────────────────────────────────────────────────
    if let Some(dir) = &cli.notes_dir {
        let results = session.results().to_vec();
        for result in &results {
            session.notes_mut().append_result(result);
        }
        if cli.optimize_notes {
            pipeline
                .optimize_notes(&mut session)
                .await
                .context("Failed to optimize notes")?;
        }
        if let Some(path) = session.notes().export(dir).context("Failed to export notes")? {
            if !cli.quiet {
                eprintln!("{} notes  →  {}", green("✔"), bold(&path.display().to_string()));
            }
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let policy: ExtractionPolicy = cli
        .extraction_policy
        .parse()
        .context("Invalid --extraction-policy")?;

    let mut builder = PipelineConfig::builder()
        .extraction_policy(policy)
        .max_output_tokens(cli.max_tokens);
    if let Some(model) = &cli.model {
        builder = builder.native_model(model.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Native Gemini client, or an edgequake-llm provider when requested.
fn build_service(cli: &Cli, config: &PipelineConfig) -> Result<Arc<dyn GenerationService>> {
    match &cli.llm_provider {
        Some(name) => {
            let service = LlmProviderService::named(name, &config.native_model)
                .with_context(|| format!("Failed to create LLM provider '{name}'"))?;
            Ok(Arc::new(service))
        }
        None => Ok(Arc::new(GeminiClient::new())),
    }
}

async fn load_agents(path: Option<&Path>) -> Result<ConfigurationStore> {
    let Some(path) = path else {
        return Ok(ConfigurationStore::default());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read agents from {:?}", path))?;
    parse_agents(&raw).with_context(|| format!("Invalid agents file {:?}", path))
}

/// Agents from a JSON array; at least one, with unique ids.
fn parse_agents(raw: &str) -> Result<ConfigurationStore> {
    let agents: Vec<AgentConfig> = serde_json::from_str(raw).context("Invalid agents JSON")?;
    if agents.is_empty() {
        anyhow::bail!("No agents defined");
    }
    Ok(ConfigurationStore::new(agents)?)
}

/// Summary of the agents that finished before a run failed.
fn partial_summary(results: &[ExecutionResult], total_cost: f64) -> RunSummary {
    RunSummary {
        results: results.to_vec(),
        page_errors: Vec::new(),
        stats: RunStats {
            agents_run: results.len(),
            agents_failed: results
                .iter()
                .filter(|r| r.status == ResultStatus::Failed)
                .count(),
            fallbacks: results
                .iter()
                .filter(|r| r.status == ResultStatus::FallbackTriggered)
                .count(),
            run_cost: results.iter().map(|r| r.cost).sum(),
            total_cost,
            ..RunStats::default()
        },
    }
}

/// Atomic write: write to temp, then rename.
async fn write_atomic(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, body)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Parse `--pages` string into a `PageSpec`.
fn parse_pages(s: &str) -> Result<PageSpec> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSpec::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSpec::Range(start, end));
    }

    // Set: "1,3,5,7" or single page: "5"
    let mut pages: Vec<usize> = s
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<usize>()
                .with_context(|| format!("Invalid page number: '{}'", p.trim()))
        })
        .collect::<Result<Vec<_>>>()?;

    if let Some(&p) = pages.iter().find(|&&p| p < 1) {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
    }
    pages.sort_unstable();
    pages.dedup();

    Ok(PageSpec::Pages(pages))
}
