//! End-to-end tests against a real PDF and the live Gemini API.
//!
//! These tests use PDF files in `./test_cases/`, a pdfium library, and
//! `GEMINI_API_KEY`. They are gated behind the `E2E_ENABLED` environment
//! variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/path/to/libpdfium cargo test --test e2e -- --nocapture

use agentflow::{
    load_document, Credential, GeminiClient, NoopProgressCallback, Pipeline, PipelineConfig,
    ResultStatus, RunProgressCallback, RunStatus,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn api_key() -> Option<Credential> {
    std::env::var("GEMINI_API_KEY").ok().and_then(Credential::new)
}

// ── Document loading (pdfium only) ───────────────────────────────────────────

#[tokio::test]
async fn test_load_sample_caps_pages_and_encodes_jpeg() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));
    let config = PipelineConfig::builder().max_pages(2).build().unwrap();

    let doc = load_document(&path, &config).await.expect("load should succeed");
    assert!(doc.len() <= 2);
    assert!(doc.pages().iter().all(|p| !p.selected));
    for page in doc.pages() {
        assert_eq!(page.thumbnail.mime_type, "image/jpeg");
        assert!(!page.thumbnail.data.is_empty());
    }
}

// ── Full run ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_run_default_agents_on_first_page() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));
    let Some(key) = api_key() else {
        println!("SKIP: GEMINI_API_KEY not set");
        return;
    };

    let pipeline = Pipeline::new(Arc::new(GeminiClient::new()), PipelineConfig::default());
    let mut session = pipeline.new_session();
    session.use_credential(key);
    pipeline.open_document(&mut session, &path).await.unwrap();
    session.document_mut().unwrap().select_only(&[1]).unwrap();

    let summary = pipeline.run(&mut session).await.expect("run should succeed");

    assert_eq!(session.status(), RunStatus::Completed);
    assert_eq!(summary.results.len(), 2);
    assert!(summary
        .results
        .iter()
        .all(|r| r.status == ResultStatus::Success && !r.output.is_empty()));
    assert!(session.total_cost() > 0.0);
    println!("{}", summary.to_markdown());
}

#[tokio::test]
async fn test_bad_key_is_reported_as_credential_error() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));

    let pipeline = Pipeline::new(Arc::new(GeminiClient::new()), PipelineConfig::default());
    let mut session = pipeline.new_session();
    session.use_credential(Credential::new("not-a-real-key").unwrap());
    pipeline.open_document(&mut session, &path).await.unwrap();
    session.document_mut().unwrap().select_only(&[1]).unwrap();

    let err = pipeline.run(&mut session).await.unwrap_err();
    assert!(err.is_credential_error(), "got: {err}");
    assert_eq!(session.status(), RunStatus::Error);
}

/// Verify that a Noop callback compiles and does not panic.
#[test]
fn test_noop_callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();

    let cb: Arc<dyn RunProgressCallback> = Arc::new(NoopProgressCallback);
    cb.on_page_error(1, 1, "an error".to_string());
    cb.on_credential_required("API Key is required".to_string());
}

/// A callback stored in the config can be moved into a spawned task.
#[tokio::test]
async fn test_callback_send_in_tokio_spawn() {
    use std::sync::Mutex;

    struct ErrorLogger {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RunProgressCallback for ErrorLogger {
        fn on_page_error(&self, _page: usize, _total: usize, error: String) {
            self.log.lock().unwrap().push(error);
        }
    }

    let log = Arc::new(Mutex::new(vec![]));
    let cb: Arc<dyn RunProgressCallback> = Arc::new(ErrorLogger { log: Arc::clone(&log) });

    tokio::spawn(async move {
        cb.on_page_error(2, 5, "overloaded".to_string());
    })
    .await
    .expect("spawn must succeed");

    assert_eq!(log.lock().unwrap().clone(), vec!["overloaded"]);
}
