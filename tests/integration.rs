//! End-to-end tests for the assembly engine with in-memory
//! collaborators. Timers run under tokio's paused clock, so debounce
//! and backoff windows elapse without real waits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use context_forge::models::{ChunkMetadata, DocumentStatus, FailedDocument};
use context_forge::store::memory::InMemoryContextStore;
use context_forge::{
    BuildStatus, Config, ContextAssemblyEngine, ContextChunk, ContextResponse, ContextStore,
    Document, DocumentCategory, DocumentSource, SectionType, SharedConfig,
};

#[derive(Default)]
struct SourceState {
    documents: Vec<Document>,
    texts: HashMap<String, String>,
    extract_calls: u32,
}

/// Scriptable document source: tests mutate the document set and texts
/// between calls to simulate uploads and extraction failures.
struct ScriptedSource {
    state: Mutex<SourceState>,
}

impl ScriptedSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SourceState::default()),
        })
    }

    fn add_document(&self, doc: Document, text: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        if let Some(text) = text {
            state.texts.insert(doc.id.clone(), text.to_string());
        }
        state.documents.push(doc);
    }

    fn set_text(&self, id: &str, text: &str) {
        let mut state = self.state.lock().unwrap();
        state.texts.insert(id.to_string(), text.to_string());
    }

    fn extract_calls(&self) -> u32 {
        self.state.lock().unwrap().extract_calls
    }
}

#[async_trait]
impl DocumentSource for ScriptedSource {
    async fn list_active_documents(
        &self,
        project: &str,
        _document_type: &str,
    ) -> Result<Vec<Document>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .documents
            .iter()
            .filter(|d| d.project == project)
            .cloned()
            .collect())
    }

    async fn extract_text(&self, document: &Document) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.extract_calls += 1;
        state
            .texts
            .get(&document.id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("extraction failed for {}", document.name))
    }
}

fn doc(id: &str, name: &str, category: DocumentCategory) -> Document {
    Document {
        id: id.to_string(),
        name: name.to_string(),
        category,
        project: "acme".to_string(),
        size: 2048,
        created_at: Utc::now(),
        updated_at: None,
        description: None,
        status: DocumentStatus::Active,
    }
}

fn make_engine(source: Arc<ScriptedSource>) -> (ContextAssemblyEngine, Arc<InMemoryContextStore>) {
    let store = Arc::new(InMemoryContextStore::new());
    let config = SharedConfig::new(Config::default());
    (
        ContextAssemblyEngine::new(source, store.clone(), config),
        store,
    )
}

/// Advance the paused clock far past any debounce/backoff window.
async fn settle() {
    tokio::time::sleep(Duration::from_secs(120)).await;
}

#[tokio::test(start_paused = true)]
async fn test_cold_start_builds_then_serves_from_cache() {
    let source = ScriptedSource::new();
    source.add_document(
        doc("sol", "rfp.pdf", DocumentCategory::Solicitations),
        Some("Solicitation overview.\n\nThe contractor shall deliver."),
    );
    let (engine, _store) = make_engine(source.clone());

    let first = engine.get_context("acme", "proposal").await.unwrap();
    match first {
        ContextResponse::Pending(snapshot) => {
            assert_eq!(snapshot.status, BuildStatus::Scheduled);
        }
        ContextResponse::Ready(_) => panic!("no build has run yet"),
    }

    settle().await;

    let second = engine.get_context("acme", "proposal").await.unwrap();
    let context = match second {
        ContextResponse::Ready(c) => c,
        ContextResponse::Pending(s) => panic!("expected cache hit, got {:?}", s.status),
    };
    assert_eq!(context.document_count, 1);
    assert_eq!(context.chunk_count, 2);
    assert_eq!(context.chunks[0].section_type, SectionType::ExecutiveSummary);
    assert_eq!(context.chunks[1].section_type, SectionType::Requirements);
}

#[tokio::test(start_paused = true)]
async fn test_reads_during_debounce_do_not_postpone_the_build() {
    let source = ScriptedSource::new();
    source.add_document(
        doc("d1", "rfp.pdf", DocumentCategory::Solicitations),
        Some("Solicitation body."),
    );
    let (engine, _store) = make_engine(source.clone());

    assert!(!engine.get_context("acme", "proposal").await.unwrap().is_ready());

    // A read inside the 10s window observes the scheduled build. If it
    // reset the timer, the build would not fire until 16s in.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!engine.get_context("acme", "proposal").await.unwrap().is_ready());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(engine.get_context("acme", "proposal").await.unwrap().is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_repeated_reads_are_idempotent() {
    let source = ScriptedSource::new();
    source.add_document(
        doc("d1", "requirements.docx", DocumentCategory::Requirements),
        Some("First.\n\nSecond."),
    );
    let (engine, _store) = make_engine(source.clone());

    engine.get_context("acme", "proposal").await.unwrap();
    settle().await;

    let a = engine.get_context("acme", "proposal").await.unwrap();
    let b = engine.get_context("acme", "proposal").await.unwrap();
    match (a, b) {
        (ContextResponse::Ready(x), ContextResponse::Ready(y)) => {
            assert_eq!(x.checksum, y.checksum);
            assert_eq!(x.chunks, y.chunks);
        }
        _ => panic!("both reads should hit the cache"),
    }
    // Unchanged checksum: the single original build did all extraction.
    assert_eq!(source.extract_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_single_flight() {
    let source = ScriptedSource::new();
    source.add_document(
        doc("d1", "rfp.pdf", DocumentCategory::Solicitations),
        Some("Body text."),
    );
    let (engine, _store) = make_engine(source.clone());
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.get_context("acme", "proposal").await.unwrap()
        }));
    }
    for handle in handles {
        let response = handle.await.unwrap();
        assert!(!response.is_ready(), "nothing cached during the burst");
    }

    settle().await;
    assert_eq!(
        source.extract_calls(),
        1,
        "ten concurrent requests must trigger exactly one build"
    );
}

#[tokio::test(start_paused = true)]
async fn test_document_change_invalidates_cache() {
    let source = ScriptedSource::new();
    source.add_document(
        doc("d1", "rfp.pdf", DocumentCategory::Solicitations),
        Some("Original body."),
    );
    let (engine, store) = make_engine(source.clone());

    engine.get_context("acme", "proposal").await.unwrap();
    settle().await;
    let old = match engine.get_context("acme", "proposal").await.unwrap() {
        ContextResponse::Ready(c) => c,
        _ => panic!("expected cache hit"),
    };

    // An upload arrives: the set checksum changes.
    source.add_document(
        doc("d2", "requirements.docx", DocumentCategory::Requirements),
        Some("The contractor shall comply."),
    );

    let stale = engine.get_context("acme", "proposal").await.unwrap();
    assert!(!stale.is_ready(), "changed set must not be served from cache");

    // Concurrent readers still observe the previous context until the
    // rebuild swaps in the new one.
    let key = context_forge::ContextKey::new("acme", "proposal");
    let held = store.get_cached_context(&key).await.unwrap().unwrap();
    assert_eq!(held.checksum, old.checksum);

    settle().await;
    let fresh = match engine.get_context("acme", "proposal").await.unwrap() {
        ContextResponse::Ready(c) => c,
        _ => panic!("rebuild should have completed"),
    };
    assert_ne!(fresh.checksum, old.checksum);
    assert_eq!(fresh.document_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_empty_document_set_fails_immediately_without_retry() {
    let source = ScriptedSource::new();
    let (engine, store) = make_engine(source.clone());

    let response = engine.get_context("acme", "proposal").await.unwrap();
    let snapshot = match response {
        ContextResponse::Pending(s) => s,
        _ => panic!("no context can exist"),
    };
    assert_eq!(snapshot.status, BuildStatus::Failed);
    assert!(snapshot
        .error_message
        .as_deref()
        .unwrap()
        .contains("no active documents"));

    // The store-side record is written before get_context returns, so a
    // status check right after the read already sees the failure.
    let key = context_forge::ContextKey::new("acme", "proposal");
    let stored = store.get_build_status(&key).await.unwrap();
    assert_eq!(stored.status, BuildStatus::Failed);

    settle().await;
    assert_eq!(source.extract_calls(), 0, "no retry may be scheduled");
    assert_eq!(
        engine.build_status("acme", "proposal").status,
        BuildStatus::Failed
    );
}

#[tokio::test(start_paused = true)]
async fn test_extraction_failures_are_partial_not_fatal() {
    let source = ScriptedSource::new();
    source.add_document(
        doc("ok", "rfp.pdf", DocumentCategory::Solicitations),
        Some("Readable body."),
    );
    source.add_document(doc("bad", "corrupt.pdf", DocumentCategory::Media), None);
    let (engine, _store) = make_engine(source.clone());

    engine.get_context("acme", "proposal").await.unwrap();
    settle().await;

    let context = match engine.get_context("acme", "proposal").await.unwrap() {
        ContextResponse::Ready(c) => c,
        _ => panic!("partial build should complete"),
    };
    assert_eq!(context.document_count, 1);
    assert_eq!(
        context.failed_documents,
        vec![FailedDocument {
            document_id: "bad".to_string(),
            reason: "extraction failed for document bad: extraction failed for corrupt.pdf"
                .to_string(),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_all_extractions_failing_exhausts_retries() {
    let source = ScriptedSource::new();
    source.add_document(doc("bad", "corrupt.pdf", DocumentCategory::Requirements), None);
    let (engine, _store) = make_engine(source.clone());

    engine.get_context("acme", "proposal").await.unwrap();
    settle().await;

    let snapshot = engine.build_status("acme", "proposal");
    assert_eq!(snapshot.status, BuildStatus::Failed);
    assert_eq!(snapshot.retry_count, 3);
    assert_eq!(source.extract_calls(), 3, "one extraction per attempt");

    // Fixing the document and asking again re-arms the failed key.
    source.set_text("bad", "Recovered content.");
    let response = engine.get_context("acme", "proposal").await.unwrap();
    assert!(!response.is_ready());
    settle().await;
    assert!(engine
        .get_context("acme", "proposal")
        .await
        .unwrap()
        .is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_keys_build_independently() {
    let source = ScriptedSource::new();
    source.add_document(
        doc("d1", "rfp.pdf", DocumentCategory::Solicitations),
        Some("Acme body."),
    );
    let mut other = doc("g1", "sow.docx", DocumentCategory::Requirements);
    other.project = "globex".to_string();
    source.add_document(other, Some("Globex body."));
    let (engine, _store) = make_engine(source.clone());

    engine.get_context("acme", "proposal").await.unwrap();
    engine.get_context("globex", "proposal").await.unwrap();
    engine.cancel_build("globex", "proposal");
    settle().await;

    assert!(engine
        .get_context("acme", "proposal")
        .await
        .unwrap()
        .is_ready());
    assert_eq!(
        engine.build_status("globex", "proposal").status,
        BuildStatus::Idle,
        "cancelling one key must not affect the other"
    );
}

fn synthetic_chunk(doc: &Document, index: i64, tokens: u64) -> ContextChunk {
    ContextChunk {
        id: format!("{}-{}", doc.id, index),
        document_id: doc.id.clone(),
        document_name: doc.name.clone(),
        content: String::new(),
        chunk_index: index,
        word_count: 0,
        character_count: (tokens * 4) as usize,
        section_type: SectionType::General,
        metadata: ChunkMetadata {
            category: doc.category,
            project: doc.project.clone(),
            uploaded_at: doc.created_at,
        },
    }
}

#[tokio::test(start_paused = true)]
async fn test_overflow_check_uses_fresh_config_snapshot() {
    let source = ScriptedSource::new();
    let store = Arc::new(InMemoryContextStore::new());
    let shared = SharedConfig::new(Config::default());
    let engine = ContextAssemblyEngine::new(source, store, shared.clone());

    let sol = doc("sol", "solicitation.pdf", DocumentCategory::Solicitations);
    let req = doc("req", "requirements.docx", DocumentCategory::Requirements);
    let med = doc("med", "transcript.txt", DocumentCategory::Media);
    let docs = vec![sol.clone(), req.clone(), med.clone()];
    let chunks = vec![
        synthetic_chunk(&sol, 0, 2000),
        synthetic_chunk(&req, 0, 3000),
        synthetic_chunk(&med, 0, 10000),
    ];

    let report = engine.check_overflow(&docs, &chunks, "small").unwrap();
    assert!(report.will_overflow);
    assert_eq!(report.max_context_tokens, 2800);
    let suggested: Vec<&str> = report
        .recommendations
        .suggested_documents
        .iter()
        .map(|d| d.document_id.as_str())
        .collect();
    assert_eq!(suggested, vec!["sol"]);

    // Hot reload: a bigger allocation is observed by the next check.
    let mut updated = Config::default();
    updated.context.percent = 100;
    shared.replace(updated);

    let report = engine.check_overflow(&docs, &chunks, "small").unwrap();
    assert_eq!(report.max_context_tokens, 4000);
    assert!(report.will_overflow);

    let err = engine.check_overflow(&docs, &chunks, "gigantic").unwrap_err();
    assert!(err.to_string().contains("gigantic"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_builds() {
    let source = ScriptedSource::new();
    source.add_document(
        doc("d1", "rfp.pdf", DocumentCategory::Solicitations),
        Some("Body."),
    );
    let (engine, _store) = make_engine(source.clone());

    engine.get_context("acme", "proposal").await.unwrap();
    engine.shutdown();
    settle().await;

    assert_eq!(source.extract_calls(), 0, "shutdown must abort pending timers");
}
