//! Context assembly orchestration.
//!
//! [`ContextAssemblyEngine`] ties the pieces together: it answers
//! `get_context` from the cache when the document-set checksum still
//! matches, observes an in-flight build instead of duplicating it, and
//! otherwise hands the key to the [`BuildScheduler`]. The background
//! build itself — rank, extract, chunk, aggregate — lives in
//! [`AssemblyPipeline`], the engine's [`ContextBuilder`] implementation.
//!
//! Build errors never escape `get_context`: they are captured into the
//! key's build record and reported through the returned snapshot.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::checksum;
use crate::chunk::chunk_document;
use crate::config::SharedConfig;
use crate::error::{BuildError, ConfigError};
use crate::models::{
    BuildSnapshot, BuildStatus, CachedContext, ContextChunk, ContextKey, Document, FailedDocument,
    OverflowReport,
};
use crate::overflow;
use crate::prioritize;
use crate::scheduler::{BuildScheduler, ContextBuilder};
use crate::source::DocumentSource;
use crate::store::ContextStore;

/// What a `get_context` caller receives: either the assembled context
/// or the state of the build producing it.
#[derive(Debug, Clone)]
pub enum ContextResponse {
    Ready(Arc<CachedContext>),
    Pending(BuildSnapshot),
}

impl ContextResponse {
    pub fn is_ready(&self) -> bool {
        matches!(self, ContextResponse::Ready(_))
    }
}

/// The background build pipeline: list → rank → extract → chunk →
/// aggregate. Owned by the scheduler as its [`ContextBuilder`].
pub struct AssemblyPipeline {
    source: Arc<dyn DocumentSource>,
}

#[async_trait]
impl ContextBuilder for AssemblyPipeline {
    async fn build(&self, key: &ContextKey) -> Result<CachedContext, BuildError> {
        let mut documents = self
            .source
            .list_active_documents(&key.project, &key.document_type)
            .await
            .map_err(BuildError::Transient)?;

        if documents.is_empty() {
            return Err(BuildError::NoDocuments { key: key.clone() });
        }

        let checksum = checksum::fingerprint_documents(&documents);
        prioritize::rank(&mut documents);

        let mut chunks: Vec<ContextChunk> = Vec::new();
        let mut failed_documents: Vec<FailedDocument> = Vec::new();
        let mut document_count = 0usize;

        for doc in &documents {
            match self.source.extract_text(doc).await {
                Ok(text) => {
                    chunks.extend(chunk_document(doc, &text));
                    document_count += 1;
                }
                Err(err) => {
                    // Per-document failure: recorded and excluded, the
                    // build goes on with the rest.
                    let failure = BuildError::Extraction {
                        document_id: doc.id.clone(),
                        reason: err.to_string(),
                    };
                    warn!(%key, error = %failure, "extraction failed");
                    failed_documents.push(FailedDocument {
                        document_id: doc.id.clone(),
                        reason: failure.to_string(),
                    });
                }
            }
        }

        if document_count == 0 {
            return Err(BuildError::Transient(anyhow::anyhow!(
                "all {} documents failed extraction",
                documents.len()
            )));
        }

        let token_count = chunks
            .iter()
            .map(|c| overflow::estimate_tokens(c.character_count))
            .sum();
        let word_count = chunks.iter().map(|c| c.word_count as u64).sum();
        let character_count = chunks.iter().map(|c| c.character_count as u64).sum();

        Ok(CachedContext {
            token_count,
            word_count,
            character_count,
            document_count,
            chunk_count: chunks.len(),
            checksum,
            built_at: Utc::now(),
            failed_documents,
            chunks,
        })
    }
}

/// Orchestrator for context assembly and overflow management.
pub struct ContextAssemblyEngine {
    source: Arc<dyn DocumentSource>,
    store: Arc<dyn ContextStore>,
    config: SharedConfig,
    scheduler: BuildScheduler,
}

impl ContextAssemblyEngine {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        store: Arc<dyn ContextStore>,
        config: SharedConfig,
    ) -> Self {
        let pipeline = Arc::new(AssemblyPipeline {
            source: source.clone(),
        });
        let scheduler = BuildScheduler::new(
            config.snapshot().scheduler,
            pipeline,
            store.clone(),
        );
        Self {
            source,
            store,
            config,
            scheduler,
        }
    }

    /// Fetch the context for a (project, documentType) pair.
    ///
    /// Returns `Ready` on a checksum-valid cache hit, otherwise
    /// `Pending` with the build record, after triggering a debounced
    /// build if none was in flight. A read that lands inside an open
    /// debounce window only observes it: the timer is reset by document
    /// changes (a new checksum through `request_build`), not by
    /// repeated reads, so polling callers cannot postpone their own
    /// build forever. Build failures surface through the snapshot's
    /// status and error message, never as an `Err`.
    pub async fn get_context(&self, project: &str, document_type: &str) -> Result<ContextResponse> {
        let key = ContextKey::new(project, document_type);

        let documents = self
            .source
            .list_active_documents(project, document_type)
            .await?;

        if documents.is_empty() {
            // Retrying cannot conjure documents: fail the key now.
            self.scheduler
                .fail_now(&key, &BuildError::NoDocuments { key: key.clone() })
                .await;
            return Ok(ContextResponse::Pending(self.scheduler.status(&key)));
        }

        let checksum = checksum::fingerprint_documents(&documents);

        if let Some(cached) = self.store.get_cached_context(&key).await? {
            if cached.checksum == checksum {
                debug!(%key, "cache hit");
                return Ok(ContextResponse::Ready(cached));
            }
            debug!(%key, "cache stale, set changed");
        }

        let snapshot = self.scheduler.status(&key);
        if matches!(snapshot.status, BuildStatus::Building | BuildStatus::Scheduled) {
            return Ok(ContextResponse::Pending(snapshot));
        }

        self.scheduler.request_build(&key, &checksum);
        Ok(ContextResponse::Pending(self.scheduler.status(&key)))
    }

    /// Check assembled chunks against a model category's budget, using
    /// a fresh configuration snapshot so hot reloads take effect per
    /// call.
    pub fn check_overflow(
        &self,
        documents: &[Document],
        chunks: &[ContextChunk],
        model_category: &str,
    ) -> std::result::Result<OverflowReport, ConfigError> {
        let config = self.config.snapshot();
        overflow::check_overflow(documents, chunks, model_category, &config)
    }

    /// Pure id-based chunk filter for manual user overrides.
    pub fn apply_document_selection(
        &self,
        selected_document_ids: &[String],
        chunks: Vec<ContextChunk>,
    ) -> Vec<ContextChunk> {
        overflow::apply_document_selection(selected_document_ids, chunks)
    }

    /// Current build record for a key.
    pub fn build_status(&self, project: &str, document_type: &str) -> BuildSnapshot {
        self.scheduler.status(&ContextKey::new(project, document_type))
    }

    /// Clear a pending scheduled build for a key.
    pub fn cancel_build(&self, project: &str, document_type: &str) {
        self.scheduler.cancel_build(&ContextKey::new(project, document_type));
    }

    /// Cancel all outstanding timers. In-flight builds run to completion.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
