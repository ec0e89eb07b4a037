//! Core data models used throughout Context Forge.
//!
//! These types represent the documents, chunks, cached contexts, and
//! overflow reports that flow through the assembly pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category assigned to a document by the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentCategory {
    Solicitations,
    Requirements,
    References,
    PastPerformance,
    Proposals,
    Compliance,
    Media,
    Unknown,
}

/// Lifecycle status of a document in the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Active,
    Archived,
}

/// Read-only document reference owned by the external document store.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub category: DocumentCategory,
    pub project: String,
    /// Size in bytes as reported by the store.
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub status: DocumentStatus,
}

impl Document {
    /// Timestamp used for staleness detection: last update, falling
    /// back to creation time.
    pub fn stamp(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

/// Section classification assigned to a chunk by the keyword rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    ExecutiveSummary,
    Technical,
    Management,
    Requirements,
    Experience,
    General,
}

/// Provenance metadata carried on every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub category: DocumentCategory,
    pub project: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A paragraph-granularity excerpt of a document's extracted text.
///
/// Chunks are ephemeral: regenerated on every build and never persisted
/// independently of their [`CachedContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub id: String,
    pub document_id: String,
    pub document_name: String,
    pub content: String,
    pub chunk_index: i64,
    pub word_count: usize,
    pub character_count: usize,
    pub section_type: SectionType,
    pub metadata: ChunkMetadata,
}

/// Identifies one assembled context: a project paired with the document
/// type the context grounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextKey {
    pub project: String,
    pub document_type: String,
}

impl ContextKey {
    pub fn new(project: impl Into<String>, document_type: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            document_type: document_type.into(),
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project, self.document_type)
    }
}

/// Build lifecycle state for one [`ContextKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Idle,
    Scheduled,
    Building,
    Complete,
    Failed,
}

/// Point-in-time view of a key's build record, as observers see it.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSnapshot {
    pub status: BuildStatus,
    pub build_timestamp: Option<DateTime<Utc>>,
    pub checksum: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

impl BuildSnapshot {
    pub fn idle() -> Self {
        Self {
            status: BuildStatus::Idle,
            build_timestamp: None,
            checksum: None,
            error_message: None,
            retry_count: 0,
        }
    }
}

/// A document whose text extraction failed during a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedDocument {
    pub document_id: String,
    pub reason: String,
}

/// The assembled context for one key.
///
/// Replaced atomically on every successful build; readers holding the
/// previous value keep a consistent (stale-but-valid) view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedContext {
    pub token_count: u64,
    pub word_count: u64,
    pub character_count: u64,
    pub document_count: usize,
    pub chunk_count: usize,
    pub checksum: String,
    pub built_at: DateTime<Utc>,
    pub failed_documents: Vec<FailedDocument>,
    pub chunks: Vec<ContextChunk>,
}

/// Per-document aggregation used in overflow analysis.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentBreakdown {
    pub document_id: String,
    pub document_name: String,
    pub token_count: u64,
    pub chunk_count: usize,
    pub priority_score: i64,
    pub relevance_score: u8,
    /// True when this document alone exceeds the context budget.
    pub oversized: bool,
}

/// A document excluded by the greedy selection, with the reason shown
/// to the user.
#[derive(Debug, Clone, Serialize)]
pub struct RemovedDocument {
    pub document_id: String,
    pub document_name: String,
    pub token_count: u64,
    pub reason: String,
}

/// The recommended subset when the full set does not fit.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionRecommendation {
    pub suggested_documents: Vec<DocumentBreakdown>,
    pub removed_documents: Vec<RemovedDocument>,
    pub tokens_saved: u64,
    pub summary: String,
}

/// Result of checking assembled chunks against a model's token budget.
#[derive(Debug, Clone, Serialize)]
pub struct OverflowReport {
    pub will_overflow: bool,
    pub current_tokens: u64,
    pub max_context_tokens: u64,
    pub overflow_amount: u64,
    pub document_breakdown: Vec<DocumentBreakdown>,
    pub recommendations: SelectionRecommendation,
}
