//! # Context Forge
//!
//! Token-bounded context assembly for AI generation calls.
//!
//! Context Forge assembles a curated set of document excerpts — the
//! "context" — for a given (project, documentType) key, keeps it fresh
//! through checksum-based cache invalidation, and recommends which
//! documents to keep when the full set overflows a model's token budget.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐   get_context    ┌──────────────────┐
//! │ DocumentSource  │◀────────────────▶│      Engine       │
//! │ (list, extract) │                  │ checksum + cache  │
//! └─────────────────┘                  └───┬──────────┬───┘
//!                                          │          │
//!                               request    ▼          ▼  read
//!                            ┌──────────────┐   ┌────────────┐
//!                            │  Scheduler    │──▶│ ContextStore│
//!                            │ debounce/retry│   │ Arc-swapped │
//!                            └──────┬───────┘   └────────────┘
//!                                   ▼ build
//!                          rank → extract → chunk
//! ```
//!
//! Builds are debounced (bursts of uploads coalesce into one build),
//! single-flight per key, and retried with backoff on transient
//! failure. Overflow analysis runs on demand against the assembled
//! chunks and a model size class, using the same document ranking the
//! context itself is ordered by.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and hot-reload snapshots |
//! | [`models`] | Core data types |
//! | [`checksum`] | Document-set fingerprinting |
//! | [`prioritize`] | Document ranking and relevance scoring |
//! | [`chunk`] | Paragraph chunking and section classification |
//! | [`scheduler`] | Debounced, single-flight build scheduling |
//! | [`overflow`] | Budget checks and greedy document selection |
//! | [`engine`] | Orchestration |
//! | [`store`] | Context cache abstraction |
//! | [`source`] | Document listing/extraction seam |

pub mod checksum;
pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod overflow;
pub mod prioritize;
pub mod scheduler;
pub mod source;
pub mod store;

pub use config::{Config, SharedConfig};
pub use engine::{ContextAssemblyEngine, ContextResponse};
pub use error::{BuildError, ConfigError};
pub use models::{
    BuildSnapshot, BuildStatus, CachedContext, ContextChunk, ContextKey, Document,
    DocumentCategory, DocumentStatus, OverflowReport, SectionType,
};
pub use source::DocumentSource;
pub use store::ContextStore;
