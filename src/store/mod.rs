//! Context persistence abstraction.
//!
//! The [`ContextStore`] trait defines the cache and build-record
//! operations the engine and scheduler need, enabling pluggable
//! backends. The in-memory implementation ships with the crate; a
//! durable backend lives with the embedding application.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{BuildSnapshot, CachedContext, ContextKey};

/// Abstract cache/build-record backend.
///
/// Cached contexts are stored behind `Arc` and replaced whole: readers
/// holding a previous value keep a consistent view while a rebuild for
/// the same key is in flight.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Latest successfully built context for a key, if any.
    async fn get_cached_context(&self, key: &ContextKey) -> Result<Option<Arc<CachedContext>>>;

    /// Atomically replace the cached context for a key and mark the
    /// build record complete.
    async fn save_cached_context(&self, key: &ContextKey, context: CachedContext) -> Result<()>;

    /// Record that a build has started for a key.
    async fn mark_building(&self, key: &ContextKey) -> Result<()>;

    /// Record a terminal build failure for a key.
    async fn mark_failed(&self, key: &ContextKey, reason: &str) -> Result<()>;

    /// Current build record for a key; `Idle` if none exists.
    async fn get_build_status(&self, key: &ContextKey) -> Result<BuildSnapshot>;
}
