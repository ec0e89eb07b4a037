//! In-memory [`ContextStore`] implementation.
//!
//! Uses `HashMap` behind `std::sync::RwLock` for thread safety.
//! Cached contexts are held as `Arc<CachedContext>` so a save replaces
//! the map entry atomically while concurrent readers keep the previous
//! value.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{BuildSnapshot, BuildStatus, CachedContext, ContextKey};

use super::ContextStore;

/// In-memory store for library consumers and tests.
pub struct InMemoryContextStore {
    contexts: RwLock<HashMap<ContextKey, Arc<CachedContext>>>,
    records: RwLock<HashMap<ContextKey, BuildSnapshot>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryContextStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn get_cached_context(&self, key: &ContextKey) -> Result<Option<Arc<CachedContext>>> {
        let contexts = self.contexts.read().unwrap();
        Ok(contexts.get(key).cloned())
    }

    async fn save_cached_context(&self, key: &ContextKey, context: CachedContext) -> Result<()> {
        let snapshot = BuildSnapshot {
            status: BuildStatus::Complete,
            build_timestamp: Some(context.built_at),
            checksum: Some(context.checksum.clone()),
            error_message: None,
            retry_count: 0,
        };
        {
            let mut contexts = self.contexts.write().unwrap();
            contexts.insert(key.clone(), Arc::new(context));
        }
        let mut records = self.records.write().unwrap();
        records.insert(key.clone(), snapshot);
        Ok(())
    }

    async fn mark_building(&self, key: &ContextKey) -> Result<()> {
        let mut records = self.records.write().unwrap();
        let entry = records.entry(key.clone()).or_insert_with(BuildSnapshot::idle);
        entry.status = BuildStatus::Building;
        entry.build_timestamp = Some(Utc::now());
        entry.error_message = None;
        Ok(())
    }

    async fn mark_failed(&self, key: &ContextKey, reason: &str) -> Result<()> {
        let mut records = self.records.write().unwrap();
        let entry = records.entry(key.clone()).or_insert_with(BuildSnapshot::idle);
        entry.status = BuildStatus::Failed;
        entry.build_timestamp = Some(Utc::now());
        entry.error_message = Some(reason.to_string());
        Ok(())
    }

    async fn get_build_status(&self, key: &ContextKey) -> Result<BuildSnapshot> {
        let records = self.records.read().unwrap();
        Ok(records.get(key).cloned().unwrap_or_else(BuildSnapshot::idle))
    }
}
