//! Per-key build scheduling: debounce, single-flight, retry/backoff.
//!
//! Each (project, documentType) key owns one state machine:
//!
//! ```text
//! IDLE ──request──▶ SCHEDULED ──debounce──▶ BUILDING ──▶ COMPLETE
//!                      ▲  │                    │
//!                      └──┘ re-request         └─retry×N─▶ FAILED
//!                        resets the timer
//! ```
//!
//! A re-request while SCHEDULED resets the debounce timer, coalescing
//! bursts (rapid uploads) into one build. SCHEDULED→BUILDING is
//! exclusive per key; concurrent requests observe the in-flight state
//! instead of starting a second build. Retryable failures back off a
//! fixed interval and retry up to `max_retries` attempts before the key
//! goes terminally FAILED; a later request is the external trigger that
//! re-arms it. `NoDocuments` fails immediately without retry.
//!
//! All state lives in one map owned by the scheduler instance; timers
//! are tracked per key so cancellation and rescheduling affect exactly
//! one key. `shutdown` aborts every outstanding timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::BuildError;
use crate::models::{BuildSnapshot, BuildStatus, CachedContext, ContextKey};
use crate::store::ContextStore;

/// Produces the context for a key. The engine implements this; the
/// scheduler stays ignorant of documents, chunking, and extraction.
#[async_trait]
pub trait ContextBuilder: Send + Sync {
    async fn build(&self, key: &ContextKey) -> Result<CachedContext, BuildError>;
}

struct KeyState {
    status: BuildStatus,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every (re)schedule; a woken timer whose generation no
    /// longer matches was superseded and must not build.
    generation: u64,
    retry_count: u32,
    /// Checksum of the last successful build, for re-request short-circuit.
    last_checksum: Option<String>,
    build_timestamp: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl KeyState {
    fn new() -> Self {
        Self {
            status: BuildStatus::Idle,
            timer: None,
            generation: 0,
            retry_count: 0,
            last_checksum: None,
            build_timestamp: None,
            error_message: None,
        }
    }

    fn snapshot(&self) -> BuildSnapshot {
        BuildSnapshot {
            status: self.status,
            build_timestamp: self.build_timestamp,
            checksum: self.last_checksum.clone(),
            error_message: self.error_message.clone(),
            retry_count: self.retry_count,
        }
    }
}

struct Inner {
    config: SchedulerConfig,
    builder: Arc<dyn ContextBuilder>,
    store: Arc<dyn ContextStore>,
    states: Mutex<HashMap<ContextKey, KeyState>>,
}

/// Debounced, single-flight build scheduler.
///
/// Cheap to clone; all clones share one state map.
#[derive(Clone)]
pub struct BuildScheduler {
    inner: Arc<Inner>,
}

impl BuildScheduler {
    pub fn new(
        config: SchedulerConfig,
        builder: Arc<dyn ContextBuilder>,
        store: Arc<dyn ContextStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                builder,
                store,
                states: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Request a build for `key`, where `checksum` fingerprints the
    /// document set the request observed.
    ///
    /// - SCHEDULED: the debounce timer resets.
    /// - BUILDING: no-op (single-flight); the caller observes via
    ///   [`status`](Self::status).
    /// - COMPLETE with an unchanged checksum: no-op.
    /// - IDLE, FAILED, or COMPLETE with a changed checksum: schedules a
    ///   build after the debounce window. A request is the external
    ///   trigger that takes a key out of FAILED.
    pub fn request_build(&self, key: &ContextKey, checksum: &str) {
        let mut states = self.inner.states.lock().expect("scheduler state poisoned");
        let state = states.entry(key.clone()).or_insert_with(KeyState::new);

        match state.status {
            BuildStatus::Building => {
                debug!(%key, "build already in flight, observing");
            }
            BuildStatus::Scheduled => {
                debug!(%key, "resetting debounce timer");
                if let Some(timer) = state.timer.take() {
                    timer.abort();
                }
                state.generation += 1;
                state.timer = Some(self.spawn_debounce(key.clone(), state.generation));
            }
            BuildStatus::Complete if state.last_checksum.as_deref() == Some(checksum) => {
                debug!(%key, "checksum unchanged, nothing to build");
            }
            _ => {
                debug!(%key, checksum, "scheduling build");
                state.status = BuildStatus::Scheduled;
                state.generation += 1;
                state.retry_count = 0;
                state.error_message = None;
                state.build_timestamp = Some(Utc::now());
                state.timer = Some(self.spawn_debounce(key.clone(), state.generation));
            }
        }
    }

    /// Clear a pending SCHEDULED timer. No effect once BUILDING has
    /// started, and none on other keys.
    pub fn cancel_build(&self, key: &ContextKey) {
        let mut states = self.inner.states.lock().expect("scheduler state poisoned");
        if let Some(state) = states.get_mut(key) {
            if state.status == BuildStatus::Scheduled {
                if let Some(timer) = state.timer.take() {
                    timer.abort();
                }
                state.status = BuildStatus::Idle;
                debug!(%key, "cancelled scheduled build");
            }
        }
    }

    /// Record an immediate terminal failure for `key`, aborting any
    /// pending timer. Used for conditions retrying cannot fix, e.g. an
    /// empty document set.
    pub async fn fail_now(&self, key: &ContextKey, error: &BuildError) {
        {
            let mut states = self.inner.states.lock().expect("scheduler state poisoned");
            let state = states.entry(key.clone()).or_insert_with(KeyState::new);
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.status = BuildStatus::Failed;
            state.build_timestamp = Some(Utc::now());
            state.error_message = Some(error.to_string());
        }
        warn!(%key, %error, "build failed terminally");
        // Awaited so callers observe the store-side record as soon as
        // this returns.
        if let Err(store_err) = self.inner.store.mark_failed(key, &error.to_string()).await {
            warn!(%key, error = %store_err, "failed to record build failure");
        }
    }

    /// Current state of a key's build record.
    pub fn status(&self, key: &ContextKey) -> BuildSnapshot {
        let states = self.inner.states.lock().expect("scheduler state poisoned");
        states
            .get(key)
            .map(|s| s.snapshot())
            .unwrap_or_else(BuildSnapshot::idle)
    }

    /// Abort every outstanding debounce timer. In-flight builds are not
    /// interrupted.
    pub fn shutdown(&self) {
        let mut states = self.inner.states.lock().expect("scheduler state poisoned");
        for (key, state) in states.iter_mut() {
            if let Some(timer) = state.timer.take() {
                timer.abort();
                if state.status == BuildStatus::Scheduled {
                    state.status = BuildStatus::Idle;
                }
                debug!(%key, "aborted pending timer on shutdown");
            }
        }
    }

    fn spawn_debounce(&self, key: ContextKey, generation: u64) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let debounce = Duration::from_secs(self.inner.config.debounce_secs);
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            run_build(inner, key, generation).await;
        })
    }
}

/// Debounce elapsed: take the key to BUILDING and drive the build to a
/// terminal state, retrying retryable failures with backoff.
async fn run_build(inner: Arc<Inner>, key: ContextKey, generation: u64) {
    // SCHEDULED→BUILDING is the single-flight gate. A cancelled key or
    // a superseded timer (stale generation) backs off here.
    {
        let mut states = inner.states.lock().expect("scheduler state poisoned");
        let state = match states.get_mut(&key) {
            Some(s) if s.status == BuildStatus::Scheduled && s.generation == generation => s,
            _ => return,
        };
        state.status = BuildStatus::Building;
        state.timer = None;
        state.build_timestamp = Some(Utc::now());
    }
    if let Err(err) = inner.store.mark_building(&key).await {
        warn!(%key, error = %err, "failed to record building status");
    }

    let backoff = Duration::from_secs(inner.config.retry_backoff_secs);
    loop {
        match inner.builder.build(&key).await {
            Ok(context) => {
                let checksum = context.checksum.clone();
                let built_at = context.built_at;
                if let Err(err) = inner.store.save_cached_context(&key, context).await {
                    // Persisting the result is part of the build.
                    if !retry_or_fail(&inner, &key, &BuildError::Transient(err)).await {
                        return;
                    }
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                let mut states = inner.states.lock().expect("scheduler state poisoned");
                if let Some(state) = states.get_mut(&key) {
                    state.status = BuildStatus::Complete;
                    state.retry_count = 0;
                    state.last_checksum = Some(checksum.clone());
                    state.build_timestamp = Some(built_at);
                    state.error_message = None;
                }
                info!(%key, checksum, "context build complete");
                return;
            }
            Err(err) => {
                if !retry_or_fail(&inner, &key, &err).await {
                    return;
                }
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Bump the retry counter for a failed attempt. Returns `true` when the
/// caller should back off and retry, `false` when the key has gone
/// terminally FAILED.
async fn retry_or_fail(inner: &Arc<Inner>, key: &ContextKey, err: &BuildError) -> bool {
    let (retry, attempt) = {
        let mut states = inner.states.lock().expect("scheduler state poisoned");
        let state = match states.get_mut(key) {
            Some(s) => s,
            None => return false,
        };
        state.retry_count += 1;
        let attempt = state.retry_count;
        if err.is_retryable() && attempt < inner.config.max_retries {
            (true, attempt)
        } else {
            state.status = BuildStatus::Failed;
            state.build_timestamp = Some(Utc::now());
            state.error_message = Some(err.to_string());
            (false, attempt)
        }
    };

    if retry {
        warn!(%key, attempt, error = %err, "build attempt failed, retrying after backoff");
    } else {
        warn!(%key, attempt, error = %err, "build failed terminally");
        if let Err(store_err) = inner.store.mark_failed(key, &err.to_string()).await {
            warn!(%key, error = %store_err, "failed to record build failure");
        }
    }
    retry
}
