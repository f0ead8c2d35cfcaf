//! Shared fetch/cache layer for access queries.
//!
//! One [`QueryClient`] is shared (via `Arc`) by every [`AccessQuery`] in a
//! process. It owns the per-entity cache, collapses concurrent requests for
//! the same entity into a single source call, and never retries.
//!
//! [`AccessQuery`]: crate::AccessQuery

use lookout_core::{AccessDescriptor, EntityId, LookoutError};
use lookout_provider::AccessSource;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// Default cache window for successful answers.
const DEFAULT_STALE_TIME: Duration = Duration::from_secs(30);

/// Cache policy. Retry is always off and deliberately not configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConfig {
    /// How long a successful answer is reused before a new request is made.
    pub stale_time: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
        }
    }
}

impl QueryConfig {
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }
}

/// Settled result of one access fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(AccessDescriptor),
    Failure(LookoutError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

#[derive(Debug)]
struct Settled {
    outcome: Outcome,
    at: Instant,
}

/// An entry is in flight until its cell is initialized.
type Entry = Arc<OnceCell<Settled>>;

/// Per-entity query cache in front of an [`AccessSource`].
pub struct QueryClient {
    source: Arc<dyn AccessSource>,
    config: QueryConfig,
    entries: Mutex<HashMap<EntityId, Entry>>,
}

impl QueryClient {
    pub fn new(source: Arc<dyn AccessSource>, config: QueryConfig) -> Self {
        Self {
            source,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the successful answer for `entity_id` if it is still inside
    /// the cache window. Never touches the source.
    pub fn cached(&self, entity_id: &EntityId) -> Option<Outcome> {
        let entries = self.lock();
        let settled = entries.get(entity_id)?.get()?;
        (settled.outcome.is_success() && self.is_fresh(settled)).then(|| settled.outcome.clone())
    }

    /// Resolves `entity_id`, joining an in-flight request or reusing a
    /// fresh answer when possible. Errors are folded into [`Outcome::Failure`].
    pub async fn fetch(&self, entity_id: &EntityId) -> Outcome {
        let entry = self.entry_for(entity_id);

        let settled = entry
            .get_or_init(|| async {
                tracing::debug!(entity_id = %entity_id, "dispatching access request");
                let outcome = match self.source.fetch_access(entity_id).await {
                    Ok(descriptor) => Outcome::Success(descriptor),
                    Err(e) => {
                        tracing::warn!(entity_id = %entity_id, error = %e, "access check failed");
                        Outcome::Failure(e)
                    }
                };
                Settled {
                    outcome,
                    at: Instant::now(),
                }
            })
            .await;

        let outcome = settled.outcome.clone();
        if !outcome.is_success() {
            // Failures are not kept so the next activation asks again.
            self.evict_if_current(entity_id, &entry);
        }
        outcome
    }

    /// Drops the entry for `entity_id`. Waiters on an in-flight request
    /// still receive its result; later fetches start over.
    pub fn invalidate(&self, entity_id: &EntityId) {
        if self.lock().remove(entity_id).is_some() {
            tracing::debug!(entity_id = %entity_id, "invalidated access entry");
        }
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        let n = entries.len();
        entries.clear();
        tracing::debug!(entries = n, "cleared access cache");
    }

    /// Number of entries currently held, in flight or fresh. Expired
    /// entries may linger until the next new entry is inserted.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn entry_for(&self, entity_id: &EntityId) -> Entry {
        let mut entries = self.lock();
        if let Some(entry) = entries.get(entity_id) {
            match entry.get() {
                None => return Arc::clone(entry),
                Some(settled) if settled.outcome.is_success() && self.is_fresh(settled) => {
                    tracing::trace!(entity_id = %entity_id, "access cache hit");
                    return Arc::clone(entry);
                }
                Some(_) => {}
            }
        }

        // Expired answers are dropped whenever a new entry goes in, so the
        // map holds at most the in-flight and fresh entries.
        let before = entries.len();
        entries.retain(|_, entry| entry.get().map_or(true, |settled| self.is_fresh(settled)));
        let swept = before - entries.len();
        if swept > 0 {
            tracing::trace!(swept, "dropped expired access entries");
        }

        let entry = Entry::default();
        entries.insert(entity_id.clone(), Arc::clone(&entry));
        entry
    }

    fn evict_if_current(&self, entity_id: &EntityId, entry: &Entry) {
        let mut entries = self.lock();
        if entries
            .get(entity_id)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            entries.remove(entity_id);
        }
    }

    fn is_fresh(&self, settled: &Settled) -> bool {
        settled.at.elapsed() < self.config.stale_time
    }

    // Never held across an await, so poisoning can only come from a panic
    // inside a map operation; the map is still consistent then.
    fn lock(&self) -> MutexGuard<'_, HashMap<EntityId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
