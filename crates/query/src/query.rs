//! Access query state machine.
//!
//! ```text
//!   idle ──(id set)──> loading ──> settled (success | failure)
//!    ^                    ^             │
//!    └──(id cleared)──────┴──(new id)───┘
//! ```
//!
//! Every transition is published on a `watch` channel. Each published view
//! carries the generation that produced it; a fetch task only publishes if
//! the generation it was started under is still current, so a late answer
//! for a previous entity can never overwrite the view of a newer one.

use crate::client::{Outcome, QueryClient};
use lookout_core::{AccessDescriptor, AccessInfo, AccessLevel, EntityId, LookoutError};
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle position of an [`AccessQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    /// No entity id; nothing is fetched.
    Idle,
    Loading,
    Success(AccessDescriptor),
    /// The check could not be completed. Presents as "no access".
    Failure(LookoutError),
}

/// Read-only snapshot of an access query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessView {
    entity_id: Option<EntityId>,
    status: QueryStatus,
    info: AccessInfo,
    generation: u64,
}

impl AccessView {
    fn idle(generation: u64) -> Self {
        Self {
            entity_id: None,
            status: QueryStatus::Idle,
            info: AccessInfo::default(),
            generation,
        }
    }

    fn loading(entity_id: EntityId, generation: u64) -> Self {
        Self {
            entity_id: Some(entity_id),
            status: QueryStatus::Loading,
            info: AccessInfo::default(),
            generation,
        }
    }

    fn settled(entity_id: EntityId, outcome: Outcome, generation: u64) -> Self {
        let (status, info) = match outcome {
            Outcome::Success(descriptor) => {
                let info = descriptor.normalize();
                (QueryStatus::Success(descriptor), info)
            }
            Outcome::Failure(e) => (QueryStatus::Failure(e), AccessInfo::default()),
        };
        Self {
            entity_id: Some(entity_id),
            status,
            info,
            generation,
        }
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        self.entity_id.as_ref()
    }

    pub fn status(&self) -> &QueryStatus {
        &self.status
    }

    /// The descriptor exactly as the endpoint sent it, once resolved.
    pub fn access_info(&self) -> Option<&AccessDescriptor> {
        match &self.status {
            QueryStatus::Success(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.status, QueryStatus::Loading)
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            QueryStatus::Success(_) | QueryStatus::Failure(_)
        )
    }

    pub fn error(&self) -> Option<&LookoutError> {
        match &self.status {
            QueryStatus::Failure(e) => Some(e),
            _ => None,
        }
    }

    pub fn has_access(&self) -> bool {
        self.info.has_access
    }

    /// Display-only tier label; `"none"` unless a successful answer set one.
    pub fn access_level(&self) -> &AccessLevel {
        &self.info.access_level
    }

    pub fn info(&self) -> &AccessInfo {
        &self.info
    }
}

/// One access check bound to a changing entity id.
///
/// Must be driven from inside a tokio runtime: starting a fetch spawns a
/// task.
///
/// ```ignore
/// let client = Arc::new(QueryClient::new(source, QueryConfig::default()));
/// let mut query = AccessQuery::new(client, Some("obs-42"));
/// let view = query.settled().await;
/// if view.has_access() { render_badge(view.access_level()); }
/// ```
pub struct AccessQuery {
    client: Arc<QueryClient>,
    state: Arc<watch::Sender<AccessView>>,
    generation: u64,
}

impl AccessQuery {
    pub fn new(client: Arc<QueryClient>, entity_id: Option<&str>) -> Self {
        let (tx, _) = watch::channel(AccessView::idle(0));
        let mut query = Self {
            client,
            state: Arc::new(tx),
            generation: 0,
        };
        query.set_entity_id(entity_id);
        query
    }

    /// Points the query at `entity_id`. Empty or absent ids disable it.
    /// Re-setting the current id is a no-op, even after a failure.
    pub fn set_entity_id(&mut self, entity_id: Option<&str>) {
        self.set_entity(EntityId::from_optional(entity_id));
    }

    pub fn set_entity(&mut self, entity_id: Option<EntityId>) {
        if self.state.borrow().entity_id == entity_id {
            return;
        }

        self.generation += 1;
        match entity_id {
            None => {
                tracing::debug!("access query disabled");
                self.state.send_replace(AccessView::idle(self.generation));
            }
            Some(id) => self.start(id),
        }
    }

    /// Drops the cached answer for the current entity and asks again.
    /// Does nothing while idle.
    pub fn refetch(&mut self) {
        let Some(id) = self.state.borrow().entity_id.clone() else {
            return;
        };
        self.client.invalidate(&id);
        self.generation += 1;
        self.start(id);
    }

    pub fn view(&self) -> AccessView {
        self.state.borrow().clone()
    }

    /// Receiver that observes the latest published view, starting from the
    /// current one. Views published in quick succession are coalesced.
    pub fn subscribe(&self) -> watch::Receiver<AccessView> {
        self.state.subscribe()
    }

    /// Waits until the current view is not loading and returns it.
    pub async fn settled(&self) -> AccessView {
        let mut rx = self.state.subscribe();
        let settled = match rx.wait_for(|view| !view.is_loading()).await {
            Ok(view) => view.clone(),
            Err(_) => self.view(),
        };
        settled
    }

    fn start(&mut self, id: EntityId) {
        let generation = self.generation;

        if let Some(outcome) = self.client.cached(&id) {
            tracing::trace!(entity_id = %id, "serving access from cache");
            self.state
                .send_replace(AccessView::settled(id, outcome, generation));
            return;
        }

        self.state
            .send_replace(AccessView::loading(id.clone(), generation));

        let client = Arc::clone(&self.client);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let outcome = client.fetch(&id).await;

            let view = AccessView::settled(id.clone(), outcome, generation);
            let applied = state.send_if_modified(|current| {
                if current.generation != generation {
                    return false;
                }
                *current = view;
                true
            });

            if applied {
                tracing::debug!(entity_id = %id, "access query settled");
            } else {
                tracing::debug!(entity_id = %id, "discarding stale access response");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::QueryConfig;
    use crate::testing::GatedSource;
    use lookout_provider::StaticAccessSource;
    use std::time::Duration;

    fn id(s: &str) -> EntityId {
        EntityId::new(s).unwrap()
    }

    fn client_over(source: Arc<dyn lookout_provider::AccessSource>) -> Arc<QueryClient> {
        Arc::new(QueryClient::new(source, QueryConfig::default()))
    }

    /// Yields until `cond` holds, failing the test after a second.
    async fn eventually(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !cond() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn empty_or_absent_id_is_idle_and_never_fetches() {
        let source = Arc::new(StaticAccessSource::new());
        let client = client_over(source.clone());

        for raw in [None, Some("")] {
            let query = AccessQuery::new(client.clone(), raw);
            let view = query.view();
            assert_eq!(view.status(), &QueryStatus::Idle);
            assert!(!view.has_access());
            assert_eq!(view.access_level(), &AccessLevel::NONE);
            assert!(!view.is_loading());
            assert!(view.access_info().is_none());
            assert_eq!(query.settled().await, view);
        }

        tokio::task::yield_now().await;
        assert_eq!(source.total_calls(), 0);
    }

    #[tokio::test]
    async fn whitespace_ids_are_fetched_verbatim() {
        let source = Arc::new(
            StaticAccessSource::new()
                .with_descriptor(id("   "), AccessDescriptor::new(false, "viewer"))
                .with_descriptor(id(" obs-1 "), AccessDescriptor::new(true, "editor")),
        );
        let client = client_over(source.clone());

        let blank = AccessQuery::new(client.clone(), Some("   "));
        assert!(blank.view().is_loading());
        let view = blank.settled().await;
        assert_eq!(view.entity_id().map(EntityId::as_str), Some("   "));
        assert_eq!(view.access_level(), &"viewer");

        let padded = AccessQuery::new(client, Some(" obs-1 "));
        let view = padded.settled().await;
        assert_eq!(view.entity_id().map(EntityId::as_str), Some(" obs-1 "));
        assert!(view.has_access());

        assert_eq!(source.calls_for(&id("   ")), 1);
        assert_eq!(source.calls_for(&id(" obs-1 ")), 1);
        assert_eq!(source.total_calls(), 2);
    }

    #[tokio::test]
    async fn success_reports_descriptor_values() {
        let source = Arc::new(
            StaticAccessSource::new()
                .with_descriptor(id("obs-1"), AccessDescriptor::new(true, "editor")),
        );
        let query = AccessQuery::new(client_over(source), Some("obs-1"));

        let view = query.settled().await;
        assert!(view.has_access());
        assert_eq!(view.access_level(), &"editor");
        assert_eq!(
            view.access_info(),
            Some(&AccessDescriptor::new(true, "editor"))
        );
        assert!(!view.is_loading());
    }

    #[tokio::test]
    async fn empty_descriptor_reports_defaults() {
        let source = Arc::new(
            StaticAccessSource::new().with_descriptor(id("obs-1"), AccessDescriptor::default()),
        );
        let query = AccessQuery::new(client_over(source), Some("obs-1"));

        let view = query.settled().await;
        assert!(matches!(view.status(), QueryStatus::Success(_)));
        assert!(!view.has_access());
        assert_eq!(view.access_level(), &AccessLevel::NONE);
    }

    #[tokio::test]
    async fn failure_reports_defaults_without_retry() {
        let source = Arc::new(
            StaticAccessSource::new()
                .with_error(id("obs-1"), LookoutError::Transport("unreachable".into())),
        );
        let mut query = AccessQuery::new(client_over(source.clone()), Some("obs-1"));

        let view = query.settled().await;
        assert!(view.error().is_some());
        assert!(!view.has_access());
        assert_eq!(view.access_level(), &AccessLevel::NONE);
        assert!(view.access_info().is_none());

        // Same id again is not a retry.
        query.set_entity_id(Some("obs-1"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(source.calls_for(&id("obs-1")), 1);
        assert!(query.view().error().is_some());
    }

    #[tokio::test]
    async fn late_response_for_previous_id_is_discarded() {
        let source = Arc::new(GatedSource::new());
        let release_a = source.gate(id("A"));
        let release_b = source.gate(id("B"));
        let client = client_over(source.clone());

        let mut query = AccessQuery::new(client.clone(), Some("A"));
        assert!(query.view().is_loading());

        query.set_entity_id(Some("B"));
        assert!(query.view().is_loading());
        assert_eq!(query.view().entity_id(), Some(&id("B")));

        release_b
            .send(Ok(AccessDescriptor::new(true, "viewer")))
            .unwrap();
        let view = query.settled().await;
        assert_eq!(view.access_level(), &"viewer");

        release_a
            .send(Ok(AccessDescriptor::new(true, "owner")))
            .unwrap();
        eventually(|| client.cached(&id("A")).is_some()).await;
        tokio::task::yield_now().await;

        let view = query.view();
        assert_eq!(view.entity_id(), Some(&id("B")));
        assert_eq!(view.access_level(), &"viewer");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn is_loading_only_between_dispatch_and_settle() {
        let source = Arc::new(GatedSource::new());
        let release = source.gate(id("obs-1"));

        let mut query = AccessQuery::new(client_over(source), None);
        let mut rx = query.subscribe();
        assert!(!rx.borrow_and_update().is_loading());

        query.set_entity_id(Some("obs-1"));
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_loading());

        release
            .send(Ok(AccessDescriptor::new(false, "viewer")))
            .unwrap();
        rx.changed().await.unwrap();
        let view = rx.borrow_and_update().clone();
        assert!(!view.is_loading());
        assert!(view.is_settled());
        assert!(!view.has_access());
        assert_eq!(view.access_level(), &"viewer");

        query.set_entity_id(None);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status(), &QueryStatus::Idle);
    }

    #[tokio::test]
    async fn cached_entity_settles_without_loading() {
        let source = Arc::new(
            StaticAccessSource::new()
                .with_descriptor(id("A"), AccessDescriptor::new(true, "editor"))
                .with_descriptor(id("B"), AccessDescriptor::new(false, "none")),
        );
        let mut query = AccessQuery::new(client_over(source.clone()), Some("A"));
        query.settled().await;
        query.set_entity_id(Some("B"));
        query.settled().await;

        query.set_entity_id(Some("A"));
        let view = query.view();
        assert!(!view.is_loading());
        assert!(view.has_access());
        assert_eq!(source.calls_for(&id("A")), 1);
    }

    #[tokio::test]
    async fn two_queries_share_one_request() {
        let source = Arc::new(GatedSource::new());
        let release = source.gate(id("obs-1"));
        let client = client_over(source.clone());

        let first = AccessQuery::new(client.clone(), Some("obs-1"));
        let second = AccessQuery::new(client, Some("obs-1"));
        tokio::task::yield_now().await;

        release
            .send(Ok(AccessDescriptor::new(true, "editor")))
            .unwrap();
        assert_eq!(first.settled().await.info(), second.settled().await.info());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn refetch_bypasses_cache() {
        let source = Arc::new(
            StaticAccessSource::new()
                .with_descriptor(id("obs-1"), AccessDescriptor::new(true, "editor")),
        );
        let mut query = AccessQuery::new(client_over(source.clone()), Some("obs-1"));
        query.settled().await;

        query.refetch();
        assert!(query.view().is_loading());
        assert!(query.settled().await.has_access());
        assert_eq!(source.calls_for(&id("obs-1")), 2);

        query.set_entity_id(None);
        query.refetch();
        assert_eq!(query.view().status(), &QueryStatus::Idle);
        assert_eq!(source.calls_for(&id("obs-1")), 2);
    }
}
