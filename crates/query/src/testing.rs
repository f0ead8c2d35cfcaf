//! Test-only sources whose answers are released by the test body.

use async_trait::async_trait;
use lookout_core::{AccessDescriptor, EntityId, LookoutError, LookoutResult};
use lookout_provider::AccessSource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

type Answer = LookoutResult<AccessDescriptor>;

/// Each fetch blocks until the test sends the answer for that entity.
#[derive(Default)]
pub(crate) struct GatedSource {
    gates: Mutex<HashMap<EntityId, oneshot::Receiver<Answer>>>,
    calls: AtomicUsize,
}

impl GatedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arms one request for `entity_id`; send on the returned sender to
    /// settle it.
    pub(crate) fn gate(&self, entity_id: EntityId) -> oneshot::Sender<Answer> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(entity_id, rx);
        tx
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccessSource for GatedSource {
    async fn fetch_access(&self, entity_id: &EntityId) -> Answer {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().remove(entity_id);
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(LookoutError::Internal("gate dropped".into()))),
            None => Err(LookoutError::Internal(format!("no gate armed for {entity_id}"))),
        }
    }
}
