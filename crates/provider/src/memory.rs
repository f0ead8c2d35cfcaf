//! In-memory access source for demos, benches, and tests.
//!
//! Answers from a fixed table and counts how often each entity was asked
//! for, so callers can assert on request volume without a network.

use crate::AccessSource;
use async_trait::async_trait;
use lookout_core::error::{LookoutError, LookoutResult};
use lookout_core::{AccessDescriptor, EntityId};
use std::collections::HashMap;
use std::sync::Mutex;

/// Fixed-table source. Entities without an entry fail with a `404` status.
#[derive(Debug, Default)]
pub struct StaticAccessSource {
    answers: HashMap<EntityId, LookoutResult<AccessDescriptor>>,
    calls: Mutex<HashMap<EntityId, usize>>,
}

impl StaticAccessSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_descriptor(mut self, entity_id: EntityId, descriptor: AccessDescriptor) -> Self {
        self.answers.insert(entity_id, Ok(descriptor));
        self
    }

    pub fn with_error(mut self, entity_id: EntityId, error: LookoutError) -> Self {
        self.answers.insert(entity_id, Err(error));
        self
    }

    /// Number of fetches issued for `entity_id` so far.
    pub fn calls_for(&self, entity_id: &EntityId) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(entity_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of fetches issued across all entities.
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl AccessSource for StaticAccessSource {
    async fn fetch_access(&self, entity_id: &EntityId) -> LookoutResult<AccessDescriptor> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(entity_id.clone()).or_default() += 1;
        }

        match self.answers.get(entity_id) {
            Some(answer) => answer.clone(),
            None => Err(LookoutError::Status {
                status: 404,
                body: format!("no access entry for {entity_id}"),
            }),
        }
    }
}
