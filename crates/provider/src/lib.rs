//! Data provider abstraction for Lookout access checks.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use lookout_core::error::LookoutResult;
use lookout_core::{AccessDescriptor, EntityId};

pub use http::{HttpAccessSource, HttpSourceConfig};
pub use memory::StaticAccessSource;

/// Abstraction for fetching an access descriptor from any source.
///
/// Implementations make exactly one attempt per call; retrying is not the
/// source's business.
#[async_trait]
pub trait AccessSource: Send + Sync {
    async fn fetch_access(&self, entity_id: &EntityId) -> LookoutResult<AccessDescriptor>;
}
