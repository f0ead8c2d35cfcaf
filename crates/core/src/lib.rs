//! Domain models, shared types, and error definitions.
//!
//! Foundation crate -- no async or I/O dependencies.

pub mod error;
pub mod types;

pub use error::{LookoutError, LookoutResult};
pub use types::{AccessDescriptor, AccessInfo, AccessLevel, EntityId};
