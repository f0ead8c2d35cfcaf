//! Access query state machine, shared fetch/cache layer, and view reports.

pub mod client;
pub mod query;
pub mod report;

pub use client::{Outcome, QueryClient, QueryConfig};
pub use query::{AccessQuery, AccessView, QueryStatus};
pub use report::ViewReport;

#[cfg(test)]
pub(crate) mod testing;
