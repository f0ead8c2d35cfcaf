//! Printable report of an access view.
//!
//! Flattens an [`AccessView`] into a serializable row for JSON output and a
//! one-line human rendering for terminals.

use crate::query::{AccessView, QueryStatus};
use lookout_core::AccessDescriptor;
use serde::Serialize;

/// Flat, serializable form of an [`AccessView`].
#[derive(Debug, Clone, Serialize)]
pub struct ViewReport {
    pub entity_id: Option<String>,
    /// `idle`, `loading`, `success` or `failure`.
    pub state: &'static str,
    pub is_loading: bool,
    pub has_access: bool,
    pub access_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_info: Option<AccessDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ViewReport {
    pub fn build(view: &AccessView) -> Self {
        Self {
            entity_id: view.entity_id().map(|id| id.to_string()),
            state: state_label(view.status()),
            is_loading: view.is_loading(),
            has_access: view.has_access(),
            access_level: view.access_level().to_string(),
            access_info: view.access_info().cloned(),
            error: view.error().map(|e| e.to_string()),
        }
    }

    /// Single-line terminal rendering.
    pub fn render(&self) -> String {
        let entity = self.entity_id.as_deref().unwrap_or("-");
        match self.state {
            "idle" | "loading" => format!("{entity:<24} {}", self.state),
            _ => {
                let mut line = format!(
                    "{entity:<24} {:<8} access={} level={}",
                    self.state,
                    if self.has_access { "yes" } else { "no" },
                    self.access_level
                );
                if let Some(error) = &self.error {
                    line.push_str(&format!(" ({error})"));
                }
                line
            }
        }
    }
}

fn state_label(status: &QueryStatus) -> &'static str {
    match status {
        QueryStatus::Idle => "idle",
        QueryStatus::Loading => "loading",
        QueryStatus::Success(_) => "success",
        QueryStatus::Failure(_) => "failure",
    }
}
