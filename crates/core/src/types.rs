//! Domain types for Lookout access queries.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Identifier of the entity whose access is being checked.
///
/// Never empty: [`EntityId::new`] maps `""` to `None`, which is how a
/// disabled query is expressed. Any other input is kept exactly as given.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return None;
        }
        Some(Self(raw))
    }

    /// Accepts the "maybe undefined" shape callers usually hold.
    pub fn from_optional(raw: Option<&str>) -> Option<Self> {
        raw.and_then(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Wire descriptor
// ---------------------------------------------------------------------------

/// Raw descriptor as returned by the access endpoint.
///
/// Every field is optional; unknown fields are ignored. Use
/// [`AccessDescriptor::normalize`] to obtain the defaulted view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_access: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_level: Option<String>,
}

impl AccessDescriptor {
    pub fn new(has_access: bool, access_level: impl Into<String>) -> Self {
        Self {
            has_access: Some(has_access),
            access_level: Some(access_level.into()),
        }
    }

    /// Applies the defaults: missing `hasAccess` is `false`, missing or empty
    /// `accessLevel` is [`AccessLevel::NONE`].
    pub fn normalize(&self) -> AccessInfo {
        AccessInfo {
            has_access: self.has_access.unwrap_or(false),
            access_level: self
                .access_level
                .as_deref()
                .filter(|level| !level.is_empty())
                .map(AccessLevel::from)
                .unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalized view
// ---------------------------------------------------------------------------

/// Access tier label. Display-only: the server is the enforcement boundary,
/// so nothing on the client branches on the level to grant anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessLevel(String);

impl AccessLevel {
    /// Sentinel for "no level known".
    pub const NONE: &'static str = "none";

    pub fn none() -> Self {
        Self(Self::NONE.to_string())
    }

    pub fn is_none(&self) -> bool {
        self.0 == Self::NONE
    }
}

impl Default for AccessLevel {
    fn default() -> Self {
        Self::none()
    }
}

impl From<&str> for AccessLevel {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for AccessLevel {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Defaulted access answer. `Default` is the "no access" answer used for
/// idle, loading, and failed queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessInfo {
    pub has_access: bool,
    pub access_level: AccessLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_empty_entity_ids_are_rejected() {
        assert!(EntityId::new("").is_none());
        assert!(EntityId::from_optional(None).is_none());
        assert!(EntityId::from_optional(Some("")).is_none());

        assert_eq!(EntityId::new("   ").unwrap().as_str(), "   ");
        assert_eq!(EntityId::new(" obs-1 ").unwrap().as_str(), " obs-1 ");
    }

    #[test]
    fn full_descriptor_normalizes_verbatim() {
        let d: AccessDescriptor =
            serde_json::from_str(r#"{"hasAccess":true,"accessLevel":"editor"}"#).unwrap();
        let info = d.normalize();
        assert!(info.has_access);
        assert_eq!(info.access_level, "editor");
    }

    #[test]
    fn empty_object_normalizes_to_no_access() {
        let d: AccessDescriptor = serde_json::from_str("{}").unwrap();
        assert_eq!(d, AccessDescriptor::default());
        assert_eq!(d.normalize(), AccessInfo::default());
        assert!(d.normalize().access_level.is_none());
    }

    #[test]
    fn null_and_empty_level_default_to_none() {
        let d: AccessDescriptor =
            serde_json::from_str(r#"{"hasAccess":true,"accessLevel":null}"#).unwrap();
        assert_eq!(d.normalize().access_level, AccessLevel::NONE);

        let d: AccessDescriptor =
            serde_json::from_str(r#"{"hasAccess":false,"accessLevel":""}"#).unwrap();
        assert_eq!(d.normalize().access_level, AccessLevel::NONE);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let d: AccessDescriptor =
            serde_json::from_str(r#"{"accessLevel":"viewer","role":"x"}"#).unwrap();
        let info = d.normalize();
        assert!(!info.has_access);
        assert_eq!(info.access_level, "viewer");
    }

    #[test]
    fn mistyped_has_access_is_a_decode_error() {
        assert!(serde_json::from_str::<AccessDescriptor>(r#"{"hasAccess":"yes"}"#).is_err());
    }
}
