//! Module identifiers
//!
//! A module is keyed by `(namespace, name)` with the canonical string form
//! `"namespace.name"`. Namespaces and names containing `.` are not supported.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::module::traits::{ModuleError, Result};

/// Canonical module identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
    namespace: String,
    name: String,
}

impl ModuleId {
    /// Create an id; both parts must be non-empty
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let name = name.into();
        if namespace.is_empty() || name.is_empty() {
            return Err(ModuleError::InvalidModule(format!(
                "namespace and name must be non-empty (got {:?}.{:?})",
                namespace, name
            )));
        }
        Ok(Self { namespace, name })
    }

    /// Parse a canonical `"namespace.name"` string
    ///
    /// Splits on the first `.`; returns `None` unless that yields exactly two
    /// non-empty segments.
    pub fn parse(id: &str) -> Option<Self> {
        let (namespace, name) = id.split_once('.')?;
        if namespace.is_empty() || name.is_empty() || name.contains('.') {
            return None;
        }
        Some(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Build the canonical key for `(namespace, name)`
pub fn make_id(namespace: &str, name: &str) -> Result<String> {
    ModuleId::new(namespace, name).map(|id| id.to_string())
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

impl Serialize for ModuleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModuleId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ModuleId::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid module id: {}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_id() {
        assert_eq!(make_id("core", "a").unwrap(), "core.a");
        assert!(matches!(make_id("", "a"), Err(ModuleError::InvalidModule(_))));
        assert!(matches!(make_id("core", ""), Err(ModuleError::InvalidModule(_))));
    }

    #[test]
    fn test_parse() {
        let id = ModuleId::parse("ui.qr").unwrap();
        assert_eq!(id.namespace(), "ui");
        assert_eq!(id.name(), "qr");
        assert_eq!(id.to_string(), "ui.qr");

        assert!(ModuleId::parse("nodot").is_none());
        assert!(ModuleId::parse(".name").is_none());
        assert!(ModuleId::parse("ns.").is_none());
        assert!(ModuleId::parse("a.b.c").is_none());
    }

    #[test]
    fn test_serde_uses_canonical_form() {
        let id = ModuleId::new("core", "b").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"core.b\"");
        let back: ModuleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ModuleId>("\"broken\"").is_err());
    }
}
