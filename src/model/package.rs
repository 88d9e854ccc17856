use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A concrete package version, identified by the pair `(name, version)`.
///
/// The canonical string form `name@version` is the sole identity used for
/// dedup and set membership throughout regwatch. Scoped names like
/// `@types/node` keep their leading `@`; the version separator is always
/// the *last* `@` in the string, so `@types/node@1.0.0` round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
}

impl PackageId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Canonical `name@version` form.
    pub fn canonical(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Parses a canonical `name@version` string.
    ///
    /// The version separator is the last `@` at position > 0, so scoped
    /// names parse correctly. Returns `None` when no separator exists or
    /// either side is empty.
    pub fn parse(s: &str) -> Option<Self> {
        let at = s.rfind('@')?;
        if at == 0 {
            // A bare scoped name like "@types/node" has no version part.
            return None;
        }
        let (name, version) = (&s[..at], &s[at + 1..]);
        if name.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self::new(name, version))
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Resolved registry metadata for one package version.
///
/// Every field beyond name/version is best-effort: the registry document
/// may omit any of them, and an identifier recovered from the discovered
/// set carries no metadata at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub dependencies: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub dev_dependencies: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tarball_url: Option<String>,
}

impl PackageInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> PackageId {
        PackageId::new(&self.name, &self.version)
    }

    /// Rebuilds a bare `PackageInfo` from a canonical identifier.
    ///
    /// Used when the scan phase picks up identifiers from the discovered
    /// set; the original discovery-time metadata is not retained.
    pub fn from_id(id: &PackageId) -> Self {
        Self::new(&id.name, &id.version)
    }
}
