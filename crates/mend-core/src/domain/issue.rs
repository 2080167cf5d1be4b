//! Validation findings and the category taxonomy they are sorted into.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::MendError;

/// Identity of the validated target (integration, plugin, component).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        TargetId::new("unknown")
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Severity attached to a finding or a category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Named bucket of related validation concerns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CategoryName {
    DomainConsistency,
    Registration,
    SchemaValidation,
    DependencyResolution,
    Filesystem,
    VersionCompatibility,
}

impl CategoryName {
    pub const ALL: [CategoryName; 6] = [
        CategoryName::DomainConsistency,
        CategoryName::Registration,
        CategoryName::SchemaValidation,
        CategoryName::DependencyResolution,
        CategoryName::Filesystem,
        CategoryName::VersionCompatibility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryName::DomainConsistency => "domain_consistency",
            CategoryName::Registration => "registration",
            CategoryName::SchemaValidation => "schema_validation",
            CategoryName::DependencyResolution => "dependency_resolution",
            CategoryName::Filesystem => "filesystem",
            CategoryName::VersionCompatibility => "version_compatibility",
        }
    }
}

impl fmt::Display for CategoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryName {
    type Err = MendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CategoryName::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| MendError::UnknownCategory(s.to_string()))
    }
}

/// A single finding emitted by a checker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    /// Which checker produced the finding.
    pub source: String,

    /// Free-text description.
    pub description: String,

    pub severity: Severity,

    /// Structured category hint from the producer. Takes precedence over
    /// keyword classification.
    #[serde(default)]
    pub category: Option<CategoryName>,
}

impl Issue {
    pub fn new(source: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            source: source.into(),
            description: description.into(),
            severity,
            category: None,
        }
    }

    /// Attach a structured category hint.
    pub fn with_category(mut self, category: CategoryName) -> Self {
        self.category = Some(category);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn test_category_name_from_str() {
        for c in CategoryName::ALL {
            assert_eq!(c.as_str().parse::<CategoryName>().expect("parse"), c);
        }
        assert!(matches!(
            "bogus".parse::<CategoryName>(),
            Err(MendError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_category_serde_matches_display() {
        let json = serde_json::to_string(&CategoryName::DependencyResolution).expect("serialize");
        assert_eq!(json, "\"dependency_resolution\"");
    }

    #[test]
    fn test_issue_hint_defaults_to_none() {
        let issue: Issue = serde_json::from_str(
            r#"{"source":"schema","description":"manifest missing key","severity":"error"}"#,
        )
        .expect("deserialize");
        assert!(issue.category.is_none());
        assert_eq!(issue.severity, Severity::Error);
    }
}
