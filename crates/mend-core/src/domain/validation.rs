//! Validation results consumed from external checkers.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::issue::{Issue, TargetId};

/// The kind of comprehensive check a [`crate::collaborators::Checker`] performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Schema,
    Dependency,
    Version,
    Filesystem,
    DomainConsistency,
}

impl CheckKind {
    pub const ALL: [CheckKind; 5] = [
        CheckKind::Schema,
        CheckKind::Dependency,
        CheckKind::Version,
        CheckKind::Filesystem,
        CheckKind::DomainConsistency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Schema => "schema",
            CheckKind::Dependency => "dependency",
            CheckKind::Version => "version",
            CheckKind::Filesystem => "filesystem",
            CheckKind::DomainConsistency => "domain_consistency",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one comprehensive checker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckReport {
    pub kind: CheckKind,

    /// `valid` / `compatible` / `consistent`, depending on the checker.
    pub passed: bool,

    #[serde(default)]
    pub issues: Vec<Issue>,

    #[serde(default)]
    pub warnings: Vec<String>,

    /// Checker-specific extra data.
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl CheckReport {
    pub fn passing(kind: CheckKind) -> Self {
        Self {
            kind,
            passed: true,
            issues: Vec::new(),
            warnings: Vec::new(),
            details: serde_json::Map::new(),
        }
    }

    pub fn failing(kind: CheckKind, issues: Vec<Issue>) -> Self {
        Self {
            kind,
            passed: false,
            issues,
            warnings: Vec::new(),
            details: serde_json::Map::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Startup-level validation of a target (`pre_validation`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartupValidation {
    pub success: bool,
    pub domain_consistent: bool,
    pub registration_available: bool,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl StartupValidation {
    /// A clean startup validation with no findings.
    pub fn healthy() -> Self {
        Self {
            success: true,
            domain_consistent: true,
            registration_available: true,
            issues: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Aggregated comprehensive validation (`pre_comprehensive`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComprehensiveValidation {
    pub valid: bool,
    pub reports: BTreeMap<CheckKind, CheckReport>,
}

/// No reports, nothing failed: the same as `from_reports([])`.
impl Default for ComprehensiveValidation {
    fn default() -> Self {
        Self {
            valid: true,
            reports: BTreeMap::new(),
        }
    }
}

impl ComprehensiveValidation {
    /// Build from individual reports. `valid` is true only when every report passed.
    pub fn from_reports(reports: impl IntoIterator<Item = CheckReport>) -> Self {
        let reports: BTreeMap<CheckKind, CheckReport> =
            reports.into_iter().map(|r| (r.kind, r)).collect();
        let valid = reports.values().all(|r| r.passed);
        Self { valid, reports }
    }

    pub fn report(&self, kind: CheckKind) -> Option<&CheckReport> {
        self.reports.get(&kind)
    }

    /// Whether a given check passed. A missing report counts as not passed.
    pub fn passed(&self, kind: CheckKind) -> bool {
        self.report(kind).map(|r| r.passed).unwrap_or(false)
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.reports.values().flat_map(|r| r.issues.iter())
    }

    pub fn issue_count(&self) -> usize {
        self.reports.values().map(|r| r.issues.len()).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.reports.values().map(|r| r.warnings.len()).sum()
    }
}

/// Full "before" validation of a target, as stored in the result cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationSnapshot {
    pub target_id: TargetId,
    pub startup: StartupValidation,
    pub comprehensive: ComprehensiveValidation,
    pub captured_at: DateTime<Utc>,
}

impl ValidationSnapshot {
    pub fn new(
        target_id: TargetId,
        startup: StartupValidation,
        comprehensive: ComprehensiveValidation,
    ) -> Self {
        Self {
            target_id,
            startup,
            comprehensive,
            captured_at: Utc::now(),
        }
    }

    /// Overall success: startup succeeded and every comprehensive check passed.
    pub fn success(&self) -> bool {
        overall_success(&self.startup, &self.comprehensive)
    }

    pub fn issue_count(&self) -> usize {
        total_issues(&self.startup, &self.comprehensive)
    }

    pub fn warning_count(&self) -> usize {
        total_warnings(&self.startup, &self.comprehensive)
    }
}

pub fn overall_success(startup: &StartupValidation, comprehensive: &ComprehensiveValidation) -> bool {
    startup.success && comprehensive.valid
}

pub fn total_issues(startup: &StartupValidation, comprehensive: &ComprehensiveValidation) -> usize {
    startup.issues.len() + comprehensive.issue_count()
}

pub fn total_warnings(startup: &StartupValidation, comprehensive: &ComprehensiveValidation) -> usize {
    startup.warnings.len() + comprehensive.warning_count()
}
