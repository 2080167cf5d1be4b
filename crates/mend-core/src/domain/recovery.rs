//! Recovery run records.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::issue::{CategoryName, TargetId};

/// What a repair handler reports back after one attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FixOutcome {
    pub success: bool,
    #[serde(default)]
    pub changes_made: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Result of the handler's own post-check, if it ran one.
    #[serde(default)]
    pub verification_passed: bool,
    /// Issues this attempt resolved. When absent, a successful attempt
    /// counts as resolving its whole category bucket.
    #[serde(default)]
    pub issues_resolved: Option<usize>,
}

impl FixOutcome {
    pub fn succeeded(change: impl Into<String>) -> Self {
        Self {
            success: true,
            changes_made: vec![change.into()],
            verification_passed: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            ..Default::default()
        }
    }

    pub fn with_issues_resolved(mut self, count: usize) -> Self {
        self.issues_resolved = Some(count);
        self
    }
}

/// Whether a step came from the primary strategy list or the fallback list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Primary,
    Fallback,
}

/// One strategy execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryStep {
    pub step_id: Uuid,
    pub category: CategoryName,
    pub strategy: String,
    pub kind: StepKind,
    pub success: bool,
    pub duration_ms: u64,
    pub changes_made: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub verification_passed: bool,
}

impl RecoveryStep {
    pub fn from_outcome(
        category: CategoryName,
        strategy: &str,
        kind: StepKind,
        duration_ms: u64,
        outcome: FixOutcome,
    ) -> Self {
        Self {
            step_id: Uuid::new_v4(),
            category,
            strategy: strategy.to_string(),
            kind,
            success: outcome.success,
            duration_ms,
            changes_made: outcome.changes_made,
            errors: outcome.errors,
            warnings: outcome.warnings,
            verification_passed: outcome.verification_passed,
        }
    }

    /// A step whose handler returned an error.
    pub fn from_error(
        category: CategoryName,
        strategy: &str,
        kind: StepKind,
        duration_ms: u64,
        error: &dyn fmt::Display,
    ) -> Self {
        Self {
            step_id: Uuid::new_v4(),
            category,
            strategy: strategy.to_string(),
            kind,
            success: false,
            duration_ms,
            changes_made: Vec::new(),
            errors: vec![format!("strategy {strategy} failed: {error}")],
            warnings: Vec::new(),
            verification_passed: false,
        }
    }
}

/// Final status of a recovery run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    NoIssues,
    Recovered,
    Partial,
    Fallback,
    Failed,
    Emergency,
}

impl fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryStatus::NoIssues => "no_issues",
            RecoveryStatus::Recovered => "recovered",
            RecoveryStatus::Partial => "partial",
            RecoveryStatus::Fallback => "fallback",
            RecoveryStatus::Failed => "failed",
            RecoveryStatus::Emergency => "emergency",
        };
        f.write_str(s)
    }
}

/// Post-recovery re-validation summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecoveryVerification {
    /// False when the run ended before re-validation.
    pub performed: bool,
    pub domain_consistency_improved: bool,
    pub registration_improved: bool,
    pub overall_validation_improved: bool,
    pub issues_before: usize,
    pub issues_after: usize,
}

/// Caller-supplied context for a recovery or verification run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecoveryContext {
    pub target_id: TargetId,

    /// Services/handlers the target is expected to register. Overrides the
    /// configured list when non-empty.
    #[serde(default)]
    pub expected_services: Vec<String>,

    /// Free-form labels forwarded to handlers.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl RecoveryContext {
    pub fn new(target_id: TargetId) -> Self {
        Self {
            target_id,
            expected_services: Vec::new(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_expected_services(mut self, services: Vec<String>) -> Self {
        self.expected_services = services;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Outcome of one recovery invocation. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryResult {
    pub run_id: Uuid,
    pub target_id: TargetId,
    pub success: bool,
    pub overall_status: RecoveryStatus,
    pub total_issues: usize,
    pub recovered_issues: usize,
    pub remaining_issues: usize,
    pub recovery_steps: Vec<RecoveryStep>,
    pub fallbacks_applied: Vec<String>,
    pub verification_results: RecoveryVerification,
    pub duration_ms: u64,
    pub recommendations: Vec<String>,
    pub emergency_mode: bool,
    pub started_at: DateTime<Utc>,
}

impl RecoveryResult {
    /// Degenerate result for a run that failed outside any single step.
    pub fn emergency(
        target_id: TargetId,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        total_issues: usize,
        error: &dyn fmt::Display,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target_id,
            success: false,
            overall_status: RecoveryStatus::Emergency,
            total_issues,
            recovered_issues: 0,
            remaining_issues: total_issues,
            recovery_steps: Vec::new(),
            fallbacks_applied: Vec::new(),
            verification_results: RecoveryVerification::default(),
            duration_ms,
            recommendations: vec![
                format!("Recovery pipeline failed: {error}"),
                "Automatic recovery could not complete; manual intervention required".to_string(),
                "Consider reinstalling the target from a known-good release".to_string(),
            ],
            emergency_mode: true,
            started_at,
        }
    }

    /// Steps recorded for one category, in execution order.
    pub fn steps_for(&self, category: CategoryName) -> impl Iterator<Item = &RecoveryStep> {
        self.recovery_steps
            .iter()
            .filter(move |s| s.category == category)
    }

    /// Percentage of issues recovered; 100 when there was nothing to recover.
    pub fn success_rate(&self) -> f64 {
        percentage(self.recovered_issues, self.total_issues)
    }
}

/// `part / whole * 100`, defined as 100 when `whole` is zero.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        100.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
