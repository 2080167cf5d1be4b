//! Post-recovery verification records.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::issue::CategoryName;

/// One check in the verification battery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationTest {
    pub test_id: Uuid,
    pub name: String,
    pub category: CategoryName,
    pub priority: u8,
    pub success: bool,
    pub duration_ms: u64,
    pub details: serde_json::Map<String, serde_json::Value>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Qualitative verdict of a verification run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Partial,
    Limited,
    Failed,
    NoTests,
    Error,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::Partial => "partial",
            VerificationStatus::Limited => "limited",
            VerificationStatus::Failed => "failed",
            VerificationStatus::NoTests => "no_tests",
            VerificationStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Before/after comparison of the validation stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImprovementMetrics {
    pub issues_before: usize,
    pub issues_after: usize,
    pub issues_resolved: usize,
    pub issues_improvement_percentage: f64,
    pub warnings_before: usize,
    pub warnings_after: usize,
    pub warnings_resolved: usize,
    pub warnings_improvement_percentage: f64,
    pub domain_consistency_improved: bool,
    pub registration_availability_improved: bool,
    pub schema_validity_improved: bool,
    pub dependency_validity_improved: bool,
    pub overall_validation_improved: bool,
    pub recovery_duration_ms: u64,
    pub recovery_success_rate: f64,
}

impl ImprovementMetrics {
    /// Improvement large enough to upgrade the verdict. `threshold` is the
    /// issue improvement percentage that must be exceeded.
    pub fn is_significant(&self, threshold: f64) -> bool {
        self.issues_improvement_percentage > threshold
            || self.overall_validation_improved
            || self.domain_consistency_improved
            || self.registration_availability_improved
    }
}

/// Outcome of one verification invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationResult {
    pub success: bool,
    pub overall_status: VerificationStatus,
    pub tests_run: usize,
    pub tests_passed: usize,
    pub tests_failed: usize,
    pub verification_tests: Vec<VerificationTest>,
    pub improvement_metrics: ImprovementMetrics,
    pub recommendations: Vec<String>,
    pub duration_ms: u64,
}

impl VerificationResult {
    /// Degenerate result for a verification run that failed as a whole.
    pub fn error(duration_ms: u64, error: &dyn fmt::Display) -> Self {
        Self {
            success: false,
            overall_status: VerificationStatus::Error,
            tests_run: 0,
            tests_passed: 0,
            tests_failed: 0,
            verification_tests: Vec::new(),
            improvement_metrics: ImprovementMetrics::default(),
            recommendations: vec![
                format!("Verification failed: {error}"),
                "Re-run validation manually and review the target's logs".to_string(),
            ],
            duration_ms,
        }
    }

    pub fn pass_percentage(&self) -> f64 {
        if self.tests_run == 0 {
            0.0
        } else {
            self.tests_passed as f64 / self.tests_run as f64 * 100.0
        }
    }

    pub fn test(&self, name: &str) -> Option<&VerificationTest> {
        self.verification_tests.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_significant_improvement_rules() {
        let mut m = ImprovementMetrics::default();
        assert!(!m.is_significant(50.0));

        m.issues_improvement_percentage = 50.0;
        assert!(!m.is_significant(50.0), "50% is not strictly greater than 50");

        m.issues_improvement_percentage = 60.0;
        assert!(m.is_significant(50.0));

        let m = ImprovementMetrics {
            registration_availability_improved: true,
            ..Default::default()
        };
        assert!(m.is_significant(50.0));
    }

    #[test]
    fn test_error_result() {
        let r = VerificationResult::error(5, &"stack unavailable");
        assert_eq!(r.overall_status, VerificationStatus::Error);
        assert!(!r.success);
        assert_eq!(r.pass_percentage(), 0.0);
        assert!(r.recommendations[0].contains("stack unavailable"));
    }
}
