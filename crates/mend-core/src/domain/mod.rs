//! Domain models for mend.
//!
//! Canonical definitions for the core entities:
//! - `Issue`: a finding from an external checker
//! - `ValidationSnapshot`: the full "before" validation of a target
//! - `RecoveryResult`: outcome of one recovery run and its steps
//! - `VerificationResult`: outcome of the post-recovery battery

pub mod error;
pub mod issue;
pub mod recovery;
pub mod validation;
pub mod verification;

// Re-export main types and errors
pub use error::{MendError, Result};
pub use issue::{CategoryName, Issue, Severity, TargetId};
pub use recovery::{
    percentage, FixOutcome, RecoveryContext, RecoveryResult, RecoveryStatus, RecoveryStep,
    RecoveryVerification, StepKind,
};
pub use validation::{
    overall_success, total_issues, total_warnings, CheckKind, CheckReport,
    ComprehensiveValidation, StartupValidation, ValidationSnapshot,
};
pub use verification::{
    ImprovementMetrics, VerificationResult, VerificationStatus, VerificationTest,
};
