//! mend Core Library
//!
//! Self-validation and recovery pipeline: classify the issues a validation
//! stack reports, run repair strategies per category with fallbacks, and
//! verify the outcome.

pub mod cache;
pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod fakes;
pub mod fallback;
pub mod handlers;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod telemetry;
pub mod verification;

pub use domain::{
    CategoryName, CheckKind, CheckReport, ComprehensiveValidation, FixOutcome, ImprovementMetrics,
    Issue, MendError, RecoveryContext, RecoveryResult, RecoveryStatus, RecoveryStep,
    RecoveryVerification, Result, Severity, StartupValidation, StepKind, TargetId,
    ValidationSnapshot, VerificationResult, VerificationStatus, VerificationTest,
};

pub use cache::{EvictionPolicy, MaxAge, NeverExpire, ResultCache};
pub use classifier::{ClassificationRule, ClassifierConfig, IssueClassifier};
pub use collaborators::{Checker, HostProbe, StartupValidator, ValidationStack};
pub use config::{MendConfig, RecoveryConfig, VerificationConfig};
pub use fallback::{FallbackCascade, EMERGENCY_MARKER};
pub use handlers::{handler_fn, HandlerTable, HandlerTableBuilder, RepairHandler, StrategyContext};
pub use orchestrator::RecoveryOrchestrator;
pub use registry::{CategoryRegistry, ErrorCategory};
pub use service::{PipelineReport, SelfHealingService, StartupDiagnostics};
pub use verification::{VerificationCheck, VerificationEngine};

pub use metrics::METRICS;
pub use obs::{
    emit_emergency_activated, emit_fallback_applied, emit_pipeline_error, emit_recovery_finished,
    emit_recovery_started, emit_step_recorded, emit_verification_finished, PipelineSpan,
};
pub use telemetry::init_tracing;

/// mend version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
