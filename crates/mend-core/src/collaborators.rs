//! Contracts for the external checkers and host probe, and the validation
//! stack that runs them.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::domain::{
    CheckKind, CheckReport, ComprehensiveValidation, Issue, MendError, Result, Severity,
    StartupValidation, TargetId, ValidationSnapshot,
};

/// One comprehensive checker (schema, dependency, version, filesystem,
/// domain consistency).
#[async_trait]
pub trait Checker: Send + Sync {
    fn kind(&self) -> CheckKind;

    async fn validate(&self, target: &TargetId) -> anyhow::Result<CheckReport>;
}

/// Startup-level validator: domain consistency and registration availability.
#[async_trait]
pub trait StartupValidator: Send + Sync {
    async fn validate(&self, target: &TargetId) -> anyhow::Result<StartupValidation>;
}

/// Answers about the target's live state inside the host.
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn is_loaded(&self, target: &TargetId) -> anyhow::Result<bool>;

    /// Whether the target's entry-point class can be constructed.
    async fn entry_point_instantiable(&self, target: &TargetId) -> anyhow::Result<bool>;

    /// Services/handlers the target currently has registered.
    async fn registered_services(&self, target: &TargetId) -> anyhow::Result<Vec<String>>;
}

/// The full external validation stack.
#[derive(Clone)]
pub struct ValidationStack {
    startup: Arc<dyn StartupValidator>,
    checkers: Vec<Arc<dyn Checker>>,
}

impl ValidationStack {
    pub fn new(startup: Arc<dyn StartupValidator>) -> Self {
        Self {
            startup,
            checkers: Vec::new(),
        }
    }

    /// Add a checker. Checkers run in insertion order.
    pub fn with_checker(mut self, checker: Arc<dyn Checker>) -> Self {
        self.checkers.push(checker);
        self
    }

    pub fn checker(&self, kind: CheckKind) -> Option<&Arc<dyn Checker>> {
        self.checkers.iter().find(|c| c.kind() == kind)
    }

    /// Run the startup validator. Its failure is a pipeline-level error.
    pub async fn run_startup(&self, target: &TargetId) -> Result<StartupValidation> {
        self.startup
            .validate(target)
            .await
            .map_err(|e| MendError::ValidationFailed {
                target: target.to_string(),
                reason: format!("startup validator: {e:#}"),
            })
    }

    /// Run one checker. A checker error becomes a failed report carrying the
    /// error as a critical issue.
    pub async fn run_checker(&self, checker: &dyn Checker, target: &TargetId) -> CheckReport {
        let kind = checker.kind();
        match checker.validate(target).await {
            Ok(mut report) => {
                report.kind = kind;
                report
            }
            Err(e) => {
                warn!(target = %target, check = %kind, error = %e, "checker failed");
                CheckReport::failing(
                    kind,
                    vec![Issue::new(
                        kind.as_str(),
                        format!("{kind} checker failed: {e:#}"),
                        Severity::Critical,
                    )],
                )
            }
        }
    }

    /// Run every comprehensive checker, sequentially.
    pub async fn run_comprehensive(&self, target: &TargetId) -> ComprehensiveValidation {
        let mut reports = Vec::with_capacity(self.checkers.len());
        for checker in &self.checkers {
            reports.push(self.run_checker(checker.as_ref(), target).await);
        }
        ComprehensiveValidation::from_reports(reports)
    }

    /// Run the whole stack and capture a snapshot.
    #[instrument(skip(self), fields(target = %target))]
    pub async fn run(&self, target: &TargetId) -> Result<ValidationSnapshot> {
        let startup = self.run_startup(target).await?;
        let comprehensive = self.run_comprehensive(target).await;
        Ok(ValidationSnapshot::new(target.clone(), startup, comprehensive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ScriptedChecker, ScriptedStartupValidator};

    #[tokio::test]
    async fn test_checker_error_becomes_failed_report() {
        let stack = ValidationStack::new(Arc::new(ScriptedStartupValidator::healthy()))
            .with_checker(Arc::new(ScriptedChecker::erroring(
                CheckKind::Dependency,
                "resolver offline",
            )))
            .with_checker(Arc::new(ScriptedChecker::passing(CheckKind::Schema)));

        let snap = stack.run(&TargetId::new("roost")).await.expect("snapshot");
        assert!(!snap.comprehensive.valid);
        let dep = snap.comprehensive.report(CheckKind::Dependency).expect("dep");
        assert!(!dep.passed);
        assert!(dep.issues[0].description.contains("resolver offline"));
        assert!(snap.comprehensive.passed(CheckKind::Schema));
    }

    #[tokio::test]
    async fn test_startup_error_is_pipeline_error() {
        let stack = ValidationStack::new(Arc::new(ScriptedStartupValidator::erroring("host down")));
        let res = stack.run(&TargetId::new("roost")).await;
        assert!(matches!(res, Err(MendError::ValidationFailed { .. })));
    }
}
