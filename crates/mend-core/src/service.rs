//! Host-facing entry point tying validation, recovery and verification together.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::cache::ResultCache;
use crate::classifier::IssueClassifier;
use crate::collaborators::{HostProbe, ValidationStack};
use crate::config::MendConfig;
use crate::domain::{
    CategoryName, ComprehensiveValidation, RecoveryContext, RecoveryResult, RecoveryStatus,
    Result, StartupValidation, TargetId, ValidationSnapshot, VerificationResult,
};
use crate::handlers::HandlerTable;
use crate::metrics::METRICS;
use crate::orchestrator::RecoveryOrchestrator;
use crate::registry::CategoryRegistry;
use crate::verification::VerificationEngine;

/// Outcome of [`SelfHealingService::run_pipeline`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineReport {
    pub target_id: TargetId,
    pub pre_validation: ValidationSnapshot,
    /// Absent when the target validated cleanly.
    pub recovery: Option<RecoveryResult>,
    pub verification: Option<VerificationResult>,
    /// Recovery and verification advice, de-duplicated, in order.
    pub recommendations: Vec<String>,
}

impl PipelineReport {
    /// Healthy before the run, or recovered and verified.
    pub fn healthy(&self) -> bool {
        match (&self.recovery, &self.verification) {
            (None, _) => self.pre_validation.success(),
            (Some(r), Some(v)) => r.success && v.success,
            (Some(_), None) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationSummary {
    pub success: bool,
    pub issues: usize,
    pub warnings: usize,
    pub captured_at: DateTime<Utc>,
}

impl From<&ValidationSnapshot> for ValidationSummary {
    fn from(snapshot: &ValidationSnapshot) -> Self {
        Self {
            success: snapshot.success(),
            issues: snapshot.issue_count(),
            warnings: snapshot.warning_count(),
            captured_at: snapshot.captured_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategorySummary {
    pub name: CategoryName,
    pub recovery_priority: u8,
    pub strategies: usize,
    pub fallbacks: usize,
}

/// Point-in-time view of the service's state for one target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartupDiagnostics {
    pub target_id: TargetId,
    pub cached_validation: Option<ValidationSummary>,
    pub emergency_mode: bool,
    pub recovery_attempts: usize,
    pub last_recovery_status: Option<RecoveryStatus>,
    /// Registered categories in processing order.
    pub categories: Vec<CategorySummary>,
}

pub struct SelfHealingService {
    registry: Arc<CategoryRegistry>,
    stack: ValidationStack,
    cache: ResultCache,
    orchestrator: RecoveryOrchestrator,
    verifier: VerificationEngine,
}

impl SelfHealingService {
    /// Validate `config` and wire the pipeline.
    ///
    /// `handlers` must have been built against `registry`.
    pub fn new(
        config: MendConfig,
        registry: Arc<CategoryRegistry>,
        handlers: HandlerTable,
        stack: ValidationStack,
        probe: Arc<dyn HostProbe>,
    ) -> Result<Self> {
        config.validate()?;
        let classifier = IssueClassifier::new(&config.classifier, &registry)?;
        let orchestrator = RecoveryOrchestrator::new(
            Arc::clone(&registry),
            classifier,
            handlers,
            stack.clone(),
            config.recovery,
        );
        let verifier = VerificationEngine::new(stack.clone(), probe, config.verification);

        Ok(Self {
            registry,
            stack,
            cache: ResultCache::default(),
            orchestrator,
            verifier,
        })
    }

    /// Replace the default never-expiring cache.
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = cache;
        self
    }

    /// Cached full validation of `target`.
    pub async fn run_comprehensive_validation(&self, target: &TargetId) -> Result<ValidationSnapshot> {
        self.cache.get_or_run(target, &self.stack).await
    }

    pub async fn execute_comprehensive_recovery(
        &self,
        pre_validation: &StartupValidation,
        pre_comprehensive: &ComprehensiveValidation,
        ctx: &RecoveryContext,
    ) -> RecoveryResult {
        self.orchestrator
            .recover(pre_validation, pre_comprehensive, ctx)
            .await
    }

    pub async fn verify_recovery_effectiveness(
        &self,
        pre_validation: &StartupValidation,
        pre_comprehensive: &ComprehensiveValidation,
        recovery: &RecoveryResult,
        ctx: &RecoveryContext,
    ) -> VerificationResult {
        self.verifier
            .verify(pre_validation, pre_comprehensive, recovery, ctx)
            .await
    }

    /// Validate, and if anything is wrong, recover and verify.
    ///
    /// Fails only when the initial validation cannot be taken; recovery and
    /// verification errors are folded into their results.
    #[instrument(skip_all, fields(target = %ctx.target_id))]
    pub async fn run_pipeline(&self, ctx: &RecoveryContext) -> Result<PipelineReport> {
        let target = &ctx.target_id;
        let pre = self.run_comprehensive_validation(target).await?;

        if pre.success() && pre.issue_count() == 0 {
            info!("target validated cleanly, nothing to recover");
            return Ok(PipelineReport {
                target_id: target.clone(),
                pre_validation: pre,
                recovery: None,
                verification: None,
                recommendations: vec!["Validation passed; no recovery needed".to_string()],
            });
        }

        let recovery = self
            .execute_comprehensive_recovery(&pre.startup, &pre.comprehensive, ctx)
            .await;
        let verification = self
            .verify_recovery_effectiveness(&pre.startup, &pre.comprehensive, &recovery, ctx)
            .await;

        let changed = recovery
            .recovery_steps
            .iter()
            .any(|s| s.success || !s.changes_made.is_empty());
        if changed {
            self.cache.reset(target).await;
        }

        let mut recommendations: Vec<String> = Vec::new();
        for line in recovery
            .recommendations
            .iter()
            .chain(verification.recommendations.iter())
        {
            if !recommendations.contains(line) {
                recommendations.push(line.clone());
            }
        }

        METRICS.flush();
        Ok(PipelineReport {
            target_id: target.clone(),
            pre_validation: pre,
            recovery: Some(recovery),
            verification: Some(verification),
            recommendations,
        })
    }

    pub fn get_recovery_history(&self) -> Vec<RecoveryResult> {
        self.orchestrator.history()
    }

    pub fn is_emergency_mode(&self) -> bool {
        self.orchestrator.is_emergency_mode()
    }

    pub fn reset_emergency_mode(&self) {
        self.orchestrator.reset_emergency_mode();
    }

    pub async fn reset_validation_cache(&self, target: &TargetId) -> bool {
        self.cache.reset(target).await
    }

    pub async fn get_startup_diagnostics(&self, target: &TargetId) -> StartupDiagnostics {
        let cached_validation = self.cache.get(target).await.as_ref().map(ValidationSummary::from);
        let history: Vec<RecoveryResult> = self
            .orchestrator
            .history()
            .into_iter()
            .filter(|r| &r.target_id == target)
            .collect();

        StartupDiagnostics {
            target_id: target.clone(),
            cached_validation,
            emergency_mode: self.is_emergency_mode(),
            recovery_attempts: history.len(),
            last_recovery_status: history.last().map(|r| r.overall_status),
            categories: self
                .registry
                .processing_order()
                .into_iter()
                .map(|c| CategorySummary {
                    name: c.name,
                    recovery_priority: c.recovery_priority,
                    strategies: c.recovery_strategies.len(),
                    fallbacks: c.fallback_strategies.len(),
                })
                .collect(),
        }
    }
}
