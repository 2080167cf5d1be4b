//! Recovery orchestrator.
//!
//! Classifies the issues of a failed validation, runs every declared repair
//! strategy for each affected category in priority order, hands categories
//! that saw no success to the [`FallbackCascade`], re-validates, and grades
//! the run.
//!
//! Errors are contained at two levels. A handler error becomes a failed
//! [`RecoveryStep`] and the run continues. Anything else that goes wrong
//! (an unregistered category, a missing handler, a failing validation stack)
//! aborts the run and is turned into [`RecoveryResult::emergency`] by
//! [`RecoveryOrchestrator::recover`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::classifier::IssueClassifier;
use crate::collaborators::ValidationStack;
use crate::config::RecoveryConfig;
use crate::domain::{
    overall_success, percentage, total_issues, CategoryName, ComprehensiveValidation, Issue,
    RecoveryContext, RecoveryResult, RecoveryStatus, RecoveryStep, RecoveryVerification, Result,
    StartupValidation, StepKind,
};
use crate::fallback::{CategoryProgress, FallbackCascade};
use crate::handlers::{HandlerTable, StrategyContext};
use crate::metrics::METRICS;
use crate::obs;
use crate::registry::CategoryRegistry;

/// Dispatch one strategy through the handler table and record it as a step.
///
/// Returns the step and the number of issues the attempt claims to have
/// resolved (the outcome's own count, else the bucket size on success).
pub(crate) async fn run_strategy(
    handlers: &HandlerTable,
    category: CategoryName,
    strategy: &str,
    kind: StepKind,
    issues: &[Issue],
    ctx: &RecoveryContext,
) -> Result<(RecoveryStep, usize)> {
    let handler = handlers.require(category, strategy)?;
    let strategy_ctx = StrategyContext {
        category,
        strategy: strategy.to_string(),
        kind,
        issues: issues.to_vec(),
        recovery: ctx.clone(),
    };

    let started = Instant::now();
    let applied = handler.apply(&strategy_ctx).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let (step, resolved) = match applied {
        Ok(outcome) => {
            let resolved = outcome
                .issues_resolved
                .unwrap_or(if outcome.success { issues.len() } else { 0 });
            (
                RecoveryStep::from_outcome(category, strategy, kind, duration_ms, outcome),
                resolved,
            )
        }
        Err(e) => (
            RecoveryStep::from_error(category, strategy, kind, duration_ms, &format!("{e:#}")),
            0,
        ),
    };

    METRICS.inc_steps();
    obs::emit_step_recorded(category, strategy, kind == StepKind::Fallback, step.success);
    Ok((step, resolved))
}

/// Grade a run. Returns the status and the success flag.
pub fn determine_status(
    total_issues: usize,
    recovered_issues: usize,
    overall_improved: bool,
    fallbacks_applied: bool,
    config: &RecoveryConfig,
) -> (RecoveryStatus, bool) {
    if total_issues == 0 {
        return (RecoveryStatus::NoIssues, true);
    }
    let pct = percentage(recovered_issues, total_issues);
    if pct >= config.recovered_threshold && overall_improved {
        (RecoveryStatus::Recovered, true)
    } else if pct >= config.partial_threshold || overall_improved {
        (RecoveryStatus::Partial, true)
    } else if fallbacks_applied {
        (RecoveryStatus::Fallback, true)
    } else {
        (RecoveryStatus::Failed, false)
    }
}

#[derive(Debug, Default)]
struct OrchestratorState {
    history: Vec<RecoveryResult>,
    emergency_mode: bool,
}

/// Drives recovery runs and remembers their results.
pub struct RecoveryOrchestrator {
    registry: Arc<CategoryRegistry>,
    classifier: IssueClassifier,
    handlers: HandlerTable,
    stack: ValidationStack,
    config: RecoveryConfig,
    state: Mutex<OrchestratorState>,
}

impl RecoveryOrchestrator {
    pub fn new(
        registry: Arc<CategoryRegistry>,
        classifier: IssueClassifier,
        handlers: HandlerTable,
        stack: ValidationStack,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            registry,
            classifier,
            handlers,
            stack,
            config,
            state: Mutex::new(OrchestratorState::default()),
        }
    }

    /// Run one recovery. Never fails: pipeline errors yield an emergency result.
    #[instrument(skip_all, fields(target = %ctx.target_id))]
    pub async fn recover(
        &self,
        pre_validation: &StartupValidation,
        pre_comprehensive: &ComprehensiveValidation,
        ctx: &RecoveryContext,
    ) -> RecoveryResult {
        let started_at = Utc::now();
        let started = Instant::now();
        METRICS.inc_recoveries();

        let result = match self
            .run(pre_validation, pre_comprehensive, ctx, started_at, started)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                obs::emit_pipeline_error("recovery", ctx.target_id.as_str(), &e);
                RecoveryResult::emergency(
                    ctx.target_id.clone(),
                    started_at,
                    started.elapsed().as_millis() as u64,
                    total_issues(pre_validation, pre_comprehensive),
                    &e,
                )
            }
        };

        obs::emit_recovery_finished(
            ctx.target_id.as_str(),
            result.overall_status,
            result.recovered_issues,
            result.total_issues,
            result.duration_ms,
        );

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if result.emergency_mode {
            state.emergency_mode = true;
            METRICS.inc_emergencies();
            obs::emit_emergency_activated(
                ctx.target_id.as_str(),
                crate::fallback::count_distinct_fallbacks(&result.fallbacks_applied),
            );
        }
        state.history.push(result.clone());
        result
    }

    async fn run(
        &self,
        pre_validation: &StartupValidation,
        pre_comprehensive: &ComprehensiveValidation,
        ctx: &RecoveryContext,
        started_at: DateTime<Utc>,
        started: Instant,
    ) -> Result<RecoveryResult> {
        let buckets = self
            .classifier
            .partition(pre_validation.issues.iter().chain(pre_comprehensive.issues()));
        for category in buckets.keys() {
            self.registry.require(*category)?;
        }
        let total: usize = buckets.values().map(Vec::len).sum();
        obs::emit_recovery_started(ctx.target_id.as_str(), total, buckets.len());

        if total == 0 {
            return Ok(RecoveryResult {
                run_id: Uuid::new_v4(),
                target_id: ctx.target_id.clone(),
                success: true,
                overall_status: RecoveryStatus::NoIssues,
                total_issues: 0,
                recovered_issues: 0,
                remaining_issues: 0,
                recovery_steps: Vec::new(),
                fallbacks_applied: Vec::new(),
                verification_results: RecoveryVerification::default(),
                duration_ms: started.elapsed().as_millis() as u64,
                recommendations: vec!["No issues detected; no recovery needed".to_string()],
                emergency_mode: false,
                started_at,
            });
        }

        let mut steps = Vec::new();
        let mut progress = Vec::new();
        let mut recovered = 0usize;

        for category in self.registry.processing_order() {
            let Some(bucket) = buckets.get(&category.name) else {
                continue;
            };
            info!(category = %category.name, issues = bucket.len(), "recovering category");

            let mut resolved = 0usize;
            let mut any_success = false;
            for strategy in &category.recovery_strategies {
                let (step, claimed) = run_strategy(
                    &self.handlers,
                    category.name,
                    strategy,
                    StepKind::Primary,
                    bucket,
                    ctx,
                )
                .await?;
                any_success |= step.success;
                resolved += claimed;
                steps.push(step);
            }

            recovered += resolved.min(bucket.len());
            progress.push(CategoryProgress {
                category: category.name,
                issues: bucket.clone(),
                primary_succeeded: any_success,
            });
        }

        let cascade = FallbackCascade::new(&self.registry, &self.handlers, &self.config)
            .run(&progress, ctx)
            .await?;
        steps.extend(cascade.steps.iter().cloned());

        let verification = self
            .verify_improvement(pre_validation, pre_comprehensive, ctx)
            .await?;

        let (status, success) = determine_status(
            total,
            recovered,
            verification.overall_validation_improved,
            cascade.distinct_fallbacks() > 0,
            &self.config,
        );

        let unrecovered: Vec<CategoryName> = progress
            .iter()
            .map(|p| p.category)
            .filter(|c| !steps.iter().any(|s| s.category == *c && s.success))
            .collect();

        let recommendations = recommendations(
            total,
            recovered,
            &unrecovered,
            &verification,
            cascade.emergency_mode,
            cascade.distinct_fallbacks(),
            &self.config,
        );

        Ok(RecoveryResult {
            run_id: Uuid::new_v4(),
            target_id: ctx.target_id.clone(),
            success,
            overall_status: status,
            total_issues: total,
            recovered_issues: recovered,
            remaining_issues: total - recovered,
            recovery_steps: steps,
            fallbacks_applied: cascade.fallbacks_applied,
            verification_results: verification,
            duration_ms: started.elapsed().as_millis() as u64,
            recommendations,
            emergency_mode: cascade.emergency_mode,
            started_at,
        })
    }

    /// Re-run the whole validation stack, bypassing any cache.
    async fn verify_improvement(
        &self,
        pre_validation: &StartupValidation,
        pre_comprehensive: &ComprehensiveValidation,
        ctx: &RecoveryContext,
    ) -> Result<RecoveryVerification> {
        let post = self.stack.run(&ctx.target_id).await?;
        Ok(RecoveryVerification {
            performed: true,
            domain_consistency_improved: !pre_validation.domain_consistent
                && post.startup.domain_consistent,
            registration_improved: !pre_validation.registration_available
                && post.startup.registration_available,
            overall_validation_improved: !overall_success(pre_validation, pre_comprehensive)
                && post.success(),
            issues_before: total_issues(pre_validation, pre_comprehensive),
            issues_after: post.issue_count(),
        })
    }

    /// All results so far, oldest first.
    pub fn history(&self) -> Vec<RecoveryResult> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .clone()
    }

    pub fn last_result(&self) -> Option<RecoveryResult> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .last()
            .cloned()
    }

    pub fn is_emergency_mode(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emergency_mode
    }

    pub fn reset_emergency_mode(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emergency_mode = false;
        info!("emergency mode reset");
    }
}

fn recommendations(
    total: usize,
    recovered: usize,
    unrecovered: &[CategoryName],
    verification: &RecoveryVerification,
    emergency_mode: bool,
    distinct_fallbacks: usize,
    config: &RecoveryConfig,
) -> Vec<String> {
    let mut lines = Vec::new();

    if percentage(recovered, total) >= config.recovered_threshold {
        lines.push(format!(
            "Recovery mostly successful: {recovered} of {total} issues resolved"
        ));
    } else {
        lines.push(format!(
            "Recovery had limited success: {recovered} of {total} issues resolved"
        ));
    }

    for category in unrecovered {
        lines.push(format!(
            "Manual review required for {category}: no strategy succeeded"
        ));
    }

    if verification.performed && !verification.overall_validation_improved {
        lines.push(
            "Validation shows no overall improvement; review the target manually and restart the host"
                .to_string(),
        );
    }

    if emergency_mode {
        lines.push(format!(
            "Emergency mode active: {distinct_fallbacks} fallbacks were applied and functionality may be reduced"
        ));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_no_issues() {
        let cfg = RecoveryConfig::default();
        assert_eq!(determine_status(0, 0, false, false, &cfg), (RecoveryStatus::NoIssues, true));
    }

    #[test]
    fn test_status_recovered_requires_overall_improvement() {
        let cfg = RecoveryConfig::default();
        assert_eq!(determine_status(4, 4, true, false, &cfg), (RecoveryStatus::Recovered, true));
        assert_eq!(determine_status(4, 4, false, false, &cfg), (RecoveryStatus::Partial, true));
    }

    #[test]
    fn test_status_partial_on_improvement_alone() {
        let cfg = RecoveryConfig::default();
        assert_eq!(determine_status(4, 0, true, false, &cfg), (RecoveryStatus::Partial, true));
        assert_eq!(determine_status(4, 2, false, false, &cfg), (RecoveryStatus::Partial, true));
    }

    #[test]
    fn test_status_fallback_then_failed() {
        let cfg = RecoveryConfig::default();
        assert_eq!(determine_status(4, 1, false, true, &cfg), (RecoveryStatus::Fallback, true));
        assert_eq!(determine_status(4, 1, false, false, &cfg), (RecoveryStatus::Failed, false));
    }

    #[test]
    fn test_status_uses_configured_thresholds() {
        let cfg = RecoveryConfig {
            recovered_threshold: 75.0,
            partial_threshold: 25.0,
            ..Default::default()
        };
        assert_eq!(determine_status(4, 3, true, false, &cfg), (RecoveryStatus::Recovered, true));
        assert_eq!(determine_status(4, 1, false, false, &cfg), (RecoveryStatus::Partial, true));
    }

    #[test]
    fn test_recommendations_cover_failures_and_emergency() {
        let cfg = RecoveryConfig::default();
        let verification = RecoveryVerification {
            performed: true,
            ..Default::default()
        };
        let lines = recommendations(
            3,
            0,
            &[CategoryName::Registration],
            &verification,
            true,
            3,
            &cfg,
        );
        assert!(lines[0].starts_with("Recovery had limited success"));
        assert!(lines.iter().any(|l| l.contains("Manual review required for registration")));
        assert!(lines.iter().any(|l| l.contains("restart")));
        assert!(lines.iter().any(|l| l.starts_with("Emergency mode active")));
    }

    #[test]
    fn test_recommendations_for_clean_recovery() {
        let cfg = RecoveryConfig::default();
        let verification = RecoveryVerification {
            performed: true,
            overall_validation_improved: true,
            ..Default::default()
        };
        let lines = recommendations(2, 2, &[], &verification, false, 0, &cfg);
        assert_eq!(lines, vec!["Recovery mostly successful: 2 of 2 issues resolved"]);
    }
}
