//! Structured observability hooks for pipeline lifecycle events.
//!
//! This module provides:
//! - Target-scoped tracing spans via the `PipelineSpan` RAII guard
//! - Emission functions for key lifecycle events: recovery start/finish,
//!   step recorded, fallback applied, emergency activation, verification finish
//!
//! Events are emitted at `info!` level unless noted (filter with `RUST_LOG`).

use tracing::{info, warn};

use crate::domain::{CategoryName, RecoveryStatus, VerificationStatus};

/// RAII guard that enters a target-scoped span for the duration of a pipeline run.
///
/// Only use this in synchronous code or around a whole runtime `block_on`;
/// async code should attach spans with `#[instrument]` instead.
pub struct PipelineSpan {
    _span: tracing::span::EnteredSpan,
}

impl PipelineSpan {
    /// Create and enter a span tagged with the target id.
    pub fn enter(target_id: &str) -> Self {
        let span = tracing::info_span!("mend.pipeline", target_id = %target_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: recovery started with the number of classified issues.
pub fn emit_recovery_started(target_id: &str, total_issues: usize, categories: usize) {
    info!(
        event = "recovery.started",
        target_id = %target_id,
        total_issues = total_issues,
        categories = categories,
    );
}

/// Emit event: one strategy attempt recorded.
pub fn emit_step_recorded(category: CategoryName, strategy: &str, fallback: bool, success: bool) {
    if success {
        info!(event = "recovery.step", category = %category, strategy = %strategy, fallback = fallback, success = success);
    } else {
        warn!(event = "recovery.step", category = %category, strategy = %strategy, fallback = fallback, success = success);
    }
}

/// Emit event: fallback applied for a category.
pub fn emit_fallback_applied(category: CategoryName, fallback: &str) {
    info!(event = "recovery.fallback_applied", category = %category, fallback = %fallback);
}

/// Emit event: emergency mode activated (warning level).
pub fn emit_emergency_activated(target_id: &str, fallbacks: usize) {
    warn!(event = "recovery.emergency", target_id = %target_id, fallbacks = fallbacks);
}

/// Emit event: recovery finished with status and counts.
pub fn emit_recovery_finished(
    target_id: &str,
    status: RecoveryStatus,
    recovered: usize,
    total: usize,
    duration_ms: u64,
) {
    info!(
        event = "recovery.finished",
        target_id = %target_id,
        status = %status,
        recovered = recovered,
        total = total,
        duration_ms = duration_ms,
    );
}

/// Emit event: pipeline-level failure converted to a degenerate result (warning level).
pub fn emit_pipeline_error(stage: &str, target_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "pipeline.error", stage = %stage, target_id = %target_id, error = %error);
}

/// Emit event: verification finished with pass rate and verdict.
pub fn emit_verification_finished(
    target_id: &str,
    status: VerificationStatus,
    pass_percentage: f64,
    tests_run: usize,
) {
    info!(
        event = "verification.finished",
        target_id = %target_id,
        status = %status,
        pass_percentage = pass_percentage,
        tests_run = tests_run,
    );
}
