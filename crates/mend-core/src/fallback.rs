//! Fallback cascade for categories whose primary strategies all failed.
//!
//! For each such category the declared fallbacks are tried in order until one
//! succeeds. Successful fallbacks are reported as `"<category>: <fallback>"`
//! descriptors. Applying more distinct fallbacks than the configured
//! threshold puts the run into emergency mode.

use std::collections::BTreeSet;

use crate::config::RecoveryConfig;
use crate::domain::{CategoryName, Issue, RecoveryContext, RecoveryStep, Result, StepKind};
use crate::handlers::HandlerTable;
use crate::metrics::METRICS;
use crate::obs;
use crate::orchestrator::run_strategy;
use crate::registry::CategoryRegistry;

/// Marker appended to `fallbacks_applied` when emergency mode activates.
pub const EMERGENCY_MARKER: &str = "emergency_mode_activated";

/// Where a category stands after its primary strategies ran.
#[derive(Debug, Clone)]
pub struct CategoryProgress {
    pub category: CategoryName,
    pub issues: Vec<Issue>,
    pub primary_succeeded: bool,
}

/// Steps and descriptors produced by one cascade.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeOutcome {
    pub steps: Vec<RecoveryStep>,
    pub fallbacks_applied: Vec<String>,
    pub emergency_mode: bool,
}

impl CascadeOutcome {
    /// Number of distinct fallback descriptors, excluding the emergency marker.
    pub fn distinct_fallbacks(&self) -> usize {
        count_distinct_fallbacks(&self.fallbacks_applied)
    }
}

pub fn count_distinct_fallbacks(fallbacks_applied: &[String]) -> usize {
    fallbacks_applied
        .iter()
        .filter(|f| f.as_str() != EMERGENCY_MARKER)
        .collect::<BTreeSet<_>>()
        .len()
}

pub fn fallback_descriptor(category: CategoryName, fallback: &str) -> String {
    format!("{category}: {fallback}")
}

pub struct FallbackCascade<'a> {
    registry: &'a CategoryRegistry,
    handlers: &'a HandlerTable,
    config: &'a RecoveryConfig,
}

impl<'a> FallbackCascade<'a> {
    pub fn new(
        registry: &'a CategoryRegistry,
        handlers: &'a HandlerTable,
        config: &'a RecoveryConfig,
    ) -> Self {
        Self {
            registry,
            handlers,
            config,
        }
    }

    /// Run fallbacks for every category in `progress` without a primary success.
    ///
    /// `progress` is expected in processing order; the cascade preserves it.
    pub async fn run(
        &self,
        progress: &[CategoryProgress],
        ctx: &RecoveryContext,
    ) -> Result<CascadeOutcome> {
        let mut outcome = CascadeOutcome::default();

        for entry in progress.iter().filter(|p| !p.primary_succeeded) {
            let category = self.registry.require(entry.category)?;

            for fallback in &category.fallback_strategies {
                let (mut step, _) = run_strategy(
                    self.handlers,
                    entry.category,
                    fallback,
                    StepKind::Fallback,
                    &entry.issues,
                    ctx,
                )
                .await?;
                step.duration_ms = self.config.fallback_duration_ms;
                let success = step.success;
                outcome.steps.push(step);

                if success {
                    METRICS.inc_fallbacks();
                    obs::emit_fallback_applied(entry.category, fallback);
                    let descriptor = fallback_descriptor(entry.category, fallback);
                    if !outcome.fallbacks_applied.contains(&descriptor) {
                        outcome.fallbacks_applied.push(descriptor);
                    }
                    break;
                }
            }
        }

        if outcome.distinct_fallbacks() > self.config.emergency_fallback_threshold {
            outcome.emergency_mode = true;
            outcome.fallbacks_applied.push(EMERGENCY_MARKER.to_string());
        }

        Ok(outcome)
    }
}
