//! Post-recovery verification battery.
//!
//! Ten checks run one after another in descending priority. A check that
//! errors is recorded as a failed test and the battery carries on. The
//! verdict combines the pass rate with how much a fresh re-validation
//! improved on the snapshot taken before recovery.

use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use serde_json::{json, Map, Value};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::collaborators::{HostProbe, ValidationStack};
use crate::config::VerificationConfig;
use crate::domain::{
    overall_success, percentage, total_issues, total_warnings, CategoryName, CheckKind,
    CheckReport, ComprehensiveValidation, ImprovementMetrics, RecoveryContext, RecoveryResult,
    Result, StartupValidation, TargetId, ValidationSnapshot, VerificationResult,
    VerificationStatus, VerificationTest,
};
use crate::fallback::count_distinct_fallbacks;
use crate::metrics::METRICS;
use crate::obs;

/// Fallback count above which verification suggests a configuration review.
const MANY_FALLBACKS: usize = 2;

/// One entry of the verification battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationCheck {
    DomainConsistency,
    RegistrationAvailability,
    EntryPointInstantiable,
    SchemaValidity,
    TargetLoaded,
    DependencyResolution,
    ServicesRegistered,
    FilesystemIntegrity,
    VersionCompatibility,
    EndToEndValidation,
}

impl VerificationCheck {
    pub const ALL: [VerificationCheck; 10] = [
        VerificationCheck::DomainConsistency,
        VerificationCheck::RegistrationAvailability,
        VerificationCheck::EntryPointInstantiable,
        VerificationCheck::SchemaValidity,
        VerificationCheck::TargetLoaded,
        VerificationCheck::DependencyResolution,
        VerificationCheck::ServicesRegistered,
        VerificationCheck::FilesystemIntegrity,
        VerificationCheck::VersionCompatibility,
        VerificationCheck::EndToEndValidation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VerificationCheck::DomainConsistency => "domain_consistency",
            VerificationCheck::RegistrationAvailability => "registration_availability",
            VerificationCheck::EntryPointInstantiable => "entry_point_instantiable",
            VerificationCheck::SchemaValidity => "schema_validity",
            VerificationCheck::TargetLoaded => "target_loaded",
            VerificationCheck::DependencyResolution => "dependency_resolution",
            VerificationCheck::ServicesRegistered => "services_registered",
            VerificationCheck::FilesystemIntegrity => "filesystem_integrity",
            VerificationCheck::VersionCompatibility => "version_compatibility",
            VerificationCheck::EndToEndValidation => "end_to_end_validation",
        }
    }

    pub fn category(&self) -> CategoryName {
        match self {
            VerificationCheck::DomainConsistency => CategoryName::DomainConsistency,
            VerificationCheck::RegistrationAvailability
            | VerificationCheck::EntryPointInstantiable
            | VerificationCheck::TargetLoaded
            | VerificationCheck::ServicesRegistered => CategoryName::Registration,
            VerificationCheck::SchemaValidity | VerificationCheck::EndToEndValidation => {
                CategoryName::SchemaValidation
            }
            VerificationCheck::DependencyResolution => CategoryName::DependencyResolution,
            VerificationCheck::FilesystemIntegrity => CategoryName::Filesystem,
            VerificationCheck::VersionCompatibility => CategoryName::VersionCompatibility,
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            VerificationCheck::DomainConsistency => 10,
            VerificationCheck::RegistrationAvailability
            | VerificationCheck::EntryPointInstantiable => 9,
            VerificationCheck::SchemaValidity | VerificationCheck::TargetLoaded => 8,
            VerificationCheck::DependencyResolution | VerificationCheck::ServicesRegistered => 7,
            VerificationCheck::FilesystemIntegrity => 6,
            VerificationCheck::VersionCompatibility => 5,
            VerificationCheck::EndToEndValidation => 4,
        }
    }

    /// What to do when this check fails.
    pub fn remediation(&self) -> &'static str {
        match self {
            VerificationCheck::DomainConsistency => {
                "align the domain declared in code with the manifest"
            }
            VerificationCheck::RegistrationAvailability => {
                "make sure the target registers its setup entry point"
            }
            VerificationCheck::EntryPointInstantiable => {
                "fix the entry-point class so the host can construct it"
            }
            VerificationCheck::SchemaValidity => "repair the manifest so it passes schema validation",
            VerificationCheck::TargetLoaded => "restart the host so the target is loaded",
            VerificationCheck::DependencyResolution => "install or pin the missing dependencies",
            VerificationCheck::ServicesRegistered => "register every expected service",
            VerificationCheck::FilesystemIntegrity => "restore missing or unreadable files",
            VerificationCheck::VersionCompatibility => {
                "update version constraints to match the host"
            }
            VerificationCheck::EndToEndValidation => {
                "re-run the full validation and review the remaining issues"
            }
        }
    }

    fn checker_kind(&self) -> Option<CheckKind> {
        match self {
            VerificationCheck::DomainConsistency => Some(CheckKind::DomainConsistency),
            VerificationCheck::SchemaValidity => Some(CheckKind::Schema),
            VerificationCheck::DependencyResolution => Some(CheckKind::Dependency),
            VerificationCheck::FilesystemIntegrity => Some(CheckKind::Filesystem),
            VerificationCheck::VersionCompatibility => Some(CheckKind::Version),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// The battery in execution order: descending priority, ties in declaration order.
pub fn battery() -> Vec<VerificationCheck> {
    let mut checks = VerificationCheck::ALL.to_vec();
    checks.sort_by(|a, b| b.priority().cmp(&a.priority()));
    checks
}

/// What one check found.
#[derive(Debug, Clone, Default)]
struct CheckFinding {
    success: bool,
    details: Map<String, Value>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl CheckFinding {
    fn from_report(report: CheckReport) -> Self {
        Self {
            success: report.passed,
            errors: report.issues.into_iter().map(|i| i.description).collect(),
            warnings: report.warnings,
            details: report.details,
        }
    }

    fn flag(key: &str, value: bool, failure: &str) -> Self {
        let mut details = Map::new();
        details.insert(key.to_string(), Value::Bool(value));
        Self {
            success: value,
            details,
            errors: if value { Vec::new() } else { vec![failure.to_string()] },
            warnings: Vec::new(),
        }
    }
}

pub struct VerificationEngine {
    stack: ValidationStack,
    probe: Arc<dyn HostProbe>,
    config: VerificationConfig,
}

impl VerificationEngine {
    pub fn new(stack: ValidationStack, probe: Arc<dyn HostProbe>, config: VerificationConfig) -> Self {
        Self {
            stack,
            probe,
            config,
        }
    }

    /// Run the battery and grade the recovery. Never fails: a pipeline
    /// error yields [`VerificationResult::error`].
    #[instrument(skip_all, fields(target = %ctx.target_id))]
    pub async fn verify(
        &self,
        pre_validation: &StartupValidation,
        pre_comprehensive: &ComprehensiveValidation,
        recovery: &RecoveryResult,
        ctx: &RecoveryContext,
    ) -> VerificationResult {
        let started = Instant::now();
        METRICS.inc_verifications();

        let result = match self
            .run(pre_validation, pre_comprehensive, recovery, ctx, started)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                obs::emit_pipeline_error("verification", ctx.target_id.as_str(), &e);
                VerificationResult::error(started.elapsed().as_millis() as u64, &e)
            }
        };

        obs::emit_verification_finished(
            ctx.target_id.as_str(),
            result.overall_status,
            result.pass_percentage(),
            result.tests_run,
        );
        result
    }

    async fn run(
        &self,
        pre_validation: &StartupValidation,
        pre_comprehensive: &ComprehensiveValidation,
        recovery: &RecoveryResult,
        ctx: &RecoveryContext,
        started: Instant,
    ) -> Result<VerificationResult> {
        let mut tests = Vec::new();
        for check in battery() {
            tests.push(self.run_check(check, ctx).await);
        }

        let post = self.stack.run(&ctx.target_id).await?;
        let metrics = improvement_metrics(pre_validation, pre_comprehensive, &post, recovery);

        let tests_run = tests.len();
        let tests_passed = tests.iter().filter(|t| t.success).count();
        let (status, success) = determine_status(tests_run, tests_passed, &metrics, &self.config);
        let recommendations =
            recommendations(status, &tests, tests_passed, &metrics, recovery, &self.config);

        Ok(VerificationResult {
            success,
            overall_status: status,
            tests_run,
            tests_passed,
            tests_failed: tests_run - tests_passed,
            verification_tests: tests,
            improvement_metrics: metrics,
            recommendations,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn run_check(&self, check: VerificationCheck, ctx: &RecoveryContext) -> VerificationTest {
        let started = Instant::now();
        let finding = match self.evaluate(check, ctx).await {
            Ok(finding) => finding,
            Err(e) => {
                warn!(test = check.name(), error = %e, "verification check errored");
                CheckFinding {
                    success: false,
                    errors: vec![format!("{} check failed: {e:#}", check.name())],
                    ..Default::default()
                }
            }
        };

        VerificationTest {
            test_id: test_id(&ctx.target_id, check),
            name: check.name().to_string(),
            category: check.category(),
            priority: check.priority(),
            success: finding.success,
            duration_ms: started.elapsed().as_millis() as u64,
            details: finding.details,
            errors: finding.errors,
            warnings: finding.warnings,
        }
    }

    async fn evaluate(
        &self,
        check: VerificationCheck,
        ctx: &RecoveryContext,
    ) -> anyhow::Result<CheckFinding> {
        let target = &ctx.target_id;

        if let Some(kind) = check.checker_kind() {
            let checker = self
                .stack
                .checker(kind)
                .ok_or_else(|| anyhow!("no {kind} checker configured"))?;
            let report = checker.validate(target).await?;
            return Ok(CheckFinding::from_report(report));
        }

        match check {
            VerificationCheck::RegistrationAvailability => {
                let startup = self.stack.run_startup(target).await?;
                let mut finding = CheckFinding::flag(
                    "registration_available",
                    startup.registration_available,
                    "setup entry point is not registered",
                );
                finding
                    .details
                    .insert("domain_consistent".to_string(), Value::Bool(startup.domain_consistent));
                finding.warnings = startup.warnings;
                Ok(finding)
            }
            VerificationCheck::EntryPointInstantiable => {
                let ok = self.probe.entry_point_instantiable(target).await?;
                Ok(CheckFinding::flag(
                    "instantiable",
                    ok,
                    "entry-point class could not be instantiated",
                ))
            }
            VerificationCheck::TargetLoaded => {
                let ok = self.probe.is_loaded(target).await?;
                Ok(CheckFinding::flag("loaded", ok, "target is not loaded by the host"))
            }
            VerificationCheck::ServicesRegistered => {
                let registered = self.probe.registered_services(target).await?;
                Ok(services_finding(self.expected_services(ctx), &registered))
            }
            VerificationCheck::EndToEndValidation => {
                let snapshot = self.stack.run(target).await?;
                let mut details = Map::new();
                details.insert("issues".to_string(), json!(snapshot.issue_count()));
                details.insert("warnings".to_string(), json!(snapshot.warning_count()));
                let findings: Vec<String> = snapshot
                    .startup
                    .issues
                    .iter()
                    .chain(snapshot.comprehensive.issues())
                    .map(|i| i.description.clone())
                    .collect();
                // Leftover issues on a passing stack are reported as warnings.
                let (errors, warnings) = if snapshot.success() {
                    (Vec::new(), findings)
                } else {
                    (findings, Vec::new())
                };
                Ok(CheckFinding {
                    success: snapshot.success(),
                    details,
                    errors,
                    warnings,
                })
            }
            _ => Err(anyhow!("{} has no evaluator", check.name())),
        }
    }

    fn expected_services<'a>(&'a self, ctx: &'a RecoveryContext) -> &'a [String] {
        if ctx.expected_services.is_empty() {
            &self.config.expected_services
        } else {
            &ctx.expected_services
        }
    }
}

fn services_finding(expected: &[String], registered: &[String]) -> CheckFinding {
    let missing: Vec<String> = expected
        .iter()
        .filter(|s| !registered.contains(s))
        .cloned()
        .collect();

    let mut details = Map::new();
    details.insert("expected".to_string(), json!(expected));
    details.insert("registered".to_string(), json!(registered));
    details.insert("missing".to_string(), json!(missing));

    CheckFinding {
        success: missing.is_empty(),
        details,
        errors: missing
            .iter()
            .map(|s| format!("service {s} is not registered"))
            .collect(),
        warnings: if expected.is_empty() {
            vec!["no expected services configured".to_string()]
        } else {
            Vec::new()
        },
    }
}

/// Stable id of one check on one target, so repeated runs compare equal.
fn test_id(target: &TargetId, check: VerificationCheck) -> Uuid {
    let key = format!("{}/{}", target.as_str(), check.name());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

/// Compare the pre-recovery snapshot with a fresh re-validation.
pub fn improvement_metrics(
    pre_validation: &StartupValidation,
    pre_comprehensive: &ComprehensiveValidation,
    post: &ValidationSnapshot,
    recovery: &RecoveryResult,
) -> ImprovementMetrics {
    let issues_before = total_issues(pre_validation, pre_comprehensive);
    let issues_after = post.issue_count();
    let issues_resolved = issues_before.saturating_sub(issues_after);

    let warnings_before = total_warnings(pre_validation, pre_comprehensive);
    let warnings_after = post.warning_count();
    let warnings_resolved = warnings_before.saturating_sub(warnings_after);

    let improved = |before: bool, after: bool| !before && after;

    ImprovementMetrics {
        issues_before,
        issues_after,
        issues_resolved,
        issues_improvement_percentage: percentage(issues_resolved, issues_before),
        warnings_before,
        warnings_after,
        warnings_resolved,
        warnings_improvement_percentage: percentage(warnings_resolved, warnings_before),
        domain_consistency_improved: improved(
            pre_validation.domain_consistent,
            post.startup.domain_consistent,
        ),
        registration_availability_improved: improved(
            pre_validation.registration_available,
            post.startup.registration_available,
        ),
        schema_validity_improved: check_improved(
            pre_comprehensive,
            &post.comprehensive,
            CheckKind::Schema,
        ),
        dependency_validity_improved: check_improved(
            pre_comprehensive,
            &post.comprehensive,
            CheckKind::Dependency,
        ),
        overall_validation_improved: improved(
            overall_success(pre_validation, pre_comprehensive),
            post.success(),
        ),
        recovery_duration_ms: recovery.duration_ms,
        recovery_success_rate: recovery.success_rate(),
    }
}

/// A check improved only if it reported a failure before and a pass after.
/// A check missing from either snapshot never counts.
fn check_improved(
    before: &ComprehensiveValidation,
    after: &ComprehensiveValidation,
    kind: CheckKind,
) -> bool {
    matches!(
        (before.report(kind).map(|r| r.passed), after.report(kind).map(|r| r.passed)),
        (Some(false), Some(true))
    )
}

/// Grade a battery. Returns the status and the success flag.
pub fn determine_status(
    tests_run: usize,
    tests_passed: usize,
    metrics: &ImprovementMetrics,
    config: &VerificationConfig,
) -> (VerificationStatus, bool) {
    if tests_run == 0 {
        return (VerificationStatus::NoTests, false);
    }
    let pass = percentage(tests_passed, tests_run);
    let significant = metrics.is_significant(config.significant_improvement_threshold);

    if pass >= config.verified_threshold && significant {
        (VerificationStatus::Verified, true)
    } else if pass >= config.partial_threshold || significant {
        (VerificationStatus::Partial, true)
    } else if pass >= config.limited_threshold {
        (VerificationStatus::Limited, true)
    } else {
        (VerificationStatus::Failed, false)
    }
}

fn recommendations(
    status: VerificationStatus,
    tests: &[VerificationTest],
    tests_passed: usize,
    metrics: &ImprovementMetrics,
    recovery: &RecoveryResult,
    config: &VerificationConfig,
) -> Vec<String> {
    let run = tests.len();
    let mut lines = vec![match status {
        VerificationStatus::Verified => {
            format!("Recovery verified: {tests_passed} of {run} verification tests passed")
        }
        VerificationStatus::Partial => {
            format!("Recovery partially verified: {tests_passed} of {run} verification tests passed")
        }
        VerificationStatus::Limited => format!(
            "Recovery verification limited: only {tests_passed} of {run} verification tests passed"
        ),
        VerificationStatus::Failed => format!(
            "Recovery could not be verified: {tests_passed} of {run} verification tests passed"
        ),
        VerificationStatus::NoTests => "No verification tests were run".to_string(),
        VerificationStatus::Error => "Verification did not complete".to_string(),
    }];

    for test in tests
        .iter()
        .filter(|t| !t.success && t.priority >= config.high_priority_threshold)
    {
        let remediation = VerificationCheck::from_name(&test.name)
            .map(|c| c.remediation())
            .unwrap_or("investigate the failure");
        lines.push(format!(
            "High-priority test {} failed (priority {}): {remediation}",
            test.name, test.priority
        ));
    }

    let pct = metrics.issues_improvement_percentage;
    lines.push(if pct >= 80.0 {
        format!("Excellent improvement: {pct:.0}% of issues resolved")
    } else if pct >= 50.0 {
        format!("Good improvement: {pct:.0}% of issues resolved")
    } else if pct > 0.0 {
        format!("Limited improvement: {pct:.0}% of issues resolved; further manual fixes needed")
    } else {
        "No improvement in issue count; manual intervention required".to_string()
    });

    if recovery.emergency_mode {
        lines.push(
            "Target is running in emergency mode; plan a clean reinstall once it is stable"
                .to_string(),
        );
    }
    let fallbacks = count_distinct_fallbacks(&recovery.fallbacks_applied);
    if fallbacks > MANY_FALLBACKS {
        lines.push(format!(
            "{fallbacks} fallbacks were applied; review the target's configuration"
        ));
    }

    lines
}
