//! Verification engine behaviour: battery, improvement metrics and verdicts.

use std::sync::Arc;

use chrono::Utc;
use mend_core::fakes::{ProbeState, ScriptedChecker, ScriptedHostProbe, ScriptedStartupValidator};
use mend_core::{
    CheckKind, ComprehensiveValidation, Issue, RecoveryContext, RecoveryResult, RecoveryStatus,
    RecoveryVerification, Severity, StartupValidation, TargetId, ValidationStack,
    VerificationConfig, VerificationEngine, VerificationResult, VerificationStatus,
    EMERGENCY_MARKER,
};
use uuid::Uuid;

fn issues(n: usize, severity: Severity) -> Vec<Issue> {
    (0..n)
        .map(|i| Issue::new("startup", format!("finding {i}"), severity))
        .collect()
}

/// Five issues, nothing healthy.
fn pre_validation() -> StartupValidation {
    StartupValidation {
        success: false,
        domain_consistent: false,
        registration_available: false,
        issues: issues(5, Severity::Error),
        warnings: vec![],
    }
}

/// Passing startup that still lists two informational findings.
fn post_startup() -> StartupValidation {
    StartupValidation {
        issues: issues(2, Severity::Info),
        ..StartupValidation::healthy()
    }
}

fn stack_with(startup: ScriptedStartupValidator, kinds: &[CheckKind]) -> ValidationStack {
    kinds
        .iter()
        .fold(ValidationStack::new(Arc::new(startup)), |stack, kind| {
            stack.with_checker(Arc::new(ScriptedChecker::passing(*kind)))
        })
}

fn recovery(emergency: bool, fallbacks: &[&str]) -> RecoveryResult {
    let mut fallbacks_applied: Vec<String> = fallbacks.iter().map(|f| f.to_string()).collect();
    if emergency {
        fallbacks_applied.push(EMERGENCY_MARKER.to_string());
    }
    RecoveryResult {
        run_id: Uuid::new_v4(),
        target_id: TargetId::new("roost"),
        success: true,
        overall_status: RecoveryStatus::Partial,
        total_issues: 5,
        recovered_issues: 3,
        remaining_issues: 2,
        recovery_steps: vec![],
        fallbacks_applied,
        verification_results: RecoveryVerification::default(),
        duration_ms: 42,
        recommendations: vec![],
        emergency_mode: emergency,
        started_at: Utc::now(),
    }
}

fn ctx() -> RecoveryContext {
    RecoveryContext::new(TargetId::new("roost")).with_expected_services(vec!["sensor".to_string()])
}

/// Everything passes except `target_loaded`.
fn engine_nine_of_ten() -> VerificationEngine {
    let probe = ScriptedHostProbe::new(ProbeState {
        loaded: false,
        entry_point_instantiable: true,
        registered_services: vec!["sensor".to_string()],
    });
    VerificationEngine::new(
        stack_with(ScriptedStartupValidator::sequence(vec![post_startup()]), &CheckKind::ALL),
        Arc::new(probe),
        VerificationConfig::default(),
    )
}

#[tokio::test]
async fn scenario_e_nine_of_ten_with_sixty_percent_improvement_is_verified() {
    let engine = engine_nine_of_ten();
    let result = engine
        .verify(
            &pre_validation(),
            &ComprehensiveValidation::default(),
            &recovery(false, &[]),
            &ctx(),
        )
        .await;

    assert_eq!(result.tests_run, 10);
    assert_eq!(result.tests_passed, 9);
    assert_eq!(result.tests_failed, 1);
    assert!(!result.test("target_loaded").expect("target_loaded").success);
    assert!((result.improvement_metrics.issues_improvement_percentage - 60.0).abs() < 1e-9);
    assert_eq!(result.overall_status, VerificationStatus::Verified);
    assert!(result.success);

    let metrics = &result.improvement_metrics;
    assert_eq!(metrics.issues_before, 5);
    assert_eq!(metrics.issues_after, 2);
    assert_eq!(metrics.issues_resolved, 3);
    assert!(metrics.domain_consistency_improved);
    assert!(metrics.registration_availability_improved);
    assert!(metrics.overall_validation_improved);
    // No checker reports in the "before" snapshot, so no per-check gains.
    assert!(!metrics.schema_validity_improved);
    assert!(!metrics.dependency_validity_improved);
    assert_eq!(metrics.recovery_duration_ms, 42);
    assert!((metrics.recovery_success_rate - 60.0).abs() < 1e-9);

    assert!(result
        .recommendations
        .iter()
        .any(|l| l.contains("target_loaded") && l.contains("restart the host")));
    assert!(result
        .recommendations
        .iter()
        .any(|l| l.starts_with("Good improvement")));
}

#[tokio::test]
async fn issue_count_improvement_alone_is_significant() {
    // Startup already passed with five warnings-level findings: none of the
    // boolean flags can flip, only the count drops from 5 to 2.
    let pre = StartupValidation {
        issues: issues(5, Severity::Warning),
        ..StartupValidation::healthy()
    };
    let result = engine_nine_of_ten()
        .verify(
            &pre,
            &ComprehensiveValidation::default(),
            &recovery(false, &[]),
            &ctx(),
        )
        .await;

    let metrics = &result.improvement_metrics;
    assert!(!metrics.domain_consistency_improved);
    assert!(!metrics.registration_availability_improved);
    assert!(!metrics.overall_validation_improved);
    assert!((metrics.issues_improvement_percentage - 60.0).abs() < 1e-9);
    assert_eq!(result.tests_passed, 9);
    assert_eq!(result.overall_status, VerificationStatus::Verified);
    assert!(result.success);
}

#[tokio::test]
async fn tests_run_in_descending_priority() {
    let result = engine_nine_of_ten()
        .verify(
            &pre_validation(),
            &ComprehensiveValidation::default(),
            &recovery(false, &[]),
            &ctx(),
        )
        .await;

    let priorities: Vec<u8> = result.verification_tests.iter().map(|t| t.priority).collect();
    assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(result.verification_tests[0].name, "domain_consistency");
    assert_eq!(
        result.verification_tests.last().map(|t| t.name.as_str()),
        Some("end_to_end_validation")
    );
}

/// Wall-clock timings are the only part of a result allowed to differ.
fn without_timings(mut result: VerificationResult) -> VerificationResult {
    result.duration_ms = 0;
    for test in &mut result.verification_tests {
        test.duration_ms = 0;
    }
    result
}

#[tokio::test]
async fn verification_is_idempotent_for_stable_collaborators() {
    let engine = engine_nine_of_ten();
    let pre = pre_validation();
    let comprehensive = ComprehensiveValidation::default();
    let rec = recovery(false, &[]);

    let first = engine.verify(&pre, &comprehensive, &rec, &ctx()).await;
    let second = engine.verify(&pre, &comprehensive, &rec, &ctx()).await;

    assert_eq!(without_timings(first), without_timings(second));
}

#[tokio::test]
async fn probe_errors_are_contained_per_test() {
    let engine = VerificationEngine::new(
        stack_with(ScriptedStartupValidator::healthy(), &CheckKind::ALL),
        Arc::new(ScriptedHostProbe::erroring("probe offline")),
        VerificationConfig::default(),
    );
    let result = engine
        .verify(
            &pre_validation(),
            &ComprehensiveValidation::default(),
            &recovery(false, &[]),
            &ctx(),
        )
        .await;

    assert_eq!(result.tests_run, 10);
    for name in ["entry_point_instantiable", "target_loaded", "services_registered"] {
        let test = result.test(name).expect(name);
        assert!(!test.success);
        assert!(test.errors[0].contains("probe offline"), "{name}: {:?}", test.errors);
    }
    assert_eq!(result.tests_passed, 7);
    // 70% pass rate, and the stack came back clean.
    assert_eq!(result.overall_status, VerificationStatus::Partial);
}

#[tokio::test]
async fn missing_checker_fails_its_test() {
    let kinds = [
        CheckKind::Schema,
        CheckKind::Dependency,
        CheckKind::Filesystem,
        CheckKind::DomainConsistency,
    ];
    let engine = VerificationEngine::new(
        stack_with(ScriptedStartupValidator::healthy(), &kinds),
        Arc::new(ScriptedHostProbe::healthy(&["sensor"])),
        VerificationConfig::default(),
    );
    let result = engine
        .verify(
            &pre_validation(),
            &ComprehensiveValidation::default(),
            &recovery(false, &[]),
            &ctx(),
        )
        .await;

    let version = result.test("version_compatibility").expect("version");
    assert!(!version.success);
    assert!(version.errors[0].contains("no version checker configured"));
    assert_eq!(result.tests_passed, 9);
}

#[tokio::test]
async fn stack_failure_yields_error_verdict() {
    let engine = VerificationEngine::new(
        stack_with(ScriptedStartupValidator::erroring("host gone"), &CheckKind::ALL),
        Arc::new(ScriptedHostProbe::healthy(&["sensor"])),
        VerificationConfig::default(),
    );
    let result = engine
        .verify(
            &pre_validation(),
            &ComprehensiveValidation::default(),
            &recovery(false, &[]),
            &ctx(),
        )
        .await;

    assert_eq!(result.overall_status, VerificationStatus::Error);
    assert!(!result.success);
    assert!(result.recommendations[0].contains("host gone"));
}

#[tokio::test]
async fn missing_services_fail_the_services_test() {
    let engine = VerificationEngine::new(
        stack_with(ScriptedStartupValidator::healthy(), &CheckKind::ALL),
        Arc::new(ScriptedHostProbe::healthy(&["sensor"])),
        VerificationConfig::default(),
    );
    let ctx = RecoveryContext::new(TargetId::new("roost"))
        .with_expected_services(vec!["sensor".to_string(), "light".to_string()]);
    let result = engine
        .verify(
            &pre_validation(),
            &ComprehensiveValidation::default(),
            &recovery(false, &[]),
            &ctx,
        )
        .await;

    let services = result.test("services_registered").expect("services");
    assert!(!services.success);
    assert_eq!(services.errors, vec!["service light is not registered"]);
}

#[tokio::test]
async fn configured_services_apply_when_context_names_none() {
    let engine = VerificationEngine::new(
        stack_with(ScriptedStartupValidator::healthy(), &CheckKind::ALL),
        Arc::new(ScriptedHostProbe::healthy(&["sensor"])),
        VerificationConfig {
            expected_services: vec!["climate".to_string()],
            ..Default::default()
        },
    );
    let result = engine
        .verify(
            &pre_validation(),
            &ComprehensiveValidation::default(),
            &recovery(false, &[]),
            &RecoveryContext::new(TargetId::new("roost")),
        )
        .await;

    assert!(!result.test("services_registered").expect("services").success);
}

#[tokio::test]
async fn emergency_and_fallback_notices() {
    let rec = recovery(
        true,
        &[
            "domain_consistency: use_manifest_domain",
            "registration: minimal_config_flow",
            "schema_validation: restore_manifest_backup",
        ],
    );
    let result = engine_nine_of_ten()
        .verify(&pre_validation(), &ComprehensiveValidation::default(), &rec, &ctx())
        .await;

    assert!(result
        .recommendations
        .iter()
        .any(|l| l.contains("emergency mode")));
    assert!(result
        .recommendations
        .iter()
        .any(|l| l.starts_with("3 fallbacks were applied")));
}

#[tokio::test]
async fn no_change_in_issue_count_is_called_out() {
    // The stack still reports all five findings after recovery.
    let still_broken = StartupValidation {
        success: false,
        ..pre_validation()
    };
    let engine = VerificationEngine::new(
        stack_with(ScriptedStartupValidator::sequence(vec![still_broken]), &CheckKind::ALL),
        Arc::new(ScriptedHostProbe::absent()),
        VerificationConfig::default(),
    );
    let result = engine
        .verify(
            &pre_validation(),
            &ComprehensiveValidation::default(),
            &recovery(false, &[]),
            &ctx(),
        )
        .await;

    assert_eq!(result.improvement_metrics.issues_resolved, 0);
    assert!(!result.improvement_metrics.overall_validation_improved);
    assert!(result
        .recommendations
        .iter()
        .any(|l| l.starts_with("No improvement in issue count")));
    // Five of ten tests pass: the checkers are clean, the host is not.
    assert_eq!(result.tests_passed, 5);
    assert_eq!(result.overall_status, VerificationStatus::Limited);
}
