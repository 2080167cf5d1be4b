//! `SelfHealingService`: cached validation, the full pipeline and diagnostics.

use std::sync::Arc;
use std::time::Duration;

use mend_core::fakes::{ScriptedChecker, ScriptedFixer, ScriptedHostProbe, ScriptedStartupValidator};
use mend_core::{
    CategoryName, CategoryRegistry, CheckKind, CheckReport, HandlerTable, Issue, MaxAge,
    MendConfig, MendError, RecoveryContext, RecoveryStatus, ResultCache, SelfHealingService,
    Severity, TargetId, ValidationStack, VerificationStatus,
};

fn service(
    schema: ScriptedChecker,
    startup: Arc<ScriptedStartupValidator>,
    fixer: Arc<ScriptedFixer>,
    config: MendConfig,
) -> mend_core::Result<SelfHealingService> {
    let registry = Arc::new(CategoryRegistry::standard());
    let handlers = HandlerTable::builder()
        .register_all(&registry, fixer)
        .build(&registry)?;
    let stack = [
        CheckKind::Dependency,
        CheckKind::Version,
        CheckKind::Filesystem,
        CheckKind::DomainConsistency,
    ]
    .into_iter()
    .fold(
        ValidationStack::new(startup).with_checker(Arc::new(schema)),
        |stack, kind| stack.with_checker(Arc::new(ScriptedChecker::passing(kind))),
    );
    SelfHealingService::new(
        config,
        registry,
        handlers,
        stack,
        Arc::new(ScriptedHostProbe::healthy(&["sensor"])),
    )
}

fn broken_manifest() -> CheckReport {
    CheckReport::failing(
        CheckKind::Schema,
        vec![Issue::new("schema", "manifest missing 'codeowners'", Severity::Error)],
    )
}

fn ctx() -> RecoveryContext {
    RecoveryContext::new(TargetId::new("roost")).with_expected_services(vec!["sensor".to_string()])
}

fn manifest_fixer() -> Arc<ScriptedFixer> {
    Arc::new(
        ScriptedFixer::new()
            .succeeding(CategoryName::SchemaValidation, "fix_manifest_required_fields")
            .succeeding(CategoryName::SchemaValidation, "fix_manifest_schema"),
    )
}

#[tokio::test]
async fn pipeline_repairs_broken_manifest() {
    // Broken on the first validation, clean on every later one.
    let schema = ScriptedChecker::sequence(
        CheckKind::Schema,
        vec![broken_manifest(), CheckReport::passing(CheckKind::Schema)],
    );
    let startup = Arc::new(ScriptedStartupValidator::healthy());
    let svc = service(schema, startup, manifest_fixer(), MendConfig::default()).expect("service");

    let report = svc.run_pipeline(&ctx()).await.expect("pipeline");

    assert!(!report.pre_validation.success());
    let recovery = report.recovery.as_ref().expect("recovery ran");
    assert_eq!(recovery.overall_status, RecoveryStatus::Recovered);
    let verification = report.verification.as_ref().expect("verification ran");
    assert_eq!(verification.overall_status, VerificationStatus::Verified);
    assert!(report.healthy());

    let mut seen = std::collections::HashSet::new();
    assert!(report.recommendations.iter().all(|l| seen.insert(l.clone())));
    assert_eq!(svc.get_recovery_history().len(), 1);
}

#[tokio::test]
async fn clean_target_skips_recovery() {
    let startup = Arc::new(ScriptedStartupValidator::healthy());
    let fixer = Arc::new(ScriptedFixer::new());
    let svc = service(
        ScriptedChecker::passing(CheckKind::Schema),
        startup,
        Arc::clone(&fixer),
        MendConfig::default(),
    )
    .expect("service");

    let report = svc.run_pipeline(&ctx()).await.expect("pipeline");
    assert!(report.recovery.is_none());
    assert!(report.verification.is_none());
    assert!(report.healthy());
    assert!(fixer.calls().is_empty());
    assert!(svc.get_recovery_history().is_empty());
}

#[tokio::test]
async fn validation_is_cached_until_recovery_changes_something() {
    let schema = ScriptedChecker::sequence(
        CheckKind::Schema,
        vec![broken_manifest(), CheckReport::passing(CheckKind::Schema)],
    );
    let startup = Arc::new(ScriptedStartupValidator::healthy());
    let svc = service(
        schema,
        Arc::clone(&startup),
        manifest_fixer(),
        MendConfig::default(),
    )
    .expect("service");
    let target = TargetId::new("roost");

    let first = svc.run_comprehensive_validation(&target).await.expect("first");
    let again = svc.run_comprehensive_validation(&target).await.expect("again");
    assert_eq!(first, again);
    assert_eq!(startup.calls(), 1);

    svc.run_pipeline(&ctx()).await.expect("pipeline");

    // The successful repair dropped the cached "before" snapshot, which failed.
    assert!(!first.success());
    let fresh = svc.run_comprehensive_validation(&target).await.expect("fresh");
    assert!(fresh.success());
}

#[tokio::test]
async fn explicit_max_age_cache_is_honoured() {
    let startup = Arc::new(ScriptedStartupValidator::healthy());
    let svc = service(
        ScriptedChecker::passing(CheckKind::Schema),
        Arc::clone(&startup),
        Arc::new(ScriptedFixer::new()),
        MendConfig::default(),
    )
    .expect("service")
    .with_cache(ResultCache::new(Arc::new(MaxAge(Duration::ZERO))));
    let target = TargetId::new("roost");

    svc.run_comprehensive_validation(&target).await.expect("first");
    tokio::time::sleep(Duration::from_millis(5)).await;
    svc.run_comprehensive_validation(&target).await.expect("second");
    assert_eq!(startup.calls(), 2);
}

#[tokio::test]
async fn startup_failure_before_recovery_is_an_error() {
    let svc = service(
        ScriptedChecker::passing(CheckKind::Schema),
        Arc::new(ScriptedStartupValidator::erroring("host down")),
        Arc::new(ScriptedFixer::new()),
        MendConfig::default(),
    )
    .expect("service");

    let res = svc.run_pipeline(&ctx()).await;
    assert!(matches!(res, Err(MendError::ValidationFailed { .. })));
}

#[tokio::test]
async fn diagnostics_reflect_cache_history_and_emergency_flag() {
    // Every category fails except through fallbacks: enough for emergency mode.
    let fixer = Arc::new(
        ScriptedFixer::new()
            .succeeding(CategoryName::DomainConsistency, "use_manifest_domain")
            .succeeding(CategoryName::SchemaValidation, "restore_manifest_backup")
            .succeeding(CategoryName::DependencyResolution, "disable_optional_dependencies"),
    );
    let schema = ScriptedChecker::failing(
        CheckKind::Schema,
        &[
            "domain mismatch between const and manifest",
            "manifest missing 'iot_class'",
            "cannot import name 'Scheduler'",
        ],
    );
    let svc = service(
        schema,
        Arc::new(ScriptedStartupValidator::healthy()),
        fixer,
        MendConfig::default(),
    )
    .expect("service");
    let target = TargetId::new("roost");

    let before = svc.get_startup_diagnostics(&target).await;
    assert!(before.cached_validation.is_none());
    assert_eq!(before.recovery_attempts, 0);
    assert_eq!(before.categories.len(), 6);
    assert_eq!(before.categories[0].name, CategoryName::DomainConsistency);

    let report = svc.run_pipeline(&ctx()).await.expect("pipeline");
    let recovery = report.recovery.expect("recovery");
    assert!(recovery.emergency_mode);
    assert_eq!(recovery.overall_status, RecoveryStatus::Fallback);

    let after = svc.get_startup_diagnostics(&target).await;
    assert!(after.emergency_mode);
    assert_eq!(after.recovery_attempts, 1);
    assert_eq!(after.last_recovery_status, Some(RecoveryStatus::Fallback));

    svc.reset_emergency_mode();
    assert!(!svc.is_emergency_mode());
    assert!(!svc.get_startup_diagnostics(&target).await.emergency_mode);
}

#[tokio::test]
async fn invalid_config_is_rejected_at_construction() {
    let mut config = MendConfig::default();
    config.recovery.partial_threshold = 95.0;
    let res = service(
        ScriptedChecker::passing(CheckKind::Schema),
        Arc::new(ScriptedStartupValidator::healthy()),
        Arc::new(ScriptedFixer::new()),
        config,
    );
    assert!(matches!(res, Err(MendError::InvalidConfig(_))));
}
