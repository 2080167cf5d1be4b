//! Recorded scenarios: a TOML description of what each collaborator answers.
//!
//! A scenario replays a target's validation stack, repair handlers and host
//! probe without touching a real host. Sequences advance once per call and
//! the last entry repeats.
//!
//! ```toml
//! target = "roost"
//! expected_services = ["sensor"]
//!
//! [[checks]]
//! kind = "schema"
//! reports = [
//!   { passed = false, issues = [{ source = "schema", description = "manifest missing 'codeowners'", severity = "error" }] },
//!   { passed = true },
//! ]
//!
//! [[fixes]]
//! category = "schema_validation"
//! strategy = "fix_manifest_required_fields"
//! success = true
//! changes_made = ["added codeowners"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use mend_core::fakes::{
    ProbeState, ScriptedChecker, ScriptedFixer, ScriptedHostProbe, ScriptedStartupValidator,
};
use mend_core::{
    CategoryName, CategoryRegistry, CheckKind, CheckReport, FixOutcome, HandlerTable, HostProbe,
    Issue, MendConfig, RecoveryContext, SelfHealingService, StartupValidation, TargetId,
    ValidationStack,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub target: String,

    #[serde(default)]
    pub expected_services: Vec<String>,

    /// Labels forwarded to every repair handler.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Startup validator answers. Empty means always healthy.
    #[serde(default)]
    pub startup: Vec<StartupValidation>,

    /// Checkers wired into the stack. Kinds not listed are not configured.
    #[serde(default)]
    pub checks: Vec<CheckSpec>,

    /// Scripted handler outcomes. Unlisted strategies fail.
    #[serde(default)]
    pub fixes: Vec<FixSpec>,

    #[serde(default)]
    pub probe: ProbeSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckSpec {
    pub kind: CheckKind,
    #[serde(default)]
    pub reports: Vec<ReportSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportSpec {
    pub passed: bool,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixSpec {
    pub category: CategoryName,
    pub strategy: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub changes_made: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub verification_passed: bool,
    #[serde(default)]
    pub issues_resolved: Option<usize>,
    /// Make the handler itself fail with this message.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeSpec {
    pub loaded: bool,
    pub entry_point_instantiable: bool,
    /// Defaults to the scenario's expected services.
    pub registered_services: Option<Vec<String>>,
    pub error: Option<String>,
}

impl Default for ProbeSpec {
    fn default() -> Self {
        Self {
            loaded: true,
            entry_point_instantiable: true,
            registered_services: None,
            error: None,
        }
    }
}

impl ReportSpec {
    fn into_report(self, kind: CheckKind) -> CheckReport {
        CheckReport {
            passed: self.passed,
            issues: self.issues,
            warnings: self.warnings,
            ..CheckReport::passing(kind)
        }
    }
}

impl FixSpec {
    fn outcome(&self) -> FixOutcome {
        FixOutcome {
            success: self.success,
            changes_made: self.changes_made.clone(),
            errors: self.errors.clone(),
            warnings: self.warnings.clone(),
            verification_passed: self.verification_passed,
            issues_resolved: self.issues_resolved,
        }
    }
}

impl Scenario {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(s).context("Failed to parse scenario")?;
        if scenario.target.trim().is_empty() {
            anyhow::bail!("scenario target must not be empty");
        }
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario: {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid scenario: {:?}", path))
    }

    pub fn target_id(&self) -> TargetId {
        TargetId::new(self.target.clone())
    }

    pub fn context(&self) -> RecoveryContext {
        self.labels.iter().fold(
            RecoveryContext::new(self.target_id())
                .with_expected_services(self.expected_services.clone()),
            |ctx, (key, value)| ctx.with_label(key.as_str(), value.as_str()),
        )
    }

    fn stack(&self) -> ValidationStack {
        let startup = if self.startup.is_empty() {
            ScriptedStartupValidator::healthy()
        } else {
            ScriptedStartupValidator::sequence(self.startup.clone())
        };
        self.checks
            .iter()
            .fold(ValidationStack::new(Arc::new(startup)), |stack, check| {
                let checker = if check.reports.is_empty() {
                    ScriptedChecker::passing(check.kind)
                } else {
                    let reports = check
                        .reports
                        .iter()
                        .cloned()
                        .map(|r| r.into_report(check.kind))
                        .collect();
                    ScriptedChecker::sequence(check.kind, reports)
                };
                stack.with_checker(Arc::new(checker))
            })
    }

    fn fixer(&self) -> ScriptedFixer {
        self.fixes.iter().fold(ScriptedFixer::new(), |fixer, fix| match &fix.error {
            Some(message) => fixer.with_error(fix.category, &fix.strategy, message),
            None => fixer.with_outcome(fix.category, &fix.strategy, fix.outcome()),
        })
    }

    fn probe(&self) -> ScriptedHostProbe {
        if let Some(message) = &self.probe.error {
            return ScriptedHostProbe::erroring(message);
        }
        ScriptedHostProbe::new(ProbeState {
            loaded: self.probe.loaded,
            entry_point_instantiable: self.probe.entry_point_instantiable,
            registered_services: self
                .probe
                .registered_services
                .clone()
                .unwrap_or_else(|| self.expected_services.clone()),
        })
    }

    /// Wire the scripted collaborators into a service over the standard registry.
    pub fn build_service(&self, config: MendConfig) -> Result<SelfHealingService> {
        let registry = Arc::new(CategoryRegistry::standard());
        for fix in &self.fixes {
            let category = registry.require(fix.category)?;
            if !category.declares(&fix.strategy) {
                anyhow::bail!(
                    "scenario scripts unknown strategy {}.{}",
                    fix.category,
                    fix.strategy
                );
            }
        }
        let handlers = HandlerTable::builder()
            .register_all(&registry, Arc::new(self.fixer()))
            .build(&registry)?;
        let probe: Arc<dyn HostProbe> = Arc::new(self.probe());
        let service = SelfHealingService::new(config, registry, handlers, self.stack(), probe)?;
        Ok(service)
    }
}
