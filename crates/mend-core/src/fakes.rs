//! Scripted in-memory collaborators.
//!
//! Used by the test suites and by the CLI's scenario runner. Checkers and
//! startup validators play back a script of answers: the last entry repeats
//! once the script runs out, so a one-entry script is a constant answer.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use anyhow::anyhow;
use async_trait::async_trait;

use crate::collaborators::{Checker, HostProbe, StartupValidator};
use crate::domain::{
    CategoryName, CheckKind, CheckReport, FixOutcome, Issue, Severity, StartupValidation,
    StepKind, TargetId,
};
use crate::handlers::{RepairHandler, StrategyContext};

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// Ordered answers; `Err` entries are returned as collaborator errors.
#[derive(Debug)]
pub struct Script<T> {
    entries: Vec<Result<T, String>>,
    cursor: Mutex<usize>,
}

impl<T: Clone> Script<T> {
    pub fn new(entries: Vec<Result<T, String>>) -> Self {
        Self {
            entries,
            cursor: Mutex::new(0),
        }
    }

    pub fn constant(value: T) -> Self {
        Self::new(vec![Ok(value)])
    }

    /// Next answer. An empty script is an error.
    pub fn next(&self) -> anyhow::Result<T> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let last = self
            .entries
            .len()
            .checked_sub(1)
            .ok_or_else(|| anyhow!("script is empty"))?;
        let entry = &self.entries[(*cursor).min(last)];
        *cursor += 1;
        entry.clone().map_err(|e| anyhow!(e))
    }

    /// Number of answers handed out so far.
    pub fn calls(&self) -> usize {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// ScriptedChecker
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ScriptedChecker {
    kind: CheckKind,
    script: Script<CheckReport>,
}

impl ScriptedChecker {
    pub fn from_script(kind: CheckKind, entries: Vec<Result<CheckReport, String>>) -> Self {
        Self {
            kind,
            script: Script::new(entries),
        }
    }

    pub fn passing(kind: CheckKind) -> Self {
        Self::sequence(kind, vec![CheckReport::passing(kind)])
    }

    /// A checker that always fails with one error-level issue per description.
    pub fn failing(kind: CheckKind, descriptions: &[&str]) -> Self {
        let issues = descriptions
            .iter()
            .map(|d| Issue::new(kind.as_str(), *d, Severity::Error))
            .collect();
        Self::sequence(kind, vec![CheckReport::failing(kind, issues)])
    }

    pub fn erroring(kind: CheckKind, message: &str) -> Self {
        Self::from_script(kind, vec![Err(message.to_string())])
    }

    pub fn sequence(kind: CheckKind, reports: Vec<CheckReport>) -> Self {
        Self::from_script(kind, reports.into_iter().map(Ok).collect())
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    fn kind(&self) -> CheckKind {
        self.kind
    }

    async fn validate(&self, _target: &TargetId) -> anyhow::Result<CheckReport> {
        self.script.next()
    }
}

// ---------------------------------------------------------------------------
// ScriptedStartupValidator
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ScriptedStartupValidator {
    script: Script<StartupValidation>,
}

impl ScriptedStartupValidator {
    pub fn from_script(entries: Vec<Result<StartupValidation, String>>) -> Self {
        Self {
            script: Script::new(entries),
        }
    }

    pub fn healthy() -> Self {
        Self::sequence(vec![StartupValidation::healthy()])
    }

    pub fn erroring(message: &str) -> Self {
        Self::from_script(vec![Err(message.to_string())])
    }

    pub fn sequence(validations: Vec<StartupValidation>) -> Self {
        Self::from_script(validations.into_iter().map(Ok).collect())
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl StartupValidator for ScriptedStartupValidator {
    async fn validate(&self, _target: &TargetId) -> anyhow::Result<StartupValidation> {
        self.script.next()
    }
}

// ---------------------------------------------------------------------------
// ScriptedHostProbe
// ---------------------------------------------------------------------------

/// One answer set of the host probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeState {
    pub loaded: bool,
    pub entry_point_instantiable: bool,
    pub registered_services: Vec<String>,
}

/// Host probe with one mutable answer set shared by all three questions.
#[derive(Debug)]
pub struct ScriptedHostProbe {
    state: Mutex<Result<ProbeState, String>>,
}

impl ScriptedHostProbe {
    pub fn new(state: ProbeState) -> Self {
        Self {
            state: Mutex::new(Ok(state)),
        }
    }

    /// Loaded, instantiable, with the given services registered.
    pub fn healthy(services: &[&str]) -> Self {
        Self::new(ProbeState {
            loaded: true,
            entry_point_instantiable: true,
            registered_services: services.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Not loaded, not instantiable, nothing registered.
    pub fn absent() -> Self {
        Self::new(ProbeState {
            loaded: false,
            entry_point_instantiable: false,
            registered_services: Vec::new(),
        })
    }

    pub fn erroring(message: &str) -> Self {
        Self {
            state: Mutex::new(Err(message.to_string())),
        }
    }

    /// Replace the answers, e.g. after a simulated repair.
    pub fn set(&self, state: ProbeState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Ok(state);
    }

    fn current(&self) -> anyhow::Result<ProbeState> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .map_err(|e| anyhow!(e))
    }
}

#[async_trait]
impl HostProbe for ScriptedHostProbe {
    async fn is_loaded(&self, _target: &TargetId) -> anyhow::Result<bool> {
        Ok(self.current()?.loaded)
    }

    async fn entry_point_instantiable(&self, _target: &TargetId) -> anyhow::Result<bool> {
        Ok(self.current()?.entry_point_instantiable)
    }

    async fn registered_services(&self, _target: &TargetId) -> anyhow::Result<Vec<String>> {
        Ok(self.current()?.registered_services)
    }
}

// ---------------------------------------------------------------------------
// ScriptedFixer
// ---------------------------------------------------------------------------

/// One recorded handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixerCall {
    pub category: CategoryName,
    pub strategy: String,
    pub kind: StepKind,
    pub issues: usize,
}

/// Repair handler answering per `(category, strategy)`.
///
/// Unscripted pairs fail with an explanatory error line, so a fixer with no
/// entries is one where every strategy fails.
#[derive(Debug, Default)]
pub struct ScriptedFixer {
    outcomes: HashMap<(CategoryName, String), Result<FixOutcome, String>>,
    calls: Mutex<Vec<FixerCall>>,
}

impl ScriptedFixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(
        mut self,
        category: CategoryName,
        strategy: &str,
        outcome: FixOutcome,
    ) -> Self {
        self.outcomes
            .insert((category, strategy.to_string()), Ok(outcome));
        self
    }

    pub fn succeeding(self, category: CategoryName, strategy: &str) -> Self {
        self.with_outcome(
            category,
            strategy,
            FixOutcome::succeeded(format!("applied {strategy}")),
        )
    }

    /// Make the handler return `Err(message)` for this pair.
    pub fn with_error(mut self, category: CategoryName, strategy: &str, message: &str) -> Self {
        self.outcomes
            .insert((category, strategy.to_string()), Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<FixerCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RepairHandler for ScriptedFixer {
    async fn apply(&self, ctx: &StrategyContext) -> anyhow::Result<FixOutcome> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FixerCall {
                category: ctx.category,
                strategy: ctx.strategy.clone(),
                kind: ctx.kind,
                issues: ctx.issues.len(),
            });

        match self.outcomes.get(&(ctx.category, ctx.strategy.clone())) {
            Some(Ok(outcome)) => Ok(outcome.clone()),
            Some(Err(message)) => Err(anyhow!(message.clone())),
            None => Ok(FixOutcome::failed(format!(
                "no fix available for {}.{}",
                ctx.category, ctx.strategy
            ))),
        }
    }
}
