//! Issue classification into registry categories.
//!
//! Classification is a total function: a structured category hint wins,
//! otherwise the first keyword rule that matches the lower-cased
//! description decides, otherwise the configured default bucket is used.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{CategoryName, Issue, MendError, Result};
use crate::registry::CategoryRegistry;

/// One ordered keyword rule.
///
/// Matches when every `all_of` keyword and at least one `any_of` keyword
/// (if any are listed) occur in the lower-cased description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub category: CategoryName,
    #[serde(default)]
    pub all_of: Vec<String>,
    #[serde(default)]
    pub any_of: Vec<String>,
}

impl ClassificationRule {
    pub fn any_of(category: CategoryName, keywords: &[&str]) -> Self {
        Self {
            category,
            all_of: Vec::new(),
            any_of: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn matches(&self, description: &str) -> bool {
        let all = self.all_of.iter().all(|k| description.contains(k.as_str()));
        let any = self.any_of.is_empty() || self.any_of.iter().any(|k| description.contains(k.as_str()));
        all && any
    }

    fn validate(&self) -> Result<()> {
        if self.all_of.is_empty() && self.any_of.is_empty() {
            return Err(MendError::InvalidRule(format!(
                "rule for {} has no keywords",
                self.category
            )));
        }
        if let Some(k) = self
            .all_of
            .iter()
            .chain(self.any_of.iter())
            .find(|k| k.trim().is_empty())
        {
            return Err(MendError::InvalidRule(format!(
                "rule for {} has a blank keyword {k:?}",
                self.category
            )));
        }
        Ok(())
    }

    fn normalized(mut self) -> Self {
        for k in self.all_of.iter_mut().chain(self.any_of.iter_mut()) {
            *k = k.to_lowercase();
        }
        self
    }
}

/// Classifier rule set; part of [`crate::config::MendConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub default_category: CategoryName,
    pub rules: Vec<ClassificationRule>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            default_category: CategoryName::SchemaValidation,
            rules: vec![
                ClassificationRule {
                    category: CategoryName::DomainConsistency,
                    all_of: vec!["domain".to_string()],
                    any_of: vec!["mismatch".to_string(), "consistency".to_string()],
                },
                ClassificationRule::any_of(CategoryName::Registration, &["config_flow", "registration"]),
                ClassificationRule::any_of(CategoryName::SchemaValidation, &["manifest"]),
                ClassificationRule::any_of(
                    CategoryName::DependencyResolution,
                    &["import", "dependency"],
                ),
                ClassificationRule::any_of(CategoryName::Filesystem, &["file", "permission"]),
                ClassificationRule::any_of(
                    CategoryName::VersionCompatibility,
                    &["version", "compatibility"],
                ),
            ],
        }
    }
}

/// Maps issues to exactly one registered category.
#[derive(Debug, Clone)]
pub struct IssueClassifier {
    default_category: CategoryName,
    rules: Vec<ClassificationRule>,
    known: Vec<CategoryName>,
}

impl IssueClassifier {
    /// Build a classifier whose every possible answer is registered.
    pub fn new(config: &ClassifierConfig, registry: &CategoryRegistry) -> Result<Self> {
        registry.require(config.default_category)?;
        let mut rules = Vec::with_capacity(config.rules.len());
        for rule in &config.rules {
            rule.validate()?;
            registry.require(rule.category)?;
            rules.push(rule.clone().normalized());
        }
        Ok(Self {
            default_category: config.default_category,
            rules,
            known: registry.iter().map(|c| c.name).collect(),
        })
    }

    /// Classify one issue. First matching rule wins.
    pub fn classify(&self, issue: &Issue) -> CategoryName {
        if let Some(hint) = issue.category {
            if self.known.contains(&hint) {
                return hint;
            }
            debug!(hint = %hint, "ignoring unregistered category hint");
        }

        let description = issue.description.to_lowercase();
        let category = self
            .rules
            .iter()
            .find(|r| r.matches(&description))
            .map(|r| r.category)
            .unwrap_or(self.default_category);

        debug!(source = %issue.source, category = %category, "classified issue");
        category
    }

    /// Partition issues into per-category buckets; empty categories are absent.
    pub fn partition<'a>(
        &self,
        issues: impl IntoIterator<Item = &'a Issue>,
    ) -> BTreeMap<CategoryName, Vec<Issue>> {
        let mut buckets: BTreeMap<CategoryName, Vec<Issue>> = BTreeMap::new();
        for issue in issues {
            let category = self.classify(issue);
            let mut classified = issue.clone();
            classified.category = Some(category);
            buckets.entry(category).or_default().push(classified);
        }
        buckets
    }

    pub fn default_category(&self) -> CategoryName {
        self.default_category
    }
}
