//! Static category registry.
//!
//! Each category carries a severity, a recovery priority (higher runs
//! first), ordered recovery strategies, ordered fallback strategies and the
//! verification methods that confirm a repair. The table is fixed at
//! construction; extending it means adding an entry here and a matching
//! handler in [`crate::handlers::HandlerTable`].

use serde::Serialize;

use crate::domain::{CategoryName, MendError, Result, Severity};

/// A category of validation concerns and how to repair it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorCategory {
    pub name: CategoryName,
    pub severity: Severity,
    pub recovery_priority: u8,
    pub recovery_strategies: Vec<&'static str>,
    pub fallback_strategies: Vec<&'static str>,
    pub verification_methods: Vec<&'static str>,
}

impl ErrorCategory {
    /// Whether `strategy` is declared as a primary or fallback strategy.
    pub fn declares(&self, strategy: &str) -> bool {
        self.recovery_strategies.contains(&strategy) || self.fallback_strategies.contains(&strategy)
    }

    /// All declared strategy names, primaries first.
    pub fn all_strategies(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.recovery_strategies
            .iter()
            .chain(self.fallback_strategies.iter())
            .copied()
    }
}

/// Read-only `CategoryName -> ErrorCategory` lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRegistry {
    categories: Vec<ErrorCategory>,
}

impl CategoryRegistry {
    /// Build a registry from entries in declaration order.
    ///
    /// Rejects duplicate category names.
    pub fn new(categories: Vec<ErrorCategory>) -> Result<Self> {
        for (i, c) in categories.iter().enumerate() {
            if categories[..i].iter().any(|o| o.name == c.name) {
                return Err(MendError::InvalidConfig(format!(
                    "category {} declared twice",
                    c.name
                )));
            }
        }
        Ok(Self { categories })
    }

    /// The standard category table.
    pub fn standard() -> Self {
        Self {
            categories: vec![
                ErrorCategory {
                    name: CategoryName::DomainConsistency,
                    severity: Severity::Critical,
                    recovery_priority: 10,
                    recovery_strategies: vec!["fix_domain_mismatch", "sync_manifest_domain"],
                    fallback_strategies: vec!["use_manifest_domain", "force_constant_domain"],
                    verification_methods: vec!["check_domain_consistency"],
                },
                ErrorCategory {
                    name: CategoryName::Registration,
                    severity: Severity::Critical,
                    recovery_priority: 9,
                    recovery_strategies: vec!["fix_config_flow_class", "fix_registration_hooks"],
                    fallback_strategies: vec!["minimal_config_flow", "manual_registration"],
                    verification_methods: vec!["check_registration", "check_entry_point"],
                },
                ErrorCategory {
                    name: CategoryName::SchemaValidation,
                    severity: Severity::Error,
                    recovery_priority: 8,
                    recovery_strategies: vec![
                        "fix_manifest_required_fields",
                        "fix_manifest_schema",
                    ],
                    fallback_strategies: vec![
                        "restore_manifest_backup",
                        "generate_minimal_manifest",
                    ],
                    verification_methods: vec!["check_manifest_schema"],
                },
                ErrorCategory {
                    name: CategoryName::DependencyResolution,
                    severity: Severity::Error,
                    recovery_priority: 7,
                    recovery_strategies: vec!["fix_missing_dependencies", "fix_import_errors"],
                    fallback_strategies: vec!["disable_optional_dependencies"],
                    verification_methods: vec!["check_dependencies"],
                },
                ErrorCategory {
                    name: CategoryName::Filesystem,
                    severity: Severity::Error,
                    recovery_priority: 6,
                    recovery_strategies: vec!["fix_file_permissions", "restore_missing_files"],
                    fallback_strategies: vec!["recreate_from_backup"],
                    verification_methods: vec!["check_file_integrity"],
                },
                ErrorCategory {
                    name: CategoryName::VersionCompatibility,
                    severity: Severity::Warning,
                    recovery_priority: 5,
                    recovery_strategies: vec!["fix_version_constraints"],
                    fallback_strategies: vec!["relax_version_constraints"],
                    verification_methods: vec!["check_version_compatibility"],
                },
            ],
        }
    }

    pub fn get(&self, name: CategoryName) -> Option<&ErrorCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Like [`Self::get`], but a missing category is an error.
    pub fn require(&self, name: CategoryName) -> Result<&ErrorCategory> {
        self.get(name).ok_or(MendError::CategoryNotRegistered(name))
    }

    pub fn contains(&self, name: CategoryName) -> bool {
        self.get(name).is_some()
    }

    /// Entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ErrorCategory> {
        self.categories.iter()
    }

    /// Entries by descending recovery priority; ties keep declaration order.
    pub fn processing_order(&self) -> Vec<&ErrorCategory> {
        let mut ordered: Vec<&ErrorCategory> = self.categories.iter().collect();
        ordered.sort_by(|a, b| b.recovery_priority.cmp(&a.recovery_priority));
        ordered
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: CategoryName, priority: u8) -> ErrorCategory {
        ErrorCategory {
            name,
            severity: Severity::Error,
            recovery_priority: priority,
            recovery_strategies: vec!["a"],
            fallback_strategies: vec![],
            verification_methods: vec![],
        }
    }

    #[test]
    fn test_standard_registry_covers_every_category() {
        let registry = CategoryRegistry::standard();
        assert_eq!(registry.len(), CategoryName::ALL.len());
        for name in CategoryName::ALL {
            let category = registry.require(name).expect("registered");
            assert!(!category.recovery_strategies.is_empty());
            assert!(!category.fallback_strategies.is_empty());
        }
    }

    #[test]
    fn test_standard_processing_order() {
        let registry = CategoryRegistry::standard();
        let order: Vec<CategoryName> = registry.processing_order().iter().map(|c| c.name).collect();
        assert_eq!(
            order,
            vec![
                CategoryName::DomainConsistency,
                CategoryName::Registration,
                CategoryName::SchemaValidation,
                CategoryName::DependencyResolution,
                CategoryName::Filesystem,
                CategoryName::VersionCompatibility,
            ]
        );
    }

    #[test]
    fn test_priority_ties_keep_declaration_order() {
        let registry = CategoryRegistry::new(vec![
            entry(CategoryName::Filesystem, 5),
            entry(CategoryName::Registration, 7),
            entry(CategoryName::SchemaValidation, 5),
        ])
        .expect("registry");
        let order: Vec<CategoryName> = registry.processing_order().iter().map(|c| c.name).collect();
        assert_eq!(
            order,
            vec![
                CategoryName::Registration,
                CategoryName::Filesystem,
                CategoryName::SchemaValidation,
            ]
        );
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let res = CategoryRegistry::new(vec![
            entry(CategoryName::Filesystem, 5),
            entry(CategoryName::Filesystem, 6),
        ]);
        assert!(matches!(res, Err(MendError::InvalidConfig(_))));
    }

    #[test]
    fn test_require_missing_category() {
        let registry = CategoryRegistry::new(vec![entry(CategoryName::Filesystem, 5)]).expect("ok");
        assert!(matches!(
            registry.require(CategoryName::Registration),
            Err(MendError::CategoryNotRegistered(CategoryName::Registration))
        ));
    }

    #[test]
    fn test_declares_strategy() {
        let registry = CategoryRegistry::standard();
        let dc = registry.require(CategoryName::DomainConsistency).expect("dc");
        assert!(dc.declares("fix_domain_mismatch"));
        assert!(dc.declares("force_constant_domain"));
        assert!(!dc.declares("fix_import_errors"));
    }
}
