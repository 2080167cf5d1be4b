//! Pipeline configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierConfig;
use crate::domain::{MendError, Result};

/// Thresholds and knobs for the recovery orchestrator and fallback cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Minimum recovered percentage for `recovered` (with overall improvement).
    pub recovered_threshold: f64,

    /// Minimum recovered percentage for `partial`.
    pub partial_threshold: f64,

    /// Emergency mode activates when more distinct fallbacks than this were applied.
    pub emergency_fallback_threshold: usize,

    /// Nominal duration recorded for each fallback step.
    pub fallback_duration_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            recovered_threshold: 90.0,
            partial_threshold: 50.0,
            emergency_fallback_threshold: 2,
            fallback_duration_ms: 100,
        }
    }
}

/// Thresholds for the verification verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub verified_threshold: f64,
    pub partial_threshold: f64,
    pub limited_threshold: f64,

    /// Issue improvement percentage that must be exceeded to count as significant.
    pub significant_improvement_threshold: f64,

    /// Failing tests at or above this priority get a remediation line.
    pub high_priority_threshold: u8,

    /// Services the target must register, unless the run context names its own.
    pub expected_services: Vec<String>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            verified_threshold: 90.0,
            partial_threshold: 70.0,
            limited_threshold: 50.0,
            significant_improvement_threshold: 50.0,
            high_priority_threshold: 8,
            expected_services: Vec::new(),
        }
    }
}

/// Top-level mend configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MendConfig {
    pub recovery: RecoveryConfig,
    pub verification: VerificationConfig,
    pub classifier: ClassifierConfig,
}

impl MendConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: MendConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Check that thresholds are percentages and ordered sensibly.
    pub fn validate(&self) -> Result<()> {
        let r = &self.recovery;
        check_percentage("recovery.recovered_threshold", r.recovered_threshold)?;
        check_percentage("recovery.partial_threshold", r.partial_threshold)?;
        if r.partial_threshold > r.recovered_threshold {
            return Err(MendError::InvalidConfig(
                "recovery.partial_threshold must not exceed recovery.recovered_threshold"
                    .to_string(),
            ));
        }

        let v = &self.verification;
        check_percentage("verification.verified_threshold", v.verified_threshold)?;
        check_percentage("verification.partial_threshold", v.partial_threshold)?;
        check_percentage("verification.limited_threshold", v.limited_threshold)?;
        check_percentage(
            "verification.significant_improvement_threshold",
            v.significant_improvement_threshold,
        )?;
        if !(v.limited_threshold <= v.partial_threshold && v.partial_threshold <= v.verified_threshold)
        {
            return Err(MendError::InvalidConfig(
                "verification thresholds must satisfy limited <= partial <= verified".to_string(),
            ));
        }
        if v.expected_services.iter().any(|s| s.trim().is_empty()) {
            return Err(MendError::InvalidConfig(
                "verification.expected_services contains a blank name".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_percentage(field: &str, value: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(MendError::InvalidConfig(format!(
            "{field} must be within 0..=100, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CategoryName;

    #[test]
    fn test_empty_document_is_default() {
        let config = MendConfig::from_toml_str("").expect("parse");
        assert_eq!(config, MendConfig::default());
        assert_eq!(config.recovery.emergency_fallback_threshold, 2);
        assert_eq!(config.recovery.fallback_duration_ms, 100);
        assert_eq!(config.verification.high_priority_threshold, 8);
    }

    #[test]
    fn test_partial_override() {
        let config = MendConfig::from_toml_str(
            r#"
            [recovery]
            fallback_duration_ms = 250

            [verification]
            expected_services = ["refresh", "apply_schedule"]
            "#,
        )
        .expect("parse");
        assert_eq!(config.recovery.fallback_duration_ms, 250);
        assert_eq!(config.recovery.recovered_threshold, 90.0);
        assert_eq!(config.verification.expected_services.len(), 2);
    }

    #[test]
    fn test_classifier_rules_from_toml() {
        let config = MendConfig::from_toml_str(
            r#"
            [classifier]
            default_category = "filesystem"

            [[classifier.rules]]
            category = "registration"
            any_of = ["entry point"]
            "#,
        )
        .expect("parse");
        assert_eq!(config.classifier.default_category, CategoryName::Filesystem);
        assert_eq!(config.classifier.rules.len(), 1);
        assert!(config.classifier.rules[0].all_of.is_empty());
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let res = MendConfig::from_toml_str("[recovery]\nrecovered_threshold = 120.0\n");
        assert!(matches!(res, Err(MendError::InvalidConfig(_))));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let res = MendConfig::from_toml_str("[verification]\nlimited_threshold = 80.0\n");
        assert!(matches!(res, Err(MendError::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let res = MendConfig::from_toml_str("[recovery\n");
        assert!(matches!(res, Err(MendError::ConfigParse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mend.toml");
        std::fs::write(&path, "[recovery]\npartial_threshold = 40.0\n").expect("write");
        let config = MendConfig::load(&path).expect("load");
        assert_eq!(config.recovery.partial_threshold, 40.0);
    }
}
