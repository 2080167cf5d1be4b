//! Domain-level error taxonomy for mend.

use crate::domain::issue::CategoryName;

/// mend domain errors.
///
/// Step-level failures (a handler or a verification check returning `Err`)
/// never surface as a `MendError`; they are recorded on the step or test.
#[derive(Debug, thiserror::Error)]
pub enum MendError {
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("category {0} is not declared in the registry")]
    CategoryNotRegistered(CategoryName),

    #[error("no handler registered for {category}.{strategy}")]
    MissingHandler {
        category: CategoryName,
        strategy: String,
    },

    #[error("handler registered for undeclared strategy {category}.{strategy}")]
    UndeclaredStrategy {
        category: CategoryName,
        strategy: String,
    },

    #[error("invalid classifier rule: {0}")]
    InvalidRule(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("validation stack failed for {target}: {reason}")]
    ValidationFailed { target: String, reason: String },

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for mend domain operations.
pub type Result<T> = std::result::Result<T, MendError>;
