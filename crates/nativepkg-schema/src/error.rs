//! Schema error type.

use thiserror::Error;

/// Errors raised while parsing or validating package descriptors.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The TOML content could not be deserialized.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The document parsed but violates a structural rule.
    #[error("Invalid {field}: {reason}")]
    Invalid {
        /// The offending field or entry.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl SchemaError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
