//! Error types for schema compilation

use thiserror::Error;

use crate::ir::diagnostics::Diagnostics;

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, GenError>;

/// Schema compiler errors
#[derive(Error, Debug)]
pub enum GenError {
    #[error("Malformed schema {schema}: {reason}")]
    MalformedSchema { schema: String, reason: String },

    #[error("Unresolved reference in {schema}: '{target}' has no entry in the definitions table")]
    UnresolvedReference { schema: String, target: String },

    #[error("Unsupported input file: {0}")]
    UnsupportedInput(String),

    #[error("Generation failed with {} error(s)", .0.error_count())]
    Generation(Diagnostics),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl GenError {
    /// Schema name the error is attached to, when it has one
    pub fn schema(&self) -> Option<&str> {
        match self {
            Self::MalformedSchema { schema, .. } | Self::UnresolvedReference { schema, .. } => {
                Some(schema)
            }
            _ => None,
        }
    }
}
