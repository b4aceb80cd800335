//! Jobguard error types.
//!
//! Two families of errors live here:
//!
//! - [`GatewayError`]: setup-time failures (loading configuration, compiling
//!   custom pattern files, rejecting unsafe policies). These surface once, when
//!   a [`Gateway`](crate::gateway::Gateway) is built.
//! - [`ValidationError`]: the typed rejection taxonomy returned for LLM
//!   responses. These are values, not faults: the caller branches on them to
//!   decide whether to re-query, re-prompt or abandon a job.

use serde::Serialize;
use thiserror::Error;

use crate::security::Severity;

/// Gateway setup errors.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// A pattern failed to compile.
    #[error("Invalid pattern '{label}': {source}")]
    Pattern {
        /// Label of the offending pattern.
        label: String,
        /// Underlying regex compilation error.
        #[source]
        source: regex::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gateway setup operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl From<toml::de::Error> for GatewayError {
    fn from(err: toml::de::Error) -> Self {
        GatewayError::Config(err.to_string())
    }
}

/// Rejection of an LLM response.
///
/// Every variant is terminal for the response it describes; the validator
/// never retries internally.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ValidationError {
    /// Response is not parseable JSON.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Response parsed but violates the required shape, types or bounds.
    #[error("Schema violation at {field}: {reason}")]
    SchemaViolation {
        /// Path of the offending field, e.g. `analysis_results[0].job_id`.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Response shows the model followed injected instructions.
    #[error("Injection success detected: {pattern}")]
    InjectionSuccess {
        /// Label of the marker that matched.
        pattern: String,
        /// Bounded excerpt around the match.
        sample: String,
    },
}

impl ValidationError {
    /// Build a schema violation for `field`.
    pub fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Audit severity of this rejection.
    pub fn severity(&self) -> Severity {
        match self {
            ValidationError::Malformed(_) | ValidationError::SchemaViolation { .. } => {
                Severity::Medium
            },
            ValidationError::InjectionSuccess { .. } => Severity::Critical,
        }
    }

    /// Whether re-querying the LLM could plausibly fix this response.
    ///
    /// Injection success is never recoverable for the response in hand.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ValidationError::InjectionSuccess { .. })
    }

    /// Short machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::Malformed(_) => "malformed",
            ValidationError::SchemaViolation { .. } => "schema_violation",
            ValidationError::InjectionSuccess { .. } => "injection_success",
        }
    }
}
