//! Append-only audit trail for detections and rejections.
//!
//! The [`AuditLogger`] fans every record out to a list of [`AuditSink`]s.
//! Recording never fails and never panics: a sink that errors is reported
//! through `tracing` and skipped, so a broken audit trail cannot turn into a
//! broken security check.
//!
//! # Sinks
//!
//! | Sink          | Behavior                                              |
//! |---------------|-------------------------------------------------------|
//! | `TracingSink` | Structured `tracing` event, target `jobguard::audit`  |
//! | `MemorySink`  | In-process `Vec`, for tests and review tooling        |
//! | `JsonlSink`   | JSON lines appended by a background writer thread     |

mod sinks;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Result, ValidationError};
use crate::security::{DetectionEvent, Severity};

pub use sinks::{JsonlSink, MemorySink, TracingSink};

/// Default capacity of the JSONL writer channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A rejected LLM response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionRecord {
    /// Why the response was rejected
    pub error: ValidationError,
    /// Audit severity
    pub severity: Severity,
    /// Batch the response belonged to, when known
    pub batch_id: Option<String>,
    /// When the rejection was recorded
    pub timestamp: DateTime<Utc>,
}

/// One entry of the audit trail
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum AuditRecord {
    /// Pattern match on input or output text
    Detection(DetectionEvent),
    /// Response rejected by the validator
    Rejection(RejectionRecord),
}

impl AuditRecord {
    /// Severity of the underlying event
    pub fn severity(&self) -> Severity {
        match self {
            AuditRecord::Detection(event) => event.severity,
            AuditRecord::Rejection(rejection) => rejection.severity,
        }
    }
}

impl From<DetectionEvent> for AuditRecord {
    fn from(event: DetectionEvent) -> Self {
        AuditRecord::Detection(event)
    }
}

impl From<ValidationError> for AuditRecord {
    fn from(error: ValidationError) -> Self {
        AuditRecord::Rejection(RejectionRecord {
            severity: error.severity(),
            error,
            batch_id: None,
            timestamp: Utc::now(),
        })
    }
}

/// Sink write failures
#[derive(Error, Debug)]
pub enum AuditSinkError {
    /// Writer channel is full; the record was dropped
    #[error("audit channel full, record dropped")]
    Full,

    /// Writer thread is gone
    #[error("audit writer closed")]
    Closed,

    /// Lock poisoned by a panicking writer
    #[error("audit sink lock poisoned")]
    Poisoned,

    /// Record could not be serialized
    #[error("audit serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Destination for audit records.
///
/// Implementations must not block for long: `write` is called on the
/// scanning and validation path.
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    /// Short name used when reporting sink failures
    fn name(&self) -> &'static str;

    /// Append one record
    fn write(&self, record: &AuditRecord) -> std::result::Result<(), AuditSinkError>;
}

/// Audit sink configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Emit records as `tracing` events
    pub tracing: bool,
    /// Append records as JSON lines to this file
    pub jsonl_path: Option<PathBuf>,
    /// Bounded queue size for the JSONL writer
    pub channel_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            tracing: true,
            jsonl_path: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Fan-out audit logger. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct AuditLogger {
    sinks: Arc<Vec<Arc<dyn AuditSink>>>,
}

impl AuditLogger {
    /// Logger writing to the given sinks
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self {
            sinks: Arc::new(sinks),
        }
    }

    /// Logger with only a [`TracingSink`]
    pub fn tracing() -> Self {
        Self::new(vec![Arc::new(TracingSink)])
    }

    /// Logger that discards everything
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Build the sinks described by `config`
    pub fn from_config(config: &AuditConfig) -> Result<Self> {
        let mut sinks: Vec<Arc<dyn AuditSink>> = Vec::new();
        if config.tracing {
            sinks.push(Arc::new(TracingSink));
        }
        if let Some(path) = &config.jsonl_path {
            sinks.push(Arc::new(JsonlSink::open(path, config.channel_capacity)?));
        }
        Ok(Self::new(sinks))
    }

    /// Add a sink
    pub fn with_sink(self, sink: Arc<dyn AuditSink>) -> Self {
        let mut sinks: Vec<Arc<dyn AuditSink>> = self.sinks.iter().cloned().collect();
        sinks.push(sink);
        Self::new(sinks)
    }

    /// Number of sinks
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Record a detection or rejection. Never fails.
    pub fn record(&self, record: impl Into<AuditRecord>) {
        let record = record.into();
        for sink in self.sinks.iter() {
            if let Err(e) = sink.write(&record) {
                tracing::warn!(sink = sink.name(), "audit write failed: {e}");
            }
        }
    }

    /// Record a rejection tagged with its batch
    pub fn record_rejection(&self, error: &ValidationError, batch_id: Option<&str>) {
        self.record(AuditRecord::Rejection(RejectionRecord {
            error: error.clone(),
            severity: error.severity(),
            batch_id: batch_id.map(str::to_string),
            timestamp: Utc::now(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FailingSink;

    impl AuditSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn write(&self, _record: &AuditRecord) -> std::result::Result<(), AuditSinkError> {
            Err(AuditSinkError::Closed)
        }
    }

    #[test]
    fn test_failing_sink_does_not_stop_others() {
        let memory = Arc::new(MemorySink::new());
        let sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(FailingSink), memory.clone()];
        let logger = AuditLogger::new(sinks);

        logger.record(ValidationError::Malformed("eof".to_string()));

        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_rejection_carries_batch_and_severity() {
        let memory = Arc::new(MemorySink::new());
        let logger = AuditLogger::disabled().with_sink(memory.clone());

        let err = ValidationError::InjectionSuccess {
            pattern: "refusal".to_string(),
            sample: "I cannot help".to_string(),
        };
        logger.record_rejection(&err, Some("batch-1"));

        let rejections = memory.rejections();
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].batch_id.as_deref(), Some("batch-1"));
        assert_eq!(rejections[0].severity, Severity::Critical);
    }

    #[test]
    fn test_default_config_is_tracing_only() {
        let logger = AuditLogger::from_config(&AuditConfig::default()).unwrap();
        assert_eq!(logger.sink_count(), 1);
    }

    #[test]
    fn test_record_serializes_with_tag() {
        let record = AuditRecord::from(ValidationError::schema("job_id", "missing"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["record"], "rejection");
        assert_eq!(json["error"]["kind"], "schema_violation");
    }
}
