//! Gateway facade.
//!
//! Wires the matcher, token issuer, prompt assembler, validator and audit
//! logger together for one analysis batch:
//!
//! ```text
//! job text ──scan──> flags (advisory)
//!     │
//!     └──assemble (token bound)──> prompt ──[LLM call, caller's]──> raw reply
//!                                                                      │
//!                                          AnalysisResult <──validate──┘
//!                                          or ValidationError
//! ```
//!
//! The gateway holds no mutable state. It can be shared across threads and
//! used for many concurrent batches.

use std::sync::Arc;

use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::config::Config;
use crate::error::{Result, ValidationError};
use crate::prompt::{AnalysisPrompt, JobInput, PromptAssembler};
use crate::security::{max_severity, DetectionEvent, PatternMatcher, PatternSet, Severity};
use crate::token::{SecurityToken, TokenIssuer};
use crate::validator::{AnalysisResult, Expectation, ResponseValidator};

/// Detections for one job of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct JobDetections {
    /// Job identifier
    pub job_id: String,
    /// Input-side matches (possibly empty)
    pub events: Vec<DetectionEvent>,
}

/// A batch ready to send to the LLM
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    /// Batch identifier used in audit records
    pub batch_id: String,
    /// Token bound into the prompt
    pub token: SecurityToken,
    /// Assembled prompt
    pub prompt: AnalysisPrompt,
    /// Advisory input flags, one entry per job in prompt order
    pub detections: Vec<JobDetections>,
}

impl PreparedBatch {
    /// Any job was flagged
    pub fn has_detections(&self) -> bool {
        self.detections.iter().any(|d| !d.events.is_empty())
    }

    /// Highest input severity across the batch
    pub fn max_severity(&self) -> Option<Severity> {
        self.detections
            .iter()
            .filter_map(|d| max_severity(&d.events))
            .max()
    }

    /// Detections for `job_id`
    pub fn detections_for(&self, job_id: &str) -> Option<&[DetectionEvent]> {
        self.detections
            .iter()
            .find(|d| d.job_id == job_id)
            .map(|d| d.events.as_slice())
    }
}

/// LLM security gateway for job-posting analysis
#[derive(Debug, Clone)]
pub struct Gateway {
    config: Config,
    matcher: PatternMatcher,
    issuer: TokenIssuer,
    assembler: PromptAssembler,
    validator: ResponseValidator,
}

impl Gateway {
    /// Build a gateway, creating audit sinks from `config.audit`
    pub fn new(config: Config) -> Result<Self> {
        let audit = AuditLogger::from_config(&config.audit)?;
        Self::with_audit(config, audit)
    }

    /// Build a gateway with a caller-supplied audit logger
    pub fn with_audit(config: Config, audit: AuditLogger) -> Result<Self> {
        config.validate()?;

        let patterns = match &config.patterns.file {
            Some(path) => Arc::new(PatternSet::from_file(path)?),
            None => PatternSet::builtin(),
        };

        let matcher = PatternMatcher::new(Arc::clone(&patterns), audit.clone())
            .with_precision(config.patterns.precision)
            .with_excerpt_radius(config.patterns.excerpt_radius);
        let validator = ResponseValidator::new(patterns, config.validator.clone(), audit)?
            .with_precision(config.patterns.precision)
            .with_excerpt_radius(config.patterns.excerpt_radius);

        tracing::debug!(
            patterns = matcher.patterns().version(),
            precision = ?config.patterns.precision,
            "gateway ready"
        );

        Ok(Self {
            issuer: TokenIssuer::new(config.token.clone())?,
            assembler: PromptAssembler::new(config.prompt.clone())?,
            matcher,
            validator,
            config,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Pattern set in use
    pub fn patterns(&self) -> &PatternSet {
        self.matcher.patterns()
    }

    /// Scan untrusted text; advisory only
    pub fn scan(&self, text: &str) -> Vec<DetectionEvent> {
        self.matcher.scan(text)
    }

    /// Scan raw LLM output for markers; advisory, the verdict comes from `validate`
    pub fn scan_output(&self, text: &str) -> Vec<DetectionEvent> {
        self.matcher.scan_output(text)
    }

    /// Issue a fresh token
    pub fn issue_token(&self) -> SecurityToken {
        self.issuer.issue()
    }

    /// Assemble a prompt with a caller-supplied token
    pub fn assemble(&self, text: &str, token: &SecurityToken, job_id: &str) -> AnalysisPrompt {
        self.assembler.assemble(text, token, job_id)
    }

    /// Prepare a single-job batch
    pub fn prepare(&self, job_id: &str, text: &str) -> PreparedBatch {
        self.prepare_batch(&[JobInput::new(job_id, text)])
    }

    /// Scan every job, issue one token and assemble the batch prompt.
    ///
    /// Job text reaches the prompt unchanged regardless of detections.
    pub fn prepare_batch(&self, jobs: &[JobInput<'_>]) -> PreparedBatch {
        let batch_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("prepare_batch", batch_id = %batch_id, jobs = jobs.len());
        let _guard = span.enter();

        let detections: Vec<JobDetections> = jobs
            .iter()
            .map(|job| JobDetections {
                job_id: job.job_id.to_string(),
                events: self.matcher.scan(job.text),
            })
            .collect();

        let token = self.issuer.issue();
        let prompt = self.assembler.assemble_batch(jobs, &token);

        let flagged = detections.iter().filter(|d| !d.events.is_empty()).count();
        if flagged > 0 {
            tracing::info!(flagged, "batch prepared with flagged jobs");
        } else {
            tracing::debug!(beacons = prompt.beacon_count(), "batch prepared");
        }

        PreparedBatch {
            batch_id,
            token,
            prompt,
            detections,
        }
    }

    /// Validate a response with no batch context
    pub fn validate(&self, raw_response: &str) -> std::result::Result<AnalysisResult, ValidationError> {
        self.validator.validate(raw_response)
    }

    /// Validate a response to `batch`, also rejecting token echoes and
    /// responses whose job identifiers differ from the batch
    pub fn validate_batch(
        &self,
        raw_response: &str,
        batch: &PreparedBatch,
    ) -> std::result::Result<AnalysisResult, ValidationError> {
        let expect = Expectation {
            batch_id: Some(&batch.batch_id),
            token: Some(&batch.token),
            job_ids: Some(batch.prompt.job_ids()),
        };
        self.validate_with(raw_response, expect)
    }

    /// Validate a response against an explicit expectation
    pub fn validate_with(
        &self,
        raw_response: &str,
        expect: Expectation<'_>,
    ) -> std::result::Result<AnalysisResult, ValidationError> {
        self.validator.validate_with(raw_response, expect)
    }
}
