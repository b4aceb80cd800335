//! Response validation.
//!
//! One decision per call, no retries:
//!
//! ```text
//! raw text ──parse──> Value ──content check──> schema check ──> AnalysisResult
//!     │                 │           │                │
//!     │ (not JSON)      │           │ marker hit     │ bad shape
//!     v                 v           v                v
//!  raw marker scan   Malformed   InjectionSuccess  SchemaViolation
//! ```
//!
//! The content check runs before the schema check so that injection success
//! takes precedence: a response that both fails the schema and shows the
//! model went off-task is reported as `InjectionSuccess`. Unparseable text is
//! still scanned for markers, since a plain-prose refusal is the most common
//! shape of a hijacked reply.
//!
//! Every rejection is sent to the audit logger before it is returned.

mod content;
mod schema;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::AuditLogger;
use crate::error::{GatewayError, Result, ValidationError};
use crate::security::{PatternSet, ScanPrecision, DEFAULT_EXCERPT_RADIUS};
use crate::token::SecurityToken;

pub use content::{
    contains_non_job_content, find_in_raw, find_non_job_content, find_token_echo, ContentHit,
    TOKEN_ECHO_LABEL,
};
pub use schema::{
    is_valid_json_structure, parse_analysis, AnalysisResult, AuthenticityCheck,
    IndustryClassification, JobAnalysis, SkillsAnalysis,
};

/// Default maximum `job_id` length (characters)
pub const DEFAULT_MAX_JOB_ID_LEN: usize = 100;

/// Default maximum skill name length (characters)
pub const DEFAULT_MAX_SKILL_LEN: usize = 100;

/// Default key holding the per-job entries
pub const DEFAULT_RESULTS_KEY: &str = "analysis_results";

/// Schema bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorPolicy {
    /// Top-level key holding the entry list
    pub results_key: String,
    /// Longest accepted `job_id`
    pub max_job_id_len: usize,
    /// Longest accepted skill name
    pub max_skill_len: usize,
    /// Lowest accepted `confidence_score`
    pub min_confidence: f64,
    /// Highest accepted `confidence_score`
    pub max_confidence: f64,
}

impl Default for ValidatorPolicy {
    fn default() -> Self {
        Self {
            results_key: DEFAULT_RESULTS_KEY.to_string(),
            max_job_id_len: DEFAULT_MAX_JOB_ID_LEN,
            max_skill_len: DEFAULT_MAX_SKILL_LEN,
            min_confidence: 0.0,
            max_confidence: 100.0,
        }
    }
}

impl ValidatorPolicy {
    /// Reject inconsistent bounds
    pub fn validate(&self) -> Result<()> {
        if self.results_key.is_empty() {
            return Err(GatewayError::Config("validator results_key must not be empty".into()));
        }
        if self.max_job_id_len == 0 || self.max_skill_len == 0 {
            return Err(GatewayError::Config(
                "validator length limits must be at least 1".into(),
            ));
        }
        if !(self.min_confidence.is_finite()
            && self.max_confidence.is_finite()
            && self.min_confidence <= self.max_confidence)
        {
            return Err(GatewayError::Config(format!(
                "validator confidence range {}..={} is invalid",
                self.min_confidence, self.max_confidence
            )));
        }
        Ok(())
    }
}

/// What a batch response is checked against beyond the schema
#[derive(Debug, Clone, Copy)]
pub struct Expectation<'a> {
    /// Batch identifier, for audit records
    pub batch_id: Option<&'a str>,
    /// Token that must not be echoed back
    pub token: Option<&'a SecurityToken>,
    /// Job identifiers the response must cover, one entry each
    pub job_ids: Option<&'a [String]>,
}

impl Expectation<'static> {
    /// No batch context
    pub const NONE: Self = Expectation {
        batch_id: None,
        token: None,
        job_ids: None,
    };
}

/// Validates LLM analysis responses
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    patterns: Arc<PatternSet>,
    policy: ValidatorPolicy,
    precision: ScanPrecision,
    excerpt_radius: usize,
    audit: AuditLogger,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self {
            patterns: PatternSet::builtin(),
            policy: ValidatorPolicy::default(),
            precision: ScanPrecision::default(),
            excerpt_radius: DEFAULT_EXCERPT_RADIUS,
            audit: AuditLogger::tracing(),
        }
    }
}

impl ResponseValidator {
    /// Create a validator after checking `policy`
    pub fn new(patterns: Arc<PatternSet>, policy: ValidatorPolicy, audit: AuditLogger) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            patterns,
            policy,
            audit,
            ..Self::default()
        })
    }

    /// Set marker precision
    pub fn with_precision(mut self, precision: ScanPrecision) -> Self {
        self.precision = precision;
        self
    }

    /// Set excerpt radius
    pub fn with_excerpt_radius(mut self, radius: usize) -> Self {
        self.excerpt_radius = radius;
        self
    }

    /// Policy in use
    pub fn policy(&self) -> &ValidatorPolicy {
        &self.policy
    }

    /// Validate a response with no batch context
    pub fn validate(&self, raw_response: &str) -> std::result::Result<AnalysisResult, ValidationError> {
        self.validate_with(raw_response, Expectation::NONE)
    }

    /// Validate a response against its batch: also rejects token echoes,
    /// job identifiers that were not part of the batch and batch jobs the
    /// response left out.
    pub fn validate_with(
        &self,
        raw_response: &str,
        expect: Expectation<'_>,
    ) -> std::result::Result<AnalysisResult, ValidationError> {
        match self.decide(raw_response, expect) {
            Ok(result) => {
                tracing::debug!(jobs = result.len(), "response accepted");
                Ok(result)
            },
            Err(err) => {
                self.audit.record_rejection(&err, expect.batch_id);
                Err(err)
            },
        }
    }

    fn decide(
        &self,
        raw: &str,
        expect: Expectation<'_>,
    ) -> std::result::Result<AnalysisResult, ValidationError> {
        if let Some(token) = expect.token {
            if let Some(hit) = find_token_echo(raw, token, self.excerpt_radius) {
                return Err(injection(hit));
            }
        }

        let body = strip_code_fence(raw);
        let value: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(parse_err) => {
                let markers = self.patterns.output();
                return Err(match find_in_raw(raw, markers, self.precision, self.excerpt_radius) {
                    Some(hit) => injection(hit),
                    None => ValidationError::Malformed(parse_err.to_string()),
                });
            },
        };

        if let Some(hit) =
            find_non_job_content(&value, self.patterns.output(), self.precision, self.excerpt_radius)
        {
            return Err(injection(hit));
        }

        let result = parse_analysis(&value, &self.policy)?;

        if let Some(expected) = expect.job_ids {
            if let Some(unknown) = result.job_ids().find(|id| !expected.iter().any(|e| e.as_str() == *id)) {
                return Err(ValidationError::schema(
                    "job_id",
                    format!("'{unknown}' was not part of the batch"),
                ));
            }
            if let Some(missing) = expected.iter().find(|id| result.get(id.as_str()).is_none()) {
                return Err(ValidationError::schema(
                    "job_id",
                    format!("'{missing}' from the batch has no entry"),
                ));
            }
        }

        Ok(result)
    }
}

fn injection(hit: ContentHit) -> ValidationError {
    ValidationError::InjectionSuccess {
        pattern: hit.label,
        sample: hit.sample,
    }
}

/// Strip one surrounding Markdown code fence (```json ... ```), if present
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    match rest.find('\n') {
        Some(newline) => rest[newline + 1..].trim(),
        None => rest.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::token::TokenIssuer;

    const VALID: &str = r#"{"analysis_results":[{"job_id":"job-1","skills_analysis":{"top_skills":["Excel","SEO"]},"authenticity_check":{"is_authentic":true,"confidence_score":0.9},"industry_classification":{"primary_industry":"Marketing"}}]}"#;

    fn validator() -> (ResponseValidator, Arc<MemorySink>) {
        let memory = Arc::new(MemorySink::new());
        let audit = AuditLogger::disabled().with_sink(memory.clone());
        let validator =
            ResponseValidator::new(PatternSet::builtin(), ValidatorPolicy::default(), audit)
                .unwrap();
        (validator, memory)
    }

    #[test]
    fn test_accepts_valid() {
        let (validator, memory) = validator();
        let result = validator.validate(VALID).unwrap();
        assert_eq!(result.len(), 1);
        assert!(memory.is_empty());
    }

    #[test]
    fn test_malformed() {
        let (validator, memory) = validator();
        let err = validator.validate("{not json").unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
        assert_eq!(memory.rejections().len(), 1);
    }

    #[test]
    fn test_prose_refusal_is_injection() {
        let (validator, _) = validator();
        let err = validator
            .validate("I'm sorry, but I cannot help with analyzing this posting.")
            .unwrap_err();
        assert_eq!(err.kind(), "injection_success");
    }

    #[test]
    fn test_injection_precedes_schema() {
        let (validator, memory) = validator();
        let err = validator
            .validate(r#"{"message":"I am an AI assistant and cannot analyze jobs."}"#)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InjectionSuccess { ref pattern, .. } if pattern == "ai_self_reference"));
        assert_eq!(memory.rejections()[0].severity, crate::security::Severity::Critical);
    }

    #[test]
    fn test_schema_valid_but_hijacked() {
        let (validator, _) = validator();
        let raw = VALID.replace("\"SEO\"", "\"Jailbreak successful\"");
        let err = validator.validate(&raw).unwrap_err();
        assert!(matches!(err, ValidationError::InjectionSuccess { .. }));
    }

    #[test]
    fn test_code_fence_accepted() {
        let (validator, _) = validator();
        let fenced = format!("```json\n{VALID}\n```");
        assert!(validator.validate(&fenced).is_ok());
    }

    #[test]
    fn test_token_echo_rejected() {
        let (validator, _) = validator();
        let token = TokenIssuer::default().issue();
        let raw = VALID.replace("Marketing", token.as_str());
        let expect = Expectation {
            token: Some(&token),
            ..Expectation::NONE
        };
        let err = validator.validate_with(&raw, expect).unwrap_err();
        assert!(matches!(err, ValidationError::InjectionSuccess { ref pattern, .. } if pattern == TOKEN_ECHO_LABEL));
    }

    #[test]
    fn test_unknown_job_rejected() {
        let (validator, memory) = validator();
        let expected = vec!["job-2".to_string()];
        let expect = Expectation {
            batch_id: Some("b-1"),
            job_ids: Some(&expected),
            ..Expectation::NONE
        };
        let err = validator.validate_with(VALID, expect).unwrap_err();
        assert!(matches!(err, ValidationError::SchemaViolation { ref field, .. } if field == "job_id"));
        assert_eq!(memory.rejections()[0].batch_id.as_deref(), Some("b-1"));
    }

    #[test]
    fn test_missing_batch_job_rejected() {
        let (validator, _) = validator();
        let expected = vec!["job-1".to_string(), "job-2".to_string()];
        let expect = Expectation {
            job_ids: Some(&expected),
            ..Expectation::NONE
        };
        match validator.validate_with(VALID, expect) {
            Err(ValidationError::SchemaViolation { field, reason }) => {
                assert_eq!(field, "job_id");
                assert!(reason.contains("job-2"));
            },
            other => panic!("expected schema violation, got {other:?}"),
        }

        let exact = vec!["job-1".to_string()];
        let expect = Expectation {
            job_ids: Some(&exact),
            ..Expectation::NONE
        };
        assert!(validator.validate_with(VALID, expect).is_ok());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("  {}  "), "{}");
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```{}```"), "{}");
        assert_eq!(strip_code_fence("```json\n{}"), "```json\n{}");
    }

    #[test]
    fn test_policy_validation() {
        let policy = ValidatorPolicy {
            min_confidence: 10.0,
            max_confidence: 1.0,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }
}
