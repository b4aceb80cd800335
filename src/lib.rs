//! # Jobguard - LLM Security Gateway for Job-Posting Analysis
//!
//! Defends an LLM-backed job-posting analyzer against prompt injection hidden
//! in untrusted job descriptions. The gateway never sends anything to a model
//! itself: it prepares prompts and judges responses around the caller's LLM
//! call.
//!
//! ## Features
//!
//! - **Pattern matching**: advisory flags for injection phrasing in job text
//! - **Security tokens**: high-entropy per-batch tokens that bound the prompt
//! - **Prompt assembly**: token beacons around untouched job text
//! - **Response validation**: strict schema plus injection-success markers
//! - **Audit logging**: every detection and rejection, fire-and-forget
//!
//! ## Pipeline
//!
//! ```text
//!   job text (untrusted)
//!        │
//!        ├──> PatternMatcher ──> DetectionEvent ──┐
//!        │                                        │
//!        v                                        v
//!   PromptAssembler <── TokenIssuer          AuditLogger
//!        │                                        ^
//!        v                                        │
//!   [ caller's LLM call ]                         │
//!        │                                        │
//!        v                                        │
//!   ResponseValidator ──> ValidationError ────────┘
//!        │
//!        v
//!   AnalysisResult
//! ```
//!
//! Detection never blocks and never rewrites job text. The validator is the
//! only component that rejects anything, and a rejection is final for that
//! response.
//!
//! ## Rejection Kinds
//!
//! | Kind               | Severity | Meaning                                   |
//! |--------------------|----------|-------------------------------------------|
//! | `malformed`        | medium   | Response is not JSON                      |
//! | `schema_violation` | medium   | JSON, but not the expected analysis shape |
//! | `injection_success`| critical | Response shows the model left its task    |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jobguard::{Config, Gateway};
//!
//! let gateway = Gateway::new(Config::default())?;
//!
//! let batch = gateway.prepare("job-42", "Senior Rust engineer, remote, 5+ years");
//! if batch.has_detections() {
//!     // advisory only; the prompt still carries the original text
//! }
//!
//! let raw = call_llm(batch.prompt.as_str());
//! match gateway.validate_batch(&raw, &batch) {
//!     Ok(result) => println!("{} jobs analyzed", result.len()),
//!     Err(rejection) => eprintln!("rejected: {rejection}"),
//! }
//! ```
//!
//! ## Modules
//!
//! - [`security`]: Injection patterns and the pattern matcher
//! - [`token`]: Security token policy and issuer
//! - [`prompt`]: Analysis prompt assembly
//! - [`validator`]: Response schema and content checks
//! - [`audit`]: Audit records and sinks
//! - [`gateway`]: Facade tying the pipeline together
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod audit;
pub mod config;
pub mod error;
pub mod gateway;
pub mod prompt;
pub mod security;
pub mod token;
pub mod validator;

// Re-exports for convenience
pub use audit::{AuditLogger, AuditRecord, AuditSink};
pub use config::Config;
pub use error::{GatewayError, Result, ValidationError};
pub use gateway::{Gateway, JobDetections, PreparedBatch};
pub use prompt::{AnalysisPrompt, JobInput, PromptAssembler};
pub use security::{DetectionEvent, PatternMatcher, PatternSet, ScanPrecision, Severity};
pub use token::{SecurityToken, TokenIssuer};
pub use validator::{AnalysisResult, ResponseValidator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
