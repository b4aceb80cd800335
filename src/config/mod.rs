//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`JOBGUARD_*`)
//! - CLI arguments (for the `jobguard` binary)
//!
//! Every tunable from the security policy lives here rather than in code:
//! token shape, beacon density, schema bounds and match precision.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audit::AuditConfig;
use crate::error::{GatewayError, Result};
use crate::prompt::PromptPolicy;
use crate::security::{ScanPrecision, DEFAULT_EXCERPT_RADIUS};
use crate::token::TokenPolicy;
use crate::validator::ValidatorPolicy;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Pattern configuration
    #[serde(default)]
    pub patterns: PatternConfig,

    /// Security token policy
    #[serde(default)]
    pub token: TokenPolicy,

    /// Prompt beacon policy
    #[serde(default)]
    pub prompt: PromptPolicy,

    /// Response schema bounds
    #[serde(default)]
    pub validator: ValidatorPolicy,

    /// Audit sinks
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config file location (`<config_dir>/jobguard/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("jobguard").join("config.toml"))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env()
    }

    /// Resolve configuration: explicit file, else the default file if it
    /// exists, else defaults; then environment overrides; then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(default) => Self::from_file(default)?,
                None => Self::default(),
            },
        };
        let config = base.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `JOBGUARD_*` overrides from the process environment
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    pub fn apply_env_with(mut self, get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(file) = get("JOBGUARD_PATTERN_FILE") {
            self.patterns.file = Some(PathBuf::from(file));
        }
        if let Some(precision) = get("JOBGUARD_SCAN_PRECISION") {
            self.patterns.precision = precision.parse()?;
        }
        if let Some(prefix) = get("JOBGUARD_TOKEN_PREFIX") {
            self.token.prefix = prefix;
        }
        if let Some(val) = get("JOBGUARD_MIN_TOKEN_OCCURRENCES") {
            self.prompt.min_occurrences = parse_number("JOBGUARD_MIN_TOKEN_OCCURRENCES", &val)?;
        }
        if let Some(val) = get("JOBGUARD_MAX_JOB_ID_LEN") {
            self.validator.max_job_id_len = parse_number("JOBGUARD_MAX_JOB_ID_LEN", &val)?;
        }
        if let Some(path) = get("JOBGUARD_AUDIT_JSONL") {
            self.audit.jsonl_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Validate every policy section
    pub fn validate(&self) -> Result<()> {
        self.patterns.validate()?;
        self.token.validate()?;
        self.prompt.validate()?;
        self.validator.validate()?;
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|e| GatewayError::Config(format!("{key}={value:?} is not a number: {e}")))
}

/// Largest accepted excerpt radius (characters)
pub const MAX_EXCERPT_RADIUS: usize = 4096;

/// Pattern matching configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Optional TOML pattern file extending (or replacing) the built-ins
    pub file: Option<PathBuf>,

    /// Match precision
    pub precision: ScanPrecision,

    /// Characters kept either side of a match in audit samples
    pub excerpt_radius: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            file: None,
            precision: ScanPrecision::Strict,
            excerpt_radius: DEFAULT_EXCERPT_RADIUS,
        }
    }
}

impl PatternConfig {
    /// Keep audit samples bounded
    pub fn validate(&self) -> Result<()> {
        if self.excerpt_radius > MAX_EXCERPT_RADIUS {
            return Err(GatewayError::Config(format!(
                "patterns excerpt_radius {} exceeds the maximum of {MAX_EXCERPT_RADIUS}",
                self.excerpt_radius
            )));
        }
        Ok(())
    }
}
