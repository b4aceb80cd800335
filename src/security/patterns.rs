//! Injection signatures for rule-based detection.
//!
//! Two lists are kept:
//! - **input** patterns run over untrusted job-description text before it is
//!   wrapped into a prompt
//! - **output** markers run over the LLM response and indicate that injected
//!   instructions succeeded (self-disclosure, refusal framing, prompt leaks)
//!
//! Both lists are data. The built-in set can be extended or replaced by a TOML
//! pattern file without touching the matching engine.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Version of the built-in pattern set
pub const PATTERN_SET_VERSION: &str = "2.2.0";

/// Audit severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational keyword hit
    Low,
    /// Suspicious but plausible in benign text
    Medium,
    /// Known attack phrasing
    High,
    /// Evidence of a successful attack
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Threat categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    /// Prompt injection
    Injection,
    /// Jailbreak attempt
    Jailbreak,
    /// System prompt extraction
    Extraction,
    /// Attempts to steer the analysis verdict
    Manipulation,
    /// Malformed or obfuscated payload
    Malformed,
    /// Model talking about itself instead of the job
    SelfDisclosure,
    /// Model refusing the task
    Refusal,
    /// Prompt or instruction leakage
    Leakage,
}

impl std::fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreatCategory::Injection => write!(f, "injection"),
            ThreatCategory::Jailbreak => write!(f, "jailbreak"),
            ThreatCategory::Extraction => write!(f, "extraction"),
            ThreatCategory::Manipulation => write!(f, "manipulation"),
            ThreatCategory::Malformed => write!(f, "malformed"),
            ThreatCategory::SelfDisclosure => write!(f, "self_disclosure"),
            ThreatCategory::Refusal => write!(f, "refusal"),
            ThreatCategory::Leakage => write!(f, "leakage"),
        }
    }
}

/// How the `pattern` field is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Regular expression
    #[default]
    Regex,
    /// Literal substring
    Substring,
}

/// Precision tier of a pattern.
///
/// `Strict` patterns are phrase-level signatures. `Loose` patterns fire on
/// isolated keywords ("ignore", "instructions") and accept false positives on
/// benign postings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternTier {
    /// Always evaluated
    #[default]
    Strict,
    /// Evaluated only under [`ScanPrecision::Loose`]
    Loose,
}

/// Which pattern tiers a scan evaluates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPrecision {
    /// Phrase-level patterns only
    #[default]
    Strict,
    /// Phrase-level and keyword patterns
    Loose,
}

impl ScanPrecision {
    /// Whether patterns of `tier` run at this precision
    pub fn admits(self, tier: PatternTier) -> bool {
        match self {
            ScanPrecision::Strict => tier == PatternTier::Strict,
            ScanPrecision::Loose => true,
        }
    }
}

impl std::str::FromStr for ScanPrecision {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(ScanPrecision::Strict),
            "loose" => Ok(ScanPrecision::Loose),
            other => Err(GatewayError::Config(format!(
                "Unknown scan precision '{other}' (expected strict or loose)"
            ))),
        }
    }
}

/// An injection signature: (pattern, severity, label) plus classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionPattern {
    /// Pattern label, reported in detection events
    pub label: Cow<'static, str>,
    /// Regex or substring
    #[serde(default)]
    pub kind: PatternKind,
    /// Pattern source
    pub pattern: Cow<'static, str>,
    /// Severity of a match
    pub severity: Severity,
    /// Threat category
    pub category: ThreatCategory,
    /// Precision tier
    #[serde(default)]
    pub tier: PatternTier,
    /// Description
    #[serde(default)]
    pub description: Cow<'static, str>,
}

const fn builtin(
    label: &'static str,
    kind: PatternKind,
    pattern: &'static str,
    severity: Severity,
    category: ThreatCategory,
    tier: PatternTier,
    description: &'static str,
) -> InjectionPattern {
    InjectionPattern {
        label: Cow::Borrowed(label),
        kind,
        pattern: Cow::Borrowed(pattern),
        severity,
        category,
        tier,
        description: Cow::Borrowed(description),
    }
}

use PatternKind::{Regex as Re, Substring as Sub};
use PatternTier::{Loose, Strict};
use Severity::{Critical, High, Low, Medium};
use ThreatCategory::{
    Extraction, Injection, Jailbreak, Leakage, Malformed, Manipulation, Refusal, SelfDisclosure,
};

/// Input-side signatures (job description text)
pub static INPUT_PATTERNS: &[InjectionPattern] = &[
    builtin(
        "ignore_instructions",
        Re,
        r"ignore\s+(all\s+)?(the\s+)?(previous|prior|above|earlier)\s+(instructions?|prompts?|rules?|directions?)",
        High,
        Injection,
        Strict,
        "Attempts to override system instructions",
    ),
    builtin(
        "disregard_instructions",
        Re,
        r"disregard\s+(all\s+)?(the\s+)?(previous|prior|above|earlier)\s+(instructions?|prompts?|rules?)",
        High,
        Injection,
        Strict,
        "Attempts to disregard the task prompt",
    ),
    builtin(
        "forget_instructions",
        Re,
        r"forget\s+(your|all|previous|prior)\s+(instructions?|rules?|training)",
        High,
        Injection,
        Strict,
        "Attempts to make the model forget constraints",
    ),
    builtin(
        "override_instructions",
        Re,
        r"(override|overwrite)\s+(your|the|all)\s+(previous\s+|system\s+)?(instructions?|rules?|guidelines?)",
        High,
        Injection,
        Strict,
        "Explicit instruction override",
    ),
    builtin(
        "new_instructions",
        Re,
        r"your\s+new\s+(instructions?|rules?|role|task)\s+(are|is|:)",
        High,
        Injection,
        Strict,
        "Attempts to inject new instructions",
    ),
    builtin(
        "system_prompt_extract",
        Re,
        r"(show|reveal|print|output|repeat|display|tell)\s+(me\s+)?(your\s+)?(system\s+)?(prompt|instructions)",
        High,
        Extraction,
        Strict,
        "Attempts to extract the system prompt",
    ),
    builtin(
        "fake_system_tag",
        Re,
        r"(\[system\]|<\|?system\|?>|###\s*system\b|<<\s*sys\s*>>)",
        High,
        Injection,
        Strict,
        "Fake system message markup",
    ),
    builtin(
        "role_override",
        Re,
        r"you\s+are\s+(now|actually)\s+(a|an|the)\s+",
        Medium,
        Injection,
        Strict,
        "Attempts to override the model role",
    ),
    builtin(
        "pretend_mode",
        Re,
        r"(pretend|act|behave)\s+(you\s+)?(are|as\s+if|like)\s+(you\s+)?(are\s+)?(a|an|the)?\s*(unrestricted|unfiltered|evil)",
        High,
        Injection,
        Strict,
        "Roleplay bypass",
    ),
    builtin(
        "verdict_manipulation",
        Re,
        r"(mark|classify|rate|flag|label|report)\s+(this|the)\s+(job|posting|listing|position)\s+as\s+(authentic|legitimate|genuine|verified|safe)",
        High,
        Manipulation,
        Strict,
        "Attempts to dictate the authenticity verdict",
    ),
    builtin(
        "delimiter_escape",
        Sub,
        "END_JOB_DESCRIPTION",
        High,
        Injection,
        Strict,
        "Attempts to close the job description block early",
    ),
    builtin(
        "dan_mode",
        Re,
        r"\bdan\s+mode\b|do\s+anything\s+now",
        Critical,
        Jailbreak,
        Strict,
        "DAN (Do Anything Now) jailbreak",
    ),
    builtin(
        "developer_mode",
        Re,
        r"(enter|enable|activate)\s+(developer|dev)\s+mode",
        High,
        Jailbreak,
        Strict,
        "Fake developer mode activation",
    ),
    builtin(
        "jailbreak_explicit",
        Re,
        r"jailbreak|jail\s+break",
        High,
        Jailbreak,
        Strict,
        "Explicit jailbreak mention",
    ),
    builtin(
        "bypass_explicit",
        Re,
        r"bypass\s+(all\s+)?(safety|content|ethical|security)\s+(filters?|restrictions?|guidelines?)",
        High,
        Jailbreak,
        Strict,
        "Explicit bypass attempt",
    ),
    builtin(
        "unrestricted_mode",
        Re,
        r"(unrestricted|unfiltered|uncensored|unethical)\s+mode",
        High,
        Jailbreak,
        Strict,
        "Unrestricted mode request",
    ),
    builtin(
        "null_bytes",
        Re,
        r"\x00|\\u0000",
        High,
        Malformed,
        Strict,
        "Null byte injection",
    ),
    builtin(
        "unicode_override",
        Re,
        r"[\x{202A}-\x{202E}\x{2066}-\x{2069}]",
        Medium,
        Malformed,
        Strict,
        "Bidirectional override characters",
    ),
    builtin(
        "keyword_ignore",
        Re,
        r"\bignore\b",
        Low,
        Injection,
        Loose,
        "Isolated 'ignore' keyword",
    ),
    builtin(
        "keyword_instructions",
        Re,
        r"\binstructions?\b",
        Low,
        Injection,
        Loose,
        "Isolated 'instructions' keyword",
    ),
    builtin(
        "keyword_previous",
        Re,
        r"\b(previous|prior)\b",
        Low,
        Injection,
        Loose,
        "Isolated 'previous' keyword",
    ),
    builtin(
        "keyword_system_prompt",
        Sub,
        "system prompt",
        Medium,
        Extraction,
        Loose,
        "Mention of a system prompt",
    ),
    builtin(
        "plain_system_label",
        Re,
        r"(^|\n)\s*system\s*:",
        Medium,
        Injection,
        Loose,
        "Line starting with 'system:'",
    ),
    builtin(
        "no_limits",
        Re,
        r"(no|without|remove)\s+(limits?|restrictions?|boundaries|constraints?)",
        Low,
        Jailbreak,
        Loose,
        "No limits request",
    ),
];

/// Output-side markers: evidence the model abandoned the analysis task
pub static OUTPUT_MARKERS: &[InjectionPattern] = &[
    builtin(
        "ai_self_reference",
        Re,
        r"\b(i\s+am|i'm)\s+(just\s+)?(an?\s+)?(ai|artificial\s+intelligence|(large\s+)?language\s+model|llm|chatbot|virtual\s+assistant)\b",
        Critical,
        SelfDisclosure,
        Strict,
        "First-person AI self-reference",
    ),
    builtin(
        "language_model_disclosure",
        Re,
        r"\bas\s+an?\s+((large\s+)?language\s+model|llm|ai\s+(language\s+model|assistant|model))\b|\bas\s+an\s+ai\s*([,.:;]|\s+i\b)",
        Critical,
        SelfDisclosure,
        Strict,
        "'As a language model' framing",
    ),
    builtin(
        "ai_framing",
        Re,
        r"\bas\s+an\s+ai\b",
        Medium,
        SelfDisclosure,
        Loose,
        "Bare 'as an AI', also common in AI job descriptions",
    ),
    builtin(
        "refusal",
        Re,
        r"\bi\s+(cannot|can't|can\s+not|am\s+unable\s+to|won't|will\s+not)\s+(help|assist|comply|analy[sz]e|provide|do\s+that|fulfill|complete)",
        Critical,
        Refusal,
        Strict,
        "Explicit refusal",
    ),
    builtin(
        "apology_refusal",
        Re,
        r"\bi('m|\s+am)\s+sorry,?\s+(but\s+)?i\b|\bi\s+apologi[sz]e\b",
        Critical,
        Refusal,
        Strict,
        "Apologetic refusal framing",
    ),
    builtin(
        "instruction_disclosure",
        Re,
        r"\bmy\s+(instructions|programming|guidelines|system\s+prompt|initial\s+prompt)\b",
        Critical,
        Leakage,
        Strict,
        "Model describing its own instructions",
    ),
    builtin(
        "system_prompt_mention",
        Re,
        r"\b(my|the|your|this)\s+system\s+prompt\b",
        Critical,
        Leakage,
        Strict,
        "System prompt disclosure",
    ),
    builtin(
        "system_prompt_keyword",
        Sub,
        "system prompt",
        Medium,
        Leakage,
        Loose,
        "Bare 'system prompt', also a legitimate skill name",
    ),
    builtin(
        "instructions_ignored",
        Re,
        r"\b(ignoring|ignored|disregarding|disregarded)\s+(all\s+)?(previous|prior|the|my)\s+instructions\b",
        Critical,
        Injection,
        Strict,
        "Model acknowledging it ignored its instructions",
    ),
    builtin(
        "jailbreak_marker",
        Re,
        r"jailbreak|jail\s+break|\bdan\s+mode\b|developer\s+mode\s+(enabled|activated|on)",
        Critical,
        Jailbreak,
        Strict,
        "Jailbreak acknowledgement",
    ),
    builtin(
        "override_acknowledgement",
        Re,
        r"\b(new\s+instructions\s+(accepted|received|acknowledged)|instructions\s+overridden|override\s+successful|pwned)\b",
        Critical,
        Injection,
        Strict,
        "Acknowledgement of injected instructions",
    ),
];

/// A pattern with its compiled regex
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    /// Source pattern
    pub pattern: InjectionPattern,
    regex: Regex,
}

impl CompiledPattern {
    /// Compile a pattern. Matching is always case-insensitive.
    pub fn compile(pattern: InjectionPattern) -> Result<Self> {
        let source = match pattern.kind {
            PatternKind::Regex => pattern.pattern.to_string(),
            PatternKind::Substring => regex::escape(&pattern.pattern),
        };
        let regex = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|source| GatewayError::Pattern {
                label: pattern.label.to_string(),
                source,
            })?;
        Ok(Self { pattern, regex })
    }

    /// Pattern label
    pub fn label(&self) -> &str {
        &self.pattern.label
    }

    /// Byte ranges of every non-overlapping match in `text`
    pub fn find_all<'t>(&'t self, text: &'t str) -> impl Iterator<Item = std::ops::Range<usize>> + 't {
        self.regex.find_iter(text).map(|m| m.range())
    }

    /// First match in `text`, if any
    pub fn find(&self, text: &str) -> Option<std::ops::Range<usize>> {
        self.regex.find(text).map(|m| m.range())
    }
}

/// TOML pattern file
///
/// ```toml
/// version = "acme-1"
/// replace_builtin = false
///
/// [[input]]
/// label = "salary_bait"
/// kind = "substring"
/// pattern = "wire the registration fee"
/// severity = "high"
/// category = "manipulation"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternFile {
    /// Version of the custom set
    #[serde(default)]
    pub version: Option<String>,
    /// Replace the built-in lists instead of extending them
    #[serde(default)]
    pub replace_builtin: bool,
    /// Extra input patterns
    #[serde(default)]
    pub input: Vec<InjectionPattern>,
    /// Extra output markers
    #[serde(default)]
    pub output: Vec<InjectionPattern>,
}

/// Compiled, immutable input and output pattern lists
#[derive(Debug, Clone)]
pub struct PatternSet {
    version: String,
    input: Vec<CompiledPattern>,
    output: Vec<CompiledPattern>,
}

lazy_static! {
    /// Compiled built-in pattern set
    static ref BUILTIN_SET: Arc<PatternSet> = Arc::new(PatternSet {
        version: PATTERN_SET_VERSION.to_string(),
        input: INPUT_PATTERNS
            .iter()
            .filter_map(|p| CompiledPattern::compile(p.clone()).ok())
            .collect(),
        output: OUTPUT_MARKERS
            .iter()
            .filter_map(|p| CompiledPattern::compile(p.clone()).ok())
            .collect(),
    });
}

impl PatternSet {
    /// Shared built-in set, compiled once per process
    pub fn builtin() -> Arc<PatternSet> {
        Arc::clone(&BUILTIN_SET)
    }

    /// Compile a set from raw patterns
    pub fn compile(
        version: impl Into<String>,
        input: Vec<InjectionPattern>,
        output: Vec<InjectionPattern>,
    ) -> Result<Self> {
        Ok(Self {
            version: version.into(),
            input: input
                .into_iter()
                .map(CompiledPattern::compile)
                .collect::<Result<_>>()?,
            output: output
                .into_iter()
                .map(CompiledPattern::compile)
                .collect::<Result<_>>()?,
        })
    }

    /// Build a set from a parsed pattern file, extending or replacing the built-ins
    pub fn from_pattern_file(file: PatternFile) -> Result<Self> {
        let (mut input, mut output) = if file.replace_builtin {
            (Vec::new(), Vec::new())
        } else {
            (INPUT_PATTERNS.to_vec(), OUTPUT_MARKERS.to_vec())
        };
        input.extend(file.input);
        output.extend(file.output);

        let version = file.version.unwrap_or_else(|| format!("{PATTERN_SET_VERSION}+custom"));
        Self::compile(version, input, output)
    }

    /// Parse a TOML pattern file
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: PatternFile = toml::from_str(content)?;
        Self::from_pattern_file(file)
    }

    /// Load a TOML pattern file from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("Failed to read pattern file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Set version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Input-side patterns
    pub fn input(&self) -> &[CompiledPattern] {
        &self.input
    }

    /// Output-side markers
    pub fn output(&self) -> &[CompiledPattern] {
        &self.output
    }
}
