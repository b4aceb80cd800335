//! Detection events.

use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::patterns::{CompiledPattern, Severity, ThreatCategory};

/// Default number of characters kept on each side of a match
pub const DEFAULT_EXCERPT_RADIUS: usize = 40;

/// Longest stretch of the match itself kept in an excerpt
const MAX_MATCH_CHARS: usize = 80;

/// Which side of the LLM call produced the text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    /// Untrusted job-description input
    Input,
    /// LLM response
    Output,
}

impl std::fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionSource::Input => write!(f, "input"),
            DetectionSource::Output => write!(f, "output"),
        }
    }
}

/// A single pattern match, recorded for security review.
///
/// Events are advisory. Producing one never alters the scanned text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Input or output side
    pub source: DetectionSource,
    /// Label of the matched pattern
    pub pattern_label: String,
    /// Category of the matched pattern
    pub category: ThreatCategory,
    /// Severity of the matched pattern
    pub severity: Severity,
    /// Bounded excerpt around the match
    pub text_sample: String,
    /// Byte offset of the match in the scanned text
    pub offset: usize,
    /// When the match was recorded
    pub timestamp: DateTime<Utc>,
}

impl DetectionEvent {
    /// Build an event for `pattern` matching `range` of `text`
    pub fn from_match(
        source: DetectionSource,
        pattern: &CompiledPattern,
        text: &str,
        range: Range<usize>,
        radius: usize,
    ) -> Self {
        Self {
            source,
            pattern_label: pattern.label().to_string(),
            category: pattern.pattern.category,
            severity: pattern.pattern.severity,
            text_sample: excerpt(text, range.clone(), radius),
            offset: range.start,
            timestamp: Utc::now(),
        }
    }
}

/// Extract up to `radius` characters either side of `range`.
///
/// Control characters are flattened to spaces so samples stay on one log
/// line. The result never exceeds `2 * radius + 80` characters.
pub fn excerpt(text: &str, range: Range<usize>, radius: usize) -> String {
    let before = &text[..range.start];
    let start = before
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map_or(range.start, |(i, _)| i);

    let after = &text[range.end..];
    let end = range.end + after.char_indices().nth(radius).map_or(after.len(), |(i, _)| i);

    text[start..end]
        .chars()
        .take(radius.saturating_mul(2).saturating_add(MAX_MATCH_CHARS))
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}
