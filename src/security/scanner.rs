//! Pattern matcher for untrusted input.
//!
//! Scanning is observational: the text is never modified. Every match becomes
//! a [`DetectionEvent`] that is forwarded to the audit logger before `scan`
//! returns, and the caller proceeds with the original text plus the flags.

use std::sync::Arc;

use super::event::{DetectionEvent, DetectionSource, DEFAULT_EXCERPT_RADIUS};
use super::patterns::{CompiledPattern, PatternSet, ScanPrecision, Severity};
use crate::audit::AuditLogger;

/// Run `patterns` admitted by `precision` over `text`, one event per match
fn detect(
    patterns: &[CompiledPattern],
    precision: ScanPrecision,
    source: DetectionSource,
    text: &str,
    radius: usize,
) -> Vec<DetectionEvent> {
    patterns
        .iter()
        .filter(|p| precision.admits(p.pattern.tier))
        .flat_map(|p| {
            p.find_all(text)
                .map(move |range| DetectionEvent::from_match(source, p, text, range, radius))
        })
        .collect()
}

/// Scans job-description text for injection signatures
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    patterns: Arc<PatternSet>,
    precision: ScanPrecision,
    excerpt_radius: usize,
    audit: AuditLogger,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(PatternSet::builtin(), AuditLogger::tracing())
    }
}

impl PatternMatcher {
    /// Create a matcher over `patterns` reporting to `audit`
    pub fn new(patterns: Arc<PatternSet>, audit: AuditLogger) -> Self {
        Self {
            patterns,
            precision: ScanPrecision::default(),
            excerpt_radius: DEFAULT_EXCERPT_RADIUS,
            audit,
        }
    }

    /// Set match precision
    pub fn with_precision(mut self, precision: ScanPrecision) -> Self {
        self.precision = precision;
        self
    }

    /// Set excerpt radius (characters either side of a match)
    pub fn with_excerpt_radius(mut self, radius: usize) -> Self {
        self.excerpt_radius = radius;
        self
    }

    /// Current precision
    pub fn precision(&self) -> ScanPrecision {
        self.precision
    }

    /// Pattern set in use
    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Scan `text` and audit every match.
    ///
    /// Returns an empty list for clean (or empty) text. Imposes no length
    /// limit; callers should truncate pathological inputs themselves.
    pub fn scan(&self, text: &str) -> Vec<DetectionEvent> {
        let events = detect(
            self.patterns.input(),
            self.precision,
            DetectionSource::Input,
            text,
            self.excerpt_radius,
        );

        for event in &events {
            self.audit.record(event.clone());
        }

        if !events.is_empty() {
            tracing::debug!(
                matches = events.len(),
                max_severity = %max_severity(&events).unwrap_or(Severity::Low),
                "input scan flagged text"
            );
        }

        events
    }

    /// Scan raw LLM output for injection-success markers and audit every match.
    ///
    /// The validator rejects on the first marker; this reports all of them,
    /// for review tooling that wants the full picture of a hijacked reply.
    pub fn scan_output(&self, text: &str) -> Vec<DetectionEvent> {
        let events = detect(
            self.patterns.output(),
            self.precision,
            DetectionSource::Output,
            text,
            self.excerpt_radius,
        );
        for event in &events {
            self.audit.record(event.clone());
        }
        events
    }
}

/// Highest severity among `events`
pub fn max_severity(events: &[DetectionEvent]) -> Option<Severity> {
    events.iter().map(|e| e.severity).max()
}
