//! Injection-success checks on response content.
//!
//! Runs independently of the schema: a well-formed envelope whose values were
//! written by an attacker ("Jailbreak successful" as a skill) still fails.

use serde_json::Value;

use crate::security::{excerpt, CompiledPattern, ScanPrecision};
use crate::token::SecurityToken;

/// Label reported when a response echoes the batch token
pub const TOKEN_ECHO_LABEL: &str = "security_token_echo";

/// Output marker hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHit {
    /// Marker label
    pub label: String,
    /// Bounded excerpt around the match
    pub sample: String,
}

fn scan_str(
    text: &str,
    markers: &[CompiledPattern],
    precision: ScanPrecision,
    radius: usize,
) -> Option<ContentHit> {
    markers
        .iter()
        .filter(|m| precision.admits(m.pattern.tier))
        .find_map(|m| {
            m.find(text).map(|range| ContentHit {
                label: m.label().to_string(),
                sample: excerpt(text, range, radius),
            })
        })
}

fn walk(value: &Value, visit: &mut dyn FnMut(&str) -> Option<ContentHit>) -> Option<ContentHit> {
    match value {
        Value::String(s) => visit(s),
        Value::Array(items) => items.iter().find_map(|v| walk(v, visit)),
        Value::Object(fields) => fields
            .iter()
            .find_map(|(k, v)| visit(k).or_else(|| walk(v, visit))),
        Value::Null | Value::Bool(_) | Value::Number(_) => None,
    }
}

/// First output marker found in any key or string value of `value`
pub fn find_non_job_content(
    value: &Value,
    markers: &[CompiledPattern],
    precision: ScanPrecision,
    radius: usize,
) -> Option<ContentHit> {
    walk(value, &mut |s| scan_str(s, markers, precision, radius))
}

/// First output marker found in raw, undecoded response text
pub fn find_in_raw(
    raw: &str,
    markers: &[CompiledPattern],
    precision: ScanPrecision,
    radius: usize,
) -> Option<ContentHit> {
    scan_str(raw, markers, precision, radius)
}

/// Whether `value` shows signs the model abandoned the analysis task
pub fn contains_non_job_content(value: &Value, markers: &[CompiledPattern]) -> bool {
    find_non_job_content(value, markers, ScanPrecision::Strict, 0).is_some()
}

/// Response text that repeats the prompt's security token
pub fn find_token_echo(raw: &str, token: &SecurityToken, radius: usize) -> Option<ContentHit> {
    raw.find(token.as_str()).map(|start| ContentHit {
        label: TOKEN_ECHO_LABEL.to_string(),
        sample: excerpt(raw, start..start + token.as_str().len(), radius),
    })
}
