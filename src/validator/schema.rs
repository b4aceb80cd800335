//! Typed schema checks for analysis responses.
//!
//! Each required field is pulled out of the decoded JSON with a typed
//! accessor; the first mismatch becomes a [`ValidationError::SchemaViolation`]
//! naming the full field path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ValidatorPolicy;
use crate::error::ValidationError;

type Fields = Map<String, Value>;

/// Skills sub-object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillsAnalysis {
    /// Most relevant skills, in the model's order
    pub top_skills: Vec<String>,
    /// Any other fields the model returned
    #[serde(flatten)]
    pub extra: Fields,
}

/// Authenticity sub-object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticityCheck {
    /// Whether the posting looks genuine
    pub is_authentic: bool,
    /// Model confidence
    pub confidence_score: f64,
    /// Any other fields the model returned
    #[serde(flatten)]
    pub extra: Fields,
}

/// Industry sub-object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryClassification {
    /// Primary industry label
    pub primary_industry: String,
    /// Any other fields the model returned
    #[serde(flatten)]
    pub extra: Fields,
}

/// Validated analysis of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAnalysis {
    /// Skills
    pub skills_analysis: SkillsAnalysis,
    /// Authenticity
    pub authenticity_check: AuthenticityCheck,
    /// Industry
    pub industry_classification: IndustryClassification,
}

/// Validated response: job identifier to analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult {
    jobs: BTreeMap<String, JobAnalysis>,
}

impl AnalysisResult {
    /// Analysis for `job_id`
    pub fn get(&self, job_id: &str) -> Option<&JobAnalysis> {
        self.jobs.get(job_id)
    }

    /// Job identifiers, sorted
    pub fn job_ids(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    /// Iterate over (job_id, analysis)
    pub fn iter(&self) -> impl Iterator<Item = (&str, &JobAnalysis)> {
        self.jobs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of jobs
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// No jobs
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Consume into the underlying map
    pub fn into_inner(self) -> BTreeMap<String, JobAnalysis> {
        self.jobs
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn mismatch(path: &str, expected: &str, found: &Value) -> ValidationError {
    ValidationError::schema(path, format!("expected {expected}, found {}", type_name(found)))
}

fn require<'a>(fields: &'a Fields, parent: &str, key: &str) -> Result<(&'a Value, String), ValidationError> {
    let path = format!("{parent}.{key}");
    match fields.get(key) {
        Some(value) => Ok((value, path)),
        None => Err(ValidationError::schema(path, "missing required field")),
    }
}

fn require_object<'a>(fields: &'a Fields, parent: &str, key: &str) -> Result<(&'a Fields, String), ValidationError> {
    let (value, path) = require(fields, parent, key)?;
    match value {
        Value::Object(map) => Ok((map, path)),
        other => Err(mismatch(&path, "object", other)),
    }
}

fn require_str<'a>(fields: &'a Fields, parent: &str, key: &str) -> Result<(&'a str, String), ValidationError> {
    let (value, path) = require(fields, parent, key)?;
    match value {
        Value::String(s) => Ok((s.as_str(), path)),
        other => Err(mismatch(&path, "string", other)),
    }
}

fn require_bool(fields: &Fields, parent: &str, key: &str) -> Result<bool, ValidationError> {
    let (value, path) = require(fields, parent, key)?;
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(mismatch(&path, "boolean", other)),
    }
}

fn require_f64(fields: &Fields, parent: &str, key: &str) -> Result<(f64, String), ValidationError> {
    let (value, path) = require(fields, parent, key)?;
    match value.as_f64() {
        Some(n) => Ok((n, path)),
        None => Err(mismatch(&path, "number", value)),
    }
}

fn require_list<'a>(fields: &'a Fields, parent: &str, key: &str) -> Result<(&'a [Value], String), ValidationError> {
    let (value, path) = require(fields, parent, key)?;
    match value {
        Value::Array(items) => Ok((items.as_slice(), path)),
        other => Err(mismatch(&path, "list", other)),
    }
}

fn without(fields: &Fields, keys: &[&str]) -> Fields {
    fields
        .iter()
        .filter(|(k, _)| !keys.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Path of the response root, used when the response is a bare list
const ROOT_PATH: &str = "$";

/// Locate the list of per-job entries.
///
/// Accepts `{"analysis_results": [...]}` (key configurable) or a bare list,
/// whose entries are reported as `$[i]`.
fn entries<'a>(value: &'a Value, policy: &ValidatorPolicy) -> Result<(&'a [Value], String), ValidationError> {
    let key = policy.results_key.as_str();
    let (items, path) = match value {
        Value::Array(items) => (items.as_slice(), ROOT_PATH.to_string()),
        Value::Object(fields) => match fields.get(key) {
            Some(Value::Array(items)) => (items.as_slice(), key.to_string()),
            Some(other) => return Err(mismatch(key, "list", other)),
            None => {
                return Err(ValidationError::schema(
                    key,
                    "missing top-level list of analysis entries",
                ))
            },
        },
        other => return Err(mismatch(ROOT_PATH, "object or list", other)),
    };

    if items.is_empty() {
        return Err(ValidationError::schema(path, "contains no analysis entries"));
    }
    Ok((items, path))
}

fn parse_entry(
    entry: &Value,
    path: &str,
    policy: &ValidatorPolicy,
) -> Result<(String, JobAnalysis), ValidationError> {
    let Value::Object(fields) = entry else {
        return Err(mismatch(path, "object", entry));
    };

    let (job_id, id_path) = require_str(fields, path, "job_id")?;
    if job_id.trim().is_empty() {
        return Err(ValidationError::schema(id_path, "must not be empty"));
    }
    let id_len = job_id.chars().count();
    if id_len > policy.max_job_id_len {
        return Err(ValidationError::schema(
            id_path,
            format!("length {id_len} exceeds maximum of {}", policy.max_job_id_len),
        ));
    }

    let (skills, skills_path) = require_object(fields, path, "skills_analysis")?;
    let (raw_skills, list_path) = require_list(skills, &skills_path, "top_skills")?;
    let mut top_skills = Vec::with_capacity(raw_skills.len());
    for (i, skill) in raw_skills.iter().enumerate() {
        let item_path = format!("{list_path}[{i}]");
        let Value::String(skill) = skill else {
            return Err(mismatch(&item_path, "string", skill));
        };
        let len = skill.chars().count();
        if len > policy.max_skill_len {
            return Err(ValidationError::schema(
                item_path,
                format!("length {len} exceeds maximum of {}", policy.max_skill_len),
            ));
        }
        top_skills.push(skill.clone());
    }

    let (auth, auth_path) = require_object(fields, path, "authenticity_check")?;
    let is_authentic = require_bool(auth, &auth_path, "is_authentic")?;
    let (confidence_score, score_path) = require_f64(auth, &auth_path, "confidence_score")?;
    if !confidence_score.is_finite()
        || confidence_score < policy.min_confidence
        || confidence_score > policy.max_confidence
    {
        return Err(ValidationError::schema(
            score_path,
            format!(
                "value {confidence_score} outside {}..={}",
                policy.min_confidence, policy.max_confidence
            ),
        ));
    }

    let (industry, industry_path) = require_object(fields, path, "industry_classification")?;
    let (primary_industry, _) = require_str(industry, &industry_path, "primary_industry")?;

    let analysis = JobAnalysis {
        skills_analysis: SkillsAnalysis {
            top_skills,
            extra: without(skills, &["top_skills"]),
        },
        authenticity_check: AuthenticityCheck {
            is_authentic,
            confidence_score,
            extra: without(auth, &["is_authentic", "confidence_score"]),
        },
        industry_classification: IndustryClassification {
            primary_industry: primary_industry.to_string(),
            extra: without(industry, &["primary_industry"]),
        },
    };

    Ok((job_id.to_string(), analysis))
}

/// Check the response shape and build the typed result.
///
/// Reports the first violation found, in document order.
pub fn parse_analysis(value: &Value, policy: &ValidatorPolicy) -> Result<AnalysisResult, ValidationError> {
    let (items, list_path) = entries(value, policy)?;
    let mut jobs = BTreeMap::new();

    for (i, entry) in items.iter().enumerate() {
        let path = format!("{list_path}[{i}]");
        let (job_id, analysis) = parse_entry(entry, &path, policy)?;
        if jobs.contains_key(&job_id) {
            return Err(ValidationError::schema(
                format!("{path}.job_id"),
                format!("duplicate job_id '{job_id}'"),
            ));
        }
        jobs.insert(job_id, analysis);
    }

    Ok(AnalysisResult { jobs })
}

/// Whether `value` satisfies the analysis schema
pub fn is_valid_json_structure(value: &Value, policy: &ValidatorPolicy) -> bool {
    parse_analysis(value, policy).is_ok()
}
