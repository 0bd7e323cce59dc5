//! Structured Output Reconciler.
//!
//! Calls the model, extracts a single JSON object from whatever it returned
//! and parses it leniently into a `ModelAssessment`. Failed attempts are
//! retried up to a fixed budget; after that the caller gets a typed error or
//! the deterministic fallback payload.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;

use super::types::ModelAssessment;
use super::{LlmClient, LlmError};

/// Attempts per reconciliation, retries included.
pub const DEFAULT_MAX_ATTEMPTS: usize = 2;

pub const MANUAL_REVIEW_ACTION: &str =
    "Manual clinical review required - automated assessment could not be completed";

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Model call failed: {0}")]
    Client(#[from] LlmError),

    #[error("No JSON object found in model response")]
    NoJsonObject,

    #[error("Model JSON does not match the assessment schema")]
    SchemaMismatch,

    #[error("All {attempts} attempts failed, last error: {last}")]
    AttemptsExhausted { attempts: usize, last: String },

    #[error("Model assessment timed out after {0}s")]
    Timeout(u64),

    #[error("Model task failed: {0}")]
    Task(String),
}

/// Outcome of `reconcile_or_fallback`.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    Parsed(ModelAssessment),
    /// Deterministic degraded payload plus the reason it was used.
    Fallback { payload: ModelAssessment, reason: String },
}

pub struct StructuredOutputReconciler {
    client: Arc<dyn LlmClient>,
    model: String,
    max_attempts: usize,
}

impl StructuredOutputReconciler {
    pub fn new(client: Arc<dyn LlmClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Call the model until a schema-conforming object is parsed or the
    /// attempt budget is spent.
    pub fn reconcile(&self, prompt: &str, system: &str) -> Result<ModelAssessment, ReconcileError> {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.attempt(prompt, system) {
                Ok(parsed) => {
                    tracing::debug!(attempt, model = %self.model, "Model assessment parsed");
                    return Ok(parsed);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Model assessment attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(ReconcileError::AttemptsExhausted {
            attempts: self.max_attempts,
            last: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Like `reconcile`, but total failure yields the fallback payload.
    pub fn reconcile_or_fallback(&self, prompt: &str, system: &str) -> Reconciled {
        match self.reconcile(prompt, system) {
            Ok(parsed) => Reconciled::Parsed(parsed),
            Err(e) => Reconciled::Fallback {
                payload: fallback_assessment(),
                reason: e.to_string(),
            },
        }
    }

    fn attempt(&self, prompt: &str, system: &str) -> Result<ModelAssessment, ReconcileError> {
        let response = self.client.generate(&self.model, prompt, system)?;
        parse_model_response(&response)
    }
}

/// Extract and parse one model response.
pub fn parse_model_response(response: &str) -> Result<ModelAssessment, ReconcileError> {
    let object = extract_json_object(response).ok_or(ReconcileError::NoJsonObject)?;
    ModelAssessment::from_object(&object).ok_or(ReconcileError::SchemaMismatch)
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// Find a JSON object in free-form model output. Strategies, in order: the
/// whole text, a ```json fence, any fence, the first brace-balanced object,
/// and the span from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();
    let candidates = [
        Some(trimmed),
        fenced_block(trimmed, "```json"),
        fenced_block(trimmed, "```"),
        balanced_object(trimmed),
        outer_braces(trimmed),
    ];
    candidates.into_iter().flatten().find_map(parse_object)
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn fenced_block<'a>(text: &'a str, opener: &str) -> Option<&'a str> {
    let start = text.find(opener)? + opener.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    let block = &rest[..end];
    // A generic fence may still carry a language tag on its first line.
    match block.split_once('\n') {
        Some((tag, body)) if !tag.contains('{') && !tag.trim().is_empty() => Some(body),
        _ => Some(block),
    }
}

/// First `{` through its matching `}`, skipping braces inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Deterministic payload used when the model path fails: nothing detected,
/// routine urgency, and an explicit manual-review action.
pub fn fallback_payload() -> Value {
    json!({
        "irae_detected": false,
        "affected_systems": [],
        "overall_severity": "Unknown",
        "severity_reasoning": "Automated assessment unavailable",
        "urgency": "routine",
        "urgency_reasoning": "Automated assessment unavailable - manual review required",
        "causality": {
            "likelihood": "Uncertain",
            "reasoning": "Automated assessment unavailable"
        },
        "recommended_actions": [
            {"action": MANUAL_REVIEW_ACTION, "priority": 1,
             "rationale": "Model output could not be parsed"}
        ],
        "key_evidence": []
    })
}

pub fn fallback_assessment() -> ModelAssessment {
    fallback_payload()
        .as_object()
        .and_then(ModelAssessment::from_object)
        .unwrap_or_else(|| ModelAssessment {
            irae_detected: false,
            affected_systems: Vec::new(),
            overall_severity: crate::models::Severity::Unknown,
            severity_reasoning: None,
            urgency: crate::models::Urgency::Routine,
            urgency_reasoning: None,
            causality: None,
            recommended_actions: Vec::new(),
            key_evidence: Vec::new(),
        })
}
