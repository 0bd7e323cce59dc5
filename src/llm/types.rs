use serde::Deserialize;
use serde_json::Value;

use crate::models::{Likelihood, OrganSystem, RecommendedAction, Severity, Urgency};

/// Top-level keys of the assessment schema. An object carrying none of them
/// is not an assessment.
pub const SCHEMA_KEYS: &[&str] = &[
    "irae_detected",
    "affected_systems",
    "overall_severity",
    "urgency",
    "causality",
    "recommended_actions",
    "key_evidence",
];

/// One organ system as reported by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSystemFinding {
    pub system: OrganSystem,
    pub detected: bool,
    pub findings: Vec<String>,
    pub evidence: Vec<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelCausality {
    pub likelihood: Likelihood,
    pub reasoning: String,
    pub temporal_relationship: Option<String>,
    pub alternative_causes: Vec<String>,
    pub supporting_factors: Vec<String>,
    pub against_factors: Vec<String>,
}

/// Model-proposed assessment after lenient parsing. Unknown enum strings
/// degrade to Unknown / Routine / Uncertain; malformed array entries are
/// skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAssessment {
    pub irae_detected: bool,
    pub affected_systems: Vec<ModelSystemFinding>,
    pub overall_severity: Severity,
    pub severity_reasoning: Option<String>,
    pub urgency: Urgency,
    pub urgency_reasoning: Option<String>,
    pub causality: Option<ModelCausality>,
    pub recommended_actions: Vec<RecommendedAction>,
    pub key_evidence: Vec<String>,
}

#[derive(Deserialize)]
struct RawSystem {
    system: String,
    #[serde(default = "default_detected")]
    detected: bool,
    #[serde(default)]
    findings: Vec<String>,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    severity: Option<String>,
}

fn default_detected() -> bool {
    true
}

#[derive(Deserialize)]
struct RawCausality {
    #[serde(default)]
    likelihood: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    temporal_relationship: Option<String>,
    #[serde(default)]
    alternative_causes: Vec<String>,
    #[serde(default)]
    supporting_factors: Vec<String>,
    #[serde(default)]
    against_factors: Vec<String>,
}

#[derive(Deserialize)]
struct RawAction {
    action: String,
    #[serde(default)]
    priority: Option<Value>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Default priority for actions that omit one or give something unusable.
const DEFAULT_ACTION_PRIORITY: u8 = 3;

impl ModelAssessment {
    /// Build from a parsed JSON object. `None` when the object carries none
    /// of the schema keys.
    pub fn from_object(object: &serde_json::Map<String, Value>) -> Option<Self> {
        if !SCHEMA_KEYS.iter().any(|k| object.contains_key(*k)) {
            return None;
        }

        let affected_systems: Vec<ModelSystemFinding> =
            parse_array_lenient::<RawSystem>(object.get("affected_systems"))
                .into_iter()
                .filter_map(|raw| {
                    let system = OrganSystem::parse_lenient(&raw.system)?;
                    Some(ModelSystemFinding {
                        system,
                        detected: raw.detected,
                        findings: raw.findings,
                        evidence: raw.evidence,
                        severity: raw
                            .severity
                            .as_deref()
                            .map_or(Severity::Unknown, Severity::parse_lenient),
                    })
                })
                .collect();

        let irae_detected = object
            .get("irae_detected")
            .and_then(lenient_bool)
            .unwrap_or_else(|| affected_systems.iter().any(|s| s.detected));

        let causality = object
            .get("causality")
            .and_then(|v| serde_json::from_value::<RawCausality>(v.clone()).ok())
            .map(|raw| ModelCausality {
                likelihood: raw
                    .likelihood
                    .as_deref()
                    .map_or(Likelihood::Uncertain, Likelihood::parse_lenient),
                reasoning: raw.reasoning.unwrap_or_default(),
                temporal_relationship: raw.temporal_relationship,
                alternative_causes: raw.alternative_causes,
                supporting_factors: raw.supporting_factors,
                against_factors: raw.against_factors,
            });

        let recommended_actions = parse_array_lenient::<RawAction>(object.get("recommended_actions"))
            .into_iter()
            .filter(|raw| !raw.action.trim().is_empty())
            .map(|raw| {
                let priority = raw
                    .priority
                    .as_ref()
                    .and_then(lenient_priority)
                    .unwrap_or(DEFAULT_ACTION_PRIORITY);
                RecommendedAction::new(raw.action.trim(), priority, raw.rationale.as_deref())
            })
            .collect();

        Some(Self {
            irae_detected,
            affected_systems,
            overall_severity: text_field(object, "overall_severity")
                .map_or(Severity::Unknown, |s| Severity::parse_lenient(&s)),
            severity_reasoning: text_field(object, "severity_reasoning"),
            urgency: text_field(object, "urgency")
                .map_or(Urgency::Routine, |s| Urgency::parse_lenient(&s)),
            urgency_reasoning: text_field(object, "urgency_reasoning"),
            causality,
            recommended_actions,
            key_evidence: parse_array_lenient(object.get("key_evidence")),
        })
    }
}

/// Parse an array leniently, skipping items that fail to deserialize.
fn parse_array_lenient<T: for<'de> Deserialize<'de>>(value: Option<&Value>) -> Vec<T> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
        _ => vec![],
    }
}

fn text_field(object: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn lenient_priority(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    if number.is_finite() {
        Some(number.round().clamp(1.0, 5.0) as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Option<ModelAssessment> {
        ModelAssessment::from_object(value.as_object().unwrap())
    }

    #[test]
    fn full_payload_parses() {
        let parsed = parse(json!({
            "irae_detected": true,
            "affected_systems": [
                {"system": "Hepatic", "detected": true, "findings": ["AST 4.6x ULN"],
                 "evidence": ["AST = 185"], "severity": "Grade 2 - Moderate"}
            ],
            "overall_severity": "Grade 2 - Moderate",
            "urgency": "soon",
            "causality": {"likelihood": "Possible", "reasoning": "On pembrolizumab"},
            "recommended_actions": [{"action": "Repeat LFTs", "priority": 2}],
            "key_evidence": ["AST 185 U/L"]
        }))
        .unwrap();
        assert!(parsed.irae_detected);
        assert_eq!(parsed.affected_systems[0].system, OrganSystem::Hepatic);
        assert_eq!(parsed.overall_severity, Severity::Grade2);
        assert_eq!(parsed.urgency, Urgency::Soon);
        assert_eq!(parsed.causality.unwrap().likelihood, Likelihood::Possible);
        assert_eq!(parsed.recommended_actions[0].priority, 2);
    }

    #[test]
    fn unknown_strings_degrade() {
        let parsed = parse(json!({
            "overall_severity": "catastrophic?",
            "urgency": "whenever",
            "causality": {"likelihood": "no idea"}
        }))
        .unwrap();
        assert_eq!(parsed.overall_severity, Severity::Unknown);
        assert_eq!(parsed.urgency, Urgency::Routine);
        assert_eq!(parsed.causality.unwrap().likelihood, Likelihood::Uncertain);
    }

    #[test]
    fn bad_entries_are_skipped() {
        let parsed = parse(json!({
            "affected_systems": [
                {"system": "Spleen"},
                {"findings": ["no system key"]},
                {"system": "lungs", "severity": "3"}
            ],
            "recommended_actions": [
                {"action": "Chest CT", "priority": "1"},
                {"priority": 2},
                {"action": "Pulmonology", "priority": 9}
            ],
            "key_evidence": ["SpO2 89%", 42]
        }))
        .unwrap();
        assert_eq!(parsed.affected_systems.len(), 1);
        assert_eq!(parsed.affected_systems[0].system, OrganSystem::Pulmonary);
        assert_eq!(parsed.affected_systems[0].severity, Severity::Grade3);
        assert!(parsed.irae_detected);
        assert_eq!(parsed.recommended_actions.len(), 2);
        assert_eq!(parsed.recommended_actions[0].priority, 1);
        assert_eq!(parsed.recommended_actions[1].priority, 5);
        assert_eq!(parsed.key_evidence, vec!["SpO2 89%".to_string()]);
    }

    #[test]
    fn object_without_schema_keys_is_rejected() {
        assert!(parse(json!({"answer": "looks fine"})).is_none());
    }
}
