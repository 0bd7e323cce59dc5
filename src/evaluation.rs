//! Offline evaluation harness.
//!
//! Scores assessments against labeled cases and aggregates detection,
//! organ-system, severity, urgency and causality metrics. Safety metrics
//! (under-triage, missed high-severity) gate production readiness.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::AssessmentEngine;
use crate::models::{IRAEAssessment, Likelihood, OrganSystem, PatientData, Severity, Urgency};

pub const MIN_SENSITIVITY: f64 = 0.95;
pub const MAX_UNDER_TRIAGE_RATE: f64 = 0.05;
pub const MIN_SEVERITY_WITHIN_ONE: f64 = 0.85;

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Cannot read case file {0}: {1}")]
    Io(String, std::io::Error),

    #[error("Cannot parse case file {0}: {1}")]
    Parse(String, serde_json::Error),
}

/// Ground truth for one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedOutcome {
    pub irae_detected: bool,
    pub severity: Severity,
    pub urgency: Urgency,
    #[serde(default)]
    pub affected_systems: Vec<OrganSystem>,
    pub likelihood: Likelihood,
    /// Allowed grade distance for the within-tolerance severity metric.
    #[serde(default = "default_tolerance")]
    pub severity_tolerance: u8,
}

fn default_tolerance() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCase {
    pub case_id: String,
    pub patient: PatientData,
    pub expected: ExpectedOutcome,
}

pub fn load_cases(path: &Path) -> Result<Vec<EvaluationCase>, EvaluationError> {
    let display = path.display().to_string();
    let json = std::fs::read_to_string(path).map_err(|e| EvaluationError::Io(display.clone(), e))?;
    serde_json::from_str(&json).map_err(|e| EvaluationError::Parse(display, e))
}

/// Scored outcome of one case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseResult {
    pub case_id: String,
    pub predicted_irae: bool,
    pub predicted_severity: Severity,
    pub predicted_urgency: Urgency,
    pub predicted_systems: Vec<OrganSystem>,
    pub predicted_likelihood: Likelihood,
    pub expected: ExpectedOutcome,
    pub irae_correct: bool,
    pub severity_exact: bool,
    pub severity_within_tolerance: bool,
    pub urgency_correct: bool,
    pub under_triage: bool,
    pub over_triage: bool,
    pub systems_precision: f64,
    pub systems_recall: f64,
    pub systems_f1: f64,
    pub likelihood_correct: bool,
    pub inference_ms: f64,
}

fn severity_rank(severity: Severity) -> i32 {
    match severity {
        Severity::Unknown => 0,
        Severity::Grade1 => 1,
        Severity::Grade2 => 2,
        Severity::Grade3 => 3,
        Severity::Grade4 => 4,
    }
}

/// Precision and recall of the predicted set; an empty set against an empty
/// set scores 1.0.
fn set_scores(predicted: &BTreeSet<OrganSystem>, expected: &BTreeSet<OrganSystem>) -> (f64, f64, f64) {
    let overlap = predicted.intersection(expected).count() as f64;
    let precision = if predicted.is_empty() {
        if expected.is_empty() { 1.0 } else { 0.0 }
    } else {
        overlap / predicted.len() as f64
    };
    let recall = if expected.is_empty() {
        if predicted.is_empty() { 1.0 } else { 0.0 }
    } else {
        overlap / expected.len() as f64
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (precision, recall, f1)
}

/// Score one assessment against its ground truth.
pub fn evaluate_case(
    case_id: &str,
    assessment: &IRAEAssessment,
    expected: &ExpectedOutcome,
    inference_ms: f64,
) -> CaseResult {
    let predicted_systems = assessment.detected_systems();
    let predicted_set: BTreeSet<_> = predicted_systems.iter().copied().collect();
    let expected_set: BTreeSet<_> = expected.affected_systems.iter().copied().collect();
    let (systems_precision, systems_recall, systems_f1) = set_scores(&predicted_set, &expected_set);

    let grade_distance =
        (severity_rank(assessment.overall_severity) - severity_rank(expected.severity)).abs();

    CaseResult {
        case_id: case_id.to_string(),
        predicted_irae: assessment.irae_detected,
        predicted_severity: assessment.overall_severity,
        predicted_urgency: assessment.urgency,
        predicted_systems,
        predicted_likelihood: assessment.causality.likelihood,
        expected: expected.clone(),
        irae_correct: assessment.irae_detected == expected.irae_detected,
        severity_exact: assessment.overall_severity == expected.severity,
        severity_within_tolerance: grade_distance <= i32::from(expected.severity_tolerance),
        urgency_correct: assessment.urgency == expected.urgency,
        under_triage: assessment.urgency < expected.urgency,
        over_triage: assessment.urgency > expected.urgency,
        systems_precision,
        systems_recall,
        systems_f1,
        likelihood_correct: assessment.causality.likelihood == expected.likelihood,
        inference_ms,
    }
}

/// Run every case through the engine, in order.
pub async fn run_evaluation(engine: &AssessmentEngine, cases: &[EvaluationCase]) -> Vec<CaseResult> {
    let mut results = Vec::with_capacity(cases.len());
    for case in cases {
        let start = Instant::now();
        let assessment = engine.assess(&case.patient).await;
        let inference_ms = start.elapsed().as_secs_f64() * 1000.0;
        let result = evaluate_case(&case.case_id, &assessment, &case.expected, inference_ms);
        tracing::debug!(
            case_id = %case.case_id,
            irae_correct = result.irae_correct,
            under_triage = result.under_triage,
            "Case evaluated"
        );
        results.push(result);
    }
    results
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateMetrics {
    pub total_cases: usize,
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub irae_accuracy: f64,
    pub irae_sensitivity: f64,
    pub irae_specificity: f64,
    pub systems_mean_precision: f64,
    pub systems_mean_recall: f64,
    pub systems_mean_f1: f64,
    pub severity_exact_accuracy: f64,
    pub severity_within_one_accuracy: f64,
    pub urgency_accuracy: f64,
    pub under_triage_rate: f64,
    pub over_triage_rate: f64,
    pub under_triage_count: usize,
    pub over_triage_count: usize,
    pub missed_high_severity: usize,
    pub likelihood_accuracy: f64,
    pub mean_inference_ms: f64,
}

impl AggregateMetrics {
    pub fn from_results(results: &[CaseResult]) -> Self {
        if results.is_empty() {
            return Self::default();
        }
        let total = results.len();
        let rate = |count: usize| count as f64 / total as f64;
        let mean = |f: fn(&CaseResult) -> f64| results.iter().map(f).sum::<f64>() / total as f64;
        let count = |f: fn(&CaseResult) -> bool| results.iter().filter(|r| f(r)).count();

        let true_positives = count(|r| r.expected.irae_detected && r.predicted_irae);
        let true_negatives = count(|r| !r.expected.irae_detected && !r.predicted_irae);
        let false_positives = count(|r| !r.expected.irae_detected && r.predicted_irae);
        let false_negatives = count(|r| r.expected.irae_detected && !r.predicted_irae);

        let within_one = results
            .iter()
            .filter(|r| (severity_rank(r.predicted_severity) - severity_rank(r.expected.severity)).abs() <= 1)
            .count();
        let missed_high_severity = count(|r| {
            severity_rank(r.expected.severity) >= 3 && severity_rank(r.predicted_severity) <= 2
        });
        let under_triage_count = count(|r| r.under_triage);
        let over_triage_count = count(|r| r.over_triage);

        Self {
            total_cases: total,
            true_positives,
            true_negatives,
            false_positives,
            false_negatives,
            irae_accuracy: rate(count(|r| r.irae_correct)),
            irae_sensitivity: ratio(true_positives, true_positives + false_negatives),
            irae_specificity: ratio(true_negatives, true_negatives + false_positives),
            systems_mean_precision: mean(|r| r.systems_precision),
            systems_mean_recall: mean(|r| r.systems_recall),
            systems_mean_f1: mean(|r| r.systems_f1),
            severity_exact_accuracy: rate(count(|r| r.severity_exact)),
            severity_within_one_accuracy: rate(within_one),
            urgency_accuracy: rate(count(|r| r.urgency_correct)),
            under_triage_rate: rate(under_triage_count),
            over_triage_rate: rate(over_triage_count),
            under_triage_count,
            over_triage_count,
            missed_high_severity,
            likelihood_accuracy: rate(count(|r| r.likelihood_correct)),
            mean_inference_ms: mean(|r| r.inference_ms),
        }
    }

    /// Human-readable list of unmet production criteria.
    pub fn failed_criteria(&self) -> Vec<String> {
        let mut failed = Vec::new();
        if self.irae_sensitivity < MIN_SENSITIVITY {
            failed.push(format!(
                "irAE sensitivity {:.1}% < {:.0}% target",
                self.irae_sensitivity * 100.0,
                MIN_SENSITIVITY * 100.0
            ));
        }
        if self.under_triage_rate > MAX_UNDER_TRIAGE_RATE {
            failed.push(format!(
                "Under-triage rate {:.1}% > {:.0}% limit",
                self.under_triage_rate * 100.0,
                MAX_UNDER_TRIAGE_RATE * 100.0
            ));
        }
        if self.missed_high_severity > 0 {
            failed.push(format!("Missed {} high-severity cases", self.missed_high_severity));
        }
        if self.severity_within_one_accuracy < MIN_SEVERITY_WITHIN_ONE {
            failed.push(format!(
                "Severity within-one accuracy {:.1}% < {:.0}% target",
                self.severity_within_one_accuracy * 100.0,
                MIN_SEVERITY_WITHIN_ONE * 100.0
            ));
        }
        failed
    }

    pub fn passes_production_criteria(&self) -> bool {
        self.total_cases > 0 && self.failed_criteria().is_empty()
    }
}

/// `numerator / denominator`, 0.0 for an empty denominator.
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
