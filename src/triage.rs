//! Causality, severity aggregation and the urgency safety floor.
//!
//! The floor is non-bypassable: `enforce_safety_floor` runs last on every
//! assessment, whichever path proposed the severity and urgency, and only
//! ever raises urgency.

use crate::models::{
    AssessmentPath, CausalityAssessment, ConfidenceScore, IRAEAssessment, ImmunotherapyContext,
    Likelihood, OrganSystem, OrganSystemFinding, PatientData, RecommendedAction, Severity,
    Urgency,
};

/// Systems whose detection alone requires same-day review.
pub const ESCALATING_SYSTEMS: [OrganSystem; 3] = [
    OrganSystem::Cardiac,
    OrganSystem::Neurologic,
    OrganSystem::Pulmonary,
];

/// Confidence multiplier when the model path failed and rules stood in.
pub const FALLBACK_CONFIDENCE_FACTOR: f64 = 0.8;

/// Evidence strength assumed when nothing was detected.
const BASELINE_EVIDENCE_STRENGTH: f64 = 0.3;

static HOLD_TERMS: &[&str] = &["hold", "discontinue", "stop"];
static STEROID_TERMS: &[&str] = &["steroid", "prednisone", "methylprednisolone"];
static CARDIAC_WORKUP_TERMS: &[&str] = &["troponin", "ecg", "ekg"];
static NEURO_CONSULT_TERMS: &[&str] = &["neurology", "neuro"];

// ---------------------------------------------------------------------------
// Causality
// ---------------------------------------------------------------------------

/// Decision table over exposure, detection and combination therapy.
pub fn assess_causality(context: &ImmunotherapyContext, irae_detected: bool) -> CausalityAssessment {
    let (likelihood, reasoning) = match (context.on_immunotherapy, irae_detected) {
        (false, _) => (
            Likelihood::Unlikely,
            "No checkpoint inhibitor exposure documented",
        ),
        (true, true) if context.combination_therapy => (
            Likelihood::HighlyLikely,
            "Patient on combination immunotherapy with organ-specific findings",
        ),
        (true, true) => (
            Likelihood::Possible,
            "Patient on immunotherapy with organ-specific findings",
        ),
        (true, false) => (
            Likelihood::Uncertain,
            "Immunotherapy exposure without organ-specific findings",
        ),
    };

    let mut supporting_factors = Vec::new();
    let mut against_factors = Vec::new();
    if context.on_immunotherapy {
        supporting_factors.push(format!("Checkpoint inhibitor exposure: {}", context.agents.join(", ")));
        if context.combination_therapy {
            let classes: Vec<_> = context.drug_classes.iter().map(|c| c.as_str()).collect();
            supporting_factors.push(format!("Combination therapy ({})", classes.join(" + ")));
        }
    } else {
        against_factors.push("No checkpoint inhibitor in medications or notes".to_string());
    }
    if irae_detected {
        supporting_factors.push("Organ-specific irAE pattern detected".to_string());
    } else {
        against_factors.push("No organ-specific irAE pattern detected".to_string());
    }

    CausalityAssessment {
        likelihood,
        reasoning: reasoning.to_string(),
        temporal_relationship: context
            .most_recent_dose
            .map(|date| format!("Most recent checkpoint inhibitor started {date}")),
        alternative_causes: Vec::new(),
        supporting_factors,
        against_factors,
    }
}

// ---------------------------------------------------------------------------
// Severity and urgency
// ---------------------------------------------------------------------------

/// Maximum-ranked severity over detected findings. Signals are never averaged.
pub fn aggregate_severity(findings: &[OrganSystemFinding]) -> Severity {
    findings
        .iter()
        .filter(|f| f.detected)
        .map(OrganSystemFinding::graded_severity)
        .max()
        .unwrap_or(Severity::Unknown)
}

pub fn severity_floor(severity: Severity) -> Urgency {
    match severity {
        Severity::Grade4 => Urgency::Emergency,
        Severity::Grade3 => Urgency::Urgent,
        Severity::Grade2 => Urgency::Soon,
        Severity::Grade1 | Severity::Unknown => Urgency::Routine,
    }
}

/// First detected escalating system, if any.
pub fn escalating_system(findings: &[OrganSystemFinding]) -> Option<OrganSystem> {
    findings
        .iter()
        .find(|f| f.detected && ESCALATING_SYSTEMS.contains(&f.system))
        .map(|f| f.system)
}

/// Lowest urgency any assessment with this severity and these findings may
/// carry.
pub fn minimum_urgency(severity: Severity, findings: &[OrganSystemFinding]) -> Urgency {
    let organ = escalating_system(findings).map_or(Urgency::Routine, |_| Urgency::Urgent);
    severity_floor(severity).max(organ)
}

/// Raise urgency to the floor and add any missing safety actions. Returns
/// one line per correction; an empty list means nothing was changed.
pub fn enforce_safety_floor(assessment: &mut IRAEAssessment) -> Vec<String> {
    let mut corrections = Vec::new();

    let severity = assessment.overall_severity;
    let by_severity = severity_floor(severity);
    if assessment.urgency < by_severity {
        corrections.push(format!(
            "SAFETY: Upgraded urgency from {} to {} (minimum for {})",
            assessment.urgency, by_severity, severity
        ));
        assessment.urgency = by_severity;
    }
    if let Some(system) = escalating_system(&assessment.affected_systems) {
        if assessment.urgency < Urgency::Urgent {
            corrections.push(format!(
                "SAFETY: Upgraded urgency from {} to {} ({} involvement)",
                assessment.urgency,
                Urgency::Urgent,
                system
            ));
            assessment.urgency = Urgency::Urgent;
        }
    }
    if !corrections.is_empty() {
        assessment.urgency_reasoning = urgency_reasoning(assessment.urgency, severity);
    }

    corrections.extend(add_safety_actions(
        &mut assessment.recommended_actions,
        severity,
        &assessment.affected_systems,
    ));
    finalize_actions(&mut assessment.recommended_actions);

    for correction in &corrections {
        tracing::warn!(
            severity = %severity,
            urgency = %assessment.urgency,
            correction = %correction,
            "Safety floor correction applied"
        );
    }
    corrections
}

pub fn severity_reasoning(severity: Severity, findings: &[OrganSystemFinding]) -> String {
    let systems: Vec<_> = findings
        .iter()
        .filter(|f| f.detected)
        .map(|f| f.system.as_str())
        .collect();
    if systems.is_empty() {
        return "No organ-specific irAE findings".to_string();
    }
    format!("Based on {} findings in {}", severity, systems.join(", "))
}

pub fn urgency_reasoning(urgency: Urgency, severity: Severity) -> String {
    match urgency {
        Urgency::Emergency => format!("{severity} findings requiring immediate evaluation"),
        Urgency::Urgent => format!("{severity} findings requiring same-day oncology evaluation"),
        Urgency::Soon => format!("{severity} findings - recommend oncology review within 1-3 days"),
        Urgency::Routine => {
            "Findings appropriate for routine monitoring at next scheduled visit".to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Recommended actions
// ---------------------------------------------------------------------------

fn organ_actions(system: OrganSystem) -> Vec<RecommendedAction> {
    match system {
        OrganSystem::Gastrointestinal => vec![
            RecommendedAction::new("Send stool studies (C. difficile, culture) and consider GI consultation", 2, Some("Evaluate for immune-mediated colitis")),
        ],
        OrganSystem::Hepatic => vec![
            RecommendedAction::new("Check liver function tests (AST, ALT, bilirubin, ALP)", 2, Some("Monitor hepatic irAE")),
        ],
        OrganSystem::Pulmonary => vec![
            RecommendedAction::new("Obtain chest imaging (CT chest preferred) if not recently performed", 2, Some("Evaluate for pneumonitis")),
            RecommendedAction::new("Consider pulmonology consultation", 2, Some("Pneumonitis can progress rapidly")),
        ],
        OrganSystem::Endocrine => vec![
            RecommendedAction::new("Check thyroid function (TSH, free T4) and morning cortisol", 2, Some("Evaluate endocrine irAE")),
        ],
        OrganSystem::Dermatologic => vec![
            RecommendedAction::new("Document rash extent (% BSA) and consider dermatology referral", 2, Some("Grade skin toxicity and exclude SJS/TEN")),
        ],
        OrganSystem::Neurologic => vec![
            RecommendedAction::new("Obtain urgent neurology consultation", 1, Some("Neurologic irAEs can progress rapidly")),
        ],
        OrganSystem::Cardiac => vec![
            RecommendedAction::new("Check troponin, BNP, and obtain ECG", 1, Some("Cardiac irAEs can be life-threatening")),
            RecommendedAction::new("Obtain cardiology consultation", 1, Some("Rule out immune myocarditis")),
        ],
        OrganSystem::Renal => vec![
            RecommendedAction::new("Check renal function (BUN, creatinine, urinalysis with microscopy)", 2, Some("Monitor for immune-related nephritis")),
            RecommendedAction::new("Consider nephrology consultation if creatinine rising", 2, Some("Early nephrology input may prevent progression")),
        ],
        OrganSystem::Hematologic => vec![
            RecommendedAction::new("Check CBC with differential, reticulocyte count, LDH, haptoglobin", 2, Some("Evaluate for immune-related cytopenias")),
            RecommendedAction::new("Consider hematology consultation for severe cytopenias", 2, Some("May need bone marrow biopsy or specialized treatment")),
        ],
        OrganSystem::Musculoskeletal | OrganSystem::Ocular => vec![
            RecommendedAction::new(format!("Evaluate {} symptoms with the treating team", system.as_str().to_lowercase()), 3, None),
        ],
    }
}

/// Deterministic actions for the rule-based path, priority-ordered.
pub fn rule_based_actions(
    irae_detected: bool,
    severity: Severity,
    findings: &[OrganSystemFinding],
) -> Vec<RecommendedAction> {
    if !irae_detected {
        return vec![RecommendedAction::new(
            "Continue current monitoring",
            3,
            Some("No irAE signals detected"),
        )];
    }

    let mut actions = Vec::new();
    if severity >= Severity::Grade3 {
        actions.push(RecommendedAction::new(
            "Consider holding immunotherapy pending evaluation",
            1,
            Some("Severe toxicity may require treatment interruption"),
        ));
        actions.push(RecommendedAction::new(
            "Consider systemic corticosteroids per irAE management guidelines",
            1,
            Some("Grade 3-4 irAEs are treated with high-dose steroids"),
        ));
        actions.push(RecommendedAction::new(
            "Obtain urgent oncology consultation",
            1,
            Some("Severe irAE requires specialist input"),
        ));
    }
    for finding in findings.iter().filter(|f| f.detected) {
        actions.extend(organ_actions(finding.system));
    }
    actions.push(RecommendedAction::new(
        "Document findings and communicate with oncology team",
        3,
        Some("Ensure care coordination"),
    ));

    finalize_actions(&mut actions);
    actions
}

fn mentions_any(actions: &[RecommendedAction], terms: &[&str]) -> bool {
    actions.iter().any(|a| {
        let lower = a.action.to_lowercase();
        terms.iter().any(|t| lower.contains(t))
    })
}

/// Insert the actions no assessment may omit. Returns a correction line for
/// each one that had to be added.
pub fn add_safety_actions(
    actions: &mut Vec<RecommendedAction>,
    severity: Severity,
    findings: &[OrganSystemFinding],
) -> Vec<String> {
    let mut added = Vec::new();
    let detected = |system| findings.iter().any(|f| f.detected && f.system == system);

    if severity >= Severity::Grade3 {
        if !mentions_any(actions, HOLD_TERMS) {
            actions.push(RecommendedAction::new(
                "Consider holding/discontinuing immunotherapy pending evaluation",
                1,
                Some("Grade 3-4 toxicity typically requires treatment interruption"),
            ));
            added.push("SAFETY: Added immunotherapy hold recommendation for severe toxicity".to_string());
        }
        if !mentions_any(actions, STEROID_TERMS) {
            actions.push(RecommendedAction::new(
                "Consider systemic corticosteroids per irAE management guidelines",
                1,
                Some("Grade 3-4 irAEs are treated with high-dose steroids"),
            ));
            added.push("SAFETY: Added corticosteroid recommendation for severe toxicity".to_string());
        }
    }
    if detected(OrganSystem::Cardiac) && !mentions_any(actions, CARDIAC_WORKUP_TERMS) {
        actions.push(RecommendedAction::new(
            "URGENT: Check troponin, BNP, and obtain ECG - rule out myocarditis",
            1,
            Some("Immune myocarditis carries high mortality and needs immediate workup"),
        ));
        added.push("SAFETY: Added cardiac workup recommendation".to_string());
    }
    if detected(OrganSystem::Neurologic) && !mentions_any(actions, NEURO_CONSULT_TERMS) {
        actions.push(RecommendedAction::new(
            "Obtain urgent neurology consultation",
            1,
            Some("Neurologic irAEs can progress rapidly"),
        ));
        added.push("SAFETY: Added neurology consultation recommendation".to_string());
    }
    added
}

/// Stable sort by priority, then drop repeated action texts.
pub fn finalize_actions(actions: &mut Vec<RecommendedAction>) {
    actions.sort_by_key(|a| a.priority);
    let mut seen = std::collections::HashSet::new();
    actions.retain(|a| seen.insert(a.action.trim().to_lowercase()));
}

pub fn manual_review_action() -> RecommendedAction {
    RecommendedAction::new(
        "Manual clinical review required - automated clinical reasoning unavailable",
        1,
        Some("Model-assisted assessment failed; this result is rule-based only"),
    )
}

// ---------------------------------------------------------------------------
// Evidence and confidence
// ---------------------------------------------------------------------------

/// Up to `per_system` evidence lines from each detected finding, appended to
/// `leading` without repeats and capped at `cap`.
pub fn key_evidence(
    leading: Vec<String>,
    findings: &[OrganSystemFinding],
    per_system: usize,
    cap: usize,
) -> Vec<String> {
    let mut evidence = Vec::new();
    let from_findings = findings
        .iter()
        .filter(|f| f.detected)
        .flat_map(|f| f.evidence.iter().take(per_system).cloned());
    for line in leading.into_iter().chain(from_findings) {
        if !line.trim().is_empty() && !evidence.contains(&line) {
            evidence.push(line);
        }
    }
    evidence.truncate(cap);
    evidence
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn confidence_score(
    patient: &PatientData,
    findings: &[OrganSystemFinding],
    context: &ImmunotherapyContext,
    path: AssessmentPath,
) -> ConfidenceScore {
    let mut uncertainty_factors = Vec::new();
    let channels = [
        (patient.labs.is_empty() && patient.raw_labs.is_none(), "No laboratory data provided"),
        (patient.vitals.is_empty(), "No vital signs provided"),
        (patient.notes.is_empty() && patient.raw_notes.is_none(), "No clinical notes provided"),
        (
            patient.medications.is_empty() && patient.raw_medications.is_none(),
            "No medication data provided",
        ),
    ];
    for (missing, factor) in channels {
        if missing {
            uncertainty_factors.push(factor.to_string());
        }
    }
    if !context.on_immunotherapy {
        uncertainty_factors.push("No immunotherapy detected - irAE less likely".to_string());
    }

    let detected: Vec<f64> = findings
        .iter()
        .filter(|f| f.detected)
        .map(|f| f.confidence.unwrap_or(0.5))
        .collect();
    let rule_match_count = detected.len() as u32;
    let mut evidence_strength = if detected.is_empty() {
        BASELINE_EVIDENCE_STRENGTH
    } else {
        detected.iter().sum::<f64>() / detected.len() as f64
    };
    if path == AssessmentPath::ModelReconciled {
        evidence_strength = (evidence_strength + 0.1).min(1.0);
    }

    let data_completeness = patient.data_completeness();
    let mut overall = data_completeness * 0.4 + evidence_strength * 0.6;
    if detected.is_empty() {
        overall *= 0.5;
        uncertainty_factors.push("No organ-specific irAE patterns detected".to_string());
    }
    if path == AssessmentPath::RuleBasedFallback {
        overall *= FALLBACK_CONFIDENCE_FACTOR;
        uncertainty_factors.push("Model-assisted reasoning unavailable; rule-based fallback used".to_string());
    }

    ConfidenceScore {
        overall: round2(overall.clamp(0.0, 1.0)),
        data_completeness: round2(data_completeness),
        evidence_strength: round2(evidence_strength),
        rule_match_count,
        uncertainty_factors,
    }
}
