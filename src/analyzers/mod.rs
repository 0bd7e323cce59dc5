//! Organ-specific irAE analyzers.
//!
//! Each analyzer is a stateless detector over one `PatientData` snapshot. It
//! scans structured labs, structured symptoms, concatenated free text and
//! vitals, and grades what it finds on the CTCAE scale.

pub mod cardiac;
pub mod dermatologic;
pub mod endocrine;
pub mod gastrointestinal;
pub mod grading;
pub mod hematologic;
pub mod hepatic;
pub mod neurologic;
pub mod pulmonary;
pub mod renal;

use crate::matching::{find_keywords, relevant_symptoms};
use crate::models::{OrganSystem, OrganSystemFinding, PatientData, PatientSymptom, Severity};
use crate::reference::{OrganVocabulary, ReferenceData};

pub use cardiac::CardiacAnalyzer;
pub use dermatologic::DermatologicAnalyzer;
pub use endocrine::EndocrineAnalyzer;
pub use gastrointestinal::GastrointestinalAnalyzer;
pub use hematologic::HematologicAnalyzer;
pub use hepatic::HepaticAnalyzer;
pub use neurologic::NeurologicAnalyzer;
pub use pulmonary::PulmonaryAnalyzer;
pub use renal::RenalAnalyzer;

/// Detector for one organ system.
pub trait OrganAnalyzer: Send + Sync {
    fn system(&self) -> OrganSystem;

    fn analyze(&self, patient: &PatientData) -> OrganSystemFinding;
}

/// All nine analyzers, configured from the reference vocabularies.
pub fn default_analyzers(reference: &ReferenceData) -> Vec<Box<dyn OrganAnalyzer>> {
    vec![
        Box::new(GastrointestinalAnalyzer::new(reference.vocabulary(OrganSystem::Gastrointestinal))),
        Box::new(HepaticAnalyzer::new(reference.vocabulary(OrganSystem::Hepatic))),
        Box::new(PulmonaryAnalyzer::new(reference.vocabulary(OrganSystem::Pulmonary))),
        Box::new(EndocrineAnalyzer::new(reference.vocabulary(OrganSystem::Endocrine))),
        Box::new(DermatologicAnalyzer::new(reference.vocabulary(OrganSystem::Dermatologic))),
        Box::new(NeurologicAnalyzer::new(reference.vocabulary(OrganSystem::Neurologic))),
        Box::new(CardiacAnalyzer::new(reference.vocabulary(OrganSystem::Cardiac))),
        Box::new(RenalAnalyzer::new(reference.vocabulary(OrganSystem::Renal))),
        Box::new(HematologicAnalyzer::new(reference.vocabulary(OrganSystem::Hematologic))),
    ]
}

/// Built-in keyword lists for every analyzed system.
pub fn builtin_vocabularies() -> Vec<OrganVocabulary> {
    vec![
        gastrointestinal::vocabulary(),
        hepatic::vocabulary(),
        pulmonary::vocabulary(),
        endocrine::vocabulary(),
        dermatologic::vocabulary(),
        neurologic::vocabulary(),
        cardiac::vocabulary(),
        renal::vocabulary(),
        hematologic::vocabulary(),
    ]
}

// ---------------------------------------------------------------------------
// Finding accumulation
// ---------------------------------------------------------------------------

/// Accumulates paired finding/evidence lines, confidence and the maximum
/// severity signal for one organ.
pub(crate) struct FindingBuilder {
    system: OrganSystem,
    detected: bool,
    findings: Vec<String>,
    evidence: Vec<String>,
    supporting: Vec<(String, String)>,
    confidence: f64,
    severity: Option<Severity>,
}

impl FindingBuilder {
    pub fn new(system: OrganSystem) -> Self {
        Self {
            system,
            detected: false,
            findings: Vec::new(),
            evidence: Vec::new(),
            supporting: Vec::new(),
            confidence: 0.0,
            severity: None,
        }
    }

    /// A detecting hit: marks the organ detected.
    pub fn record(&mut self, finding: impl Into<String>, evidence: impl Into<String>) {
        self.detected = true;
        self.findings.push(finding.into());
        self.evidence.push(evidence.into());
    }

    /// A supporting hit: reported only if something else detects the organ.
    pub fn support(&mut self, finding: impl Into<String>, evidence: impl Into<String>) {
        self.supporting.push((finding.into(), evidence.into()));
    }

    pub fn add_confidence(&mut self, weight: f64) {
        self.confidence += weight;
    }

    /// Keep the maximum severity signal; signals are never averaged.
    pub fn grade(&mut self, severity: Severity) {
        self.severity = Some(self.severity.map_or(severity, |s| s.max(severity)));
    }

    pub fn grade_opt(&mut self, severity: Option<Severity>) {
        if let Some(severity) = severity {
            self.grade(severity);
        }
    }

    pub fn is_detected(&self) -> bool {
        self.detected
    }

    pub fn finish(self) -> OrganSystemFinding {
        if !self.detected {
            return OrganSystemFinding::not_detected(self.system);
        }
        let mut findings = self.findings;
        let mut evidence = self.evidence;
        for (finding, cited) in self.supporting {
            findings.push(finding);
            evidence.push(cited);
        }
        let confidence = (self.confidence.min(1.0) * 100.0).round() / 100.0;
        tracing::debug!(
            system = %self.system,
            hits = findings.len(),
            confidence,
            "Organ signals detected"
        );
        OrganSystemFinding {
            system: self.system,
            detected: true,
            findings,
            evidence,
            severity: Some(self.severity.unwrap_or(Severity::Unknown)),
            confidence: Some(confidence),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared evidence channels
// ---------------------------------------------------------------------------

/// Structured symptoms channel. Records every match and adds `weight` per
/// match, counting at most `cap` matches toward confidence.
pub(crate) fn scan_symptoms<'a>(
    builder: &mut FindingBuilder,
    patient: &'a PatientData,
    vocab: &OrganVocabulary,
    weight: f64,
    cap: Option<usize>,
) -> Vec<&'a PatientSymptom> {
    let matched = relevant_symptoms(&patient.symptoms, &vocab.symptoms);
    for symptom in &matched {
        let evidence = match &symptom.severity {
            Some(severity) => format!("{} ({})", symptom.symptom, severity),
            None => symptom.symptom.clone(),
        };
        builder.record(format!("Patient reports {}", symptom.symptom), evidence);
    }
    let counted = cap.map_or(matched.len(), |c| matched.len().min(c));
    builder.add_confidence(weight * counted as f64);
    matched
}

/// Free-text symptom channel. Keywords already covered by a structured
/// symptom are not cited twice. Returns every keyword found.
pub(crate) fn scan_text_symptoms<'v>(
    builder: &mut FindingBuilder,
    text_lower: &str,
    vocab: &'v OrganVocabulary,
    structured: &[&PatientSymptom],
    weight: f64,
) -> Vec<&'v str> {
    let found = find_keywords(text_lower, &vocab.symptoms);
    let mut cited = 0;
    for keyword in &found {
        let covered = structured
            .iter()
            .any(|s| s.symptom.to_lowercase().contains(keyword));
        if !covered {
            builder.record(
                format!("Clinical note mentions: {keyword}"),
                format!("Note: '{keyword}'"),
            );
            cited += 1;
        }
    }
    builder.add_confidence(weight * cited as f64);
    found
}

/// Named-condition channel; confidence is added once.
pub(crate) fn scan_conditions<'v>(
    builder: &mut FindingBuilder,
    text_lower: &str,
    vocab: &'v OrganVocabulary,
    weight: f64,
) -> Vec<&'v str> {
    let found = find_keywords(text_lower, &vocab.conditions);
    for condition in &found {
        builder.record(
            format!("Documentation mentions: {condition}"),
            format!("Condition: {condition}"),
        );
    }
    if !found.is_empty() {
        builder.add_confidence(weight);
    }
    found
}

/// Free-text cue channel (imaging, ECG, urinalysis wording). Confidence is
/// added once.
pub(crate) fn scan_cues<'c>(
    builder: &mut FindingBuilder,
    text_lower: &str,
    cues: &'c [&'c str],
    label: &str,
    weight: f64,
) -> Vec<&'c str> {
    let found = find_keywords(text_lower, cues);
    for cue in &found {
        builder.record(format!("{label} finding: {cue}"), format!("{label}: '{cue}'"));
    }
    if !found.is_empty() {
        builder.add_confidence(weight);
    }
    found
}

/// "AST = 185 (4.6x ULN)" or "AST = 185 (elevated)".
pub(crate) fn lab_evidence(lab: &crate::models::LabResult) -> String {
    match lab.uln_ratio() {
        Some(ratio) => format!("{} = {} ({:.1}x ULN)", lab.name, lab.value, ratio),
        None if lab.is_low() => format!("{} = {} (low)", lab.name, lab.value),
        None => format!("{} = {} (elevated)", lab.name, lab.value),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClinicalNote, LabResult, VitalSigns};

    fn every_analyzer() -> Vec<Box<dyn OrganAnalyzer>> {
        default_analyzers(&ReferenceData::builtin())
    }

    fn busy_patient() -> PatientData {
        PatientData {
            labs: vec![
                LabResult::new("AST", 185.0, "U/L").with_range(10.0, 40.0),
                LabResult::new("Creatinine", 2.9, "mg/dL").with_range(0.7, 1.3),
                LabResult::new("Troponin I", 3.2, "ng/mL").with_range(0.0, 0.04),
                LabResult::new("Hemoglobin", 9.0, "g/dL").with_range(12.0, 16.0),
                LabResult::new("TSH", 12.0, "mIU/L").with_range(0.4, 4.0),
            ],
            symptoms: vec![
                PatientSymptom::new("diarrhea"),
                PatientSymptom::new("rash"),
                PatientSymptom::new("cough"),
                PatientSymptom::new("numbness"),
            ],
            vitals: vec![VitalSigns {
                oxygen_saturation: Some(91.0),
                heart_rate: Some(110),
                ..Default::default()
            }],
            notes: vec![ClinicalNote::new("Concern for colitis and pneumonitis.")],
            ..Default::default()
        }
    }

    #[test]
    fn nine_analyzers_one_per_system() {
        let analyzers = every_analyzer();
        assert_eq!(analyzers.len(), 9);
        let systems: Vec<_> = analyzers.iter().map(|a| a.system()).collect();
        assert_eq!(systems, OrganSystem::ANALYZED.to_vec());
    }

    #[test]
    fn empty_patient_detects_nothing() {
        let patient = PatientData::default();
        for analyzer in every_analyzer() {
            let finding = analyzer.analyze(&patient);
            assert!(!finding.detected, "{} detected on empty data", finding.system);
            assert_eq!(finding.severity, None);
            assert_eq!(finding.confidence, None);
        }
    }

    #[test]
    fn detected_findings_pair_with_evidence() {
        let patient = busy_patient();
        for analyzer in every_analyzer() {
            let finding = analyzer.analyze(&patient);
            assert!(finding.detected, "{} not detected", finding.system);
            assert_eq!(finding.findings.len(), finding.evidence.len());
            assert!(finding.severity.is_some());
            let confidence = finding.confidence.unwrap();
            assert!((0.0..=1.0).contains(&confidence));
        }
    }

    #[test]
    fn builder_keeps_max_grade() {
        let mut builder = FindingBuilder::new(OrganSystem::Renal);
        builder.record("a", "b");
        builder.grade(Severity::Grade3);
        builder.grade(Severity::Grade1);
        builder.grade_opt(None);
        let finding = builder.finish();
        assert_eq!(finding.severity, Some(Severity::Grade3));
    }

    #[test]
    fn supporting_hits_alone_do_not_detect() {
        let mut builder = FindingBuilder::new(OrganSystem::Hematologic);
        builder.support("Elevated LDH", "LDH = 400");
        builder.add_confidence(0.15);
        builder.grade(Severity::Grade3);
        let finding = builder.finish();
        assert!(!finding.detected);
        assert!(finding.findings.is_empty());
        assert_eq!(finding.severity, None);
    }

    #[test]
    fn confidence_is_capped() {
        let mut builder = FindingBuilder::new(OrganSystem::Cardiac);
        builder.record("x", "y");
        builder.add_confidence(2.7);
        assert_eq!(builder.finish().confidence, Some(1.0));
    }

    #[test]
    fn detected_without_grade_is_unknown() {
        let mut builder = FindingBuilder::new(OrganSystem::Hepatic);
        builder.record("x", "y");
        assert_eq!(builder.finish().severity, Some(Severity::Unknown));
    }
}
