use super::grading::ck_grade;
use super::{lab_evidence, scan_conditions, scan_symptoms, scan_text_symptoms, FindingBuilder, OrganAnalyzer};
use crate::matching::{any_keyword, relevant_labs};
use crate::models::{OrganSystem, OrganSystemFinding, PatientData, Severity};
use crate::reference::OrganVocabulary;

pub fn vocabulary() -> OrganVocabulary {
    OrganVocabulary::new(
        OrganSystem::Neurologic,
        &[
            "weakness", "muscle weakness", "proximal weakness",
            "numbness", "tingling", "paresthesia",
            "ptosis", "drooping eyelid", "diplopia", "double vision",
            "dysphagia", "difficulty swallowing", "dysarthria",
            "headache", "confusion", "altered mental status",
            "seizure", "convulsion", "gait instability", "gait disturbance", "ataxia",
            "balance problems", "slurred speech", "facial droop",
            "myalgia", "muscle pain", "neck stiffness",
        ],
        &[
            "myasthenia gravis", "myasthenia", "guillain-barre", "guillain-barré", "gbs",
            "encephalitis", "meningitis", "aseptic meningitis",
            "myositis", "peripheral neuropathy", "neuropathy",
            "transverse myelitis", "myelitis", "encephalopathy",
            "polyneuropathy", "meningoencephalitis", "myasthenic syndrome", "aidp",
            "inflammatory myopathy",
        ],
        &["CK", "creatine kinase", "aldolase"],
    )
}

static GRADE4_CUES: &[&str] = &[
    "respiratory failure", "intubation", "ventilator",
    "paralysis", "quadriplegia", "paraplegia",
    "life-threatening", "icu", "critical",
    "status epilepticus", "coma", "myasthenia crisis", "myasthenic crisis",
    "respiratory compromise",
];

static GRADE3_CUES: &[&str] = &[
    "hospitalization", "grade 3", "significant weakness", "falling",
    "ivig", "plasmapheresis", "unable to walk", "wheelchair",
    "severe weakness", "bedridden", "aspiration", "fvc <50%",
];

static GRADE2_CUES: &[&str] = &[
    "moderate", "grade 2", "interfering", "limiting daily",
    "sensory neuropathy", "paresthesia", "ptosis", "diplopia", "dysphagia",
];

/// Named syndromes that are at least Grade 3 whenever present.
static SEVERE_SYNDROMES: &[&str] = &[
    "guillain-barre", "guillain-barré", "gbs", "aidp",
    "encephalitis", "myasthenia", "myocarditis",
];

/// Myasthenia gravis, Guillain-Barré, encephalitis, myositis and
/// neuropathies.
pub struct NeurologicAnalyzer {
    vocab: OrganVocabulary,
}

impl NeurologicAnalyzer {
    pub fn new(vocab: OrganVocabulary) -> Self {
        Self { vocab }
    }
}

impl Default for NeurologicAnalyzer {
    fn default() -> Self {
        Self::new(vocabulary())
    }
}

impl OrganAnalyzer for NeurologicAnalyzer {
    fn system(&self) -> OrganSystem {
        OrganSystem::Neurologic
    }

    fn analyze(&self, patient: &PatientData) -> OrganSystemFinding {
        let mut builder = FindingBuilder::new(self.system());
        let text = patient.free_text().to_lowercase();

        let abnormal: Vec<_> = relevant_labs(&patient.labs, &self.vocab.labs)
            .into_iter()
            .filter(|l| l.is_abnormal())
            .collect();
        for lab in &abnormal {
            builder.record(
                format!("Elevated {}: {} {} (myositis marker)", lab.name, lab.value, lab.unit),
                lab_evidence(lab),
            );
        }
        if !abnormal.is_empty() {
            builder.add_confidence(0.3);
        }

        let structured = scan_symptoms(&mut builder, patient, &self.vocab, 0.3, None);
        scan_text_symptoms(&mut builder, &text, &self.vocab, &structured, 0.2);
        scan_conditions(&mut builder, &text, &self.vocab, 0.5);

        if !builder.is_detected() {
            return builder.finish();
        }

        builder.grade(Severity::Grade1);
        if any_keyword(&text, GRADE4_CUES) {
            builder.grade(Severity::Grade4);
        }
        if any_keyword(&text, GRADE3_CUES) || any_keyword(&text, SEVERE_SYNDROMES) {
            builder.grade(Severity::Grade3);
        }
        if any_keyword(&text, GRADE2_CUES) || structured.len() >= 3 {
            builder.grade(Severity::Grade2);
        }
        for lab in &abnormal {
            builder.grade_opt(ck_grade(lab));
        }

        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::test_support::{with_labs, with_note, with_symptoms};
    use crate::models::LabResult;

    fn analyze(patient: &PatientData) -> OrganSystemFinding {
        NeurologicAnalyzer::default().analyze(patient)
    }

    #[test]
    fn numbness_alone_is_grade1() {
        let finding = analyze(&with_symptoms(&["numbness"]));
        assert!(finding.detected);
        assert_eq!(finding.severity, Some(Severity::Grade1));
    }

    #[test]
    fn myasthenia_floors_at_grade3() {
        let finding = analyze(&with_note("New ptosis, suspect myasthenia gravis"));
        assert_eq!(finding.severity, Some(Severity::Grade3));
    }

    #[test]
    fn gbs_on_ventilator_is_grade4() {
        let finding = analyze(&with_note("GBS progressing, now on ventilator"));
        assert_eq!(finding.severity, Some(Severity::Grade4));
    }

    #[test]
    fn three_symptoms_are_grade2() {
        let finding = analyze(&with_symptoms(&["tingling", "headache", "muscle pain"]));
        assert_eq!(finding.severity, Some(Severity::Grade2));
    }

    #[test]
    fn demyelinating_polyneuropathy_floors_at_grade3() {
        let finding = analyze(&with_note("Ascending numbness, suspected AIDP, slurred speech"));
        assert!(finding.detected);
        assert!(finding.findings.contains(&"Documentation mentions: aidp".to_string()));
        assert!(finding.findings.contains(&"Clinical note mentions: slurred speech".to_string()));
        assert_eq!(finding.severity, Some(Severity::Grade3));
    }

    #[test]
    fn ck_grades_myositis() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("CK", 1500.0, "U/L").with_range(30.0, 200.0),
        ]));
        assert!(finding.detected);
        assert_eq!(finding.severity, Some(Severity::Grade3));
        assert_eq!(finding.confidence, Some(0.3));
    }

    #[test]
    fn normal_ck_does_not_detect() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("CK", 150.0, "U/L").with_range(30.0, 200.0),
        ]));
        assert!(!finding.detected);
    }
}
