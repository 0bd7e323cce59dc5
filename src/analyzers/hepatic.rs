use super::grading::{hepatic_grade, LabGrade};
use super::{lab_evidence, scan_conditions, scan_symptoms, FindingBuilder, OrganAnalyzer};
use crate::matching::{find_keywords, relevant_labs};
use crate::models::{OrganSystem, OrganSystemFinding, PatientData};
use crate::reference::OrganVocabulary;

pub fn vocabulary() -> OrganVocabulary {
    OrganVocabulary::new(
        OrganSystem::Hepatic,
        &[
            "jaundice", "icterus", "yellow skin", "yellow eyes",
            "fatigue", "weakness", "malaise",
            "abdominal pain", "right upper quadrant pain", "ruq pain",
            "dark urine", "tea-colored urine",
            "pale stool", "clay-colored stool",
            "nausea", "vomiting", "anorexia",
            "pruritus", "itching",
        ],
        &["hepatitis", "liver injury", "hepatotoxicity", "transaminitis"],
        &["AST", "ALT", "bilirubin", "alkaline phosphatase", "ALP", "GGT"],
    )
}

static LAB_MENTIONS: &[&str] = &[
    "elevated ast", "elevated alt", "elevated bilirubin",
    "ast increased", "alt increased", "transaminases elevated",
];

/// Immune-mediated hepatitis, graded on liver enzymes as multiples of ULN.
pub struct HepaticAnalyzer {
    vocab: OrganVocabulary,
}

impl HepaticAnalyzer {
    pub fn new(vocab: OrganVocabulary) -> Self {
        Self { vocab }
    }
}

impl Default for HepaticAnalyzer {
    fn default() -> Self {
        Self::new(vocabulary())
    }
}

impl OrganAnalyzer for HepaticAnalyzer {
    fn system(&self) -> OrganSystem {
        OrganSystem::Hepatic
    }

    fn analyze(&self, patient: &PatientData) -> OrganSystemFinding {
        let mut builder = FindingBuilder::new(self.system());

        for lab in relevant_labs(&patient.labs, &self.vocab.labs)
            .into_iter()
            .filter(|l| l.is_abnormal())
        {
            let direction = if lab.is_low() { "Low" } else { "Elevated" };
            builder.record(
                format!("{direction} {}: {} {}", lab.name, lab.value, lab.unit),
                lab_evidence(lab),
            );
            builder.add_confidence(0.4);
            match hepatic_grade(lab) {
                LabGrade::Graded(severity) => builder.grade(severity),
                LabGrade::Ungraded => {
                    tracing::debug!(lab = %lab.name, "Liver enzyme has no usable ULN, left ungraded")
                }
                LabGrade::WithinLimit => {}
            }
        }

        scan_symptoms(&mut builder, patient, &self.vocab, 0.2, None);

        let text = patient.free_text().to_lowercase();
        scan_conditions(&mut builder, &text, &self.vocab, 0.3);

        let mentions = find_keywords(&text, LAB_MENTIONS);
        for mention in &mentions {
            builder.record(format!("Note mentions: {mention}"), format!("Note: '{mention}'"));
        }
        if !mentions.is_empty() {
            builder.add_confidence(0.3);
        }

        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::test_support::{with_labs, with_note};
    use crate::models::{LabResult, Severity};

    fn analyze(patient: &PatientData) -> OrganSystemFinding {
        HepaticAnalyzer::default().analyze(patient)
    }

    #[test]
    fn transaminitis_grade2() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("AST", 185.0, "U/L").with_range(10.0, 40.0),
            LabResult::new("ALT", 220.0, "U/L").with_range(7.0, 56.0),
        ]));
        assert!(finding.detected);
        assert_eq!(finding.severity, Some(Severity::Grade2));
        assert_eq!(finding.confidence, Some(0.8));
        assert!(finding.evidence[0].starts_with("AST = 185 ("));
        assert!(finding.evidence[0].ends_with("x ULN)"));
    }

    #[test]
    fn worst_lab_sets_grade() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("ALT", 80.0, "U/L").with_range(7.0, 56.0),
            LabResult::new("Total Bilirubin", 4.0, "mg/dL").with_range(0.1, 1.2),
        ]));
        assert_eq!(finding.severity, Some(Severity::Grade3));
    }

    #[test]
    fn normal_labs_not_detected() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("AST", 30.0, "U/L").with_range(10.0, 40.0),
        ]));
        assert!(!finding.detected);
    }

    #[test]
    fn zero_uln_is_detected_but_ungraded() {
        let finding = analyze(&with_labs(vec![LabResult {
            reference_range_low: Some(-5.0),
            reference_range_high: Some(0.0),
            ..LabResult::new("ALT", 220.0, "U/L")
        }]));
        assert!(finding.detected);
        assert_eq!(finding.severity, Some(Severity::Unknown));
        assert!(finding.evidence[0].contains("elevated"));
    }

    #[test]
    fn note_mentions_detect() {
        let finding = analyze(&with_note("Labs: elevated AST, likely hepatitis"));
        assert!(finding.detected);
        assert_eq!(finding.findings.len(), 2);
        assert_eq!(finding.severity, Some(Severity::Unknown));
    }

    #[test]
    fn grade_never_drops_as_ratio_rises() {
        let mut previous = Severity::Unknown;
        for value in [50.0, 130.0, 210.0, 900.0, 1500.0] {
            let finding = analyze(&with_labs(vec![
                LabResult::new("AST", value, "U/L").with_range(10.0, 40.0),
            ]));
            let grade = finding.graded_severity();
            assert!(grade >= previous);
            previous = grade;
        }
        assert_eq!(previous, Severity::Grade4);
    }
}
