use super::grading::{creatinine_grade, egfr_grade, LabGrade};
use super::{lab_evidence, scan_conditions, scan_cues, scan_symptoms, FindingBuilder, OrganAnalyzer};
use crate::matching::{any_keyword, relevant_labs};
use crate::models::{OrganSystem, OrganSystemFinding, PatientData, Severity};
use crate::reference::OrganVocabulary;

pub fn vocabulary() -> OrganVocabulary {
    OrganVocabulary::new(
        OrganSystem::Renal,
        &[
            "decreased urine output", "oliguria", "anuria",
            "edema", "swelling", "fluid retention",
            "hematuria", "blood in urine", "foamy urine", "frothy urine",
            "flank pain", "fatigue",
        ],
        &[
            "nephritis", "interstitial nephritis", "acute kidney injury", "aki",
            "renal failure", "kidney injury", "nephrotoxicity",
            "glomerulonephritis", "renal impairment", "azotemia",
        ],
        &[
            "creatinine", "BUN", "urea", "eGFR", "GFR",
            "potassium", "phosphorus", "calcium", "cystatin",
            "urinalysis", "urine protein", "urine rbc", "urine wbc", "urine eosinophils",
        ],
    )
}

static URINE_CUES: &[&str] = &[
    "proteinuria", "hematuria", "pyuria", "eosinophiluria",
    "urine protein", "urine blood", "casts", "wbc casts",
];

static GRADE4_CUES: &[&str] = &["dialysis", "life-threatening"];
static GRADE3_CUES: &[&str] = &["hospitalization", "grade 3"];

/// eGFR below this is a kidney finding (mL/min/1.73m2).
const REDUCED_EGFR: f64 = 60.0;

/// Immune nephritis, graded on creatinine x ULN and eGFR.
pub struct RenalAnalyzer {
    vocab: OrganVocabulary,
}

impl RenalAnalyzer {
    pub fn new(vocab: OrganVocabulary) -> Self {
        Self { vocab }
    }
}

impl Default for RenalAnalyzer {
    fn default() -> Self {
        Self::new(vocabulary())
    }
}

impl OrganAnalyzer for RenalAnalyzer {
    fn system(&self) -> OrganSystem {
        OrganSystem::Renal
    }

    fn analyze(&self, patient: &PatientData) -> OrganSystemFinding {
        let mut builder = FindingBuilder::new(self.system());
        let (egfr_labs, labs): (Vec<_>, Vec<_>) = relevant_labs(&patient.labs, &self.vocab.labs)
            .into_iter()
            .partition(|l| l.name_matches("gfr"));

        for lab in labs.into_iter().filter(|l| l.is_abnormal()) {
            if lab.name_matches("calcium") {
                builder.support(format!("Abnormal {}: {} {}", lab.name, lab.value, lab.unit), lab_evidence(lab));
                builder.add_confidence(0.05);
                continue;
            }
            builder.record(
                format!("Abnormal {}: {} {}", lab.name, lab.value, lab.unit),
                lab_evidence(lab),
            );
            // Urine protein/creatinine ratios are not serum creatinine.
            if lab.name_matches("creatinine") && !lab.name_matches("urine") {
                builder.add_confidence(0.4);
                match creatinine_grade(lab) {
                    LabGrade::Graded(severity) => builder.grade(severity),
                    LabGrade::Ungraded => {
                        tracing::debug!(lab = %lab.name, "Creatinine has no usable ULN, left ungraded")
                    }
                    LabGrade::WithinLimit => {}
                }
            } else if lab.name_matches("bun") || lab.name_matches("urea") {
                builder.add_confidence(0.2);
            } else {
                builder.add_confidence(0.1);
            }
        }

        for lab in egfr_labs.into_iter().filter(|l| l.value < REDUCED_EGFR) {
            builder.record(
                format!("Reduced eGFR: {} {}", lab.value, lab.unit),
                format!("{} = {}", lab.name, lab.value),
            );
            builder.add_confidence(0.3);
            builder.grade_opt(egfr_grade(lab.value));
        }

        scan_symptoms(&mut builder, patient, &self.vocab, 0.15, Some(3));

        let text = patient.free_text().to_lowercase();
        scan_conditions(&mut builder, &text, &self.vocab, 0.3);
        scan_cues(&mut builder, &text, URINE_CUES, "Urinalysis", 0.2);

        if builder.is_detected() {
            builder.grade(Severity::Grade1);
            if any_keyword(&text, GRADE4_CUES) {
                builder.grade(Severity::Grade4);
            }
            if any_keyword(&text, GRADE3_CUES) {
                builder.grade(Severity::Grade3);
            }
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
        RenalAnalyzer::default().analyze(patient)
    }

    #[test]
    fn creatinine_graded_by_uln() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("Creatinine", 2.9, "mg/dL").with_range(0.7, 1.3),
        ]));
        assert!(finding.detected);
        assert_eq!(finding.severity, Some(Severity::Grade2));
        assert_eq!(finding.confidence, Some(0.4));
    }

    #[test]
    fn low_egfr_detects_and_grades() {
        let finding = analyze(&with_labs(vec![LabResult::new("eGFR", 25.0, "mL/min/1.73m2")]));
        assert!(finding.detected);
        assert_eq!(finding.severity, Some(Severity::Grade3));
    }

    #[test]
    fn egfr_between_45_and_60_is_grade1() {
        let finding = analyze(&with_labs(vec![LabResult::new("eGFR", 52.0, "mL/min/1.73m2")]));
        assert_eq!(finding.severity, Some(Severity::Grade1));
    }

    #[test]
    fn egfr_is_not_judged_by_its_range() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("eGFR", 120.0, "mL/min/1.73m2").with_range(60.0, 90.0),
        ]));
        assert!(!finding.detected);
    }

    #[test]
    fn symptom_confidence_is_capped() {
        let finding = analyze(&with_symptoms(&[
            "oliguria", "edema", "flank pain", "foamy urine", "fatigue",
        ]));
        assert_eq!(finding.findings.len(), 5);
        assert_eq!(finding.confidence, Some(0.45));
    }

    #[test]
    fn urinalysis_and_dialysis_cues() {
        let finding = analyze(&with_note("Nephritis with proteinuria, started dialysis"));
        assert_eq!(finding.severity, Some(Severity::Grade4));
        assert!(finding.evidence.contains(&"Urinalysis: 'proteinuria'".to_string()));
    }

    #[test]
    fn abnormal_urinalysis_lab_detects() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("Urine protein/creatinine ratio", 1.8, "g/g").with_range(0.0, 0.2),
        ]));
        assert!(finding.detected);
        assert_eq!(finding.confidence, Some(0.1));
        assert_eq!(finding.severity, Some(Severity::Grade1));
    }

    #[test]
    fn calcium_alone_does_not_detect() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("Calcium", 11.8, "mg/dL").with_range(8.5, 10.5),
        ]));
        assert!(!finding.detected);
    }

    #[test]
    fn azotemia_mention_detects() {
        assert!(analyze(&with_note("Progressive azotemia on pembrolizumab")).detected);
    }

    #[test]
    fn adrenal_insufficiency_is_not_renal() {
        assert!(!analyze(&with_note("Primary adrenal insufficiency on hydrocortisone")).detected);
    }

    #[test]
    fn aki_needs_word_boundary() {
        assert!(!analyze(&with_note("Patient from Osaki, no complaints")).detected);
    }
}
