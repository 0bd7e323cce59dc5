use super::grading::{anc_grade, hemoglobin_grade, platelet_grade, ELEVATED_FERRITIN, HLH_FERRITIN};
use super::{lab_evidence, scan_conditions, scan_symptoms, FindingBuilder, OrganAnalyzer};
use crate::matching::{find_keywords, relevant_labs};
use crate::models::{LabResult, OrganSystem, OrganSystemFinding, PatientData, Severity};
use crate::reference::OrganVocabulary;

pub fn vocabulary() -> OrganVocabulary {
    OrganVocabulary::new(
        OrganSystem::Hematologic,
        &[
            "bruising", "easy bruising", "petechiae", "purpura",
            "bleeding", "prolonged bleeding", "nosebleed", "epistaxis", "gum bleeding",
            "menorrhagia", "heavy menstrual bleeding",
            "pallor", "pale skin", "dyspnea on exertion",
            "fever", "recurrent infections",
            "dark urine", "jaundice",
        ],
        &[
            "thrombocytopenia", "anemia", "neutropenia", "pancytopenia",
            "immune thrombocytopenia", "itp",
            "autoimmune hemolytic anemia", "aiha", "hemolysis", "hemolytic anemia",
            "aplastic anemia", "pure red cell aplasia", "agranulocytosis",
            "leukopenia", "cytopenia",
            "hemophagocytic lymphohistiocytosis", "hemophagocytic", "hlh",
            "macrophage activation syndrome",
            "bone marrow suppression", "myelosuppression",
        ],
        &[
            "hemoglobin", "hgb", "hematocrit", "hct",
            "platelet", "plt", "thrombocyte",
            "wbc", "white blood cell", "leukocyte",
            "anc", "absolute neutrophil count", "neutrophil",
            "reticulocyte", "retic",
            "ldh", "lactate dehydrogenase", "haptoglobin",
            "coombs", "dat",
            "ferritin", "fibrinogen",
        ],
    )
}

static TRANSFUSION_CUES: &[&str] = &["transfusion", "transfused", "prbc", "platelet transfusion"];

/// WBC below this is leukopenia (x10^9/L).
const LEUKOPENIA_WBC: f64 = 4.0;

/// What one lab contributes to the hematologic finding.
enum LabSignal {
    Finding { label: &'static str, weight: f64, grade: Option<Severity> },
    Supporting { label: &'static str, weight: f64 },
    Quiet,
}

fn classify(lab: &LabResult) -> LabSignal {
    if lab.name_matches("haptoglobin") {
        if lab.is_low() {
            return LabSignal::Finding { label: "Low haptoglobin (hemolysis)", weight: 0.25, grade: None };
        }
    } else if lab.name_matches("coombs") || lab.name.trim().eq_ignore_ascii_case("dat") {
        if lab.is_high() {
            return LabSignal::Finding { label: "Positive antiglobulin test (hemolysis)", weight: 0.3, grade: None };
        }
    } else if lab.name_matches("hematocrit") || lab.name_matches("hct") {
        if lab.is_low() {
            return LabSignal::Supporting { label: "Low hematocrit", weight: 0.1 };
        }
    } else if lab.name_matches("fibrinogen") {
        if lab.is_low() {
            return LabSignal::Supporting { label: "Low fibrinogen", weight: 0.1 };
        }
    } else if lab.name_matches("hemoglobin") || lab.name_matches("hgb") {
        if let Some(grade) = hemoglobin_grade(lab.value) {
            return LabSignal::Finding { label: "Anemia", weight: 0.3, grade: Some(grade) };
        }
    } else if lab.name_matches("platelet") || lab.name_matches("plt") || lab.name_matches("thrombocyte") {
        if let Some(grade) = platelet_grade(lab.value) {
            return LabSignal::Finding { label: "Thrombocytopenia", weight: 0.35, grade: Some(grade) };
        }
    } else if lab.name_matches("anc") || lab.name_matches("neutrophil") {
        if let Some(grade) = anc_grade(lab.value) {
            return LabSignal::Finding { label: "Neutropenia", weight: 0.35, grade: Some(grade) };
        }
    } else if lab.name_matches("wbc") || lab.name_matches("white blood cell") || lab.name_matches("leukocyte") {
        if lab.value < LEUKOPENIA_WBC {
            return LabSignal::Finding { label: "Leukopenia", weight: 0.2, grade: None };
        }
    } else if lab.name_matches("ldh") || lab.name_matches("lactate dehydrogenase") {
        if lab.is_high() {
            return LabSignal::Supporting { label: "Elevated LDH", weight: 0.15 };
        }
    } else if lab.name_matches("ferritin") {
        if lab.value > HLH_FERRITIN {
            return LabSignal::Finding {
                label: "Markedly elevated ferritin (possible HLH)",
                weight: 0.3,
                grade: Some(Severity::Grade4),
            };
        }
        if lab.value > ELEVATED_FERRITIN {
            return LabSignal::Finding { label: "Elevated ferritin", weight: 0.1, grade: None };
        }
    }
    LabSignal::Quiet
}

/// Immune cytopenias, hemolysis and HLH, graded on absolute counts.
pub struct HematologicAnalyzer {
    vocab: OrganVocabulary,
}

impl HematologicAnalyzer {
    pub fn new(vocab: OrganVocabulary) -> Self {
        Self { vocab }
    }
}

impl Default for HematologicAnalyzer {
    fn default() -> Self {
        Self::new(vocabulary())
    }
}

impl OrganAnalyzer for HematologicAnalyzer {
    fn system(&self) -> OrganSystem {
        OrganSystem::Hematologic
    }

    fn analyze(&self, patient: &PatientData) -> OrganSystemFinding {
        let mut builder = FindingBuilder::new(self.system());

        for lab in relevant_labs(&patient.labs, &self.vocab.labs)
            .into_iter()
            .filter(|l| l.is_abnormal())
        {
            match classify(lab) {
                LabSignal::Finding { label, weight, grade } => {
                    builder.record(
                        format!("{label}: {} {} {}", lab.name, lab.value, lab.unit).trim_end().to_string(),
                        lab_evidence(lab),
                    );
                    builder.add_confidence(weight);
                    builder.grade_opt(grade);
                }
                LabSignal::Supporting { label, weight } => {
                    builder.support(format!("{label}: {} {}", lab.value, lab.unit), lab_evidence(lab));
                    builder.add_confidence(weight);
                }
                LabSignal::Quiet => {}
            }
        }

        scan_symptoms(&mut builder, patient, &self.vocab, 0.1, Some(4));

        let text = patient.free_text().to_lowercase();
        scan_conditions(&mut builder, &text, &self.vocab, 0.3);

        if !builder.is_detected() {
            return builder.finish();
        }

        builder.grade(Severity::Grade1);
        let transfusions = find_keywords(&text, TRANSFUSION_CUES);
        for cue in &transfusions {
            builder.support(format!("Transfusion documented: {cue}"), format!("Note: '{cue}'"));
        }
        if !transfusions.is_empty() {
            builder.add_confidence(0.2);
            builder.grade(Severity::Grade3);
        }

        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::test_support::{with_labs, with_note};

    fn analyze(patient: &PatientData) -> OrganSystemFinding {
        HematologicAnalyzer::default().analyze(patient)
    }

    fn cbc(hemoglobin: f64, platelets: f64) -> Vec<LabResult> {
        vec![
            LabResult::new("Hemoglobin", hemoglobin, "g/dL").with_range(12.0, 16.0),
            LabResult::new("Platelets", platelets, "x10^3/uL").with_range(150.0, 400.0),
        ]
    }

    #[test]
    fn anemia_grade2_normal_platelets_not_cited() {
        let finding = analyze(&with_labs(cbc(9.0, 180.0)));
        assert!(finding.detected);
        assert_eq!(finding.severity, Some(Severity::Grade2));
        assert_eq!(finding.findings.len(), 1);
        assert!(finding.findings[0].starts_with("Anemia"));
        assert!(!finding.evidence.iter().any(|e| e.contains("Platelets")));
    }

    #[test]
    fn severe_thrombocytopenia_is_grade4() {
        let finding = analyze(&with_labs(cbc(13.0, 18.0)));
        assert_eq!(finding.severity, Some(Severity::Grade4));
    }

    #[test]
    fn ldh_alone_does_not_detect() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("LDH", 600.0, "U/L").with_range(140.0, 280.0),
        ]));
        assert!(!finding.detected);
    }

    #[test]
    fn hemolysis_pattern_cites_ldh() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("Haptoglobin", 10.0, "mg/dL").with_range(30.0, 200.0),
            LabResult::new("LDH", 600.0, "U/L").with_range(140.0, 280.0),
        ]));
        assert!(finding.detected);
        assert_eq!(finding.findings.len(), 2);
        assert_eq!(finding.confidence, Some(0.4));
    }

    #[test]
    fn hlh_ferritin_is_grade4() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("Ferritin", 25_000.0, "ng/mL").with_range(30.0, 400.0),
        ]));
        assert_eq!(finding.severity, Some(Severity::Grade4));
    }

    #[test]
    fn transfusion_raises_to_grade3() {
        let mut patient = with_labs(cbc(10.5, 200.0));
        patient.raw_notes = Some("Received 1 unit PRBC transfusion".into());
        let finding = analyze(&patient);
        assert_eq!(finding.severity, Some(Severity::Grade3));
    }

    #[test]
    fn transfusion_alone_does_not_detect() {
        assert!(!analyze(&with_note("Transfusion history in 2019")).detected);
    }

    #[test]
    fn named_cytopenias_detect() {
        let finding = analyze(&with_note("New pancytopenia and severe anemia after cycle 3"));
        assert!(finding.detected);
        assert!(finding.findings.contains(&"Documentation mentions: pancytopenia".to_string()));
        assert!(finding.findings.contains(&"Documentation mentions: anemia".to_string()));
        assert!(analyze(&with_note("Bone marrow suppression, AIHA ruled out")).detected);
    }

    #[test]
    fn positive_coombs_detects_hemolysis() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("Direct Coombs", 1.0, "").with_range(0.0, 0.0),
        ]));
        assert!(finding.detected);
        assert!(finding.findings[0].starts_with("Positive antiglobulin test"));
    }

    #[test]
    fn thrombocyte_count_is_graded_like_platelets() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("Thrombocytes", 40.0, "x10^3/uL").with_range(150.0, 400.0),
        ]));
        assert_eq!(finding.severity, Some(Severity::Grade3));
    }

    #[test]
    fn low_hematocrit_alone_does_not_detect() {
        let finding = analyze(&with_labs(vec![
            LabResult::new("Hematocrit", 30.0, "%").with_range(36.0, 46.0),
        ]));
        assert!(!finding.detected);
    }

    #[test]
    fn itp_mention_detects() {
        let finding = analyze(&with_note("Petechiae; working diagnosis ITP"));
        assert!(finding.detected);
        assert_eq!(finding.severity, Some(Severity::Grade1));
    }
}
