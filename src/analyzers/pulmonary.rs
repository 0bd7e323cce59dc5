use super::grading::spo2_grade;
use super::{scan_conditions, scan_cues, scan_symptoms, scan_text_symptoms, FindingBuilder, OrganAnalyzer};
use crate::matching::{any_keyword, find_keywords};
use crate::models::{OrganSystem, OrganSystemFinding, PatientData, Severity};
use crate::reference::OrganVocabulary;

pub fn vocabulary() -> OrganVocabulary {
    OrganVocabulary::new(
        OrganSystem::Pulmonary,
        &[
            "cough", "dry cough", "nonproductive cough",
            "dyspnea", "shortness of breath", "sob", "breathlessness",
            "hypoxia", "low oxygen", "desaturation",
            "chest pain", "pleuritic pain",
            "wheezing", "wheeze",
            "tachypnea", "rapid breathing",
        ],
        &["pneumonitis", "ild", "interstitial lung disease"],
        &[],
    )
}

static IMAGING_CUES: &[&str] = &[
    "ground glass", "ground-glass", "ggo",
    "infiltrate", "opacity", "consolidation",
    "interstitial", "bilateral", "diffuse", "patchy",
];

static CHEST_STUDIES: &[&str] = &["ct", "cxr", "x-ray", "xray", "chest", "radiograph"];

static GRADE4_CUES: &[&str] = &[
    "life-threatening", "intubation", "intubated", "ventilator",
    "respiratory failure", "ards", "icu",
];

static GRADE3_CUES: &[&str] = &[
    "oxygen therapy", "supplemental oxygen", "o2 requirement",
    "severe dyspnea", "significant hypoxia", "hospitalization",
    "grade 3",
];

static RESPIRATORY_SYMPTOMS: &[&str] = &["dyspnea", "shortness of breath", "sob", "cough"];

/// Hypoxia threshold for the pulmonary channel.
const HYPOXIA_SPO2: f64 = 94.0;

/// Pneumonitis. Graded on SpO2 with explicit oxygen/ICU cues forcing higher
/// grades.
pub struct PulmonaryAnalyzer {
    vocab: OrganVocabulary,
}

impl PulmonaryAnalyzer {
    pub fn new(vocab: OrganVocabulary) -> Self {
        Self { vocab }
    }
}

impl Default for PulmonaryAnalyzer {
    fn default() -> Self {
        Self::new(vocabulary())
    }
}

impl OrganAnalyzer for PulmonaryAnalyzer {
    fn system(&self) -> OrganSystem {
        OrganSystem::Pulmonary
    }

    fn analyze(&self, patient: &PatientData) -> OrganSystemFinding {
        let mut builder = FindingBuilder::new(self.system());
        let text = patient.free_text().to_lowercase();

        let structured = scan_symptoms(&mut builder, patient, &self.vocab, 0.3, None);

        let lowest_spo2 = patient
            .vitals
            .iter()
            .filter_map(|v| v.oxygen_saturation)
            .filter(|spo2| *spo2 < HYPOXIA_SPO2)
            .min_by(|a, b| a.total_cmp(b));
        if let Some(spo2) = lowest_spo2 {
            builder.record(format!("Hypoxia detected: SpO2 {spo2}%"), format!("SpO2 = {spo2}%"));
            builder.add_confidence(0.4);
        }

        let mentioned = scan_text_symptoms(&mut builder, &text, &self.vocab, &structured, 0.2);
        scan_cues(&mut builder, &text, IMAGING_CUES, "Imaging", 0.4);
        scan_conditions(&mut builder, &text, &self.vocab, 0.4);

        for study in &patient.imaging {
            if !any_keyword(&study.study_type.to_lowercase(), CHEST_STUDIES) {
                continue;
            }
            let report = format!(
                "{} {}",
                study.findings,
                study.impression.as_deref().unwrap_or_default()
            )
            .to_lowercase();
            let hits = find_keywords(&report, IMAGING_CUES);
            for hit in &hits {
                builder.record(format!("Imaging report: {hit}"), format!("Radiology: '{hit}'"));
            }
            if !hits.is_empty() {
                builder.add_confidence(0.5);
            }
        }

        if !builder.is_detected() {
            return builder.finish();
        }

        builder.grade(Severity::Grade1);
        if any_keyword(&text, GRADE4_CUES) {
            builder.grade(Severity::Grade4);
        }
        if any_keyword(&text, GRADE3_CUES) {
            builder.grade(Severity::Grade3);
        }
        builder.grade_opt(lowest_spo2.and_then(spo2_grade));
        let symptomatic = mentioned.iter().any(|k| RESPIRATORY_SYMPTOMS.contains(k))
            || structured
                .iter()
                .any(|s| any_keyword(&s.symptom.to_lowercase(), RESPIRATORY_SYMPTOMS));
        if symptomatic {
            builder.grade(Severity::Grade2);
        }

        builder.finish()
    }
}
