use super::{lab_evidence, scan_conditions, scan_symptoms, FindingBuilder, OrganAnalyzer};
use crate::matching::{any_keyword, relevant_labs};
use crate::models::{LabResult, OrganSystem, OrganSystemFinding, PatientData, Severity};
use crate::reference::OrganVocabulary;

pub fn vocabulary() -> OrganVocabulary {
    OrganVocabulary::new(
        OrganSystem::Endocrine,
        &[
            "fatigue", "weakness", "lethargy",
            "weight gain", "weight loss",
            "cold intolerance", "heat intolerance",
            "headache", "vision changes", "visual field",
            "hypotension", "low blood pressure", "orthostatic",
            "nausea", "vomiting", "anorexia",
            "polyuria", "polydipsia", "increased thirst",
            "constipation", "hair loss", "dry skin",
            "bradycardia", "tachycardia",
        ],
        &[
            "thyroiditis", "hypothyroidism", "hyperthyroidism",
            "hypophysitis", "adrenal insufficiency", "adrenalitis",
            "diabetes", "hyperglycemia", "diabetic ketoacidosis", "dka",
            "hyponatremia",
        ],
        &[
            "TSH", "T4", "free T4", "T3", "free T3",
            "cortisol", "ACTH",
            "glucose", "HbA1c",
            "sodium", "potassium",
            "LH", "FSH", "testosterone", "estradiol",
        ],
    )
}

static GRADE3_CUES: &[&str] = &["diabetic ketoacidosis", "dka", "adrenal crisis"];

/// Sodium below this suggests adrenal insufficiency (mmol/L).
const HYPONATREMIA_SODIUM: f64 = 130.0;
const SEVERE_HYPERGLYCEMIA: f64 = 300.0;
const HYPERGLYCEMIA: f64 = 200.0;

/// Thyroiditis, hypophysitis, adrenal insufficiency and immune diabetes,
/// detected from hormone patterns.
pub struct EndocrineAnalyzer {
    vocab: OrganVocabulary,
}

impl EndocrineAnalyzer {
    pub fn new(vocab: OrganVocabulary) -> Self {
        Self { vocab }
    }
}

impl Default for EndocrineAnalyzer {
    fn default() -> Self {
        Self::new(vocabulary())
    }
}

fn cite(labs: &[&LabResult]) -> String {
    labs.iter()
        .map(|lab| format!("{} = {} {}", lab.name, lab.value, lab.unit).trim_end().to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn find<'a>(labs: &[&'a LabResult], name: &str) -> Option<&'a LabResult> {
    labs.iter().copied().find(|lab| lab.name_matches(name))
}

impl OrganAnalyzer for EndocrineAnalyzer {
    fn system(&self) -> OrganSystem {
        OrganSystem::Endocrine
    }

    fn analyze(&self, patient: &PatientData) -> OrganSystemFinding {
        let mut builder = FindingBuilder::new(self.system());
        let labs = relevant_labs(&patient.labs, &self.vocab.labs);
        let mut cited: Vec<&LabResult> = Vec::new();

        // Thyroid
        if let Some(tsh) = find(&labs, "tsh") {
            let pattern = if tsh.is_high() {
                Some("Hypothyroidism (elevated TSH)")
            } else if tsh.is_low() {
                Some("Hyperthyroidism (suppressed TSH)")
            } else {
                None
            };
            if let Some(pattern) = pattern {
                let mut pattern_labs = vec![tsh];
                pattern_labs.extend(find(&labs, "t4"));
                builder.record(format!("Thyroid dysfunction pattern: {pattern}"), cite(&pattern_labs));
                builder.add_confidence(0.5);
                builder.grade(Severity::Grade2);
                cited.extend(pattern_labs);
            }
        }

        // Adrenal
        let cortisol = find(&labs, "cortisol").filter(|c| c.is_low());
        let sodium = find(&labs, "sodium");
        if let Some(cortisol) = cortisol {
            let mut pattern_labs = vec![cortisol];
            pattern_labs.extend(find(&labs, "acth"));
            pattern_labs.extend(sodium);
            builder.record("Possible adrenal insufficiency (low cortisol)", cite(&pattern_labs));
            builder.add_confidence(0.5);
            builder.grade(Severity::Grade3);
            cited.extend(pattern_labs);
        } else if let Some(sodium) = sodium.filter(|s| s.value < HYPONATREMIA_SODIUM) {
            builder.record(
                "Hyponatremia (possible adrenal insufficiency)",
                cite(&[sodium]),
            );
            builder.add_confidence(0.5);
            builder.grade(Severity::Grade3);
            cited.push(sodium);
        }

        // Glucose
        if let Some(glucose) = find(&labs, "glucose") {
            let pattern = if glucose.value > SEVERE_HYPERGLYCEMIA {
                Some(("Severe hyperglycemia", Severity::Grade3))
            } else if glucose.value > HYPERGLYCEMIA {
                Some(("Hyperglycemia", Severity::Grade2))
            } else {
                None
            };
            if let Some((pattern, severity)) = pattern {
                builder.record(format!("Glucose abnormality: {pattern}"), cite(&[glucose]));
                builder.add_confidence(0.4);
                builder.grade(severity);
                cited.push(glucose);
            }
        }

        for lab in labs.iter().filter(|l| l.is_abnormal()) {
            if cited.iter().any(|c| std::ptr::eq(*c, *lab)) {
                continue;
            }
            builder.record(
                format!("Abnormal {}: {} {}", lab.name, lab.value, lab.unit),
                lab_evidence(lab),
            );
            builder.add_confidence(0.2);
            builder.grade(Severity::Grade1);
        }

        scan_symptoms(&mut builder, patient, &self.vocab, 0.2, None);

        let text = patient.free_text().to_lowercase();
        scan_conditions(&mut builder, &text, &self.vocab, 0.4);
        if builder.is_detected() && any_keyword(&text, GRADE3_CUES) {
            builder.grade(Severity::Grade3);
        }

        let hypotension = patient.vitals.iter().find(|v| {
            v.blood_pressure_systolic
                .is_some_and(|systolic| systolic < 90)
        });
        if let Some(vitals) = hypotension {
            let bp = format_bp(vitals.blood_pressure_systolic, vitals.blood_pressure_diastolic);
            builder.record(format!("Hypotension: BP {bp}"), format!("BP = {bp}"));
            builder.add_confidence(0.3);
        }

        builder.finish()
    }
}

pub(crate) fn format_bp(systolic: Option<u32>, diastolic: Option<u32>) -> String {
    let show = |v: Option<u32>| v.map_or_else(|| "?".to_string(), |v| v.to_string());
    format!("{}/{}", show(systolic), show(diastolic))
}
