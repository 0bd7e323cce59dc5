use std::sync::LazyLock;

use regex::Regex;

use super::endocrine::format_bp;
use super::{lab_evidence, scan_conditions, scan_cues, scan_symptoms, FindingBuilder, OrganAnalyzer};
use crate::matching::{any_keyword, find_keywords, relevant_labs};
use crate::models::{OrganSystem, OrganSystemFinding, PatientData, Severity, VitalSigns};
use crate::reference::OrganVocabulary;

pub fn vocabulary() -> OrganVocabulary {
    OrganVocabulary::new(
        OrganSystem::Cardiac,
        &[
            "chest pain", "chest discomfort", "chest tightness",
            "palpitations", "heart racing", "irregular heartbeat",
            "dyspnea", "shortness of breath", "orthopnea",
            "edema", "leg swelling", "ankle swelling",
            "syncope", "near-syncope", "lightheadedness",
            "fatigue", "exercise intolerance",
        ],
        &[
            "myocarditis", "pericarditis", "cardiomyopathy",
            "arrhythmia", "atrial fibrillation", "heart block",
            "heart failure", "cardiac dysfunction",
            "takotsubo", "stress cardiomyopathy",
        ],
        &[
            "troponin", "BNP", "NT-proBNP", "pro-BNP",
            "CK", "CK-MB", "creatine kinase",
        ],
    )
}

static ECG_CUES: &[&str] = &[
    "st elevation", "st depression", "t wave", "arrhythmia",
    "bradycardia", "tachycardia", "heart block", "prolonged qt",
];

static GRADE4_CUES: &[&str] = &[
    "cardiogenic shock", "cardiac arrest", "life-threatening",
    "hemodynamically unstable", "hemodynamic compromise",
    "lvef <", "ejection fraction <20", "complete heart block",
    "ventricular tachycardia", "ventricular fibrillation",
];

static GRADE3_CUES: &[&str] = &[
    "myocarditis", "hospitalization", "icu",
    "inotropes", "severe", "grade 3",
    "symptomatic heart failure", "ef <40",
    "high-grade", "moderate-severe",
];

/// EF below this is reduced.
const REDUCED_EF: u32 = 50;

/// "LVEF 35%", "ejection fraction of 25%", "EF dropped from 60% to 35%".
static RE_EJECTION_FRACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:lvef|ejection fraction|ef)\b[^%\d.;]{0,25}?(\d{1,2})\s*%(?:\s*to\s*(\d{1,2})\s*%)?")
        .unwrap()
});

/// "(prior 60%)", "baseline EF 55%", "previously 65%".
static RE_PRIOR_EJECTION_FRACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:prior|previous|previously|baseline)\b[^%\d.;]{0,15}?(\d{1,2})\s*%").unwrap()
});

/// Ejection fraction as documented in free text.
#[derive(Debug, Default, PartialEq)]
struct EjectionFraction {
    lowest: Option<u32>,
    /// Highest earlier value above `lowest`, from "from N% to M%" or a
    /// stated prior/baseline.
    previous: Option<u32>,
}

impl EjectionFraction {
    fn reduced(&self) -> Option<u32> {
        self.lowest.filter(|ef| *ef < REDUCED_EF)
    }

    /// A reduced EF documented below an earlier value.
    fn dropped(&self) -> bool {
        self.previous.is_some() && self.reduced().is_some()
    }
}

fn percent(capture: Option<regex::Match<'_>>) -> Option<u32> {
    capture.and_then(|m| m.as_str().parse().ok())
}

fn ejection_fraction(text_lower: &str) -> EjectionFraction {
    let mut readings = Vec::new();
    let mut earlier = Vec::new();
    for caps in RE_EJECTION_FRACTION.captures_iter(text_lower) {
        let first = percent(caps.get(1));
        match (first, percent(caps.get(2))) {
            (Some(from), Some(to)) => {
                earlier.push(from);
                readings.push(to);
            }
            (Some(value), None) => readings.push(value),
            _ => {}
        }
    }
    earlier.extend(
        RE_PRIOR_EJECTION_FRACTION
            .captures_iter(text_lower)
            .filter_map(|caps| percent(caps.get(1))),
    );

    let lowest = readings.into_iter().min();
    let previous = earlier
        .into_iter()
        .max()
        .filter(|prior| lowest.is_some_and(|low| low < *prior));
    EjectionFraction { lowest, previous }
}

/// Finding/evidence pairs for haemodynamic red flags in one set of vitals.
fn vital_concerns(vitals: &VitalSigns) -> Vec<(String, String)> {
    let mut concerns = Vec::new();
    if let Some(hr) = vitals.heart_rate {
        if hr > 100 {
            concerns.push((format!("Tachycardia: HR {hr}"), format!("HR = {hr} bpm")));
        } else if hr < 50 {
            concerns.push((format!("Bradycardia: HR {hr}"), format!("HR = {hr} bpm")));
        }
    }
    if vitals.blood_pressure_systolic.is_some_and(|s| s < 90) {
        let bp = format_bp(vitals.blood_pressure_systolic, vitals.blood_pressure_diastolic);
        concerns.push((format!("Hypotension: BP {bp}"), format!("BP = {bp}")));
    }
    if let Some(spo2) = vitals.oxygen_saturation.filter(|s| *s < 94.0) {
        concerns.push((format!("Hypoxia: SpO2 {spo2}%"), format!("SpO2 = {spo2}%")));
    }
    concerns
}

/// Immune myocarditis and related cardiotoxicity.
pub struct CardiacAnalyzer {
    vocab: OrganVocabulary,
}

impl CardiacAnalyzer {
    pub fn new(vocab: OrganVocabulary) -> Self {
        Self { vocab }
    }
}

impl Default for CardiacAnalyzer {
    fn default() -> Self {
        Self::new(vocabulary())
    }
}

impl OrganAnalyzer for CardiacAnalyzer {
    fn system(&self) -> OrganSystem {
        OrganSystem::Cardiac
    }

    fn analyze(&self, patient: &PatientData) -> OrganSystemFinding {
        let mut builder = FindingBuilder::new(self.system());
        let mut troponin_elevated = false;
        let mut bnp_elevated = false;

        for lab in relevant_labs(&patient.labs, &self.vocab.labs)
            .into_iter()
            .filter(|l| l.is_abnormal())
        {
            if lab.name_matches("troponin") {
                troponin_elevated = true;
                builder.record(
                    format!("Elevated troponin: {} {}", lab.value, lab.unit),
                    format!("{} (cardiac injury marker)", lab_evidence(lab)),
                );
                builder.add_confidence(0.6);
            } else if lab.name_matches("bnp") {
                bnp_elevated = true;
                builder.record(format!("Elevated BNP: {} {}", lab.value, lab.unit), lab_evidence(lab));
                builder.add_confidence(0.4);
            } else {
                builder.record(
                    format!("Elevated {}: {} {}", lab.name, lab.value, lab.unit),
                    lab_evidence(lab),
                );
                builder.add_confidence(0.3);
            }
        }

        scan_symptoms(&mut builder, patient, &self.vocab, 0.2, None);

        let concerns: Vec<_> = patient.vitals.iter().flat_map(vital_concerns).collect();
        for (finding, evidence) in &concerns {
            builder.record(finding.clone(), evidence.clone());
        }
        builder.add_confidence(0.3 * concerns.len() as f64);

        let text = patient.free_text().to_lowercase();
        let mentioned = find_keywords(&text, &self.vocab.symptoms);
        for symptom in &mentioned {
            builder.record(format!("Clinical note mentions: {symptom}"), format!("Note: '{symptom}'"));
        }
        if !mentioned.is_empty() {
            builder.add_confidence(0.2);
        }
        let conditions = scan_conditions(&mut builder, &text, &self.vocab, 0.5);
        scan_cues(&mut builder, &text, ECG_CUES, "ECG", 0.4);

        let ejection_fraction = ejection_fraction(&text);
        if let Some(ef) = ejection_fraction.reduced() {
            if builder.is_detected() {
                let finding = match ejection_fraction.previous {
                    Some(prior) => format!("Reduced ejection fraction: {ef}% (down from {prior}%)"),
                    None => format!("Reduced ejection fraction: {ef}%"),
                };
                builder.support(finding, format!("EF = {ef}%"));
                builder.add_confidence(0.3);
            }
        }

        if !builder.is_detected() {
            return builder.finish();
        }

        builder.grade(Severity::Grade1);
        if any_keyword(&text, GRADE4_CUES) {
            builder.grade(Severity::Grade4);
        }
        if any_keyword(&text, GRADE3_CUES) || conditions.contains(&"myocarditis") {
            builder.grade(Severity::Grade3);
        }
        match ejection_fraction.lowest {
            Some(ef) if ef < 20 => builder.grade(Severity::Grade4),
            Some(ef) if ef < 40 => builder.grade(Severity::Grade3),
            _ => {}
        }
        if troponin_elevated {
            // Myocardial injury with new ventricular dysfunction.
            if ejection_fraction.lowest.is_some_and(|ef| ef < 40) || ejection_fraction.dropped() {
                builder.grade(Severity::Grade4);
            } else if bnp_elevated || !concerns.is_empty() {
                builder.grade(Severity::Grade3);
            } else {
                builder.grade(Severity::Grade2);
            }
        } else if bnp_elevated || !concerns.is_empty() {
            builder.grade(Severity::Grade2);
        }

        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::test_support::{with_labs, with_note, with_vitals};
    use crate::models::{ClinicalNote, LabResult};

    fn analyze(patient: &PatientData) -> OrganSystemFinding {
        CardiacAnalyzer::default().analyze(patient)
    }

    fn troponin() -> LabResult {
        LabResult::new("Troponin I", 3.2, "ng/mL").with_range(0.0, 0.04)
    }

    #[test]
    fn troponin_alone_is_grade2() {
        let finding = analyze(&with_labs(vec![troponin()]));
        assert!(finding.detected);
        assert_eq!(finding.severity, Some(Severity::Grade2));
        assert_eq!(finding.confidence, Some(0.6));
    }

    #[test]
    fn troponin_with_bnp_is_grade3() {
        let finding = analyze(&with_labs(vec![
            troponin(),
            LabResult::new("BNP", 850.0, "pg/mL").with_range(0.0, 100.0),
        ]));
        assert_eq!(finding.severity, Some(Severity::Grade3));
    }

    #[test]
    fn troponin_with_tachycardia_is_grade3() {
        let mut patient = with_labs(vec![troponin()]);
        patient.vitals.push(VitalSigns {
            heart_rate: Some(124),
            ..Default::default()
        });
        assert_eq!(analyze(&patient).severity, Some(Severity::Grade3));
    }

    #[test]
    fn myocarditis_mention_floors_at_grade3() {
        let finding = analyze(&with_note("Suspected myocarditis"));
        assert_eq!(finding.severity, Some(Severity::Grade3));
    }

    #[test]
    fn ef_drop_with_troponin_is_grade4() {
        let mut patient = with_labs(vec![troponin()]);
        patient.notes.push(ClinicalNote::new("Echo: LVEF <35%, new wall motion abnormality"));
        let finding = analyze(&patient);
        assert_eq!(finding.severity, Some(Severity::Grade4));
    }

    #[test]
    fn documented_ef_drop_with_troponin_is_grade4() {
        for note in [
            "Echo: EF 35% (prior 60%), diffuse hypokinesis",
            "EF dropped from 60% to 35%",
            "LVEF decreased from 55% to 30%",
            "Repeat echo EF 45%, baseline EF 60%",
        ] {
            let mut patient = with_labs(vec![troponin()]);
            patient.notes.push(ClinicalNote::new(note));
            assert_eq!(analyze(&patient).severity, Some(Severity::Grade4), "{note}");
        }
    }

    #[test]
    fn preserved_ef_with_troponin_stays_grade2() {
        let mut patient = with_labs(vec![troponin()]);
        patient.notes.push(ClinicalNote::new("Echo: EF 60%, prior 55%"));
        assert_eq!(analyze(&patient).severity, Some(Severity::Grade2));
    }

    #[test]
    fn ejection_fraction_values() {
        let ef = ejection_fraction("lvef 55%, later ef dropped to 30%");
        assert_eq!(ef.lowest, Some(30));
        assert_eq!(ejection_fraction("ejection fraction of 15%").lowest, Some(15));
        assert_eq!(ejection_fraction("chef 20%"), EjectionFraction::default());

        let ef = ejection_fraction("ef dropped from 60% to 35%");
        assert_eq!(ef, EjectionFraction { lowest: Some(35), previous: Some(60) });
        assert!(ef.dropped());

        let ef = ejection_fraction("lvef decreased from 55% to 30%");
        assert_eq!(ef, EjectionFraction { lowest: Some(30), previous: Some(55) });

        let ef = ejection_fraction("echo: ef 35% (prior 60%), diffuse hypokinesis");
        assert_eq!(ef, EjectionFraction { lowest: Some(35), previous: Some(60) });

        let ef = ejection_fraction("ef 60%, prior 55%");
        assert_eq!(ef.lowest, Some(60));
        assert!(!ef.dropped());
    }

    #[test]
    fn shock_is_grade4() {
        let finding = analyze(&with_note("Myocarditis with cardiogenic shock"));
        assert_eq!(finding.severity, Some(Severity::Grade4));
    }

    #[test]
    fn vitals_alone_are_grade2() {
        let finding = analyze(&with_vitals(VitalSigns {
            heart_rate: Some(42),
            blood_pressure_systolic: Some(85),
            blood_pressure_diastolic: Some(50),
            ..Default::default()
        }));
        assert_eq!(finding.severity, Some(Severity::Grade2));
        assert_eq!(finding.findings.len(), 2);
        assert!(finding.evidence.contains(&"BP = 85/50".to_string()));
    }

    #[test]
    fn left_ventricular_wording_is_not_life_threatening() {
        let finding = analyze(&with_note("Palpitations; left ventricular function preserved"));
        assert_eq!(finding.severity, Some(Severity::Grade1));
    }
}
