use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::DrugClass;

/// One laboratory measurement. Abnormality is always derived from the current
/// value and range, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub reference_range_low: Option<f64>,
    #[serde(default)]
    pub reference_range_high: Option<f64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

impl LabResult {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
            reference_range_low: None,
            reference_range_high: None,
            date: None,
        }
    }

    pub fn with_range(mut self, low: f64, high: f64) -> Self {
        self.reference_range_low = Some(low);
        self.reference_range_high = Some(high);
        self
    }

    /// Value falls outside [low, high]. A missing bound is not checked.
    pub fn is_abnormal(&self) -> bool {
        let below = self.reference_range_low.is_some_and(|low| self.value < low);
        let above = self.reference_range_high.is_some_and(|high| self.value > high);
        below || above
    }

    pub fn is_high(&self) -> bool {
        self.reference_range_high.is_some_and(|high| self.value > high)
    }

    pub fn is_low(&self) -> bool {
        self.reference_range_low.is_some_and(|low| self.value < low)
    }

    /// Multiple of the upper limit of normal. `None` when there is no usable ULN.
    pub fn uln_ratio(&self) -> Option<f64> {
        match self.reference_range_high {
            Some(high) if high > 0.0 => Some(self.value / high),
            _ => None,
        }
    }

    pub fn has_range(&self) -> bool {
        self.reference_range_low.is_some() || self.reference_range_high.is_some()
    }

    pub fn name_matches(&self, keyword: &str) -> bool {
        self.name.to_lowercase().contains(&keyword.to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    #[serde(default)]
    pub dose: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Set upstream when the source already identified a checkpoint inhibitor.
    #[serde(default)]
    pub is_immunotherapy: bool,
    #[serde(default)]
    pub drug_class: Option<DrugClass>,
}

impl Medication {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dose: None,
            route: None,
            frequency: None,
            start_date: None,
            end_date: None,
            is_immunotherapy: false,
            drug_class: None,
        }
    }

    pub fn started(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub heart_rate: Option<u32>,
    #[serde(default)]
    pub blood_pressure_systolic: Option<u32>,
    #[serde(default)]
    pub blood_pressure_diastolic: Option<u32>,
    #[serde(default)]
    pub respiratory_rate: Option<u32>,
    #[serde(default)]
    pub oxygen_saturation: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSymptom {
    pub symptom: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub onset: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
}

impl PatientSymptom {
    pub fn new(symptom: impl Into<String>) -> Self {
        Self {
            symptom: symptom.into(),
            severity: None,
            onset: None,
            duration: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalNote {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub note_type: Option<String>,
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
}

impl ClinicalNote {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            date: None,
            note_type: None,
            content: content.into(),
            author: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingSummary {
    pub study_type: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub findings: String,
    #[serde(default)]
    pub impression: Option<String>,
}

/// Snapshot of everything known about one patient for a single assessment.
/// Any field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientData {
    pub patient_id: Option<String>,
    pub age: Option<u32>,
    pub cancer_type: Option<String>,
    pub labs: Vec<LabResult>,
    pub medications: Vec<Medication>,
    pub vitals: Vec<VitalSigns>,
    pub symptoms: Vec<PatientSymptom>,
    pub notes: Vec<ClinicalNote>,
    pub imaging: Vec<ImagingSummary>,
    pub raw_labs: Option<String>,
    pub raw_medications: Option<String>,
    pub raw_symptoms: Option<String>,
    pub raw_notes: Option<String>,
}

impl PatientData {
    /// Concatenated narrative text: note bodies plus the raw note, symptom and
    /// lab fields.
    pub fn free_text(&self) -> String {
        let mut parts: Vec<&str> = self.notes.iter().map(|n| n.content.as_str()).collect();
        for raw in [&self.raw_notes, &self.raw_symptoms, &self.raw_labs]
            .into_iter()
            .flatten()
        {
            parts.push(raw);
        }
        parts.join(" ")
    }

    /// Fraction of the five main evidence channels that carry any data.
    pub fn data_completeness(&self) -> f64 {
        let present = [
            !self.labs.is_empty() || self.raw_labs.is_some(),
            !self.medications.is_empty() || self.raw_medications.is_some(),
            !self.notes.is_empty() || self.raw_notes.is_some(),
            !self.symptoms.is_empty() || self.raw_symptoms.is_some(),
            !self.vitals.is_empty(),
        ];
        present.iter().filter(|p| **p).count() as f64 / present.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abnormal_tracks_value_and_range() {
        let mut lab = LabResult::new("AST", 35.0, "U/L").with_range(10.0, 40.0);
        assert!(!lab.is_abnormal());
        lab.value = 185.0;
        assert!(lab.is_abnormal());
        lab.reference_range_high = Some(200.0);
        assert!(!lab.is_abnormal());
    }

    #[test]
    fn below_low_is_abnormal() {
        let lab = LabResult::new("Hemoglobin", 9.0, "g/dL").with_range(12.0, 16.0);
        assert!(lab.is_abnormal());
        assert!(lab.is_low());
        assert!(!lab.is_high());
    }

    #[test]
    fn no_range_is_never_abnormal() {
        let lab = LabResult::new("Lipase", 900.0, "U/L");
        assert!(!lab.is_abnormal());
        assert!(!lab.has_range());
    }

    #[test]
    fn uln_ratio_requires_positive_high() {
        let lab = LabResult::new("ALT", 220.0, "U/L").with_range(7.0, 56.0);
        let ratio = lab.uln_ratio().unwrap();
        assert!((ratio - 3.928).abs() < 0.01);

        let zero = LabResult::new("Troponin", 3.2, "ng/mL").with_range(0.0, 0.0);
        assert_eq!(zero.uln_ratio(), None);
        assert_eq!(LabResult::new("ALT", 10.0, "U/L").uln_ratio(), None);
    }

    #[test]
    fn free_text_joins_notes_and_raw_fields() {
        let patient = PatientData {
            notes: vec![ClinicalNote::new("Diarrhea x5/day")],
            raw_notes: Some("mild rash".into()),
            raw_symptoms: Some("cough".into()),
            ..Default::default()
        };
        let text = patient.free_text();
        assert!(text.contains("Diarrhea"));
        assert!(text.contains("rash"));
        assert!(text.contains("cough"));
    }

    #[test]
    fn empty_patient_tolerated() {
        let patient: PatientData = serde_json::from_str("{}").unwrap();
        assert!(patient.labs.is_empty());
        assert_eq!(patient.data_completeness(), 0.0);
        assert_eq!(patient.free_text(), "");
    }

    #[test]
    fn completeness_counts_channels() {
        let patient = PatientData {
            labs: vec![LabResult::new("ALT", 20.0, "U/L")],
            medications: vec![Medication::new("Pembrolizumab")],
            ..Default::default()
        };
        assert!((patient.data_completeness() - 0.4).abs() < 1e-9);
    }
}
