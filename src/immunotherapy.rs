//! Checkpoint-inhibitor exposure detection.
//!
//! Exposure is the union of medications flagged upstream, medication names
//! matching the inhibitor vocabulary, and vocabulary hits in raw medication
//! text and clinical notes. Agents are reported by generic name.

use std::collections::BTreeSet;

use crate::models::{ImmunotherapyContext, Medication, PatientData};
use crate::reference::{CheckpointInhibitor, ReferenceData};

pub struct ImmunotherapyDetector {
    inhibitors: Vec<CheckpointInhibitor>,
}

impl ImmunotherapyDetector {
    pub fn new(inhibitors: Vec<CheckpointInhibitor>) -> Self {
        Self { inhibitors }
    }

    pub fn from_reference(reference: &ReferenceData) -> Self {
        Self::new(reference.checkpoint_inhibitors.clone())
    }

    fn lookup(&self, text: &str) -> impl Iterator<Item = &CheckpointInhibitor> {
        let lower = text.to_lowercase();
        self.inhibitors.iter().filter(move |ici| ici.matches(&lower))
    }

    /// Whether a single medication is a checkpoint inhibitor.
    pub fn is_checkpoint_inhibitor(&self, medication: &Medication) -> bool {
        medication.is_immunotherapy || self.lookup(&medication.name).next().is_some()
    }

    pub fn detect(&self, patient: &PatientData) -> ImmunotherapyContext {
        let mut agents = BTreeSet::new();
        let mut classes = BTreeSet::new();
        let mut most_recent_dose = None;

        for medication in &patient.medications {
            let matched: Vec<_> = self.lookup(&medication.name).collect();
            if !medication.is_immunotherapy && matched.is_empty() {
                continue;
            }
            if matched.is_empty() {
                // Flagged upstream with a name outside the vocabulary.
                agents.insert(medication.name.trim().to_string());
            }
            for ici in &matched {
                agents.insert(ici.display_name());
                classes.insert(ici.drug_class);
            }
            classes.extend(medication.drug_class);
            if medication.start_date > most_recent_dose {
                most_recent_dose = medication.start_date;
            }
        }

        let narrative = [&patient.raw_medications, &patient.raw_notes]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .chain(patient.notes.iter().map(|n| n.content.as_str()));
        for text in narrative {
            for ici in self.lookup(text) {
                agents.insert(ici.display_name());
                classes.insert(ici.drug_class);
            }
        }

        agents.retain(|a: &String| !a.is_empty());
        let context = ImmunotherapyContext::new(agents.into_iter().collect(), classes, most_recent_dose);
        tracing::debug!(
            on_immunotherapy = context.on_immunotherapy,
            agents = context.agents.len(),
            combination = context.combination_therapy,
            risk = %context.risk_level,
            "Immunotherapy context detected"
        );
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClinicalNote, DrugClass, RiskLevel};
    use chrono::NaiveDate;

    fn detector() -> ImmunotherapyDetector {
        ImmunotherapyDetector::from_reference(&ReferenceData::builtin())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn single_pd1_from_medication_list() {
        let patient = PatientData {
            medications: vec![Medication::new("Pembrolizumab 200mg IV").started(date(2026, 3, 1))],
            ..Default::default()
        };
        let ctx = detector().detect(&patient);
        assert!(ctx.on_immunotherapy);
        assert_eq!(ctx.agents, vec!["Pembrolizumab".to_string()]);
        assert_eq!(ctx.drug_classes.iter().copied().collect::<Vec<_>>(), vec![DrugClass::Pd1]);
        assert!(!ctx.combination_therapy);
        assert_eq!(ctx.risk_level, RiskLevel::Moderate);
        assert_eq!(ctx.most_recent_dose, Some(date(2026, 3, 1)));
    }

    #[test]
    fn brand_names_normalise_to_generic() {
        let patient = PatientData {
            medications: vec![Medication::new("Yervoy"), Medication::new("Opdivo")],
            ..Default::default()
        };
        let ctx = detector().detect(&patient);
        assert_eq!(ctx.agents, vec!["Ipilimumab".to_string(), "Nivolumab".to_string()]);
        assert!(ctx.combination_therapy);
        assert_eq!(ctx.risk_level, RiskLevel::High);
    }

    #[test]
    fn notes_and_raw_text_count_as_exposure() {
        let patient = PatientData {
            notes: vec![ClinicalNote::new("Cycle 4 of atezolizumab given last week")],
            raw_medications: Some("nivolumab 240 mg q2w".into()),
            ..Default::default()
        };
        let ctx = detector().detect(&patient);
        assert_eq!(ctx.agents, vec!["Atezolizumab".to_string(), "Nivolumab".to_string()]);
        assert!(ctx.combination_therapy);
    }

    #[test]
    fn no_inhibitor_means_no_exposure() {
        let patient = PatientData {
            medications: vec![Medication::new("Carboplatin"), Medication::new("Pemetrexed")],
            notes: vec![ClinicalNote::new("Chemotherapy only")],
            ..Default::default()
        };
        let ctx = detector().detect(&patient);
        assert!(!ctx.on_immunotherapy);
        assert!(ctx.agents.is_empty());
        assert_eq!(ctx.risk_level, RiskLevel::None);
    }

    #[test]
    fn upstream_flag_with_unknown_name_is_low_risk() {
        let mut medication = Medication::new("Study drug XR-12");
        medication.is_immunotherapy = true;
        let patient = PatientData {
            medications: vec![medication],
            ..Default::default()
        };
        let ctx = detector().detect(&patient);
        assert!(ctx.on_immunotherapy);
        assert_eq!(ctx.agents, vec!["Study drug XR-12".to_string()]);
        assert_eq!(ctx.risk_level, RiskLevel::Low);
    }

    #[test]
    fn most_recent_dose_is_latest_start() {
        let patient = PatientData {
            medications: vec![
                Medication::new("nivolumab").started(date(2026, 1, 5)),
                Medication::new("Nivolumab").started(date(2026, 2, 2)),
                Medication::new("Ondansetron").started(date(2026, 5, 1)),
            ],
            ..Default::default()
        };
        let ctx = detector().detect(&patient);
        assert_eq!(ctx.agents.len(), 1);
        assert_eq!(ctx.most_recent_dose, Some(date(2026, 2, 2)));
    }

    #[test]
    fn detection_is_deterministic() {
        let patient = PatientData {
            raw_notes: Some("durvalumab and tremelimumab".into()),
            ..Default::default()
        };
        let first = detector().detect(&patient);
        let second = detector().detect(&patient);
        assert_eq!(first, second);
    }
}
