use crate::immunotherapy::ImmunotherapyDetector;
use crate::models::{LabResult, PatientData, VitalSigns};

pub const ASSESSMENT_SYSTEM_PROMPT: &str = r#"
You are a clinical safety assistant for oncology immunotherapy. You review
patient data for immune-related adverse events (irAEs) caused by immune
checkpoint inhibitors (PD-1, PD-L1, CTLA-4) and return a structured triage
assessment for a clinician to verify.

TASK:
1. Confirm immunotherapy exposure (agent, class, combination therapy).
2. Detect toxicity signals per organ system: GI, hepatic, pulmonary,
   endocrine, dermatologic, neurologic, cardiac, renal, hematologic.
3. Estimate causality: Highly likely, Possible, Unlikely or Uncertain.
4. Grade severity on the CTCAE scale (Grade 1 to Grade 4).
5. Assign urgency: routine, soon, urgent or emergency.
6. Cite the specific values and statements that support each finding.

SAFETY RULES:
- Do not prescribe drugs or dosages.
- Do not give definitive diagnoses.
- State uncertainty when evidence is incomplete.
- Cardiac or neurologic involvement is at least urgent.

OUTPUT FORMAT:
Respond with a single JSON object and nothing else:
{
  "irae_detected": boolean,
  "affected_systems": [
    {"system": "organ system", "detected": boolean, "findings": ["..."],
     "evidence": ["..."], "severity": "Grade 1-4 or Unknown"}
  ],
  "causality": {
    "likelihood": "Highly likely | Possible | Unlikely | Uncertain",
    "reasoning": "...", "temporal_relationship": "...",
    "alternative_causes": ["..."], "supporting_factors": ["..."],
    "against_factors": ["..."]
  },
  "overall_severity": "Grade 1 - Mild | Grade 2 - Moderate | Grade 3 - Severe | Grade 4 - Life-threatening | Unknown",
  "severity_reasoning": "...",
  "urgency": "routine | soon | urgent | emergency",
  "urgency_reasoning": "...",
  "recommended_actions": [{"action": "...", "priority": 1, "rationale": "..."}],
  "key_evidence": ["..."]
}
"#;

/// Render patient data as markdown sections for the user prompt. Empty
/// sections are omitted; note bodies are cut to `note_excerpt_chars`.
pub fn build_user_prompt(
    patient: &PatientData,
    detector: &ImmunotherapyDetector,
    note_excerpt_chars: usize,
) -> String {
    let mut lines = vec![
        "Analyze the following oncology patient data for possible immune-related adverse events."
            .to_string(),
        String::new(),
    ];

    if patient.patient_id.is_some() || patient.age.is_some() || patient.cancer_type.is_some() {
        lines.push("## Patient".into());
        if let Some(id) = &patient.patient_id {
            lines.push(format!("Patient ID: {id}"));
        }
        if let Some(age) = patient.age {
            lines.push(format!("Age: {age}"));
        }
        if let Some(cancer) = &patient.cancer_type {
            lines.push(format!("Cancer type: {cancer}"));
        }
        lines.push(String::new());
    }

    if !patient.medications.is_empty() || patient.raw_medications.is_some() {
        lines.push("## Medications".into());
        for med in &patient.medications {
            let mut line = format!("- {}", med.name);
            for part in [&med.dose, &med.route, &med.frequency].into_iter().flatten() {
                line.push(' ');
                line.push_str(part);
            }
            if let Some(start) = med.start_date {
                line.push_str(&format!(" (started {start})"));
            }
            if detector.is_checkpoint_inhibitor(med) {
                line.push_str(" [IMMUNOTHERAPY]");
            }
            lines.push(line);
        }
        lines.extend(patient.raw_medications.clone());
        lines.push(String::new());
    }

    if !patient.labs.is_empty() || patient.raw_labs.is_some() {
        lines.push("## Laboratory Results".into());
        lines.extend(patient.labs.iter().map(lab_line));
        lines.extend(patient.raw_labs.clone());
        lines.push(String::new());
    }

    let vitals: Vec<String> = patient.vitals.iter().filter_map(vitals_line).collect();
    if !vitals.is_empty() {
        lines.push("## Vital Signs".into());
        lines.extend(vitals);
        lines.push(String::new());
    }

    if !patient.symptoms.is_empty() || patient.raw_symptoms.is_some() {
        lines.push("## Symptoms".into());
        for symptom in &patient.symptoms {
            let mut line = format!("- {}", symptom.symptom);
            if let Some(severity) = &symptom.severity {
                line.push_str(&format!(" ({severity})"));
            }
            if let Some(onset) = &symptom.onset {
                line.push_str(&format!(", onset {onset}"));
            }
            lines.push(line);
        }
        lines.extend(patient.raw_symptoms.clone());
        lines.push(String::new());
    }

    if !patient.notes.is_empty() || patient.raw_notes.is_some() {
        lines.push("## Clinical Notes".into());
        for note in &patient.notes {
            let kind = note.note_type.as_deref().unwrap_or("Note");
            match note.date {
                Some(date) => lines.push(format!("### {kind} ({date})")),
                None => lines.push(format!("### {kind}")),
            }
            lines.push(excerpt(&note.content, note_excerpt_chars));
            lines.push(String::new());
        }
        if let Some(raw) = &patient.raw_notes {
            lines.push("### Additional notes".into());
            lines.push(excerpt(raw, note_excerpt_chars));
        }
        lines.push(String::new());
    }

    if !patient.imaging.is_empty() {
        lines.push("## Imaging".into());
        for study in &patient.imaging {
            match study.date {
                Some(date) => lines.push(format!("### {} ({date})", study.study_type)),
                None => lines.push(format!("### {}", study.study_type)),
            }
            lines.push(format!("Findings: {}", study.findings));
            if let Some(impression) = &study.impression {
                lines.push(format!("Impression: {impression}"));
            }
            lines.push(String::new());
        }
    }

    lines.join("\n")
}

fn lab_line(lab: &LabResult) -> String {
    let mut line = format!("- {}: {} {}", lab.name, lab.value, lab.unit)
        .trim_end()
        .to_string();
    match (lab.reference_range_low, lab.reference_range_high) {
        (Some(low), Some(high)) => line.push_str(&format!(" (ref {low}-{high})")),
        (None, Some(high)) => line.push_str(&format!(" (ref <{high})")),
        (Some(low), None) => line.push_str(&format!(" (ref >{low})")),
        (None, None) => {}
    }
    if let Some(ratio) = lab.uln_ratio().filter(|r| *r > 1.0) {
        line.push_str(&format!(" {ratio:.1}x ULN"));
    }
    if lab.is_abnormal() {
        line.push_str(" [ABNORMAL]");
    }
    line
}

fn vitals_line(vitals: &VitalSigns) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(temp) = vitals.temperature {
        parts.push(format!("Temp {temp}°C"));
    }
    if let Some(hr) = vitals.heart_rate {
        parts.push(format!("HR {hr}"));
    }
    if let Some(systolic) = vitals.blood_pressure_systolic {
        match vitals.blood_pressure_diastolic {
            Some(diastolic) => parts.push(format!("BP {systolic}/{diastolic}")),
            None => parts.push(format!("BP {systolic}/?")),
        }
    }
    if let Some(rr) = vitals.respiratory_rate {
        parts.push(format!("RR {rr}"));
    }
    if let Some(spo2) = vitals.oxygen_saturation {
        parts.push(format!("SpO2 {spo2}%"));
    }
    if parts.is_empty() {
        return None;
    }
    Some(match vitals.date {
        Some(date) => format!("- {date}: {}", parts.join(", ")),
        None => format!("- {}", parts.join(", ")),
    })
}

/// First `max_chars` characters of `text`, marked when cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClinicalNote, Medication};
    use crate::reference::ReferenceData;

    fn detector() -> ImmunotherapyDetector {
        ImmunotherapyDetector::from_reference(&ReferenceData::builtin())
    }

    #[test]
    fn renders_sections_with_flags() {
        let patient = PatientData {
            age: Some(64),
            medications: vec![Medication::new("Keytruda"), Medication::new("Ondansetron")],
            labs: vec![LabResult::new("AST", 185.0, "U/L").with_range(10.0, 40.0)],
            vitals: vec![VitalSigns {
                heart_rate: Some(112),
                ..Default::default()
            }],
            ..Default::default()
        };
        let prompt = build_user_prompt(&patient, &detector(), 500);
        assert!(prompt.contains("## Patient\nAge: 64"));
        assert!(prompt.contains("- Keytruda [IMMUNOTHERAPY]"));
        assert!(prompt.contains("- Ondansetron\n"));
        assert!(prompt.contains("- AST: 185 U/L (ref 10-40) 4.6x ULN [ABNORMAL]"));
        assert!(prompt.contains("## Vital Signs\n- HR 112"));
        assert!(!prompt.contains("## Imaging"));
    }

    #[test]
    fn notes_are_truncated() {
        let patient = PatientData {
            notes: vec![ClinicalNote::new("x".repeat(800))],
            ..Default::default()
        };
        let prompt = build_user_prompt(&patient, &detector(), 500);
        assert!(prompt.contains(&format!("{}...", "x".repeat(500))));
        assert!(!prompt.contains(&"x".repeat(501)));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("épée", 2), "ép...");
        assert_eq!(excerpt("short", 10), "short");
    }

    #[test]
    fn empty_patient_renders_header_only() {
        let prompt = build_user_prompt(&PatientData::default(), &detector(), 500);
        assert!(!prompt.contains("##"));
    }

    #[test]
    fn system_prompt_fixes_schema() {
        for key in crate::llm::SCHEMA_KEYS {
            assert!(ASSESSMENT_SYSTEM_PROMPT.contains(key), "missing {key}");
        }
    }
}
