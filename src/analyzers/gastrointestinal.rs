use std::sync::LazyLock;

use regex::Regex;

use super::{scan_conditions, scan_symptoms, scan_text_symptoms, FindingBuilder, OrganAnalyzer};
use crate::matching::any_keyword;
use crate::models::{OrganSystem, OrganSystemFinding, PatientData, Severity};
use crate::reference::OrganVocabulary;

pub fn vocabulary() -> OrganVocabulary {
    OrganVocabulary::new(
        OrganSystem::Gastrointestinal,
        &[
            "diarrhea", "loose stool", "watery stool",
            "abdominal pain", "cramping", "abdominal cramp",
            "bloody stool", "blood in stool", "hematochezia", "melena",
            "nausea", "vomiting",
            "urgency", "tenesmus", "fecal urgency",
            "mucus in stool",
        ],
        &["colitis", "enteritis", "enterocolitis"],
        &[],
    )
}

static GRADE4_CUES: &[&str] = &["perforation", "toxic megacolon", "life-threatening"];

static GRADE3_CUES: &[&str] = &[
    "dehydration", "hospitalization", "admission",
    "iv fluids", "severe", "grade 3", "grade 4",
];

static GRADE2_CUES: &[&str] = &[
    "moderate", "grade 2", "cramping",
    "multiple episodes", "interfering with daily",
];

static BLOODY_STOOL: &[&str] = &["bloody stool", "blood in stool", "hematochezia", "melena"];

/// "7 stools/day", "6 loose bowel movements per day", "diarrhea x8/day".
static RE_STOOL_FREQUENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:(\d+)\s*(?:loose\s+|watery\s+)?(?:stools?|bowel movements?|bms?)\s*(?:/|per|a|each)\s*day)|(?:diarrho?ea\s*x?\s*(\d+)\s*(?:/|per)\s*day)",
    )
    .unwrap()
});

/// Highest stool count per day mentioned in the text.
fn stool_frequency(text_lower: &str) -> Option<u32> {
    RE_STOOL_FREQUENCY
        .captures_iter(text_lower)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .filter_map(|m| m.as_str().parse().ok())
        .max()
}

/// Colitis / diarrhea. CTCAE: <4 stools/day over baseline Grade 1, 4-6
/// Grade 2, >=7 or hospitalization Grade 3, perforation Grade 4.
pub struct GastrointestinalAnalyzer {
    vocab: OrganVocabulary,
}

impl GastrointestinalAnalyzer {
    pub fn new(vocab: OrganVocabulary) -> Self {
        Self { vocab }
    }
}

impl Default for GastrointestinalAnalyzer {
    fn default() -> Self {
        Self::new(vocabulary())
    }
}

impl OrganAnalyzer for GastrointestinalAnalyzer {
    fn system(&self) -> OrganSystem {
        OrganSystem::Gastrointestinal
    }

    fn analyze(&self, patient: &PatientData) -> OrganSystemFinding {
        let mut builder = FindingBuilder::new(self.system());
        let text = patient.free_text().to_lowercase();

        let structured = scan_symptoms(&mut builder, patient, &self.vocab, 0.3, None);
        let mentioned = scan_text_symptoms(&mut builder, &text, &self.vocab, &structured, 0.2);
        scan_conditions(&mut builder, &text, &self.vocab, 0.4);

        let frequency = stool_frequency(&text);
        if let Some(count) = frequency {
            if builder.is_detected() {
                builder.support(
                    format!("Stool frequency {count}/day"),
                    format!("Note: {count} stools/day"),
                );
                builder.add_confidence(0.2);
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
        if any_keyword(&text, GRADE2_CUES) {
            builder.grade(Severity::Grade2);
        }
        let bloody = mentioned.iter().any(|k| BLOODY_STOOL.contains(k))
            || structured
                .iter()
                .any(|s| any_keyword(&s.symptom.to_lowercase(), BLOODY_STOOL));
        if bloody {
            builder.grade(Severity::Grade3);
        }
        if mentioned.len() >= 3 {
            builder.grade(Severity::Grade2);
        }
        match frequency {
            Some(count) if count >= 7 => builder.grade(Severity::Grade3),
            Some(count) if count >= 4 => builder.grade(Severity::Grade2),
            _ => {}
        }

        builder.finish()
    }
}
