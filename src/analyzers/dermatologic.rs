use std::sync::LazyLock;

use regex::Regex;

use super::{scan_conditions, scan_symptoms, scan_text_symptoms, FindingBuilder, OrganAnalyzer};
use crate::matching::{any_keyword, find_keywords};
use crate::models::{OrganSystem, OrganSystemFinding, PatientData, Severity};
use crate::reference::OrganVocabulary;

pub fn vocabulary() -> OrganVocabulary {
    OrganVocabulary::new(
        OrganSystem::Dermatologic,
        &[
            "rash", "skin rash", "maculopapular rash",
            "pruritus", "itch", "itching", "itchy skin", "eczema",
            "blisters", "blistering", "vesicles", "bullae", "bullous",
            "skin peeling", "peeling", "desquamation", "skin ulcer",
            "mucositis", "mucosal involvement", "oral ulcers", "oral lesions", "mouth sores",
            "vitiligo", "skin depigmentation", "depigmentation", "photosensitivity",
            "erythema", "redness",
            "hives", "urticaria",
        ],
        &[
            "dermatitis", "bullous pemphigoid",
            "stevens-johnson", "sjs", "toxic epidermal necrolysis", "ten",
            "dress", "lichenoid", "psoriasiform", "psoriasis",
        ],
        &[],
    )
}

static SEVERE_CUTANEOUS: &[&str] = &["sjs", "stevens-johnson", "ten", "toxic epidermal"];

static GRADE4_CUES: &[&str] = &[
    "life-threatening", "desquamation >30%", "mucosal involvement",
    "hemodynamic",
];

static GRADE3_CUES: &[&str] = &[
    "generalized", "extensive", ">30%", "hospitalization",
    "systemic steroids", "limiting self-care", "blistering",
];

static GRADE2_CUES: &[&str] = &[
    "moderate", "10-30%", "widespread",
    "topical steroids", "interfering",
];

static EXTENT_TERMS: &[&str] = &["widespread", "generalized", "extensive", "localized", "diffuse"];

/// "40% BSA", "15 % body surface area".
static RE_BSA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*%?\s*(?:bsa|body surface area)").unwrap()
});

/// Largest body surface area percentage mentioned.
fn body_surface_area(text_lower: &str) -> Option<u32> {
    RE_BSA
        .captures_iter(text_lower)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .max()
}

/// Rash, pruritus, vitiligo and the severe cutaneous reactions. Graded on
/// body surface area with SJS/TEN always Grade 4.
pub struct DermatologicAnalyzer {
    vocab: OrganVocabulary,
}

impl DermatologicAnalyzer {
    pub fn new(vocab: OrganVocabulary) -> Self {
        Self { vocab }
    }
}

impl Default for DermatologicAnalyzer {
    fn default() -> Self {
        Self::new(vocabulary())
    }
}

impl OrganAnalyzer for DermatologicAnalyzer {
    fn system(&self) -> OrganSystem {
        OrganSystem::Dermatologic
    }

    fn analyze(&self, patient: &PatientData) -> OrganSystemFinding {
        let mut builder = FindingBuilder::new(self.system());
        let text = patient.free_text().to_lowercase();

        let structured = scan_symptoms(&mut builder, patient, &self.vocab, 0.3, None);
        scan_text_symptoms(&mut builder, &text, &self.vocab, &structured, 0.2);
        scan_conditions(&mut builder, &text, &self.vocab, 0.4);

        let bsa = body_surface_area(&text);
        if builder.is_detected() {
            if let Some(percent) = bsa {
                builder.support(format!("Body surface area involved: {percent}%"), format!("BSA = {percent}%"));
                builder.add_confidence(0.3);
            }
            for term in find_keywords(&text, EXTENT_TERMS) {
                builder.support(format!("Rash extent: {term}"), format!("Note: '{term}'"));
            }
        }

        if !builder.is_detected() {
            return builder.finish();
        }

        builder.grade(Severity::Grade1);
        if any_keyword(&text, SEVERE_CUTANEOUS) || any_keyword(&text, GRADE4_CUES) {
            builder.grade(Severity::Grade4);
        }
        if any_keyword(&text, GRADE3_CUES) {
            builder.grade(Severity::Grade3);
        }
        match bsa {
            Some(percent) if percent > 30 => builder.grade(Severity::Grade3),
            Some(percent) if percent >= 10 => builder.grade(Severity::Grade2),
            _ => {}
        }
        if any_keyword(&text, GRADE2_CUES) || structured.len() >= 2 {
            builder.grade(Severity::Grade2);
        }

        builder.finish()
    }
}
