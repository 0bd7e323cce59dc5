//! Keyword and lab-name matching shared by the analyzers, the immunotherapy
//! detector and the reference tables.

use crate::models::{LabResult, PatientSymptom};

/// Keywords at or below this length only match on word boundaries
/// ("ten", "sjs", "icu", "aki").
const SHORT_KEYWORD_LEN: usize = 4;

/// Longer acronyms that are also word stems ("dress" in "dressing").
static BOUNDED_ACRONYMS: &[&str] = &["dress"];

/// Case-insensitive keyword test. `text_lower` must already be lowercase.
pub fn contains_keyword(text_lower: &str, keyword: &str) -> bool {
    let keyword = keyword.to_lowercase();
    if keyword.is_empty() {
        return false;
    }
    if keyword.chars().count() > SHORT_KEYWORD_LEN && !BOUNDED_ACRONYMS.contains(&keyword.as_str()) {
        return text_lower.contains(&keyword);
    }
    text_lower.match_indices(&keyword).any(|(start, _)| {
        let end = start + keyword.len();
        let before = text_lower[..start].chars().next_back();
        let after = text_lower[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Every keyword present in `text_lower`, in list order.
pub fn find_keywords<'a, S: AsRef<str>>(text_lower: &str, keywords: &'a [S]) -> Vec<&'a str> {
    keywords
        .iter()
        .map(|k| k.as_ref())
        .filter(|k| contains_keyword(text_lower, k))
        .collect()
}

pub fn any_keyword<S: AsRef<str>>(text_lower: &str, keywords: &[S]) -> bool {
    keywords
        .iter()
        .any(|k| contains_keyword(text_lower, k.as_ref()))
}

/// Labs whose name contains one of `names` as a substring.
pub fn relevant_labs<'a, S: AsRef<str>>(labs: &'a [LabResult], names: &[S]) -> Vec<&'a LabResult> {
    labs.iter()
        .filter(|lab| {
            let lab_lower = lab.name.to_lowercase();
            names
                .iter()
                .any(|n| lab_lower.contains(&n.as_ref().to_lowercase()))
        })
        .collect()
}

/// Structured symptoms matching any keyword.
pub fn relevant_symptoms<'a, S: AsRef<str>>(
    symptoms: &'a [PatientSymptom],
    keywords: &[S],
) -> Vec<&'a PatientSymptom> {
    symptoms
        .iter()
        .filter(|s| any_keyword(&s.symptom.to_lowercase(), keywords))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_keywords_match_as_substring() {
        assert!(contains_keyword("worsening diarrhea since monday", "diarrhea"));
        assert!(contains_keyword("bloody stools noted", "bloody stool"));
        assert!(!contains_keyword("no complaints", "diarrhea"));
    }

    #[test]
    fn long_acronyms_need_word_boundaries() {
        assert!(contains_keyword("concern for dress syndrome", "DRESS"));
        assert!(contains_keyword("eosinophilia (dress)", "dress"));
        assert!(!contains_keyword("wound dressing changed; confirmed home address.", "dress"));
    }

    #[test]
    fn short_keywords_need_word_boundaries() {
        assert!(contains_keyword("concern for ten", "ten"));
        assert!(contains_keyword("sjs/ten suspected", "ten"));
        assert!(!contains_keyword("patient is attentive", "ten"));
        assert!(!contains_keyword("written consent", "ten"));
        assert!(contains_keyword("transferred to icu.", "icu"));
        assert!(!contains_keyword("ridiculous", "icu"));
    }

    #[test]
    fn keyword_case_is_normalised() {
        assert!(contains_keyword("history of aki", "AKI"));
        assert!(!contains_keyword("anything", ""));
    }

    #[test]
    fn find_keywords_keeps_list_order() {
        let keywords = ["rash", "itching", "vitiligo"];
        let found = find_keywords("itching and rash on trunk", &keywords);
        assert_eq!(found, vec!["rash", "itching"]);
    }

    #[test]
    fn lab_names_match_substring() {
        let labs = vec![
            LabResult::new("Troponin I", 3.2, "ng/mL"),
            LabResult::new("Sodium", 140.0, "mmol/L"),
        ];
        let found = relevant_labs(&labs, &["troponin"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Troponin I");
    }

    #[test]
    fn symptoms_match_keywords() {
        let symptoms = vec![PatientSymptom::new("Watery stool"), PatientSymptom::new("Headache")];
        let found = relevant_symptoms(&symptoms, &["watery stool", "diarrhea"]);
        assert_eq!(found.len(), 1);
    }
}
