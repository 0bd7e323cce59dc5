use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyzers;
use crate::matching::contains_keyword;
use crate::models::{DrugClass, LabResult, OrganSystem};

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Reference data load error ({0}): {1}")]
    ReferenceDataLoad(String, String),

    #[error("Reference data parse error ({0}): {1}")]
    ReferenceDataParse(String, String),
}

/// Checkpoint inhibitor with its brand names and target class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointInhibitor {
    pub generic_name: String,
    pub brand_names: Vec<String>,
    pub drug_class: DrugClass,
}

impl CheckpointInhibitor {
    fn new(generic: &str, brands: &[&str], drug_class: DrugClass) -> Self {
        Self {
            generic_name: generic.into(),
            brand_names: brands.iter().map(|b| b.to_string()).collect(),
            drug_class,
        }
    }

    pub fn matches(&self, text_lower: &str) -> bool {
        contains_keyword(text_lower, &self.generic_name)
            || self
                .brand_names
                .iter()
                .any(|brand| contains_keyword(text_lower, brand))
    }

    /// Generic name in display case ("Pembrolizumab").
    pub fn display_name(&self) -> String {
        let mut chars = self.generic_name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Default adult reference range for one lab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabReferenceRange {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub low: f64,
    pub high: f64,
    pub unit: String,
}

impl LabReferenceRange {
    fn new(name: &str, aliases: &[&str], low: f64, high: f64, unit: &str) -> Self {
        Self {
            name: name.into(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            low,
            high,
            unit: unit.into(),
        }
    }

    /// Length of the longest name or alias found in `lab_lower`.
    fn match_len(&self, lab_lower: &str) -> Option<usize> {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .filter(|n| contains_keyword(lab_lower, n))
            .map(|n| n.len())
            .max()
    }
}

/// Per-organ keyword lists used by the analyzers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganVocabulary {
    pub system: OrganSystem,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub labs: Vec<String>,
}

impl OrganVocabulary {
    pub fn new(system: OrganSystem, symptoms: &[&str], conditions: &[&str], labs: &[&str]) -> Self {
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            system,
            symptoms: owned(symptoms),
            conditions: owned(conditions),
            labs: owned(labs),
        }
    }
}

/// Reference vocabularies. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub checkpoint_inhibitors: Vec<CheckpointInhibitor>,
    pub lab_ranges: Vec<LabReferenceRange>,
    pub organ_vocabularies: Vec<OrganVocabulary>,
}

const INHIBITORS_FILE: &str = "checkpoint_inhibitors.json";
const LAB_RANGES_FILE: &str = "lab_reference_ranges.json";
const VOCABULARIES_FILE: &str = "organ_vocabularies.json";

impl ReferenceData {
    /// Load reference data from a directory of JSON files. A missing file
    /// keeps the built-in table; a malformed one is an error.
    pub fn load(dir: &Path) -> Result<Self, ReferenceError> {
        let builtin = Self::builtin();
        let checkpoint_inhibitors =
            load_or(dir, INHIBITORS_FILE)?.unwrap_or(builtin.checkpoint_inhibitors);
        let lab_ranges = load_or(dir, LAB_RANGES_FILE)?.unwrap_or(builtin.lab_ranges);
        let organ_vocabularies =
            load_or(dir, VOCABULARIES_FILE)?.unwrap_or(builtin.organ_vocabularies);

        tracing::info!(
            dir = %dir.display(),
            inhibitors = checkpoint_inhibitors.len(),
            lab_ranges = lab_ranges.len(),
            vocabularies = organ_vocabularies.len(),
            "Reference data loaded"
        );

        Ok(Self {
            checkpoint_inhibitors,
            lab_ranges,
            organ_vocabularies,
        })
    }

    /// Built-in tables (no file I/O).
    pub fn builtin() -> Self {
        Self {
            checkpoint_inhibitors: builtin_inhibitors(),
            lab_ranges: builtin_lab_ranges(),
            organ_vocabularies: analyzers::builtin_vocabularies(),
        }
    }

    /// Keyword lists for one organ. Systems absent from a loaded file fall
    /// back to the built-in list.
    pub fn vocabulary(&self, system: OrganSystem) -> OrganVocabulary {
        self.organ_vocabularies
            .iter()
            .find(|v| v.system == system)
            .cloned()
            .or_else(|| {
                analyzers::builtin_vocabularies()
                    .into_iter()
                    .find(|v| v.system == system)
            })
            .unwrap_or_else(|| OrganVocabulary::new(system, &[], &[], &[]))
    }

    /// Checkpoint inhibitors named anywhere in `text`.
    pub fn inhibitors_in(&self, text: &str) -> Vec<&CheckpointInhibitor> {
        let lower = text.to_lowercase();
        self.checkpoint_inhibitors
            .iter()
            .filter(|ici| ici.matches(&lower))
            .collect()
    }

    /// Default range for a lab name; the longest matching name wins.
    pub fn default_range(&self, lab_name: &str) -> Option<&LabReferenceRange> {
        let lower = lab_name.to_lowercase();
        self.lab_ranges
            .iter()
            .filter_map(|r| r.match_len(&lower).map(|len| (len, r)))
            .max_by_key(|(len, _)| *len)
            .map(|(_, r)| r)
    }

    /// Fill in missing reference ranges. Labs that already carry a bound are
    /// left untouched. Returns how many labs were completed.
    pub fn complete_lab_ranges(&self, labs: &mut [LabResult]) -> usize {
        let mut completed = 0;
        for lab in labs.iter_mut().filter(|l| !l.has_range()) {
            if let Some(range) = self.default_range(&lab.name) {
                lab.reference_range_low = Some(range.low);
                lab.reference_range_high = Some(range.high);
                if lab.unit.is_empty() {
                    lab.unit = range.unit.clone();
                }
                completed += 1;
            }
        }
        completed
    }
}

fn load_or<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<Option<T>, ReferenceError> {
    let path = dir.join(file);
    if !path.exists() {
        tracing::debug!(file, "Reference file absent, using built-in table");
        return Ok(None);
    }
    let json = std::fs::read_to_string(&path)
        .map_err(|e| ReferenceError::ReferenceDataLoad(path.display().to_string(), e.to_string()))?;
    serde_json::from_str(&json)
        .map(Some)
        .map_err(|e| ReferenceError::ReferenceDataParse(file.into(), e.to_string()))
}

fn builtin_inhibitors() -> Vec<CheckpointInhibitor> {
    vec![
        CheckpointInhibitor::new("pembrolizumab", &["Keytruda"], DrugClass::Pd1),
        CheckpointInhibitor::new("nivolumab", &["Opdivo"], DrugClass::Pd1),
        CheckpointInhibitor::new("cemiplimab", &["Libtayo"], DrugClass::Pd1),
        CheckpointInhibitor::new("dostarlimab", &["Jemperli"], DrugClass::Pd1),
        CheckpointInhibitor::new("atezolizumab", &["Tecentriq"], DrugClass::Pdl1),
        CheckpointInhibitor::new("durvalumab", &["Imfinzi"], DrugClass::Pdl1),
        CheckpointInhibitor::new("avelumab", &["Bavencio"], DrugClass::Pdl1),
        CheckpointInhibitor::new("ipilimumab", &["Yervoy"], DrugClass::Ctla4),
        CheckpointInhibitor::new("tremelimumab", &["Imjudo"], DrugClass::Ctla4),
    ]
}

fn builtin_lab_ranges() -> Vec<LabReferenceRange> {
    vec![
        LabReferenceRange::new("AST", &["aspartate aminotransferase", "sgot"], 10.0, 40.0, "U/L"),
        LabReferenceRange::new("ALT", &["alanine aminotransferase", "sgpt"], 7.0, 56.0, "U/L"),
        LabReferenceRange::new("bilirubin", &["tbili"], 0.1, 1.2, "mg/dL"),
        LabReferenceRange::new("ALP", &["alkaline phosphatase"], 44.0, 147.0, "U/L"),
        LabReferenceRange::new("GGT", &[], 8.0, 61.0, "U/L"),
        LabReferenceRange::new("TSH", &[], 0.4, 4.0, "mIU/L"),
        LabReferenceRange::new("free T4", &["ft4"], 0.8, 1.8, "ng/dL"),
        LabReferenceRange::new("cortisol", &[], 6.0, 23.0, "mcg/dL"),
        LabReferenceRange::new("troponin", &[], 0.0, 0.04, "ng/mL"),
        LabReferenceRange::new("BNP", &[], 0.0, 100.0, "pg/mL"),
        LabReferenceRange::new("NT-proBNP", &[], 0.0, 125.0, "pg/mL"),
        LabReferenceRange::new("CK", &["creatine kinase", "cpk"], 30.0, 200.0, "U/L"),
        LabReferenceRange::new("CK-MB", &[], 0.0, 5.0, "ng/mL"),
        LabReferenceRange::new("creatinine", &[], 0.7, 1.3, "mg/dL"),
        LabReferenceRange::new("BUN", &["urea nitrogen"], 7.0, 20.0, "mg/dL"),
        LabReferenceRange::new("glucose", &[], 70.0, 100.0, "mg/dL"),
        LabReferenceRange::new("sodium", &[], 135.0, 145.0, "mmol/L"),
        LabReferenceRange::new("potassium", &[], 3.5, 5.1, "mmol/L"),
        LabReferenceRange::new("hemoglobin", &["hgb"], 12.0, 17.5, "g/dL"),
        LabReferenceRange::new("platelets", &["platelet", "plt"], 150.0, 400.0, "x10^3/uL"),
        LabReferenceRange::new("WBC", &["white blood cell", "leukocyte"], 4.0, 11.0, "x10^9/L"),
        LabReferenceRange::new("ANC", &["absolute neutrophil count"], 2.0, 7.5, "x10^9/L"),
        LabReferenceRange::new("ferritin", &[], 30.0, 400.0, "ng/mL"),
        LabReferenceRange::new("LDH", &["lactate dehydrogenase"], 140.0, 280.0, "U/L"),
        LabReferenceRange::new("haptoglobin", &[], 30.0, 200.0, "mg/dL"),
    ]
}
