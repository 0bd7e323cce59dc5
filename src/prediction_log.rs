//! Append-only JSONL log of assessment outcomes.
//!
//! One line per assessment, written with a single `write_all` on a file
//! opened in append mode. Records are never rewritten.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AssessmentPath, IRAEAssessment, Likelihood, OrganSystem, Severity, Urgency};

#[derive(Error, Debug)]
pub enum PredictionLogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome fields kept for offline review. No patient text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSummary {
    pub assessment_path: AssessmentPath,
    pub irae_detected: bool,
    pub affected_systems: Vec<OrganSystem>,
    pub overall_severity: Severity,
    pub urgency: Urgency,
    pub likelihood: Likelihood,
    pub confidence: f64,
}

impl From<&IRAEAssessment> for AssessmentSummary {
    fn from(assessment: &IRAEAssessment) -> Self {
        Self {
            assessment_path: assessment.assessment_path,
            irae_detected: assessment.irae_detected,
            affected_systems: assessment.detected_systems(),
            overall_severity: assessment.overall_severity,
            urgency: assessment.urgency,
            likelihood: assessment.causality.likelihood,
            confidence: assessment.confidence_score.overall,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub case_id: Option<String>,
    pub inference_ms: u64,
    pub summary: AssessmentSummary,
}

impl PredictionRecord {
    pub fn new(assessment: &IRAEAssessment, case_id: Option<&str>, inference_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            case_id: case_id.map(str::to_string),
            inference_ms,
            summary: AssessmentSummary::from(assessment),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PredictionLog {
    path: PathBuf,
}

impl PredictionLog {
    /// Log at `path`; parent directories are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &PredictionRecord) -> Result<(), PredictionLogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;

        tracing::debug!(record_id = %record.id, "Prediction recorded");
        Ok(())
    }

    /// All records in write order. A missing file is an empty log.
    pub fn read_records(&self) -> Result<Vec<PredictionRecord>, PredictionLogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AssessmentEngine;
    use crate::models::{LabResult, Medication, PatientData};

    fn assessment() -> IRAEAssessment {
        let patient = PatientData {
            labs: vec![LabResult::new("ALT", 220.0, "U/L").with_range(7.0, 56.0)],
            medications: vec![Medication::new("Pembrolizumab")],
            ..Default::default()
        };
        AssessmentEngine::rule_based().assess_rule_based(&patient)
    }

    #[test]
    fn appends_and_reads_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = PredictionLog::new(dir.path().join("nested").join("predictions.jsonl"));
        let assessment = assessment();

        let first = PredictionRecord::new(&assessment, Some("case-1"), 12);
        let second = PredictionRecord::new(&assessment, None, 8);
        log.append(&first).unwrap();
        log.append(&second).unwrap();

        let records = log.read_records().unwrap();
        assert_eq!(records, vec![first, second]);
        assert_ne!(records[0].id, records[1].id);
        assert_eq!(records[0].summary.affected_systems, vec![OrganSystem::Hepatic]);
    }

    #[test]
    fn each_record_is_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = PredictionLog::new(dir.path().join("p.jsonl"));
        log.append(&PredictionRecord::new(&assessment(), None, 1)).unwrap();
        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = PredictionLog::new(dir.path().join("absent.jsonl"));
        assert!(log.read_records().unwrap().is_empty());
    }
}
