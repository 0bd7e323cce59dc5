//! CTCAE v5 grading cutoffs.
//!
//! Ratio cutoffs are multiples of the upper limit of normal and are strict:
//! a value must be *above* a cutoff to reach its grade. Absolute cytopenia
//! cutoffs are strict lower bounds.

use crate::models::{LabResult, Severity};

/// Outcome of grading one lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabGrade {
    Graded(Severity),
    /// Usable range, value not past the Grade 1 cutoff.
    WithinLimit,
    /// No usable upper limit of normal (missing or <= 0).
    Ungraded,
}

impl LabGrade {
    pub fn severity(self) -> Option<Severity> {
        match self {
            LabGrade::Graded(severity) => Some(severity),
            _ => None,
        }
    }
}

const GRADES_ASCENDING: [Severity; 4] = [
    Severity::Grade1,
    Severity::Grade2,
    Severity::Grade3,
    Severity::Grade4,
];

/// AST / ALT / ALP: >1, >3, >5, >20 x ULN.
pub const TRANSAMINASE_ULN_CUTOFFS: [f64; 4] = [1.0, 3.0, 5.0, 20.0];
/// Bilirubin: >1, >1.5, >3, >10 x ULN.
pub const BILIRUBIN_ULN_CUTOFFS: [f64; 4] = [1.0, 1.5, 3.0, 10.0];
/// Creatinine: >1, >1.5, >3, >6 x ULN.
pub const CREATININE_ULN_CUTOFFS: [f64; 4] = [1.0, 1.5, 3.0, 6.0];

/// Grade 4..1 lower bounds (g/dL).
pub const HEMOGLOBIN_CUTOFFS: [f64; 4] = [6.5, 8.0, 10.0, 12.0];
/// Grade 4..1 lower bounds (x10^3/uL).
pub const PLATELET_CUTOFFS: [f64; 4] = [25.0, 50.0, 75.0, 150.0];
/// Grade 4..1 lower bounds (x10^9/L).
pub const ANC_CUTOFFS: [f64; 4] = [0.5, 1.0, 1.5, 2.0];

/// Ferritin above this is a haemophagocytic (HLH) signal.
pub const HLH_FERRITIN: f64 = 10_000.0;
/// Ferritin above this counts as a hematologic finding.
pub const ELEVATED_FERRITIN: f64 = 500.0;

/// Grade a value against ascending Grade 1..4 cutoffs.
fn grade_above(value: f64, cutoffs: &[f64; 4]) -> Option<Severity> {
    cutoffs
        .iter()
        .zip(GRADES_ASCENDING)
        .rev()
        .find(|(cutoff, _)| value > **cutoff)
        .map(|(_, grade)| grade)
}

/// Grade a value against Grade 4..1 lower bounds.
fn grade_below(value: f64, cutoffs: &[f64; 4]) -> Option<Severity> {
    cutoffs
        .iter()
        .zip(GRADES_ASCENDING.iter().rev())
        .find(|(cutoff, _)| value < **cutoff)
        .map(|(_, grade)| *grade)
}

pub fn grade_by_uln(lab: &LabResult, cutoffs: &[f64; 4]) -> LabGrade {
    match lab.uln_ratio() {
        None => LabGrade::Ungraded,
        Some(ratio) => grade_above(ratio, cutoffs).map_or(LabGrade::WithinLimit, LabGrade::Graded),
    }
}

/// Bilirubin uses its own cutoffs; every other liver enzyme uses the
/// transaminase table.
pub fn hepatic_grade(lab: &LabResult) -> LabGrade {
    if lab.name_matches("bilirubin") {
        grade_by_uln(lab, &BILIRUBIN_ULN_CUTOFFS)
    } else {
        grade_by_uln(lab, &TRANSAMINASE_ULN_CUTOFFS)
    }
}

pub fn creatinine_grade(lab: &LabResult) -> LabGrade {
    grade_by_uln(lab, &CREATININE_ULN_CUTOFFS)
}

/// eGFR (mL/min/1.73m2): <45 Grade 2, <30 Grade 3, <15 Grade 4.
pub fn egfr_grade(egfr: f64) -> Option<Severity> {
    if egfr < 15.0 {
        Some(Severity::Grade4)
    } else if egfr < 30.0 {
        Some(Severity::Grade3)
    } else if egfr < 45.0 {
        Some(Severity::Grade2)
    } else {
        None
    }
}

/// SpO2 (%): <94 Grade 2, <90 Grade 3, <88 Grade 4.
pub fn spo2_grade(spo2: f64) -> Option<Severity> {
    if spo2 < 88.0 {
        Some(Severity::Grade4)
    } else if spo2 < 90.0 {
        Some(Severity::Grade3)
    } else if spo2 < 94.0 {
        Some(Severity::Grade2)
    } else {
        None
    }
}

pub fn hemoglobin_grade(hemoglobin: f64) -> Option<Severity> {
    grade_below(hemoglobin, &HEMOGLOBIN_CUTOFFS)
}

pub fn platelet_grade(platelets: f64) -> Option<Severity> {
    grade_below(platelets, &PLATELET_CUTOFFS)
}

pub fn anc_grade(anc: f64) -> Option<Severity> {
    grade_below(anc, &ANC_CUTOFFS)
}

/// CK for myositis: >5 x ULN Grade 3, >2 x ULN Grade 2.
pub fn ck_grade(lab: &LabResult) -> Option<Severity> {
    let ratio = lab.uln_ratio()?;
    if ratio > 5.0 {
        Some(Severity::Grade3)
    } else if ratio > 2.0 {
        Some(Severity::Grade2)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab(name: &str, value: f64, high: f64) -> LabResult {
        LabResult::new(name, value, "U/L").with_range(0.0, high)
    }

    #[test]
    fn transaminase_cutoffs() {
        assert_eq!(hepatic_grade(&lab("AST", 40.0, 40.0)), LabGrade::WithinLimit);
        assert_eq!(hepatic_grade(&lab("AST", 41.0, 40.0)), LabGrade::Graded(Severity::Grade1));
        assert_eq!(hepatic_grade(&lab("AST", 120.0, 40.0)), LabGrade::Graded(Severity::Grade1));
        assert_eq!(hepatic_grade(&lab("AST", 185.0, 40.0)), LabGrade::Graded(Severity::Grade2));
        assert_eq!(hepatic_grade(&lab("ALT", 220.0, 56.0)), LabGrade::Graded(Severity::Grade2));
        assert_eq!(hepatic_grade(&lab("ALT", 300.0, 56.0)), LabGrade::Graded(Severity::Grade3));
        assert_eq!(hepatic_grade(&lab("ALT", 1200.0, 56.0)), LabGrade::Graded(Severity::Grade4));
    }

    #[test]
    fn bilirubin_cutoffs() {
        assert_eq!(hepatic_grade(&lab("Bilirubin", 1.5, 1.2)), LabGrade::Graded(Severity::Grade1));
        assert_eq!(hepatic_grade(&lab("Bilirubin", 2.0, 1.2)), LabGrade::Graded(Severity::Grade2));
        assert_eq!(hepatic_grade(&lab("Bilirubin", 4.0, 1.2)), LabGrade::Graded(Severity::Grade3));
        assert_eq!(hepatic_grade(&lab("Total bilirubin", 13.0, 1.2)), LabGrade::Graded(Severity::Grade4));
    }

    #[test]
    fn creatinine_cutoffs() {
        assert_eq!(creatinine_grade(&lab("Creatinine", 1.5, 1.3)), LabGrade::Graded(Severity::Grade1));
        assert_eq!(creatinine_grade(&lab("Creatinine", 2.5, 1.3)), LabGrade::Graded(Severity::Grade2));
        assert_eq!(creatinine_grade(&lab("Creatinine", 4.5, 1.3)), LabGrade::Graded(Severity::Grade3));
        assert_eq!(creatinine_grade(&lab("Creatinine", 8.0, 1.3)), LabGrade::Graded(Severity::Grade4));
    }

    #[test]
    fn missing_or_zero_uln_is_ungraded() {
        assert_eq!(hepatic_grade(&lab("AST", 185.0, 0.0)), LabGrade::Ungraded);
        assert_eq!(hepatic_grade(&lab("AST", 185.0, -1.0)), LabGrade::Ungraded);
        assert_eq!(hepatic_grade(&LabResult::new("AST", 185.0, "U/L")), LabGrade::Ungraded);
        assert_eq!(LabGrade::Ungraded.severity(), None);
    }

    #[test]
    fn ratio_grading_is_monotonic() {
        let mut previous = Severity::Unknown;
        for step in 0..400 {
            let value = 10.0 + step as f64 * 3.0;
            let grade = hepatic_grade(&lab("ALT", value, 56.0))
                .severity()
                .unwrap_or(Severity::Unknown);
            assert!(grade >= previous, "grade dropped at {value}");
            previous = grade;
        }
        assert_eq!(previous, Severity::Grade4);
    }

    #[test]
    fn egfr_and_spo2_cutoffs() {
        assert_eq!(egfr_grade(50.0), None);
        assert_eq!(egfr_grade(40.0), Some(Severity::Grade2));
        assert_eq!(egfr_grade(20.0), Some(Severity::Grade3));
        assert_eq!(egfr_grade(10.0), Some(Severity::Grade4));
        assert_eq!(spo2_grade(95.0), None);
        assert_eq!(spo2_grade(92.0), Some(Severity::Grade2));
        assert_eq!(spo2_grade(89.0), Some(Severity::Grade3));
        assert_eq!(spo2_grade(85.0), Some(Severity::Grade4));
    }

    #[test]
    fn cytopenia_cutoffs() {
        assert_eq!(hemoglobin_grade(13.0), None);
        assert_eq!(hemoglobin_grade(11.0), Some(Severity::Grade1));
        assert_eq!(hemoglobin_grade(9.0), Some(Severity::Grade2));
        assert_eq!(hemoglobin_grade(7.0), Some(Severity::Grade3));
        assert_eq!(hemoglobin_grade(6.0), Some(Severity::Grade4));
        assert_eq!(platelet_grade(180.0), None);
        assert_eq!(platelet_grade(100.0), Some(Severity::Grade1));
        assert_eq!(platelet_grade(60.0), Some(Severity::Grade2));
        assert_eq!(platelet_grade(30.0), Some(Severity::Grade3));
        assert_eq!(platelet_grade(10.0), Some(Severity::Grade4));
        assert_eq!(anc_grade(1.8), Some(Severity::Grade1));
        assert_eq!(anc_grade(1.2), Some(Severity::Grade2));
        assert_eq!(anc_grade(0.7), Some(Severity::Grade3));
        assert_eq!(anc_grade(0.2), Some(Severity::Grade4));
    }

    #[test]
    fn ck_grading() {
        assert_eq!(ck_grade(&lab("CK", 300.0, 200.0)), None);
        assert_eq!(ck_grade(&lab("CK", 500.0, 200.0)), Some(Severity::Grade2));
        assert_eq!(ck_grade(&lab("CK", 1500.0, 200.0)), Some(Severity::Grade3));
    }
}
