use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::{
    AssessmentPath, DrugClass, Likelihood, OrganSystem, RiskLevel, Severity, Urgency,
};

pub const DISCLAIMER: &str = "This assessment is for clinical decision support only. \
It does not replace clinical judgment. All findings should be verified by the treating clinician.";

/// Result of one organ analyzer.
///
/// A non-detected finding carries no severity, no confidence and no
/// findings/evidence lines. For detected findings, `findings[i]` is supported
/// by `evidence[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganSystemFinding {
    pub system: OrganSystem,
    pub detected: bool,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl OrganSystemFinding {
    pub fn not_detected(system: OrganSystem) -> Self {
        Self {
            system,
            detected: false,
            findings: Vec::new(),
            evidence: Vec::new(),
            severity: None,
            confidence: None,
        }
    }

    /// Severity rank used for aggregation; non-detected findings rank lowest.
    pub fn graded_severity(&self) -> Severity {
        if self.detected {
            self.severity.unwrap_or(Severity::Unknown)
        } else {
            Severity::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmunotherapyContext {
    pub on_immunotherapy: bool,
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub drug_classes: BTreeSet<DrugClass>,
    #[serde(default)]
    pub most_recent_dose: Option<NaiveDate>,
    #[serde(default)]
    pub combination_therapy: bool,
    pub risk_level: RiskLevel,
}

impl ImmunotherapyContext {
    /// Builds the context, deriving combination therapy and risk level from
    /// the detected classes.
    pub fn new(
        agents: Vec<String>,
        drug_classes: BTreeSet<DrugClass>,
        most_recent_dose: Option<NaiveDate>,
    ) -> Self {
        let on_immunotherapy = !agents.is_empty() || !drug_classes.is_empty();
        let combination_therapy = drug_classes.len() > 1;
        let risk_level = if !on_immunotherapy {
            RiskLevel::None
        } else if combination_therapy || drug_classes.contains(&DrugClass::Ctla4) {
            RiskLevel::High
        } else if drug_classes.contains(&DrugClass::Pd1) || drug_classes.contains(&DrugClass::Pdl1)
        {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        };
        Self {
            on_immunotherapy,
            agents,
            drug_classes,
            most_recent_dose,
            combination_therapy,
            risk_level,
        }
    }

    pub fn none() -> Self {
        Self::new(Vec::new(), BTreeSet::new(), None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalityAssessment {
    pub likelihood: Likelihood,
    pub reasoning: String,
    #[serde(default)]
    pub temporal_relationship: Option<String>,
    #[serde(default)]
    pub alternative_causes: Vec<String>,
    #[serde(default)]
    pub supporting_factors: Vec<String>,
    #[serde(default)]
    pub against_factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub action: String,
    /// 1 (highest) to 5.
    pub priority: u8,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl RecommendedAction {
    pub fn new(action: impl Into<String>, priority: u8, rationale: Option<&str>) -> Self {
        Self {
            action: action.into(),
            priority: priority.clamp(1, 5),
            rationale: rationale.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub overall: f64,
    pub data_completeness: f64,
    pub evidence_strength: f64,
    pub rule_match_count: u32,
    #[serde(default)]
    pub uncertainty_factors: Vec<String>,
}

impl ConfidenceScore {
    pub fn confidence_level(&self) -> &'static str {
        if self.overall >= 0.8 {
            "high"
        } else if self.overall >= 0.5 {
            "moderate"
        } else {
            "low"
        }
    }
}

/// Complete irAE assessment handed to presentation and audit layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IRAEAssessment {
    pub immunotherapy_context: ImmunotherapyContext,
    pub irae_detected: bool,
    #[serde(default)]
    pub affected_systems: Vec<OrganSystemFinding>,
    pub causality: CausalityAssessment,
    pub overall_severity: Severity,
    pub severity_reasoning: String,
    pub urgency: Urgency,
    pub urgency_reasoning: String,
    #[serde(default)]
    pub recommended_actions: Vec<RecommendedAction>,
    #[serde(default)]
    pub key_evidence: Vec<String>,
    pub confidence_score: ConfidenceScore,
    pub assessment_path: AssessmentPath,
    pub disclaimer: String,
}

impl IRAEAssessment {
    pub fn detected_systems(&self) -> Vec<OrganSystem> {
        self.affected_systems
            .iter()
            .filter(|f| f.detected)
            .map(|f| f.system)
            .collect()
    }

    pub fn has_detected(&self, system: OrganSystem) -> bool {
        self.affected_systems
            .iter()
            .any(|f| f.detected && f.system == system)
    }

    pub fn requires_manual_review(&self) -> bool {
        self.assessment_path == AssessmentPath::RuleBasedFallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(list: &[DrugClass]) -> BTreeSet<DrugClass> {
        list.iter().copied().collect()
    }

    #[test]
    fn combination_requires_two_classes() {
        let single = ImmunotherapyContext::new(
            vec!["Nivolumab".into(), "Pembrolizumab".into()],
            classes(&[DrugClass::Pd1]),
            None,
        );
        assert!(!single.combination_therapy);
        assert_eq!(single.risk_level, RiskLevel::Moderate);

        let combo = ImmunotherapyContext::new(
            vec!["Ipilimumab".into(), "Nivolumab".into()],
            classes(&[DrugClass::Ctla4, DrugClass::Pd1]),
            None,
        );
        assert!(combo.combination_therapy);
        assert_eq!(combo.risk_level, RiskLevel::High);
    }

    #[test]
    fn ctla4_alone_is_high_risk() {
        let ctx = ImmunotherapyContext::new(
            vec!["Ipilimumab".into()],
            classes(&[DrugClass::Ctla4]),
            None,
        );
        assert!(!ctx.combination_therapy);
        assert_eq!(ctx.risk_level, RiskLevel::High);
    }

    #[test]
    fn exposure_without_class_is_low_risk() {
        let ctx = ImmunotherapyContext::new(vec!["Investigational ICI".into()], BTreeSet::new(), None);
        assert!(ctx.on_immunotherapy);
        assert_eq!(ctx.risk_level, RiskLevel::Low);
        assert_eq!(ImmunotherapyContext::none().risk_level, RiskLevel::None);
    }

    #[test]
    fn action_priority_is_clamped() {
        assert_eq!(RecommendedAction::new("x", 0, None).priority, 1);
        assert_eq!(RecommendedAction::new("x", 9, None).priority, 5);
    }

    #[test]
    fn non_detected_finding_has_no_grade() {
        let finding = OrganSystemFinding::not_detected(OrganSystem::Renal);
        assert_eq!(finding.severity, None);
        assert_eq!(finding.confidence, None);
        assert_eq!(finding.graded_severity(), Severity::Unknown);
    }

    #[test]
    fn confidence_levels() {
        let mut score = ConfidenceScore {
            overall: 0.85,
            data_completeness: 1.0,
            evidence_strength: 0.75,
            rule_match_count: 3,
            uncertainty_factors: vec![],
        };
        assert_eq!(score.confidence_level(), "high");
        score.overall = 0.6;
        assert_eq!(score.confidence_level(), "moderate");
        score.overall = 0.2;
        assert_eq!(score.confidence_level(), "low");
    }
}
