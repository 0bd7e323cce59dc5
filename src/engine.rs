//! Assessment Merger.
//!
//! Orchestrates one assessment: one-time enrichment of the patient snapshot,
//! immunotherapy detection, the nine organ analyzers, the optional model path
//! and the merge. The safety floor is applied last on every path, and
//! `assess` always returns a complete `IRAEAssessment`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::analyzers::{default_analyzers, OrganAnalyzer};
use crate::config::EngineConfig;
use crate::immunotherapy::ImmunotherapyDetector;
use crate::llm::{
    build_user_prompt, LlmClient, LlmError, ModelAssessment, ModelCausality, ModelSystemFinding,
    OllamaClient, ReconcileError, Reconciled, StructuredOutputReconciler, resolve_model,
    ASSESSMENT_SYSTEM_PROMPT,
};
use crate::models::{
    AssessmentPath, CausalityAssessment, IRAEAssessment, ImmunotherapyContext, OrganSystem,
    OrganSystemFinding, PatientData, PatientSymptom, Severity, VitalSigns, DISCLAIMER,
};
use crate::prediction_log::{PredictionLog, PredictionRecord};
use crate::reference::{ReferenceData, ReferenceError};
use crate::triage;

/// Confidence given to systems only the model reported.
const MODEL_ONLY_CONFIDENCE: f64 = 0.7;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Reference data error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("Model client error: {0}")]
    Llm(#[from] LlmError),
}

// ---------------------------------------------------------------------------
// Note enrichment
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("Note extraction failed: {0}")]
    Extraction(String),
}

/// Symptoms and vitals pulled out of free-text notes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteExtraction {
    pub symptoms: Vec<PatientSymptom>,
    pub vitals: Vec<VitalSigns>,
}

/// External note parser, run once before analysis.
pub trait NoteEnricher: Send + Sync {
    fn extract(&self, patient: &PatientData) -> Result<NoteExtraction, EnrichError>;
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct AssessmentEngine {
    config: EngineConfig,
    reference: Arc<ReferenceData>,
    detector: Arc<ImmunotherapyDetector>,
    analyzers: Vec<Box<dyn OrganAnalyzer>>,
    reconciler: Option<Arc<StructuredOutputReconciler>>,
    llm_timeout: Duration,
    enricher: Option<Arc<dyn NoteEnricher>>,
    prediction_log: Option<PredictionLog>,
}

impl AssessmentEngine {
    pub fn new(config: EngineConfig, reference: ReferenceData) -> Self {
        let llm_timeout = Duration::from_secs(
            config
                .llm_timeout_secs
                .saturating_mul(config.max_llm_attempts.max(1) as u64),
        );
        let prediction_log = config.prediction_log.clone().map(PredictionLog::new);
        Self {
            detector: Arc::new(ImmunotherapyDetector::from_reference(&reference)),
            analyzers: default_analyzers(&reference),
            reference: Arc::new(reference),
            config,
            reconciler: None,
            llm_timeout,
            enricher: None,
            prediction_log,
        }
    }

    /// Built-in reference data, default configuration, no model.
    pub fn rule_based() -> Self {
        Self::new(EngineConfig::default(), ReferenceData::builtin())
    }

    /// Build everything the configuration asks for: reference overrides and,
    /// when `use_llm` is set, an Ollama client with a resolved model.
    pub fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        let reference = match &config.reference_dir {
            Some(dir) => ReferenceData::load(dir)?,
            None => ReferenceData::builtin(),
        };
        let mut engine = Self::new(config, reference);

        if engine.config.use_llm {
            let client = OllamaClient::new(&engine.config.ollama_url, engine.config.llm_timeout_secs)?;
            let model = resolve_model(&client, engine.config.model.as_deref())?;
            tracing::info!(url = %client.base_url(), model = %model, "Model-assisted assessment enabled");
            engine = engine.with_llm(Arc::new(client), &model);
        }
        Ok(engine)
    }

    pub fn with_llm(mut self, client: Arc<dyn LlmClient>, model: &str) -> Self {
        let reconciler = StructuredOutputReconciler::new(client, model)
            .with_max_attempts(self.config.max_llm_attempts);
        self.reconciler = Some(Arc::new(reconciler));
        self
    }

    /// Overall bound on the model path, retries included.
    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn NoteEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_prediction_log(mut self, log: PredictionLog) -> Self {
        self.prediction_log = Some(log);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Full assessment. The model call, when configured, runs on the
    /// blocking pool while the analyzers run; a failed or timed-out model
    /// path falls back to the rules.
    pub async fn assess(&self, patient: &PatientData) -> IRAEAssessment {
        let start = Instant::now();
        let patient = self.prepare(patient);

        let model_task = self.reconciler.clone().map(|reconciler| {
            let prompt =
                build_user_prompt(&patient, &self.detector, self.config.note_excerpt_chars);
            tokio::task::spawn_blocking(move || {
                reconciler.reconcile_or_fallback(&prompt, ASSESSMENT_SYSTEM_PROMPT)
            })
        });

        let context = self.detector.detect(&patient);
        let (findings, failures) = self.run_analyzers(&patient);

        let assessment = match model_task {
            None => self.rule_assessment(&patient, &context, findings, failures, AssessmentPath::RuleBased),
            Some(task) => {
                let outcome = match tokio::time::timeout(self.llm_timeout, task).await {
                    Ok(Ok(Reconciled::Parsed(model))) => Ok(model),
                    Ok(Ok(Reconciled::Fallback { reason, .. })) => Err(reason),
                    Ok(Err(join_error)) => Err(ReconcileError::Task(join_error.to_string()).to_string()),
                    Err(_) => Err(ReconcileError::Timeout(self.llm_timeout.as_secs()).to_string()),
                };
                match outcome {
                    Ok(model) => self.merge(&patient, &context, findings, failures, model),
                    Err(reason) => {
                        tracing::warn!(error = %reason, "Model path failed, using rule-based fallback");
                        let mut assessment = self.rule_assessment(
                            &patient,
                            &context,
                            findings,
                            failures,
                            AssessmentPath::RuleBasedFallback,
                        );
                        assessment
                            .confidence_score
                            .uncertainty_factors
                            .push(format!("Model path failed: {reason}"));
                        assessment
                    }
                }
            }
        };

        self.finish(assessment, start)
    }

    /// Deterministic rule-only assessment, no model involved.
    pub fn assess_rule_based(&self, patient: &PatientData) -> IRAEAssessment {
        let start = Instant::now();
        let patient = self.prepare(patient);
        let context = self.detector.detect(&patient);
        let (findings, failures) = self.run_analyzers(&patient);
        let assessment =
            self.rule_assessment(&patient, &context, findings, failures, AssessmentPath::RuleBased);
        self.finish(assessment, start)
    }

    /// One-time enrichment: note extraction and reference-range completion.
    fn prepare(&self, patient: &PatientData) -> PatientData {
        let mut patient = patient.clone();

        if let Some(enricher) = &self.enricher {
            match enricher.extract(&patient) {
                Ok(extra) => {
                    tracing::debug!(
                        symptoms = extra.symptoms.len(),
                        vitals = extra.vitals.len(),
                        "Notes enriched"
                    );
                    patient.symptoms.extend(extra.symptoms);
                    patient.vitals.extend(extra.vitals);
                }
                Err(e) => tracing::warn!(error = %e, "Note enrichment failed, continuing without it"),
            }
        }

        let completed = self.reference.complete_lab_ranges(&mut patient.labs);
        if completed > 0 {
            tracing::debug!(completed, "Default reference ranges applied");
        }
        patient
    }

    /// Every analyzer runs; a panic in one yields a non-detected finding for
    /// its organ and a failure note.
    fn run_analyzers(&self, patient: &PatientData) -> (Vec<OrganSystemFinding>, Vec<String>) {
        let mut findings = Vec::with_capacity(self.analyzers.len());
        let mut failures = Vec::new();

        for analyzer in &self.analyzers {
            let system = analyzer.system();
            match catch_unwind(AssertUnwindSafe(|| analyzer.analyze(patient))) {
                Ok(finding) => findings.push(finding),
                Err(_) => {
                    tracing::warn!(system = %system, "Analyzer failed, organ treated as not detected");
                    failures.push(format!("{system} analyzer failed; organ not assessed"));
                    findings.push(OrganSystemFinding::not_detected(system));
                }
            }
        }
        (findings, failures)
    }

    fn rule_assessment(
        &self,
        patient: &PatientData,
        context: &ImmunotherapyContext,
        findings: Vec<OrganSystemFinding>,
        failures: Vec<String>,
        path: AssessmentPath,
    ) -> IRAEAssessment {
        let affected: Vec<_> = findings.into_iter().filter(|f| f.detected).collect();
        let irae_detected = !affected.is_empty();
        let severity = triage::aggregate_severity(&affected);
        let urgency = triage::minimum_urgency(severity, &affected);

        let mut actions = triage::rule_based_actions(irae_detected, severity, &affected);
        if path == AssessmentPath::RuleBasedFallback {
            actions.push(triage::manual_review_action());
            triage::finalize_actions(&mut actions);
        }

        let mut confidence = triage::confidence_score(patient, &affected, context, path);
        confidence.uncertainty_factors.extend(failures);

        IRAEAssessment {
            immunotherapy_context: context.clone(),
            irae_detected,
            causality: triage::assess_causality(context, irae_detected),
            overall_severity: severity,
            severity_reasoning: triage::severity_reasoning(severity, &affected),
            urgency,
            urgency_reasoning: triage::urgency_reasoning(urgency, severity),
            recommended_actions: actions,
            key_evidence: triage::key_evidence(
                Vec::new(),
                &affected,
                self.config.evidence_per_system,
                self.config.max_key_evidence,
            ),
            affected_systems: affected,
            confidence_score: confidence,
            assessment_path: path,
            disclaimer: DISCLAIMER.to_string(),
        }
    }

    fn merge(
        &self,
        patient: &PatientData,
        context: &ImmunotherapyContext,
        findings: Vec<OrganSystemFinding>,
        failures: Vec<String>,
        model: ModelAssessment,
    ) -> IRAEAssessment {
        let mut affected: Vec<_> = findings.into_iter().filter(|f| f.detected).collect();
        for reported in model.affected_systems.iter().filter(|s| s.detected) {
            match affected.iter_mut().find(|f| f.system == reported.system) {
                Some(finding) => {
                    let graded = finding.graded_severity().max(reported.severity);
                    if finding.severity != Some(graded) {
                        tracing::debug!(system = %finding.system, severity = %graded, "Model raised organ severity");
                    }
                    finding.severity = Some(graded);
                }
                None => affected.push(model_only_finding(reported)),
            }
        }
        affected.sort_by_key(|f| f.system);

        let irae_detected = !affected.is_empty();
        let severity = model.overall_severity.max(triage::aggregate_severity(&affected));

        let causality = match model.causality {
            Some(causality) if context.on_immunotherapy => model_causality(causality),
            _ => triage::assess_causality(context, irae_detected),
        };

        let mut actions = if model.recommended_actions.is_empty() {
            triage::rule_based_actions(irae_detected, severity, &affected)
        } else {
            model.recommended_actions
        };
        triage::add_safety_actions(&mut actions, severity, &affected);
        triage::finalize_actions(&mut actions);

        let mut confidence =
            triage::confidence_score(patient, &affected, context, AssessmentPath::ModelReconciled);
        confidence.uncertainty_factors.extend(failures);

        IRAEAssessment {
            immunotherapy_context: context.clone(),
            irae_detected,
            causality,
            overall_severity: severity,
            severity_reasoning: model
                .severity_reasoning
                .unwrap_or_else(|| triage::severity_reasoning(severity, &affected)),
            urgency: model.urgency,
            urgency_reasoning: model
                .urgency_reasoning
                .unwrap_or_else(|| triage::urgency_reasoning(model.urgency, severity)),
            recommended_actions: actions,
            key_evidence: triage::key_evidence(
                model.key_evidence,
                &affected,
                self.config.evidence_per_system,
                self.config.max_key_evidence,
            ),
            affected_systems: affected,
            confidence_score: confidence,
            assessment_path: AssessmentPath::ModelReconciled,
            disclaimer: DISCLAIMER.to_string(),
        }
    }

    /// Safety floor, logging and the prediction record.
    fn finish(&self, mut assessment: IRAEAssessment, start: Instant) -> IRAEAssessment {
        let corrections = triage::enforce_safety_floor(&mut assessment);
        assessment
            .confidence_score
            .uncertainty_factors
            .extend(corrections.iter().cloned());

        let processing_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            path = %assessment.assessment_path,
            irae_detected = assessment.irae_detected,
            systems = assessment.affected_systems.len(),
            severity = %assessment.overall_severity,
            urgency = %assessment.urgency,
            corrections = corrections.len(),
            processing_ms,
            "irAE assessment complete"
        );

        if let Some(log) = &self.prediction_log {
            let record = PredictionRecord::new(&assessment, None, processing_ms);
            if let Err(e) = log.append(&record) {
                tracing::warn!(path = %log.path().display(), error = %e, "Failed to record prediction");
            }
        }
        assessment
    }
}

fn model_only_finding(reported: &ModelSystemFinding) -> OrganSystemFinding {
    let mut findings = reported.findings.clone();
    if findings.is_empty() {
        findings.push("Detected by clinical model reasoning".to_string());
    }
    let mut evidence = reported.evidence.clone();
    evidence.resize(findings.len().max(evidence.len()), "Reported by clinical model".to_string());
    findings.resize(evidence.len(), "Model-reported finding".to_string());

    OrganSystemFinding {
        system: reported.system,
        detected: true,
        findings,
        evidence,
        severity: Some(reported.severity),
        confidence: Some(MODEL_ONLY_CONFIDENCE),
    }
}

fn model_causality(causality: ModelCausality) -> CausalityAssessment {
    CausalityAssessment {
        likelihood: causality.likelihood,
        reasoning: causality.reasoning,
        temporal_relationship: causality.temporal_relationship,
        alternative_causes: causality.alternative_causes,
        supporting_factors: causality.supporting_factors,
        against_factors: causality.against_factors,
    }
}

/// Severity rank of a detected system, for callers that only hold the
/// assessment.
pub fn system_severity(assessment: &IRAEAssessment, system: OrganSystem) -> Option<Severity> {
    assessment
        .affected_systems
        .iter()
        .find(|f| f.detected && f.system == system)
        .map(OrganSystemFinding::graded_severity)
}
