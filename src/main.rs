use std::path::{Path, PathBuf};
use std::future::Future;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;

use irae_triage::config::EngineConfig;
use irae_triage::engine::{AssessmentEngine, EngineError};
use irae_triage::evaluation::{self, AggregateMetrics, EvaluationError};
use irae_triage::llm::{LlmClient, LlmError, OllamaClient};
use irae_triage::models::PatientData;

#[derive(Parser, Debug)]
#[command(name = "irae-triage", version, about = "Immune-related adverse event detection and triage")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assess one patient record and print the assessment as JSON.
    Assess {
        patient: PathBuf,
        /// Reconcile with a local Ollama model.
        #[arg(long)]
        llm: bool,
        #[arg(long)]
        model: Option<String>,
        /// Append a prediction record to this JSONL file.
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Score labeled cases and print aggregate metrics.
    Evaluate {
        cases: PathBuf,
        #[arg(long)]
        llm: bool,
        #[arg(long)]
        model: Option<String>,
    },
    /// List models on the configured Ollama server.
    Models,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("Cannot read {0}: {1}")]
    Read(String, std::io::Error),

    #[error("Invalid patient record {0}: {1}")]
    Patient(String, serde_json::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Output serialization failed: {0}")]
    Output(#[from] serde_json::Error),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

fn main() -> ExitCode {
    irae_triage::init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let mut config = EngineConfig::from_env();

    match cli.command {
        Command::Assess { patient, llm, model, log } => {
            apply_model_flags(&mut config, llm, model);
            if log.is_some() {
                config.prediction_log = log;
            }
            let patient = read_patient(&patient)?;
            // The blocking HTTP client must be built and dropped outside the
            // async runtime.
            let engine = AssessmentEngine::from_config(config)?;
            let assessment = block_on(engine.assess(&patient))?;
            println!("{}", serde_json::to_string_pretty(&assessment)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Evaluate { cases, llm, model } => {
            apply_model_flags(&mut config, llm, model);
            let cases = evaluation::load_cases(&cases)?;
            let engine = AssessmentEngine::from_config(config)?;
            let results = block_on(evaluation::run_evaluation(&engine, &cases))?;
            let metrics = AggregateMetrics::from_results(&results);
            println!("{}", serde_json::to_string_pretty(&metrics)?);

            let failed = metrics.failed_criteria();
            if metrics.passes_production_criteria() {
                tracing::info!(cases = metrics.total_cases, "Production criteria met");
                Ok(ExitCode::SUCCESS)
            } else {
                for criterion in &failed {
                    eprintln!("FAILED: {criterion}");
                }
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Models => {
            let client = OllamaClient::new(&config.ollama_url, config.llm_timeout_secs)?;
            for model in client.list_models()? {
                println!("{model}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn apply_model_flags(config: &mut EngineConfig, llm: bool, model: Option<String>) {
    if llm || model.is_some() {
        config.use_llm = true;
    }
    if model.is_some() {
        config.model = model;
    }
}

fn read_patient(path: &Path) -> Result<PatientData, CliError> {
    let display = path.display().to_string();
    let json = std::fs::read_to_string(path).map_err(|e| CliError::Read(display.clone(), e))?;
    serde_json::from_str(&json).map_err(|e| CliError::Patient(display, e))
}

/// How long shutdown waits on model calls abandoned after a timeout.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Run `future` on a fresh runtime. A blocking model call that outlived its
/// timeout does not hold the process open past `SHUTDOWN_GRACE`.
fn block_on<F: Future>(future: F) -> Result<F::Output, std::io::Error> {
    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let output = rt.block_on(future);
    rt.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}
