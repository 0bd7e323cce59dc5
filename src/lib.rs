pub mod analyzers;
pub mod config;
pub mod engine;
pub mod evaluation;
pub mod immunotherapy;
pub mod llm;
pub mod matching;
pub mod models;
pub mod prediction_log;
pub mod reference;
pub mod triage;

pub use engine::AssessmentEngine;
pub use models::{IRAEAssessment, PatientData};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();

    tracing::debug!("{} v{} tracing initialized", config::APP_NAME, config::APP_VERSION);
}
