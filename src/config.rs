use std::path::PathBuf;
use std::str::FromStr;

/// Application-level constants
pub const APP_NAME: &str = "irae-triage";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "irae_triage=info,warn"
}

/// Per-user data directory (prediction logs, local reference overrides).
/// Falls back to the working directory when the platform reports none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

pub fn default_prediction_log_path() -> PathBuf {
    default_data_dir().join("predictions.jsonl")
}

/// Engine configuration. Passed explicitly to the engine; nothing here is
/// process-global.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub use_llm: bool,
    pub ollama_url: String,
    /// `None` selects the first available preferred model.
    pub model: Option<String>,
    pub llm_timeout_secs: u64,
    pub max_llm_attempts: usize,
    pub max_key_evidence: usize,
    pub evidence_per_system: usize,
    pub note_excerpt_chars: usize,
    pub reference_dir: Option<PathBuf>,
    pub prediction_log: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_llm: false,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: None,
            llm_timeout_secs: 120,
            max_llm_attempts: 2,
            max_key_evidence: 10,
            evidence_per_system: 3,
            note_excerpt_chars: 500,
            reference_dir: None,
            prediction_log: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `IRAE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`. Unparseable values are
    /// logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(use_llm) = parsed(&lookup, "IRAE_USE_LLM", parse_flag) {
            config.use_llm = use_llm;
        }
        if let Some(url) = non_empty(&lookup, "IRAE_OLLAMA_URL") {
            config.ollama_url = url;
        }
        if let Some(model) = non_empty(&lookup, "IRAE_MODEL") {
            config.model = Some(model);
        }
        if let Some(secs) = parsed(&lookup, "IRAE_LLM_TIMEOUT_SECS", |v| u64::from_str(v).ok()) {
            config.llm_timeout_secs = secs;
        }
        if let Some(dir) = non_empty(&lookup, "IRAE_REFERENCE_DIR") {
            config.reference_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = non_empty(&lookup, "IRAE_PREDICTION_LOG") {
            config.prediction_log = Some(PathBuf::from(path));
        }
        config
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = non_empty(lookup, key)?;
    let value = parse(&raw);
    if value.is_none() {
        tracing::warn!(key, value = %raw, "Ignoring unparseable configuration value");
    }
    value
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
