//! Model-assisted assessment: client abstraction, prompt rendering and the
//! structured-output reconciler.

pub mod ollama;
pub mod prompt;
pub mod reconcile;
pub mod types;

pub use ollama::*;
pub use prompt::*;
pub use reconcile::*;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Ollama is not running at {0}")]
    Connection(String),

    #[error("Ollama returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("No compatible model available")]
    NoModelAvailable,

    #[error("Model '{0}' is not available on the server")]
    ModelNotFound(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),
}

/// Text-generation backend (allows mocking).
pub trait LlmClient: Send + Sync {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, LlmError>;

    fn is_model_available(&self, model: &str) -> Result<bool, LlmError>;

    fn list_models(&self) -> Result<Vec<String>, LlmError>;
}
