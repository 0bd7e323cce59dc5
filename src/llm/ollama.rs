use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{LlmClient, LlmError};

/// Preferred models in order of preference.
pub const PREFERRED_MODELS: &[&str] = &[
    "medgemma:27b",
    "medgemma",
    "medgemma:4b",
    "llama3.1",
    "qwen2.5",
    "mistral",
];

/// Ollama HTTP client for local inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_connect() {
            LlmError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            LlmError::Timeout(self.timeout_secs)
        } else {
            LlmError::HttpClient(e.to_string())
        }
    }
}

/// The requested model when the server has it; otherwise the first
/// preferred model the server has pulled.
pub fn resolve_model(client: &dyn LlmClient, requested: Option<&str>) -> Result<String, LlmError> {
    match requested {
        Some(model) if client.is_model_available(model)? => Ok(model.to_string()),
        Some(model) => Err(LlmError::ModelNotFound(model.to_string())),
        None => select_preferred(&client.list_models()?).ok_or(LlmError::NoModelAvailable),
    }
}

/// First entry of `PREFERRED_MODELS` matched by an available model name.
pub fn select_preferred(available: &[String]) -> Option<String> {
    PREFERRED_MODELS.iter().find_map(|preferred| {
        available
            .iter()
            .find(|m| m.starts_with(preferred))
            .cloned()
    })
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TaggedModel>,
}

#[derive(Deserialize)]
struct TaggedModel {
    name: String,
}

impl LlmClient for OllamaClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            format: "json",
            options: GenerateOptions { temperature: 0.1 },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;
        Ok(parsed.response)
    }

    fn is_model_available(&self, model: &str) -> Result<bool, LlmError> {
        Ok(self.list_models()?.iter().any(|m| m.starts_with(model)))
    }

    fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TagsResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

enum Scripted {
    Reply(String),
    Fail(String),
    TimedOut,
}

/// Scripted client for tests. Replies are served in order; the last one
/// repeats once the script runs out.
pub struct MockLlmClient {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    available_models: Vec<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self::scripted(vec![Ok(response.to_string())])
    }

    /// `Err(message)` entries become connection failures.
    pub fn scripted(responses: Vec<Result<String, String>>) -> Self {
        Self::from_script(
            responses
                .into_iter()
                .map(|r| match r {
                    Ok(text) => Scripted::Reply(text),
                    Err(message) => Scripted::Fail(message),
                })
                .collect(),
        )
    }

    fn from_script(script: VecDeque<Scripted>) -> Self {
        Self {
            script: Mutex::new(script),
            last: Mutex::new(None),
            available_models: vec!["medgemma:latest".to_string()],
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with a request timeout.
    pub fn timing_out() -> Self {
        Self::from_script(VecDeque::from([Scripted::TimedOut]))
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn reply(entry: &Scripted) -> Result<String, LlmError> {
        match entry {
            Scripted::Reply(text) => Ok(text.clone()),
            Scripted::Fail(message) => Err(LlmError::Connection(message.clone())),
            Scripted::TimedOut => Err(LlmError::Timeout(0)),
        }
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _model: &str, _prompt: &str, _system: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let next = self
            .script
            .lock()
            .map_err(|_| LlmError::HttpClient("mock script poisoned".into()))?
            .pop_front();
        let mut last = self
            .last
            .lock()
            .map_err(|_| LlmError::HttpClient("mock script poisoned".into()))?;
        if let Some(entry) = next {
            *last = Some(entry);
        }
        match last.as_ref() {
            Some(entry) => Self::reply(entry),
            None => Err(LlmError::ResponseParsing("mock has no scripted reply".into())),
        }
    }

    fn is_model_available(&self, model: &str) -> Result<bool, LlmError> {
        Ok(self.available_models.iter().any(|m| m.starts_with(model)))
    }

    fn list_models(&self) -> Result<Vec<String>, LlmError> {
        Ok(self.available_models.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_client_returns_configured_response() {
        let client = MockLlmClient::new("test response");
        assert_eq!(client.generate("m", "p", "s").unwrap(), "test response");
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn scripted_replies_then_repeat_last() {
        let client = MockLlmClient::scripted(vec![Err("down".into()), Ok("{}".into())]);
        assert!(matches!(client.generate("m", "p", "s"), Err(LlmError::Connection(_))));
        assert_eq!(client.generate("m", "p", "s").unwrap(), "{}");
        assert_eq!(client.generate("m", "p", "s").unwrap(), "{}");
        assert_eq!(client.call_count(), 3);
    }

    #[test]
    fn mock_client_model_availability() {
        let client = MockLlmClient::new("").with_models(vec!["llama3.1:8b".into()]);
        assert!(client.is_model_available("llama3.1").unwrap());
        assert!(!client.is_model_available("medgemma").unwrap());
    }

    #[test]
    fn requested_model_must_be_pulled() {
        let client = MockLlmClient::new("").with_models(vec!["llama3.1:8b".into(), "medgemma:4b".into()]);
        assert_eq!(resolve_model(&client, Some("llama3.1")).unwrap(), "llama3.1");
        assert!(matches!(
            resolve_model(&client, Some("medgemma:27b")),
            Err(LlmError::ModelNotFound(ref m)) if m == "medgemma:27b"
        ));
        assert_eq!(resolve_model(&client, None).unwrap(), "medgemma:4b");

        let empty = MockLlmClient::new("").with_models(Vec::new());
        assert!(matches!(resolve_model(&empty, None), Err(LlmError::NoModelAvailable)));
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 60).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.timeout_secs, 60);
    }

    #[test]
    fn preferred_model_selection_follows_list_order() {
        let available = vec!["mistral:7b".to_string(), "medgemma:4b".to_string()];
        assert_eq!(select_preferred(&available).as_deref(), Some("medgemma:4b"));
        assert_eq!(select_preferred(&["phi3".to_string()]), None);
    }
}
