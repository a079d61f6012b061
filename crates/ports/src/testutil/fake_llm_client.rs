//! An in-memory, scriptable `LLMClient` fake for engine tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;

use crate::{error::PortError, llm_client::LLMClient, llm_client::LlmResponse};

/// Plays back a scripted sequence of responses (or errors), one per call,
/// so a test can assert the validator reacts correctly to e.g. a malformed
/// JSON body followed by a valid one on retry.
#[derive(Clone, Default)]
pub struct FakeLlmClient {
    responses: Arc<Mutex<Vec<Result<String, String>>>>,
    cursor: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw response body (as the LLM would emit it, potentially
    /// wrapped in `<think>` tags or fenced code blocks).
    pub fn push_response(self, body: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push(Ok(body.into()));
        self
    }

    pub fn push_error(self, message: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push(Err(message.into()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn prompts_seen(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMClient for FakeLlmClient {
    async fn generate_response(
        &self,
        prompt: &str,
        _system: &str,
        _temperature: f64,
        _thinking: bool,
    ) -> Result<LlmResponse, PortError> {
        self.calls.lock().unwrap().push(prompt.to_string());
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let responses = self.responses.lock().unwrap();
        let slot = responses
            .get(index)
            .cloned()
            .unwrap_or_else(|| Err("no scripted response left".to_string()));
        match slot {
            Ok(content) => Ok(LlmResponse {
                prompt_tokens: (prompt.len() / 4) as u32,
                completion_tokens: (content.len() / 4) as u32,
                total_tokens: ((prompt.len() + content.len()) / 4) as u32,
                content,
                conversation_id: Some(format!("fake-conversation-{index}")),
            }),
            Err(message) => Err(PortError::Network(message)),
        }
    }
}
