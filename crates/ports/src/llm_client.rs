//! `LLMClient` — the semantic-validation and domain-description capability
//! consumed by the LLM validator and convention finalizer (§6).

use async_trait::async_trait;

use crate::error::PortError;

#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    /// Raw textual content. May contain a `<think>…</think>` preamble and
    /// fenced code blocks around the JSON payload the caller expects; the
    /// caller is responsible for stripping both before parsing (§4.9, §6).
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// Opaque handle for recording this exchange via `AuditRepository`,
    /// when the implementation supports multi-turn conversations.
    pub conversation_id: Option<String>,
}

#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a response to `prompt` under `system`. `temperature`
    /// follows the spec's convention: `0.3` for domain description, `0.0`
    /// to `0.2` for FK validation. `thinking` requests a visible reasoning
    /// preamble the caller must strip before JSON parsing.
    async fn generate_response(
        &self,
        prompt: &str,
        system: &str,
        temperature: f64,
        thinking: bool,
    ) -> Result<LlmResponse, PortError>;
}
