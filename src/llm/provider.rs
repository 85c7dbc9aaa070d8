use async_trait::async_trait;

use crate::config::CoordinateSystem;
use crate::errors::InsightResult;
use crate::llm::contract::ResponseContract;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

/// Unified LLM backend trait. All providers implement this trait.
/// The rest of the pipeline only talks to backends through it.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    /// Whether the backend accepts image input.
    fn supports_vision(&self) -> bool;

    /// Whether the backend enforces `contract` server-side. When false the
    /// invoker validates the response after the fact.
    fn supports_strict_schema(&self) -> bool;

    /// Coordinate convention of `bbox_2d` values this backend returns.
    fn coordinates(&self) -> CoordinateSystem {
        CoordinateSystem::Pixel
    }

    /// Single non-streaming completion constrained by `contract`.
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        contract: &ResponseContract,
        cfg: &CallConfig,
    ) -> InsightResult<LlmResponse>;
}
