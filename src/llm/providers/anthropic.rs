use async_trait::async_trait;

use crate::config::CoordinateSystem;
use crate::errors::{InsightError, InsightResult, InvocationFailure};
use crate::llm::contract::ResponseContract;
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::sanitize_for_log;
use crate::llm::types::{CallConfig, ChatMessage, ContentPart, LlmResponse, MessageContent};
use crate::perception::types::media_type_of;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;

/// Anthropic messages API. No server-side schema enforcement, so the
/// invoker validates responses against the contract itself.
pub struct AnthropicProvider {
    id: String,
    api_base: String,
    api_key: String,
    vision: bool,
    coordinates: CoordinateSystem,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            vision: true,
            coordinates: CoordinateSystem::Pixel,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_vision(mut self, vision: bool, coordinates: CoordinateSystem) -> Self {
        self.vision = vision;
        self.coordinates = coordinates;
        self
    }

    fn request_body(&self, messages: &[ChatMessage], cfg: &CallConfig) -> serde_json::Value {
        let system: Vec<String> = messages
            .iter()
            .filter(|m| m.role == "system")
            .map(ChatMessage::text)
            .collect();
        let turns: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != "system")
            .map(convert_message)
            .collect();

        serde_json::json!({
            "model": cfg.model,
            "max_tokens": MAX_TOKENS,
            "temperature": cfg.temperature,
            "system": system.join("\n\n"),
            "messages": turns,
        })
    }
}

fn convert_message(msg: &ChatMessage) -> serde_json::Value {
    let content = match &msg.content {
        MessageContent::Text(text) => serde_json::json!([{ "type": "text", "text": text }]),
        MessageContent::Parts(parts) => serde_json::Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => serde_json::json!({ "type": "text", "text": text }),
                    ContentPart::ImageUrl { image_url } => {
                        let data = image_url
                            .url
                            .split_once("base64,")
                            .map(|(_, d)| d)
                            .unwrap_or(&image_url.url);
                        serde_json::json!({
                            "type": "image",
                            "source": {
                                "type": "base64",
                                "media_type": media_type_of(data),
                                "data": data,
                            }
                        })
                    }
                })
                .collect(),
        ),
    };
    serde_json::json!({ "role": msg.role, "content": content })
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    fn supports_strict_schema(&self) -> bool {
        false
    }

    fn coordinates(&self) -> CoordinateSystem {
        self.coordinates
    }

    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        contract: &ResponseContract,
        cfg: &CallConfig,
    ) -> InsightResult<LlmResponse> {
        let body = self.request_body(&messages, cfg);
        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            contract = contract.name,
            body = %sanitize_for_log(&body),
            "sending Anthropic request"
        );

        let response = self
            .client
            .post(&self.api_base)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(cfg.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let err_body = response.text().await.unwrap_or_default();
            let kind = if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                InvocationFailure::Auth
            } else {
                InvocationFailure::Status
            };
            return Err(InsightError::invocation(kind, format!("{}: {}", status, err_body)));
        }

        let json: serde_json::Value = response.json().await?;
        let mut content = String::new();
        let mut reasoning = String::new();
        for block in json["content"].as_array().into_iter().flatten() {
            match block["type"].as_str() {
                Some("text") => content.push_str(block["text"].as_str().unwrap_or("")),
                Some("thinking") => reasoning.push_str(block["thinking"].as_str().unwrap_or("")),
                _ => {}
            }
        }

        tracing::info!(
            provider = %self.id,
            content_len = content.len(),
            "Anthropic response received"
        );
        Ok(LlmResponse { content, reasoning })
    }
}
