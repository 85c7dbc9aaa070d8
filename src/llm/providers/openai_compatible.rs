use async_trait::async_trait;

use crate::config::CoordinateSystem;
use crate::errors::{InsightError, InsightResult, InvocationFailure};
use crate::llm::contract::ResponseContract;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    vision: bool,
    strict_schema: bool,
    coordinates: CoordinateSystem,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            vision: false,
            strict_schema: true,
            coordinates: CoordinateSystem::Pixel,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_vision(mut self, vision: bool, coordinates: CoordinateSystem) -> Self {
        self.vision = vision;
        self.coordinates = coordinates;
        self
    }

    pub fn with_strict_schema(mut self, strict: bool) -> Self {
        self.strict_schema = strict;
        self
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        contract: &ResponseContract,
        cfg: &CallConfig,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": messages,
            "stream": false,
            "temperature": cfg.temperature,
        });

        if self.strict_schema && contract.strict {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": contract.name,
                    "strict": true,
                    "schema": contract.schema,
                }
            });
        } else if self.strict_schema {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    fn supports_strict_schema(&self) -> bool {
        self.strict_schema
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
        let body = self.request_body(&messages, contract, cfg);

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            contract = contract.name,
            "sending LLM request"
        );
        tracing::debug!(
            body = %sanitize_for_log(&body),
            "request body (sanitized, base64 omitted)"
        );

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
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
        let message = &json["choices"][0]["message"];
        let content = message["content"].as_str().unwrap_or("").to_string();
        let reasoning = message["reasoning_content"].as_str().unwrap_or("").to_string();

        tracing::info!(
            provider = %self.id,
            content_len = content.len(),
            reasoning_len = reasoning.len(),
            "LLM JSON response received"
        );

        Ok(LlmResponse { content, reasoning })
    }
}

/// Clone the body with image payloads replaced, for debug logging only.
pub(crate) fn sanitize_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            // content can be string or array of parts; we only touch the array case.
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if let Some(url) = part.pointer_mut("/image_url/url") {
                    *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                }
                if let Some(data) = part.pointer_mut("/source/data") {
                    *data = serde_json::Value::String("<omitted_base64_image>".to_string());
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}
