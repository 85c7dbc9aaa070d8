use std::sync::Arc;

use crate::config::CoordinateSystem;
use crate::errors::{InsightError, InsightResult, InvocationFailure};
use crate::llm::contract::{extract_json, ResponseContract};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage};

/// A provider bound to a resolved model configuration.
///
/// Enforces the caller's timeout and the response contract; never retries.
#[derive(Clone)]
pub struct ModelInvoker {
    provider: Arc<dyn LlmProvider>,
    cfg: CallConfig,
}

impl ModelInvoker {
    pub fn new(provider: Arc<dyn LlmProvider>, cfg: CallConfig) -> Self {
        Self { provider, cfg }
    }

    pub fn supports_vision(&self) -> bool {
        self.provider.supports_vision()
    }

    pub fn coordinates(&self) -> CoordinateSystem {
        self.provider.coordinates()
    }

    pub fn model(&self) -> &str {
        &self.cfg.model
    }

    /// Send `messages` and return the JSON document the model produced.
    ///
    /// Responses the backend did not constrain by schema are validated here.
    pub async fn invoke(
        &self,
        messages: Vec<ChatMessage>,
        contract: &ResponseContract,
    ) -> InsightResult<serde_json::Value> {
        let started = std::time::Instant::now();
        let call = self.provider.chat(messages, contract, &self.cfg);
        let response = match tokio::time::timeout(self.cfg.timeout, call).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    contract = contract.name,
                    timeout_ms = self.cfg.timeout.as_millis() as u64,
                    "model call timed out"
                );
                return Err(InsightError::invocation(
                    InvocationFailure::Timeout,
                    format!("no response within {:?}", self.cfg.timeout),
                ));
            }
        };

        tracing::debug!(
            provider = self.provider.name(),
            contract = contract.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model call complete"
        );

        let value = extract_json(&response.content).ok_or_else(|| {
            InsightError::ResponseParse(format!(
                "{}: response is not JSON: {}",
                contract.name,
                preview(&response.content)
            ))
        })?;

        if !(self.provider.supports_strict_schema() && contract.strict) {
            contract.validate(&value).map_err(|e| {
                InsightError::ResponseParse(format!("{}: {}", contract.name, e))
            })?;
        }
        Ok(value)
    }
}

fn preview(text: &str) -> String {
    let mut p: String = text.chars().take(120).collect();
    if text.chars().count() > 120 {
        p.push_str("...");
    }
    p
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::llm::providers::scripted::ScriptedProvider;

    fn cfg(timeout: Duration) -> CallConfig {
        CallConfig { model: "test".into(), temperature: 0.0, timeout }
    }

    fn contract() -> ResponseContract {
        ResponseContract::strict(
            "order_sensitivity",
            json!({
                "type": "object",
                "properties": { "isOrderSensitive": { "type": "boolean" } },
                "required": ["isOrderSensitive"],
                "additionalProperties": false
            }),
        )
    }

    #[tokio::test]
    async fn times_out_with_distinguishable_error() {
        let provider = ScriptedProvider::fixed(r#"{"isOrderSensitive": true}"#)
            .with_delay(Duration::from_millis(500));
        let invoker = ModelInvoker::new(Arc::new(provider), cfg(Duration::from_millis(20)));
        let err = invoker.invoke(vec![ChatMessage::user("x")], &contract()).await.unwrap_err();
        assert!(err.is_timeout(), "{err}");
    }

    #[tokio::test]
    async fn non_strict_backend_is_validated_post_hoc() {
        let provider = ScriptedProvider::fixed(r#"{"isOrderSensitive": "yes"}"#).with_strict_schema(false);
        let invoker = ModelInvoker::new(Arc::new(provider), cfg(Duration::from_secs(1)));
        let err = invoker.invoke(vec![ChatMessage::user("x")], &contract()).await.unwrap_err();
        assert!(matches!(err, InsightError::ResponseParse(_)), "{err}");
    }

    #[tokio::test]
    async fn fenced_json_is_accepted() {
        let provider = ScriptedProvider::fixed("```json\n{\"isOrderSensitive\": false}\n```")
            .with_strict_schema(false);
        let invoker = ModelInvoker::new(Arc::new(provider), cfg(Duration::from_secs(1)));
        let v = invoker.invoke(vec![ChatMessage::user("x")], &contract()).await.unwrap();
        assert_eq!(v, json!({"isOrderSensitive": false}));
    }

    #[tokio::test]
    async fn provider_errors_propagate_unchanged() {
        let provider = ScriptedProvider::new(|_| {
            Err(InsightError::invocation(InvocationFailure::Auth, "401 Unauthorized"))
        });
        let invoker = ModelInvoker::new(Arc::new(provider), cfg(Duration::from_secs(1)));
        let err = invoker.invoke(vec![ChatMessage::user("x")], &contract()).await.unwrap_err();
        assert!(matches!(
            err,
            InsightError::ModelInvocation { kind: InvocationFailure::Auth, .. }
        ));
    }
}
