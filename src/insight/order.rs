use crate::errors::InsightResult;
use crate::insight::normalize::parse_order_sensitivity;
use crate::llm::invoker::ModelInvoker;
use crate::prompts::order::judge_order_sensitive;

/// Whether `description` picks its target by order or position.
///
/// Text only: the screenshot never influences the answer. A blank
/// description is trivially not order-sensitive and costs no model call.
pub async fn classify(invoker: &ModelInvoker, description: &str) -> InsightResult<bool> {
    let description = description.trim();
    if description.is_empty() {
        return Ok(false);
    }
    let prompt = judge_order_sensitive(description);
    let value = invoker.invoke(prompt.messages, &prompt.contract).await?;
    let sensitive = parse_order_sensitivity(value)?;
    tracing::debug!(description, sensitive, "order sensitivity classified");
    Ok(sensitive)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::llm::providers::scripted::ScriptedProvider;
    use crate::llm::types::CallConfig;

    fn invoker(provider: Arc<ScriptedProvider>) -> ModelInvoker {
        ModelInvoker::new(
            provider,
            CallConfig {
                model: "test".into(),
                temperature: 0.0,
                timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn blank_description_skips_the_model() {
        let provider = Arc::new(ScriptedProvider::fixed(r#"{"isOrderSensitive": true}"#));
        assert!(!classify(&invoker(provider.clone()), "   ").await.unwrap());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn prompt_carries_no_image() {
        let provider = Arc::new(ScriptedProvider::fixed(r#"{"isOrderSensitive": true}"#).with_vision(true));
        assert!(classify(&invoker(provider.clone()), "the second row").await.unwrap());
        let calls = provider.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].contract, "order_sensitivity");
        assert!(calls[0].messages.iter().all(|m| m.image_count() == 0));
    }

    #[tokio::test]
    async fn malformed_answer_is_a_parse_error() {
        let provider = Arc::new(ScriptedProvider::fixed(r#"{"sensitive": "yes"}"#).with_strict_schema(false));
        assert!(classify(&invoker(provider), "the last input").await.is_err());
    }
}
