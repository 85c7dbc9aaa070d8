//! In-process provider that answers from a script instead of the network.
//!
//! Used by tests and offline replays: each call is handed to a responder
//! closure that sees the composed messages and returns the raw model text.
//!
//! ```rust,ignore
//! let provider = ScriptedProvider::new(|messages| {
//!     Ok(r#"{"isOrderSensitive": false}"#.to_string())
//! })
//! .with_vision(true);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::CoordinateSystem;
use crate::errors::InsightResult;
use crate::llm::contract::ResponseContract;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

type Responder = dyn Fn(&[ChatMessage]) -> InsightResult<String> + Send + Sync;

/// A call as seen by the provider.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub contract: &'static str,
    pub messages: Vec<ChatMessage>,
}

pub struct ScriptedProvider {
    name: String,
    vision: bool,
    strict_schema: bool,
    coordinates: CoordinateSystem,
    delay: Option<Duration>,
    responder: Box<Responder>,
    calls: AtomicUsize,
    log: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedProvider {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> InsightResult<String> + Send + Sync + 'static,
    {
        Self {
            name: "scripted".into(),
            vision: false,
            strict_schema: true,
            coordinates: CoordinateSystem::Pixel,
            delay: None,
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answer with the same text.
    pub fn fixed(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }

    pub fn with_strict_schema(mut self, strict: bool) -> Self {
        self.strict_schema = strict;
        self
    }

    pub fn with_coordinates(mut self, coordinates: CoordinateSystem) -> Self {
        self.coordinates = coordinates;
        self
    }

    /// Sleep before answering; used to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
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
        _cfg: &CallConfig,
    ) -> InsightResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.log.lock() {
            log.push(RecordedCall {
                contract: contract.name,
                messages: messages.clone(),
            });
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let content = (self.responder)(&messages)?;
        Ok(LlmResponse {
            content,
            reasoning: String::new(),
        })
    }
}
