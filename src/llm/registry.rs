use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, LlmConfig, RoleEntry};
use crate::errors::{InsightError, InsightResult};
use crate::llm::invoker::ModelInvoker;
use crate::llm::provider::LlmProvider;
use crate::llm::providers::anthropic::AnthropicProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Pipeline roles that can be mapped to different models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Locate,
    Insight,
    Classify,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Locate => "locate",
            ModelRole::Insight => "insight",
            ModelRole::Classify => "classify",
        }
    }
}

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    /// Kept for role-to-model lookups (does not need to be mutable after init).
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
            llm_config: LlmConfig::default(),
        }
    }

    /// A registry with one provider used for every role.
    pub fn single(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        let name = provider.name().to_string();
        let mut registry = Self::new(name.clone());
        registry.llm_config.active_provider = name.clone();
        registry.llm_config.providers.insert(
            name.clone(),
            crate::config::ProviderEntry {
                display_name: name,
                api_base: String::new(),
                model: model.into(),
                temperature: 0.0,
                adapter: None,
                api_key: None,
                vision: provider.supports_vision(),
                coordinates: provider.coordinates(),
                strict_schema: provider.supports_strict_schema(),
            },
        );
        registry.register(provider);
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> InsightResult<Arc<dyn LlmProvider>> {
        self.providers
            .get(&self.active)
            .cloned()
            .ok_or_else(|| InsightError::Config(format!("Active provider '{}' not found in registry", self.active)))
    }

    pub fn set_active(&mut self, name: String) -> InsightResult<()> {
        if self.providers.contains_key(&name) {
            self.active = name;
            Ok(())
        } else {
            Err(InsightError::Config(format!("Provider '{name}' not registered")))
        }
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    fn role_entry(&self, role: ModelRole) -> Option<&RoleEntry> {
        let roles = &self.llm_config.roles;
        match role {
            ModelRole::Locate => roles.locate.as_ref(),
            ModelRole::Insight => roles.insight.as_ref(),
            ModelRole::Classify => roles.classify.as_ref(),
        }
    }

    /// Return an invoker for a pipeline role.
    ///
    /// Role resolution order:
    /// 1. `[llm.roles.<role>]` in config.toml
    /// 2. Fallback: active provider with its default model / temperature
    pub fn invoker_for(&self, role: ModelRole, timeout: Duration) -> InsightResult<ModelInvoker> {
        if let Some(entry) = self.role_entry(role) {
            let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
                InsightError::Config(format!(
                    "Role '{}' references unknown provider '{}'",
                    role.as_str(),
                    entry.provider
                ))
            })?;
            let temperature = entry.temperature.unwrap_or_else(|| {
                self.llm_config
                    .providers
                    .get(&entry.provider)
                    .map(|p| p.temperature)
                    .unwrap_or(0.1)
            });
            tracing::debug!(
                role = role.as_str(),
                provider = %entry.provider,
                model = %entry.model,
                temperature = temperature,
                "resolved role config"
            );
            return Ok(ModelInvoker::new(
                provider,
                CallConfig {
                    model: entry.model.clone(),
                    temperature,
                    timeout,
                },
            ));
        }

        // Fallback: active provider, provider-level defaults
        let provider = self.get_active()?;
        let entry = self.llm_config.providers.get(&self.active);
        let (model, temperature) = entry
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.1));
        tracing::debug!(
            role = role.as_str(),
            provider = %self.active,
            model = %model,
            "role not configured, using active provider fallback"
        );
        Ok(ModelInvoker::new(
            provider,
            CallConfig {
                model,
                temperature,
                timeout,
            },
        ))
    }

    /// Build a registry from the loaded app config.
    ///
    /// API keys are read from environment variables named `UISIGHT_<ID>_API_KEY`,
    /// falling back to the config file. Missing keys, an unknown active provider
    /// or roles pointing at unknown providers are reported here, at startup.
    pub fn from_config(config: &AppConfig) -> InsightResult<Self> {
        let mut registry = Self {
            providers: HashMap::new(),
            active: config.llm.active_provider.clone(),
            llm_config: config.llm.clone(),
        };
        for (id, entry) in &config.llm.providers {
            let api_key = std::env::var(format!("UISIGHT_{}_API_KEY", id.to_uppercase()))
                .ok()
                .or_else(|| entry.api_key.clone())
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    InsightError::Config(format!(
                        "provider '{id}' has no API key (set UISIGHT_{}_API_KEY or api_key)",
                        id.to_uppercase()
                    ))
                })?;

            let provider: Arc<dyn LlmProvider> = match entry.adapter.as_deref() {
                Some("anthropic") => Arc::new(
                    AnthropicProvider::new(id.clone(), entry.api_base.clone(), api_key)
                        .with_vision(entry.vision, entry.coordinates),
                ),
                None | Some("openai") => Arc::new(
                    OpenAiCompatibleProvider::new(id.clone(), entry.api_base.clone(), api_key)
                        .with_vision(entry.vision, entry.coordinates)
                        .with_strict_schema(entry.strict_schema),
                ),
                Some(other) => {
                    return Err(InsightError::Config(format!(
                        "provider '{id}' uses unknown adapter '{other}'"
                    )))
                }
            };
            registry.register(provider);
        }

        registry.get_active()?;
        for role in [ModelRole::Locate, ModelRole::Insight, ModelRole::Classify] {
            if let Some(entry) = registry.role_entry(role) {
                if !registry.providers.contains_key(&entry.provider) {
                    return Err(InsightError::Config(format!(
                        "Role '{}' references unknown provider '{}'",
                        role.as_str(),
                        entry.provider
                    )));
                }
            }
        }

        tracing::info!(
            active = %registry.active,
            providers = ?registry.list_names(),
            "provider registry built"
        );
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const CONFIG: &str = r#"
[llm]
active_provider = "main"

[llm.providers.main]
display_name = "Main"
api_base = "http://localhost:9/v1/chat/completions"
model = "vl-large"
api_key = "sk-main"
vision = true

[llm.providers.claude]
display_name = "Claude"
api_base = "http://localhost:9/v1/messages"
model = "claude-model"
adapter = "anthropic"
api_key = "sk-claude"

[llm.roles.classify]
provider = "claude"
model = "claude-small"
"#;

    #[test]
    fn roles_resolve_with_fallback() {
        let cfg = parse_config(CONFIG).unwrap();
        let registry = ProviderRegistry::from_config(&cfg).unwrap();
        assert_eq!(registry.list_names(), vec!["claude", "main"]);

        let classify = registry.invoker_for(ModelRole::Classify, Duration::from_secs(20)).unwrap();
        assert_eq!(classify.model(), "claude-small");

        let locate = registry.invoker_for(ModelRole::Locate, Duration::from_secs(20)).unwrap();
        assert_eq!(locate.model(), "vl-large");
        assert!(locate.supports_vision());
    }

    #[test]
    fn missing_api_key_fails_at_startup() {
        let cfg = parse_config(&CONFIG.replace("api_key = \"sk-claude\"", "")).unwrap();
        match ProviderRegistry::from_config(&cfg) {
            Err(InsightError::Config(msg)) => assert!(msg.contains("claude")),
            other => panic!("expected config error, got {:?}", other.err()),
        }
    }

    #[test]
    fn unknown_active_provider_is_fatal() {
        let cfg = parse_config(&CONFIG.replace("active_provider = \"main\"", "active_provider = \"nope\"")).unwrap();
        assert!(ProviderRegistry::from_config(&cfg).is_err());
    }
}
