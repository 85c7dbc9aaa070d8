use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{InsightError, InsightResult};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_LANGUAGE: &str = "English";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub insight: InsightConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// "anthropic" for Claude, None for OpenAI-compatible
    pub adapter: Option<String>,
    /// Optional API key stored in config.toml (falls back to env var UISIGHT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Whether the model accepts image input.
    #[serde(default)]
    pub vision: bool,
    /// How the model reports box coordinates.
    #[serde(default)]
    pub coordinates: CoordinateSystem,
    /// Send `response_format: json_schema`; disable for endpoints that reject it.
    #[serde(default = "default_true")]
    pub strict_schema: bool,
}

/// Coordinate convention of a model's `bbox_2d` output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSystem {
    /// Absolute pixels of the image the model was shown.
    #[default]
    Pixel,
    /// `[x1, y1, x2, y2]` scaled to 0–1000.
    Normalized1000,
    /// `[y1, x1, y2, x2]` scaled to 0–1000.
    Normalized1000Yx,
}

/// Maps pipeline roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Element and section grounding.
    pub locate: Option<RoleEntry>,
    /// Assertions, extraction, element description.
    pub insight: Option<RoleEntry>,
    /// Lightweight classification calls (order sensitivity).
    pub classify: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
}

fn default_temperature() -> f64 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightConfig {
    /// Use vision prompt variants when the backend accepts images.
    #[serde(default = "default_true")]
    pub vision_mode: bool,
    #[serde(default = "default_language")]
    pub preferred_language: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub truncate_text_length: Option<usize>,
    #[serde(default)]
    pub filter_non_text_content: bool,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            vision_mode: true,
            preferred_language: default_language(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            truncate_text_length: None,
            filter_non_text_content: false,
        }
    }
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    /// Off unless explicitly enabled; replay assumes an identical script and UI.
    #[serde(default)]
    pub enabled: bool,
    /// Defaults to `<cache dir>/uisight/task-cache`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl CacheConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("uisight")
            .join("task-cache")
    }
}

fn default_true() -> bool {
    true
}

fn resolve_config_path() -> InsightResult<PathBuf> {
    if let Ok(path) = std::env::var("UISIGHT_CONFIG") {
        let candidate = PathBuf::from(path);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found via UISIGHT_CONFIG");
            return Ok(candidate);
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(InsightError::Config(
        "config.toml not found via UISIGHT_CONFIG, next to executable or in working directory".into(),
    ))
}

/// Parse a config document and apply environment overrides.
pub fn parse_config(content: &str) -> InsightResult<AppConfig> {
    let mut config: AppConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(v) = std::env::var("UISIGHT_CACHE") {
        config.cache.enabled = matches!(v.trim(), "1" | "true" | "TRUE" | "yes");
    }
    if let Ok(dir) = std::env::var("UISIGHT_CACHE_DIR") {
        config.cache.dir = Some(PathBuf::from(dir));
    }
    if let Ok(lang) = std::env::var("UISIGHT_PREFERRED_LANGUAGE") {
        if !lang.trim().is_empty() {
            config.insight.preferred_language = lang.trim().to_string();
        }
    }
}

pub fn load_config() -> InsightResult<AppConfig> {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(
        path = %path.display(),
        provider = %config.llm.active_provider,
        cache = config.cache.enabled,
        "config loaded"
    );
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> InsightResult<()> {
    let path = resolve_config_path()?;
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[llm]
active_provider = "qwen"

[llm.providers.qwen]
display_name = "Qwen VL"
api_base = "https://dashscope.example.com/v1/chat/completions"
model = "qwen-vl-max"
vision = true
coordinates = "normalized1000"
api_key = "sk-test"

[llm.roles.classify]
provider = "qwen"
model = "qwen-turbo"
temperature = 0.0

[insight]
truncate_text_length = 100
filter_non_text_content = true
"#;

    #[test]
    fn parses_sample_config_with_defaults() {
        let cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        let qwen = &cfg.llm.providers["qwen"];
        assert!(qwen.vision);
        assert_eq!(qwen.coordinates, CoordinateSystem::Normalized1000);
        assert_eq!(qwen.temperature, 0.1);
        assert_eq!(cfg.llm.roles.classify.as_ref().unwrap().model, "qwen-turbo");
        assert!(cfg.insight.vision_mode);
        assert_eq!(cfg.insight.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cfg.insight.truncate_text_length, Some(100));
        assert!(!cfg.cache.enabled);
    }

    #[test]
    fn explicit_cache_dir_wins() {
        let cache = CacheConfig {
            enabled: true,
            dir: Some(PathBuf::from("/tmp/somewhere")),
        };
        assert_eq!(cache.resolved_dir(), PathBuf::from("/tmp/somewhere"));
        let default_dir = CacheConfig::default().resolved_dir();
        assert!(default_dir.ends_with("uisight/task-cache"));
    }
}
