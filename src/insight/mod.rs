//! The insight engine: locate, assert, extract, describe and classify
//! against a `UIContext`.
//!
//! `Insight` is cheap to clone and holds no per-call state; independent
//! requests may run concurrently on clones of the same engine.
pub mod locate;
pub mod normalize;
pub mod order;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{RecordKind, TaskCache, TaskSignature};
use crate::config::{AppConfig, InsightConfig};
use crate::errors::{InsightError, InsightResult};
use crate::llm::invoker::ModelInvoker;
use crate::llm::registry::{ModelRole, ProviderRegistry};
use crate::perception::description::{describe_context, DescribeOptions};
use crate::perception::marker::mark_region;
use crate::perception::types::{
    AssertionResult, BBox, DescribeResult, ExtractionResult, LocateRequest, LocateResult,
    SectionResult, UIContext,
};
use crate::prompts::extraction::DataQuery;
use crate::prompts::{self, PromptOptions, PromptSubject};

use self::normalize::{normalize_describe, normalize_extraction, parse_assertion};

/// What a prompt is evaluated against: the screenshot, or the page as text.
pub(crate) enum PageView<'a> {
    Screenshot(&'a UIContext),
    Text(String),
}

impl<'a> PageView<'a> {
    pub(crate) fn new(ctx: &'a UIContext, vision: bool, opts: &DescribeOptions) -> Self {
        if vision {
            PageView::Screenshot(ctx)
        } else {
            PageView::Text(describe_context(ctx, opts).description)
        }
    }

    pub(crate) fn subject(&self) -> PromptSubject<'_> {
        match self {
            PageView::Screenshot(ctx) => PromptSubject::Image {
                base64: &ctx.screenshot_base64,
                size: ctx.size,
            },
            PageView::Text(text) => PromptSubject::Description(text),
        }
    }
}

#[derive(Clone)]
pub struct Insight {
    locator: ModelInvoker,
    analyst: ModelInvoker,
    classifier: ModelInvoker,
    config: InsightConfig,
    cache: Option<TaskCache>,
    task: Option<TaskSignature>,
}

impl Insight {
    /// Build the engine from a loaded config. Provider and key problems
    /// surface here, not on the first call.
    pub fn from_config(config: &AppConfig) -> InsightResult<Self> {
        let registry = ProviderRegistry::from_config(config)?;
        Ok(Self::new(&registry, config.insight.clone())?.with_cache(TaskCache::from_config(&config.cache)))
    }

    pub fn new(registry: &ProviderRegistry, config: InsightConfig) -> InsightResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let engine = Self {
            locator: registry.invoker_for(ModelRole::Locate, timeout)?,
            analyst: registry.invoker_for(ModelRole::Insight, timeout)?,
            classifier: registry.invoker_for(ModelRole::Classify, timeout)?,
            config,
            cache: None,
            task: None,
        };
        tracing::info!(
            locate_model = engine.locator.model(),
            insight_model = engine.analyst.model(),
            classify_model = engine.classifier.model(),
            vision_mode = engine.config.vision_mode,
            timeout_secs = engine.config.timeout_secs,
            "insight engine ready"
        );
        Ok(engine)
    }

    pub fn with_cache(mut self, cache: TaskCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Scope subsequent calls to one task of one script, enabling cache replay.
    pub fn with_task(mut self, task_file: impl Into<String>, task_title: impl Into<String>) -> Self {
        self.task = Some(TaskSignature::new(task_file, task_title));
        self
    }

    pub fn config(&self) -> &InsightConfig {
        &self.config
    }

    fn prompt_options(&self, invoker: &ModelInvoker) -> PromptOptions {
        PromptOptions::new(
            self.config.vision_mode && invoker.supports_vision(),
            self.config.preferred_language.clone(),
        )
    }

    fn describe_options(&self) -> DescribeOptions {
        DescribeOptions {
            truncate_text_length: self.config.truncate_text_length,
            filter_non_text_content: self.config.filter_non_text_content,
        }
    }

    fn cache_slot(&self) -> Option<(&TaskCache, &TaskSignature)> {
        match (&self.cache, &self.task) {
            (Some(cache), Some(task)) if cache.is_enabled() => Some((cache, task)),
            _ => None,
        }
    }

    fn cached<T: DeserializeOwned>(&self, kind: RecordKind, prompt: &str) -> Option<T> {
        let (cache, task) = self.cache_slot()?;
        let value = cache.lookup(task, kind, prompt)?;
        match serde_json::from_value(value) {
            Ok(hit) => {
                tracing::info!(task = %task.task_title, ?kind, prompt, "cache hit");
                Some(hit)
            }
            Err(e) => {
                tracing::warn!(?kind, prompt, error = %e, "cached record unreadable, ignoring");
                None
            }
        }
    }

    fn remember<T: Serialize>(&self, kind: RecordKind, prompt: &str, result: &T) {
        let Some((cache, task)) = self.cache_slot() else {
            return;
        };
        let stored = serde_json::to_value(result)
            .map_err(InsightError::from)
            .and_then(|v| cache.store(task, kind, prompt, v));
        if let Err(e) = stored {
            tracing::warn!(?kind, prompt, error = %e, "failed to write cache record");
        }
    }

    /// Locate the element(s) matching `req`. Successful results are cached
    /// per task when the cache is enabled.
    pub async fn locate(&self, ctx: &UIContext, req: &LocateRequest) -> InsightResult<LocateResult> {
        let key = locate_cache_key(req);
        if let Some(hit) = self.cached::<LocateResult>(RecordKind::Locate, &key) {
            return Ok(hit);
        }
        let result = locate::locate(
            &self.locator,
            ctx,
            req,
            &self.prompt_options(&self.locator),
            &self.describe_options(),
        )
        .await?;
        if result.error.is_none() {
            // The section crop is only useful to the live caller; replays keep the rect.
            let stored = LocateResult {
                image_base64: None,
                ..result.clone()
            };
            self.remember(RecordKind::Locate, &key, &stored);
        }
        Ok(result)
    }

    /// Find and crop the region described by `section`. Needs a vision model.
    pub async fn locate_section(&self, ctx: &UIContext, section: &str) -> InsightResult<SectionResult> {
        let opts = self.prompt_options(&self.locator);
        if !opts.vision {
            return Err(InsightError::Config(
                "section location needs vision_mode and a vision-capable locate model".into(),
            ));
        }
        let (result, _) = locate::locate_section(&self.locator, ctx, section, &opts).await?;
        Ok(result)
    }

    /// Judge `assertion` against the current UI. Never cached.
    pub async fn assert(&self, ctx: &UIContext, assertion: &str) -> InsightResult<AssertionResult> {
        let opts = self.prompt_options(&self.analyst);
        let page = PageView::new(ctx, opts.vision, &self.describe_options());
        let prompt = prompts::assertion::assertion(&page.subject(), assertion, &opts);
        let value = self.analyst.invoke(prompt.messages, &prompt.contract).await?;
        let result = parse_assertion(value)?;
        tracing::info!(assertion, pass = result.pass, "assertion judged");
        Ok(result)
    }

    pub async fn extract(&self, ctx: &UIContext, query: &DataQuery) -> InsightResult<ExtractionResult> {
        let key = query.render();
        if let Some(hit) = self.cached::<ExtractionResult>(RecordKind::Extract, &key) {
            return Ok(hit);
        }
        let opts = self.prompt_options(&self.analyst);
        let page = PageView::new(ctx, opts.vision, &self.describe_options());
        let prompt = prompts::extraction::extract_data(&page.subject(), query, &opts);
        let result = match self.analyst.invoke(prompt.messages, &prompt.contract).await {
            Ok(value) => normalize_extraction(value),
            Err(InsightError::ResponseParse(msg)) => ExtractionResult { data: None, error: Some(msg) },
            Err(e) => return Err(e),
        };
        tracing::info!(has_data = result.data.is_some(), error = result.error.as_deref().unwrap_or(""), "extraction finished");
        if result.error.is_none() {
            self.remember(RecordKind::Extract, &key, &result);
        }
        Ok(result)
    }

    /// Describe the element at `target` so it can be located again later.
    pub async fn describe(&self, ctx: &UIContext, target: BBox) -> InsightResult<DescribeResult> {
        let opts = self.prompt_options(&self.analyst);
        let marked;
        let page;
        let subject = if opts.vision {
            marked = mark_region(&ctx.screenshot_bytes()?, &target)?;
            PromptSubject::Image {
                base64: &marked,
                size: ctx.size,
            }
        } else {
            page = PageView::new(ctx, false, &self.describe_options());
            page.subject()
        };
        let prompt = prompts::describe::describe_element(&subject, &target, &opts);
        let result = match self.analyst.invoke(prompt.messages, &prompt.contract).await {
            Ok(value) => normalize_describe(value),
            Err(InsightError::ResponseParse(msg)) => DescribeResult {
                description: String::new(),
                error: Some(msg),
            },
            Err(e) => return Err(e),
        };
        tracing::debug!(?target, description = %result.description, "element described");
        Ok(result)
    }

    /// Whether `description` selects its element by order or position. Never cached.
    pub async fn is_order_sensitive(&self, description: &str) -> InsightResult<bool> {
        order::classify(&self.classifier, description).await
    }
}

fn locate_cache_key(req: &LocateRequest) -> String {
    let mut key = req.description.clone();
    if let Some(area) = &req.search_area {
        key.push_str(&format!(" @ {area}"));
    }
    if req.deep_think {
        key.push_str(" [deep]");
    }
    if req.multi {
        key.push_str(" [multi]");
    }
    key
}
