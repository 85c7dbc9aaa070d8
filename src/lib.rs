pub mod cache;
pub mod config;
pub mod errors;
pub mod insight;
pub mod llm;
pub mod perception;
pub mod prompts;

pub use config::{load_config, AppConfig};
pub use errors::{InsightError, InsightResult};
pub use insight::Insight;
pub use perception::types::{
    AssertionResult, BBox, ContentNode, DescribeResult, ExtractionResult, LocateRequest,
    LocateResult, LocatedElement, Rect, SectionResult, Size, UIContext,
};
pub use prompts::extraction::DataQuery;

/// Install the global `tracing` subscriber.
///
/// Honours `RUST_LOG`; defaults to `info`. Safe to call more than once, later
/// calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Load `config.toml` and build an engine from it.
pub fn bootstrap() -> InsightResult<Insight> {
    let config = load_config()?;
    Insight::from_config(&config)
}
