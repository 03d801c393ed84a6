use std::sync::Arc;

use sqlx::PgPool;

use crate::analysis::store::AnalysisStore;
use crate::config::Config;
use crate::llm_client::ModelProvider;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Pluggable model backend. Default: Anthropic. Swapping vendors means
    /// swapping this, not touching the pipeline.
    pub provider: Arc<dyn ModelProvider>,
    /// Persistence seam for analysis results (also the dedupe lookup path).
    pub store: Arc<dyn AnalysisStore>,
    pub config: Config,
}
