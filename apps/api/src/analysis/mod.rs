//! Fit analysis — the pipeline that turns unreliable model output into a
//! persisted `AnalysisRecord` while streaming partial progress to the caller.
//!
//! Layout:
//! - `extract`   — multi-strategy extraction tiers + scanning primitives
//! - `normalize` — score clamping, category derivation, body validation
//! - `store`     — cache key + persistence seam (trait + Postgres impl)
//! - `stream`    — streaming delivery controller and dedupe gate
//! - `handlers`  — HTTP surface (SSE analyze endpoint, latest-result read)

pub mod extract;
pub mod handlers;
pub mod normalize;
pub mod prompts;
pub mod store;
pub mod stream;

use std::time::Duration;

/// Pipeline tunables, loaded from the environment at startup.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisSettings {
    /// Extracted bodies shorter than this are treated as extraction
    /// failures, never as valid short answers.
    pub min_body_chars: usize,
    /// Overall deadline on the model call; expiry is an abnormal end and
    /// finalization runs with whatever text accumulated.
    pub model_call_timeout: Duration,
    /// When false, the single-shot model call is used and wrapped as a
    /// one-fragment stream.
    pub streaming: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            min_body_chars: 50,
            model_call_timeout: Duration::from_secs(300),
            streaming: true,
        }
    }
}
