//! Streaming delivery controller.
//!
//! One session per analyze call: fragments arrive from the model, get
//! appended to the accumulated text, and are relayed to the caller as
//! progress frames. Delivery is fire-and-forget — a disconnected caller
//! stops delivery but never stops accumulation or persistence. When the
//! fragment stream ends (normally or not), the extractor runs over
//! whatever text exists, the result is persisted, and a terminal frame is
//! emitted.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::analysis::extract::extract_analysis;
use crate::analysis::normalize::recommendation_for_score;
use crate::analysis::prompts::FIT_ANALYSIS_SYSTEM;
use crate::analysis::store::{AnalysisStore, CacheKey};
use crate::analysis::AnalysisSettings;
use crate::llm_client::{Fragment, LlmError, ModelProvider};
use crate::models::analysis::{FitAnalysisRow, Recommendation};

/// Soft estimate of a full response, used only to shape the progress bar.
/// Progress is capped at 95 until the terminal frame.
const EXPECTED_RESPONSE_CHARS: usize = 2400;

/// Wire frames delivered to the caller. Field names are the external
/// contract, hence camelCase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeliveryFrame {
    #[serde(rename_all = "camelCase")]
    Chunk {
        content: String,
        full_content: String,
        progress: u8,
        done: bool,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        done: bool,
        record_id: Uuid,
        score: i32,
        recommendation: Recommendation,
        strategy: String,
        cached: bool,
    },
    #[serde(rename_all = "camelCase")]
    Failed { done: bool, error: String },
}

impl DeliveryFrame {
    fn completed_from_row(row: &FitAnalysisRow, cached: bool) -> Self {
        let recommendation = Recommendation::from_token(&row.recommendation)
            .unwrap_or_else(|| recommendation_for_score(row.score));
        DeliveryFrame::Completed {
            done: true,
            record_id: row.id,
            score: row.score,
            recommendation,
            strategy: row.strategy.clone(),
            cached,
        }
    }
}

/// Session lifecycle. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Streaming,
    Finalizing,
    Delivered,
    DisconnectedButPersisted,
    Closed,
}

struct StreamSession {
    accumulated: String,
    client_connected: bool,
    phase: Phase,
    tx: mpsc::Sender<DeliveryFrame>,
}

impl StreamSession {
    fn new(tx: mpsc::Sender<DeliveryFrame>) -> Self {
        Self {
            accumulated: String::new(),
            client_connected: true,
            phase: Phase::Idle,
            tx,
        }
    }

    fn advance(&mut self, to: Phase) {
        debug!(from = ?self.phase, to = ?to, "session transition");
        self.phase = to;
    }

    /// Appends a fragment and relays a progress frame. The append happens
    /// unconditionally; delivery is attempted only while the caller is
    /// still connected and never blocks accumulation on failure.
    async fn push_fragment(&mut self, text: &str) {
        self.accumulated.push_str(text);
        let frame = DeliveryFrame::Chunk {
            content: text.to_string(),
            full_content: self.accumulated.clone(),
            progress: progress_for(self.accumulated.len()),
            done: false,
        };
        self.deliver(frame).await;
    }

    async fn deliver(&mut self, frame: DeliveryFrame) {
        if !self.client_connected {
            return;
        }
        if self.tx.send(frame).await.is_err() {
            debug!("caller disconnected; continuing without delivery");
            self.client_connected = false;
        }
    }
}

fn progress_for(len: usize) -> u8 {
    ((len * 100) / EXPECTED_RESPONSE_CHARS).min(95) as u8
}

/// Runs one full analyze call: dedupe gate, model call, fragment relay,
/// finalization. Spawned per request; the receiver side of `tx` feeds the
/// caller's SSE stream, and dropping it is how disconnection manifests.
pub async fn run_analysis(
    provider: Arc<dyn ModelProvider>,
    store: Arc<dyn AnalysisStore>,
    settings: AnalysisSettings,
    key: CacheKey,
    prompt: String,
    force_refresh: bool,
    tx: mpsc::Sender<DeliveryFrame>,
) {
    // Dedupe gate: an existing record for the key short-circuits the model
    // call entirely. A failed lookup is logged and treated as a miss.
    if !force_refresh {
        match store.find_latest(&key).await {
            Ok(Some(row)) => {
                debug!(record_id = %row.id, "dedupe hit; skipping model call");
                let _ = tx.send(DeliveryFrame::completed_from_row(&row, true)).await;
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("cache lookup failed, proceeding with fresh call: {e}"),
        }
    }

    let mut session = StreamSession::new(tx);

    let mut fragments = match open_fragment_stream(provider.as_ref(), settings, &prompt).await {
        Ok(rx) => rx,
        Err(e) => {
            // The call failed before producing anything. Finalize with the
            // empty accumulation instead of propagating.
            warn!("model call failed to start: {e}");
            finalize(&mut session, store.as_ref(), &key, settings).await;
            return;
        }
    };

    // Streaming: an overall deadline guards against a hung model call.
    session.advance(Phase::Streaming);
    let deadline = tokio::time::Instant::now() + settings.model_call_timeout;
    loop {
        match tokio::time::timeout_at(deadline, fragments.recv()).await {
            Ok(Some(Ok(text))) => session.push_fragment(&text).await,
            Ok(Some(Err(e))) => {
                warn!("model stream failed mid-flight: {e}");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    timeout_secs = settings.model_call_timeout.as_secs(),
                    "model call exceeded deadline; finalizing with partial text"
                );
                break;
            }
        }
    }

    finalize(&mut session, store.as_ref(), &key, settings).await;
}

/// Opens the fragment stream. When streaming is disabled the single-shot
/// call is wrapped as a one-fragment stream so the accumulation and
/// finalization paths stay uniform.
async fn open_fragment_stream(
    provider: &dyn ModelProvider,
    settings: AnalysisSettings,
    prompt: &str,
) -> Result<mpsc::Receiver<Fragment>, LlmError> {
    if settings.streaming {
        provider.stream(prompt, FIT_ANALYSIS_SYSTEM).await
    } else {
        let text = provider.complete(prompt, FIT_ANALYSIS_SYSTEM).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(Ok(text)).await;
        Ok(rx)
    }
}

/// Extraction, persistence, terminal frame. Persistence is not contingent
/// on delivery; a wholly failed extraction persists nothing (a near-empty
/// body would poison future dedupe lookups).
async fn finalize(
    session: &mut StreamSession,
    store: &dyn AnalysisStore,
    key: &CacheKey,
    settings: AnalysisSettings,
) {
    session.advance(Phase::Finalizing);
    debug!(chars = session.accumulated.len(), "finalizing session");

    match extract_analysis(&session.accumulated, settings.min_body_chars) {
        Ok((record, strategy)) => match store.save(key, &record, strategy).await {
            Ok(record_id) => {
                session
                    .deliver(DeliveryFrame::Completed {
                        done: true,
                        record_id,
                        score: record.score,
                        recommendation: record.recommendation,
                        strategy: strategy.to_string(),
                        cached: false,
                    })
                    .await;
                session.advance(if session.client_connected {
                    Phase::Delivered
                } else {
                    Phase::DisconnectedButPersisted
                });
            }
            Err(e) => {
                error!("failed to persist analysis: {e}");
                session
                    .deliver(DeliveryFrame::Failed {
                        done: true,
                        error: "failed to save analysis".to_string(),
                    })
                    .await;
            }
        },
        Err(e) => {
            warn!("extraction failed: {e}");
            session
                .deliver(DeliveryFrame::Failed {
                    done: true,
                    error: e.to_string(),
                })
                .await;
        }
    }

    session.advance(Phase::Closed);
}
