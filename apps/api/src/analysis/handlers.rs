use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::analysis::prompts::build_fit_prompt;
use crate::analysis::store::CacheKey;
use crate::analysis::stream::run_analysis;
use crate::errors::AppError;
use crate::models::analysis::FitAnalysisRow;
use crate::models::application::{ApplicationRow, DocumentRow};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AnalyzeQuery {
    pub user_id: Uuid,
    /// Bypass the dedupe gate and force a fresh model call.
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

/// POST /api/v1/applications/:id/analyze/:document_id
///
/// Streams progress frames over SSE and ends with a terminal frame. The
/// controller runs in its own task: if the client disconnects, the
/// receiver drops and the controller keeps accumulating and persists the
/// result anyway.
pub async fn handle_analyze(
    State(state): State<AppState>,
    Path((application_id, document_id)): Path<(Uuid, Uuid)>,
    Query(params): Query<AnalyzeQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let application: Option<ApplicationRow> =
        sqlx::query_as("SELECT * FROM applications WHERE id = $1 AND user_id = $2")
            .bind(application_id)
            .bind(params.user_id)
            .fetch_optional(&state.db)
            .await?;
    let application = application
        .ok_or_else(|| AppError::NotFound(format!("Application {application_id} not found")))?;

    let document: Option<DocumentRow> =
        sqlx::query_as("SELECT * FROM documents WHERE id = $1 AND user_id = $2")
            .bind(document_id)
            .bind(params.user_id)
            .fetch_optional(&state.db)
            .await?;
    let document =
        document.ok_or_else(|| AppError::NotFound(format!("Document {document_id} not found")))?;

    let prompt = build_fit_prompt(&application, &document);
    let key = CacheKey {
        application_id,
        document_id,
        user_id: params.user_id,
    };

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(run_analysis(
        state.provider.clone(),
        state.store.clone(),
        state.config.analysis,
        key,
        prompt,
        params.force,
        tx,
    ));

    let stream = ReceiverStream::new(rx).map(|frame| Event::default().json_data(&frame));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// GET /api/v1/applications/:id/analysis/:document_id
/// Returns the most recently created persisted analysis for the key.
pub async fn handle_get_analysis(
    State(state): State<AppState>,
    Path((application_id, document_id)): Path<(Uuid, Uuid)>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<FitAnalysisRow>, AppError> {
    let key = CacheKey {
        application_id,
        document_id,
        user_id: params.user_id,
    };
    let row = state
        .store
        .find_latest(&key)
        .await?
        .ok_or_else(|| AppError::NotFound("No analysis for this application".to_string()))?;
    Ok(Json(row))
}
