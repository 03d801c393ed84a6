//! CRUD shell for applications and documents. Thin by design — the
//! interesting machinery lives in `analysis`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::{ApplicationRow, DocumentRow};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct CreateApplicationRequest {
    pub user_id: Uuid,
    pub company: String,
    pub role_title: String,
    pub job_description: String,
}

/// POST /api/v1/applications
pub async fn handle_create_application(
    State(state): State<AppState>,
    Json(req): Json<CreateApplicationRequest>,
) -> Result<(StatusCode, Json<ApplicationRow>), AppError> {
    if req.company.trim().is_empty() || req.role_title.trim().is_empty() {
        return Err(AppError::Validation(
            "company and role_title are required".to_string(),
        ));
    }

    let row: ApplicationRow = sqlx::query_as(
        r#"
        INSERT INTO applications (user_id, company, role_title, job_description, status)
        VALUES ($1, $2, $3, $4, 'saved')
        RETURNING *
        "#,
    )
    .bind(req.user_id)
    .bind(req.company.trim())
    .bind(req.role_title.trim())
    .bind(&req.job_description)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/applications
pub async fn handle_list_applications(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<ApplicationRow>>, AppError> {
    let rows: Vec<ApplicationRow> =
        sqlx::query_as("SELECT * FROM applications WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(params.user_id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(rows))
}

/// GET /api/v1/applications/:id
pub async fn handle_get_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ApplicationRow>, AppError> {
    let row: Option<ApplicationRow> =
        sqlx::query_as("SELECT * FROM applications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(params.user_id)
            .fetch_optional(&state.db)
            .await?;
    row.map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Application {id} not found")))
}

#[derive(Deserialize)]
pub struct CreateDocumentRequest {
    pub user_id: Uuid,
    pub filename: String,
    /// Pre-extracted text. Binary upload and PDF extraction are handled
    /// by a separate ingestion service.
    pub content_text: String,
}

/// POST /api/v1/documents
pub async fn handle_create_document(
    State(state): State<AppState>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentRow>), AppError> {
    if req.content_text.trim().is_empty() {
        return Err(AppError::Validation("content_text is required".to_string()));
    }

    let row: DocumentRow = sqlx::query_as(
        r#"
        INSERT INTO documents (user_id, filename, content_text)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(req.user_id)
    .bind(req.filename.trim())
    .bind(&req.content_text)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/documents/:id
pub async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<DocumentRow>, AppError> {
    let row: Option<DocumentRow> =
        sqlx::query_as("SELECT * FROM documents WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(params.user_id)
            .fetch_optional(&state.db)
            .await?;
    row.map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Document {id} not found")))
}
