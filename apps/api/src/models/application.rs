use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A tracked job application: one row per (user, posting).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company: String,
    pub role_title: String,
    pub job_description: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// An uploaded document (resume/cover letter), stored as extracted text.
/// Binary originals and PDF rendering live outside this service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub content_text: String,
    pub created_at: DateTime<Utc>,
}
