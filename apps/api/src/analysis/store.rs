//! Persistence seam for fit analyses.
//!
//! `AppState` holds an `Arc<dyn AnalysisStore>`; the controller and the
//! dedupe gate only ever see the trait. Tests swap in an in-memory store.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::analysis::{AnalysisRecord, FitAnalysisRow};

/// Logical address of one analysis result. Reads resolve to the most
/// recently created row for the key; duplicate rows per key are possible
/// and are not pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub application_id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn save(
        &self,
        key: &CacheKey,
        record: &AnalysisRecord,
        strategy: &str,
    ) -> Result<Uuid, AppError>;

    async fn find_latest(&self, key: &CacheKey) -> Result<Option<FitAnalysisRow>, AppError>;
}

pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn save(
        &self,
        key: &CacheKey,
        record: &AnalysisRecord,
        strategy: &str,
    ) -> Result<Uuid, AppError> {
        // Insert-only: no uniqueness per key, reads take the newest row.
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO fit_analyses
                (application_id, document_id, user_id, score, recommendation, body, strategy)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(key.application_id)
        .bind(key.document_id)
        .bind(key.user_id)
        .bind(record.score)
        .bind(record.recommendation.as_str())
        .bind(&record.body)
        .bind(strategy)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_latest(&self, key: &CacheKey) -> Result<Option<FitAnalysisRow>, AppError> {
        let row = sqlx::query_as::<_, FitAnalysisRow>(
            r#"
            SELECT * FROM fit_analyses
            WHERE application_id = $1 AND document_id = $2 AND user_id = $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(key.application_id)
        .bind(key.document_id)
        .bind(key.user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{Duration, Utc};
    use tokio::sync::Mutex;

    use super::*;

    /// In-memory stand-in with the same most-recent-wins read semantics.
    #[derive(Default)]
    pub struct MemoryStore {
        rows: Mutex<Vec<FitAnalysisRow>>,
    }

    impl MemoryStore {
        pub async fn rows(&self) -> Vec<FitAnalysisRow> {
            self.rows.lock().await.clone()
        }
    }

    #[async_trait]
    impl AnalysisStore for MemoryStore {
        async fn save(
            &self,
            key: &CacheKey,
            record: &AnalysisRecord,
            strategy: &str,
        ) -> Result<Uuid, AppError> {
            let mut rows = self.rows.lock().await;
            let id = Uuid::new_v4();
            // Spread timestamps so ordering is deterministic in tests.
            let created_at = Utc::now() + Duration::milliseconds(rows.len() as i64);
            rows.push(FitAnalysisRow {
                id,
                application_id: key.application_id,
                document_id: key.document_id,
                user_id: key.user_id,
                score: record.score,
                recommendation: record.recommendation.as_str().to_string(),
                body: record.body.clone(),
                strategy: strategy.to_string(),
                created_at,
            });
            Ok(id)
        }

        async fn find_latest(&self, key: &CacheKey) -> Result<Option<FitAnalysisRow>, AppError> {
            let rows = self.rows.lock().await;
            Ok(rows
                .iter()
                .filter(|r| {
                    r.application_id == key.application_id
                        && r.document_id == key.document_id
                        && r.user_id == key.user_id
                })
                .max_by_key(|r| r.created_at)
                .cloned())
        }
    }
}
