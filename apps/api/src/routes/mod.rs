pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::analysis::handlers as analysis_handlers;
use crate::applications;
use crate::errors::AppError;
use crate::state::AppState;

async fn not_implemented() -> Result<(), AppError> {
    Err(AppError::NotImplemented)
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Applications
        .route(
            "/api/v1/applications",
            post(applications::handle_create_application)
                .get(applications::handle_list_applications),
        )
        .route(
            "/api/v1/applications/:id",
            get(applications::handle_get_application).patch(not_implemented),
        )
        // Documents
        .route("/api/v1/documents", post(applications::handle_create_document))
        .route("/api/v1/documents/:id", get(applications::handle_get_document))
        // Fit analysis (streaming)
        .route(
            "/api/v1/applications/:id/analyze/:document_id",
            post(analysis_handlers::handle_analyze),
        )
        .route(
            "/api/v1/applications/:id/analysis/:document_id",
            get(analysis_handlers::handle_get_analysis),
        )
        .with_state(state)
}
