//! Axum route handlers for direct compilation and health.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::compiler::CompileOutcome;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CompileRequest {
    pub latex: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pdflatex_available: bool,
    pub message: &'static str,
}

/// GET /api/health
///
/// Reports liveness and whether the compiler binary can be run.
pub async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let pdflatex_available = state.compiler.probe().await.is_some();
    Json(HealthResponse {
        status: "healthy",
        pdflatex_available,
        message: "Resume Optimizer API is running",
    })
}

/// POST /api/compile
///
/// Compiles LaTeX and returns the PDF bytes as an attachment.
/// A compile failure is a 400 carrying the compiler's diagnostic.
pub async fn handle_compile(
    State(state): State<AppState>,
    Json(request): Json<CompileRequest>,
) -> Result<Response, AppError> {
    if request.latex.trim().is_empty() {
        return Err(AppError::Validation("LaTeX content is required".to_string()));
    }

    match state.compiler.compile(&request.latex).await {
        CompileOutcome::Success { pdf, page_count } => {
            info!(
                "COMPILE RESULT — {page_count} page(s), {:.1} KB",
                pdf.len() as f64 / 1024.0
            );
            if page_count > 1 {
                warn!("PDF is {page_count} pages (expected 1)");
            }
            Ok((
                [
                    (header::CONTENT_TYPE, "application/pdf"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=resume.pdf",
                    ),
                ],
                pdf,
            )
                .into_response())
        }
        CompileOutcome::Failure { excerpt, .. } => Err(AppError::Compile(excerpt)),
    }
}
