//! Axum route handler for the Optimize API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::AppError;
use crate::optimizer::OptimizationResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub latex: String,
    pub job_description: String,
}

#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub optimized_latex: String,
    pub optimization_summary: String,
    pub success: bool,
}

impl From<OptimizationResult> for OptimizeResponse {
    fn from(result: OptimizationResult) -> Self {
        Self {
            optimized_latex: result.final_document_text,
            optimization_summary: result.summary_text,
            success: result.success,
        }
    }
}

/// POST /api/optimize
///
/// Runs the convergence loop: draft → compile/fix → one-page/shrink.
/// Always 200 once validated; `success: false` carries the original LaTeX back.
pub async fn handle_optimize(
    State(state): State<AppState>,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, AppError> {
    if request.latex.trim().is_empty() {
        return Err(AppError::Validation("LaTeX content is required".to_string()));
    }
    if request.job_description.trim().is_empty() {
        return Err(AppError::Validation("Job description is required".to_string()));
    }

    // The loop runs on its own task; if the client goes away this handler future is
    // dropped, the guard fires and the loop stops at its next step.
    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();
    let _guard = cancel.drop_guard();

    let optimizer = state.optimizer.clone();
    let result = tokio::spawn(async move {
        optimizer
            .optimize(&request.latex, &request.job_description, &loop_cancel)
            .await
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Optimization task failed: {e}")))?;

    Ok(Json(result.into()))
}
