//! Admin-only diagnostics.

use axum::{Json, extract::State};

use super::dto::StorageInfoResponse;
use super::error::ApiErrorResponse;
use super::handlers::AppState;

/// Reports where the task collection lives and how many tasks it holds.
///
/// Reached only through [`require_admin`](super::auth::require_admin).
///
/// # Errors
///
/// Returns 500 if the task file cannot be read.
pub async fn storage_info(
    State(state): State<AppState>,
) -> Result<Json<StorageInfoResponse>, ApiErrorResponse> {
    let tasks = state.task_repository.read_all().await?;

    Ok(Json(StorageInfoResponse {
        location: state.task_repository.locate(),
        task_count: tasks.len(),
    }))
}
