use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use railops_types::Department;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::sync::{SyncKind, SyncTask, SyncTaskRef};

#[derive(Debug, Deserialize)]
pub struct SyncStartRequest {
    pub kind: SyncKind,
    /// Omitted means every department the caller may write.
    #[serde(default)]
    pub department: Option<Department>,
    pub year: i32,
    pub month: u32,
}

/// POST /api/sync/start — submission returns immediately; progress is
/// polled through the status endpoint.
pub async fn start_sync(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<SyncStartRequest>,
) -> Result<(StatusCode, Json<Vec<SyncTaskRef>>), ApiError> {
    let departments = match request.department {
        Some(department) => {
            user.ensure_can_write(department)?;
            vec![department]
        }
        None => {
            let departments: Vec<Department> = Department::ALL
                .into_iter()
                .filter(|d| user.can_write(*d))
                .collect();
            if departments.is_empty() {
                return Err(ApiError::Forbidden(
                    "no department available for sync".to_string(),
                ));
            }
            departments
        }
    };

    let refs = state.sync.start_sync(
        request.kind,
        departments,
        request.year,
        request.month,
        &user.username,
    )?;
    Ok((StatusCode::ACCEPTED, Json(refs)))
}

/// GET /api/sync/status/:task_id
pub async fn sync_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<SyncTask>, ApiError> {
    let task = state
        .sync
        .status(task_id)
        .ok_or_else(|| ApiError::NotFound(format!("sync task {task_id}")))?;
    user.ensure_can_read(task.department)?;
    Ok(Json(task))
}

/// POST /api/sync/cancel/:task_id
pub async fn cancel_sync(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let task = state
        .sync
        .status(task_id)
        .ok_or_else(|| ApiError::NotFound(format!("sync task {task_id}")))?;
    user.ensure_can_write(task.department)?;
    state.sync.cancel(task_id);
    Ok(StatusCode::ACCEPTED)
}
