use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use railops_helper_protocol::SettingValueResponse;
use railops_types::Department;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::{Setting, SettingUpsertRequest};
use crate::state::AppState;
use crate::store::SettingsStore;

#[derive(Debug, Deserialize)]
pub struct SettingQuery {
    pub department: Department,
}

/// GET /api/settings/value/:key — CRITICAL: consumed by the desktop helper;
/// the response shape is frozen in `railops-helper-protocol`.
pub async fn get_setting_value(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(key): Path<String>,
    Query(query): Query<SettingQuery>,
) -> Result<Json<SettingValueResponse>, ApiError> {
    user.ensure_can_read(query.department)?;
    let setting = state
        .store
        .get_setting(query.department, &key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("setting {key}")))?;
    Ok(Json(SettingValueResponse {
        key: setting.key,
        department: setting.department.to_string(),
        value: setting.value,
    }))
}

/// GET /api/settings
pub async fn list_settings(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<SettingQuery>,
) -> Result<Json<Vec<Setting>>, ApiError> {
    user.ensure_can_read(query.department)?;
    Ok(Json(state.store.list_settings(query.department).await?))
}

/// PUT /api/settings
pub async fn upsert_setting(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<SettingUpsertRequest>,
) -> Result<Json<Setting>, ApiError> {
    user.ensure_can_write(request.department)?;
    if request.key.trim().is_empty() {
        return Err(ApiError::validation("setting key must not be empty"));
    }
    let setting = Setting {
        department: request.department,
        key: request.key.trim().to_string(),
        value: request.value,
        updated_at: Utc::now(),
    };
    state.store.upsert_setting(setting.clone()).await?;
    Ok(Json(setting))
}
