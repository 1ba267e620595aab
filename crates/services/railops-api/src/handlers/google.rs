use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use railops_types::Department;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuthUrlQuery {
    pub department: Department,
}

/// GET /api/google/auth-url — begin the per-department OAuth grant.
pub async fn auth_url(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<AuthUrlQuery>,
) -> Result<Json<Value>, ApiError> {
    user.ensure_admin()?;
    let (auth_url, state_token) = state.oauth.begin_authorization(query.department);
    Ok(Json(json!({
        "auth_url": auth_url,
        "state": state_token,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub state: String,
    pub code: String,
}

/// GET /api/auth/google/callback — the provider redirect. Unauthenticated:
/// the single-use state token is the credential here.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<Value>, ApiError> {
    let department = state
        .oauth
        .finalize_authorization(&query.state, &query.code)
        .await?;
    Ok(Json(json!({
        "status": "authorized",
        "department": department,
    })))
}

#[derive(Debug, Deserialize)]
pub struct AccessTokenRequest {
    pub department: Department,
}

/// POST /api/google/get-access-token — hands a live access token to the
/// desktop helper for its Drive uploads.
pub async fn get_access_token(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<AccessTokenRequest>,
) -> Result<Json<Value>, ApiError> {
    user.ensure_can_write(request.department)?;
    let access_token = state.oauth.acquire_access_token(request.department).await?;
    Ok(Json(json!({
        "department": request.department,
        "access_token": access_token,
    })))
}

/// POST /api/google/revoke
pub async fn revoke(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<AccessTokenRequest>,
) -> Result<axum::http::StatusCode, ApiError> {
    user.ensure_admin()?;
    state.oauth.revoke(request.department).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
