use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use railops_types::{Department, ProfileType};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::google::UploadPlan;
use crate::models::{
    CompleteProfileRequest, ConvertProfileRequest, CreateProfileRequest, PendingCase,
    PendingStatus, Profile, ProfileDetails, ProfileQuery, UpdateProfileRequest,
};
use crate::pending::PendingCaseOverview;
use crate::render;
use crate::state::AppState;
use crate::store::{EmployeeStore, ProfileFilter, ProfileStore};

#[derive(Debug, serde::Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ProfileDetails>,
}

/// POST /api/profiles
pub async fn create_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateProfileRequest>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    let profile = state.profiles.create(&user, request).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// GET /api/profiles
pub async fn list_profiles(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<Vec<Profile>>, ApiError> {
    let department = match user.readable_departments() {
        Some(own) => {
            if let Some(requested) = query.department {
                user.ensure_can_read(requested)?;
            }
            Some(own)
        }
        None => query.department,
    };
    let profiles = state
        .store
        .list_profiles(&ProfileFilter {
            department,
            status: query.status,
            profile_type: query.profile_type,
            employee_code: query.employee_code,
        })
        .await?;
    Ok(Json(profiles))
}

/// GET /api/profiles/:id
pub async fn get_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile = state
        .store
        .get_profile(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("profile {id}")))?;
    user.ensure_can_read(profile.department)?;
    let details = state.profiles.details(id).await?;
    Ok(Json(ProfileResponse { profile, details }))
}

/// PATCH /api/profiles/:id
pub async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(state.profiles.update(&user, id, patch).await?))
}

/// POST /api/profiles/:id/convert
pub async fn convert_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ConvertProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(state.profiles.convert(&user, id, request).await?))
}

/// POST /api/profiles/:id/generate-document — rate limited per actor.
/// Idempotent; rendering never transitions state.
pub async fn generate_document(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if state.limits.document_generation.check_key(&user.id).is_err() {
        return Err(ApiError::RateLimited {
            retry_after_seconds: 60,
        });
    }

    let profile = state
        .store
        .get_profile(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("profile {id}")))?;
    user.ensure_can_read(profile.department)?;
    if profile.profile_type == ProfileType::Basic {
        return Err(ApiError::Conflict(
            "basic profiles have no document form".to_string(),
        ));
    }
    let details = state
        .profiles
        .details(id)
        .await?
        .ok_or_else(|| ApiError::Conflict(format!("profile {id} has no sub-form")))?;
    let employee_name = state
        .store
        .get_employee(&profile.employee_code)
        .await?
        .map(|e| e.name)
        .unwrap_or_default();

    let document = render::render_document(&profile, &details, &employee_name)?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                    .to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.file_name),
            ),
        ],
        document.bytes,
    ))
}

/// GET /api/profiles/:id/upload-plan — consumed by the desktop helper
/// before it performs the actual Drive upload.
pub async fn upload_plan(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UploadPlan>, ApiError> {
    let profile = state
        .store
        .get_profile(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("profile {id}")))?;
    user.ensure_can_read(profile.department)?;
    Ok(Json(state.drive.prepare_upload(id).await?))
}

/// POST /api/profiles/:id/complete — the completion handshake: the helper
/// reports the Drive link after a successful upload.
pub async fn complete_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CompleteProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(state.profiles.mark_complete(&user, id, request).await?))
}

/// POST /api/profiles/:id/reset — admin-only regression to Basic.
pub async fn reset_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(state.profiles.admin_reset(&user, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PendingCaseQuery {
    #[serde(default)]
    pub department: Option<Department>,
    #[serde(default)]
    pub profile_type: Option<ProfileType>,
    #[serde(default)]
    pub status: Option<PendingStatus>,
}

/// GET /api/pending-cases
pub async fn list_pending_cases(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<PendingCaseQuery>,
) -> Result<Json<Vec<PendingCase>>, ApiError> {
    let department = match user.readable_departments() {
        Some(own) => Some(own),
        None => query.department,
    };
    Ok(Json(
        state
            .pending
            .list(department, query.profile_type, query.status)
            .await?,
    ))
}

/// GET /api/pending-cases/stats
pub async fn pending_case_stats(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<PendingCaseQuery>,
) -> Result<Json<PendingCaseOverview>, ApiError> {
    let department = match user.readable_departments() {
        Some(own) => Some(own),
        None => query.department,
    };
    Ok(Json(state.pending.overview(department).await?))
}
