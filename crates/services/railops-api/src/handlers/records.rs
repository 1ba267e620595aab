use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use railops_types::AssessmentStandard;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::{AssessmentRecord, CreateRecordRequest, FaultResponsibilityRequest, RecordQuery};
use crate::scoring::RecordDraft;
use crate::state::AppState;
use crate::store::{AssessmentStore, EmployeeStore, RecordFilter};

/// GET /api/assessment-standards
pub async fn list_standards(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<Vec<AssessmentStandard>>, ApiError> {
    Ok(Json(state.store.list_standards().await?))
}

/// POST /api/assessment-records
pub async fn create_record(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<AssessmentRecord>), ApiError> {
    let employee = state
        .store
        .get_employee(&request.employee_code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("employee {}", request.employee_code)))?;
    user.ensure_can_write(employee.department)?;

    let record = state
        .scoring
        .apply_record(RecordDraft {
            department: employee.department,
            employee_code: request.employee_code,
            standard_code: request.standard_code,
            event_date: request.event_date,
            checklist: request.checklist,
            profile_id: request.profile_id,
            idempotency_key: None,
            actor: user.username.clone(),
        })
        .await?;
    crate::metrics::RECORDS_SCORED.inc();
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/assessment-records
pub async fn list_records(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<RecordQuery>,
) -> Result<Json<Vec<AssessmentRecord>>, ApiError> {
    let department = match user.readable_departments() {
        Some(own) => {
            if let Some(requested) = query.department {
                user.ensure_can_read(requested)?;
            }
            Some(own)
        }
        None => query.department,
    };
    let records = state
        .store
        .list_records(&RecordFilter {
            department,
            employee_code: query.employee_code,
            year: query.year,
            month: query.month,
            include_deleted: query.include_deleted.unwrap_or(false),
        })
        .await?;
    Ok(Json(records))
}

/// GET /api/assessment-records/:id
pub async fn get_record(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AssessmentRecord>, ApiError> {
    let record = state
        .store
        .get_record(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("assessment record {id}")))?;
    user.ensure_can_read(record.department)?;
    Ok(Json(record))
}

/// DELETE /api/assessment-records/:id — soft delete, recomputes the rest of
/// the record's year cohort.
pub async fn delete_record(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let record = state
        .store
        .get_record(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("assessment record {id}")))?;
    user.ensure_can_write(record.department)?;
    state.scoring.delete_record(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/assessment-records/:id/fault-responsibility
pub async fn set_fault_responsibility(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<FaultResponsibilityRequest>,
) -> Result<Json<AssessmentRecord>, ApiError> {
    let record = state
        .store
        .get_record(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("assessment record {id}")))?;
    user.ensure_can_write(record.department)?;
    let updated = state.scoring.update_checklist(id, request.checklist).await?;
    Ok(Json(updated))
}
