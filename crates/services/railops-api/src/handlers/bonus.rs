use axum::extract::State;
use axum::Json;

use crate::auth::CurrentUser;
use crate::bonus::BonusReport;
use crate::error::ApiError;
use crate::models::{BonusProcessRequest, RewardProcessRequest};
use crate::rewards::RewardReport;
use crate::state::AppState;

/// POST /api/attendance-bonus/process
pub async fn process_attendance_bonus(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<BonusProcessRequest>,
) -> Result<Json<BonusReport>, ApiError> {
    user.ensure_can_write(request.department)?;
    let report = state
        .bonus
        .process(request.department, request.year, request.month, request.dry_run)
        .await?;
    Ok(Json(report))
}

/// POST /api/monthly-rewards/process
pub async fn process_monthly_rewards(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<RewardProcessRequest>,
) -> Result<Json<RewardReport>, ApiError> {
    user.ensure_can_write(request.department)?;
    let report = state
        .rewards
        .process(request.department, request.year, request.month)
        .await?;
    Ok(Json(report))
}
