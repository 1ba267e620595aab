use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::Json;

use railops_types::{EmployeeCode, Points};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::{DrivingStatsQuery, DrivingStatsResponse, EmployeeDrivingStats};
use crate::state::AppState;
use crate::store::{AssessmentStore, EmployeeFilter, EmployeeStore};

/// GET /api/driving/stats — per-employee monthly aggregates for the
/// department dashboard.
pub async fn driving_stats(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<DrivingStatsQuery>,
) -> Result<Json<DrivingStatsResponse>, ApiError> {
    user.ensure_can_read(query.department)?;

    let employees = state
        .store
        .list_employees(&EmployeeFilter {
            department: Some(query.department),
            include_resigned: true,
            ..EmployeeFilter::default()
        })
        .await?;
    let records = state
        .store
        .records_by_department_month(query.department, query.year, query.month)
        .await?;

    let mut by_employee: HashMap<&EmployeeCode, EmployeeDrivingStats> = employees
        .iter()
        .map(|e| {
            (
                &e.code,
                EmployeeDrivingStats {
                    employee_code: e.code.clone(),
                    name: e.name.clone(),
                    record_count: 0,
                    net_points: Points::ZERO,
                    deductions: 0,
                    rewards: 0,
                },
            )
        })
        .collect();

    let mut net_points = Points::ZERO;
    for record in &records {
        net_points += record.final_points;
        if let Some(stats) = by_employee.get_mut(&record.employee_code) {
            stats.record_count += 1;
            stats.net_points += record.final_points;
            if record.category.is_deduction() {
                stats.deductions += 1;
            } else {
                stats.rewards += 1;
            }
        }
    }

    let mut rows: Vec<EmployeeDrivingStats> = by_employee.into_values().collect();
    rows.sort_by(|a, b| a.employee_code.as_str().cmp(b.employee_code.as_str()));

    Ok(Json(DrivingStatsResponse {
        department: query.department,
        year: query.year,
        month: query.month,
        employees: rows,
        total_records: records.len(),
        net_points,
    }))
}
