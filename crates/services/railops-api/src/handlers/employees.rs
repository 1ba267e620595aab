use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use railops_types::{Employee, EmployeeCode, Transfer};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::{
    CreateEmployeeRequest, EmployeeQuery, TransferEmployeeRequest, UpdateEmployeeRequest,
};
use crate::state::AppState;
use crate::store::{EmployeeFilter, EmployeeStore};

/// POST /api/employees
pub async fn create_employee(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateEmployeeRequest>,
) -> Result<(StatusCode, Json<Employee>), ApiError> {
    user.ensure_can_write(request.department)?;
    let employee = Employee {
        code: request.code,
        name: request.name,
        department: request.department,
        is_resigned: false,
        phone: request.phone,
        email: request.email,
    };
    state.store.insert_employee(employee.clone()).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

/// POST /api/employees/import — bulk create; existing codes are reported,
/// not overwritten.
pub async fn import_employees(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(requests): Json<Vec<CreateEmployeeRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut created = 0usize;
    let mut duplicates = Vec::new();
    for request in requests {
        user.ensure_can_write(request.department)?;
        let employee = Employee {
            code: request.code.clone(),
            name: request.name,
            department: request.department,
            is_resigned: false,
            phone: request.phone,
            email: request.email,
        };
        match state.store.insert_employee(employee).await {
            Ok(()) => created += 1,
            Err(crate::store::StoreError::Conflict(_)) => {
                duplicates.push(request.code.to_string())
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Json(serde_json::json!({
        "created": created,
        "duplicates": duplicates,
    })))
}

/// GET /api/employees
pub async fn list_employees(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<EmployeeQuery>,
) -> Result<Json<Vec<Employee>>, ApiError> {
    // Staff queries collapse onto their own department regardless of the
    // filter they asked for.
    let department = match user.readable_departments() {
        Some(own) => {
            if let Some(requested) = query.department {
                user.ensure_can_read(requested)?;
            }
            Some(own)
        }
        None => query.department,
    };
    let employees = state
        .store
        .list_employees(&EmployeeFilter {
            department,
            search: query.search,
            include_resigned: query.include_resigned.unwrap_or(false),
        })
        .await?;
    Ok(Json(employees))
}

/// GET /api/employees/:code
pub async fn get_employee(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(code): Path<EmployeeCode>,
) -> Result<Json<Employee>, ApiError> {
    let employee = state
        .store
        .get_employee(&code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("employee {code}")))?;
    user.ensure_can_read(employee.department)?;
    Ok(Json(employee))
}

/// PATCH /api/employees/:code
pub async fn update_employee(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(code): Path<EmployeeCode>,
    Json(patch): Json<UpdateEmployeeRequest>,
) -> Result<Json<Employee>, ApiError> {
    let mut employee = state
        .store
        .get_employee(&code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("employee {code}")))?;
    user.ensure_can_write(employee.department)?;

    if let Some(name) = patch.name {
        employee.name = name;
    }
    if patch.phone.is_some() {
        employee.phone = patch.phone;
    }
    if patch.email.is_some() {
        employee.email = patch.email;
    }
    if let Some(resigned) = patch.is_resigned {
        employee.is_resigned = resigned;
    }
    state.store.update_employee(employee.clone()).await?;
    Ok(Json(employee))
}

/// POST /api/employees/:code/transfer — cross-department move, admin only.
pub async fn transfer_employee(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(code): Path<EmployeeCode>,
    Json(request): Json<TransferEmployeeRequest>,
) -> Result<Json<Employee>, ApiError> {
    user.ensure_admin()?;
    let employee = state
        .store
        .get_employee(&code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("employee {code}")))?;
    if employee.department == request.to_department {
        return Err(ApiError::validation(format!(
            "employee {code} is already in {}",
            request.to_department
        )));
    }
    let transfer = Transfer {
        employee_code: code,
        from_department: employee.department,
        to_department: request.to_department,
        effective_date: request.effective_date,
        reason: request.reason,
    };
    let updated = state.store.commit_transfer(transfer).await?;
    Ok(Json(updated))
}

/// GET /api/employees/:code/transfers
pub async fn list_transfers(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(code): Path<EmployeeCode>,
) -> Result<Json<Vec<Transfer>>, ApiError> {
    let employee = state
        .store
        .get_employee(&code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("employee {code}")))?;
    user.ensure_can_read(employee.department)?;
    Ok(Json(state.store.list_transfers(&code).await?))
}
