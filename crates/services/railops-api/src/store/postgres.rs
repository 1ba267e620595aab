use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use railops_types::{
    AssessmentStandard, CategoryCode, ConversionStatus, CumulativeMultiplier, Department, Employee,
    EmployeeCode, Points, ProfileType, Responsibility, Transfer,
};

use crate::models::{
    AssessmentRecord, CounterKey, OAuthTokenRecord, PendingCase, PendingStatus, Profile,
    ProfileDetails, Role, ScheduleCell, Setting, User,
};

use super::{
    AssessmentStore, EmployeeFilter, EmployeeStore, PendingCaseStats, PendingCaseStore,
    ProfileFilter, ProfileStore, RecordFilter, ScheduleStore, ScoringCommit, SettingsStore,
    StoreError, TokenStore, UserStore,
};

/// Postgres-backed store. Multi-statement invariants run inside one
/// transaction; the cumulative-counter row is locked with
/// `SELECT ... FOR UPDATE` before any dependent write.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::internal(format!("migration failed: {e}")))?;
        Ok(PgStore { pool })
    }
}

fn parse<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| StoreError::internal(format!("stored {what} {raw:?} is invalid: {e}")))
}

fn parse_role(raw: &str) -> Result<Role, StoreError> {
    match raw {
        "admin" => Ok(Role::Admin),
        "manager" => Ok(Role::Manager),
        "staff" => Ok(Role::Staff),
        other => Err(StoreError::internal(format!("stored role {other:?} is invalid"))),
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::Admin => "admin",
        Role::Manager => "manager",
        Role::Staff => "staff",
    }
}

fn parse_profile_type(raw: &str) -> Result<ProfileType, StoreError> {
    match raw {
        "basic" => Ok(ProfileType::Basic),
        "event_investigation" => Ok(ProfileType::EventInvestigation),
        "personnel_interview" => Ok(ProfileType::PersonnelInterview),
        "corrective_measures" => Ok(ProfileType::CorrectiveMeasures),
        "assessment_notice" => Ok(ProfileType::AssessmentNotice),
        other => Err(StoreError::internal(format!(
            "stored profile type {other:?} is invalid"
        ))),
    }
}

fn profile_type_str(pt: ProfileType) -> &'static str {
    match pt {
        ProfileType::Basic => "basic",
        ProfileType::EventInvestigation => "event_investigation",
        ProfileType::PersonnelInterview => "personnel_interview",
        ProfileType::CorrectiveMeasures => "corrective_measures",
        ProfileType::AssessmentNotice => "assessment_notice",
    }
}

fn parse_status(raw: &str) -> Result<ConversionStatus, StoreError> {
    match raw {
        "pending" => Ok(ConversionStatus::Pending),
        "converted" => Ok(ConversionStatus::Converted),
        "completed" => Ok(ConversionStatus::Completed),
        other => Err(StoreError::internal(format!(
            "stored conversion status {other:?} is invalid"
        ))),
    }
}

fn status_str(status: ConversionStatus) -> &'static str {
    match status {
        ConversionStatus::Pending => "pending",
        ConversionStatus::Converted => "converted",
        ConversionStatus::Completed => "completed",
    }
}

fn parse_coefficient(raw: Option<String>) -> Result<Option<Responsibility>, StoreError> {
    match raw.as_deref() {
        None => Ok(None),
        Some("minor") => Ok(Some(Responsibility::Minor)),
        Some("major") => Ok(Some(Responsibility::Major)),
        Some("full") => Ok(Some(Responsibility::Full)),
        Some(other) => Err(StoreError::internal(format!(
            "stored coefficient {other:?} is invalid"
        ))),
    }
}

fn coefficient_str(coef: Option<Responsibility>) -> Option<&'static str> {
    coef.map(|c| match c {
        Responsibility::Minor => "minor",
        Responsibility::Major => "major",
        Responsibility::Full => "full",
    })
}

fn row_to_user(row: &PgRow) -> Result<User, StoreError> {
    let department: Option<String> = row.try_get("department")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        role: parse_role(&row.try_get::<String, _>("role")?)?,
        department: department
            .map(|d| parse::<Department>(&d, "department"))
            .transpose()?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_employee(row: &PgRow) -> Result<Employee, StoreError> {
    Ok(Employee {
        code: parse(&row.try_get::<String, _>("code")?, "employee code")?,
        name: row.try_get("name")?,
        department: parse(&row.try_get::<String, _>("department")?, "department")?,
        is_resigned: row.try_get("is_resigned")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
    })
}

fn row_to_record(row: &PgRow) -> Result<AssessmentRecord, StoreError> {
    let checklist: Option<serde_json::Value> = row.try_get("checklist")?;
    Ok(AssessmentRecord {
        id: row.try_get("id")?,
        department: parse(&row.try_get::<String, _>("department")?, "department")?,
        employee_code: parse(&row.try_get::<String, _>("employee_code")?, "employee code")?,
        standard_code: row.try_get("standard_code")?,
        category: parse(&row.try_get::<String, _>("category")?, "category")?,
        event_date: row.try_get("event_date")?,
        base_points: Points::from_tenths(row.try_get("base_points_tenths")?),
        fault_coefficient: parse_coefficient(row.try_get("fault_coefficient")?)?,
        cumulative_multiplier: multiplier_from_halves(row.try_get("multiplier_halves")?),
        final_points: Points::from_tenths(row.try_get("final_points_tenths")?),
        profile_id: row.try_get("profile_id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        checklist: checklist
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StoreError::internal(format!("stored checklist is invalid: {e}")))?,
        is_deleted: row.try_get("is_deleted")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn multiplier_from_halves(halves: i64) -> CumulativeMultiplier {
    // halves = 2 + (rank - 1)
    CumulativeMultiplier::for_rank((halves - 1).max(1) as u32)
}

fn row_to_profile(row: &PgRow) -> Result<Profile, StoreError> {
    Ok(Profile {
        id: row.try_get("id")?,
        department: parse(&row.try_get::<String, _>("department")?, "department")?,
        employee_code: parse(&row.try_get::<String, _>("employee_code")?, "employee code")?,
        event_date: row.try_get("event_date")?,
        event_time: row.try_get("event_time")?,
        event_location: row.try_get("event_location")?,
        train_number: row.try_get("train_number")?,
        event_title: row.try_get("event_title")?,
        event_description: row.try_get("event_description")?,
        profile_type: parse_profile_type(&row.try_get::<String, _>("profile_type")?)?,
        conversion_status: parse_status(&row.try_get::<String, _>("conversion_status")?)?,
        version: row.try_get("version")?,
        drive_link: row.try_get("drive_link")?,
        assessment_record_id: row.try_get("assessment_record_id")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_case(row: &PgRow) -> Result<PendingCase, StoreError> {
    let status = match row.try_get::<String, _>("status")?.as_str() {
        "pending" => PendingStatus::Pending,
        "uploaded" => PendingStatus::Uploaded,
        other => {
            return Err(StoreError::internal(format!(
                "stored case status {other:?} is invalid"
            )))
        }
    };
    Ok(PendingCase {
        id: row.try_get("id")?,
        profile_id: row.try_get("profile_id")?,
        department: parse(&row.try_get::<String, _>("department")?, "department")?,
        profile_type: parse_profile_type(&row.try_get::<String, _>("profile_type")?)?,
        status,
        drive_link: row.try_get("drive_link")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn case_status_str(status: PendingStatus) -> &'static str {
    match status {
        PendingStatus::Pending => "pending",
        PendingStatus::Uploaded => "uploaded",
    }
}

async fn lock_counter(
    tx: &mut Transaction<'_, Postgres>,
    key: &CounterKey,
) -> Result<u32, StoreError> {
    sqlx::query(
        "INSERT INTO cumulative_counters (employee_code, category, year, count)
         VALUES ($1, $2, $3, 0)
         ON CONFLICT (employee_code, category, year) DO NOTHING",
    )
    .bind(key.employee_code.as_str())
    .bind(key.category.as_str())
    .bind(key.year)
    .execute(&mut **tx)
    .await?;

    let row = sqlx::query(
        "SELECT count FROM cumulative_counters
         WHERE employee_code = $1 AND category = $2 AND year = $3
         FOR UPDATE",
    )
    .bind(key.employee_code.as_str())
    .bind(key.category.as_str())
    .bind(key.year)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.try_get::<i32, _>("count")? as u32)
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (id, username, password_hash, role, department, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (username) DO NOTHING",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(role_str(user.role))
        .bind(user.department.map(|d| d.as_str()))
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::conflict(format!(
                "username {} already exists",
                user.username
            )));
        }
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, hash: String) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(&hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("user {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl EmployeeStore for PgStore {
    async fn insert_employee(&self, employee: Employee) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO employees (code, name, department, is_resigned, phone, email)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (code) DO NOTHING",
        )
        .bind(employee.code.as_str())
        .bind(&employee.name)
        .bind(employee.department.as_str())
        .bind(employee.is_resigned)
        .bind(&employee.phone)
        .bind(&employee.email)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::conflict(format!(
                "employee {} already exists",
                employee.code
            )));
        }
        Ok(())
    }

    async fn get_employee(&self, code: &EmployeeCode) -> Result<Option<Employee>, StoreError> {
        let row = sqlx::query("SELECT * FROM employees WHERE code = $1")
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_employee).transpose()
    }

    async fn update_employee(&self, employee: Employee) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE employees
             SET name = $2, department = $3, is_resigned = $4, phone = $5, email = $6
             WHERE code = $1",
        )
        .bind(employee.code.as_str())
        .bind(&employee.name)
        .bind(employee.department.as_str())
        .bind(employee.is_resigned)
        .bind(&employee.phone)
        .bind(&employee.email)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("employee {}", employee.code)));
        }
        Ok(())
    }

    async fn list_employees(&self, filter: &EmployeeFilter) -> Result<Vec<Employee>, StoreError> {
        let search = filter.search.as_ref().map(|s| format!("%{}%", s.to_lowercase()));
        let rows = sqlx::query(
            "SELECT * FROM employees
             WHERE ($1::TEXT IS NULL OR department = $1)
               AND ($2::BOOLEAN OR NOT is_resigned)
               AND ($3::TEXT IS NULL OR LOWER(name) LIKE $3 OR LOWER(code) LIKE $3)
             ORDER BY code",
        )
        .bind(filter.department.map(|d| d.as_str()))
        .bind(filter.include_resigned)
        .bind(search)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_employee).collect()
    }

    async fn commit_transfer(&self, transfer: Transfer) -> Result<Employee, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM employees WHERE code = $1 FOR UPDATE")
            .bind(transfer.employee_code.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                StoreError::not_found(format!("employee {}", transfer.employee_code))
            })?;
        let employee = row_to_employee(&row)?;
        if employee.department != transfer.from_department {
            return Err(StoreError::conflict(format!(
                "employee {} is not in {}",
                transfer.employee_code, transfer.from_department
            )));
        }

        sqlx::query(
            "INSERT INTO transfers
                 (employee_code, from_department, to_department, effective_date, reason)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(transfer.employee_code.as_str())
        .bind(transfer.from_department.as_str())
        .bind(transfer.to_department.as_str())
        .bind(transfer.effective_date)
        .bind(&transfer.reason)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE employees SET department = $2 WHERE code = $1")
            .bind(transfer.employee_code.as_str())
            .bind(transfer.to_department.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut updated = employee;
        updated.department = transfer.to_department;
        Ok(updated)
    }

    async fn list_transfers(&self, code: &EmployeeCode) -> Result<Vec<Transfer>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM transfers WHERE employee_code = $1 ORDER BY effective_date, id",
        )
        .bind(code.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(Transfer {
                    employee_code: parse(
                        &row.try_get::<String, _>("employee_code")?,
                        "employee code",
                    )?,
                    from_department: parse(
                        &row.try_get::<String, _>("from_department")?,
                        "department",
                    )?,
                    to_department: parse(
                        &row.try_get::<String, _>("to_department")?,
                        "department",
                    )?,
                    effective_date: row.try_get("effective_date")?,
                    reason: row.try_get("reason")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn upsert_cell(&self, cell: ScheduleCell) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO schedule_cells
                 (department, employee_code, date, raw_text, sync_batch_id, synced_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (department, employee_code, date) DO UPDATE
             SET raw_text = EXCLUDED.raw_text,
                 sync_batch_id = EXCLUDED.sync_batch_id,
                 synced_at = EXCLUDED.synced_at
             WHERE schedule_cells.raw_text IS DISTINCT FROM EXCLUDED.raw_text",
        )
        .bind(cell.department.as_str())
        .bind(cell.employee_code.as_str())
        .bind(cell.date)
        .bind(&cell.raw_text)
        .bind(cell.sync_batch_id)
        .bind(cell.synced_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_cell(
        &self,
        department: Department,
        code: &EmployeeCode,
        date: NaiveDate,
    ) -> Result<Option<ScheduleCell>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM schedule_cells
             WHERE department = $1 AND employee_code = $2 AND date = $3",
        )
        .bind(department.as_str())
        .bind(code.as_str())
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_cell).transpose()
    }

    async fn month_cells(
        &self,
        department: Department,
        year: i32,
        month: u32,
    ) -> Result<Vec<ScheduleCell>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM schedule_cells
             WHERE department = $1
               AND date >= make_date($2, $3, 1)
               AND date < make_date($2, $3, 1) + INTERVAL '1 month'
             ORDER BY employee_code, date",
        )
        .bind(department.as_str())
        .bind(year)
        .bind(month as i32)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_cell).collect()
    }

    async fn employee_month_cells(
        &self,
        department: Department,
        code: &EmployeeCode,
        year: i32,
        month: u32,
    ) -> Result<Vec<ScheduleCell>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM schedule_cells
             WHERE department = $1 AND employee_code = $2
               AND date >= make_date($3, $4, 1)
               AND date < make_date($3, $4, 1) + INTERVAL '1 month'
             ORDER BY date",
        )
        .bind(department.as_str())
        .bind(code.as_str())
        .bind(year)
        .bind(month as i32)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_cell).collect()
    }
}

fn row_to_cell(row: &PgRow) -> Result<ScheduleCell, StoreError> {
    Ok(ScheduleCell {
        department: parse(&row.try_get::<String, _>("department")?, "department")?,
        employee_code: parse(&row.try_get::<String, _>("employee_code")?, "employee code")?,
        date: row.try_get("date")?,
        raw_text: row.try_get("raw_text")?,
        sync_batch_id: row.try_get("sync_batch_id")?,
        synced_at: row.try_get("synced_at")?,
    })
}

#[async_trait]
impl AssessmentStore for PgStore {
    async fn seed_standards(&self, standards: Vec<AssessmentStandard>) -> Result<(), StoreError> {
        for standard in standards {
            sqlx::query(
                "INSERT INTO assessment_standards
                     (code, category, base_points_tenths, has_cumulative, is_r_fault_type, description)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (code) DO NOTHING",
            )
            .bind(&standard.code)
            .bind(standard.category.as_str())
            .bind(standard.base_points.tenths())
            .bind(standard.has_cumulative)
            .bind(standard.is_r_fault_type)
            .bind(&standard.description)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn get_standard(&self, code: &str) -> Result<Option<AssessmentStandard>, StoreError> {
        let row = sqlx::query("SELECT * FROM assessment_standards WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_standard).transpose()
    }

    async fn list_standards(&self) -> Result<Vec<AssessmentStandard>, StoreError> {
        let rows = sqlx::query("SELECT * FROM assessment_standards ORDER BY code")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_standard).collect()
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<AssessmentRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM assessment_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn list_records(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<AssessmentRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM assessment_records
             WHERE ($1::TEXT IS NULL OR department = $1)
               AND ($2::TEXT IS NULL OR employee_code = $2)
               AND ($3::INT IS NULL OR EXTRACT(YEAR FROM event_date) = $3)
               AND ($4::INT IS NULL OR EXTRACT(MONTH FROM event_date) = $4)
               AND ($5::BOOLEAN OR NOT is_deleted)
             ORDER BY event_date, created_at",
        )
        .bind(filter.department.map(|d| d.as_str()))
        .bind(filter.employee_code.as_ref().map(|c| c.as_str().to_string()))
        .bind(filter.year)
        .bind(filter.month.map(|m| m as i32))
        .bind(filter.include_deleted)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn live_triple_records(
        &self,
        key: &CounterKey,
    ) -> Result<Vec<AssessmentRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM assessment_records
             WHERE employee_code = $1 AND category = $2
               AND EXTRACT(YEAR FROM event_date) = $3
               AND NOT is_deleted
             ORDER BY event_date, created_at",
        )
        .bind(key.employee_code.as_str())
        .bind(key.category.as_str())
        .bind(key.year)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn counter_value(&self, key: &CounterKey) -> Result<u32, StoreError> {
        let row = sqlx::query(
            "SELECT count FROM cumulative_counters
             WHERE employee_code = $1 AND category = $2 AND year = $3",
        )
        .bind(key.employee_code.as_str())
        .bind(key.category.as_str())
        .bind(key.year)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row
            .map(|r| r.try_get::<i32, _>("count"))
            .transpose()?
            .unwrap_or(0) as u32)
    }

    async fn idempotency_key_exists(&self, key: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 AS one FROM assessment_records WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn commit_scoring(&self, commit: ScoringCommit) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Counter rows first: they are the serialization point for every
        // operation that depends on rank.
        for (key, _) in &commit.counters {
            lock_counter(&mut tx, key).await?;
        }

        if let Some(record) = &commit.insert {
            let checklist = record
                .checklist
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| StoreError::internal(format!("checklist serialization: {e}")))?;
            let result = sqlx::query(
                "INSERT INTO assessment_records
                     (id, department, employee_code, standard_code, category, event_date,
                      base_points_tenths, fault_coefficient, multiplier_halves,
                      final_points_tenths, profile_id, idempotency_key, checklist,
                      is_deleted, created_by, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                 ON CONFLICT (idempotency_key) DO NOTHING",
            )
            .bind(record.id)
            .bind(record.department.as_str())
            .bind(record.employee_code.as_str())
            .bind(&record.standard_code)
            .bind(record.category.as_str())
            .bind(record.event_date)
            .bind(record.base_points.tenths())
            .bind(coefficient_str(record.fault_coefficient))
            .bind(record.cumulative_multiplier.halves())
            .bind(record.final_points.tenths())
            .bind(record.profile_id)
            .bind(&record.idempotency_key)
            .bind(checklist)
            .bind(record.is_deleted)
            .bind(&record.created_by)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::conflict("duplicate idempotency key".to_string()));
            }
        }

        if let Some(id) = commit.soft_delete {
            let result =
                sqlx::query("UPDATE assessment_records SET is_deleted = TRUE WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(format!("record {id}")));
            }
        }

        for rescore in &commit.rescores {
            let result = sqlx::query(
                "UPDATE assessment_records
                 SET multiplier_halves = $2,
                     final_points_tenths = $3,
                     event_date = COALESCE($4, event_date)
                 WHERE id = $1",
            )
            .bind(rescore.id)
            .bind(rescore.cumulative_multiplier.halves())
            .bind(rescore.final_points.tenths())
            .bind(rescore.event_date)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(format!("record {}", rescore.id)));
            }
        }

        if let Some(update) = &commit.checklist_update {
            let checklist = serde_json::to_value(&update.checklist)
                .map_err(|e| StoreError::internal(format!("checklist serialization: {e}")))?;
            let result = sqlx::query(
                "UPDATE assessment_records
                 SET checklist = $2, fault_coefficient = $3
                 WHERE id = $1",
            )
            .bind(update.id)
            .bind(checklist)
            .bind(coefficient_str(update.coefficient))
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(format!("record {}", update.id)));
            }
        }

        for (key, count) in &commit.counters {
            sqlx::query(
                "UPDATE cumulative_counters SET count = $4
                 WHERE employee_code = $1 AND category = $2 AND year = $3",
            )
            .bind(key.employee_code.as_str())
            .bind(key.category.as_str())
            .bind(key.year)
            .bind(*count as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn close_counters(&self, year: i32) -> Result<u32, StoreError> {
        let result = sqlx::query(
            "UPDATE cumulative_counters SET closed = TRUE WHERE year = $1 AND NOT closed",
        )
        .bind(year)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as u32)
    }

    async fn records_by_department_month(
        &self,
        department: Department,
        year: i32,
        month: u32,
    ) -> Result<Vec<AssessmentRecord>, StoreError> {
        self.list_records(&RecordFilter {
            department: Some(department),
            year: Some(year),
            month: Some(month),
            ..RecordFilter::default()
        })
        .await
    }
}

fn row_to_standard(row: &PgRow) -> Result<AssessmentStandard, StoreError> {
    Ok(AssessmentStandard {
        code: row.try_get("code")?,
        category: parse(&row.try_get::<String, _>("category")?, "category")?,
        base_points: Points::from_tenths(row.try_get("base_points_tenths")?),
        has_cumulative: row.try_get("has_cumulative")?,
        is_r_fault_type: row.try_get("is_r_fault_type")?,
        description: row.try_get("description")?,
    })
}

impl PgStore {
    async fn cas_profile_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        profile: &Profile,
        expected_version: i64,
    ) -> Result<Profile, StoreError> {
        let result = sqlx::query(
            "UPDATE profiles
             SET event_date = $3, event_time = $4, event_location = $5, train_number = $6,
                 event_title = $7, event_description = $8, profile_type = $9,
                 conversion_status = $10, version = version + 1, drive_link = $11,
                 assessment_record_id = $12, updated_at = NOW()
             WHERE id = $1 AND version = $2",
        )
        .bind(profile.id)
        .bind(expected_version)
        .bind(profile.event_date)
        .bind(profile.event_time)
        .bind(&profile.event_location)
        .bind(&profile.train_number)
        .bind(&profile.event_title)
        .bind(&profile.event_description)
        .bind(profile_type_str(profile.profile_type))
        .bind(status_str(profile.conversion_status))
        .bind(&profile.drive_link)
        .bind(profile.assessment_record_id)
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::conflict(format!(
                "profile {} version mismatch (expected {expected_version})",
                profile.id
            )));
        }
        let mut updated = profile.clone();
        updated.version = expected_version + 1;
        updated.updated_at = Utc::now();
        Ok(updated)
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn insert_profile(&self, profile: Profile) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO profiles
                 (id, department, employee_code, event_date, event_time, event_location,
                  train_number, event_title, event_description, profile_type,
                  conversion_status, version, drive_link, assessment_record_id,
                  created_by, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(profile.id)
        .bind(profile.department.as_str())
        .bind(profile.employee_code.as_str())
        .bind(profile.event_date)
        .bind(profile.event_time)
        .bind(&profile.event_location)
        .bind(&profile.train_number)
        .bind(&profile.event_title)
        .bind(&profile.event_description)
        .bind(profile_type_str(profile.profile_type))
        .bind(status_str(profile.conversion_status))
        .bind(profile.version)
        .bind(&profile.drive_link)
        .bind(profile.assessment_record_id)
        .bind(&profile.created_by)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_profile).transpose()
    }

    async fn list_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM profiles
             WHERE ($1::TEXT IS NULL OR department = $1)
               AND ($2::TEXT IS NULL OR conversion_status = $2)
               AND ($3::TEXT IS NULL OR profile_type = $3)
               AND ($4::TEXT IS NULL OR employee_code = $4)
             ORDER BY created_at DESC",
        )
        .bind(filter.department.map(|d| d.as_str()))
        .bind(filter.status.map(status_str))
        .bind(filter.profile_type.map(profile_type_str))
        .bind(filter.employee_code.as_ref().map(|c| c.as_str().to_string()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_profile).collect()
    }

    async fn update_profile_cas(
        &self,
        profile: Profile,
        expected_version: i64,
    ) -> Result<Profile, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = self.cas_profile_tx(&mut tx, &profile, expected_version).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn convert_profile(
        &self,
        profile: Profile,
        expected_version: i64,
        details: ProfileDetails,
        case: PendingCase,
    ) -> Result<Profile, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = self.cas_profile_tx(&mut tx, &profile, expected_version).await?;

        let details_json = serde_json::to_value(&details)
            .map_err(|e| StoreError::internal(format!("details serialization: {e}")))?;
        sqlx::query(
            "INSERT INTO profile_details (profile_id, details) VALUES ($1, $2)
             ON CONFLICT (profile_id) DO UPDATE SET details = EXCLUDED.details",
        )
        .bind(updated.id)
        .bind(details_json)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO pending_cases
                 (id, profile_id, department, profile_type, status, drive_link, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(case.id)
        .bind(case.profile_id)
        .bind(case.department.as_str())
        .bind(profile_type_str(case.profile_type))
        .bind(case_status_str(case.status))
        .bind(&case.drive_link)
        .bind(case.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn complete_profile(
        &self,
        profile: Profile,
        expected_version: i64,
    ) -> Result<Profile, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = self.cas_profile_tx(&mut tx, &profile, expected_version).await?;

        let result = sqlx::query(
            "UPDATE pending_cases
             SET status = 'uploaded', drive_link = $2, completed_at = NOW()
             WHERE profile_id = $1",
        )
        .bind(updated.id)
        .bind(&updated.drive_link)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!(
                "pending case for profile {}",
                updated.id
            )));
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn reset_profile(
        &self,
        profile: Profile,
        expected_version: i64,
    ) -> Result<Profile, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = self.cas_profile_tx(&mut tx, &profile, expected_version).await?;
        sqlx::query("DELETE FROM profile_details WHERE profile_id = $1")
            .bind(updated.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM pending_cases WHERE profile_id = $1")
            .bind(updated.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn get_details(&self, profile_id: Uuid) -> Result<Option<ProfileDetails>, StoreError> {
        let row = sqlx::query("SELECT details FROM profile_details WHERE profile_id = $1")
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let value: serde_json::Value = r.try_get("details")?;
            serde_json::from_value(value)
                .map_err(|e| StoreError::internal(format!("stored details invalid: {e}")))
        })
        .transpose()
    }
}

#[async_trait]
impl PendingCaseStore for PgStore {
    async fn list_cases(
        &self,
        department: Option<Department>,
        profile_type: Option<ProfileType>,
        status: Option<PendingStatus>,
    ) -> Result<Vec<PendingCase>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM pending_cases
             WHERE ($1::TEXT IS NULL OR department = $1)
               AND ($2::TEXT IS NULL OR profile_type = $2)
               AND ($3::TEXT IS NULL OR status = $3)
             ORDER BY created_at",
        )
        .bind(department.map(|d| d.as_str()))
        .bind(profile_type.map(profile_type_str))
        .bind(status.map(case_status_str))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_case).collect()
    }

    async fn case_for_profile(&self, profile_id: Uuid) -> Result<Option<PendingCase>, StoreError> {
        let row = sqlx::query("SELECT * FROM pending_cases WHERE profile_id = $1")
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_case).transpose()
    }

    async fn case_stats(
        &self,
        department: Option<Department>,
        now: DateTime<Utc>,
    ) -> Result<PendingCaseStats, StoreError> {
        let cases = self.list_cases(department, None, None).await?;
        let month_start = now
            .date_naive()
            .with_day(1)
            .unwrap_or_else(|| now.date_naive());

        let open: Vec<&PendingCase> = cases
            .iter()
            .filter(|c| c.status == PendingStatus::Pending)
            .collect();
        let mut by_type: std::collections::HashMap<ProfileType, usize> =
            std::collections::HashMap::new();
        for case in &open {
            *by_type.entry(case.profile_type).or_default() += 1;
        }
        let mut by_type: Vec<(ProfileType, usize)> = by_type.into_iter().collect();
        by_type.sort_by_key(|(t, _)| t.code());

        Ok(PendingCaseStats {
            total_open: open.len(),
            by_type,
            oldest_pending: open.iter().map(|c| c.created_at).min(),
            completed_this_month: cases
                .iter()
                .filter(|c| c.completed_at.map_or(false, |t| t.date_naive() >= month_start))
                .count(),
            opened_this_month: cases
                .iter()
                .filter(|c| c.created_at.date_naive() >= month_start)
                .count(),
        })
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn get_token(
        &self,
        department: Department,
    ) -> Result<Option<OAuthTokenRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM oauth_tokens WHERE department = $1")
            .bind(department.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            Ok(OAuthTokenRecord {
                department,
                refresh_token_sealed: r.try_get("refresh_token_sealed")?,
                access_token_sealed: r.try_get("access_token_sealed")?,
                access_expires_at: r.try_get("access_expires_at")?,
                authorized_email: r.try_get("authorized_email")?,
                updated_at: r.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    async fn upsert_token(&self, record: OAuthTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO oauth_tokens
                 (department, refresh_token_sealed, access_token_sealed, access_expires_at,
                  authorized_email, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (department) DO UPDATE
             SET refresh_token_sealed = EXCLUDED.refresh_token_sealed,
                 access_token_sealed = EXCLUDED.access_token_sealed,
                 access_expires_at = EXCLUDED.access_expires_at,
                 authorized_email = EXCLUDED.authorized_email,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(record.department.as_str())
        .bind(&record.refresh_token_sealed)
        .bind(&record.access_token_sealed)
        .bind(record.access_expires_at)
        .bind(&record.authorized_email)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_token(&self, department: Department) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM oauth_tokens WHERE department = $1")
            .bind(department.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn get_setting(
        &self,
        department: Department,
        key: &str,
    ) -> Result<Option<Setting>, StoreError> {
        let row = sqlx::query("SELECT * FROM settings WHERE department = $1 AND key = $2")
            .bind(department.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            Ok(Setting {
                department,
                key: r.try_get("key")?,
                value: r.try_get("value")?,
                updated_at: r.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    async fn upsert_setting(&self, setting: Setting) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO settings (department, key, value, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (department, key) DO UPDATE
             SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
        )
        .bind(setting.department.as_str())
        .bind(&setting.key)
        .bind(&setting.value)
        .bind(setting.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_settings(&self, department: Department) -> Result<Vec<Setting>, StoreError> {
        let rows = sqlx::query("SELECT * FROM settings WHERE department = $1 ORDER BY key")
            .bind(department.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| {
                Ok(Setting {
                    department,
                    key: r.try_get("key")?,
                    value: r.try_get("value")?,
                    updated_at: r.try_get("updated_at")?,
                })
            })
            .collect()
    }
}
