pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use railops_types::{
    AssessmentStandard, CategoryCode, CumulativeMultiplier, Department, Employee, EmployeeCode,
    Points, ProfileType, Transfer,
};

use crate::models::{
    AssessmentRecord, CounterKey, OAuthTokenRecord, PendingCase, PendingStatus, Profile,
    ProfileDetails, ScheduleCell, Setting, User,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn internal(message: impl Into<String>) -> Self {
        StoreError::Internal(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        StoreError::Conflict(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        StoreError::NotFound(message.into())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmployeeFilter {
    pub department: Option<Department>,
    pub search: Option<String>,
    pub include_resigned: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub department: Option<Department>,
    pub employee_code: Option<EmployeeCode>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileFilter {
    pub department: Option<Department>,
    pub status: Option<railops_types::ConversionStatus>,
    pub profile_type: Option<ProfileType>,
    pub employee_code: Option<EmployeeCode>,
}

/// Rescore of an already-persisted record, produced when a soft delete or a
/// date move changes ranks within a counter group.
#[derive(Debug, Clone)]
pub struct RecordRescore {
    pub id: Uuid,
    pub cumulative_multiplier: CumulativeMultiplier,
    pub final_points: Points,
    /// Set when the record itself moves to a new event date.
    pub event_date: Option<NaiveDate>,
}

/// Replacement checklist (and derived coefficient) for an r-fault record.
#[derive(Debug, Clone)]
pub struct ChecklistUpdate {
    pub id: Uuid,
    pub checklist: railops_types::FaultChecklist,
    pub coefficient: Option<railops_types::Responsibility>,
}

/// One atomic scoring mutation. Everything in here commits in a single
/// store transaction; the counter rows named by `counters` are the
/// serialization points and are locked first.
#[derive(Debug, Clone, Default)]
pub struct ScoringCommit {
    pub insert: Option<AssessmentRecord>,
    pub soft_delete: Option<Uuid>,
    pub rescores: Vec<RecordRescore>,
    pub checklist_update: Option<ChecklistUpdate>,
    /// New absolute values for the touched counters (at most two: a date
    /// move across a year boundary touches the old and the new year).
    pub counters: Vec<(CounterKey, u32)>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PendingCaseStats {
    pub total_open: usize,
    pub by_type: Vec<(ProfileType, usize)>,
    pub oldest_pending: Option<DateTime<Utc>>,
    pub completed_this_month: usize,
    pub opened_this_month: usize,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn insert_user(&self, user: User) -> Result<(), StoreError>;
    async fn set_password_hash(&self, id: Uuid, hash: String) -> Result<(), StoreError>;
}

#[async_trait]
pub trait EmployeeStore: Send + Sync {
    async fn insert_employee(&self, employee: Employee) -> Result<(), StoreError>;
    async fn get_employee(&self, code: &EmployeeCode) -> Result<Option<Employee>, StoreError>;
    async fn update_employee(&self, employee: Employee) -> Result<(), StoreError>;
    async fn list_employees(&self, filter: &EmployeeFilter) -> Result<Vec<Employee>, StoreError>;
    /// Append the transfer log row and advance the employee's department in
    /// one transaction. Returns the updated employee.
    async fn commit_transfer(&self, transfer: Transfer) -> Result<Employee, StoreError>;
    async fn list_transfers(&self, code: &EmployeeCode) -> Result<Vec<Transfer>, StoreError>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Idempotent: an identical payload leaves the row untouched.
    async fn upsert_cell(&self, cell: ScheduleCell) -> Result<(), StoreError>;
    async fn get_cell(
        &self,
        department: Department,
        code: &EmployeeCode,
        date: NaiveDate,
    ) -> Result<Option<ScheduleCell>, StoreError>;
    async fn month_cells(
        &self,
        department: Department,
        year: i32,
        month: u32,
    ) -> Result<Vec<ScheduleCell>, StoreError>;
    async fn employee_month_cells(
        &self,
        department: Department,
        code: &EmployeeCode,
        year: i32,
        month: u32,
    ) -> Result<Vec<ScheduleCell>, StoreError>;
}

#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn seed_standards(&self, standards: Vec<AssessmentStandard>) -> Result<(), StoreError>;
    async fn get_standard(&self, code: &str) -> Result<Option<AssessmentStandard>, StoreError>;
    async fn list_standards(&self) -> Result<Vec<AssessmentStandard>, StoreError>;

    async fn get_record(&self, id: Uuid) -> Result<Option<AssessmentRecord>, StoreError>;
    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<AssessmentRecord>, StoreError>;
    /// Live (non-deleted) records of one counter group in event-date order,
    /// ties broken by creation time.
    async fn live_triple_records(
        &self,
        key: &CounterKey,
    ) -> Result<Vec<AssessmentRecord>, StoreError>;
    async fn counter_value(&self, key: &CounterKey) -> Result<u32, StoreError>;
    async fn idempotency_key_exists(&self, key: &str) -> Result<bool, StoreError>;
    async fn commit_scoring(&self, commit: ScoringCommit) -> Result<(), StoreError>;
    /// Archive all counters of `year`. Returns how many were closed.
    async fn close_counters(&self, year: i32) -> Result<u32, StoreError>;
    async fn records_by_department_month(
        &self,
        department: Department,
        year: i32,
        month: u32,
    ) -> Result<Vec<AssessmentRecord>, StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn insert_profile(&self, profile: Profile) -> Result<(), StoreError>;
    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, StoreError>;
    async fn list_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, StoreError>;
    /// Compare-and-swap on `expected_version`; bumps the version and
    /// `updated_at` on success, `Conflict` on mismatch.
    async fn update_profile_cas(
        &self,
        profile: Profile,
        expected_version: i64,
    ) -> Result<Profile, StoreError>;
    /// Conversion transaction: CAS-update the profile, write the sub-form,
    /// open the pending case.
    async fn convert_profile(
        &self,
        profile: Profile,
        expected_version: i64,
        details: ProfileDetails,
        case: PendingCase,
    ) -> Result<Profile, StoreError>;
    /// Completion transaction: CAS-update the profile and close its case.
    async fn complete_profile(
        &self,
        profile: Profile,
        expected_version: i64,
    ) -> Result<Profile, StoreError>;
    /// Admin reset transaction: CAS-update back to basic, drop the sub-form
    /// and the pending case.
    async fn reset_profile(
        &self,
        profile: Profile,
        expected_version: i64,
    ) -> Result<Profile, StoreError>;
    async fn get_details(&self, profile_id: Uuid) -> Result<Option<ProfileDetails>, StoreError>;
}

#[async_trait]
pub trait PendingCaseStore: Send + Sync {
    async fn list_cases(
        &self,
        department: Option<Department>,
        profile_type: Option<ProfileType>,
        status: Option<PendingStatus>,
    ) -> Result<Vec<PendingCase>, StoreError>;
    async fn case_for_profile(&self, profile_id: Uuid) -> Result<Option<PendingCase>, StoreError>;
    async fn case_stats(
        &self,
        department: Option<Department>,
        now: DateTime<Utc>,
    ) -> Result<PendingCaseStats, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get_token(&self, department: Department)
        -> Result<Option<OAuthTokenRecord>, StoreError>;
    async fn upsert_token(&self, record: OAuthTokenRecord) -> Result<(), StoreError>;
    async fn delete_token(&self, department: Department) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(
        &self,
        department: Department,
        key: &str,
    ) -> Result<Option<Setting>, StoreError>;
    async fn upsert_setting(&self, setting: Setting) -> Result<(), StoreError>;
    async fn list_settings(&self, department: Department) -> Result<Vec<Setting>, StoreError>;
}

/// The full persistence surface the service is wired against. Implemented
/// by the in-memory store (tests, development) and the Postgres store.
pub trait Store:
    UserStore
    + EmployeeStore
    + ScheduleStore
    + AssessmentStore
    + ProfileStore
    + PendingCaseStore
    + TokenStore
    + SettingsStore
{
}

impl<T> Store for T where
    T: UserStore
        + EmployeeStore
        + ScheduleStore
        + AssessmentStore
        + ProfileStore
        + PendingCaseStore
        + TokenStore
        + SettingsStore
{
}

/// Deterministic idempotency key for derived records.
pub fn idempotency_key(
    department: Department,
    employee: &EmployeeCode,
    year: i32,
    month: u32,
    date_slot: &str,
    code: &str,
) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(department.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(employee.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(year.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(month.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(date_slot.as_bytes());
    hasher.update(b"|");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn counter_key(employee: &EmployeeCode, category: CategoryCode, year: i32) -> CounterKey {
    CounterKey {
        employee_code: employee.clone(),
        category,
        year,
    }
}
