use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use railops_types::{
    CategoryCode, ConversionStatus, CumulativeMultiplier, Department, EmployeeCode, FaultChecklist,
    Points, ProfileType, Responsibility,
};

/// Access role. Admin is unscoped, Manager reads every department, Staff
/// reads and writes only its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Staff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub department: Option<Department>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub department: Option<Department>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
            department: user.department,
        }
    }
}

/// One scored incident. `final_points` always equals
/// `base × coefficient × multiplier` rounded to one decimal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub id: Uuid,
    pub department: Department,
    pub employee_code: EmployeeCode,
    pub standard_code: String,
    pub category: CategoryCode,
    pub event_date: NaiveDate,
    pub base_points: Points,
    pub fault_coefficient: Option<Responsibility>,
    pub cumulative_multiplier: CumulativeMultiplier,
    pub final_points: Points,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist: Option<FaultChecklist>,
    pub is_deleted: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Key of the per-employee yearly occurrence counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterKey {
    pub employee_code: EmployeeCode,
    pub category: CategoryCode,
    pub year: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CumulativeCounter {
    pub key: CounterKey,
    pub count: u32,
    /// Set when the year is closed by the January reset job. Closed
    /// counters are archives, never incremented again.
    pub closed: bool,
}

/// One parsed schedule cell as synced from the external sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleCell {
    pub department: Department,
    pub employee_code: EmployeeCode,
    pub date: NaiveDate,
    pub raw_text: String,
    pub sync_batch_id: Uuid,
    pub synced_at: DateTime<Utc>,
}

/// Incident profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub department: Department,
    pub employee_code: EmployeeCode,
    pub event_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
    pub event_description: String,
    pub profile_type: ProfileType,
    pub conversion_status: ConversionStatus,
    /// Optimistic-concurrency version; bumped on every committed mutation.
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment_record_id: Option<Uuid>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Typed sub-form, exactly one per converted profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileDetails {
    EventInvestigation(EventInvestigationForm),
    PersonnelInterview(PersonnelInterviewForm),
    CorrectiveMeasures(CorrectiveMeasuresForm),
    AssessmentNotice(AssessmentNoticeForm),
}

impl ProfileDetails {
    pub fn profile_type(&self) -> ProfileType {
        match self {
            ProfileDetails::EventInvestigation(_) => ProfileType::EventInvestigation,
            ProfileDetails::PersonnelInterview(_) => ProfileType::PersonnelInterview,
            ProfileDetails::CorrectiveMeasures(_) => ProfileType::CorrectiveMeasures,
            ProfileDetails::AssessmentNotice(_) => ProfileType::AssessmentNotice,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInvestigationForm {
    pub summary: String,
    pub cause_analysis: String,
    pub handling_process: String,
    pub improvement_actions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist: Option<FaultChecklist>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonnelInterviewForm {
    pub interviewer: String,
    pub interview_date: NaiveDate,
    pub topic: String,
    pub statement: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectiveMeasuresForm {
    pub deficiency: String,
    pub measure: String,
    pub deadline: NaiveDate,
    pub responsible_person: String,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentNoticeForm {
    pub standard_code: String,
    pub points: Points,
    pub reason: String,
}

/// Open ticket for a converted profile awaiting its PDF upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCase {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub department: Department,
    pub profile_type: ProfileType,
    pub status: PendingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_link: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Uploaded,
}

/// Encrypted per-department OAuth grant. Refresh and access tokens hold
/// vault ciphertext only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokenRecord {
    pub department: Department,
    pub refresh_token_sealed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_sealed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_expires_at: Option<DateTime<Utc>>,
    pub authorized_email: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub department: Department,
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Request / response DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserSummary,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateEmployeeRequest {
    pub code: EmployeeCode,
    pub name: String,
    pub department: Department,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEmployeeRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_resigned: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TransferEmployeeRequest {
    pub to_department: Department,
    pub effective_date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct EmployeeQuery {
    #[serde(default)]
    pub department: Option<Department>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub include_resigned: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    pub department: Department,
    pub employee_code: EmployeeCode,
    pub event_date: NaiveDate,
    #[serde(default)]
    pub event_time: Option<NaiveTime>,
    #[serde(default)]
    pub event_location: Option<String>,
    #[serde(default)]
    pub train_number: Option<String>,
    #[serde(default)]
    pub event_title: Option<String>,
    pub event_description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub expected_version: i64,
    #[serde(default)]
    pub event_date: Option<NaiveDate>,
    #[serde(default)]
    pub event_time: Option<NaiveTime>,
    #[serde(default)]
    pub event_location: Option<String>,
    #[serde(default)]
    pub train_number: Option<String>,
    #[serde(default)]
    pub event_title: Option<String>,
    #[serde(default)]
    pub event_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertProfileRequest {
    pub expected_version: i64,
    pub details: ProfileDetails,
}

#[derive(Debug, Deserialize)]
pub struct CompleteProfileRequest {
    pub drive_link: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    #[serde(default)]
    pub department: Option<Department>,
    #[serde(default)]
    pub status: Option<ConversionStatus>,
    #[serde(default)]
    pub profile_type: Option<ProfileType>,
    #[serde(default)]
    pub employee_code: Option<EmployeeCode>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub employee_code: EmployeeCode,
    pub standard_code: String,
    pub event_date: NaiveDate,
    #[serde(default)]
    pub checklist: Option<FaultChecklist>,
    #[serde(default)]
    pub profile_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    #[serde(default)]
    pub department: Option<Department>,
    #[serde(default)]
    pub employee_code: Option<EmployeeCode>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub include_deleted: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct FaultResponsibilityRequest {
    pub checklist: FaultChecklist,
}

#[derive(Debug, Deserialize)]
pub struct BonusProcessRequest {
    pub department: Department,
    pub year: i32,
    pub month: u32,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct RewardProcessRequest {
    pub department: Department,
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Deserialize)]
pub struct DrivingStatsQuery {
    pub department: Department,
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Serialize)]
pub struct DrivingStatsResponse {
    pub department: Department,
    pub year: i32,
    pub month: u32,
    pub employees: Vec<EmployeeDrivingStats>,
    pub total_records: usize,
    pub net_points: Points,
}

#[derive(Debug, Serialize)]
pub struct EmployeeDrivingStats {
    pub employee_code: EmployeeCode,
    pub name: String,
    pub record_count: usize,
    pub net_points: Points,
    pub deductions: usize,
    pub rewards: usize,
}

#[derive(Debug, Deserialize)]
pub struct SettingUpsertRequest {
    pub department: Department,
    pub key: String,
    pub value: String,
}
