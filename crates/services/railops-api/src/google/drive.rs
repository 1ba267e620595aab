use chrono::Datelike;
use serde::Serialize;
use std::sync::Arc;

use railops_types::{ConversionStatus, ProfileType};

use crate::error::ApiError;
use crate::models::Profile;
use crate::store::ProfileStore;

/// Everything the desktop helper needs to place one upload. The dispatcher
/// never touches Drive itself.
#[derive(Debug, Clone, Serialize)]
pub struct UploadPlan {
    pub department: String,
    pub folder_path: String,
    pub file_name: String,
    pub can_upload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Upload planning and the completion handshake for converted profiles.
pub struct DriveDispatcher {
    store: Arc<dyn ProfileStore>,
}

impl DriveDispatcher {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        DriveDispatcher { store }
    }

    /// Folder rule: `{type_label}/{YYYY}/{MM}` under the department root.
    pub fn folder_path(profile: &Profile) -> String {
        format!(
            "{}/{:04}/{:02}",
            profile.profile_type.label(),
            profile.event_date.year(),
            profile.event_date.month()
        )
    }

    /// Deterministic, type-dependent file name.
    pub fn file_name(profile: &Profile) -> String {
        match profile.profile_type {
            ProfileType::PersonnelInterview | ProfileType::CorrectiveMeasures => format!(
                "{}-{}-{}-{}.docx",
                profile.profile_type.code(),
                profile.employee_code,
                profile.event_date.format("%Y%m%d"),
                short_id(profile)
            ),
            _ => format!(
                "{}-{}-{}.docx",
                profile.profile_type.code(),
                profile.event_date.format("%Y%m%d"),
                short_id(profile)
            ),
        }
    }

    pub async fn prepare_upload(&self, profile_id: uuid::Uuid) -> Result<UploadPlan, ApiError> {
        let profile = self
            .store
            .get_profile(profile_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("profile {profile_id}")))?;

        let rejection = match profile.conversion_status {
            ConversionStatus::Pending => {
                Some("profile has not been converted yet".to_string())
            }
            ConversionStatus::Completed => Some("profile is already completed".to_string()),
            ConversionStatus::Converted => None,
        };

        Ok(UploadPlan {
            department: profile.department.to_string(),
            folder_path: Self::folder_path(&profile),
            file_name: Self::file_name(&profile),
            can_upload: rejection.is_none(),
            reason: rejection,
        })
    }
}

fn short_id(profile: &Profile) -> String {
    profile.id.simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use railops_types::{Department, EmployeeCode};
    use uuid::Uuid;

    fn profile(profile_type: ProfileType) -> Profile {
        Profile {
            id: Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap(),
            department: Department::Tanhai,
            employee_code: EmployeeCode::new("2305A0017").unwrap(),
            event_date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            event_time: None,
            event_location: None,
            train_number: None,
            event_title: None,
            event_description: "test".to_string(),
            profile_type,
            conversion_status: ConversionStatus::Converted,
            version: 2,
            drive_link: None,
            assessment_record_id: None,
            created_by: "tester".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn folder_path_follows_type_and_month() {
        let p = profile(ProfileType::EventInvestigation);
        assert_eq!(DriveDispatcher::folder_path(&p), "事件調查/2026/03");
    }

    #[test]
    fn file_names_are_deterministic_and_type_dependent() {
        let investigation = profile(ProfileType::EventInvestigation);
        assert_eq!(
            DriveDispatcher::file_name(&investigation),
            "EI-20260309-67e55044.docx"
        );
        let interview = profile(ProfileType::PersonnelInterview);
        assert_eq!(
            DriveDispatcher::file_name(&interview),
            "PI-2305A0017-20260309-67e55044.docx"
        );
    }
}
