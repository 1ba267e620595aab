use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use railops_types::{ConversionStatus, ProfileType};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::{
    CompleteProfileRequest, ConvertProfileRequest, CreateProfileRequest, PendingCase,
    PendingStatus, Profile, ProfileDetails, UpdateProfileRequest,
};
use crate::scoring::ScoringEngine;
use crate::store::{EmployeeStore, PendingCaseStore, ProfileStore, Store};

/// Profile lifecycle: `Basic → Converted → Completed`, forward-only except
/// for the explicit admin reset. Every transition is an optimistic-version
/// compare-and-swap in the store.
pub struct ProfileService {
    store: Arc<dyn Store>,
    scoring: Arc<ScoringEngine>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn Store>, scoring: Arc<ScoringEngine>) -> Self {
        ProfileService { store, scoring }
    }

    pub async fn create(
        &self,
        actor: &CurrentUser,
        request: CreateProfileRequest,
    ) -> Result<Profile, ApiError> {
        actor.ensure_can_write(request.department)?;
        let employee = self
            .store
            .get_employee(&request.employee_code)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("employee {}", request.employee_code)))?;
        if employee.department != request.department {
            return Err(ApiError::validation(format!(
                "employee {} belongs to {}",
                employee.code, employee.department
            )));
        }

        let now = Utc::now();
        let profile = Profile {
            id: Uuid::new_v4(),
            department: request.department,
            employee_code: request.employee_code,
            event_date: request.event_date,
            event_time: request.event_time,
            event_location: request.event_location,
            train_number: request.train_number,
            event_title: request.event_title,
            event_description: request.event_description,
            profile_type: ProfileType::Basic,
            conversion_status: ConversionStatus::Pending,
            version: 1,
            drive_link: None,
            assessment_record_id: None,
            created_by: actor.username.clone(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_profile(profile.clone()).await?;
        tracing::info!(profile_id = %profile.id, department = %profile.department, "profile created");
        Ok(profile)
    }

    pub async fn update(
        &self,
        actor: &CurrentUser,
        id: Uuid,
        patch: UpdateProfileRequest,
    ) -> Result<Profile, ApiError> {
        let mut profile = self.fetch(id).await?;
        actor.ensure_can_write(profile.department)?;

        let old_event_date = profile.event_date;
        if let Some(date) = patch.event_date {
            profile.event_date = date;
        }
        if patch.event_time.is_some() {
            profile.event_time = patch.event_time;
        }
        if patch.event_location.is_some() {
            profile.event_location = patch.event_location;
        }
        if patch.train_number.is_some() {
            profile.train_number = patch.train_number;
        }
        if patch.event_title.is_some() {
            profile.event_title = patch.event_title;
        }
        if let Some(description) = patch.event_description {
            profile.event_description = description;
        }

        let updated = self
            .store
            .update_profile_cas(profile, patch.expected_version)
            .await?;

        // A date change on an assessment-linked profile reranks the record's
        // year cohort (possibly across a year boundary).
        if updated.event_date != old_event_date {
            if let Some(record_id) = updated.assessment_record_id {
                self.scoring
                    .move_record_date(record_id, updated.event_date)
                    .await?;
            }
        }
        Ok(updated)
    }

    pub async fn convert(
        &self,
        actor: &CurrentUser,
        id: Uuid,
        request: ConvertProfileRequest,
    ) -> Result<Profile, ApiError> {
        let mut profile = self.fetch(id).await?;
        actor.ensure_can_write(profile.department)?;

        if profile.conversion_status != ConversionStatus::Pending {
            return Err(ApiError::Conflict(format!(
                "profile {} is already {:?}",
                id, profile.conversion_status
            )));
        }

        let target_type = request.details.profile_type();
        profile.profile_type = target_type;
        profile.conversion_status = ConversionStatus::Converted;

        let case = PendingCase {
            id: Uuid::new_v4(),
            profile_id: profile.id,
            department: profile.department,
            profile_type: target_type,
            status: PendingStatus::Pending,
            drive_link: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        let updated = self
            .store
            .convert_profile(profile, request.expected_version, request.details, case)
            .await?;
        tracing::info!(profile_id = %id, profile_type = %target_type, "profile converted");
        Ok(updated)
    }

    pub async fn mark_complete(
        &self,
        actor: &CurrentUser,
        id: Uuid,
        request: CompleteProfileRequest,
    ) -> Result<Profile, ApiError> {
        let mut profile = self.fetch(id).await?;
        actor.ensure_can_write(profile.department)?;

        if profile.profile_type == ProfileType::Basic {
            return Err(ApiError::Conflict(
                "basic profiles cannot be completed".to_string(),
            ));
        }
        if profile.conversion_status == ConversionStatus::Completed {
            return Err(ApiError::Conflict("profile is already completed".to_string()));
        }
        if self.store.case_for_profile(id).await?.is_none() {
            return Err(ApiError::Conflict(format!(
                "profile {id} has no pending case"
            )));
        }

        let expected_version = profile.version;
        profile.conversion_status = ConversionStatus::Completed;
        profile.drive_link = Some(request.drive_link);

        let updated = self.store.complete_profile(profile, expected_version).await?;
        tracing::info!(profile_id = %id, "profile completed");
        Ok(updated)
    }

    /// Explicit regression back to Basic. Drops the sub-form and the
    /// pending case; the Drive link is cleared.
    pub async fn admin_reset(&self, actor: &CurrentUser, id: Uuid) -> Result<Profile, ApiError> {
        actor.ensure_admin()?;
        let mut profile = self.fetch(id).await?;

        let expected_version = profile.version;
        profile.profile_type = ProfileType::Basic;
        profile.conversion_status = ConversionStatus::Pending;
        profile.drive_link = None;

        let updated = self.store.reset_profile(profile, expected_version).await?;
        tracing::warn!(profile_id = %id, actor = %actor.username, "profile reset to basic");
        Ok(updated)
    }

    pub async fn details(&self, id: Uuid) -> Result<Option<ProfileDetails>, ApiError> {
        Ok(self.store.get_details(id).await?)
    }

    async fn fetch(&self, id: Uuid) -> Result<Profile, ApiError> {
        self.store
            .get_profile(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("profile {id}")))
    }
}
