//! Profile lifecycle: conversion, document generation, completion
//! handshake, optimistic concurrency, and the admin reset.

use std::sync::Arc;

use chrono::NaiveDate;
use railops_api::auth::CurrentUser;
use railops_api::models::{
    CompleteProfileRequest, ConvertProfileRequest, CreateProfileRequest, EventInvestigationForm,
    PendingStatus, ProfileDetails, Role, UpdateProfileRequest,
};
use railops_api::profiles::ProfileService;
use railops_api::render::render_document;
use railops_api::scoring::ScoringEngine;
use railops_api::store::memory::MemoryStore;
use railops_api::store::{EmployeeStore, PendingCaseStore, ProfileStore, Store};
use railops_types::{ConversionStatus, Department, Employee, EmployeeCode, ProfileType};
use uuid::Uuid;

struct Fixture {
    store: Arc<MemoryStore>,
    service: ProfileService,
    admin: CurrentUser,
    staff: CurrentUser,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::with_builtin_standards());
    let dyn_store: Arc<dyn Store> = store.clone();
    let scoring = Arc::new(ScoringEngine::new(dyn_store.clone()));
    store
        .insert_employee(Employee {
            code: EmployeeCode::new("2305A0017").unwrap(),
            name: "林小明".to_string(),
            department: Department::Tanhai,
            is_resigned: false,
            phone: None,
            email: None,
        })
        .await
        .unwrap();
    Fixture {
        store,
        service: ProfileService::new(dyn_store, scoring),
        admin: CurrentUser {
            id: Uuid::new_v4(),
            username: "admin".to_string(),
            role: Role::Admin,
            department: None,
        },
        staff: CurrentUser {
            id: Uuid::new_v4(),
            username: "tanhai-staff".to_string(),
            role: Role::Staff,
            department: Some(Department::Tanhai),
        },
    }
}

fn create_request() -> CreateProfileRequest {
    CreateProfileRequest {
        department: Department::Tanhai,
        employee_code: EmployeeCode::new("2305A0017").unwrap(),
        event_date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
        event_time: None,
        event_location: Some("紅樹林站".to_string()),
        train_number: Some("0905".to_string()),
        event_title: None,
        event_description: "進站超速".to_string(),
    }
}

fn investigation_details() -> ProfileDetails {
    ProfileDetails::EventInvestigation(EventInvestigationForm {
        summary: "進站超速 5 km/h".to_string(),
        cause_analysis: "注意力分散".to_string(),
        handling_process: "當場提醒".to_string(),
        improvement_actions: "加強宣導".to_string(),
        checklist: None,
    })
}

#[tokio::test]
async fn happy_path_create_convert_render_complete() {
    let fixture = fixture().await;

    let profile = fixture
        .service
        .create(&fixture.staff, create_request())
        .await
        .unwrap();
    assert_eq!(profile.profile_type, ProfileType::Basic);
    assert_eq!(profile.conversion_status, ConversionStatus::Pending);
    assert_eq!(profile.version, 1);

    let converted = fixture
        .service
        .convert(
            &fixture.staff,
            profile.id,
            ConvertProfileRequest {
                expected_version: 1,
                details: investigation_details(),
            },
        )
        .await
        .unwrap();
    assert_eq!(converted.conversion_status, ConversionStatus::Converted);
    assert_eq!(converted.profile_type, ProfileType::EventInvestigation);
    assert_eq!(converted.version, 2);

    let case = fixture
        .store
        .case_for_profile(profile.id)
        .await
        .unwrap()
        .expect("conversion opens a pending case");
    assert_eq!(case.status, PendingStatus::Pending);

    // Document generation is idempotent and transition-free.
    let details = fixture.service.details(profile.id).await.unwrap().unwrap();
    let document = render_document(&converted, &details, "林小明").unwrap();
    assert_eq!(&document.bytes[..2], b"PK");
    let again = fixture.store.get_profile(profile.id).await.unwrap().unwrap();
    assert_eq!(again.conversion_status, ConversionStatus::Converted);

    let completed = fixture
        .service
        .mark_complete(
            &fixture.staff,
            profile.id,
            CompleteProfileRequest {
                drive_link: "https://drive.example/abc123".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(completed.conversion_status, ConversionStatus::Completed);
    assert_eq!(completed.drive_link.as_deref(), Some("https://drive.example/abc123"));

    let closed = fixture
        .store
        .case_for_profile(profile.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed.status, PendingStatus::Uploaded);
    assert!(closed.completed_at.is_some());
}

#[tokio::test]
async fn conversion_is_one_way() {
    let fixture = fixture().await;
    let profile = fixture
        .service
        .create(&fixture.staff, create_request())
        .await
        .unwrap();
    fixture
        .service
        .convert(
            &fixture.staff,
            profile.id,
            ConvertProfileRequest {
                expected_version: 1,
                details: investigation_details(),
            },
        )
        .await
        .unwrap();

    // A second conversion conflicts regardless of version.
    let err = fixture
        .service
        .convert(
            &fixture.staff,
            profile.id,
            ConvertProfileRequest {
                expected_version: 2,
                details: investigation_details(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already"));
}

#[tokio::test]
async fn stale_version_update_conflicts() {
    let fixture = fixture().await;
    let profile = fixture
        .service
        .create(&fixture.staff, create_request())
        .await
        .unwrap();

    let patch = UpdateProfileRequest {
        expected_version: 99,
        event_date: None,
        event_time: None,
        event_location: None,
        train_number: None,
        event_title: None,
        event_description: Some("edited".to_string()),
    };
    let err = fixture
        .service
        .update(&fixture.staff, profile.id, patch)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("version"));
}

#[tokio::test]
async fn cross_department_staff_cannot_write() {
    let fixture = fixture().await;
    let ankeng_staff = CurrentUser {
        id: Uuid::new_v4(),
        username: "ankeng-staff".to_string(),
        role: Role::Staff,
        department: Some(Department::Ankeng),
    };
    let err = fixture
        .service
        .create(&ankeng_staff, create_request())
        .await
        .unwrap_err();
    assert!(err.to_string().to_lowercase().contains("department"));
}

#[tokio::test]
async fn admin_reset_returns_to_basic_and_drops_case() {
    let fixture = fixture().await;
    let profile = fixture
        .service
        .create(&fixture.staff, create_request())
        .await
        .unwrap();
    fixture
        .service
        .convert(
            &fixture.staff,
            profile.id,
            ConvertProfileRequest {
                expected_version: 1,
                details: investigation_details(),
            },
        )
        .await
        .unwrap();

    // Non-admin reset is refused.
    assert!(fixture
        .service
        .admin_reset(&fixture.staff, profile.id)
        .await
        .is_err());

    let reset = fixture
        .service
        .admin_reset(&fixture.admin, profile.id)
        .await
        .unwrap();
    assert_eq!(reset.profile_type, ProfileType::Basic);
    assert_eq!(reset.conversion_status, ConversionStatus::Pending);
    assert!(fixture
        .store
        .case_for_profile(profile.id)
        .await
        .unwrap()
        .is_none());
    assert!(fixture.service.details(profile.id).await.unwrap().is_none());
}

#[tokio::test]
async fn completion_requires_conversion_first() {
    let fixture = fixture().await;
    let profile = fixture
        .service
        .create(&fixture.staff, create_request())
        .await
        .unwrap();
    let err = fixture
        .service
        .mark_complete(
            &fixture.staff,
            profile.id,
            CompleteProfileRequest {
                drive_link: "https://drive.example/abc".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("basic"));
}
