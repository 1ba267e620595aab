//! Schedule sync orchestration against a mocked spreadsheet service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use railops_api::google::{ServiceAccounts, SheetsClient};
use railops_api::store::memory::MemoryStore;
use railops_api::store::ScheduleStore;
use railops_api::sync::{SyncKind, SyncService, SyncStatus};
use railops_types::{Department, EmployeeCode};
use serde_json::json;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sheet_rows() -> serde_json::Value {
    let mut header = vec!["員工編號".to_string(), "姓名".to_string()];
    header.extend((1..=31).map(|d| d.to_string()));
    json!({
        "range": "11501班表",
        "majorDimension": "ROWS",
        "values": [
            ["淡海輕軌 115年01月班表"],
            header,
            ["2305A0017", "林小明", "0905A", "R/0905G(+2)", "", "(假)特休"],
            ["2311B0042", "陳大文", "", "0712A", "R(國)/0712A"],
        ]
    })
}

async fn service(
    server: &MockServer,
) -> (Arc<MemoryStore>, Arc<SyncService>) {
    let store = Arc::new(MemoryStore::new());
    let sheets = Arc::new(
        SheetsClient::new(server.uri(), Arc::new(ServiceAccounts::default()))
            .with_static_token("test-token"),
    );
    let mut sheet_ids = HashMap::new();
    sheet_ids.insert(Department::Tanhai, "sheet-123".to_string());
    let sync = SyncService::start(2, store.clone(), sheets, sheet_ids);
    (store, sync)
}

#[tokio::test]
async fn sync_parses_header_and_upserts_cells() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/v4/spreadsheets/sheet-123/values/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sheet_rows()))
        .mount(&server)
        .await;

    let (store, sync) = service(&server).await;
    let refs = sync
        .start_sync(SyncKind::Attendance, vec![Department::Tanhai], 2026, 1, "tester")
        .unwrap();
    assert_eq!(refs.len(), 1);

    let task = sync
        .await_task(refs[0].task_id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(task.status, SyncStatus::Completed);
    assert_eq!(task.total_rows, 2);
    // Five non-empty cells across the two employee rows.
    assert_eq!(task.success_count, 5);
    assert_eq!(task.error_count, 0);

    let cell = store
        .get_cell(
            Department::Tanhai,
            &EmployeeCode::new("2305A0017").unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cell.raw_text, "R/0905G(+2)");
}

#[tokio::test]
async fn rerun_is_idempotent_and_still_counts_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/v4/spreadsheets/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sheet_rows()))
        .mount(&server)
        .await;

    let (store, sync) = service(&server).await;
    for _ in 0..2 {
        let refs = sync
            .start_sync(SyncKind::Attendance, vec![Department::Tanhai], 2026, 1, "tester")
            .unwrap();
        let task = sync
            .await_task(refs[0].task_id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(task.status, SyncStatus::Completed);
        assert_eq!(task.success_count, 5);
    }

    let cells = store
        .month_cells(Department::Tanhai, 2026, 1)
        .await
        .unwrap();
    assert_eq!(cells.len(), 5);
}

#[tokio::test]
async fn concurrent_requests_join_the_running_task() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/v4/spreadsheets/.*$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(sheet_rows())
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (_store, sync) = service(&server).await;
    let first = sync
        .start_sync(SyncKind::Attendance, vec![Department::Tanhai], 2026, 1, "a")
        .unwrap();
    let second = sync
        .start_sync(SyncKind::Attendance, vec![Department::Tanhai], 2026, 1, "b")
        .unwrap();

    assert!(!first[0].joined);
    assert!(second[0].joined);
    assert_eq!(first[0].task_id, second[0].task_id);

    sync.await_task(first[0].task_id, Duration::from_secs(5))
        .await
        .unwrap();
}

#[tokio::test]
async fn malformed_employee_rows_complete_with_errors() {
    let server = MockServer::start().await;
    let mut header = vec!["員工編號".to_string(), "姓名".to_string()];
    header.extend((1..=31).map(|d| d.to_string()));
    let body = json!({
        "values": [
            header,
            ["not-a-code", "壞資料", "0905A"],
            ["2305A0017", "林小明", "0905A"],
        ]
    });
    Mock::given(method("GET"))
        .and(path_regex("^/v4/spreadsheets/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let (_store, sync) = service(&server).await;
    let refs = sync
        .start_sync(SyncKind::Attendance, vec![Department::Tanhai], 2026, 1, "tester")
        .unwrap();
    let task = sync
        .await_task(refs[0].task_id, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(task.status, SyncStatus::CompletedWithErrors);
    assert_eq!(task.success_count, 1);
    assert!(task.error_count > 0);
    assert!(task.errors.iter().any(|e| e.contains("not-a-code")));
}

#[tokio::test]
async fn missing_tab_fails_the_task() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/v4/spreadsheets/.*$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (_store, sync) = service(&server).await;
    let refs = sync
        .start_sync(SyncKind::Attendance, vec![Department::Tanhai], 2026, 1, "tester")
        .unwrap();
    let task = sync
        .await_task(refs[0].task_id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(task.status, SyncStatus::Failed);
    assert!(!task.errors.is_empty());
}

#[tokio::test]
async fn department_without_spreadsheet_fails_cleanly() {
    let server = MockServer::start().await;
    let (_store, sync) = service(&server).await;
    let refs = sync
        .start_sync(SyncKind::Attendance, vec![Department::Ankeng], 2026, 1, "tester")
        .unwrap();
    let task = sync
        .await_task(refs[0].task_id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(task.status, SyncStatus::Failed);
    assert!(task.errors[0].contains("no spreadsheet configured"));
}

#[tokio::test]
async fn invalid_month_is_rejected_at_submission() {
    let server = MockServer::start().await;
    let (_store, sync) = service(&server).await;
    let err = sync
        .start_sync(SyncKind::Attendance, vec![Department::Tanhai], 2026, 13, "tester")
        .unwrap_err();
    assert!(err.to_string().contains("month"));
}
