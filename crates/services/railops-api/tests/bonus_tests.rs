//! Attendance bonus derivation: rule coverage and idempotent re-runs.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use railops_api::bonus::BonusEngine;
use railops_api::models::ScheduleCell;
use railops_api::scoring::ScoringEngine;
use railops_api::store::memory::MemoryStore;
use railops_api::store::{AssessmentStore, EmployeeStore, RecordFilter, ScheduleStore, Store};
use railops_types::{Department, Employee, EmployeeCode};
use uuid::Uuid;

struct Fixture {
    store: Arc<MemoryStore>,
    engine: BonusEngine,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::with_builtin_standards());
    let dyn_store: Arc<dyn Store> = store.clone();
    let scoring = Arc::new(ScoringEngine::new(dyn_store.clone()));
    Fixture {
        store,
        engine: BonusEngine::new(dyn_store, scoring),
    }
}

fn code(n: u32) -> EmployeeCode {
    EmployeeCode::new(&format!("2305A{n:04}")).unwrap()
}

async fn seed_employee(store: &MemoryStore, employee: &EmployeeCode) {
    store
        .insert_employee(Employee {
            code: employee.clone(),
            name: format!("driver {employee}"),
            department: Department::Tanhai,
            is_resigned: false,
            phone: None,
            email: None,
        })
        .await
        .unwrap();
}

async fn seed_cell(store: &MemoryStore, employee: &EmployeeCode, day: u32, raw: &str) {
    store
        .upsert_cell(ScheduleCell {
            department: Department::Tanhai,
            employee_code: employee.clone(),
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            raw_text: raw.to_string(),
            sync_batch_id: Uuid::new_v4(),
            synced_at: Utc::now(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn full_month_and_r_shift_records_then_idempotent_rerun() {
    let fixture = fixture().await;

    // Ten full-attendance employees; five of them have one R/0905G day.
    for n in 1..=10 {
        let employee = code(n);
        seed_employee(&fixture.store, &employee).await;
        for day in 1..=28 {
            seed_cell(&fixture.store, &employee, day, "0905A").await;
        }
        if n <= 5 {
            seed_cell(&fixture.store, &employee, 15, "R/0905G").await;
        }
    }

    let first = fixture
        .engine
        .process(Department::Tanhai, 2026, 1, false)
        .await
        .unwrap();
    assert_eq!(first.created.get("+M01"), Some(&10));
    assert_eq!(first.created.get("+A01"), Some(&5));
    assert_eq!(first.total_created(), 15);
    assert!(first.skipped.is_empty());

    let second = fixture
        .engine
        .process(Department::Tanhai, 2026, 1, false)
        .await
        .unwrap();
    assert_eq!(second.total_created(), 0);
    assert_eq!(second.skipped.len(), 15);
}

#[tokio::test]
async fn composite_cell_yields_r_shift_and_overtime_records() {
    let fixture = fixture().await;
    let employee = code(1);
    seed_employee(&fixture.store, &employee).await;
    seed_cell(&fixture.store, &employee, 10, "R/0905G(+2)").await;
    seed_cell(&fixture.store, &employee, 11, "(假)特休").await;

    let report = fixture
        .engine
        .process(Department::Tanhai, 2026, 1, false)
        .await
        .unwrap();

    // The leave day kills +M01; the composite cell produces both +A01 and
    // the two-hour overtime +A04.
    assert_eq!(report.created.get("+M01"), None);
    assert_eq!(report.created.get("+A01"), Some(&1));
    assert_eq!(report.created.get("+A04"), Some(&1));

    let records = fixture
        .store
        .list_records(&RecordFilter::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    let a04 = records.iter().find(|r| r.standard_code == "+A04").unwrap();
    assert_eq!(a04.final_points.as_f64(), 1.0);
    assert!(a04.idempotency_key.is_some());
}

#[tokio::test]
async fn national_holiday_r_shift_and_overtime_tiers() {
    let fixture = fixture().await;
    let employee = code(7);
    seed_employee(&fixture.store, &employee).await;
    seed_cell(&fixture.store, &employee, 1, "R(國)/0712A").await;
    seed_cell(&fixture.store, &employee, 2, "0905A(+1)").await;
    seed_cell(&fixture.store, &employee, 3, "0905A(+4)").await;

    let report = fixture
        .engine
        .process(Department::Tanhai, 2026, 1, false)
        .await
        .unwrap();

    assert_eq!(report.created.get("+A02"), Some(&1));
    assert_eq!(report.created.get("+A03"), Some(&1));
    assert_eq!(report.created.get("+A06"), Some(&1));

    let records = fixture
        .store
        .list_records(&RecordFilter::default())
        .await
        .unwrap();
    let a03 = records.iter().find(|r| r.standard_code == "+A03").unwrap();
    assert_eq!(a03.final_points.as_f64(), 0.5);
    let a06 = records.iter().find(|r| r.standard_code == "+A06").unwrap();
    assert_eq!(a06.final_points.as_f64(), 2.0);
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let fixture = fixture().await;
    let employee = code(2);
    seed_employee(&fixture.store, &employee).await;
    seed_cell(&fixture.store, &employee, 5, "R/0905G").await;

    let report = fixture
        .engine
        .process(Department::Tanhai, 2026, 1, true)
        .await
        .unwrap();
    assert_eq!(report.total_created(), 2); // +M01 and +A01
    assert!(report.dry_run);

    let records = fixture
        .store
        .list_records(&RecordFilter::default())
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn unknown_employee_on_sheet_is_warned_but_processed() {
    let fixture = fixture().await;
    let employee = code(3);
    // Not seeded into the employee store.
    seed_cell(&fixture.store, &employee, 5, "R/0905G").await;

    let report = fixture
        .engine
        .process(Department::Tanhai, 2026, 1, false)
        .await
        .unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains(employee.as_str()));
    assert_eq!(report.created.get("+A01"), Some(&1));
}
