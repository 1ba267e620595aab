//! Scoring engine behavior: cumulative aggravation, fault coefficients,
//! soft-delete recomputation, and year-cohort boundaries.

use std::sync::Arc;

use chrono::NaiveDate;
use railops_api::scoring::{RecordDraft, ScoringEngine};
use railops_api::store::memory::MemoryStore;
use railops_api::store::{counter_key, AssessmentStore, RecordFilter, Store};
use railops_types::{CategoryCode, Department, EmployeeCode, FaultChecklist};

fn engine() -> (Arc<MemoryStore>, ScoringEngine) {
    let store = Arc::new(MemoryStore::with_builtin_standards());
    let dyn_store: Arc<dyn Store> = store.clone();
    (store.clone(), ScoringEngine::new(dyn_store))
}

fn employee() -> EmployeeCode {
    EmployeeCode::new("2305A0017").unwrap()
}

fn draft(standard: &str, date: NaiveDate) -> RecordDraft {
    RecordDraft {
        department: Department::Tanhai,
        employee_code: employee(),
        standard_code: standard.to_string(),
        event_date: date,
        checklist: None,
        profile_id: None,
        idempotency_key: None,
        actor: "test".to_string(),
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn checklist_with(flags_set: usize) -> FaultChecklist {
    let mut flags = vec![false; 9];
    for flag in flags.iter_mut().take(flags_set) {
        *flag = true;
    }
    FaultChecklist::new(flags, [None; 5], 0).unwrap()
}

#[tokio::test]
async fn cumulative_sequence_scores_minus_2_3_4() {
    let (_store, engine) = engine();

    let first = engine.apply_record(draft("S12", date(2026, 3, 1))).await.unwrap();
    let second = engine.apply_record(draft("S12", date(2026, 5, 1))).await.unwrap();
    let third = engine.apply_record(draft("S12", date(2026, 7, 1))).await.unwrap();

    assert_eq!(first.final_points.as_f64(), -2.0);
    assert_eq!(second.final_points.as_f64(), -3.0);
    assert_eq!(third.final_points.as_f64(), -4.0);
    assert_eq!(third.cumulative_multiplier.as_f64(), 2.0);
}

#[tokio::test]
async fn r_fault_major_responsibility_first_occurrence() {
    let (_store, engine) = engine();

    let mut d = draft("R04", date(2026, 4, 2));
    d.checklist = Some(checklist_with(5));
    let record = engine.apply_record(d).await.unwrap();

    assert_eq!(record.fault_coefficient.unwrap().coefficient(), 0.7);
    assert_eq!(record.cumulative_multiplier.as_f64(), 1.0);
    assert_eq!(record.final_points.as_f64(), -2.1);
}

#[tokio::test]
async fn r_fault_without_checklist_is_rejected() {
    let (_store, engine) = engine();
    let err = engine.apply_record(draft("R04", date(2026, 4, 2))).await.unwrap_err();
    assert!(err.to_string().contains("checklist"));
}

#[tokio::test]
async fn empty_checklist_is_rejected() {
    let (_store, engine) = engine();
    let mut d = draft("R04", date(2026, 4, 2));
    d.checklist = Some(checklist_with(0));
    assert!(engine.apply_record(d).await.is_err());
}

#[tokio::test]
async fn checklist_boundaries_drive_coefficients() {
    let (_store, engine) = engine();
    for (flags, expected) in [(3, 0.3), (4, 0.7), (7, 1.0), (9, 1.0)] {
        let mut d = draft("R02", date(2026, 1, flags as u32));
        d.checklist = Some(checklist_with(flags));
        let record = engine.apply_record(d).await.unwrap();
        assert_eq!(
            record.fault_coefficient.unwrap().coefficient(),
            expected,
            "{flags} flags"
        );
    }
}

#[tokio::test]
async fn soft_delete_recomputes_later_multipliers() {
    let (store, engine) = engine();

    let _first = engine.apply_record(draft("S12", date(2026, 3, 1))).await.unwrap();
    let second = engine.apply_record(draft("S12", date(2026, 5, 1))).await.unwrap();
    let third = engine.apply_record(draft("S12", date(2026, 7, 1))).await.unwrap();

    engine.delete_record(second.id).await.unwrap();

    let updated_third = store.get_record(third.id).await.unwrap().unwrap();
    assert_eq!(updated_third.cumulative_multiplier.as_f64(), 1.5);
    assert_eq!(updated_third.final_points.as_f64(), -3.0);

    let key = counter_key(&employee(), CategoryCode::Safety, 2026);
    assert_eq!(store.counter_value(&key).await.unwrap(), 2);
}

#[tokio::test]
async fn out_of_order_insert_restores_event_date_ranks() {
    let (store, engine) = engine();

    let july = engine.apply_record(draft("S12", date(2026, 7, 1))).await.unwrap();
    let march = engine.apply_record(draft("S12", date(2026, 3, 1))).await.unwrap();

    // March is rank 1 even though it was inserted second.
    assert_eq!(march.cumulative_multiplier.as_f64(), 1.0);
    let updated_july = store.get_record(july.id).await.unwrap().unwrap();
    assert_eq!(updated_july.cumulative_multiplier.as_f64(), 1.5);
}

#[tokio::test]
async fn year_boundary_records_are_each_rank_one() {
    let (_store, engine) = engine();

    let december = engine.apply_record(draft("S12", date(2025, 12, 31))).await.unwrap();
    let january = engine.apply_record(draft("S12", date(2026, 1, 1))).await.unwrap();

    assert_eq!(december.cumulative_multiplier.as_f64(), 1.0);
    assert_eq!(january.cumulative_multiplier.as_f64(), 1.0);
}

#[tokio::test]
async fn non_cumulative_standards_never_aggravate() {
    let (_store, engine) = engine();

    let first = engine.apply_record(draft("S13", date(2026, 2, 1))).await.unwrap();
    let second = engine.apply_record(draft("S13", date(2026, 6, 1))).await.unwrap();
    assert_eq!(first.final_points.as_f64(), -3.0);
    assert_eq!(second.final_points.as_f64(), -3.0);
    assert_eq!(second.cumulative_multiplier.as_f64(), 1.0);
}

#[tokio::test]
async fn date_move_across_year_boundary_recomputes_both_cohorts() {
    let (store, engine) = engine();

    let a = engine.apply_record(draft("S12", date(2026, 2, 1))).await.unwrap();
    let b = engine.apply_record(draft("S12", date(2026, 6, 1))).await.unwrap();
    assert_eq!(b.cumulative_multiplier.as_f64(), 1.5);

    // Move the February record back into 2025: the 2026 cohort shrinks to
    // one and the moved record becomes 2025's rank 1.
    engine.move_record_date(a.id, date(2025, 2, 1)).await.unwrap();

    let moved = store.get_record(a.id).await.unwrap().unwrap();
    assert_eq!(moved.event_date, date(2025, 2, 1));
    assert_eq!(moved.cumulative_multiplier.as_f64(), 1.0);

    let remaining = store.get_record(b.id).await.unwrap().unwrap();
    assert_eq!(remaining.cumulative_multiplier.as_f64(), 1.0);
    assert_eq!(remaining.final_points.as_f64(), -2.0);

    let old_key = counter_key(&employee(), CategoryCode::Safety, 2026);
    let new_key = counter_key(&employee(), CategoryCode::Safety, 2025);
    assert_eq!(store.counter_value(&old_key).await.unwrap(), 1);
    assert_eq!(store.counter_value(&new_key).await.unwrap(), 1);
}

#[tokio::test]
async fn rank_invariant_holds_after_mixed_operations() {
    let (store, engine) = engine();

    let mut ids = Vec::new();
    for day in [5, 12, 19, 26] {
        let record = engine.apply_record(draft("W01", date(2026, 1, day))).await.unwrap();
        ids.push(record.id);
    }
    engine.delete_record(ids[1]).await.unwrap();
    engine.delete_record(ids[2]).await.unwrap();
    let _late = engine.apply_record(draft("W01", date(2026, 1, 8))).await.unwrap();

    let key = counter_key(&employee(), CategoryCode::WorkRules, 2026);
    let live = store.live_triple_records(&key).await.unwrap();
    assert_eq!(live.len(), 3);
    for (index, record) in live.iter().enumerate() {
        let expected = 1.0 + 0.5 * index as f64;
        assert_eq!(
            record.cumulative_multiplier.as_f64(),
            expected,
            "rank {} of {:?}",
            index + 1,
            record.event_date
        );
    }
    assert_eq!(store.counter_value(&key).await.unwrap(), 3);
}

#[tokio::test]
async fn concurrent_scoring_for_one_triple_serializes() {
    let (store, engine) = engine();
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for day in 1..=10u32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.apply_record(draft("D01", date(2026, 3, day))).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let key = counter_key(&employee(), CategoryCode::Driving, 2026);
    assert_eq!(store.counter_value(&key).await.unwrap(), 10);
    let live = store.live_triple_records(&key).await.unwrap();
    let multipliers: Vec<f64> = live.iter().map(|r| r.cumulative_multiplier.as_f64()).collect();
    let expected: Vec<f64> = (0..10).map(|i| 1.0 + 0.5 * i as f64).collect();
    assert_eq!(multipliers, expected);
}

#[tokio::test]
async fn scoring_identity_holds_for_catalog_samples() {
    let (store, engine) = engine();

    let mut d = draft("R03", date(2026, 9, 9));
    d.checklist = Some(checklist_with(2));
    let record = engine.apply_record(d).await.unwrap();

    let coefficient = record.fault_coefficient.map(|c| c.coefficient()).unwrap_or(1.0);
    let expected =
        record.base_points.as_f64() * coefficient * record.cumulative_multiplier.as_f64();
    assert!((record.final_points.as_f64() - expected).abs() < 0.05);

    let all = store
        .list_records(&RecordFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}
