use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Datelike, NaiveDate, Utc};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use railops_types::{
    AssessmentStandard, CumulativeMultiplier, Department, EmployeeCode, FaultChecklist, Points,
    Responsibility,
};

use crate::error::ApiError;
use crate::models::{AssessmentRecord, CounterKey};
use crate::store::{AssessmentStore, ChecklistUpdate, RecordRescore, ScoringCommit, Store};

/// Draft of one scoring operation.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub department: Department,
    pub employee_code: EmployeeCode,
    pub standard_code: String,
    pub event_date: NaiveDate,
    pub checklist: Option<FaultChecklist>,
    pub profile_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
    pub actor: String,
}

/// Per-key async locks serializing everything that depends on one
/// cumulative counter. The Postgres store additionally takes `FOR UPDATE`
/// on the counter row inside its transaction.
#[derive(Default)]
struct CounterLocks {
    map: Mutex<HashMap<CounterKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl CounterLocks {
    async fn acquire(&self, key: &CounterKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.map.lock().expect("counter lock map poisoned");
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Acquire several keys in a canonical order so concurrent cross-year
    /// moves cannot deadlock.
    async fn acquire_many(&self, keys: &mut Vec<CounterKey>) -> Vec<OwnedMutexGuard<()>> {
        keys.sort_by(|a, b| {
            (a.year, a.category.as_str(), a.employee_code.as_str()).cmp(&(
                b.year,
                b.category.as_str(),
                b.employee_code.as_str(),
            ))
        });
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys.iter() {
            guards.push(self.acquire(key).await);
        }
        guards
    }
}

/// Rule-driven scoring state machine over assessment records and their
/// year-cohort counters.
pub struct ScoringEngine {
    store: Arc<dyn Store>,
    locks: CounterLocks,
}

impl ScoringEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        ScoringEngine {
            store,
            locks: CounterLocks::default(),
        }
    }

    /// Score and persist one draft.
    pub async fn apply_record(&self, draft: RecordDraft) -> Result<AssessmentRecord, ApiError> {
        let standard = self
            .store
            .get_standard(&draft.standard_code)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(format!("assessment standard {}", draft.standard_code))
            })?;

        let fault_coefficient = resolve_coefficient(&standard, draft.checklist.as_ref())?;

        let mut record = AssessmentRecord {
            id: Uuid::new_v4(),
            department: draft.department,
            employee_code: draft.employee_code.clone(),
            standard_code: standard.code.clone(),
            category: standard.category,
            event_date: draft.event_date,
            base_points: standard.base_points,
            fault_coefficient,
            cumulative_multiplier: CumulativeMultiplier::IDENTITY,
            final_points: Points::ZERO,
            profile_id: draft.profile_id,
            idempotency_key: draft.idempotency_key,
            checklist: draft.checklist,
            is_deleted: false,
            created_by: draft.actor,
            created_at: Utc::now(),
        };

        if !standard.has_cumulative {
            record.final_points = compute_final(
                record.base_points,
                record.fault_coefficient,
                CumulativeMultiplier::IDENTITY,
            );
            self.store
                .commit_scoring(ScoringCommit {
                    insert: Some(record.clone()),
                    ..ScoringCommit::default()
                })
                .await?;
            return Ok(record);
        }

        let key = CounterKey {
            employee_code: record.employee_code.clone(),
            category: record.category,
            year: record.event_date.year(),
        };
        let _guard = self.locks.acquire(&key).await;

        let live = self.store.live_triple_records(&key).await?;
        let standards = self.standards_for(&live).await?;

        // Rank the new record among the live cumulative ones by event date;
        // anything it displaces gets rescored in the same transaction.
        let mut cohort: Vec<(Uuid, NaiveDate, Points, Option<Responsibility>)> = live
            .iter()
            .filter(|r| is_cumulative(&standards, r))
            .map(|r| (r.id, r.event_date, r.base_points, r.fault_coefficient))
            .collect();
        let position = cohort
            .iter()
            .position(|(_, date, _, _)| *date > record.event_date)
            .unwrap_or(cohort.len());
        cohort.insert(
            position,
            (
                record.id,
                record.event_date,
                record.base_points,
                record.fault_coefficient,
            ),
        );

        let mut rescores = Vec::new();
        for (rank0, (id, _, base, coef)) in cohort.iter().enumerate() {
            let multiplier = CumulativeMultiplier::for_rank(rank0 as u32 + 1);
            let final_points = compute_final(*base, *coef, multiplier);
            if *id == record.id {
                record.cumulative_multiplier = multiplier;
                record.final_points = final_points;
            } else {
                let existing = live.iter().find(|r| r.id == *id);
                let unchanged = existing.map_or(false, |r| {
                    r.cumulative_multiplier == multiplier && r.final_points == final_points
                });
                if !unchanged {
                    rescores.push(RecordRescore {
                        id: *id,
                        cumulative_multiplier: multiplier,
                        final_points,
                        event_date: None,
                    });
                }
            }
        }

        let counter_value = cohort.len() as u32;
        self.store
            .commit_scoring(ScoringCommit {
                insert: Some(record.clone()),
                rescores,
                counters: vec![(key, counter_value)],
                ..ScoringCommit::default()
            })
            .await?;
        Ok(record)
    }

    /// Soft-delete one record and restore the rank invariant for the rest
    /// of its cohort.
    pub async fn delete_record(&self, id: Uuid) -> Result<(), ApiError> {
        let record = self
            .store
            .get_record(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("assessment record {id}")))?;
        if record.is_deleted {
            return Ok(());
        }

        let key = CounterKey {
            employee_code: record.employee_code.clone(),
            category: record.category,
            year: record.event_date.year(),
        };
        let _guard = self.locks.acquire(&key).await;

        let live = self.store.live_triple_records(&key).await?;
        let standards = self.standards_for(&live).await?;
        let remaining: Vec<&AssessmentRecord> = live
            .iter()
            .filter(|r| r.id != id && is_cumulative(&standards, r))
            .collect();

        let rescores = rescore_cohort(&remaining);
        self.store
            .commit_scoring(ScoringCommit {
                soft_delete: Some(id),
                rescores,
                counters: vec![(key, remaining.len() as u32)],
                ..ScoringCommit::default()
            })
            .await?;
        Ok(())
    }

    /// Replace the fault checklist on an r-fault record and rescore it. The
    /// multiplier is untouched: responsibility does not change rank.
    pub async fn update_checklist(
        &self,
        id: Uuid,
        checklist: FaultChecklist,
    ) -> Result<AssessmentRecord, ApiError> {
        let mut record = self
            .store
            .get_record(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("assessment record {id}")))?;
        if record.is_deleted {
            return Err(ApiError::Conflict("record is deleted".to_string()));
        }
        let standard = self
            .store
            .get_standard(&record.standard_code)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(format!("assessment standard {}", record.standard_code))
            })?;
        if !standard.is_r_fault_type {
            return Err(ApiError::validation(
                "fault responsibility applies only to r-fault records",
            ));
        }

        let coefficient = Some(checklist.responsibility()?);
        let key = CounterKey {
            employee_code: record.employee_code.clone(),
            category: record.category,
            year: record.event_date.year(),
        };
        let _guard = self.locks.acquire(&key).await;

        record.fault_coefficient = coefficient;
        record.checklist = Some(checklist);
        record.final_points = compute_final(
            record.base_points,
            record.fault_coefficient,
            record.cumulative_multiplier,
        );

        let checklist = record
            .checklist
            .clone()
            .ok_or_else(|| ApiError::internal("checklist just set"))?;
        self.store
            .commit_scoring(ScoringCommit {
                rescores: vec![RecordRescore {
                    id: record.id,
                    cumulative_multiplier: record.cumulative_multiplier,
                    final_points: record.final_points,
                    event_date: None,
                }],
                checklist_update: Some(ChecklistUpdate {
                    id: record.id,
                    checklist,
                    coefficient: record.fault_coefficient,
                }),
                ..ScoringCommit::default()
            })
            .await?;
        Ok(record)
    }

    /// Move a record to a new event date, rescoring both affected year
    /// cohorts when the move crosses a year boundary.
    pub async fn move_record_date(
        &self,
        id: Uuid,
        new_date: NaiveDate,
    ) -> Result<(), ApiError> {
        let record = self
            .store
            .get_record(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("assessment record {id}")))?;
        if record.is_deleted || record.event_date == new_date {
            return Ok(());
        }

        let old_key = CounterKey {
            employee_code: record.employee_code.clone(),
            category: record.category,
            year: record.event_date.year(),
        };
        let new_key = CounterKey {
            employee_code: record.employee_code.clone(),
            category: record.category,
            year: new_date.year(),
        };

        let mut keys = vec![old_key.clone(), new_key.clone()];
        let _guards = self.locks.acquire_many(&mut keys).await;

        let live_old = self.store.live_triple_records(&old_key).await?;
        let standards = self.standards_for(&live_old).await?;
        let record_is_cumulative = live_old
            .iter()
            .find(|r| r.id == id)
            .map_or(false, |r| is_cumulative(&standards, r));

        if !record_is_cumulative {
            // Nothing rank-related changes; just move the date.
            self.store
                .commit_scoring(ScoringCommit {
                    rescores: vec![RecordRescore {
                        id,
                        cumulative_multiplier: record.cumulative_multiplier,
                        final_points: record.final_points,
                        event_date: Some(new_date),
                    }],
                    ..ScoringCommit::default()
                })
                .await?;
            return Ok(());
        }

        if old_key.year == new_key.year {
            // Same cohort, possibly a new rank.
            let mut cohort: Vec<(Uuid, NaiveDate, Points, Option<Responsibility>)> = live_old
                .iter()
                .filter(|r| is_cumulative(&standards, r))
                .map(|r| {
                    let date = if r.id == id { new_date } else { r.event_date };
                    (r.id, date, r.base_points, r.fault_coefficient)
                })
                .collect();
            cohort.sort_by_key(|(_, date, _, _)| *date);

            let mut rescores = Vec::new();
            for (rank0, (rid, date, base, coef)) in cohort.iter().enumerate() {
                let multiplier = CumulativeMultiplier::for_rank(rank0 as u32 + 1);
                let final_points = compute_final(*base, *coef, multiplier);
                rescores.push(RecordRescore {
                    id: *rid,
                    cumulative_multiplier: multiplier,
                    final_points,
                    event_date: (*rid == id).then_some(*date),
                });
            }
            self.store
                .commit_scoring(ScoringCommit {
                    rescores,
                    counters: vec![(old_key, cohort.len() as u32)],
                    ..ScoringCommit::default()
                })
                .await?;
            return Ok(());
        }

        // Cross-year move: leave the old cohort, join the new one.
        let live_new = self.store.live_triple_records(&new_key).await?;
        let standards_new = self.standards_for(&live_new).await?;

        let remaining_old: Vec<&AssessmentRecord> = live_old
            .iter()
            .filter(|r| r.id != id && is_cumulative(&standards, r))
            .collect();
        let mut rescores = rescore_cohort(&remaining_old);

        let mut new_cohort: Vec<(Uuid, NaiveDate, Points, Option<Responsibility>)> = live_new
            .iter()
            .filter(|r| is_cumulative(&standards_new, r))
            .map(|r| (r.id, r.event_date, r.base_points, r.fault_coefficient))
            .collect();
        let position = new_cohort
            .iter()
            .position(|(_, date, _, _)| *date > new_date)
            .unwrap_or(new_cohort.len());
        new_cohort.insert(
            position,
            (id, new_date, record.base_points, record.fault_coefficient),
        );
        for (rank0, (rid, date, base, coef)) in new_cohort.iter().enumerate() {
            let multiplier = CumulativeMultiplier::for_rank(rank0 as u32 + 1);
            let final_points = compute_final(*base, *coef, multiplier);
            let existing = live_new.iter().find(|r| r.id == *rid);
            let unchanged = *rid != id
                && existing.map_or(false, |r| {
                    r.cumulative_multiplier == multiplier && r.final_points == final_points
                });
            if !unchanged {
                rescores.push(RecordRescore {
                    id: *rid,
                    cumulative_multiplier: multiplier,
                    final_points,
                    event_date: (*rid == id).then_some(*date),
                });
            }
        }

        self.store
            .commit_scoring(ScoringCommit {
                rescores,
                counters: vec![
                    (old_key, remaining_old.len() as u32),
                    (new_key, new_cohort.len() as u32),
                ],
                ..ScoringCommit::default()
            })
            .await?;
        Ok(())
    }

    /// January reset: archive the prior year's counters. Current-year
    /// counters are created on first use and start at zero.
    pub async fn close_year(&self, year: i32) -> Result<u32, ApiError> {
        let closed = self.store.close_counters(year).await?;
        tracing::info!(year, closed, "closed cumulative counters");
        Ok(closed)
    }

    async fn standards_for(
        &self,
        records: &[AssessmentRecord],
    ) -> Result<HashMap<String, AssessmentStandard>, ApiError> {
        let mut standards = HashMap::new();
        for record in records {
            if !standards.contains_key(&record.standard_code) {
                if let Some(standard) = self.store.get_standard(&record.standard_code).await? {
                    standards.insert(record.standard_code.clone(), standard);
                }
            }
        }
        Ok(standards)
    }
}

fn is_cumulative(standards: &HashMap<String, AssessmentStandard>, record: &AssessmentRecord) -> bool {
    standards
        .get(&record.standard_code)
        .map_or(false, |s| s.has_cumulative)
}

fn rescore_cohort(records: &[&AssessmentRecord]) -> Vec<RecordRescore> {
    let mut rescores = Vec::new();
    for (rank0, record) in records.iter().enumerate() {
        let multiplier = CumulativeMultiplier::for_rank(rank0 as u32 + 1);
        let final_points = compute_final(
            record.base_points,
            record.fault_coefficient,
            multiplier,
        );
        if record.cumulative_multiplier != multiplier || record.final_points != final_points {
            rescores.push(RecordRescore {
                id: record.id,
                cumulative_multiplier: multiplier,
                final_points,
                event_date: None,
            });
        }
    }
    rescores
}

fn resolve_coefficient(
    standard: &AssessmentStandard,
    checklist: Option<&FaultChecklist>,
) -> Result<Option<Responsibility>, ApiError> {
    if standard.is_r_fault_type {
        let checklist = checklist.ok_or_else(|| {
            ApiError::validation(format!(
                "standard {} requires a fault checklist",
                standard.code
            ))
        })?;
        Ok(Some(checklist.responsibility()?))
    } else {
        Ok(None)
    }
}

/// `base × coefficient × multiplier` with one half-away-from-zero rounding
/// back to tenths. Absent coefficients multiply as 1.0.
fn compute_final(
    base: Points,
    coefficient: Option<Responsibility>,
    multiplier: CumulativeMultiplier,
) -> Points {
    let coefficient_tenths = coefficient.map(|c| c.coefficient_tenths()).unwrap_or(10);
    base.mul_ratio(coefficient_tenths * multiplier.halves(), 20)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_points_single_rounding() {
        // R04: -3.0 × 0.7 × 1.0 = -2.1
        let base = Points::from_tenths(-30);
        assert_eq!(
            compute_final(base, Some(Responsibility::Major), CumulativeMultiplier::IDENTITY)
                .as_f64(),
            -2.1
        );
        // S12 third occurrence: -2.0 × 1.0 × 2.0 = -4.0
        let s12 = Points::from_tenths(-20);
        assert_eq!(
            compute_final(s12, None, CumulativeMultiplier::for_rank(3)).as_f64(),
            -4.0
        );
        // -0.5 × 0.3 × 1.5 = -0.225 → -0.2 (one rounding, half away)
        let half = Points::from_tenths(-5);
        assert_eq!(
            compute_final(half, Some(Responsibility::Minor), CumulativeMultiplier::for_rank(2))
                .as_f64(),
            -0.2
        );
    }
}
