use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use railops_types::{Department, EmployeeCode, ShiftToken};

use crate::error::ApiError;
use crate::scoring::{RecordDraft, ScoringEngine};
use crate::store::{idempotency_key, AssessmentStore, EmployeeStore, ScheduleStore, Store};

const FULL_MONTH_CODE: &str = "+M01";
const R_SHIFT_CODE: &str = "+A01";
const NATIONAL_HOLIDAY_R_SHIFT_CODE: &str = "+A02";

/// Outcome of one bonus run.
#[derive(Debug, Clone, Serialize)]
pub struct BonusReport {
    pub department: Department,
    pub year: i32,
    pub month: u32,
    pub dry_run: bool,
    /// Records written (or, on a dry run, that would be written) by code.
    pub created: BTreeMap<String, u32>,
    /// Idempotency keys that already existed and were skipped.
    pub skipped: Vec<String>,
    pub warnings: Vec<String>,
}

impl BonusReport {
    pub fn total_created(&self) -> u32 {
        self.created.values().sum()
    }
}

#[derive(Debug, Clone)]
struct Proposal {
    employee: EmployeeCode,
    code: &'static str,
    event_date: NaiveDate,
    date_slot: String,
}

/// Attendance bonus derivation: walks a department's month of schedule
/// cells and emits +M01/+A01/+A02 and overtime records idempotently.
/// Monthly +M02/+M03 are the reward engine's, never derived here.
pub struct BonusEngine {
    store: Arc<dyn Store>,
    scoring: Arc<ScoringEngine>,
}

impl BonusEngine {
    pub fn new(store: Arc<dyn Store>, scoring: Arc<ScoringEngine>) -> Self {
        BonusEngine { store, scoring }
    }

    pub async fn process(
        &self,
        department: Department,
        year: i32,
        month: u32,
        dry_run: bool,
    ) -> Result<BonusReport, ApiError> {
        let cells = self.store.month_cells(department, year, month).await?;

        let mut report = BonusReport {
            department,
            year,
            month,
            dry_run,
            created: BTreeMap::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
        };

        let mut by_employee: BTreeMap<EmployeeCode, Vec<(NaiveDate, ShiftToken)>> =
            BTreeMap::new();
        for cell in &cells {
            by_employee
                .entry(cell.employee_code.clone())
                .or_default()
                .push((cell.date, ShiftToken::parse(&cell.raw_text)));
        }

        let month_end = last_day_of_month(year, month)
            .ok_or_else(|| ApiError::validation(format!("invalid month {year}-{month:02}")))?;

        let mut proposals = Vec::new();
        for (employee, days) in &by_employee {
            if self.store.get_employee(employee).await?.is_none() {
                report
                    .warnings
                    .push(format!("unknown employee {employee} on the schedule sheet"));
            }

            // Full month attendance: no leave marker anywhere in the month.
            if !days.iter().any(|(_, token)| token.is_off()) {
                proposals.push(Proposal {
                    employee: employee.clone(),
                    code: FULL_MONTH_CODE,
                    event_date: month_end,
                    date_slot: "M".to_string(),
                });
            }

            for (date, token) in days {
                let date_slot = date.format("%Y-%m-%d").to_string();
                if token.is_r_shift() {
                    proposals.push(Proposal {
                        employee: employee.clone(),
                        code: R_SHIFT_CODE,
                        event_date: *date,
                        date_slot: date_slot.clone(),
                    });
                }
                if token.is_national_holiday_r_shift() {
                    proposals.push(Proposal {
                        employee: employee.clone(),
                        code: NATIONAL_HOLIDAY_R_SHIFT_CODE,
                        event_date: *date,
                        date_slot: date_slot.clone(),
                    });
                }
                if let Some(overtime) = token.overtime() {
                    proposals.push(Proposal {
                        employee: employee.clone(),
                        code: overtime.bonus_code(),
                        event_date: *date,
                        date_slot,
                    });
                }
            }
        }

        for proposal in proposals {
            let key = idempotency_key(
                department,
                &proposal.employee,
                year,
                month,
                &proposal.date_slot,
                proposal.code,
            );
            if self.store.idempotency_key_exists(&key).await? {
                report.skipped.push(key);
                continue;
            }
            if !dry_run {
                self.scoring
                    .apply_record(RecordDraft {
                        department,
                        employee_code: proposal.employee.clone(),
                        standard_code: proposal.code.to_string(),
                        event_date: proposal.event_date,
                        checklist: None,
                        profile_id: None,
                        idempotency_key: Some(key),
                        actor: "attendance-bonus".to_string(),
                    })
                    .await?;
            }
            *report.created.entry(proposal.code.to_string()).or_default() += 1;
        }

        tracing::info!(
            %department, year, month, dry_run,
            created = report.total_created(),
            skipped = report.skipped.len(),
            "attendance bonus run finished"
        );
        Ok(report)
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    next.pred_opt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_end_handles_year_wrap() {
        assert_eq!(
            last_day_of_month(2026, 12).unwrap(),
            NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()
        );
        assert_eq!(
            last_day_of_month(2026, 2).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()
        );
        assert!(last_day_of_month(2026, 13).is_none());
    }
}
