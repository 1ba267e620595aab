use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use railops_types::{CategoryCode, Department};

use crate::error::ApiError;
use crate::scoring::{RecordDraft, ScoringEngine};
use crate::store::{idempotency_key, AssessmentStore, EmployeeFilter, EmployeeStore, Store};

const NO_INCIDENT_CODE: &str = "+M02";
const NO_DEDUCTION_CODE: &str = "+M03";

#[derive(Debug, Clone, Serialize)]
pub struct RewardReport {
    pub department: Department,
    pub year: i32,
    pub month: u32,
    pub created: BTreeMap<String, u32>,
    pub skipped: Vec<String>,
}

/// Monthly reward derivation over assessment records. +M01 is derived from
/// raw schedule cells by the attendance bonus engine; this engine owns the
/// record-driven +M02/+M03 pair.
pub struct RewardEngine {
    store: Arc<dyn Store>,
    scoring: Arc<ScoringEngine>,
}

impl RewardEngine {
    pub fn new(store: Arc<dyn Store>, scoring: Arc<ScoringEngine>) -> Self {
        RewardEngine { store, scoring }
    }

    pub async fn process(
        &self,
        department: Department,
        year: i32,
        month: u32,
    ) -> Result<RewardReport, ApiError> {
        let employees = self
            .store
            .list_employees(&EmployeeFilter {
                department: Some(department),
                ..EmployeeFilter::default()
            })
            .await?;
        let records = self
            .store
            .records_by_department_month(department, year, month)
            .await?;

        let month_end = chrono::NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|d| {
                d.checked_add_months(chrono::Months::new(1))
                    .and_then(|n| n.pred_opt())
            })
            .ok_or_else(|| ApiError::validation(format!("invalid month {year}-{month:02}")))?;

        let mut report = RewardReport {
            department,
            year,
            month,
            created: BTreeMap::new(),
            skipped: Vec::new(),
        };

        for employee in &employees {
            let own: Vec<_> = records
                .iter()
                .filter(|r| r.employee_code == employee.code && !r.is_deleted)
                .collect();

            let has_incident = own.iter().any(|r| {
                matches!(r.category, CategoryCode::Incident | CategoryCode::Safety)
            });
            let has_deduction = own.iter().any(|r| r.category.is_deduction());

            let mut due: Vec<&'static str> = Vec::new();
            if !has_incident {
                due.push(NO_INCIDENT_CODE);
            }
            if !has_deduction {
                due.push(NO_DEDUCTION_CODE);
            }

            for code in due {
                let key = idempotency_key(department, &employee.code, year, month, "M", code);
                if self.store.idempotency_key_exists(&key).await? {
                    report.skipped.push(key);
                    continue;
                }
                self.scoring
                    .apply_record(RecordDraft {
                        department,
                        employee_code: employee.code.clone(),
                        standard_code: code.to_string(),
                        event_date: month_end,
                        checklist: None,
                        profile_id: None,
                        idempotency_key: Some(key),
                        actor: "monthly-reward".to_string(),
                    })
                    .await?;
                *report.created.entry(code.to_string()).or_default() += 1;
            }
        }

        tracing::info!(
            %department, year, month,
            created = report.created.values().sum::<u32>(),
            skipped = report.skipped.len(),
            "monthly reward run finished"
        );
        Ok(report)
    }
}
