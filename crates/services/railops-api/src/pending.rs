use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use railops_types::{Department, ProfileType};

use crate::error::ApiError;
use crate::models::{PendingCase, PendingStatus};
use crate::store::PendingCaseStore;

#[derive(Debug, Serialize)]
pub struct PendingCaseOverview {
    pub total_open: usize,
    pub by_type: Vec<TypeCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_pending: Option<chrono::DateTime<Utc>>,
    pub completed_this_month: usize,
    /// Completed ÷ opened for the current month, as a percentage.
    pub completion_rate_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct TypeCount {
    pub profile_type: ProfileType,
    pub count: usize,
}

/// Read side of the pending-case ledger. All writes happen through profile
/// transitions.
pub struct PendingLedger {
    store: Arc<dyn PendingCaseStore>,
}

impl PendingLedger {
    pub fn new(store: Arc<dyn PendingCaseStore>) -> Self {
        PendingLedger { store }
    }

    pub async fn list(
        &self,
        department: Option<Department>,
        profile_type: Option<ProfileType>,
        status: Option<PendingStatus>,
    ) -> Result<Vec<PendingCase>, ApiError> {
        Ok(self.store.list_cases(department, profile_type, status).await?)
    }

    pub async fn overview(
        &self,
        department: Option<Department>,
    ) -> Result<PendingCaseOverview, ApiError> {
        let stats = self.store.case_stats(department, Utc::now()).await?;
        let completion_rate_pct = if stats.opened_this_month == 0 {
            100.0
        } else {
            (stats.completed_this_month as f64 / stats.opened_this_month as f64 * 1000.0).round()
                / 10.0
        };
        Ok(PendingCaseOverview {
            total_open: stats.total_open,
            by_type: stats
                .by_type
                .into_iter()
                .map(|(profile_type, count)| TypeCount {
                    profile_type,
                    count,
                })
                .collect(),
            oldest_pending: stats.oldest_pending,
            completed_this_month: stats.completed_this_month,
            completion_rate_pct,
        })
    }
}
