use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use railops_types::{Department, EmployeeCode};

use crate::error::ApiError;
use crate::google::SheetsClient;
use crate::models::ScheduleCell;
use crate::store::{ScheduleStore, StoreError};

const QUEUE_CAPACITY: usize = 16;
const MAX_RECORDED_ERRORS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Attendance,
    Duty,
}

impl SyncKind {
    /// Sheet tab suffix. Tabs are named `{roc_year}{mm}{suffix}` with the
    /// ROC year (Gregorian − 1911).
    fn tab_suffix(&self) -> &'static str {
        match self {
            SyncKind::Attendance => "班表",
            SyncKind::Duty => "勤務表",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncStatus::Pending | SyncStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncTask {
    pub task_id: Uuid,
    pub kind: SyncKind,
    pub department: Department,
    pub year: i32,
    pub month: u32,
    pub status: SyncStatus,
    pub progress_pct: u8,
    pub total_rows: u32,
    pub success_count: u32,
    pub error_count: u32,
    /// First N errors only; the count keeps the full total.
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub requested_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SyncKey {
    department: Department,
    kind: SyncKind,
    year: i32,
    month: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncTaskRef {
    pub department: Department,
    pub task_id: Uuid,
    /// True when the request coalesced onto an already-running task.
    pub joined: bool,
}

struct QueuedJob {
    task_id: Uuid,
    key: SyncKey,
}

struct SyncShared {
    registry: Mutex<HashMap<Uuid, SyncTask>>,
    running: Mutex<HashMap<SyncKey, Uuid>>,
    cancels: Mutex<HashMap<Uuid, Arc<AtomicBool>>>,
    store: Arc<dyn ScheduleStore>,
    sheets: Arc<SheetsClient>,
    sheet_ids: HashMap<Department, String>,
}

/// Batched schedule pull from the external spreadsheet into the schedule
/// store. One running task per `(department, kind, year, month)`; a fixed
/// worker pool drains a bounded queue, and a saturated queue turns into
/// `503 Busy` instead of unbounded backlog.
pub struct SyncService {
    shared: Arc<SyncShared>,
    queue: mpsc::Sender<QueuedJob>,
}

impl SyncService {
    pub fn start(
        workers: usize,
        store: Arc<dyn ScheduleStore>,
        sheets: Arc<SheetsClient>,
        sheet_ids: HashMap<Department, String>,
    ) -> Arc<SyncService> {
        let (queue_tx, queue_rx) = mpsc::channel::<QueuedJob>(QUEUE_CAPACITY);
        let shared = Arc::new(SyncShared {
            registry: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
            store,
            sheets,
            sheet_ids,
        });

        let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));
        for worker in 0..workers.max(1) {
            let shared = shared.clone();
            let queue_rx = queue_rx.clone();
            tokio::spawn(async move {
                loop {
                    let job = { queue_rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    run_job(&shared, job).await;
                }
                tracing::debug!(worker, "sync worker stopped");
            });
        }

        Arc::new(SyncService {
            shared,
            queue: queue_tx,
        })
    }

    /// Submit sync tasks. Requests for a tuple that is already pending or
    /// running join the existing task instead of spawning a duplicate.
    pub fn start_sync(
        &self,
        kind: SyncKind,
        departments: Vec<Department>,
        year: i32,
        month: u32,
        actor: &str,
    ) -> Result<Vec<SyncTaskRef>, ApiError> {
        if !(1..=12).contains(&month) {
            return Err(ApiError::validation(format!("invalid month {month}")));
        }
        let mut refs = Vec::new();
        for department in departments {
            let key = SyncKey {
                department,
                kind,
                year,
                month,
            };

            if let Some(existing) = self
                .shared
                .running
                .lock()
                .expect("running map lock poisoned")
                .get(&key)
            {
                refs.push(SyncTaskRef {
                    department,
                    task_id: *existing,
                    joined: true,
                });
                continue;
            }

            let task = SyncTask {
                task_id: Uuid::new_v4(),
                kind,
                department,
                year,
                month,
                status: SyncStatus::Pending,
                progress_pct: 0,
                total_rows: 0,
                success_count: 0,
                error_count: 0,
                errors: Vec::new(),
                started_at: Utc::now(),
                finished_at: None,
                requested_by: actor.to_string(),
            };
            let task_id = task.task_id;

            {
                let mut registry = self.shared.registry.lock().expect("registry lock poisoned");
                registry.insert(task_id, task);
            }
            self.shared
                .running
                .lock()
                .expect("running map lock poisoned")
                .insert(key.clone(), task_id);
            self.shared
                .cancels
                .lock()
                .expect("cancel map lock poisoned")
                .insert(task_id, Arc::new(AtomicBool::new(false)));

            if self
                .queue
                .try_send(QueuedJob { task_id, key: key.clone() })
                .is_err()
            {
                // Roll the registration back; the client may retry safely.
                self.shared
                    .registry
                    .lock()
                    .expect("registry lock poisoned")
                    .remove(&task_id);
                self.shared
                    .running
                    .lock()
                    .expect("running map lock poisoned")
                    .remove(&key);
                self.shared
                    .cancels
                    .lock()
                    .expect("cancel map lock poisoned")
                    .remove(&task_id);
                return Err(ApiError::Busy);
            }

            refs.push(SyncTaskRef {
                department,
                task_id,
                joined: false,
            });
        }
        Ok(refs)
    }

    pub fn status(&self, task_id: Uuid) -> Option<SyncTask> {
        self.shared
            .registry
            .lock()
            .expect("registry lock poisoned")
            .get(&task_id)
            .cloned()
    }

    pub fn cancel(&self, task_id: Uuid) -> bool {
        let cancels = self.shared.cancels.lock().expect("cancel map lock poisoned");
        match cancels.get(&task_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Poll until the task reaches a terminal state. Test helper.
    pub async fn await_task(&self, task_id: Uuid, timeout: Duration) -> Option<SyncTask> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(task) = self.status(task_id) {
                if task.status.is_terminal() {
                    return Some(task);
                }
            } else {
                return None;
            }
            if tokio::time::Instant::now() >= deadline {
                return self.status(task_id);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

fn update_task(shared: &SyncShared, task_id: Uuid, apply: impl FnOnce(&mut SyncTask)) {
    let mut registry = shared.registry.lock().expect("registry lock poisoned");
    if let Some(task) = registry.get_mut(&task_id) {
        apply(task);
    }
}

fn finish_task(shared: &SyncShared, job: &QueuedJob, status: SyncStatus, reason: Option<String>) {
    let status_label = format!("{status:?}").to_lowercase();
    crate::metrics::SYNC_TASKS.with_label_values(&[&status_label]).inc();
    update_task(shared, job.task_id, |task| {
        task.status = status;
        task.finished_at = Some(Utc::now());
        if let Some(reason) = reason {
            if task.errors.len() < MAX_RECORDED_ERRORS {
                task.errors.push(reason);
            }
        }
        if matches!(status, SyncStatus::Completed) {
            task.progress_pct = 100;
        }
    });
    shared
        .running
        .lock()
        .expect("running map lock poisoned")
        .remove(&job.key);
    shared
        .cancels
        .lock()
        .expect("cancel map lock poisoned")
        .remove(&job.task_id);
}

async fn run_job(shared: &SyncShared, job: QueuedJob) {
    let cancel = shared
        .cancels
        .lock()
        .expect("cancel map lock poisoned")
        .get(&job.task_id)
        .cloned()
        .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));

    update_task(shared, job.task_id, |task| task.status = SyncStatus::Running);

    let key = &job.key;
    let Some(sheet_id) = shared.sheet_ids.get(&key.department) else {
        finish_task(
            shared,
            &job,
            SyncStatus::Failed,
            Some(format!("no spreadsheet configured for {}", key.department)),
        );
        return;
    };

    let tab_name = format!(
        "{}{:02}{}",
        key.year - 1911,
        key.month,
        key.kind.tab_suffix()
    );
    tracing::info!(task_id = %job.task_id, department = %key.department, %tab_name, "sync started");

    let rows = match shared
        .sheets
        .read_tab(key.department, sheet_id, &tab_name)
        .await
    {
        Ok(rows) => rows,
        Err(err) => {
            finish_task(shared, &job, SyncStatus::Failed, Some(err.to_string()));
            return;
        }
    };

    let layout = match SheetLayout::detect(&rows) {
        Some(layout) => layout,
        None => {
            finish_task(
                shared,
                &job,
                SyncStatus::Failed,
                Some(format!("tab {tab_name} has no recognizable header row")),
            );
            return;
        }
    };

    let batch_id = Uuid::new_v4();
    let mut success: u32 = 0;
    let mut errors: u32 = 0;
    let mut error_messages: Vec<String> = Vec::new();
    let employee_rows: Vec<&Vec<String>> = rows[layout.header_row + 1..]
        .iter()
        .filter(|row| row.first().map_or(false, |c| !c.trim().is_empty()))
        .collect();
    let total_cells = (employee_rows.len() * layout.day_columns.len()) as u32;

    update_task(shared, job.task_id, |task| {
        task.total_rows = employee_rows.len() as u32;
    });

    let mut processed: u32 = 0;
    for row in employee_rows {
        let code_text = row[0].trim();
        let employee_code = match EmployeeCode::new(code_text) {
            Ok(code) => code,
            Err(_) => {
                errors += layout.day_columns.len() as u32;
                processed += layout.day_columns.len() as u32;
                if error_messages.len() < MAX_RECORDED_ERRORS {
                    error_messages.push(format!("malformed employee code {code_text:?}"));
                }
                continue;
            }
        };

        for (column, day) in &layout.day_columns {
            if cancel.load(Ordering::SeqCst) {
                update_task(shared, job.task_id, |task| {
                    task.success_count = success;
                    task.error_count = errors;
                    task.errors = error_messages.clone();
                });
                finish_task(shared, &job, SyncStatus::Cancelled, None);
                tracing::info!(task_id = %job.task_id, "sync cancelled");
                return;
            }
            processed += 1;

            let raw = row.get(*column).map(|c| c.trim()).unwrap_or("");
            if raw.is_empty() {
                continue;
            }
            let Some(date) = NaiveDate::from_ymd_opt(key.year, key.month, *day) else {
                errors += 1;
                if error_messages.len() < MAX_RECORDED_ERRORS {
                    error_messages.push(format!("day {day} does not exist in {}-{:02}", key.year, key.month));
                }
                continue;
            };

            let cell = ScheduleCell {
                department: key.department,
                employee_code: employee_code.clone(),
                date,
                raw_text: raw.to_string(),
                sync_batch_id: batch_id,
                synced_at: Utc::now(),
            };
            match shared.store.upsert_cell(cell).await {
                Ok(()) => success += 1,
                Err(StoreError::Database(e)) => {
                    // Database loss is catastrophic; stop instead of
                    // grinding through the rest of the sheet.
                    update_task(shared, job.task_id, |task| {
                        task.success_count = success;
                        task.error_count = errors;
                        task.errors = error_messages.clone();
                    });
                    finish_task(shared, &job, SyncStatus::Failed, Some(e.to_string()));
                    return;
                }
                Err(e) => {
                    errors += 1;
                    if error_messages.len() < MAX_RECORDED_ERRORS {
                        error_messages.push(e.to_string());
                    }
                }
            }

            if processed % 16 == 0 {
                let pct = if total_cells == 0 {
                    100
                } else {
                    ((processed as u64 * 100) / total_cells as u64) as u8
                };
                update_task(shared, job.task_id, |task| {
                    task.progress_pct = pct;
                    task.success_count = success;
                    task.error_count = errors;
                });
            }
        }
    }

    update_task(shared, job.task_id, |task| {
        task.success_count = success;
        task.error_count = errors;
        task.errors = error_messages.clone();
        task.progress_pct = 100;
    });
    let status = if errors == 0 {
        SyncStatus::Completed
    } else {
        SyncStatus::CompletedWithErrors
    };
    finish_task(shared, &job, status, None);
    tracing::info!(task_id = %job.task_id, success, errors, "sync finished");
}

/// Location of the employee-row and date-column regions inside a sheet tab.
struct SheetLayout {
    header_row: usize,
    /// `(column index, day of month)` pairs.
    day_columns: Vec<(usize, u32)>,
}

impl SheetLayout {
    /// The header row is the first row where at least half the columns past
    /// the name columns parse as day-of-month numbers.
    fn detect(rows: &[Vec<String>]) -> Option<SheetLayout> {
        for (index, row) in rows.iter().enumerate().take(5) {
            let day_columns: Vec<(usize, u32)> = row
                .iter()
                .enumerate()
                .skip(1)
                .filter_map(|(column, cell)| {
                    cell.trim()
                        .parse::<u32>()
                        .ok()
                        .filter(|d| (1..=31).contains(d))
                        .map(|d| (column, d))
                })
                .collect();
            if day_columns.len() >= 15 {
                return Some(SheetLayout {
                    header_row: index,
                    day_columns,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_header_with_day_columns() {
        let mut header = vec!["員工編號".to_string(), "姓名".to_string()];
        header.extend((1..=31).map(|d| d.to_string()));
        let rows = vec![
            vec!["淡海輕軌 115年03月班表".to_string()],
            header,
            vec!["2305A0017".to_string(), "林小明".to_string()],
        ];
        let layout = SheetLayout::detect(&rows).unwrap();
        assert_eq!(layout.header_row, 1);
        assert_eq!(layout.day_columns.len(), 31);
        assert_eq!(layout.day_columns[0], (2, 1));
    }

    #[test]
    fn rejects_sheets_without_header() {
        let rows = vec![vec!["just".to_string(), "text".to_string()]];
        assert!(SheetLayout::detect(&rows).is_none());
    }

    #[test]
    fn tab_names_use_roc_year() {
        assert_eq!(
            format!("{}{:02}{}", 2026 - 1911, 3, SyncKind::Attendance.tab_suffix()),
            "11503班表"
        );
    }
}
