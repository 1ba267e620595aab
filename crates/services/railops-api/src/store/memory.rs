use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use uuid::Uuid;

use railops_types::{AssessmentStandard, Department, Employee, EmployeeCode, ProfileType, Transfer};

use crate::models::{
    AssessmentRecord, CounterKey, CumulativeCounter, OAuthTokenRecord, PendingCase, PendingStatus,
    Profile, ProfileDetails, ScheduleCell, Setting, User,
};

use super::{
    AssessmentStore, EmployeeFilter, EmployeeStore, PendingCaseStats, PendingCaseStore,
    ProfileFilter, ProfileStore, RecordFilter, ScheduleStore, ScoringCommit, SettingsStore,
    StoreError, TokenStore, UserStore,
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    employees: HashMap<EmployeeCode, Employee>,
    transfers: Vec<Transfer>,
    schedule: HashMap<(Department, EmployeeCode, NaiveDate), ScheduleCell>,
    standards: HashMap<String, AssessmentStandard>,
    records: HashMap<Uuid, AssessmentRecord>,
    counters: HashMap<CounterKey, CumulativeCounter>,
    profiles: HashMap<Uuid, Profile>,
    details: HashMap<Uuid, ProfileDetails>,
    cases: HashMap<Uuid, PendingCase>,
    tokens: HashMap<Department, OAuthTokenRecord>,
    settings: HashMap<(Department, String), Setting>,
    idempotency: HashSet<String>,
}

/// Hash-map store used by tests and local development. Mirrors the
/// transactional behavior of the Postgres store: every trait method is
/// all-or-nothing under one lock acquisition.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_builtin_standards() -> Self {
        let store = MemoryStore::new();
        {
            let mut inner = store.inner.lock().expect("fresh lock");
            for standard in railops_types::builtin_standards() {
                inner.standards.insert(standard.code.clone(), standard);
            }
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::internal("memory store lock poisoned"))
    }
}

fn month_range(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, end))
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::conflict(format!(
                "username {} already exists",
                user.username
            )));
        }
        inner.users.insert(user.id, user);
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, hash: String) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("user {id}")))?;
        user.password_hash = hash;
        Ok(())
    }
}

#[async_trait]
impl EmployeeStore for MemoryStore {
    async fn insert_employee(&self, employee: Employee) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.employees.contains_key(&employee.code) {
            return Err(StoreError::conflict(format!(
                "employee {} already exists",
                employee.code
            )));
        }
        inner.employees.insert(employee.code.clone(), employee);
        Ok(())
    }

    async fn get_employee(&self, code: &EmployeeCode) -> Result<Option<Employee>, StoreError> {
        Ok(self.lock()?.employees.get(code).cloned())
    }

    async fn update_employee(&self, employee: Employee) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.employees.contains_key(&employee.code) {
            return Err(StoreError::not_found(format!("employee {}", employee.code)));
        }
        inner.employees.insert(employee.code.clone(), employee);
        Ok(())
    }

    async fn list_employees(&self, filter: &EmployeeFilter) -> Result<Vec<Employee>, StoreError> {
        let inner = self.lock()?;
        let needle = filter.search.as_deref().map(str::to_lowercase);
        let mut employees: Vec<Employee> = inner
            .employees
            .values()
            .filter(|e| filter.department.map_or(true, |d| e.department == d))
            .filter(|e| filter.include_resigned || !e.is_resigned)
            .filter(|e| {
                needle.as_deref().map_or(true, |n| {
                    e.name.to_lowercase().contains(n)
                        || e.code.as_str().to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();
        employees.sort_by(|a, b| a.code.as_str().cmp(b.code.as_str()));
        Ok(employees)
    }

    async fn commit_transfer(&self, transfer: Transfer) -> Result<Employee, StoreError> {
        let mut inner = self.lock()?;
        let employee = inner
            .employees
            .get_mut(&transfer.employee_code)
            .ok_or_else(|| {
                StoreError::not_found(format!("employee {}", transfer.employee_code))
            })?;
        if employee.department != transfer.from_department {
            return Err(StoreError::conflict(format!(
                "employee {} is not in {}",
                transfer.employee_code, transfer.from_department
            )));
        }
        employee.department = transfer.to_department;
        let updated = employee.clone();
        inner.transfers.push(transfer);
        Ok(updated)
    }

    async fn list_transfers(&self, code: &EmployeeCode) -> Result<Vec<Transfer>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .transfers
            .iter()
            .filter(|t| &t.employee_code == code)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn upsert_cell(&self, cell: ScheduleCell) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let key = (cell.department, cell.employee_code.clone(), cell.date);
        if let Some(existing) = inner.schedule.get(&key) {
            if existing.raw_text == cell.raw_text {
                return Ok(());
            }
        }
        inner.schedule.insert(key, cell);
        Ok(())
    }

    async fn get_cell(
        &self,
        department: Department,
        code: &EmployeeCode,
        date: NaiveDate,
    ) -> Result<Option<ScheduleCell>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.schedule.get(&(department, code.clone(), date)).cloned())
    }

    async fn month_cells(
        &self,
        department: Department,
        year: i32,
        month: u32,
    ) -> Result<Vec<ScheduleCell>, StoreError> {
        let (start, end) = month_range(year, month)
            .ok_or_else(|| StoreError::internal(format!("invalid month {year}-{month}")))?;
        let inner = self.lock()?;
        let mut cells: Vec<ScheduleCell> = inner
            .schedule
            .values()
            .filter(|c| c.department == department && c.date >= start && c.date < end)
            .cloned()
            .collect();
        cells.sort_by(|a, b| {
            (a.employee_code.as_str(), a.date).cmp(&(b.employee_code.as_str(), b.date))
        });
        Ok(cells)
    }

    async fn employee_month_cells(
        &self,
        department: Department,
        code: &EmployeeCode,
        year: i32,
        month: u32,
    ) -> Result<Vec<ScheduleCell>, StoreError> {
        let cells = self.month_cells(department, year, month).await?;
        Ok(cells
            .into_iter()
            .filter(|c| &c.employee_code == code)
            .collect())
    }
}

#[async_trait]
impl AssessmentStore for MemoryStore {
    async fn seed_standards(&self, standards: Vec<AssessmentStandard>) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        for standard in standards {
            inner
                .standards
                .entry(standard.code.clone())
                .or_insert(standard);
        }
        Ok(())
    }

    async fn get_standard(&self, code: &str) -> Result<Option<AssessmentStandard>, StoreError> {
        Ok(self.lock()?.standards.get(code).cloned())
    }

    async fn list_standards(&self) -> Result<Vec<AssessmentStandard>, StoreError> {
        let inner = self.lock()?;
        let mut standards: Vec<AssessmentStandard> = inner.standards.values().cloned().collect();
        standards.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(standards)
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<AssessmentRecord>, StoreError> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    async fn list_records(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<AssessmentRecord>, StoreError> {
        let inner = self.lock()?;
        let mut records: Vec<AssessmentRecord> = inner
            .records
            .values()
            .filter(|r| filter.include_deleted || !r.is_deleted)
            .filter(|r| filter.department.map_or(true, |d| r.department == d))
            .filter(|r| {
                filter
                    .employee_code
                    .as_ref()
                    .map_or(true, |c| &r.employee_code == c)
            })
            .filter(|r| filter.year.map_or(true, |y| r.event_date.year() == y))
            .filter(|r| filter.month.map_or(true, |m| r.event_date.month() == m))
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.event_date, r.created_at));
        Ok(records)
    }

    async fn live_triple_records(
        &self,
        key: &CounterKey,
    ) -> Result<Vec<AssessmentRecord>, StoreError> {
        let inner = self.lock()?;
        let mut records: Vec<AssessmentRecord> = inner
            .records
            .values()
            .filter(|r| {
                !r.is_deleted
                    && r.employee_code == key.employee_code
                    && r.category == key.category
                    && r.event_date.year() == key.year
            })
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.event_date, r.created_at));
        Ok(records)
    }

    async fn counter_value(&self, key: &CounterKey) -> Result<u32, StoreError> {
        let inner = self.lock()?;
        Ok(inner.counters.get(key).map(|c| c.count).unwrap_or(0))
    }

    async fn idempotency_key_exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.idempotency.contains(key))
    }

    async fn commit_scoring(&self, commit: ScoringCommit) -> Result<(), StoreError> {
        let mut inner = self.lock()?;

        if let Some(record) = &commit.insert {
            if inner.records.contains_key(&record.id) {
                return Err(StoreError::conflict(format!("record {} exists", record.id)));
            }
            if let Some(key) = &record.idempotency_key {
                if !inner.idempotency.insert(key.clone()) {
                    return Err(StoreError::conflict("duplicate idempotency key".to_string()));
                }
            }
            inner.records.insert(record.id, record.clone());
        }

        if let Some(id) = commit.soft_delete {
            let record = inner
                .records
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found(format!("record {id}")))?;
            record.is_deleted = true;
        }

        for rescore in &commit.rescores {
            let record = inner
                .records
                .get_mut(&rescore.id)
                .ok_or_else(|| StoreError::not_found(format!("record {}", rescore.id)))?;
            record.cumulative_multiplier = rescore.cumulative_multiplier;
            record.final_points = rescore.final_points;
            if let Some(date) = rescore.event_date {
                record.event_date = date;
            }
        }

        if let Some(update) = &commit.checklist_update {
            let record = inner
                .records
                .get_mut(&update.id)
                .ok_or_else(|| StoreError::not_found(format!("record {}", update.id)))?;
            record.checklist = Some(update.checklist.clone());
            record.fault_coefficient = update.coefficient;
        }

        for (key, count) in &commit.counters {
            let counter = inner
                .counters
                .entry(key.clone())
                .or_insert_with(|| CumulativeCounter {
                    key: key.clone(),
                    count: 0,
                    closed: false,
                });
            counter.count = *count;
        }

        Ok(())
    }

    async fn close_counters(&self, year: i32) -> Result<u32, StoreError> {
        let mut inner = self.lock()?;
        let mut closed = 0;
        for counter in inner.counters.values_mut() {
            if counter.key.year == year && !counter.closed {
                counter.closed = true;
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn records_by_department_month(
        &self,
        department: Department,
        year: i32,
        month: u32,
    ) -> Result<Vec<AssessmentRecord>, StoreError> {
        self.list_records(&RecordFilter {
            department: Some(department),
            year: Some(year),
            month: Some(month),
            ..RecordFilter::default()
        })
        .await
    }
}

impl Inner {
    fn cas_profile(&mut self, profile: Profile, expected_version: i64) -> Result<Profile, StoreError> {
        let stored = self
            .profiles
            .get(&profile.id)
            .ok_or_else(|| StoreError::not_found(format!("profile {}", profile.id)))?;
        if stored.version != expected_version {
            return Err(StoreError::conflict(format!(
                "profile {} version is {}, expected {}",
                profile.id, stored.version, expected_version
            )));
        }
        let mut updated = profile;
        updated.version = expected_version + 1;
        updated.updated_at = Utc::now();
        self.profiles.insert(updated.id, updated.clone());
        Ok(updated)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn insert_profile(&self, profile: Profile) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.profiles.contains_key(&profile.id) {
            return Err(StoreError::conflict(format!("profile {} exists", profile.id)));
        }
        inner.profiles.insert(profile.id, profile);
        Ok(())
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(self.lock()?.profiles.get(&id).cloned())
    }

    async fn list_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, StoreError> {
        let inner = self.lock()?;
        let mut profiles: Vec<Profile> = inner
            .profiles
            .values()
            .filter(|p| filter.department.map_or(true, |d| p.department == d))
            .filter(|p| filter.status.map_or(true, |s| p.conversion_status == s))
            .filter(|p| filter.profile_type.map_or(true, |t| p.profile_type == t))
            .filter(|p| {
                filter
                    .employee_code
                    .as_ref()
                    .map_or(true, |c| &p.employee_code == c)
            })
            .cloned()
            .collect();
        profiles.sort_by_key(|p| std::cmp::Reverse(p.created_at));
        Ok(profiles)
    }

    async fn update_profile_cas(
        &self,
        profile: Profile,
        expected_version: i64,
    ) -> Result<Profile, StoreError> {
        let mut inner = self.lock()?;
        inner.cas_profile(profile, expected_version)
    }

    async fn convert_profile(
        &self,
        profile: Profile,
        expected_version: i64,
        details: ProfileDetails,
        case: PendingCase,
    ) -> Result<Profile, StoreError> {
        let mut inner = self.lock()?;
        let updated = inner.cas_profile(profile, expected_version)?;
        inner.details.insert(updated.id, details);
        inner.cases.insert(case.id, case);
        Ok(updated)
    }

    async fn complete_profile(
        &self,
        profile: Profile,
        expected_version: i64,
    ) -> Result<Profile, StoreError> {
        let mut inner = self.lock()?;
        let updated = inner.cas_profile(profile, expected_version)?;
        let case = inner
            .cases
            .values_mut()
            .find(|c| c.profile_id == updated.id)
            .ok_or_else(|| {
                StoreError::not_found(format!("pending case for profile {}", updated.id))
            })?;
        case.status = PendingStatus::Uploaded;
        case.drive_link = updated.drive_link.clone();
        case.completed_at = Some(Utc::now());
        Ok(updated)
    }

    async fn reset_profile(
        &self,
        profile: Profile,
        expected_version: i64,
    ) -> Result<Profile, StoreError> {
        let mut inner = self.lock()?;
        let updated = inner.cas_profile(profile, expected_version)?;
        inner.details.remove(&updated.id);
        inner.cases.retain(|_, c| c.profile_id != updated.id);
        Ok(updated)
    }

    async fn get_details(&self, profile_id: Uuid) -> Result<Option<ProfileDetails>, StoreError> {
        Ok(self.lock()?.details.get(&profile_id).cloned())
    }
}

#[async_trait]
impl PendingCaseStore for MemoryStore {
    async fn list_cases(
        &self,
        department: Option<Department>,
        profile_type: Option<ProfileType>,
        status: Option<PendingStatus>,
    ) -> Result<Vec<PendingCase>, StoreError> {
        let inner = self.lock()?;
        let mut cases: Vec<PendingCase> = inner
            .cases
            .values()
            .filter(|c| department.map_or(true, |d| c.department == d))
            .filter(|c| profile_type.map_or(true, |t| c.profile_type == t))
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        cases.sort_by_key(|c| c.created_at);
        Ok(cases)
    }

    async fn case_for_profile(&self, profile_id: Uuid) -> Result<Option<PendingCase>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .cases
            .values()
            .find(|c| c.profile_id == profile_id)
            .cloned())
    }

    async fn case_stats(
        &self,
        department: Option<Department>,
        now: DateTime<Utc>,
    ) -> Result<PendingCaseStats, StoreError> {
        let inner = self.lock()?;
        let cases: Vec<&PendingCase> = inner
            .cases
            .values()
            .filter(|c| department.map_or(true, |d| c.department == d))
            .collect();

        let open: Vec<&&PendingCase> = cases
            .iter()
            .filter(|c| c.status == PendingStatus::Pending)
            .collect();

        let mut by_type: HashMap<ProfileType, usize> = HashMap::new();
        for case in &open {
            *by_type.entry(case.profile_type).or_default() += 1;
        }
        let mut by_type: Vec<(ProfileType, usize)> = by_type.into_iter().collect();
        by_type.sort_by_key(|(t, _)| t.code());

        let month_start = now
            .date_naive()
            .with_day(1)
            .unwrap_or_else(|| now.date_naive());

        Ok(PendingCaseStats {
            total_open: open.len(),
            by_type,
            oldest_pending: open.iter().map(|c| c.created_at).min(),
            completed_this_month: cases
                .iter()
                .filter(|c| {
                    c.completed_at
                        .map_or(false, |t| t.date_naive() >= month_start)
                })
                .count(),
            opened_this_month: cases
                .iter()
                .filter(|c| c.created_at.date_naive() >= month_start)
                .count(),
        })
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get_token(
        &self,
        department: Department,
    ) -> Result<Option<OAuthTokenRecord>, StoreError> {
        Ok(self.lock()?.tokens.get(&department).cloned())
    }

    async fn upsert_token(&self, record: OAuthTokenRecord) -> Result<(), StoreError> {
        self.lock()?.tokens.insert(record.department, record);
        Ok(())
    }

    async fn delete_token(&self, department: Department) -> Result<(), StoreError> {
        self.lock()?.tokens.remove(&department);
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_setting(
        &self,
        department: Department,
        key: &str,
    ) -> Result<Option<Setting>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.settings.get(&(department, key.to_string())).cloned())
    }

    async fn upsert_setting(&self, setting: Setting) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner
            .settings
            .insert((setting.department, setting.key.clone()), setting);
        Ok(())
    }

    async fn list_settings(&self, department: Department) -> Result<Vec<Setting>, StoreError> {
        let inner = self.lock()?;
        let mut settings: Vec<Setting> = inner
            .settings
            .values()
            .filter(|s| s.department == department)
            .cloned()
            .collect();
        settings.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(settings)
    }
}
