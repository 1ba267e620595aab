use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, NaiveDate, TimeZone};

use railops_types::Department;

use crate::state::AppState;
use crate::sync::SyncKind;

/// Background jobs: daily schedule sync, monthly reward derivation, yearly
/// counter close. All three reuse the engines' coalescing, so a restart
/// mid-run joins the running work instead of duplicating it.
pub fn spawn_background_jobs(state: AppState) {
    tokio::spawn(daily_sync_loop(state.clone()));
    tokio::spawn(monthly_reward_loop(state.clone()));
    tokio::spawn(yearly_close_loop(state));
}

async fn sleep_until(target: DateTime<Local>) {
    let now = Local::now();
    let wait = (target - now).to_std().unwrap_or_default();
    tokio::time::sleep(wait).await;
}

async fn daily_sync_loop(state: AppState) {
    let (hour, minute) = state.config.daily_sync_at;
    loop {
        let target = next_daily(Local::now(), hour, minute);
        tracing::debug!(%target, "next daily schedule sync");
        sleep_until(target).await;

        let today = Local::now().date_naive();
        for department in Department::ALL {
            let result = state.sync.start_sync(
                SyncKind::Attendance,
                vec![department],
                today.year(),
                today.month(),
                "scheduler",
            );
            match result {
                Ok(refs) => {
                    for task in refs {
                        tracing::info!(%department, task_id = %task.task_id, joined = task.joined, "daily sync submitted");
                    }
                }
                Err(e) => tracing::warn!(%department, "daily sync submission failed: {e}"),
            }
        }
    }
}

async fn monthly_reward_loop(state: AppState) {
    loop {
        let target = next_monthly_first(Local::now(), 1, 0);
        tracing::debug!(%target, "next monthly reward derivation");
        sleep_until(target).await;

        let today = Local::now().date_naive();
        let (year, month) = prior_month(today.year(), today.month());
        for department in Department::ALL {
            match state.rewards.process(department, year, month).await {
                Ok(report) => tracing::info!(
                    %department, year, month,
                    created = report.created.values().sum::<u32>(),
                    "monthly reward derivation finished"
                ),
                Err(e) => tracing::error!(%department, "monthly reward derivation failed: {e}"),
            }
        }
    }
}

async fn yearly_close_loop(state: AppState) {
    loop {
        let target = next_yearly(Local::now());
        tracing::debug!(%target, "next yearly counter close");
        sleep_until(target).await;

        let prior_year = Local::now().year() - 1;
        match state.scoring.close_year(prior_year).await {
            Ok(closed) => tracing::info!(prior_year, closed, "yearly counter close finished"),
            Err(e) => tracing::error!(prior_year, "yearly counter close failed: {e}"),
        }
    }
}

/// Next wall-clock occurrence of `HH:MM` strictly after `now`.
fn next_daily(now: DateTime<Local>, hour: u32, minute: u32) -> DateTime<Local> {
    let candidate = at_local(now.date_naive(), hour, minute, now);
    if candidate > now {
        candidate
    } else {
        at_local(now.date_naive() + ChronoDuration::days(1), hour, minute, now)
    }
}

/// Next first-of-month at `HH:MM` strictly after `now`.
fn next_monthly_first(now: DateTime<Local>, hour: u32, minute: u32) -> DateTime<Local> {
    let this_month =
        NaiveDate::from_ymd_opt(now.year(), now.month(), 1).expect("first of month exists");
    let candidate = at_local(this_month, hour, minute, now);
    if candidate > now {
        return candidate;
    }
    let (year, month) = next_month(now.year(), now.month());
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("first of month exists");
    at_local(first, hour, minute, now)
}

/// Next January 1 at midnight strictly after `now`.
fn next_yearly(now: DateTime<Local>) -> DateTime<Local> {
    let this_year = NaiveDate::from_ymd_opt(now.year(), 1, 1).expect("january first exists");
    let candidate = at_local(this_year, 0, 0, now);
    if candidate > now {
        return candidate;
    }
    let next = NaiveDate::from_ymd_opt(now.year() + 1, 1, 1).expect("january first exists");
    at_local(next, 0, 0, now)
}

fn at_local(date: NaiveDate, hour: u32, minute: u32, fallback: DateTime<Local>) -> DateTime<Local> {
    date.and_hms_opt(hour, minute, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).single())
        .unwrap_or(fallback)
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn prior_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, 0).unwrap(),
            )
            .single()
            .unwrap()
    }

    #[test]
    fn daily_rolls_to_tomorrow_after_the_slot() {
        let before = local(2026, 3, 9, 5, 0);
        assert_eq!(next_daily(before, 6, 0), local(2026, 3, 9, 6, 0));
        let after = local(2026, 3, 9, 7, 0);
        assert_eq!(next_daily(after, 6, 0), local(2026, 3, 10, 6, 0));
    }

    #[test]
    fn monthly_first_rolls_across_year_end() {
        let december = local(2026, 12, 15, 9, 0);
        assert_eq!(next_monthly_first(december, 1, 0), local(2027, 1, 1, 1, 0));
    }

    #[test]
    fn yearly_fires_on_january_first() {
        let now = local(2026, 6, 1, 12, 0);
        assert_eq!(next_yearly(now), local(2027, 1, 1, 0, 0));
    }

    #[test]
    fn prior_month_wraps_january() {
        assert_eq!(prior_month(2026, 1), (2025, 12));
        assert_eq!(prior_month(2026, 7), (2026, 6));
    }
}
