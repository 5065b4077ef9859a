// src/ingest/scheduler.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use tokio::task::JoinHandle;

use crate::job::{JobTracker, StartCode};

/// Next wall-clock occurrence of `at` strictly after `now`, in `now`'s zone.
/// Days where `at` falls in a DST gap are skipped.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    loop {
        if let Some(candidate) = tz.from_local_datetime(&day.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
        day = day.succ_opt().unwrap_or(day);
        if day == now.date_naive() {
            // calendar overflow; only reachable at NaiveDate::MAX
            return now.clone() + Duration::days(1);
        }
    }
}

/// Daily trigger. Goes through `JobTracker::start`, so the gate and
/// single-flight rules apply to scheduled runs too.
pub fn spawn_daily(tracker: Arc<JobTracker>, at: NaiveTime) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Local::now();
            let next = next_run_after(&now, at);
            let wait = (next.clone() - now).to_std().unwrap_or_default();
            tracing::info!(target: "scheduler", next = %next.to_rfc3339(), "next scheduled collection");
            tokio::time::sleep(wait).await;

            let outcome = tracker.start();
            match outcome.code {
                StartCode::Started => tracing::info!(target: "scheduler", "scheduled collection started"),
                code => tracing::info!(target: "scheduler", ?code, "scheduled collection skipped"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn same_day_when_time_not_yet_reached() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let at = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(
            next_run_after(&now, at),
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn rolls_to_next_day_when_time_passed_or_equal() {
        let at = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(
            next_run_after(&now, at),
            Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn uses_the_zone_of_now() {
        let cst = FixedOffset::east_opt(8 * 3600).unwrap();
        let now = cst.with_ymd_and_hms(2025, 12, 31, 23, 30, 0).unwrap();
        let next = next_run_after(&now, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(next, cst.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap());
    }
}
