//! Daily scheduling of collection runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use std::future::Future;

/// Parse an `HH:MM` send time.
pub fn parse_send_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("Invalid send_time '{s}', expected HH:MM"))
}

/// Next occurrence of `send_time` strictly after `now`, in `now`'s time zone.
///
/// A send time that falls into a DST gap moves forward by the gap.
#[must_use]
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, send_time: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    loop {
        let mut naive = day.and_time(send_time);
        // Skipped local times have no mapping; an hour later always does.
        let local = tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                naive += Duration::hours(1);
                tz.from_local_datetime(&naive).earliest()
            });
        if let Some(candidate) = local {
            if candidate > *now {
                return candidate;
            }
        }
        day = day.succ_opt().unwrap_or(day + Duration::days(1));
    }
}

/// Run `job` every day at `send_time` (local). Never returns; failed runs are
/// logged and the schedule carries on.
pub async fn run_daily<F, Fut>(send_time: NaiveTime, mut job: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    loop {
        let now = Local::now();
        let next = next_run_after(&now, send_time);
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!(next_run = %next.format("%Y-%m-%d %H:%M %Z"), wait_secs = wait.as_secs(), "Waiting for next scheduled run");

        tokio::time::sleep(wait).await;

        tracing::info!("Starting scheduled run");
        if let Err(e) = job().await {
            tracing::error!(error = %format!("{e:#}"), "Scheduled run failed");
        }
    }
}
