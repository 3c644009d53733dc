use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone};
use tokio::task::JoinHandle;

use crate::game::GameService;

/// Local time of day at which play counters are cleared.
pub const RESET_TIME: NaiveTime = NaiveTime::MIN;

/// Next reset instant strictly after `now`, on the wall clock.
pub fn next_reset_after(now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(RESET_TIME);
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

/// Next reset as a real instant in `now`'s time zone.
///
/// A reset time that falls into a DST gap fires at the first wall-clock hour
/// that exists; an ambiguous one fires at its earlier occurrence.
pub fn next_reset_at<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut target = next_reset_after(now.naive_local());
    loop {
        if let Some(at) = tz.from_local_datetime(&target).earliest() {
            if at > *now {
                return at;
            }
        }
        target += chrono::Duration::hours(1);
    }
}

/// How long to sleep from `now` until the next reset.
pub fn wait_until_reset<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    next_reset_at(now)
        .signed_duration_since(now)
        .to_std()
        .unwrap_or_default()
}

/// Run the daily reset at every local midnight until the task is aborted.
/// A failed run is logged and the next midnight is scheduled as usual.
pub fn spawn_daily_reset(service: GameService) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Local::now();
            let wait = wait_until_reset(&now);
            tracing::info!(
                "next daily reset at {} (in {:?})",
                next_reset_at(&now),
                wait
            );
            tokio::time::sleep(wait).await;
            // the error is already logged by run_daily_reset
            let _ = service.run_daily_reset().await;
        }
    })
}
