//! External timer for daemon mode: one cron loop per scheduled function.
//!
//! Each loop awaits its task before computing the next fire time, so a
//! function never overlaps itself. Different functions are serialised by the
//! roster lock, not here.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::ConfigError;

/// Parse a cron expression and compute the next fire time from `after`.
pub fn next_fire(schedule: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ConfigError> {
    let parsed = cron::Schedule::from_str(schedule).map_err(|e| ConfigError::InvalidValue {
        key: "cron".into(),
        message: format!("invalid cron `{schedule}`: {e}"),
    })?;
    Ok(parsed.after(&after).next())
}

/// Spawn a loop running `task` on `schedule` until the schedule is exhausted.
pub fn spawn_cron_loop<F, Fut>(
    name: &'static str,
    schedule: String,
    task: F,
) -> Result<tokio::task::JoinHandle<()>, ConfigError>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    // Validate before spawning so a bad expression fails at startup.
    next_fire(&schedule, Utc::now())?;

    Ok(tokio::spawn(async move {
        info!(task = name, schedule = %schedule, "Cron loop started");
        loop {
            let now = Utc::now();
            let Ok(Some(at)) = next_fire(&schedule, now) else {
                info!(task = name, "Schedule exhausted, loop stopped");
                break;
            };
            let wait = (at - now).to_std().unwrap_or(Duration::ZERO);
            debug!(task = name, next = %at, "Waiting for next fire");
            tokio::time::sleep(wait).await;
            task().await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_fire_follows_schedule() {
        let base = Utc.with_ymd_and_hms(2026, 2, 10, 9, 15, 0).unwrap();
        let hourly = next_fire("0 0 * * * *", base).unwrap().unwrap();
        assert_eq!(hourly, Utc.with_ymd_and_hms(2026, 2, 10, 10, 0, 0).unwrap());

        let every_two = next_fire("0 */2 * * * *", base).unwrap().unwrap();
        assert_eq!(every_two, Utc.with_ymd_and_hms(2026, 2, 10, 9, 16, 0).unwrap());
    }

    #[test]
    fn invalid_schedule_is_config_error() {
        let err = next_fire("not a cron", Utc::now()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(spawn_cron_loop("bad", "nope".into(), || async {}).is_err());
    }

    #[tokio::test]
    async fn loop_runs_task_on_each_fire() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = spawn_cron_loop("tick", "* * * * * *".into(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.abort();
        assert!(runs.load(Ordering::SeqCst) >= 1);
    }
}
