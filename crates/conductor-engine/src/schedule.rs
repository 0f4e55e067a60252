//! Interval scheduling.
//!
//! Expressions take the form `every N <unit>` where unit is second, minute,
//! hour or day (singular or plural, case-insensitive). Each schedule owns a
//! Tokio task that fires once per period; the first tick lands one full
//! period after creation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};

static INTERVAL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*every\s+(\d+)\s+(second|minute|hour|day)s?\s*$").ok()
});

/// Parse an interval expression into milliseconds.
pub fn parse_interval(expression: &str) -> Result<u64> {
    let invalid = |reason: &str| EngineError::ScheduleFormat {
        expression: expression.to_string(),
        reason: reason.to_string(),
    };

    let caps = INTERVAL_RE
        .as_ref()
        .and_then(|re| re.captures(expression))
        .ok_or_else(|| invalid("expected 'every N second(s)|minute(s)|hour(s)|day(s)'"))?;

    let count: u64 = caps[1]
        .parse()
        .map_err(|_| invalid("interval count is out of range"))?;
    if count == 0 {
        return Err(invalid("interval must be greater than zero"));
    }

    let unit_ms: u64 = match caps[2].to_ascii_lowercase().as_str() {
        "second" => 1_000,
        "minute" => 60_000,
        "hour" => 3_600_000,
        _ => 86_400_000,
    };
    count
        .checked_mul(unit_ms)
        .ok_or_else(|| invalid("interval is too large"))
}

/// Snapshot of an active schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleInfo {
    pub id: String,
    pub workflow_id: String,
    pub expression: String,
    pub interval_ms: u64,
    pub created_at: DateTime<Utc>,
    /// Number of times the timer has fired.
    pub ticks: u64,
}

struct ActiveSchedule {
    info: ScheduleInfo,
    ticks: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

/// What a tick callback asks the timer to do next.
pub enum TickOutcome {
    Continue,
    Stop,
}

/// Owns the interval timers.
#[derive(Default)]
pub struct Scheduler {
    active: Mutex<HashMap<String, ActiveSchedule>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a timer that calls `tick` once per interval.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, workflow_id: &str, expression: &str, tick: F) -> Result<String>
    where
        F: Fn() -> TickOutcome + Send + Sync + 'static,
    {
        let interval_ms = parse_interval(expression)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| EngineError::ExecutionFailed("no async runtime available".into()))?;

        let id = Uuid::new_v4().to_string();
        let period = Duration::from_millis(interval_ms);
        let ticks = Arc::new(AtomicU64::new(0));

        let handle = {
            let ticks = Arc::clone(&ticks);
            let schedule_id = id.clone();
            runtime.spawn(async move {
                let mut timer = tokio::time::interval_at(Instant::now() + period, period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    timer.tick().await;
                    let n = ticks.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(schedule_id = %schedule_id, tick = n, "Schedule fired");
                    if let TickOutcome::Stop = tick() {
                        debug!(schedule_id = %schedule_id, "Schedule timer exiting");
                        break;
                    }
                }
            })
        };

        let info = ScheduleInfo {
            id: id.clone(),
            workflow_id: workflow_id.to_string(),
            expression: expression.to_string(),
            interval_ms,
            created_at: Utc::now(),
            ticks: 0,
        };
        self.active.lock().insert(
            id.clone(),
            ActiveSchedule {
                info,
                ticks,
                handle,
            },
        );

        info!(schedule_id = %id, workflow_id = %workflow_id, interval_ms, "Schedule created");
        Ok(id)
    }

    /// Cancel one schedule.
    pub fn cancel(&self, schedule_id: &str) -> Result<()> {
        let entry = self
            .active
            .lock()
            .remove(schedule_id)
            .ok_or_else(|| EngineError::ScheduleNotFound(schedule_id.to_string()))?;
        entry.handle.abort();
        info!(schedule_id = %schedule_id, "Schedule cancelled");
        Ok(())
    }

    /// Active schedules, oldest first.
    pub fn list(&self) -> Vec<ScheduleInfo> {
        let mut list: Vec<ScheduleInfo> = self
            .active
            .lock()
            .values()
            .map(|s| ScheduleInfo {
                ticks: s.ticks.load(Ordering::Relaxed),
                ..s.info.clone()
            })
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        list
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort every timer. Returns how many were cancelled.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<ActiveSchedule> =
            self.active.lock().drain().map(|(_, s)| s).collect();
        for schedule in &drained {
            schedule.handle.abort();
        }
        if !drained.is_empty() {
            warn!(count = drained.len(), "Cancelled active schedules");
        }
        drained.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for (_, schedule) in self.active.get_mut().drain() {
            schedule.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval_units() {
        assert_eq!(parse_interval("every 1 second").unwrap(), 1_000);
        assert_eq!(parse_interval("every 5 minutes").unwrap(), 300_000);
        assert_eq!(parse_interval("every 2 hours").unwrap(), 7_200_000);
        assert_eq!(parse_interval("every 1 day").unwrap(), 86_400_000);
        assert_eq!(parse_interval("  EVERY 10 Seconds ").unwrap(), 10_000);
    }

    #[test]
    fn test_parse_interval_rejects() {
        for bad in [
            "every day",
            "every 5 fortnights",
            "sometimes",
            "every -1 minutes",
            "every 1.5 hours",
            "",
            "every 0 seconds",
            "every 99999999999999999999999 days",
            "every 999999999999999 days",
        ] {
            let err = parse_interval(bad).unwrap_err();
            assert!(
                matches!(err, EngineError::ScheduleFormat { .. }),
                "expected format error for {bad:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_each_period() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&fired);
        let id = scheduler
            .schedule("wf", "every 1 second", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                TickOutcome::Continue
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.list()[0].ticks, 3);

        scheduler.cancel(&id).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_outcome_ends_timer() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&fired);
        scheduler
            .schedule("wf", "every 1 second", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                TickOutcome::Stop
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_keeps_timer_alive() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&fired);
        scheduler
            .schedule("wf", "every 1 second", move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 2 {
                    tracing::warn!(tick = n, "Scheduled run failed to start");
                }
                TickOutcome::Continue
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 4);
        assert_eq!(scheduler.list()[0].ticks, 4);
    }

    #[tokio::test]
    async fn test_cancel_unknown() {
        let scheduler = Scheduler::new();
        assert!(matches!(
            scheduler.cancel("nope").unwrap_err(),
            EngineError::ScheduleNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_invalid_expression_creates_nothing() {
        let scheduler = Scheduler::new();
        assert!(scheduler
            .schedule("wf", "every blue moon", || TickOutcome::Continue)
            .is_err());
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_all() {
        let scheduler = Scheduler::new();
        for _ in 0..3 {
            scheduler
                .schedule("wf", "every 1 hour", || TickOutcome::Continue)
                .unwrap();
        }
        assert_eq!(scheduler.list().len(), 3);
        assert_eq!(scheduler.shutdown(), 3);
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.shutdown(), 0);
    }
}
