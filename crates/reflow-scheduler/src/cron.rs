//! Pure cron due-time evaluation. No I/O, no clocks: callers supply `now`.

use std::str::FromStr;

use chrono::{DateTime, Duration, Timelike, Utc};
use cron::Schedule;

use crate::error::{Result, SchedulerError};

/// Parse a 5-field standard cron expression.
///
/// The upstream registry stores expressions in classic `min hour dom month
/// dow` form, occasionally with a trailing `# comment`; the comment is
/// stripped before parsing. The `cron` crate wants a seconds field, so a
/// literal `0` is prepended internally — fire times always land on whole
/// minutes.
pub fn parse_standard(expr: &str) -> Result<Schedule> {
    let cleaned = expr.split('#').next().unwrap_or("").trim();
    let fields = cleaned.split_whitespace().count();
    if fields != 5 {
        return Err(SchedulerError::InvalidSchedule {
            expr: expr.to_string(),
            reason: format!("expected 5 fields, got {fields}"),
        });
    }
    Schedule::from_str(&format!("0 {cleaned}")).map_err(|e| SchedulerError::InvalidSchedule {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Evaluates cron expressions against an overlapping timing window.
///
/// All comparisons happen in UTC at whole-second granularity. The window is
/// half-open on the left so a boundary instant handled by the previous
/// window never re-fires, and inclusive on the right so an instant exactly
/// matching `now` fires.
#[derive(Debug, Clone)]
pub struct CronEvaluator {
    window: Duration,
}

impl CronEvaluator {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Next fire time strictly after `after`, or `None` if the expression
    /// never fires again.
    pub fn next_fire_after(
        &self,
        expr: &str,
        after: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let schedule = parse_standard(expr)?;
        Ok(schedule.after(&truncate_secs(after)).next())
    }

    /// Decide whether the task is due at `now`.
    ///
    /// Computes the next fire strictly after `now - window`; if that instant
    /// is `<= now` the task is due and the *nominal* scheduled instant is
    /// returned — not `now` — because run-date tagging and result
    /// partitioning must reflect when the run was meant to happen.
    pub fn due_at(&self, expr: &str, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let now = truncate_secs(now);
        let start = now - self.window;
        let next = parse_standard(expr)?.after(&start).next();
        Ok(next.filter(|t| *t <= now))
    }

    /// Every fire time in the half-open window `(start, end]`. A zero-length
    /// window is legal and yields nothing.
    pub fn fires_in_window(
        &self,
        expr: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let start = truncate_secs(start);
        let end = truncate_secs(end);
        let schedule = parse_standard(expr)?;
        Ok(schedule
            .after(&start)
            .take_while(|t| *t <= end)
            .collect())
    }
}

fn truncate_secs(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}
