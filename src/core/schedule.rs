//! Cron-driven recurring trigger.

use crate::utils::error::{EtlError, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::future::Future;
use std::str::FromStr;

/// Parses a 7-field cron expression (sec min hour day month weekday year).
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    Schedule::from_str(expression).map_err(|e| EtlError::InvalidConfigValue {
        field: "schedule".to_string(),
        value: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Fires a job at each upcoming schedule tick. Missed ticks are never
/// backfilled; the next run is always computed from the current time.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    expression: String,
    schedule: Schedule,
}

impl CronTrigger {
    pub fn new(expression: &str) -> Result<Self> {
        Ok(Self {
            expression: expression.to_string(),
            schedule: parse_schedule(expression)?,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }

    /// Sleeps until each tick and runs `job`, until Ctrl-C arrives while
    /// waiting. A job that is already running is allowed to finish.
    pub async fn run<F, Fut>(&self, mut job: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            let now = Utc::now();
            let next = self.next_after(now).ok_or_else(|| {
                EtlError::config(format!("schedule '{}' has no upcoming run", self.expression))
            })?;
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::info!("Next run at {} (in {}s)", next, wait.as_secs());

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, stopping scheduler");
                    return Ok(());
                }
            }

            job().await;
        }
    }
}
