//! Error taxonomy for the scheduler (spec §7).

use thiserror::Error;

use crate::cron::CronError;

#[derive(Debug, Error, Clone)]
pub enum SchedulerError {
    #[error("cron expression is invalid: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    CronInvalid(Vec<CronError>),

    #[error("task exceeded its maximum execution time")]
    TaskTimeout,

    #[error("task failed: {0}")]
    TaskException(String),

    #[error("schedule config is invalid: {0}")]
    InvalidScheduleConfig(String),
}
