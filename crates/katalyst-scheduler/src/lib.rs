//! Coroutine-based task scheduler: fixed-rate, fixed-delay, and cron-driven
//! repeating work, each as an independently cancellable supervised task.

pub mod cron;
pub mod error;
pub mod schedule;
pub mod scheduler;

pub mod prelude {
    pub use crate::cron::{CronError, CronSchedule};
    pub use crate::error::SchedulerError;
    pub use crate::schedule::{OnError, OnSuccess, ScheduleConfig, ScheduleHandle, Task};
    pub use crate::scheduler::Scheduler;
}
