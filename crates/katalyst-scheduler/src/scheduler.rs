//! The scheduler itself: fixed-rate, fixed-delay, and cron-driven repeating
//! tasks, each running as its own supervised coroutine (spec §4.7).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::cron::CronSchedule;
use crate::error::SchedulerError;
use crate::schedule::{cancellation_channel, ScheduleConfig, ScheduleHandle, Task};

/// Coordinates repeating tasks. Stateless beyond bookkeeping; every
/// schedule is an independent `tokio::spawn`ed loop driven by its own
/// cancellation channel, so a slow or stuck task never blocks another.
#[derive(Default)]
pub struct Scheduler;

impl Scheduler {
    pub fn new() -> Self {
        Self
    }

    /// Waits `initial_delay`, then repeats `task` on a period equal to
    /// `fixed_rate`, measured between the *start* of successive runs. If a
    /// run overruns the period, the next run starts immediately rather than
    /// overlapping it (the loop never spawns two executions concurrently).
    /// `fixed_rate` of zero runs the task exactly once.
    pub fn schedule_fixed_rate(
        &self,
        config: ScheduleConfig,
        task: Task,
        initial_delay: Duration,
        fixed_rate: Duration,
    ) -> Arc<ScheduleHandle> {
        let (cancel_tx, mut cancel_rx) = cancellation_channel();
        let name = config.name.clone();
        let join_name = name.clone();

        let join = tokio::spawn(async move {
            if !sleep_or_cancel(initial_delay, &mut cancel_rx).await {
                return;
            }

            let mut execution: u64 = 0;
            loop {
                if *cancel_rx.borrow() {
                    return;
                }

                let start = Instant::now();
                execution += 1;
                run_once(&config, &task, execution).await;

                if fixed_rate.is_zero() {
                    return;
                }

                let elapsed = start.elapsed();
                let remaining = fixed_rate.saturating_sub(elapsed);
                if !sleep_or_cancel(remaining, &mut cancel_rx).await {
                    return;
                }
            }
        });

        info!(schedule = %join_name, mode = "fixed-rate", "schedule started");
        ScheduleHandle::new(name, cancel_tx, join)
    }

    /// Repeats `task` with `delay` measured between the *end* of one run
    /// and the *start* of the next.
    pub fn schedule_fixed_delay(
        &self,
        config: ScheduleConfig,
        task: Task,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<Arc<ScheduleHandle>, SchedulerError> {
        if delay.is_zero() {
            return Err(SchedulerError::InvalidScheduleConfig(
                "fixed-delay schedules require delay > 0".to_string(),
            ));
        }

        let (cancel_tx, mut cancel_rx) = cancellation_channel();
        let name = config.name.clone();
        let join_name = name.clone();

        let join = tokio::spawn(async move {
            if !sleep_or_cancel(initial_delay, &mut cancel_rx).await {
                return;
            }

            let mut execution: u64 = 0;
            loop {
                if *cancel_rx.borrow() {
                    return;
                }

                execution += 1;
                run_once(&config, &task, execution).await;

                if !sleep_or_cancel(delay, &mut cancel_rx).await {
                    return;
                }
            }
        });

        info!(schedule = %join_name, mode = "fixed-delay", "schedule started");
        Ok(ScheduleHandle::new(name, cancel_tx, join))
    }

    /// Repeats `task` at the instants produced by `cron_expr` evaluated in
    /// `tz`. After each execution the next fire instant is recomputed from
    /// the calendar, so drift never accumulates across runs.
    pub fn schedule_cron(
        &self,
        config: ScheduleConfig,
        task: Task,
        cron_expr: &str,
        tz: chrono_tz::Tz,
    ) -> Result<Arc<ScheduleHandle>, SchedulerError> {
        let cron = CronSchedule::parse(cron_expr, tz).map_err(SchedulerError::CronInvalid)?;

        let (cancel_tx, mut cancel_rx) = cancellation_channel();
        let name = config.name.clone();
        let join_name = name.clone();

        let join = tokio::spawn(async move {
            let mut execution: u64 = 0;
            loop {
                if *cancel_rx.borrow() {
                    return;
                }

                let now = chrono::Utc::now().with_timezone(&tz);
                let next = cron.next_fire(now);
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

                if !sleep_or_cancel(wait, &mut cancel_rx).await {
                    return;
                }
                if *cancel_rx.borrow() {
                    return;
                }

                execution += 1;
                run_once(&config, &task, execution).await;
            }
        });

        info!(schedule = %join_name, mode = "cron", expr = %cron_expr, "schedule started");
        Ok(ScheduleHandle::new(name, cancel_tx, join))
    }
}

/// Sleeps for `duration`, returning early (with `false`) if cancellation
/// fires first. Returns `true` if the sleep ran to completion.
async fn sleep_or_cancel(duration: Duration, cancel_rx: &mut tokio::sync::watch::Receiver<bool>) -> bool {
    if duration.is_zero() {
        return !*cancel_rx.borrow();
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => !*cancel_rx.borrow(),
        _ = cancel_rx.changed() => false,
    }
}

async fn run_once(config: &ScheduleConfig, task: &Task, execution: u64) {
    let start = Instant::now();
    let outcome = match config.max_execution_time {
        Some(timeout) => match tokio::time::timeout(timeout, task()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(schedule = %config.name, execution, "task exceeded max execution time");
                if let Some(on_error) = &config.on_error {
                    on_error(&config.name, &SchedulerError::TaskTimeout, execution);
                }
                return;
            }
        },
        None => task().await,
    };

    match outcome {
        Ok(()) => {
            if let Some(on_success) = &config.on_success {
                on_success(&config.name, execution, start.elapsed());
            }
        }
        Err(reason) => {
            warn!(schedule = %config.name, execution, reason = %reason, "task failed");
            if let Some(on_error) = &config.on_error {
                on_error(&config.name, &SchedulerError::TaskException(reason), execution);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use parking_lot::Mutex;

    use super::*;

    fn counting_task(counter: Arc<AtomicU64>) -> Task {
        Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_rate_runs_immediately_after_zero_initial_delay() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU64::new(0));
        let handle = scheduler.schedule_fixed_rate(
            ScheduleConfig::new("tick"),
            counting_task(counter.clone()),
            Duration::ZERO,
            Duration::from_millis(10),
        );

        tokio::time::advance(Duration::from_millis(35)).await;
        handle.cancel();
        handle.join().await;

        assert!(counter.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_rate_of_zero_runs_exactly_once() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU64::new(0));
        let handle = scheduler.schedule_fixed_rate(
            ScheduleConfig::new("once"),
            counting_task(counter.clone()),
            Duration::ZERO,
            Duration::ZERO,
        );

        handle.join().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fixed_delay_requires_positive_delay() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU64::new(0));
        let result = scheduler.schedule_fixed_delay(
            ScheduleConfig::new("bad"),
            counting_task(counter),
            Duration::ZERO,
            Duration::ZERO,
        );
        assert!(matches!(result, Err(SchedulerError::InvalidScheduleConfig(_))));
    }

    #[tokio::test]
    async fn invalid_cron_expression_is_rejected_before_spawning() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU64::new(0));
        let result = scheduler.schedule_cron(
            ScheduleConfig::new("bad-cron"),
            counting_task(counter),
            "60 * * * * *",
            chrono_tz::UTC,
        );
        assert!(matches!(result, Err(SchedulerError::CronInvalid(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn on_error_hook_fires_when_task_times_out() {
        let scheduler = Scheduler::new();
        let timed_out = Arc::new(Mutex::new(false));
        let timed_out_clone = timed_out.clone();

        let task: Task = Arc::new(|| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
        });

        let config = ScheduleConfig::new("slow")
            .with_max_execution_time(Duration::from_millis(5))
            .with_on_error(Arc::new(move |_name, err, _execution| {
                if matches!(err, SchedulerError::TaskTimeout) {
                    *timed_out_clone.lock() = true;
                }
            }));

        let handle = scheduler.schedule_fixed_rate(config, task, Duration::ZERO, Duration::ZERO);
        tokio::time::advance(Duration::from_millis(20)).await;
        handle.join().await;

        assert!(*timed_out.lock());
    }
}
