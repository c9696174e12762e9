// ⏱️ Scheduler - run a task now, then on a fixed interval, forever
//
// Ticks are sequential: a slow run delays the next tick instead of queueing
// extra ones, so two runs of the same task never overlap.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Default refresh interval for the exit-node feed
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// A unit of recurring background work. Failures are the task's own business:
/// `run` logs and returns, the schedule keeps going.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self);
}

/// Run `task` immediately, then once per `period`. Never returns.
pub async fn run_forever(task: Arc<dyn PeriodicTask>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        task = task.name(),
        period_secs = period.as_secs(),
        "scheduler started"
    );

    loop {
        // First tick completes immediately: that is the startup run
        ticker.tick().await;
        debug!(task = task.name(), "running scheduled task");
        task.run().await;
    }
}

/// Spawn [`run_forever`] on the tokio runtime.
pub fn spawn(task: Arc<dyn PeriodicTask>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(run_forever(task, period))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        runs: AtomicUsize,
        work: Duration,
    }

    #[async_trait]
    impl PeriodicTask for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn run(&self) {
            tokio::time::sleep(self.work).await;
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_at_startup_then_every_period() {
        let counter = Arc::new(Counter {
            runs: AtomicUsize::new(0),
            work: Duration::ZERO,
        });
        let handle = spawn(counter.clone(), Duration::from_secs(3600));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), 4);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_run_delays_next_tick() {
        // Each run takes 90 minutes against a 60 minute period
        let counter = Arc::new(Counter {
            runs: AtomicUsize::new(0),
            work: Duration::from_secs(90 * 60),
        });
        let handle = spawn(counter.clone(), Duration::from_secs(3600));

        // Runs are back to back: they finish at 90, 180, 270 minutes
        tokio::time::sleep(Duration::from_secs(275 * 60)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), 3);

        handle.abort();
    }
}
