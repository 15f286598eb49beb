use clinic_core::ClinicConfig;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Fixed-interval driver for polls.
///
/// The first tick fires immediately so a freshly opened view loads without waiting a full
/// interval. Ticks missed while a poll runs long are delayed, not bunched.
#[derive(Clone, Copy, Debug)]
pub struct PollScheduler {
    interval: Duration,
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_config(cfg: &ClinicConfig) -> Self {
        Self::new(cfg.poll_interval())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Calls `tick` on every interval until `shutdown` flips to `true` or its sender drops.
    pub async fn run<F, Fut>(&self, mut shutdown: watch::Receiver<bool>, mut tick: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("poll scheduler stopped");
    }
}
