//! Cron-driven maintenance jobs.
//!
//! A job whose previous run is still in flight skips its tick instead of
//! stacking up behind a slow database.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Set `SCHEDULER_ENABLED=false` on all but one replica.
    pub enabled: bool,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let enabled = match std::env::var("SCHEDULER_ENABLED") {
            Ok(v) => !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "no"),
            Err(_) => true,
        };
        Self { enabled }
    }
}

pub struct Scheduler {
    jobs: JobScheduler,
    enabled: bool,
}

/// Clears the in-flight flag when a run finishes or panics.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scheduler {
    pub async fn new(config: SchedulerConfig) -> Result<Self, JobSchedulerError> {
        Ok(Self {
            jobs: JobScheduler::new().await?,
            enabled: config.enabled,
        })
    }

    /// Register `task` on a six-field cron `schedule` (seconds first).
    pub async fn add_cron<F, Fut>(&self, name: &'static str, schedule: &str, task: F) -> Result<Uuid, JobSchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = Arc::new(task);
        let running = Arc::new(AtomicBool::new(false));

        let job = Job::new_async(schedule, move |_id, _jobs| {
            let task = task.clone();
            let running = running.clone();
            Box::pin(async move {
                if running.swap(true, Ordering::AcqRel) {
                    tracing::warn!(job = name, "Previous run still in progress; skipping tick");
                    return;
                }
                let _guard = RunGuard(running);

                let started = Instant::now();
                task().await;
                tracing::debug!(job = name, elapsed_ms = started.elapsed().as_millis() as u64, "Job finished");
            })
        })?;

        let id = self.jobs.add(job).await?;
        tracing::info!(job = name, %schedule, job_id = %id, "Cron job registered");
        Ok(id)
    }

    /// Begin ticking. When disabled, registered jobs never run.
    pub async fn start(&self) -> Result<(), JobSchedulerError> {
        if self.enabled {
            self.jobs.start().await?;
        }
        tracing::info!(enabled = self.enabled, "Scheduler ready");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        self.jobs.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn disabled() -> Scheduler {
        Scheduler::new(SchedulerConfig { enabled: false }).await.unwrap()
    }

    #[tokio::test]
    async fn test_invalid_cron_expression_is_rejected() {
        let result = disabled().await.add_cron("broken", "every tuesday", || async {}).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_disabled_scheduler_starts_as_noop() {
        let scheduler = disabled().await;
        scheduler.add_cron("noop", "0 0 3 * * *", || async {}).await.unwrap();

        assert!(scheduler.start().await.is_ok());
    }

    #[test]
    fn test_run_guard_clears_flag() {
        let running = Arc::new(AtomicBool::new(true));
        drop(RunGuard(running.clone()));

        assert!(!running.load(Ordering::Acquire));
    }
}
