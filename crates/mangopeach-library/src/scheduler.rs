//! Periodic rescans.

use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use mangopeach_core::{CatalogError, LibraryId};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Parse a human-readable interval such as `"30m"` or `"1h 30m"`.
///
/// Zero-length intervals and anything humantime does not understand are
/// rejected. Cron expressions such as `"0 * * * *"` are not a supported
/// interval format.
pub fn parse_interval(value: &str) -> Result<Duration, CatalogError> {
    let invalid = |reason: String| CatalogError::InvalidConfig {
        message: format!("invalid scan interval {value:?}: {reason}"),
    };
    let period = humantime::parse_duration(value.trim()).map_err(|err| invalid(err.to_string()))?;
    if period.is_zero() {
        return Err(invalid("interval must be greater than zero".to_string()));
    }
    Ok(period)
}

/// One run of a scheduled job.
pub type JobRun = BoxFuture<'static, Result<(), CatalogError>>;

/// A unit of scheduled work. Returning `None` ends the schedule.
pub type ScheduledJob = Box<dyn Fn() -> Option<JobRun> + Send + Sync>;

struct JobHandle {
    period: Duration,
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Runs one periodic job per library.
///
/// Cancelling a job stops further ticks; a run already in progress finishes.
#[derive(Default)]
pub struct Scheduler {
    jobs: DashMap<LibraryId, JobHandle>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` every `period`, starting one period from now.
    ///
    /// Replaces any job already scheduled for the library. Must be called
    /// from within a tokio runtime.
    pub fn schedule(&self, library_id: LibraryId, period: Duration, job: ScheduledJob) {
        self.cancel(&library_id);

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let id = library_id.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(run) = job() else {
                    debug!(library = %id, "Scheduled job owner gone");
                    break;
                };
                info!(library = %id, "Running scheduled scan");
                if let Err(err) = run.await {
                    error!(library = %id, error = %err, "Scheduled scan failed");
                }
            }
            debug!(library = %id, "Schedule stopped");
        });

        self.jobs.insert(
            library_id,
            JobHandle {
                period,
                token,
                task,
            },
        );
    }

    /// Stop the job of a library. Returns false when none was scheduled.
    pub fn cancel(&self, library_id: &LibraryId) -> bool {
        match self.jobs.remove(library_id) {
            Some((_, job)) => {
                job.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop every job.
    pub fn shutdown(&self) {
        let ids: Vec<LibraryId> = self.jobs.iter().map(|job| job.key().clone()).collect();
        for id in &ids {
            self.cancel(id);
        }
        if !ids.is_empty() {
            info!(jobs = ids.len(), "All scheduled scans stopped");
        }
    }

    pub fn is_scheduled(&self, library_id: &LibraryId) -> bool {
        self.jobs
            .get(library_id)
            .is_some_and(|job| !job.task.is_finished())
    }

    /// Interval of a library's job, if one is scheduled.
    pub fn period(&self, library_id: &LibraryId) -> Option<Duration> {
        self.jobs.get(library_id).map(|job| job.period)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for job in self.jobs.iter() {
            job.token.cancel();
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheduled: Vec<String> = self.jobs.iter().map(|job| job.key().to_string()).collect();
        f.debug_struct("Scheduler")
            .field("scheduled", &scheduled)
            .finish()
    }
}
