//! Keyed one-shot timers
//!
//! Each job is a tokio task sleeping until its fire time. The fire time lives
//! in a `watch` channel so a job can be moved without being recreated, and
//! dropping the sender (removing the job from the map) cancels the task.

use crate::SCHEDULER_TARGET;
use crate::error::{PaladinError, PaladinResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, info};

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type JobCallback = Box<dyn FnOnce() -> JobFuture + Send + 'static>;

struct Job {
    generation: u64,
    fire_at: watch::Sender<DateTime<Utc>>,
}

struct JobsInner {
    jobs: DashMap<String, Job>,
    running: AtomicBool,
    generations: AtomicU64,
}

/// Timer engine holding at most one job per id
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<JobsInner>,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(JobsInner {
                jobs: DashMap::new(),
                running: AtomicBool::new(false),
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn start(&self) {
        self.inner.running.store(true, Ordering::SeqCst);
        info!(target: SCHEDULER_TARGET, "Job scheduler started");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs and cancel every pending timer.
    ///
    /// Callbacks that are already running are left to finish.
    pub fn shutdown(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let cancelled = self.inner.jobs.len();
        self.inner.jobs.clear();
        info!(target: SCHEDULER_TARGET, cancelled = cancelled, "Job scheduler stopped");
    }

    /// Create a one-shot job. An existing job with the same id is replaced.
    ///
    /// # Errors
    /// Returns [`PaladinError::SchedulerNotRunning`] before `start` or after `shutdown`.
    pub fn add_job(
        &self,
        id: impl Into<String>,
        fire_at: DateTime<Utc>,
        callback: JobCallback,
    ) -> PaladinResult<()> {
        if !self.is_running() {
            return Err(PaladinError::SchedulerNotRunning);
        }

        let id = id.into();
        let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = watch::channel(fire_at);
        if self
            .inner
            .jobs
            .insert(id.clone(), Job { generation, fire_at: tx })
            .is_some()
        {
            debug!(target: SCHEDULER_TARGET, job_id = %id, "Replaced existing job");
        }

        tokio::spawn(run_job(
            Arc::clone(&self.inner),
            id,
            generation,
            rx,
            callback,
        ));
        Ok(())
    }

    /// Move an existing job to a new fire time. Returns `false` if there is no such job.
    pub fn reschedule(&self, id: &str, fire_at: DateTime<Utc>) -> bool {
        match self.inner.jobs.get(id) {
            Some(job) => {
                job.fire_at.send_replace(fire_at);
                true
            }
            None => false,
        }
    }

    /// Cancel a job. Returns `false` if there was none.
    pub fn remove_job(&self, id: &str) -> bool {
        self.inner.jobs.remove(id).is_some()
    }

    #[must_use]
    pub fn next_run_time(&self, id: &str) -> Option<DateTime<Utc>> {
        self.inner.jobs.get(id).map(|job| *job.fire_at.borrow())
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.inner.jobs.contains_key(id)
    }

    #[must_use]
    pub fn job_count(&self) -> usize {
        self.inner.jobs.len()
    }
}

async fn run_job(
    inner: Arc<JobsInner>,
    id: String,
    generation: u64,
    mut fire_at: watch::Receiver<DateTime<Utc>>,
    callback: JobCallback,
) {
    loop {
        let deadline = *fire_at.borrow_and_update();
        let delay = (deadline - Utc::now()).to_std().unwrap_or_default();

        tokio::select! {
            () = tokio::time::sleep(delay) => {
                // A replaced or removed job must not fire
                let owned = inner
                    .jobs
                    .remove_if(&id, |_, job| job.generation == generation)
                    .is_some();
                if owned {
                    debug!(target: SCHEDULER_TARGET, job_id = %id, "Firing job");
                    callback().await;
                }
                return;
            }
            changed = fire_at.changed() => {
                if changed.is_err() {
                    debug!(target: SCHEDULER_TARGET, job_id = %id, "Job cancelled");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_callback(counter: &Arc<AtomicUsize>) -> JobCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    fn running() -> JobScheduler {
        let scheduler = JobScheduler::new();
        scheduler.start();
        scheduler
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_fires_once_at_deadline() {
        let scheduler = running();
        let fired = Arc::new(AtomicUsize::new(0));
        scheduler
            .add_job("1|2", Utc::now() + ChronoDuration::seconds(30), counting_callback(&fired))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(scheduler.contains("1|2"));

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.job_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_moves_the_job() {
        let scheduler = running();
        let fired = Arc::new(AtomicUsize::new(0));
        scheduler
            .add_job("1|2", Utc::now() + ChronoDuration::seconds(10), counting_callback(&fired))
            .unwrap();

        let later = Utc::now() + ChronoDuration::seconds(100);
        assert!(scheduler.reschedule("1|2", later));
        assert_eq!(scheduler.next_run_time("1|2"), Some(later));

        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_job_never_fires() {
        let scheduler = running();
        let fired = Arc::new(AtomicUsize::new(0));
        scheduler
            .add_job("1|2", Utc::now() + ChronoDuration::seconds(5), counting_callback(&fired))
            .unwrap();

        assert!(scheduler.remove_job("1|2"));
        assert!(!scheduler.remove_job("1|2"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_a_job_cancels_the_old_one() {
        let scheduler = running();
        let old = Arc::new(AtomicUsize::new(0));
        let new = Arc::new(AtomicUsize::new(0));
        scheduler
            .add_job("1|2", Utc::now() + ChronoDuration::seconds(5), counting_callback(&old))
            .unwrap();
        scheduler
            .add_job("1|2", Utc::now() + ChronoDuration::seconds(5), counting_callback(&new))
            .unwrap();
        assert_eq!(scheduler.job_count(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(old.load(Ordering::SeqCst), 0);
        assert_eq!(new.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejects_jobs_when_stopped() {
        let scheduler = JobScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let result = scheduler.add_job("1|2", Utc::now(), counting_callback(&fired));
        assert!(matches!(result, Err(PaladinError::SchedulerNotRunning)));

        scheduler.start();
        scheduler
            .add_job("1|2", Utc::now() + ChronoDuration::hours(1), counting_callback(&fired))
            .unwrap();
        scheduler.shutdown();
        assert_eq!(scheduler.job_count(), 0);
        assert!(!scheduler.is_running());
    }
}
