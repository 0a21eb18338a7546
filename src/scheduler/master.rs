use super::job::{BuildJob, JobOutcome};
use super::runner::JobRunner;
use super::worker::{BuildWorker, Completion};
use crate::config::SchedulerConfig;
use crate::types::SiteKey;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("spawning {what}: {source}")]
    Spawn {
        what: String,
        #[source]
        source: io::Error,
    },
}

/// A request the intake could not take. The job is handed back.
#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error("build intake is full, {0} not queued")]
    Full(BuildJob),
    #[error("build scheduler is gone, {0} not queued")]
    Stopped(BuildJob),
}

impl EnqueueError {
    pub fn into_job(self) -> BuildJob {
        match self {
            EnqueueError::Full(job) | EnqueueError::Stopped(job) => job,
        }
    }
}

/// Counters for one start/stop cycle of the master.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Requests taken from the intake.
    pub enqueued: usize,
    /// Jobs handed to a worker.
    pub dispatched: usize,
    /// Throttled requests superseded by a newer one for the same key.
    pub coalesced: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Accepted jobs still waiting when the master stopped.
    pub abandoned: usize,
}

enum Request {
    Job(BuildJob),
    /// Reply once nothing is queued, throttled or running.
    Idle(Sender<()>),
}

/// Cloneable front door of a [`BuildMaster`], usable from any thread.
#[derive(Clone)]
pub struct BuildHandle {
    intake: Sender<Request>,
}

impl BuildHandle {
    /// Request a build of `key`. Blocks only while the intake is full.
    pub fn launch_site_build(&self, key: SiteKey) -> Result<(), EnqueueError> {
        self.enqueue(BuildJob::build(key))
    }

    /// Request removal of `key`'s output.
    pub fn launch_site_deletion(&self, key: SiteKey) -> Result<(), EnqueueError> {
        self.enqueue(BuildJob::delete(key))
    }

    pub fn enqueue(&self, job: BuildJob) -> Result<(), EnqueueError> {
        self.intake
            .send(Request::Job(job.clone()))
            .map_err(|_| EnqueueError::Stopped(job))
    }

    /// Like [`enqueue`](Self::enqueue), but fails instead of blocking.
    pub fn try_enqueue(&self, job: BuildJob) -> Result<(), EnqueueError> {
        match self.intake.try_send(Request::Job(job.clone())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(EnqueueError::Full(job)),
            Err(TrySendError::Disconnected(_)) => Err(EnqueueError::Stopped(job)),
        }
    }

    /// Requests waiting in the intake, not yet seen by the master.
    pub fn pending(&self) -> usize {
        self.intake.len()
    }

    /// Block until every request enqueued before this call has finished.
    ///
    /// Returns `false` when the master stopped first. The master must be
    /// running for this to return.
    pub fn wait_idle(&self) -> bool {
        let (tx, rx) = bounded(1);
        if self.intake.send(Request::Idle(tx)).is_err() {
            return false;
        }
        rx.recv().is_ok()
    }
}

struct Running {
    stop: Sender<()>,
    coordinator: JoinHandle<SchedulerStats>,
}

/// Coalescing per-site dispatcher over a fixed worker pool.
///
/// One coordination thread owns all scheduling state; everything else talks
/// to it through channels. At most one job per site key is ever in a
/// worker's hands.
pub struct BuildMaster {
    config: SchedulerConfig,
    runner: Arc<dyn JobRunner>,
    intake_tx: Sender<Request>,
    intake_rx: Receiver<Request>,
    running: Option<Running>,
}

impl BuildMaster {
    pub fn new(config: SchedulerConfig, runner: Arc<dyn JobRunner>) -> Self {
        let (intake_tx, intake_rx) = bounded(config.intake_capacity.max(1));
        Self {
            config,
            runner,
            intake_tx,
            intake_rx,
            running: None,
        }
    }

    pub fn handle(&self) -> BuildHandle {
        BuildHandle {
            intake: self.intake_tx.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bring up the worker pool and the coordination loop. No-op when
    /// already running.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.running.is_some() {
            return Ok(());
        }

        let size = self.config.workers.max(1);
        let (done_tx, done_rx) = bounded(size);
        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            match BuildWorker::run(id, self.runner.clone(), done_tx.clone()) {
                Ok(worker) => workers.push(worker),
                Err(source) => {
                    workers.into_iter().for_each(BuildWorker::stop);
                    return Err(SchedulerError::Spawn {
                        what: format!("build worker {id}"),
                        source,
                    });
                }
            }
        }

        let (stop_tx, stop_rx) = bounded(1);
        let intake = self.intake_rx.clone();
        let coordinator = Coordinator::new(workers);
        let spawned = thread::Builder::new()
            .name("build-master".into())
            .spawn(move || coordinator.run(&intake, &done_rx, &stop_rx));
        let coordinator = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                // the closure owned the workers; dropping it closed their
                // channels, so their loops exit on their own
                return Err(SchedulerError::Spawn {
                    what: "build master".into(),
                    source,
                });
            }
        };

        tracing::info!(workers = size, "build master started");
        self.running = Some(Running {
            stop: stop_tx,
            coordinator,
        });
        Ok(())
    }

    /// Stop dispatching, wait for every in-flight job, stop the pool.
    ///
    /// Jobs accepted but not yet dispatched are abandoned. Requests still in
    /// the intake stay there for the next [`start`](Self::start). No-op
    /// returning empty stats when not running.
    pub fn stop(&mut self) -> SchedulerStats {
        let Some(running) = self.running.take() else {
            return SchedulerStats::default();
        };
        let _ = running.stop.send(());
        match running.coordinator.join() {
            Ok(stats) => {
                tracing::info!(
                    dispatched = stats.dispatched,
                    coalesced = stats.coalesced,
                    failed = stats.failed,
                    abandoned = stats.abandoned,
                    "build master stopped"
                );
                stats
            }
            Err(_) => {
                tracing::error!("build master thread panicked");
                SchedulerStats::default()
            }
        }
    }
}

impl Drop for BuildMaster {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Coordination loop
// ============================================================================

struct Coordinator {
    workers: Vec<Option<BuildWorker>>,
    idle: VecDeque<usize>,
    /// Keys accepted and not yet completed: queued in `runnable` or in a
    /// worker's hands.
    running: HashSet<SiteKey>,
    /// Latest request per running key.
    throttled: HashMap<SiteKey, BuildJob>,
    runnable: VecDeque<BuildJob>,
    idle_waiters: Vec<Sender<()>>,
    stats: SchedulerStats,
}

impl Coordinator {
    fn new(workers: Vec<BuildWorker>) -> Self {
        Self {
            idle: (0..workers.len()).collect(),
            workers: workers.into_iter().map(Some).collect(),
            running: HashSet::new(),
            throttled: HashMap::new(),
            runnable: VecDeque::new(),
            idle_waiters: Vec::new(),
            stats: SchedulerStats::default(),
        }
    }

    fn run(
        mut self,
        intake: &Receiver<Request>,
        done: &Receiver<Completion>,
        stop: &Receiver<()>,
    ) -> SchedulerStats {
        loop {
            select! {
                recv(intake) -> msg => match msg {
                    Ok(Request::Job(job)) => {
                        self.stats.enqueued += 1;
                        self.submit(job);
                    }
                    Ok(Request::Idle(waiter)) => {
                        self.idle_waiters.push(waiter);
                        self.notify_if_idle();
                    }
                    Err(_) => break,
                },
                recv(done) -> msg => match msg {
                    Ok(completion) => self.complete(completion),
                    Err(_) => break,
                },
                recv(stop) -> _ => break,
            }
        }
        self.shutdown(done)
    }

    fn submit(&mut self, job: BuildJob) {
        let key = job.site_key().clone();
        if self.running.contains(&key) {
            tracing::debug!(site = %key, kind = %job.kind(), "throttled");
            if let Some(old) = self.throttled.insert(key, job) {
                self.stats.coalesced += 1;
                tracing::debug!(site = %old.site_key(), kind = %old.kind(), "superseded");
            }
            return;
        }
        tracing::debug!(site = %key, kind = %job.kind(), "enqueued");
        self.running.insert(key);
        self.runnable.push_back(job);
        self.pump();
    }

    /// Hand runnable jobs to idle workers.
    fn pump(&mut self) {
        while !self.runnable.is_empty() {
            let Some(id) = self.idle.pop_front() else {
                return;
            };
            let Some(job) = self.runnable.pop_front() else {
                self.idle.push_front(id);
                return;
            };
            let Some(worker) = self.workers[id].as_ref() else {
                self.runnable.push_front(job);
                continue;
            };
            tracing::debug!(worker = id, site = %job.site_key(), kind = %job.kind(), "dispatched");
            match worker.dispatch(job) {
                Ok(()) => self.stats.dispatched += 1,
                Err(err) => {
                    let job = err.into_inner();
                    tracing::error!(worker = id, site = %job.site_key(), "worker is gone");
                    // never reuse the dead slot
                    self.workers[id] = None;
                    self.stats.failed += 1;
                    self.finish_key(job.site_key());
                }
            }
        }
    }

    fn complete(&mut self, completion: Completion) {
        self.record(&completion);
        self.idle.push_back(completion.worker);
        self.finish_key(completion.job.site_key());
        self.pump();
        self.notify_if_idle();
    }

    fn record(&mut self, completion: &Completion) {
        let site = completion.job.site_key();
        match completion.outcome {
            JobOutcome::Succeeded => {
                self.stats.succeeded += 1;
                tracing::info!(site = %site, kind = %completion.job.kind(), "job done");
            }
            JobOutcome::Failed { errors } => {
                self.stats.failed += 1;
                tracing::warn!(site = %site, kind = %completion.job.kind(), errors, "job failed");
            }
        }
    }

    fn finish_key(&mut self, key: &SiteKey) {
        self.running.remove(key);
        if let Some(next) = self.throttled.remove(key) {
            self.submit(next);
        }
    }

    fn notify_if_idle(&mut self) {
        if self.running.is_empty() {
            for waiter in self.idle_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn busy(&self) -> usize {
        let alive = self.workers.iter().filter(|w| w.is_some()).count();
        alive.saturating_sub(self.idle.len())
    }

    fn shutdown(mut self, done: &Receiver<Completion>) -> SchedulerStats {
        for job in self.runnable.drain(..) {
            tracing::warn!(site = %job.site_key(), kind = %job.kind(), "abandoned at shutdown");
            self.stats.abandoned += 1;
        }

        // no dispatch from here on: only wait for the busy workers
        while self.busy() > 0 {
            match done.recv() {
                Ok(completion) => {
                    self.record(&completion);
                    self.idle.push_back(completion.worker);
                }
                Err(_) => break,
            }
        }

        for (key, job) in self.throttled.drain() {
            tracing::warn!(site = %key, kind = %job.kind(), "abandoned at shutdown");
            self.stats.abandoned += 1;
        }
        self.running.clear();
        // dropping the waiters tells them the master stopped
        self.idle_waiters.clear();

        for worker in self.workers.into_iter().flatten() {
            worker.stop();
        }
        self.stats
    }
}
