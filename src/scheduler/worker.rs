use super::job::{BuildJob, JobOutcome};
use super::runner::JobRunner;
use crossbeam_channel::{Receiver, SendError, Sender, bounded, select};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A finished job, sent back to the master.
#[derive(Debug)]
pub(crate) struct Completion {
    pub worker: usize,
    pub job: BuildJob,
    pub outcome: JobOutcome,
}

/// A long-lived pool slot.
///
/// Each worker has its own single-slot job channel: the master only hands
/// a job to a worker it knows to be idle, so the slot is always free.
pub(crate) struct BuildWorker {
    id: usize,
    jobs: Sender<BuildJob>,
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl BuildWorker {
    /// Spawn the worker thread.
    pub fn run(
        id: usize,
        runner: Arc<dyn JobRunner>,
        done: Sender<Completion>,
    ) -> io::Result<Self> {
        let (jobs_tx, jobs_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name(format!("build-worker-{id}"))
            .spawn(move || worker_loop(id, runner.as_ref(), &jobs_rx, &stop_rx, &done))?;
        Ok(Self {
            id,
            jobs: jobs_tx,
            stop: stop_tx,
            handle: Some(handle),
        })
    }

    pub fn dispatch(&self, job: BuildJob) -> Result<(), SendError<BuildJob>> {
        self.jobs.send(job)
    }

    /// Signal the worker to exit and wait until it has.
    ///
    /// Only called on idle workers: a worker mid-job finishes the job first.
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(worker = self.id, "worker thread panicked");
            }
        }
    }
}

fn worker_loop(
    id: usize,
    runner: &dyn JobRunner,
    jobs: &Receiver<BuildJob>,
    stop: &Receiver<()>,
    done: &Sender<Completion>,
) {
    tracing::debug!(worker = id, "worker started");
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(jobs) -> msg => {
                let Ok(job) = msg else { break };
                let outcome = run_job(id, runner, &job);
                if done.send(Completion { worker: id, job, outcome }).is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!(worker = id, "worker stopped");
}

fn run_job(id: usize, runner: &dyn JobRunner, job: &BuildJob) -> JobOutcome {
    tracing::debug!(worker = id, site = %job.site_key(), kind = %job.kind(), "job started");
    match panic::catch_unwind(AssertUnwindSafe(|| runner.run(job))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(worker = id, site = %job.site_key(), "job panicked: {message}");
            JobOutcome::Failed { errors: 1 }
        }
    }
}
