use super::job::{BuildJob, JobKind, JobOutcome};
use crate::builder::{BuildEnv, BuildReport, SiteBuilder, delete_site_output};

/// What a worker does with a job. Called from worker threads, one job per
/// call; never called concurrently for the same site key.
pub trait JobRunner: Send + Sync {
    fn run(&self, job: &BuildJob) -> JobOutcome;
}

type ReportHook = Box<dyn Fn(&BuildReport) + Send + Sync>;

/// Runs jobs against real sites: builds through [`SiteBuilder`], deletes
/// the site's output directory.
pub struct SiteJobRunner {
    env: BuildEnv,
    on_report: Option<ReportHook>,
}

impl SiteJobRunner {
    pub fn new(env: BuildEnv) -> Self {
        Self {
            env,
            on_report: None,
        }
    }

    /// Call `hook` with the report of every finished build pass.
    pub fn on_report(mut self, hook: impl Fn(&BuildReport) + Send + Sync + 'static) -> Self {
        self.on_report = Some(Box::new(hook));
        self
    }
}

impl JobRunner for SiteJobRunner {
    fn run(&self, job: &BuildJob) -> JobOutcome {
        match job.kind() {
            JobKind::Build => {
                let report = SiteBuilder::new(&self.env, job.site_key().clone()).build();
                if let Some(hook) = &self.on_report {
                    hook(&report);
                }
                match report.errors.count() {
                    0 => JobOutcome::Succeeded,
                    errors => JobOutcome::Failed { errors },
                }
            }
            JobKind::Delete => match delete_site_output(&self.env, job.site_key()) {
                Ok(_) => JobOutcome::Succeeded,
                Err(e) => {
                    tracing::error!(site = %job.site_key(), "{e}");
                    JobOutcome::Failed { errors: 1 }
                }
            },
        }
    }
}
