//! Build job scheduling.
//!
//! ```text
//!  callers ──enqueue──▶ intake ──▶ ┌──────────────┐ ──job──▶ worker 0
//!  (BuildHandle)        (bounded)  │ BuildMaster  │ ──job──▶ worker 1
//!                                  │ coordination │    ...
//!                                  │    thread    │ ◀─done── worker N
//!                                  └──────────────┘
//! ```
//!
//! A site key is *running* from the moment the master accepts a job for it
//! until a worker reports that job done. A request for a running key is
//! throttled: only the newest throttled request per key is kept, and it is
//! resubmitted when the running job completes. A full rebuild always reads
//! current content, so an older pending rebuild has nothing to add.
//!
//! Workers report every job, successful, failed or panicked, so the
//! bookkeeping never stalls on a bad build.

mod job;
mod master;
mod runner;
mod worker;

pub use job::{BuildJob, JobKind, JobOutcome};
pub use master::{BuildHandle, BuildMaster, EnqueueError, SchedulerError, SchedulerStats};
pub use runner::{JobRunner, SiteJobRunner};
