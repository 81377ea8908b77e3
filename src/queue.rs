mod inline;
mod pool;
mod priority;
mod rayon;

pub use self::inline::InlineJobQueue;
pub use self::pool::ThreadPoolJobQueue;
pub use self::priority::PriorityJobQueue;
pub use self::rayon::RayonJobQueue;

use core::fmt::Debug;
use core::num::NonZeroUsize;
use derive_more::Debug as DeriveDebug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use tracing::warn;

/// Advisory routing hint attached to each job.
///
/// The queues in this crate ignore it; implementations with heterogeneous
/// execution resources may route on it (for instance, discovery work onto an
/// IO-oriented pool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStyle {
    /// Anything that is neither discovery nor a build.
    Other,
    /// Invocation of a builder's build function.
    ObjectBuilding,
    /// Invocation of a builder's dependency enumeration.
    Discovery,
}

/// An opaque unit of work tagged with a style hint.
#[must_use]
#[derive(DeriveDebug)]
pub struct Job {
    style: JobStyle,
    #[debug(skip)]
    func: Box<dyn FnOnce() + Send + 'static>,
}

impl Job {
    /// Wraps a closure into a job carrying the given style hint.
    pub fn new(style: JobStyle, func: impl FnOnce() + Send + 'static) -> Self {
        Self {
            style,
            func: Box::new(func),
        }
    }

    /// The routing hint the job was submitted with.
    #[must_use]
    pub fn style(&self) -> JobStyle {
        self.style
    }

    /// Invokes the closure, swallowing panics.
    ///
    /// Queue implementations must execute jobs through this method: a job
    /// failure must never take down queue infrastructure or reach the
    /// submitter, since failures are encoded in node state instead.
    pub fn run(self) {
        let Self { style, func } = self;
        if catch_unwind(AssertUnwindSafe(func)).is_err() {
            warn!(?style, "job panicked; the panic was swallowed by the queue");
        }
    }
}

/// Execution substrate for build work.
///
/// `register_job` must be thread-safe and non-blocking: a bounded critical
/// section at most, never waiting for the job to finish. No cross-job
/// ordering is promised beyond what each implementation documents.
pub trait JobQueue: Debug + Send + Sync {
    /// Accepts a job for eventual execution.
    fn register_job(&self, job: Job);
}

pub(crate) fn default_worker_count() -> usize {
    thread::available_parallelism().map_or(16, NonZeroUsize::get)
}
