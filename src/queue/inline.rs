use crate::queue::{Job, JobQueue};

/// Queue that runs each job on the submitting thread before returning.
///
/// Deterministic and single-threaded, which makes it the queue of choice for
/// tests. The object context submits from within its own call chains, so the
/// implementation must (and trivially does) accept reentrant submission.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineJobQueue;

impl InlineJobQueue {
    /// Creates the queue.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl JobQueue for InlineJobQueue {
    fn register_job(&self, job: Job) {
        job.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::JobStyle;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_on_the_submitting_thread_before_returning() {
        let queue = InlineJobQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_in_job = Arc::clone(&ran);
        queue.register_job(Job::new(JobStyle::Other, move || {
            ran_in_job.fetch_add(1, Ordering::Relaxed);
        }));
        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn swallows_job_panics() {
        let queue = InlineJobQueue::new();
        queue.register_job(Job::new(JobStyle::Other, || panic!("job failure")));
    }
}
