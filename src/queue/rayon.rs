use crate::queue::{default_worker_count, Job, JobQueue};
use core::num::NonZeroUsize;
use derive_more::Debug;

/// Queue dispatching jobs onto a dedicated rayon thread pool.
///
/// Rayon's work-stealing scheduler makes no FIFO promise, which the queue
/// contract permits; use [`ThreadPoolJobQueue`](crate::queue::ThreadPoolJobQueue)
/// when submission-order dequeue matters.
#[must_use]
#[derive(Debug)]
pub struct RayonJobQueue {
    #[debug(skip)]
    pool: ::rayon::ThreadPool,
}

impl RayonJobQueue {
    /// Builds the underlying pool.
    pub fn new(workers: Option<NonZeroUsize>) -> Self {
        let worker_count = workers.map_or_else(default_worker_count, NonZeroUsize::get);
        let pool = ::rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|index| format!("depgraph-rayon-{index}"))
            .build()
            .expect("RayonJobQueue::new: failed to build thread pool");
        Self { pool }
    }
}

impl JobQueue for RayonJobQueue {
    fn register_job(&self, job: Job) {
        self.pool.spawn(move || job.run());
    }
}
