use crate::queue::{default_worker_count, Job, JobQueue};
use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Fixed-size worker pool draining a single FIFO queue.
///
/// Dequeue order is submission order. `None` for the worker count selects the
/// machine's available parallelism.
#[must_use]
#[derive(Debug)]
pub struct ThreadPoolJobQueue {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

#[derive(Debug)]
struct PoolShared {
    jobs: Mutex<VecDeque<Job>>,
    job_available: Condvar,
    stop: AtomicBool,
}

impl ThreadPoolJobQueue {
    /// Spawns the workers.
    pub fn new(workers: Option<NonZeroUsize>) -> Self {
        let worker_count = workers.map_or_else(default_worker_count, NonZeroUsize::get);
        let shared = Arc::new(PoolShared {
            jobs: Mutex::new(VecDeque::new()),
            job_available: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let workers = (0..worker_count)
            .map(|index| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("depgraph-worker-{index}"))
                    .spawn(move || worker_loop(&shared))
                    .expect("ThreadPoolJobQueue::new: failed to spawn worker")
            })
            .collect();
        debug!(worker_count, "thread pool job queue started");
        Self { shared, workers }
    }

    /// Stops the workers and joins them. Jobs still queued at this point are
    /// dropped without running.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.stop.store(true, Ordering::Release);
        {
            let _jobs = self.shared.jobs.lock();
            self.shared.job_available.notify_all();
        }
        for worker in self.workers.drain(..) {
            worker
                .join()
                .expect("ThreadPoolJobQueue::shutdown: worker panicked");
        }
        debug!("thread pool job queue stopped");
    }
}

impl JobQueue for ThreadPoolJobQueue {
    fn register_job(&self, job: Job) {
        assert!(
            !self.shared.stop.load(Ordering::Acquire),
            "job submitted after shutdown"
        );
        let mut jobs = self.shared.jobs.lock();
        jobs.push_back(job);
        self.shared.job_available.notify_one();
    }
}

impl Drop for ThreadPoolJobQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &PoolShared) {
    loop {
        let job = {
            let mut jobs = shared.jobs.lock();
            loop {
                if shared.stop.load(Ordering::Acquire) {
                    return;
                }
                match jobs.pop_front() {
                    Some(job) => break job,
                    None => shared.job_available.wait(&mut jobs),
                }
            }
        };
        job.run();
    }
}
