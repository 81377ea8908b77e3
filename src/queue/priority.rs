use crate::queue::{default_worker_count, Job, JobQueue};
use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Fixed-size worker pool with two submission tiers sharing one mutex and
/// one condition variable.
///
/// Workers drain the high tier strictly before the low tier: each pick takes
/// a high job if any exists, else a low one, else waits. Strict priority
/// means no starvation mitigation; callers needing fairness must rate-limit
/// externally. The tier choice applies to new picks only, never mid-job.
///
/// The pool itself is not a [`JobQueue`]; submission goes through the
/// [`high_priority`](Self::high_priority) and
/// [`low_priority`](Self::low_priority) facades, each wired to its own tier.
#[must_use]
#[derive(Debug)]
pub struct PriorityJobQueue {
    shared: Arc<PriorityShared>,
    workers: Vec<JoinHandle<()>>,
}

#[derive(Debug)]
struct PriorityShared {
    tiers: Mutex<Tiers>,
    job_available: Condvar,
    stop: AtomicBool,
}

#[derive(Debug, Default)]
struct Tiers {
    high: VecDeque<Job>,
    low: VecDeque<Job>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    High,
    Low,
}

/// Thin facade enqueueing into one tier of a [`PriorityJobQueue`].
#[derive(Debug)]
struct TierQueue {
    shared: Arc<PriorityShared>,
    tier: Tier,
}

impl PriorityJobQueue {
    /// Spawns the workers.
    pub fn new(workers: Option<NonZeroUsize>) -> Self {
        let worker_count = workers.map_or_else(default_worker_count, NonZeroUsize::get);
        let shared = Arc::new(PriorityShared {
            tiers: Mutex::new(Tiers::default()),
            job_available: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let workers = (0..worker_count)
            .map(|index| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("depgraph-priority-worker-{index}"))
                    .spawn(move || worker_loop(&shared))
                    .expect("PriorityJobQueue::new: failed to spawn worker")
            })
            .collect();
        debug!(worker_count, "priority job queue started");
        Self { shared, workers }
    }

    /// Submission endpoint for the high tier.
    pub fn high_priority(&self) -> Arc<dyn JobQueue> {
        Arc::new(TierQueue {
            shared: Arc::clone(&self.shared),
            tier: Tier::High,
        })
    }

    /// Submission endpoint for the low tier.
    pub fn low_priority(&self) -> Arc<dyn JobQueue> {
        Arc::new(TierQueue {
            shared: Arc::clone(&self.shared),
            tier: Tier::Low,
        })
    }

    /// Stops the workers and joins them. Jobs still queued in either tier
    /// are dropped without running.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.stop.store(true, Ordering::Release);
        {
            let _tiers = self.shared.tiers.lock();
            self.shared.job_available.notify_all();
        }
        for worker in self.workers.drain(..) {
            worker
                .join()
                .expect("PriorityJobQueue::shutdown: worker panicked");
        }
        debug!("priority job queue stopped");
    }
}

impl Drop for PriorityJobQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl JobQueue for TierQueue {
    fn register_job(&self, job: Job) {
        assert!(
            !self.shared.stop.load(Ordering::Acquire),
            "job submitted after shutdown"
        );
        let mut tiers = self.shared.tiers.lock();
        match self.tier {
            Tier::High => tiers.high.push_back(job),
            Tier::Low => tiers.low.push_back(job),
        }
        self.shared.job_available.notify_one();
    }
}

fn worker_loop(shared: &PriorityShared) {
    loop {
        let job = {
            let mut tiers = shared.tiers.lock();
            loop {
                if shared.stop.load(Ordering::Acquire) {
                    return;
                }
                if let Some(job) = tiers.high.pop_front() {
                    break job;
                }
                if let Some(job) = tiers.low.pop_front() {
                    break job;
                }
                shared.job_available.wait(&mut tiers);
            }
        };
        job.run();
    }
}
