use core::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use depgraph::builder::{BuilderRegistry, FnObjectBuilder, ObjectBuilder};
use depgraph::context::ObjectContext;
use depgraph::queue::{RayonJobQueue, ThreadPoolJobQueue};
use depgraph::state::BuildState;
use depgraph::types::HashMap;

/// Workload whose dependency list for `k` is the halving chain
/// `{k/2, k/4, …, 1}`, making low keys heavily shared roots.
fn halving_registry(build_calls: Arc<AtomicUsize>) -> BuilderRegistry<u32, f64> {
    let mut registry = BuilderRegistry::new();
    registry.set_fallback(move |_key| {
        let build_calls = Arc::clone(&build_calls);
        Some(Arc::new(FnObjectBuilder::new(
            |key: &u32| {
                let mut dependencies = Vec::new();
                let mut dependency = key / 2;
                while dependency > 0 {
                    dependencies.push(dependency);
                    dependency /= 2;
                }
                Ok(dependencies)
            },
            move |key: &u32, deps: &HashMap<u32, f64>| {
                build_calls.fetch_add(1, Ordering::Relaxed);
                Ok(f64::from(*key) + deps.values().sum::<f64>())
            },
        )) as Arc<dyn ObjectBuilder<u32, f64>>)
    });
    registry
}

fn run_halving(keys: u32, workers: Option<NonZeroUsize>) {
    let build_calls = Arc::new(AtomicUsize::new(0));
    let registry = halving_registry(Arc::clone(&build_calls));
    let context = ObjectContext::new(
        Arc::new(registry),
        Arc::new(ThreadPoolJobQueue::new(workers)),
    );

    for key in 0..keys {
        context.build_object(&key);
    }
    for key in 0..keys {
        let node = context.get_dependencies(&key);
        while node.wait_built_for(Duration::from_secs(1)).timed_out() {
            eprintln!("still waiting on {key}: {}", node.state());
        }
        assert_eq!(node.state(), BuildState::ObjectBuilt);
    }
    assert_eq!(build_calls.load(Ordering::Relaxed), keys as usize);
    assert_eq!(context.len(), keys as usize);
}

#[test]
fn halving_workload_terminates_on_a_worker_pool() {
    run_halving(1 << 14, NonZeroUsize::new(16));
}

#[test]
#[ignore = "long-running; the full-size workload"]
fn halving_workload_full_size() {
    run_halving(1 << 18, NonZeroUsize::new(16));
}

#[test]
fn overlapping_requesters_share_every_build() {
    let keys = 1 << 12;
    let build_calls = Arc::new(AtomicUsize::new(0));
    let registry = halving_registry(Arc::clone(&build_calls));
    let context = ObjectContext::new(
        Arc::new(registry),
        Arc::new(RayonJobQueue::new(NonZeroUsize::new(8))),
    );

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let context = context.clone();
            scope.spawn(move || {
                for key in 0..keys {
                    context.build_object(&key);
                }
                for key in 0..keys {
                    context.get_dependencies(&key).wait_built();
                }
            });
        }
    });
    assert_eq!(build_calls.load(Ordering::Relaxed), keys as usize);
    assert_eq!(context.len(), keys as usize);
}
