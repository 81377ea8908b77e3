use crate::builder::ObjectBuilder;
use crate::context::ContextInner;
use crate::error::BuildError;
use crate::queue::{Job, JobQueue, JobStyle};
use crate::state::{AtomicState, BuildState, BUILT_OR_TERMINAL_MASK, DEPENDENCIES_KNOWN_MASK};
use crate::types::{HashMap, Key, Value};
use crate::wait::{WaitHandle, WaitOutcome};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use derive_more::Debug;
use rustc_hash::FxBuildHasher;
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Per-key node record: state machine, dependency list, result, and the two
/// wait points dependents and external waiters block on.
///
/// One record exists per `(context, key)` pair, created by the context and
/// shared as an `Arc` handle. All fields transition monotonically: the
/// dependency list, builder, value and error are written exactly once, each
/// before the state publication that makes them readable.
#[must_use]
#[derive(Debug)]
pub struct BuildNode<K: Key, V: Value> {
    key: K,
    /// Handle to this node's own allocation, used to hand `Arc`s to
    /// callbacks and build jobs.
    #[debug(skip)]
    me: Weak<BuildNode<K, V>>,
    /// The owning context. Non-owning: the context outlives every node it
    /// holds, and dependents hold node handles, never the reverse.
    #[debug(skip)]
    context: Weak<ContextInner<K, V>>,
    state: AtomicState,
    builder: OnceLock<Arc<dyn ObjectBuilder<K, V>>>,
    dependencies: OnceLock<Vec<K>>,
    #[debug(skip)]
    built_value: OnceLock<V>,
    error: OnceLock<BuildError>,
    /// One-shot flag arming the build pipeline on the first `build_object`.
    build_requested: AtomicBool,
    /// Dependencies still missing a terminal state, counted down by their
    /// post-build callbacks once the pipeline is armed.
    outstanding_dependencies: AtomicUsize,
    #[debug(skip)]
    dependencies_known: WaitHandle<Arc<BuildNode<K, V>>>,
    #[debug(skip)]
    built: WaitHandle<Arc<BuildNode<K, V>>>,
}

impl<K: Key, V: Value> BuildNode<K, V> {
    pub(crate) fn new(context: Weak<ContextInner<K, V>>, key: K) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            key,
            me: me.clone(),
            context,
            state: AtomicState::new(BuildState::Starting),
            builder: OnceLock::new(),
            dependencies: OnceLock::new(),
            built_value: OnceLock::new(),
            error: OnceLock::new(),
            build_requested: AtomicBool::new(false),
            outstanding_dependencies: AtomicUsize::new(0),
            dependencies_known: WaitHandle::new(DEPENDENCIES_KNOWN_MASK),
            built: WaitHandle::new(BUILT_OR_TERMINAL_MASK),
        })
    }

    /// The key this node was created for.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BuildState {
        self.state.load()
    }

    /// The frozen dependency list, or `None` while discovery is pending or
    /// the node settled without one.
    pub fn dependencies(&self) -> Option<&[K]> {
        self.dependencies.get().map(Vec::as_slice)
    }

    /// The built value; valid only in [`BuildState::ObjectBuilt`].
    pub fn built_value(&self) -> Option<&V> {
        (self.state() == BuildState::ObjectBuilt).then(|| {
            self.built_value
                .get()
                .expect("BuildNode::built_value: value missing in ObjectBuilt")
        })
    }

    /// The recorded failure; valid only in [`BuildState::Failure`].
    pub fn error(&self) -> Option<&BuildError> {
        (self.state() == BuildState::Failure).then(|| {
            self.error
                .get()
                .expect("BuildNode::error: error missing in Failure")
        })
    }

    /// Blocks until the dependency list is frozen or the node is terminal.
    pub fn wait_dependencies_known(&self) {
        self.dependencies_known.wait(&self.state);
    }

    /// Timed variant of [`wait_dependencies_known`](Self::wait_dependencies_known).
    pub fn wait_dependencies_known_for(&self, timeout: Duration) -> WaitOutcome {
        self.dependencies_known.wait_for(&self.state, timeout)
    }

    /// Deadline variant of [`wait_dependencies_known`](Self::wait_dependencies_known).
    pub fn wait_dependencies_known_until(&self, deadline: Instant) -> WaitOutcome {
        self.dependencies_known.wait_until(&self.state, deadline)
    }

    /// Blocks until the node is terminal.
    pub fn wait_built(&self) {
        self.built.wait(&self.state);
    }

    /// Timed variant of [`wait_built`](Self::wait_built).
    pub fn wait_built_for(&self, timeout: Duration) -> WaitOutcome {
        self.built.wait_for(&self.state, timeout)
    }

    /// Deadline variant of [`wait_built`](Self::wait_built).
    pub fn wait_built_until(&self, deadline: Instant) -> WaitOutcome {
        self.built.wait_until(&self.state, deadline)
    }

    /// Runs `callback` once the dependency list is frozen or the node is
    /// terminal. A callback registered after that point runs immediately on
    /// the calling thread; otherwise it runs exactly once on the thread that
    /// performs the matching transition.
    pub fn on_dependencies_known(&self, callback: impl FnOnce(&Arc<Self>) + Send + 'static) {
        if let Some(callback) = self.dependencies_known.register(&self.state, Box::new(callback)) {
            callback(&self.handle());
        }
    }

    /// Runs `callback` once the node is terminal, with the same timing rules
    /// as [`on_dependencies_known`](Self::on_dependencies_known).
    pub fn on_built(&self, callback: impl FnOnce(&Arc<Self>) + Send + 'static) {
        if let Some(callback) = self.built.register(&self.state, Box::new(callback)) {
            callback(&self.handle());
        }
    }

    /// A strong handle to this node. Any `&self` implies a live `Arc`.
    fn handle(&self) -> Arc<Self> {
        self.me
            .upgrade()
            .expect("BuildNode::handle: node outlived its handles")
    }

    pub(crate) fn set_builder(&self, builder: Arc<dyn ObjectBuilder<K, V>>) {
        self.builder
            .set(builder)
            .expect("BuildNode::set_builder: builder already set");
    }

    /// Freezes the dependency list and publishes `DependenciesKnown`.
    pub(crate) fn set_requested_dependencies(&self, dependencies: Vec<K>) {
        self.dependencies
            .set(dependencies)
            .expect("BuildNode::set_requested_dependencies: dependency list already set");
        let Some(callbacks) = self
            .dependencies_known
            .advance(&self.state, BuildState::DependenciesKnown)
        else {
            return;
        };
        let this = self.handle();
        for callback in callbacks {
            callback(&this);
        }
    }

    /// Publishes `ObjectBuilt`, releasing both dependents and waiters.
    pub(crate) fn set_built(&self, value: V) {
        assert!(
            self.built_value.set(value).is_ok(),
            "BuildNode::set_built: value already set"
        );
        let Some(callbacks) = self.built.advance(&self.state, BuildState::ObjectBuilt) else {
            return;
        };
        let this = self.handle();
        for callback in callbacks {
            callback(&this);
        }
    }

    /// Publishes `Failure`. Both wait handles accept the state, so both
    /// callback lists drain. Losing a transition race (the node already went
    /// terminal through another path) is a no-op; the first recorded error
    /// wins.
    pub(crate) fn set_failure(&self, error: BuildError) {
        let _ = self.error.set(error);
        let Some(deps_callbacks) = self
            .dependencies_known
            .advance(&self.state, BuildState::Failure)
        else {
            return;
        };
        let built_callbacks = self.built.follow();
        let this = self.handle();
        for callback in deps_callbacks {
            callback(&this);
        }
        for callback in built_callbacks {
            callback(&this);
        }
    }

    /// Publishes `NoBuilderAvailable`. Not a fault: dependents observe it as
    /// a non-built terminal state, and nothing is ever scheduled.
    pub(crate) fn set_no_builder(&self) {
        let Some(deps_callbacks) = self
            .dependencies_known
            .advance(&self.state, BuildState::NoBuilderAvailable)
        else {
            return;
        };
        let built_callbacks = self.built.follow();
        let this = self.handle();
        for callback in deps_callbacks {
            callback(&this);
        }
        for callback in built_callbacks {
            callback(&this);
        }
    }

    /// Arms the build pipeline. The first call per node wins; the build
    /// itself still waits for every dependency to turn terminal.
    pub(crate) fn request_build(&self, queue: &Arc<dyn JobQueue>) {
        if self.build_requested.swap(true, Ordering::AcqRel) {
            // Re-entering an already-armed, still-pending node whose arming
            // frame is live on this thread means the dependency walk looped
            // back onto itself.
            if !self.state().is_terminal() && arming::contains(self as *const Self as usize) {
                debug!(key = ?self.key, "dependency cycle detected");
                self.set_failure(BuildError::Cycle);
            }
            return;
        }
        match self.state() {
            BuildState::Failure | BuildState::NoBuilderAvailable => return,
            _ => {}
        }
        let queue = Arc::clone(queue);
        self.on_dependencies_known(move |node| node.arm(&queue));
    }

    /// Seeds the outstanding counter and subscribes to every dependency.
    /// Runs on whichever thread froze the dependency list (or on the arming
    /// thread when discovery had already finished).
    fn arm(&self, queue: &Arc<dyn JobQueue>) {
        if self.state() != BuildState::DependenciesKnown {
            // The deps-known mask also fires for terminal settlements, where
            // there is nothing to build and waiters are already released.
            return;
        }
        let dependencies = self
            .dependencies
            .get()
            .expect("BuildNode::arm: dependency list missing");
        let _frame = arming::Frame::push(self as *const Self as usize);
        self.outstanding_dependencies
            .store(dependencies.len(), Ordering::Release);
        if dependencies.is_empty() {
            self.enqueue_build(queue);
            return;
        }
        let Some(context) = self.context.upgrade() else {
            return;
        };
        for dependency in dependencies {
            let dependency_node = ContextInner::build_object(&context, dependency);
            let this = self.handle();
            let queue = Arc::clone(queue);
            dependency_node.on_built(move |_dependency| {
                if this.outstanding_dependencies.fetch_sub(1, Ordering::AcqRel) == 1 {
                    this.enqueue_build(&queue);
                }
            });
        }
    }

    fn enqueue_build(&self, queue: &Arc<dyn JobQueue>) {
        let this = self.handle();
        queue.register_job(Job::new(JobStyle::ObjectBuilding, move || this.run_build()));
    }

    /// Body of the build job: source the built dependencies in declaration
    /// order, then invoke the builder.
    fn run_build(&self) {
        if self.state() != BuildState::DependenciesKnown {
            // Failed (for instance through cycle detection) while queued.
            return;
        }
        let dependencies = self
            .dependencies
            .get()
            .expect("BuildNode::run_build: dependency list missing");
        let Some(context) = self.context.upgrade() else {
            return;
        };
        let mut built_dependencies =
            HashMap::with_capacity_and_hasher(dependencies.len(), FxBuildHasher);
        for dependency in dependencies {
            let dependency_node = ContextInner::build_object(&context, dependency);
            let Some(value) = dependency_node.built_value() else {
                warn!(
                    key = ?self.key,
                    dependency = ?dependency,
                    "dependency finished without a built value"
                );
                self.set_failure(BuildError::DependencyFailed);
                return;
            };
            built_dependencies.insert(dependency.clone(), value.clone());
        }
        let builder = self
            .builder
            .get()
            .expect("BuildNode::run_build: builder missing");
        match builder.build(&self.key, &built_dependencies) {
            Ok(value) => self.set_built(value),
            Err(cause) => {
                warn!(key = ?self.key, error = %cause, "object build failed");
                self.set_failure(BuildError::build(cause));
            }
        }
    }
}

/// Thread-local stack of nodes currently inside [`BuildNode::arm`] on this
/// thread. The recursive `build_object` walk is synchronous, so a pending
/// node whose address is found on the stack when its build is re-requested
/// has been reached from its own dependency closure.
mod arming {
    use std::cell::RefCell;

    thread_local! {
        static STACK: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    }

    pub(super) fn contains(node: usize) -> bool {
        STACK.with(|stack| stack.borrow().iter().any(|&entry| entry == node))
    }

    /// Stack entry popped on drop, so a panicking builder unwinds cleanly.
    pub(super) struct Frame;

    impl Frame {
        pub(super) fn push(node: usize) -> Self {
            STACK.with(|stack| stack.borrow_mut().push(node));
            Self
        }
    }

    impl Drop for Frame {
        fn drop(&mut self) {
            STACK.with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }
}
