use crate::builder::BuilderProvider;
use crate::error::BuildError;
use crate::node::BuildNode;
use crate::queue::JobQueue;
use crate::types::{IndexMap, Key, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Memoizing coordinator over one dependency graph.
///
/// The context uniquely materializes one [`BuildNode`] per key, resolves a
/// builder for it through the provider, and drives the per-node
/// discovery → await-dependencies → build pipeline, dispatching build work
/// into the job queue. Nodes live as long as the context; the graph grows
/// monotonically and is never evicted.
///
/// Cheap to clone: all data sits behind an `Arc`, so the same graph can be
/// driven from many threads.
#[must_use]
#[derive(Debug)]
pub struct ObjectContext<K: Key, V: Value> {
    inner: Arc<ContextInner<K, V>>,
}

impl<K: Key, V: Value> Clone for ObjectContext<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ContextInner<K: Key, V: Value> {
    /// Registry of node records. The mutex is held only across lookup and
    /// insert, never across provider or builder code.
    nodes: Mutex<IndexMap<K, Arc<BuildNode<K, V>>>>,
    provider: Arc<dyn BuilderProvider<K, V>>,
    queue: Arc<dyn JobQueue>,
}

impl<K: Key, V: Value> ObjectContext<K, V> {
    /// Creates a context over the given provider and job queue.
    pub fn new(provider: Arc<dyn BuilderProvider<K, V>>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                nodes: Mutex::new(IndexMap::default()),
                provider,
                queue,
            }),
        }
    }

    /// Ensures a node record exists for `key` and returns it, with the
    /// dependency list either already frozen or the node settled in a
    /// terminal state. Discovery runs synchronously on the calling thread
    /// iff this call created the record. Never requests a build.
    pub fn get_dependencies(&self, key: &K) -> Arc<BuildNode<K, V>> {
        ContextInner::get_dependencies_internal(&self.inner, key)
    }

    /// Same as [`get_dependencies`](Self::get_dependencies), and additionally
    /// arms the node's build pipeline, recursively propagating the request
    /// through the dependency closure. Idempotent: later calls return the
    /// existing record without re-running discovery or scheduling anything.
    pub fn build_object(&self, key: &K) -> Arc<BuildNode<K, V>> {
        ContextInner::build_object(&self.inner, key)
    }

    /// Number of node records materialized so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.nodes.lock().len()
    }

    /// Whether no key has been requested yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.nodes.lock().is_empty()
    }

    /// Handles to every node materialized so far, in creation order.
    pub fn snapshot(&self) -> Vec<Arc<BuildNode<K, V>>> {
        self.inner.nodes.lock().values().cloned().collect()
    }
}

impl<K: Key, V: Value> ContextInner<K, V> {
    pub(crate) fn build_object(this: &Arc<Self>, key: &K) -> Arc<BuildNode<K, V>> {
        let node = Self::get_dependencies_internal(this, key);
        node.request_build(&this.queue);
        node
    }

    fn get_dependencies_internal(this: &Arc<Self>, key: &K) -> Arc<BuildNode<K, V>> {
        let node = {
            let mut nodes = this.nodes.lock();
            if let Some(node) = nodes.get(key) {
                return Arc::clone(node);
            }
            let node = BuildNode::new(Arc::downgrade(this), key.clone());
            nodes.insert(key.clone(), Arc::clone(&node));
            node
        };

        // This call created the record, so this thread runs discovery.
        // Provider and builder are user code and must not run under the
        // registry lock. Concurrent callers for the same key see the
        // `Starting` node and subscribe to its transitions instead.
        match this.provider.try_get_builder(key) {
            None => {
                debug!(?key, "no builder available");
                node.set_no_builder();
            }
            Some(builder) => {
                node.set_builder(Arc::clone(&builder));
                match builder.dependencies(key) {
                    Ok(dependencies) => node.set_requested_dependencies(dependencies),
                    Err(cause) => {
                        warn!(?key, error = %cause, "dependency discovery failed");
                        node.set_failure(BuildError::discovery(cause));
                    }
                }
            }
        }
        node
    }
}
