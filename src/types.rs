use core::fmt::Debug;
use core::hash::Hash;
use indexmap::IndexMap as _IndexMap;
use rustc_hash::FxBuildHasher;
use std::collections::HashMap as _HashMap;

/// Bound alias for graph keys.
///
/// Keys identify nodes, index the built-dependency maps handed to builders,
/// and appear in failure-path logs, hence the `Debug` requirement. Blanket
/// implemented for every type satisfying the bounds.
pub trait Key: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

impl<T: Hash + Eq + Clone + Debug + Send + Sync + 'static> Key for T {}

/// Bound alias for built values.
///
/// Dependents receive a clone of each dependency's built value, so values
/// must be cloneable and sendable across worker threads.
pub trait Value: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Value for T {}

/// `HashMap` type with fast hasher, used for the built-dependency maps.
pub type HashMap<K, V> = _HashMap<K, V, FxBuildHasher>;

pub(crate) type IndexMap<K, V> = _IndexMap<K, V, FxBuildHasher>;
