use crate::error::BuilderError;
use crate::types::{HashMap, Key, Value};
use core::fmt::Debug;
use derive_more::Debug as DeriveDebug;
use std::sync::Arc;

/// User-supplied recipe for one family of keys.
///
/// Both operations are called at most once per `(context, key)` pair:
/// `dependencies` during discovery on the thread that created the node
/// record, `build` from the job queue once every dependency is terminal.
/// A single builder instance may serve many keys concurrently, so
/// implementations must be callable from arbitrary threads.
pub trait ObjectBuilder<K: Key, V: Value>: Debug + Send + Sync {
    /// Enumerates the keys this key's value is built from. An error marks
    /// the node failed without scheduling any build.
    fn dependencies(&self, key: &K) -> Result<Vec<K>, BuilderError>;

    /// Produces the value from the fully built dependencies. The map holds a
    /// clone of each dependency's value, keyed exactly by the list returned
    /// from [`dependencies`](Self::dependencies).
    fn build(&self, key: &K, dependencies: &HashMap<K, V>) -> Result<V, BuilderError>;
}

/// Resolves a key to the builder responsible for it.
///
/// Lookup never fails; a key no builder covers is reported as `None` and the
/// node settles in `NoBuilderAvailable` rather than `Failure`.
pub trait BuilderProvider<K: Key, V: Value>: Debug + Send + Sync {
    /// Returns the builder for `key`, if any.
    fn try_get_builder(&self, key: &K) -> Option<Arc<dyn ObjectBuilder<K, V>>>;
}

/// Adapts a pair of closures into an [`ObjectBuilder`].
#[derive(DeriveDebug)]
pub struct FnObjectBuilder<D, B> {
    #[debug(skip)]
    dependencies_fn: D,
    #[debug(skip)]
    build_fn: B,
}

impl<D, B> FnObjectBuilder<D, B> {
    /// Wraps `dependencies_fn` and `build_fn`.
    pub const fn new(dependencies_fn: D, build_fn: B) -> Self {
        Self {
            dependencies_fn,
            build_fn,
        }
    }
}

impl<K, V, D, B> ObjectBuilder<K, V> for FnObjectBuilder<D, B>
where
    K: Key,
    V: Value,
    D: Fn(&K) -> Result<Vec<K>, BuilderError> + Send + Sync,
    B: Fn(&K, &HashMap<K, V>) -> Result<V, BuilderError> + Send + Sync,
{
    fn dependencies(&self, key: &K) -> Result<Vec<K>, BuilderError> {
        (self.dependencies_fn)(key)
    }

    fn build(&self, key: &K, dependencies: &HashMap<K, V>) -> Result<V, BuilderError> {
        (self.build_fn)(key, dependencies)
    }
}

/// Builder synthesized for a value override: no dependencies, build returns
/// a clone of the stored value.
#[derive(DeriveDebug)]
struct OverrideBuilder<V> {
    #[debug(skip)]
    value: V,
}

impl<K: Key, V: Value> ObjectBuilder<K, V> for OverrideBuilder<V> {
    fn dependencies(&self, _key: &K) -> Result<Vec<K>, BuilderError> {
        Ok(Vec::new())
    }

    fn build(&self, _key: &K, _dependencies: &HashMap<K, V>) -> Result<V, BuilderError> {
        Ok(self.value.clone())
    }
}

type FallbackFn<K, V> = Box<dyn Fn(&K) -> Option<Arc<dyn ObjectBuilder<K, V>>> + Send + Sync>;

/// Concrete [`BuilderProvider`] combining three sources, consulted in order:
/// per-key value overrides, per-key explicit builders, and an optional
/// fallback function that can synthesize a builder on demand.
#[must_use]
#[derive(DeriveDebug)]
pub struct BuilderRegistry<K: Key, V: Value> {
    builders: HashMap<K, Arc<dyn ObjectBuilder<K, V>>>,
    #[debug(skip)]
    overrides: HashMap<K, V>,
    #[debug(skip)]
    fallback: Option<FallbackFn<K, V>>,
}

impl<K: Key, V: Value> Default for BuilderRegistry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, V: Value> BuilderRegistry<K, V> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            builders: HashMap::default(),
            overrides: HashMap::default(),
            fallback: None,
        }
    }

    /// Registers an explicit builder for `key`.
    pub fn register_builder(&mut self, key: K, builder: Arc<dyn ObjectBuilder<K, V>>) {
        self.builders.insert(key, builder);
    }

    /// Registers a fixed value for `key`. An override shadows any builder
    /// for the same key: lookup synthesizes a dependency-free builder that
    /// returns a clone of `value`.
    pub fn register_override(&mut self, key: K, value: V) {
        self.overrides.insert(key, value);
    }

    /// Installs the fallback consulted when neither an override nor an
    /// explicit builder covers a key.
    pub fn set_fallback(
        &mut self,
        fallback: impl Fn(&K) -> Option<Arc<dyn ObjectBuilder<K, V>>> + Send + Sync + 'static,
    ) {
        self.fallback = Some(Box::new(fallback));
    }
}

impl<K: Key, V: Value> BuilderProvider<K, V> for BuilderRegistry<K, V> {
    fn try_get_builder(&self, key: &K) -> Option<Arc<dyn ObjectBuilder<K, V>>> {
        if let Some(value) = self.overrides.get(key) {
            return Some(Arc::new(OverrideBuilder {
                value: value.clone(),
            }));
        }
        if let Some(builder) = self.builders.get(key) {
            return Some(Arc::clone(builder));
        }
        self.fallback.as_ref().and_then(|fallback| fallback(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: i64) -> Arc<dyn ObjectBuilder<u32, i64>> {
        Arc::new(FnObjectBuilder::new(
            |_key: &u32| Ok(Vec::new()),
            move |_key: &u32, _deps: &HashMap<u32, i64>| Ok(value),
        ))
    }

    #[test]
    fn lookup_misses_on_an_empty_registry() {
        let registry = BuilderRegistry::<u32, i64>::new();
        assert!(registry.try_get_builder(&1).is_none());
    }

    #[test]
    fn explicit_builder_beats_fallback() {
        let mut registry = BuilderRegistry::new();
        registry.register_builder(1, constant(10));
        registry.set_fallback(|_key| Some(constant(99)));
        let builder = registry.try_get_builder(&1).unwrap();
        assert_eq!(builder.build(&1, &HashMap::default()).unwrap(), 10);
        let builder = registry.try_get_builder(&2).unwrap();
        assert_eq!(builder.build(&2, &HashMap::default()).unwrap(), 99);
    }

    #[test]
    fn override_shadows_builder_and_has_no_dependencies() {
        let mut registry = BuilderRegistry::new();
        registry.register_builder(1, constant(10));
        registry.register_override(1, 77);
        let builder = registry.try_get_builder(&1).unwrap();
        assert!(builder.dependencies(&1).unwrap().is_empty());
        assert_eq!(builder.build(&1, &HashMap::default()).unwrap(), 77);
    }
}
