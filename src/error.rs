use std::sync::Arc;
use thiserror::Error;

/// Error type produced by user-supplied builder code.
///
/// Builders return this from `dependencies` and `build`; the engine records
/// the cause on the failing node and never propagates it as a panic.
pub type BuilderError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared, cloneable handle to a builder error cause.
///
/// One failure fans out to every dependent and every waiter, so the cause is
/// reference-counted rather than owned by a single observer.
pub type SharedBuilderError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Terminal failure recorded on a node.
///
/// Failures are recorded, not thrown: user-facing operations return node
/// handles and failure is observed by inspecting state. A dependent whose
/// dependency failed enters [`BuildError::DependencyFailed`] itself,
/// distinguishably from the dependency's own error.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum BuildError {
    /// The builder's dependency enumeration returned an error.
    #[error("dependency discovery failed: {0}")]
    Discovery(SharedBuilderError),
    /// The builder's build function returned an error.
    #[error("object build failed: {0}")]
    Build(SharedBuilderError),
    /// A dependency finished without a built value.
    #[error("a dependency finished without a built value")]
    DependencyFailed,
    /// The dependency walk looped back onto a node it started from.
    #[error("dependency cycle detected")]
    Cycle,
}

impl BuildError {
    pub(crate) fn discovery(cause: BuilderError) -> Self {
        Self::Discovery(Arc::from(cause))
    }

    pub(crate) fn build(cause: BuilderError) -> Self {
        Self::Build(Arc::from(cause))
    }
}
