//! Concurrent dependency-graph build engine with on-demand discovery.
//!
//! This crate provides a generic in-memory scheduler that, given an opaque
//! key, discovers the dependencies of the value identified by that key,
//! recursively ensures each dependency is built, and then builds the value
//! from its already-built dependencies. It:
//! - Materializes exactly one node record per key and builds each node at
//!   most once, regardless of how many dependents transitively need it or
//!   how many threads request it concurrently.
//! - Discovers the dependency DAG on demand through user-supplied builders
//!   instead of requiring it up front.
//! - Dispatches build work through a pluggable job queue (inline, fixed
//!   worker pool, two-tier priority pool, or rayon-backed).
//! - Lets external waiters block on well-defined per-node milestones
//!   without missing wake-ups.
//!
//! Key modules:
//! - `builder`: the `ObjectBuilder`/`BuilderProvider` extension points and
//!   the `BuilderRegistry` provider.
//! - `context`: the memoizing `ObjectContext` driving discovery and builds.
//! - `node`: the per-key record with its state machine and wait points.
//! - `queue`: the job-queue abstraction and its implementations.
//!
//! Quick start:
//! 1. Implement [`builder::ObjectBuilder`] (or wrap closures in
//!    [`builder::FnObjectBuilder`]) and register it in a
//!    [`builder::BuilderRegistry`].
//! 2. Pick a queue, e.g. `ThreadPoolJobQueue::new(None)`.
//! 3. Create an [`context::ObjectContext`], call `build_object(key)`, and
//!    wait on the returned node's `wait_built` handle.
//!
//! Failures are recorded, never thrown: every operation returns a node
//! handle, and failure is observed by inspecting its state. A node whose
//! dependency failed fails itself, distinguishably, and queue
//! infrastructure survives panicking user code.

#![warn(missing_docs)]

/// Builder and builder-provider extension points.
///
/// Defines the `ObjectBuilder` contract (dependency enumeration plus value
/// production), the closure adapter `FnObjectBuilder`, and the
/// `BuilderRegistry` provider with per-key builders, value overrides and a
/// fallback synthesizer.
pub mod builder;
/// The memoizing object context.
///
/// Owns the key-to-node registry and drives the
/// discovery → await-dependencies → build pipeline for each node.
pub mod context;
/// Error types: recorded node failures and the builder error payload.
pub mod error;
/// The per-key node record.
///
/// Holds the atomic state machine, the frozen dependency list, the result
/// or failure, the build-request latch, and the two wait points
/// (`dependencies-known` and `built-or-terminal`).
pub mod node;
/// Job-queue abstraction and its bundled implementations.
pub mod queue;
/// Node lifecycle states.
pub mod state;
/// Key/value bound aliases and the crate's map types.
pub mod types;
/// Wait outcomes for timed waits on node milestones.
pub mod wait;
