//! Core error types for gg-core.
//!
//! Mirrors the taxonomy of the execution graph: `StoreError` covers the
//! `ThunkStore` collaborator boundary, while `CoreError` covers the
//! graph's own fatal, programming-error conditions. `StaleReport`
//! is deliberately absent from this enum -- it isn't an error, it's the
//! documented empty-set return path of `submit_reduction`.

use thiserror::Error;

use crate::hash::Hash;
use crate::node::ComputationId;

/// Errors surfaced by a `ThunkStore` implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No blob is stored under this hash.
    #[error("thunk not found: {0}")]
    NotFound(Hash),

    /// A blob was found but failed to parse back into a `Thunk`.
    #[error("corrupt thunk blob for {hash}: {reason}")]
    Corrupt { hash: Hash, reason: String },

    /// Any other I/O failure (permissions, disk full, etc).
    #[error("store io error: {0}")]
    Io(String),
}

/// Fatal/programming-error conditions raised by [`crate::graph::ExecutionGraph`].
///
/// Per the graph's error-handling design, every variant here indicates a
/// bug in the caller or in the graph's own invariants -- not a race with a
/// remote worker pool. Races are handled separately, by silently dropping
/// stale reports (see `submit_reduction`'s empty-set return path).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Propagated from the `ThunkStore` collaborator.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A hash string didn't parse: unknown tag byte or empty digest.
    #[error("malformed hash: {0}")]
    MalformedHash(String),

    /// `create_dependency` was asked to depend on a computation that isn't
    /// up to date yet.
    #[error("computation {from} cannot depend on out-of-date computation {on}")]
    OutOfDateDependency {
        from: ComputationId,
        on: ComputationId,
    },

    /// The same (parent, child) edge was recorded under two different hashes.
    #[error(
        "computation {from} already depends on {on} via {existing}, cannot rebind to {new}"
    )]
    InconsistentDepHash {
        from: ComputationId,
        on: ComputationId,
        existing: Hash,
        new: Hash,
    },

    /// `submit_reduction` was called with an empty output list.
    #[error("submit_reduction called with an empty output list for {0}")]
    EmptyReduction(Hash),

    /// `submit_reduction` was called with a value hash as `from`.
    #[error("cannot reduce a value: {0}")]
    ReduceValue(Hash),

    /// Attempted to insert a computation under an id that's already occupied.
    #[error("duplicate computation insert for id {0}")]
    DuplicateInsert(ComputationId),

    /// `Thunk::update_data` was asked to rewrite a hash it doesn't reference.
    #[error("update_data: hash {0} is not referenced by this thunk")]
    UnknownUpdateTarget(Hash),

    /// A node was queried for its order-one frontier while out of date.
    ///
    /// This can only happen if a caller holds on to a hash that has since
    /// been superseded by a reduction it didn't learn about -- the graph's
    /// own call paths never invoke `order_one_dependencies` on a stale node.
    #[error("computation {0} queried for order-one dependencies while out of date")]
    StaleNode(ComputationId),
}
