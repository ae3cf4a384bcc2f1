//! `Computation`: the mutable graph node wrapping a thunk or its value.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::hash::Hash;
use crate::thunk::Thunk;

/// A monotonically-increasing, stable identifier for a [`Computation`].
///
/// Unlike a `Hash`, a `ComputationId` never changes as the thunk it names
/// gets rewritten -- it is the primary key nodes are stored under; `Hash`es
/// only ever serve as a secondary index (`ExecutionGraph::ids`) into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComputationId(pub u64);

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The derived state of a [`Computation`].
///
/// `Link` is a deliberately unused skeleton: a future de-duplication pass
/// would collapse two up-to-date nodes with identical hashes into a `Link`
/// whose `deps` points at the other, but nothing in this crate constructs
/// one yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationKind {
    Value,
    Thunk,
    Link,
}

/// A node in the execution graph: a thunk in the process of being reduced,
/// or the value it reduced to.
#[derive(Debug, Clone)]
pub struct Computation {
    /// The executable (but potentially out-of-date) thunk.
    pub thunk: Thunk,
    /// Whether `thunk` accurately reflects the current state of `deps`.
    pub up_to_date: bool,
    /// Empty while unreduced; non-empty once this computation is a value.
    pub outputs: Vec<(Hash, String)>,
    /// Computations this one depends on.
    pub deps: BTreeSet<ComputationId>,
    /// Computations dependent on this one.
    pub rev_deps: BTreeSet<ComputationId>,
    /// The hash each dependency is currently known by, from this node's
    /// own thunk's point of view.
    pub dep_hashes: BTreeMap<ComputationId, Hash>,
    /// Non-`None` once a de-duplication pass (not yet implemented) decides
    /// this node is a copy of another. See [`ComputationKind::Link`].
    pub link: Option<ComputationId>,
}

impl Computation {
    pub fn new(thunk: Thunk) -> Computation {
        Computation {
            thunk,
            up_to_date: false,
            outputs: Vec::new(),
            deps: BTreeSet::new(),
            rev_deps: BTreeSet::new(),
            dep_hashes: BTreeMap::new(),
            link: None,
        }
    }

    pub fn is_value(&self) -> bool {
        !self.outputs.is_empty()
    }

    /// True if this node can be safely depended on: a value is always
    /// ready regardless of its (unused, left stale) `up_to_date` flag; a
    /// thunk is ready only once its own content reflects its current deps.
    pub fn is_ready(&self) -> bool {
        self.is_value() || self.up_to_date
    }

    pub fn kind(&self) -> ComputationKind {
        if self.is_value() {
            ComputationKind::Value
        } else if self.link.is_some() {
            ComputationKind::Link
        } else {
            ComputationKind::Thunk
        }
    }
}

/// Follows `link` pointers to the non-link computation they ultimately
/// resolve to. A no-op today since no de-duplication pass ever sets
/// `Computation::link`, but kept as the plug point a future pass would use.
pub fn follow_links(
    computations: &std::collections::HashMap<ComputationId, Computation>,
    mut id: ComputationId,
) -> ComputationId {
    while let Some(target) = computations.get(&id).and_then(|c| c.link) {
        id = target;
    }
    id
}
