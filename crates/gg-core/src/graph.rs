//! `ExecutionGraph`: the in-memory, mutable DAG of [`Computation`]s.
//!
//! Owns every [`Computation`] exclusively; callers only ever hold [`Hash`]es.
//! Every public method runs to completion before returning -- there are no
//! suspension points and no internal synchronization.

use std::collections::{BTreeSet, HashMap};

use crate::error::CoreError;
use crate::hash::{Hash, Tag};
use crate::node::{Computation, ComputationId};
use crate::store::ThunkStore;
use crate::thunk::Thunk;

/// The in-memory DAG of thunks being reduced to values.
pub struct ExecutionGraph<S: ThunkStore> {
    store: S,
    computations: HashMap<ComputationId, Computation>,
    /// Secondary index: the hash a computation was last indexed under.
    /// Only valid for ids whose computation is currently `up_to_date` and a
    /// Thunk.
    ids: HashMap<Hash, ComputationId>,
    /// Pre-existing value/executable blobs the overall computation needs
    /// staged. Accumulates across the graph's lifetime, including across
    /// in-place thunk replacements.
    blob_dependencies: BTreeSet<Hash>,
    next_id: u64,
    /// Count of computations that are currently values, so `size()` can be
    /// computed as `computations.len() - n_values` without a second walk.
    n_values: usize,
    log_renames: bool,
}

impl<S: ThunkStore> ExecutionGraph<S> {
    pub fn new(store: S, log_renames: bool) -> ExecutionGraph<S> {
        ExecutionGraph {
            store,
            computations: HashMap::new(),
            ids: HashMap::new(),
            blob_dependencies: BTreeSet::new(),
            next_id: 0,
            n_values: 0,
            log_renames,
        }
    }

    /// Registers the transitive thunk closure rooted at `hash` (a no-op if
    /// already present) and returns the currently order-one hashes.
    pub fn add_thunk(&mut self, hash: &Hash) -> Result<BTreeSet<Hash>, CoreError> {
        let id = self.add_thunk_inner(hash)?;
        self.order_one_dependencies(id)
    }

    fn add_thunk_inner(&mut self, hash: &Hash) -> Result<ComputationId, CoreError> {
        let base = hash.base();
        if let Some(&id) = self.ids.get(&base) {
            return Ok(id);
        }
        let thunk = self.store.read(&base)?;
        let id = ComputationId(self.next_id);
        self.next_id += 1;
        self.emplace_thunk(id, thunk)?;
        Ok(id)
    }

    /// Places `thunk` at `id` (fresh insert, or in-place replacement on a
    /// reduction-to-thunk), pulls in its thunk children, and reconciles it.
    fn emplace_thunk(&mut self, id: ComputationId, thunk: Thunk) -> Result<(), CoreError> {
        match self.computations.get_mut(&id) {
            Some(existing) => {
                existing.thunk = thunk;
                existing.up_to_date = false;
            }
            None => {
                self.computations.insert(id, Computation::new(thunk));
            }
        }

        // Blob dependencies accumulate, union-only, across replacements.
        let snapshot = self.computations[&id].thunk.clone();
        for (h, _) in snapshot.values() {
            self.blob_dependencies.insert(h.clone());
        }
        for (h, _) in snapshot.executables() {
            self.blob_dependencies.insert(h.clone());
        }

        for (child_hash, _) in snapshot.thunks() {
            let child_id = self.add_thunk_inner(child_hash)?;
            self.create_dependency(id, child_hash, child_id)?;
        }

        self.update(id)
    }

    fn create_dependency(
        &mut self,
        from: ComputationId,
        on_hash: &Hash,
        on: ComputationId,
    ) -> Result<(), CoreError> {
        if !self.computations[&on].is_ready() {
            return Err(CoreError::OutOfDateDependency { from, on });
        }
        if let Some(existing) = self.computations[&from].dep_hashes.get(&on) {
            if existing != on_hash {
                return Err(CoreError::InconsistentDepHash {
                    from,
                    on,
                    existing: existing.clone(),
                    new: on_hash.clone(),
                });
            }
        }

        let parent = self.computations.get_mut(&from).expect("from exists");
        parent.dep_hashes.insert(on, on_hash.clone());
        parent.deps.insert(on);
        self.computations
            .get_mut(&on)
            .expect("on exists")
            .rev_deps
            .insert(from);
        Ok(())
    }

    /// Severs `id`'s outgoing edges (its deps), removing it from each
    /// former child's `rev_deps`.
    fn cut_dependencies(&mut self, id: ComputationId) {
        let deps = std::mem::take(&mut self.computations.get_mut(&id).unwrap().deps);
        for child in &deps {
            if let Some(child) = self.computations.get_mut(child) {
                child.rev_deps.remove(&id);
            }
        }
        let computation = self.computations.get_mut(&id).unwrap();
        computation.deps = BTreeSet::new();
        computation.dep_hashes.clear();
        let _ = deps;
    }

    /// Flags `id` and all transitive ancestors (via `rev_deps`) as stale.
    /// Value ancestors are left alone and stop the recursion.
    fn mark_out_of_date(&mut self, id: ComputationId) {
        let computation = self.computations.get_mut(&id).expect("id exists");
        if computation.is_value() || !computation.up_to_date {
            return;
        }
        computation.up_to_date = false;
        let parents: Vec<ComputationId> = computation.rev_deps.iter().copied().collect();
        for parent in parents {
            self.mark_out_of_date(parent);
        }
    }

    /// Reconciles a stale node against its (already up-to-date) children,
    /// writes the result to the store, and re-indexes it under its current
    /// hash. A no-op if the node is already up to date.
    fn update(&mut self, id: ComputationId) -> Result<(), CoreError> {
        if self.computations[&id].is_value() || self.computations[&id].up_to_date {
            return Ok(());
        }

        let pre_update_hash = if self.computations[&id].deps.is_empty() {
            None
        } else {
            Some(self.computations[&id].thunk.hash())
        };

        let deps: Vec<ComputationId> = self.computations[&id].deps.iter().copied().collect();
        for child_id in deps {
            let old_hash = self.computations[&id].dep_hashes[&child_id].clone();
            let child_is_value = self.computations[&child_id].is_value();

            if child_is_value {
                let outputs = self.computations[&child_id].outputs.clone();
                let rewritten = self.computations[&id].thunk.update_data(&old_hash, &outputs)?;
                let node = self.computations.get_mut(&id).unwrap();
                node.thunk = rewritten;
                node.deps.remove(&child_id);
                node.dep_hashes.remove(&child_id);
                self.computations
                    .get_mut(&child_id)
                    .unwrap()
                    .rev_deps
                    .remove(&id);
            } else {
                // The child may itself still be stale (e.g. a grandparent
                // being reconciled before the intermediate parent's own
                // rehash reached it) -- ensure it's current before reading
                // its hash.
                self.update(child_id)?;
                let new_child_hash = self.computations[&child_id].thunk.hash();
                let rewritten = self.computations[&id]
                    .thunk
                    .update_data(&old_hash, &[(new_child_hash.clone(), String::new())])?;
                let node = self.computations.get_mut(&id).unwrap();
                node.thunk = rewritten;
                node.dep_hashes.insert(child_id, new_child_hash);
            }
        }

        let written_hash = self.store.write(&self.computations[&id].thunk)?;
        let node = self.computations.get_mut(&id).unwrap();
        node.up_to_date = true;
        self.ids.insert(written_hash.base(), id);

        if self.log_renames {
            if let Some(before) = pre_update_hash {
                if before != written_hash {
                    tracing::info!(
                        computation = %id,
                        old_hash = %before,
                        new_hash = %written_hash,
                        "thunk rehashed"
                    );
                }
            }
        }

        Ok(())
    }

    /// Reconciles `id` and then recurses into every ancestor that depends on
    /// it (transitively, via `rev_deps`), collecting any hash that newly
    /// became order-one executable along the way.
    ///
    /// A single level isn't enough: reconciling a node rehashes it, so its
    /// own parents -- and everything above them -- need the same treatment
    /// before their content is trustworthy again.
    fn propagate_update(
        &mut self,
        id: ComputationId,
        executable: &mut BTreeSet<Hash>,
    ) -> Result<(), CoreError> {
        self.update(id)?;
        let computation = &self.computations[&id];
        if !computation.is_value() && computation.thunk.can_be_executed() {
            executable.insert(computation.thunk.hash());
        }
        let parents: Vec<ComputationId> = computation.rev_deps.iter().copied().collect();
        for parent in parents {
            self.propagate_update(parent, executable)?;
        }
        Ok(())
    }

    /// Informs the graph that `from` reduced to `to`, returning the newly
    /// executable frontier and any hashes safe to garbage-collect.
    pub fn submit_reduction(
        &mut self,
        from: &Hash,
        to: Vec<(Hash, String)>,
    ) -> Result<(BTreeSet<Hash>, Vec<Hash>), CoreError> {
        if to.is_empty() {
            return Err(CoreError::EmptyReduction(from.clone()));
        }
        if from.tag() == Tag::Value {
            return Err(CoreError::ReduceValue(from.clone()));
        }
        if from.base() == to[0].0.base() {
            return Ok((BTreeSet::new(), Vec::new()));
        }

        let from_base = from.base();
        let Some(&id) = self.ids.get(&from_base) else {
            return Ok((BTreeSet::new(), Vec::new()));
        };
        {
            let computation = &self.computations[&id];
            if computation.is_value()
                || !computation.up_to_date
                || computation.thunk.hash() != from_base
            {
                return Ok((BTreeSet::new(), Vec::new()));
            }
        }

        self.mark_out_of_date(id);
        self.cut_dependencies(id);

        if to[0].0.tag() == Tag::Thunk {
            let new_thunk = self.store.read(&to[0].0.base())?;
            self.emplace_thunk(id, new_thunk)?;
            let frontier = self.order_one_dependencies(id)?;

            // `id` kept its place in the graph but its hash changed; every
            // ancestor still references it by the old hash until reconciled.
            let mut unused = BTreeSet::new();
            let parents: Vec<ComputationId> =
                self.computations[&id].rev_deps.iter().copied().collect();
            for parent in parents {
                self.propagate_update(parent, &mut unused)?;
            }

            Ok((frontier, Vec::new()))
        } else {
            self.computations.get_mut(&id).unwrap().outputs = to;
            self.n_values += 1;

            let rev_deps: Vec<ComputationId> =
                self.computations[&id].rev_deps.iter().copied().collect();
            let mut executable = BTreeSet::new();
            for parent_id in rev_deps {
                self.propagate_update(parent_id, &mut executable)?;
            }

            let mut removed = Vec::new();
            if self.computations[&id].rev_deps.is_empty()
                && !self.blob_dependencies.contains(&from_base)
            {
                removed.push(from_base);
            }

            Ok((executable, removed))
        }
    }

    /// The currently order-one (immediately executable) descendants of `id`.
    fn order_one_dependencies(&self, id: ComputationId) -> Result<BTreeSet<Hash>, CoreError> {
        let computation = &self.computations[&id];
        if computation.is_value() {
            return Ok(BTreeSet::new());
        }
        if !computation.up_to_date {
            return Err(CoreError::StaleNode(id));
        }
        if computation.thunk.can_be_executed() {
            let mut set = BTreeSet::new();
            set.insert(computation.thunk.hash());
            return Ok(set);
        }
        let mut result = BTreeSet::new();
        for child in computation.deps.iter().copied().collect::<Vec<_>>() {
            result.extend(self.order_one_dependencies(child)?);
        }
        Ok(result)
    }

    /// Looks up the known value of `hash`, if any.
    pub fn query_value(&self, hash: &Hash) -> Option<Hash> {
        let id = *self.ids.get(&hash.base())?;
        self.computations[&id]
            .outputs
            .first()
            .map(|(h, _)| h.clone())
    }

    /// Pre-existing value/executable blobs that have been referenced by any
    /// thunk ever added to this graph.
    pub fn blob_dependencies(&self) -> &BTreeSet<Hash> {
        &self.blob_dependencies
    }

    /// Count of live, non-value computations.
    pub fn size(&self) -> usize {
        self.computations.len() - self.n_values
    }

    /// Checks bidirectional dep/rev_dep consistency and hash-index
    /// integrity against the current state, returning every violation found
    /// rather than stopping at the first.
    ///
    /// Exposed (not just `#[cfg(test)]`) so the property tests in
    /// `tests/invariants.rs` -- a separate compilation unit -- can call it
    /// after every operation in a randomized sequence.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for (&id, computation) in &self.computations {
            for &child in &computation.deps {
                match self.computations.get(&child) {
                    Some(child_node) if child_node.rev_deps.contains(&id) => {}
                    _ => violations.push(format!(
                        "{id} has {child} in deps but not vice versa in rev_deps"
                    )),
                }
            }
            for &parent in &computation.rev_deps {
                match self.computations.get(&parent) {
                    Some(parent_node) if parent_node.deps.contains(&id) => {}
                    _ => violations.push(format!(
                        "{id} has {parent} in rev_deps but not vice versa in deps"
                    )),
                }
            }

            if computation.up_to_date && !computation.is_value() {
                match self.ids.get(&computation.thunk.hash()) {
                    Some(&indexed) if indexed == id => {}
                    other => violations.push(format!(
                        "{id} is up-to-date but ids_ maps its hash to {other:?}, not {id}"
                    )),
                }
            }
        }

        if let Some(cycle) = self.find_cycle() {
            violations.push(format!("deps relation contains a cycle: {cycle:?}"));
        }

        violations
    }

    /// DFS cycle detection over the `deps` relation, for [`check_invariants`].
    fn find_cycle(&self) -> Option<Vec<ComputationId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            graph: &HashMap<ComputationId, Computation>,
            id: ComputationId,
            marks: &mut HashMap<ComputationId, Mark>,
            stack: &mut Vec<ComputationId>,
        ) -> Option<Vec<ComputationId>> {
            match marks.get(&id) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    return Some(stack.clone());
                }
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            stack.push(id);
            if let Some(node) = graph.get(&id) {
                for &child in &node.deps {
                    if let Some(cycle) = visit(graph, child, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
            stack.pop();
            marks.insert(id, Mark::Done);
            None
        }

        let mut marks = HashMap::new();
        let mut stack = Vec::new();
        for &id in self.computations.keys() {
            if let Some(cycle) = visit(&self.computations, id, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }
}
