//! Property tests for the graph's structural invariants.
//!
//! Generates random DAGs of thunks (each node's children are drawn only
//! from nodes created earlier, so acyclicity holds by construction), drives
//! them to completion through random reduction orders, and checks
//! bidirectional consistency / acyclicity / index integrity after every
//! single call via `ExecutionGraph::check_invariants`.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use gg_core::{ArgvEntry, ExecutionGraph, Function, Hash};
use gg_store::InMemoryThunkStore;

/// A small random DAG, described as a list of nodes in creation order. Each
/// node's `children` are indices strictly less than its own position, so
/// building thunks bottom-up never needs a forward reference.
#[derive(Debug, Clone)]
struct DagSpec {
    /// For each node, the indices of the other nodes it (thunk-)depends on.
    children: Vec<Vec<usize>>,
}

fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = DagSpec> {
    (2..=max_nodes).prop_flat_map(|n| {
        let mut per_node = Vec::with_capacity(n);
        for i in 0..n {
            // Each node may depend on up to 2 earlier nodes (0 for node 0).
            let max_children = i.min(2);
            per_node.push(proptest::sample::subsequence((0..i).collect::<Vec<_>>(), 0..=max_children));
        }
        per_node.prop_map(move |children| DagSpec { children })
    })
}

/// Builds and seeds the thunks for a [`DagSpec`], returning the store, the
/// root hash, and the hashes of every leaf (childless) node -- the only
/// hashes that should ever appear in a returned frontier.
fn build(spec: &DagSpec) -> (InMemoryThunkStore, Hash, BTreeSet<Hash>) {
    let store = InMemoryThunkStore::new();
    let mut hashes: Vec<Hash> = Vec::with_capacity(spec.children.len());
    let mut leaves = BTreeSet::new();

    for (i, children) in spec.children.iter().enumerate() {
        let mut thunks = BTreeMap::new();
        let mut argv = vec![ArgvEntry::Literal(format!("node-{i}"))];
        for &c in children {
            thunks.insert(hashes[c].clone(), format!("slot-{c}"));
            argv.push(ArgvEntry::Placeholder(hashes[c].clone()));
        }
        let thunk = gg_core::Thunk::new(
            Function {
                executable: Hash::parse(format!("Xbin-{i}")).unwrap(),
                argv,
            },
            BTreeMap::new(),
            BTreeMap::new(),
            thunks,
            vec!["out".to_string()],
        );
        let hash = store.seed(thunk);
        if children.is_empty() {
            leaves.insert(hash.clone());
        }
        hashes.push(hash);
    }

    let root = hashes.last().unwrap().clone();
    (store, root, leaves)
}

proptest! {
    /// Bidirectional consistency, acyclicity, and index integrity hold
    /// after every single graph operation, driving a random DAG to
    /// completion via random reduction order.
    #[test]
    fn invariants_hold_through_random_reduction_order(
        spec in dag_strategy(8),
        seed in any::<u64>(),
    ) {
        let (store, root, _leaves) = build(&spec);
        let mut graph = ExecutionGraph::new(store, false);

        // `submit_reduction` only ever returns the *newly* executable
        // hashes, not the full remaining worklist -- so the harness has to
        // keep its own pending set, folding each call's result back in,
        // rather than treating the return value as the next loop state.
        let mut pending: BTreeSet<Hash> = graph.add_thunk(&root).unwrap();
        prop_assert!(graph.check_invariants().is_empty());

        let mut executed = BTreeSet::new();
        // A tiny xorshift-style PRNG so the test stays reproducible across
        // shrinking without pulling in a `rand` dev-dependency here.
        let mut state = seed | 1;
        let mut next_rand = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let mut output_counter = 0u64;
        while !pending.is_empty() {
            let items: Vec<Hash> = pending.iter().cloned().collect();
            let pick = items[(next_rand() as usize) % items.len()].clone();
            pending.remove(&pick);
            prop_assert!(!executed.contains(&pick), "re-executed {pick}");
            executed.insert(pick.clone());

            output_counter += 1;
            let value = Hash::parse(format!("Vresult-{output_counter}")).unwrap();
            let (new_executable, _removed) = graph
                .submit_reduction(&pick, vec![(value, "out".to_string())])
                .unwrap();
            let violations = graph.check_invariants();
            prop_assert!(violations.is_empty(), "{:?}", violations);

            pending.extend(new_executable);
        }

        // Draining the pending set to empty must have driven the root all
        // the way to a value, with no unreduced computations left live.
        prop_assert!(graph.query_value(&root).is_some());
        prop_assert_eq!(graph.size(), 0);
    }

    /// `add_thunk` called twice in a row returns the same frontier and
    /// leaves the graph in the same observable state.
    #[test]
    fn add_thunk_is_idempotent(spec in dag_strategy(6)) {
        let (store, root, _leaves) = build(&spec);
        let mut graph = ExecutionGraph::new(store, false);

        let first = graph.add_thunk(&root).unwrap();
        let size_after_first = graph.size();
        let second = graph.add_thunk(&root).unwrap();

        prop_assert_eq!(first, second);
        prop_assert_eq!(size_after_first, graph.size());
        prop_assert!(graph.check_invariants().is_empty());
    }

    /// Re-submitting an already-processed reduction is a no-op: it returns
    /// empty sets and leaves the graph state unchanged.
    #[test]
    fn stale_submit_reduction_is_idempotent(spec in dag_strategy(4)) {
        let (store, root, leaves) = build(&spec);
        let mut graph = ExecutionGraph::new(store, false);
        let frontier = graph.add_thunk(&root).unwrap();

        let Some(first_leaf) = frontier.iter().next().cloned() else {
            // A root with no thunk children at all; nothing to reduce.
            return Ok(());
        };
        prop_assert!(leaves.contains(&first_leaf));

        let value = Hash::parse("Vonce").unwrap();
        let (_exec, _removed) = graph
            .submit_reduction(&first_leaf, vec![(value.clone(), "out".to_string())])
            .unwrap();
        let size_after_first = graph.size();

        let (exec2, removed2) = graph
            .submit_reduction(&first_leaf, vec![(value, "out".to_string())])
            .unwrap();

        prop_assert!(exec2.is_empty());
        prop_assert!(removed2.is_empty());
        prop_assert_eq!(size_after_first, graph.size());
        prop_assert!(graph.check_invariants().is_empty());
    }
}
