//! `Thunk`: an immutable, content-addressed description of one computation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hash::{Hash, Tag};

/// One entry of `argv`: either a literal string, or a placeholder that gets
/// substituted with a data-input's current hash at execution time.
///
/// A placeholder carries the *current* hash of the input it names (with an
/// optional `#output` suffix selecting one of several named outputs); that
/// hash is exactly what appears as a key in `values`/`executables`/`thunks`,
/// so `Thunk::update_data` can find and rewrite it in lock-step with the
/// input-slot maps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgvEntry {
    Literal(String),
    Placeholder(Hash),
}

/// The executable plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub executable: Hash,
    pub argv: Vec<ArgvEntry>,
}

impl Function {
    /// Rewrites every placeholder whose base hash is `old` to `new`,
    /// dropping any `#output` suffix (used when a thunk child is replaced
    /// by another single thunk: there's only ever one slot to resolve to).
    fn rewrite_to_single(&mut self, old: &Hash, new: &Hash) {
        for entry in &mut self.argv {
            if let ArgvEntry::Placeholder(h) = entry {
                if h.base() == *old {
                    *h = new.clone();
                }
            }
        }
    }

    /// Rewrites every placeholder whose base hash is `old` to the matching
    /// entry of `new_hashes` by output name; a placeholder with no `#name`
    /// suffix resolves to `new_hashes[0]`.
    fn rewrite_to_values(&mut self, old: &Hash, new_hashes: &[(Hash, String)]) {
        for entry in &mut self.argv {
            if let ArgvEntry::Placeholder(h) = entry {
                if h.base() == *old {
                    let replacement = match h.output_name() {
                        Some(name) => new_hashes
                            .iter()
                            .find(|(_, n)| n == name)
                            .map(|(hash, _)| hash.clone()),
                        None => new_hashes.first().map(|(hash, _)| hash.clone()),
                    };
                    if let Some(replacement) = replacement {
                        *h = replacement;
                    }
                }
            }
        }
    }

    fn references(&self, hash: &Hash) -> bool {
        self.argv.iter().any(|entry| match entry {
            ArgvEntry::Placeholder(h) => h.base() == *hash,
            ArgvEntry::Literal(_) => false,
        })
    }
}

/// An immutable description of one computation: a function to run, the
/// inputs it needs staged, the unreduced thunk children it still depends
/// on, and the names of the outputs it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thunk {
    function: Function,
    /// value-hash -> the slot name this input is known by.
    values: BTreeMap<Hash, String>,
    /// executable-hash -> the slot name this input is known by.
    executables: BTreeMap<Hash, String>,
    /// thunk-hash -> the slot name this (unreduced) child is known by.
    thunks: BTreeMap<Hash, String>,
    /// Names of the outputs this thunk produces, in order. Never empty.
    outputs: Vec<String>,
}

impl Thunk {
    pub fn new(
        function: Function,
        values: BTreeMap<Hash, String>,
        executables: BTreeMap<Hash, String>,
        thunks: BTreeMap<Hash, String>,
        outputs: Vec<String>,
    ) -> Thunk {
        Thunk {
            function,
            values,
            executables,
            thunks,
            outputs,
        }
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn values(&self) -> impl Iterator<Item = (&Hash, &str)> {
        self.values.iter().map(|(h, n)| (h, n.as_str()))
    }

    pub fn executables(&self) -> impl Iterator<Item = (&Hash, &str)> {
        self.executables.iter().map(|(h, n)| (h, n.as_str()))
    }

    pub fn thunks(&self) -> impl Iterator<Item = (&Hash, &str)> {
        self.thunks.iter().map(|(h, n)| (h, n.as_str()))
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// True iff this thunk has no unreduced thunk children -- i.e. it is
    /// immediately executable.
    pub fn can_be_executed(&self) -> bool {
        self.thunks.is_empty()
    }

    /// This thunk's content hash: SHA-256 of its canonical serialization,
    /// base64url-unpadded, tagged `T`.
    ///
    /// Two thunks with equal canonical form (the `BTreeMap` fields already
    /// serialize in a fixed, sorted order) always hash equal.
    pub fn hash(&self) -> Hash {
        let bytes = serde_json::to_vec(self).expect("Thunk serialization is infallible");
        Hash::digest_thunk(&bytes)
    }

    /// Rewrites every input-slot and argv placeholder bearing `old_hash` to
    /// `new_hashes`:
    ///
    /// - a single thunk-tagged replacement keeps the slot in `thunks`;
    /// - anything else (one or more values) removes the slot from `thunks`
    ///   and inserts one `values` entry per new hash, named
    ///   `"{slot_name}.{output_name}"`.
    pub fn update_data(
        &self,
        old_hash: &Hash,
        new_hashes: &[(Hash, String)],
    ) -> Result<Thunk, CoreError> {
        let old_base = old_hash.base();
        let slot_name = self
            .thunks
            .get(&old_base)
            .cloned()
            .ok_or_else(|| CoreError::UnknownUpdateTarget(old_base.clone()))?;

        let mut next = self.clone();
        next.thunks.remove(&old_base);

        if new_hashes.len() == 1 && new_hashes[0].0.tag() == Tag::Thunk {
            let new_hash = new_hashes[0].0.base();
            next.thunks.insert(new_hash.clone(), slot_name);
            next.function.rewrite_to_single(&old_base, &new_hash);
        } else {
            for (hash, name) in new_hashes {
                next.values
                    .insert(hash.clone(), format!("{slot_name}.{name}"));
            }
            next.function.rewrite_to_values(&old_base, new_hashes);
        }

        Ok(next)
    }

    /// True if any input-slot or argv placeholder still references `hash`.
    #[cfg(test)]
    fn references(&self, hash: &Hash) -> bool {
        self.values.contains_key(hash)
            || self.executables.contains_key(hash)
            || self.thunks.contains_key(hash)
            || self.function.references(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exe(name: &str) -> Hash {
        Hash::parse(format!("X{name}")).unwrap()
    }

    fn val(name: &str) -> Hash {
        Hash::parse(format!("V{name}")).unwrap()
    }

    fn thunk_hash(name: &str) -> Hash {
        Hash::parse(format!("T{name}")).unwrap()
    }

    fn leaf_thunk() -> Thunk {
        Thunk::new(
            Function {
                executable: exe("bin"),
                argv: vec![ArgvEntry::Literal("run".to_string())],
            },
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            vec!["out".to_string()],
        )
    }

    #[test]
    fn hash_is_deterministic() {
        let t = leaf_thunk();
        assert_eq!(t.hash(), t.hash());
    }

    #[test]
    fn equal_content_hashes_equal() {
        let a = leaf_thunk();
        let b = leaf_thunk();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn can_be_executed_iff_no_thunk_children() {
        let mut thunks = BTreeMap::new();
        thunks.insert(thunk_hash("child"), "c".to_string());
        let with_child = Thunk::new(
            Function {
                executable: exe("bin"),
                argv: vec![],
            },
            BTreeMap::new(),
            BTreeMap::new(),
            thunks,
            vec!["out".to_string()],
        );
        assert!(!with_child.can_be_executed());
        assert!(leaf_thunk().can_be_executed());
    }

    #[test]
    fn update_data_with_thunk_replacement_keeps_slot_in_thunks() {
        let child = thunk_hash("child");
        let mut thunks = BTreeMap::new();
        thunks.insert(child.clone(), "c".to_string());
        let t = Thunk::new(
            Function {
                executable: exe("bin"),
                argv: vec![ArgvEntry::Placeholder(child.clone())],
            },
            BTreeMap::new(),
            BTreeMap::new(),
            thunks,
            vec!["out".to_string()],
        );

        let new_child = thunk_hash("child2");
        let rewritten = t
            .update_data(&child, &[(new_child.clone(), String::new())])
            .unwrap();

        assert!(!rewritten.thunks.contains_key(&child));
        assert_eq!(rewritten.thunks.get(&new_child), Some(&"c".to_string()));
        assert!(rewritten.references(&new_child));
        assert!(!rewritten.references(&child));
    }

    #[test]
    fn update_data_with_value_migrates_slot_out_of_thunks() {
        let child = thunk_hash("child");
        let mut thunks = BTreeMap::new();
        thunks.insert(child.clone(), "c".to_string());
        let t = Thunk::new(
            Function {
                executable: exe("bin"),
                argv: vec![ArgvEntry::Placeholder(child.clone())],
            },
            BTreeMap::new(),
            BTreeMap::new(),
            thunks,
            vec!["out".to_string()],
        );

        let v = val("result");
        let rewritten = t
            .update_data(&child, &[(v.clone(), "out".to_string())])
            .unwrap();

        assert!(!rewritten.thunks.contains_key(&child));
        assert_eq!(rewritten.values.get(&v), Some(&"c.out".to_string()));
        assert!(rewritten.can_be_executed());
        assert!(rewritten.references(&v));
    }

    #[test]
    fn update_data_resolves_output_suffix_by_name() {
        let child = thunk_hash("child");
        let placeholder = Hash::parse("Tchild#second").unwrap();
        let mut thunks = BTreeMap::new();
        thunks.insert(child.clone(), "c".to_string());
        let t = Thunk::new(
            Function {
                executable: exe("bin"),
                argv: vec![ArgvEntry::Placeholder(placeholder)],
            },
            BTreeMap::new(),
            BTreeMap::new(),
            thunks,
            vec!["out".to_string()],
        );

        let first = val("first");
        let second = val("second");
        let rewritten = t
            .update_data(
                &child,
                &[
                    (first.clone(), "first".to_string()),
                    (second.clone(), "second".to_string()),
                ],
            )
            .unwrap();

        assert!(rewritten.references(&second));
        assert!(!rewritten.references(&first));
    }

    #[test]
    fn update_data_unknown_hash_is_an_error() {
        let t = leaf_thunk();
        let other = thunk_hash("nope");
        assert!(t.update_data(&other, &[(val("x"), "x".to_string())]).is_err());
    }
}
