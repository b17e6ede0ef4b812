//! Namespace storage: ordered keys with optional deferred values.
//!
//! A namespace is one node of the scope tree. Its entries keep insertion
//! order; overwriting a key keeps its original position. Child namespaces
//! entered from this one are cached by key so repeated navigation sees the
//! same (already compiled) node.

use std::collections::HashMap;
use std::rc::Rc;

use super::statement::{EvalCell, ValueStatement};

/// Arena index of a namespace inside the [`Engine`](super::Engine).
pub type SpaceId = usize;

#[derive(Debug)]
pub(crate) struct Entry {
    pub key: String,
    pub value: Option<Rc<ValueStatement>>,
}

#[derive(Debug)]
pub(crate) struct Namespace {
    pub parent: Option<SpaceId>,
    /// The deferred value whose execution populates this namespace.
    pub statement: Option<Rc<ValueStatement>>,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    /// Child namespaces entered from here, keyed by entry name.
    pub children: HashMap<String, SpaceId>,
    pub cell: EvalCell,
}

impl Namespace {
    pub fn new(parent: Option<SpaceId>, statement: Option<Rc<ValueStatement>>) -> Self {
        Namespace {
            parent,
            statement,
            entries: Vec::new(),
            index: HashMap::new(),
            children: HashMap::new(),
            cell: EvalCell::default(),
        }
    }

    /// Add a key without macro expansion. An existing key is overwritten
    /// in place, keeping its position; a new key is appended. Any cached
    /// child for the key is dropped since its statement may have changed.
    pub fn add_raw(&mut self, key: String, value: Option<Rc<ValueStatement>>) {
        debug_assert!(!key.is_empty(), "namespace keys are never empty");
        if key.is_empty() {
            return;
        }
        match self.index.get(&key) {
            Some(&i) => {
                self.entries[i].value = value;
                self.children.remove(&key);
            }
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push(Entry { key, value });
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// The value bound to `key`. Outer None means the key is absent;
    /// inner None means the key exists without a value.
    pub fn value_of(&self, key: &str) -> Option<Option<Rc<ValueStatement>>> {
        self.index
            .get(key)
            .map(|&i| self.entries[i].value.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }

    pub fn first_key(&self) -> Option<String> {
        self.entries.first().map(|e| e.key.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries and cached children so the namespace can be
    /// repopulated from scratch.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.children.clear();
    }
}
