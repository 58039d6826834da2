//! Named namespace of triple indexes.
//!
//! Blocks receive the multi-index at execution time and address indexes by
//! database name. Indexes are shared (`Arc<RwLock<_>>`) because a database
//! and every evaluation it is registered in hold the same index; within one
//! evaluation access is single-threaded and the lock is ownership plumbing,
//! not a concurrency point.

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::{StoreError, TripleIndex};

pub type SharedIndex = Arc<RwLock<TripleIndex>>;

#[derive(Default, Clone)]
pub struct MultiIndex {
    indexes: IndexMap<String, SharedIndex>,
}

impl MultiIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named index. Registering a name that already exists is a
    /// precondition violation.
    pub fn register(&mut self, name: &str, index: SharedIndex) -> Result<(), StoreError> {
        if self.indexes.contains_key(name) {
            return Err(StoreError::DuplicateIndex(name.to_owned()));
        }
        self.indexes.insert(name.to_owned(), index);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Result<SharedIndex, StoreError> {
        self.indexes
            .shift_remove(name)
            .ok_or_else(|| StoreError::UnknownIndex(name.to_owned()))
    }

    pub fn get(&self, name: &str) -> Option<&SharedIndex> {
        self.indexes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }
}
