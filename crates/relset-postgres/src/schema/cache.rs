//! Per-Model cache of relation metadata.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::metadata::{QualifiedName, RelationMetadata};

/// Metadata keyed by qualified name.
///
/// Entries are filled lazily on first use of a relation and live until the
/// next `invalidate`, which the Model issues on reconnect and reload.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: RwLock<HashMap<QualifiedName, Arc<RelationMetadata>>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &QualifiedName) -> Option<Arc<RelationMetadata>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Stores `meta` unless an entry already exists, and returns the cached
    /// entry. Every caller asking for one name shares one `Arc`.
    pub fn insert(&self, meta: RelationMetadata) -> Arc<RelationMetadata> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(meta.name.clone())
            .or_insert_with(|| Arc::new(meta))
            .clone()
    }

    pub fn invalidate(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached names, sorted.
    pub fn names(&self) -> Vec<QualifiedName> {
        let mut names: Vec<QualifiedName> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
