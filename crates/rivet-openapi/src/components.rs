//! Shared, name-keyed component tables.

use crate::spec::RefOr;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("component {section}/{key} declared more than once with different content")]
pub struct ComponentConflict {
    pub section: &'static str,
    pub key: String,
}

/// Append-only table for one components section.
///
/// Registering the same content under a key again yields the existing
/// reference; different content under a taken key is a conflict.
#[derive(Debug, Clone)]
pub struct ComponentTable<T> {
    section: &'static str,
    items: BTreeMap<String, T>,
}

impl<T: PartialEq> ComponentTable<T> {
    pub fn new(section: &'static str) -> Self {
        Self {
            section,
            items: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, key: &str, item: T) -> Result<RefOr<T>, ComponentConflict> {
        match self.items.get(key) {
            Some(existing) if *existing != item => Err(ComponentConflict {
                section: self.section,
                key: key.to_string(),
            }),
            Some(_) => Ok(RefOr::reference(self.section, key)),
            None => {
                self.items.insert(key.to_string(), item);
                Ok(RefOr::reference(self.section, key))
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.get(key)
    }

    pub fn into_inner(self) -> BTreeMap<String, T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
