//! Per-request join cache.
//!
//! For every resolved token the engine records, per join column, the key
//! value of each fetched record and where that record sits in the token's
//! result. Descendants read their parent's entry to build filters and to find
//! the records their own results must be stitched into.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::value::key_of;

/// Key index of one column over one token's result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheEntry {
    single_key: Option<Value>,
    /// `(key, record position)` in result order
    entries: Vec<(Value, usize)>,
    by_key: HashMap<String, Vec<usize>>,
}

impl CacheEntry {
    /// Index a single record.
    pub fn from_record(record: &Map<String, Value>, column: &str) -> Self {
        let mut entry = CacheEntry::default();
        if let Some(key) = record.get(column) {
            entry.single_key = Some(key.clone());
            entry.push(key.clone(), 0);
        }
        entry
    }

    /// Index a list of records; records without the column are skipped.
    pub fn from_records(records: &[Map<String, Value>], column: &str) -> Self {
        let mut entry = CacheEntry::default();
        for (position, record) in records.iter().enumerate() {
            if let Some(key) = record.get(column) {
                entry.push(key.clone(), position);
            }
        }
        entry
    }

    fn push(&mut self, key: Value, position: usize) {
        self.by_key.entry(key_of(&key)).or_default().push(position);
        self.entries.push((key, position));
    }

    /// Key of a single-record result.
    pub fn single_key(&self) -> Option<&Value> {
        self.single_key.as_ref()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn entries(&self) -> &[(Value, usize)] {
        &self.entries
    }

    /// First record carrying `key`.
    #[cfg(test)]
    pub(crate) fn record_for(&self, key: &Value) -> Option<usize> {
        self.positions_for(key).first().copied()
    }

    /// Every record carrying `key`, in result order.
    pub fn positions_for(&self, key: &Value) -> &[usize] {
        self.by_key
            .get(&key_of(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// path -> column -> entry
#[derive(Debug, Default)]
pub struct JoinCache {
    slots: HashMap<String, HashMap<String, CacheEntry>>,
}

impl JoinCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: String, columns: HashMap<String, CacheEntry>) {
        self.slots.insert(path, columns);
    }

    pub fn slot(&self, path: &str) -> Option<&HashMap<String, CacheEntry>> {
        self.slots.get(path)
    }

    pub fn entry(&self, path: &str, column: &str) -> Option<&CacheEntry> {
        self.slot(path)?.get(column)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, path: &str) -> bool {
        self.slots.contains_key(path)
    }
}
