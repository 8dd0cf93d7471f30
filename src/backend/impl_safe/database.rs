// Copyright 2018-2019 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use std::{
    collections::BTreeMap,
    ops::Bound,
};

use serde_derive::{
    Deserialize,
    Serialize,
};

use crate::backend::traits::BackendDatabase;

pub(crate) const PAGE_SIZE: usize = 4096;

/// Space taken by the two meta pages before any data is stored.
pub(crate) const META_OVERHEAD: usize = 2 * PAGE_SIZE;

/// Per-entry bookkeeping charged against the map size on top of key and value.
pub(crate) const ENTRY_OVERHEAD: usize = 16;

pub(crate) const MAX_KEY_SIZE: usize = 511;

/// Handle of the single unnamed database.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct DatabaseImpl;

impl BackendDatabase for DatabaseImpl {}

type Entry<'s> = (&'s [u8], &'s [u8]);

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    map: BTreeMap<Box<[u8]>, Box<[u8]>>,
    #[serde(skip)]
    used: usize,
}

fn entry_size(key: &[u8], value: &[u8]) -> usize {
    key.len() + value.len() + ENTRY_OVERHEAD
}

impl Snapshot {
    pub(crate) fn new() -> Snapshot {
        Snapshot::default()
    }

    /// Rebuild the size accounting after deserialization.
    pub(crate) fn recount(&mut self) {
        self.used = self.map.iter().map(|(k, v)| entry_size(k, v)).sum();
    }

    pub(crate) fn used_bytes(&self) -> usize {
        META_OVERHEAD + self.used
    }

    /// The bytes in use once `key` holds `value`.
    pub(crate) fn used_bytes_after_put(&self, key: &[u8], value: &[u8]) -> usize {
        let replaced = self.map.get(key).map_or(0, |old| entry_size(key, old));
        self.used_bytes() - replaced + entry_size(key, value)
    }

    pub(crate) fn contains(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.map.get(key).map(|v| v.as_ref())
    }

    pub(crate) fn put(&mut self, key: &[u8], value: &[u8]) {
        if let Some(old) = self.map.insert(Box::from(key), Box::from(value)) {
            self.used -= entry_size(key, &old);
        }
        self.used += entry_size(key, value);
    }

    pub(crate) fn del(&mut self, key: &[u8]) -> Option<()> {
        let old = self.map.remove(key)?;
        self.used -= entry_size(key, &old);
        Some(())
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
        self.used = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn entry(&self, key: &[u8]) -> Option<Entry> {
        self.map.get_key_value(key).map(|(k, v)| (k.as_ref(), v.as_ref()))
    }

    pub(crate) fn first(&self) -> Option<Entry> {
        self.map.iter().next().map(|(k, v)| (k.as_ref(), v.as_ref()))
    }

    pub(crate) fn last(&self) -> Option<Entry> {
        self.map.iter().next_back().map(|(k, v)| (k.as_ref(), v.as_ref()))
    }

    pub(crate) fn at_or_after(&self, key: &[u8]) -> Option<Entry> {
        self.map
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
    }

    pub(crate) fn after(&self, key: &[u8]) -> Option<Entry> {
        self.map
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
    }

    pub(crate) fn before(&self, key: &[u8]) -> Option<Entry> {
        self.map
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
            .next_back()
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accounting_follows_puts_and_deletes() {
        let mut snapshot = Snapshot::new();
        assert_eq!(snapshot.used_bytes(), META_OVERHEAD);

        snapshot.put(b"key", b"value");
        assert_eq!(snapshot.used_bytes(), META_OVERHEAD + 3 + 5 + ENTRY_OVERHEAD);

        // Replacing a value only charges the difference.
        assert_eq!(snapshot.used_bytes_after_put(b"key", b"v"), META_OVERHEAD + 3 + 1 + ENTRY_OVERHEAD);
        snapshot.put(b"key", b"v");
        assert_eq!(snapshot.used_bytes(), META_OVERHEAD + 3 + 1 + ENTRY_OVERHEAD);

        assert_eq!(snapshot.del(b"key"), Some(()));
        assert_eq!(snapshot.del(b"key"), None);
        assert_eq!(snapshot.used_bytes(), META_OVERHEAD);
    }

    #[test]
    fn test_ordered_navigation() {
        let mut snapshot = Snapshot::new();
        snapshot.put(b"b", b"2");
        snapshot.put(b"a", b"1");
        snapshot.put(b"d", b"4");

        assert_eq!(snapshot.first(), Some((&b"a"[..], &b"1"[..])));
        assert_eq!(snapshot.last(), Some((&b"d"[..], &b"4"[..])));
        assert_eq!(snapshot.after(b"a"), Some((&b"b"[..], &b"2"[..])));
        assert_eq!(snapshot.after(b"d"), None);
        assert_eq!(snapshot.before(b"b"), Some((&b"a"[..], &b"1"[..])));
        assert_eq!(snapshot.at_or_after(b"c"), Some((&b"d"[..], &b"4"[..])));
        assert_eq!(snapshot.entry(b"c"), None);
    }

    #[test]
    fn test_recount_after_round_trip() {
        let mut snapshot = Snapshot::new();
        snapshot.put(b"foo", b"bar");
        let bytes = bincode::serialize(&snapshot).expect("serialized");
        let mut restored: Snapshot = bincode::deserialize(&bytes).expect("deserialized");
        assert_eq!(restored.used_bytes(), META_OVERHEAD);
        restored.recount();
        assert_eq!(restored.used_bytes(), snapshot.used_bytes());
        assert_eq!(restored.len(), 1);
    }
}
