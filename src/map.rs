//! PinHashMap: the hash table core. Bucketed storage keyed by canonical
//! hash plus structural equality, two retention logs, and log compaction.

use crate::canon::Canonicalizer;
use crate::reentry::ReentryFlag;
use crate::retain::RetentionLog;
use crate::value::{HostValue, Unhashable};
use core::fmt;
use core::hash::BuildHasher;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;

/// Compaction fires once the key log grows past this multiple of the live
/// entry count, bounding retention overhead to O(1) amortized per mutation.
const COMPACT_FACTOR: usize = 2;

/// Errors surfaced by map operations.
///
/// A failed operation leaves the map observably unchanged; batch operations
/// never apply a partial prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    /// Batch key/value sequences of different lengths.
    LengthMismatch { keys: usize, values: usize },
    /// A duplicate-policy name that is neither `"first"` nor `"stack"`.
    UnknownPolicy(String),
    /// A key (or, for `invert`, a value) the host cannot canonically encode.
    Unhashable,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::LengthMismatch { keys, values } => {
                write!(f, "length mismatch: {keys} keys vs {values} values")
            }
            MapError::UnknownPolicy(name) => {
                write!(f, "unknown duplicate policy {name:?}; expected \"first\" or \"stack\"")
            }
            MapError::Unhashable => fmt::Display::fmt(&Unhashable, f),
        }
    }
}

impl std::error::Error for MapError {}

impl From<Unhashable> for MapError {
    fn from(_: Unhashable) -> Self {
        MapError::Unhashable
    }
}

/// Tie-break rule applied by [`PinHashMap::invert`] when several keys map
/// to the same value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DuplicatePolicy {
    /// Keep exactly one of the keys that shared a value: the one
    /// enumerated last, which depends on table iteration order.
    First,
    /// Collect all keys that shared a value into one host sequence; a lone
    /// key is stored unwrapped.
    Stack,
}

impl core::str::FromStr for DuplicatePolicy {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, MapError> {
        match s {
            "first" => Ok(DuplicatePolicy::First),
            "stack" => Ok(DuplicatePolicy::Stack),
            other => Err(MapError::UnknownPolicy(other.to_owned())),
        }
    }
}

/// Interchange form of a map: equal-length key and value sequences, with no
/// other structural requirement.
#[derive(Clone, Debug)]
pub struct Snapshot<V> {
    pub keys: Vec<V>,
    pub values: Vec<V>,
}

#[derive(Clone)]
struct Entry<V> {
    key: V,
    value: V,
    hash: u64,
}

/// A map from opaque host values to opaque host values.
///
/// Keys compare by structural (deep content) equality; hashes derive from
/// the key's canonical byte encoding and are stored per entry, so host
/// equality only runs while probing and never during internal rehashes.
/// Every key and value that enters the table is pinned through a
/// [`RetentionLog`]; dropping the map releases every pin.
///
/// Single-threaded and non-reentrant: host callbacks invoked during an
/// operation must not dispatch back into the same instance.
pub struct PinHashMap<V: HostValue, S = RandomState> {
    canon: Canonicalizer<S>,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<V>>, // entry storage behind generational keys
    key_log: RetentionLog<V>,
    value_log: RetentionLog<V>,
    reentry: ReentryFlag,
}

impl<V: HostValue> PinHashMap<V> {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl<V: HostValue> Default for PinHashMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S> PinHashMap<V, S>
where
    V: HostValue,
    S: BuildHasher + Clone + Default,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            canon: Canonicalizer::with_hasher(hasher),
            index: HashTable::new(),
            slots: SlotMap::with_key(),
            key_log: RetentionLog::new(),
            value_log: RetentionLog::new(),
            reentry: ReentryFlag::new(),
        }
    }

    /// Number of live entries. Table membership is the single source of
    /// truth for presence; the logs always hold at least this many handles.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Insert or update the entry for `key`.
    ///
    /// Both handles are pushed into the retention logs unconditionally,
    /// even when the key already exists; retention stays a superset of
    /// liveness without a lookup, and compaction reclaims the surplus.
    /// With `replace` the entry is overwritten (last write wins); without
    /// it an existing entry is kept and the new `value` stays orphaned in
    /// the log until the next compaction.
    pub fn set(&mut self, key: V, value: V, replace: bool) -> Result<(), MapError> {
        let _g = self.reentry.enter();
        let hash = self.canon.hash_of(&key)?;
        self.key_log.push(key.clone());
        self.value_log.push(value.clone());
        Self::insert_hashed(&mut self.index, &mut self.slots, hash, key, value, replace);
        Self::compact(&self.slots, &mut self.key_log, &mut self.value_log);
        Ok(())
    }

    /// Value associated with `key`, or `None` if absent. Absence is not an
    /// error; only a key the host cannot encode is.
    pub fn get(&self, key: &V) -> Result<Option<&V>, MapError> {
        let _g = self.reentry.enter();
        let hash = self.canon.hash_of(key)?;
        Ok(self.find_slot(hash, key).map(|k| &self.slots[k].value))
    }

    pub fn contains(&self, key: &V) -> Result<bool, MapError> {
        let _g = self.reentry.enter();
        let hash = self.canon.hash_of(key)?;
        Ok(self.find_slot(hash, key).is_some())
    }

    /// Delete the entry for `key` if present; reports whether it was.
    /// The logs are not shrunk eagerly; only compaction reclaims them.
    pub fn remove(&mut self, key: &V) -> Result<bool, MapError> {
        let _g = self.reentry.enter();
        let hash = self.canon.hash_of(key)?;
        let removed = Self::remove_hashed(&mut self.index, &mut self.slots, hash, key);
        Self::compact(&self.slots, &mut self.key_log, &mut self.value_log);
        Ok(removed)
    }

    /// Element-wise [`set`](Self::set) over equal-length slices, in input
    /// order, with a single compaction check at the end.
    ///
    /// The whole batch is validated (lengths, then every key's encoding)
    /// before the first mutation, so a failure leaves the map unchanged.
    pub fn set_range(&mut self, keys: &[V], values: &[V], replace: bool) -> Result<(), MapError> {
        let _g = self.reentry.enter();
        if keys.len() != values.len() {
            return Err(MapError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        let hashes = self.hash_keys(keys)?;
        for ((key, value), hash) in keys.iter().zip(values).zip(hashes) {
            self.key_log.push(key.clone());
            self.value_log.push(value.clone());
            Self::insert_hashed(
                &mut self.index,
                &mut self.slots,
                hash,
                key.clone(),
                value.clone(),
                replace,
            );
        }
        Self::compact(&self.slots, &mut self.key_log, &mut self.value_log);
        Ok(())
    }

    /// Element-wise lookup; each result is the associated value handle or
    /// `None`.
    pub fn get_range(&self, keys: &[V]) -> Result<Vec<Option<V>>, MapError> {
        let _g = self.reentry.enter();
        let hashes = self.hash_keys(keys)?;
        Ok(keys
            .iter()
            .zip(hashes)
            .map(|(key, hash)| self.find_slot(hash, key).map(|k| self.slots[k].value.clone()))
            .collect())
    }

    pub fn contains_range(&self, keys: &[V]) -> Result<Vec<bool>, MapError> {
        let _g = self.reentry.enter();
        let hashes = self.hash_keys(keys)?;
        Ok(keys
            .iter()
            .zip(hashes)
            .map(|(key, hash)| self.find_slot(hash, key).is_some())
            .collect())
    }

    /// Element-wise removal; returns how many entries were actually
    /// deleted.
    pub fn remove_range(&mut self, keys: &[V]) -> Result<usize, MapError> {
        let _g = self.reentry.enter();
        let hashes = self.hash_keys(keys)?;
        let mut removed = 0;
        for (key, hash) in keys.iter().zip(hashes) {
            if Self::remove_hashed(&mut self.index, &mut self.slots, hash, key) {
                removed += 1;
            }
        }
        Self::compact(&self.slots, &mut self.key_log, &mut self.value_log);
        Ok(removed)
    }

    /// Snapshot of all live keys, in table iteration order. The order is
    /// implementation-defined and not stable across compactions or runs;
    /// callers needing determinism must sort externally.
    pub fn keys(&self) -> Vec<V> {
        self.slots.values().map(|e| e.key.clone()).collect()
    }

    /// Snapshot of all live values, in the same order as [`keys`](Self::keys).
    pub fn values(&self) -> Vec<V> {
        self.slots.values().map(|e| e.value.clone()).collect()
    }

    /// Borrowing walk over live `(key, value)` pairs in table iteration
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = (&V, &V)> {
        self.slots.values().map(|e| (&e.key, &e.value))
    }

    /// Empty the table and replace both retention logs with fresh ones,
    /// releasing every pin previously held.
    pub fn clear(&mut self) {
        let _g = self.reentry.enter();
        self.index.clear();
        self.slots.clear();
        self.key_log = RetentionLog::new();
        self.value_log = RetentionLog::new();
    }

    /// Build a new map with keys and values swapped.
    ///
    /// Original values become keys, so each must have a canonical encoding;
    /// an `Unhashable` value fails the whole operation and this map is
    /// unchanged.
    pub fn invert(&self, policy: DuplicatePolicy) -> Result<Self, MapError> {
        let _g = self.reentry.enter();
        let mut inverted = Self::with_hasher(self.canon.hasher().clone());
        match policy {
            DuplicatePolicy::First => {
                // Replacing insert while enumerating: the last entry seen
                // for a shared value wins.
                for e in self.slots.values() {
                    let hash = inverted.canon.hash_of(&e.value)?;
                    inverted.key_log.push(e.value.clone());
                    inverted.value_log.push(e.key.clone());
                    Self::insert_hashed(
                        &mut inverted.index,
                        &mut inverted.slots,
                        hash,
                        e.value.clone(),
                        e.key.clone(),
                        true,
                    );
                }
            }
            DuplicatePolicy::Stack => {
                // Group original keys by structural value, then insert one
                // entry per group.
                let mut groups: Vec<(V, u64, Vec<V>)> = Vec::new();
                let mut group_index: HashTable<usize> = HashTable::new();
                for e in self.slots.values() {
                    let hash = inverted.canon.hash_of(&e.value)?;
                    match group_index.entry(
                        hash,
                        |&g| groups[g].1 == hash && groups[g].0.structural_eq(&e.value),
                        |&g| groups[g].1,
                    ) {
                        hashbrown::hash_table::Entry::Occupied(o) => {
                            groups[*o.get()].2.push(e.key.clone());
                        }
                        hashbrown::hash_table::Entry::Vacant(v) => {
                            groups.push((e.value.clone(), hash, vec![e.key.clone()]));
                            let _ = v.insert(groups.len() - 1);
                        }
                    }
                }
                for (value, hash, mut keys) in groups {
                    let stacked = if keys.len() == 1 {
                        keys.pop().expect("group holds at least one key")
                    } else {
                        V::sequence_of(&keys)
                    };
                    inverted.key_log.push(value.clone());
                    inverted.value_log.push(stacked.clone());
                    Self::insert_hashed(
                        &mut inverted.index,
                        &mut inverted.slots,
                        hash,
                        value,
                        stacked,
                        false,
                    );
                }
            }
        }
        Self::compact(
            &inverted.slots,
            &mut inverted.key_log,
            &mut inverted.value_log,
        );
        Ok(inverted)
    }

    /// The persisted/interchange form: `keys()` and `values()` as one pair.
    pub fn to_snapshot(&self) -> Snapshot<V> {
        Snapshot {
            keys: self.keys(),
            values: self.values(),
        }
    }

    /// Replace this map's content with the given pairs, first-write-wins.
    ///
    /// Lengths and every key's encoding are validated before anything is
    /// cleared, so a failed call leaves the previous content intact.
    pub fn from_snapshot(&mut self, keys: &[V], values: &[V]) -> Result<(), MapError> {
        let _g = self.reentry.enter();
        if keys.len() != values.len() {
            return Err(MapError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        let hashes = self.hash_keys(keys)?;
        self.index.clear();
        self.slots.clear();
        self.key_log = RetentionLog::new();
        self.value_log = RetentionLog::new();
        for ((key, value), hash) in keys.iter().zip(values).zip(hashes) {
            self.key_log.push(key.clone());
            self.value_log.push(value.clone());
            Self::insert_hashed(
                &mut self.index,
                &mut self.slots,
                hash,
                key.clone(),
                value.clone(),
                false,
            );
        }
        Self::compact(&self.slots, &mut self.key_log, &mut self.value_log);
        Ok(())
    }

    fn hash_keys(&self, keys: &[V]) -> Result<Vec<u64>, Unhashable> {
        keys.iter().map(|k| self.canon.hash_of(k)).collect()
    }

    fn find_slot(&self, hash: u64, key: &V) -> Option<DefaultKey> {
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|e| e.hash == hash && e.key.structural_eq(key))
                    .unwrap_or(false)
            })
            .copied()
    }

    /// Table-only part of `set`; the caller has already logged both
    /// handles. Takes the storage fields directly so callers can keep the
    /// reentry guard alive across the call.
    fn insert_hashed(
        index: &mut HashTable<DefaultKey>,
        slots: &mut SlotMap<DefaultKey, Entry<V>>,
        hash: u64,
        key: V,
        value: V,
        replace: bool,
    ) {
        match index.entry(
            hash,
            |&k| {
                slots
                    .get(k)
                    .map(|e| e.hash == hash && e.key.structural_eq(&key))
                    .unwrap_or(false)
            },
            |&k| slots.get(k).map(|e| e.hash).unwrap_or(0),
        ) {
            hashbrown::hash_table::Entry::Occupied(o) => {
                if replace {
                    let k = *o.get();
                    if let Some(e) = slots.get_mut(k) {
                        e.value = value;
                    }
                }
            }
            hashbrown::hash_table::Entry::Vacant(v) => {
                let k = slots.insert(Entry { key, value, hash });
                let _ = v.insert(k);
            }
        }
    }

    fn remove_hashed(
        index: &mut HashTable<DefaultKey>,
        slots: &mut SlotMap<DefaultKey, Entry<V>>,
        hash: u64,
        key: &V,
    ) -> bool {
        match index.find_entry(hash, |&k| {
            slots
                .get(k)
                .map(|e| e.hash == hash && e.key.structural_eq(key))
                .unwrap_or(false)
        }) {
            Ok(occupied) => {
                let (k, _) = occupied.remove();
                slots.remove(k);
                true
            }
            Err(_) => false,
        }
    }

    /// Rebuild both logs from the live entries once the key log outgrows
    /// `COMPACT_FACTOR` times the table. One linear pass; the old logs are
    /// only released after every live handle is pinned by the new ones.
    fn compact(
        slots: &SlotMap<DefaultKey, Entry<V>>,
        key_log: &mut RetentionLog<V>,
        value_log: &mut RetentionLog<V>,
    ) {
        debug_assert_eq!(key_log.len(), value_log.len());
        debug_assert!(
            key_log.len() >= slots.len(),
            "retention log shorter than the table: a live handle may be unpinned"
        );
        if key_log.len() <= COMPACT_FACTOR * slots.len() {
            return;
        }
        let mut keys = RetentionLog::new();
        let mut values = RetentionLog::new();
        for e in slots.values() {
            keys.push(e.key.clone());
            values.push(e.value.clone());
        }
        *key_log = keys;
        *value_log = values;
    }
}

impl<V, S> Clone for PinHashMap<V, S>
where
    V: HostValue,
    S: BuildHasher + Clone + Default,
{
    /// Independent table and retention logs (the logs pin every retained
    /// handle again), sharing the value handles themselves. Sharing is
    /// sound because host values are content-immutable.
    fn clone(&self) -> Self {
        Self {
            canon: self.canon.clone(),
            index: self.index.clone(),
            slots: self.slots.clone(),
            key_log: self.key_log.clone(),
            value_log: self.value_log.clone(),
            reentry: ReentryFlag::new(),
        }
    }
}

impl<V, S> fmt::Debug for PinHashMap<V, S>
where
    V: HostValue + fmt::Debug,
    S: BuildHasher + Clone + Default,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
