//! Concurrent keyspace dictionary.
//!
//! A DashMap from key to [`Entity`] with a quiesce gate on top: every
//! operation (and every guard handed to a caller) holds an in-flight
//! token, and `clear` flips a closing flag, waits the tokens out (10 s
//! bound), then resets the map. Operations arriving while the gate is
//! closed are refused with their zero value, mirroring reads against a
//! database that is being flushed.
//!
//! Iteration is snapshot-at-worst: concurrent inserts may be missed and
//! concurrent removals may still be observed, but unrelated keys are
//! never skipped and nothing panics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::mapref::one::{Ref, RefMut};
use dashmap::DashMap;
use rand::Rng;

use crate::entity::Entity;

/// How long `clear` waits for in-flight operations before resetting anyway.
const CLEAR_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct Gate {
    closing: AtomicBool,
    inflight: Mutex<usize>,
    drained: Condvar,
}

struct GateToken<'a> {
    gate: &'a Gate,
}

impl Gate {
    /// Registers an in-flight operation, or refuses while closing.
    fn enter(&self) -> Option<GateToken<'_>> {
        if self.closing.load(Ordering::Acquire) {
            return None;
        }
        {
            let mut count = self
                .inflight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *count += 1;
        }
        let token = GateToken { gate: self };
        // re-check: clear may have started between the flag read and the
        // counter bump; dropping the token backs the bump out
        if self.closing.load(Ordering::Acquire) {
            return None;
        }
        Some(token)
    }
}

impl Drop for GateToken<'_> {
    fn drop(&mut self) {
        let mut count = self
            .gate
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *count -= 1;
        if *count == 0 {
            self.gate.drained.notify_all();
        }
    }
}

/// Shared read access to one entry. Holding this keeps `clear` waiting.
pub struct EntryRef<'a> {
    guard: Ref<'a, String, Entity>,
    _token: GateToken<'a>,
}

impl std::ops::Deref for EntryRef<'_> {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        self.guard.value()
    }
}

/// Exclusive access to one entry. Holding this keeps `clear` waiting.
pub struct EntryMut<'a> {
    guard: RefMut<'a, String, Entity>,
    _token: GateToken<'a>,
}

impl std::ops::Deref for EntryMut<'_> {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        self.guard.value()
    }
}

impl std::ops::DerefMut for EntryMut<'_> {
    fn deref_mut(&mut self) -> &mut Entity {
        self.guard.value_mut()
    }
}

/// The key→entity mapping owned by one logical database.
#[derive(Default)]
pub struct Dict {
    map: DashMap<String, Entity>,
    gate: Gate,
}

impl Dict {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared access to the entity at `key`.
    pub fn get(&self, key: &str) -> Option<EntryRef<'_>> {
        let token = self.gate.enter()?;
        let guard = self.map.get(key)?;
        Some(EntryRef {
            guard,
            _token: token,
        })
    }

    /// Exclusive access to the entity at `key`.
    ///
    /// Callers must not acquire a second guard while holding this one:
    /// two exclusive guards can share a map shard and deadlock. Shared
    /// guards from [`Dict::get`] may be held several at a time.
    pub fn get_mut(&self, key: &str) -> Option<EntryMut<'_>> {
        let token = self.gate.enter()?;
        let guard = self.map.get_mut(key)?;
        Some(EntryMut {
            guard,
            _token: token,
        })
    }

    /// Exclusive access to the entity at `key`, inserting `default()`
    /// first when the key is absent.
    pub fn get_or_insert_with(
        &self,
        key: &str,
        default: impl FnOnce() -> Entity,
    ) -> Option<EntryMut<'_>> {
        let token = self.gate.enter()?;
        let guard = self.map.entry(key.to_owned()).or_insert_with(default);
        Some(EntryMut {
            guard,
            _token: token,
        })
    }

    /// Stores `value` at `key`. Returns 1 if the key is new, 0 when an
    /// existing value was overwritten (or the gate refused the write).
    pub fn put(&self, key: String, value: Entity) -> usize {
        let Some(_token) = self.gate.enter() else {
            return 0;
        };
        match self.map.insert(key, value) {
            Some(_) => 0,
            None => 1,
        }
    }

    /// Stores `value` only when `key` is absent. Returns 1 on success.
    pub fn put_if_absent(&self, key: String, value: Entity) -> usize {
        let Some(_token) = self.gate.enter() else {
            return 0;
        };
        match self.map.entry(key) {
            MapEntry::Occupied(_) => 0,
            MapEntry::Vacant(slot) => {
                slot.insert(value);
                1
            }
        }
    }

    /// Stores `value` only when `key` already exists. Returns 1 on success.
    pub fn put_if_exists(&self, key: &str, value: Entity) -> usize {
        let Some(_token) = self.gate.enter() else {
            return 0;
        };
        match self.map.get_mut(key) {
            Some(mut slot) => {
                *slot.value_mut() = value;
                1
            }
            None => 0,
        }
    }

    /// Removes `key`. Returns 1 if a value was actually removed.
    pub fn remove(&self, key: &str) -> usize {
        let Some(_token) = self.gate.enter() else {
            return 0;
        };
        match self.map.remove(key) {
            Some(_) => 1,
            None => 0,
        }
    }

    /// Removes `key` and hands back its entity.
    pub fn take(&self, key: &str) -> Option<Entity> {
        let _token = self.gate.enter()?;
        self.map.remove(key).map(|(_, value)| value)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        let Some(_token) = self.gate.enter() else {
            return 0;
        };
        self.map.len()
    }

    /// Returns `true` when the dictionary holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits entries until `f` returns `false`. The callback must not
    /// touch this dictionary again (shard re-entry deadlocks).
    pub fn for_each(&self, mut f: impl FnMut(&str, &Entity) -> bool) {
        let Some(_token) = self.gate.enter() else {
            return;
        };
        for entry in self.map.iter() {
            if !f(entry.key(), entry.value()) {
                break;
            }
        }
    }

    /// All keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        self.for_each(|key, _| {
            keys.push(key.to_owned());
            true
        });
        keys
    }

    /// `n` random keys, possibly repeating.
    pub fn random_keys(&self, n: usize) -> Vec<String> {
        let keys = self.keys();
        if keys.is_empty() || n == 0 {
            return Vec::new();
        }
        let mut rng = rand::thread_rng();
        (0..n)
            .map(|_| keys[rng.gen_range(0..keys.len())].clone())
            .collect()
    }

    /// Up to `n` distinct random keys.
    pub fn random_distinct_keys(&self, n: usize) -> Vec<String> {
        let mut keys = self.keys();
        let mut rng = rand::thread_rng();
        let len = keys.len();
        for i in 0..len {
            let j = i + rng.gen_range(0..len - i);
            keys.swap(i, j);
        }
        keys.truncate(n.min(len));
        keys
    }

    /// Blocks new operations, waits out in-flight ones (bounded), and
    /// resets the map. The gate reopens afterwards.
    pub fn clear(&self) {
        self.gate.closing.store(true, Ordering::Release);
        {
            let count = self
                .gate
                .inflight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let (_count, _timeout) = self
                .gate
                .drained
                .wait_timeout_while(count, CLEAR_DRAIN_TIMEOUT, |pending| *pending > 0)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.map.clear();
        self.gate.closing.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;

    fn bytes_entity(v: &'static str) -> Entity {
        Entity::Bytes(Bytes::from_static(v.as_bytes()))
    }

    fn read_string(dict: &Dict, key: &str) -> Option<String> {
        dict.get(key).map(|entry| match &*entry {
            Entity::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            other => panic!("expected bytes, got {}", other.type_name()),
        })
    }

    #[test]
    fn put_and_get() {
        let dict = Dict::new();
        assert_eq!(dict.put("k".into(), bytes_entity("v")), 1);
        assert_eq!(read_string(&dict, "k").as_deref(), Some("v"));
        assert_eq!(dict.put("k".into(), bytes_entity("w")), 0);
        assert_eq!(read_string(&dict, "k").as_deref(), Some("w"));
    }

    #[test]
    fn put_if_absent_and_exists() {
        let dict = Dict::new();
        assert_eq!(dict.put_if_exists("k", bytes_entity("v")), 0);
        assert_eq!(dict.put_if_absent("k".into(), bytes_entity("v")), 1);
        assert_eq!(dict.put_if_absent("k".into(), bytes_entity("w")), 0);
        assert_eq!(read_string(&dict, "k").as_deref(), Some("v"));
        assert_eq!(dict.put_if_exists("k", bytes_entity("w")), 1);
        assert_eq!(read_string(&dict, "k").as_deref(), Some("w"));
    }

    #[test]
    fn remove_reports_effect() {
        let dict = Dict::new();
        dict.put("k".into(), bytes_entity("v"));
        assert_eq!(dict.remove("k"), 1);
        assert_eq!(dict.remove("k"), 0);
        assert!(dict.get("k").is_none());
    }

    #[test]
    fn take_moves_entity() {
        let dict = Dict::new();
        dict.put("k".into(), bytes_entity("v"));
        let entity = dict.take("k").expect("entity present");
        assert!(matches!(entity, Entity::Bytes(_)));
        assert!(dict.take("k").is_none());
    }

    #[test]
    fn get_mut_updates_in_place() {
        let dict = Dict::new();
        dict.put("k".into(), bytes_entity("v"));
        {
            let mut entry = dict.get_mut("k").expect("present");
            *entry = bytes_entity("updated");
        }
        assert_eq!(read_string(&dict, "k").as_deref(), Some("updated"));
    }

    #[test]
    fn get_or_insert_creates_default() {
        let dict = Dict::new();
        {
            let entry = dict
                .get_or_insert_with("h", || Entity::Hash(crate::types::Hash::new()))
                .expect("gate open");
            assert_eq!(entry.type_name(), "hash");
        }
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn for_each_stops_early() {
        let dict = Dict::new();
        for i in 0..10 {
            dict.put(format!("k{i}"), bytes_entity("v"));
        }
        let mut seen = 0;
        dict.for_each(|_, _| {
            seen += 1;
            seen < 3
        });
        assert_eq!(seen, 3);
    }

    #[test]
    fn clear_resets_and_reopens() {
        let dict = Dict::new();
        dict.put("k".into(), bytes_entity("v"));
        dict.clear();
        assert_eq!(dict.len(), 0);
        // gate reopened: writes work again
        assert_eq!(dict.put("k".into(), bytes_entity("v")), 1);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn random_keys_sampling() {
        let dict = Dict::new();
        for i in 0..5 {
            dict.put(format!("k{i}"), bytes_entity("v"));
        }
        assert_eq!(dict.random_keys(8).len(), 8);

        let distinct = dict.random_distinct_keys(3);
        assert_eq!(distinct.len(), 3);
        let mut deduped = distinct.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), 3);

        assert_eq!(dict.random_distinct_keys(99).len(), 5);
        assert!(Dict::new().random_keys(4).is_empty());
    }

    #[test]
    fn concurrent_writers() {
        let dict = Arc::new(Dict::new());
        let mut handles = Vec::new();
        for t in 0..8 {
            let dict = Arc::clone(&dict);
            handles.push(std::thread::spawn(move || {
                for i in 0..500 {
                    dict.put(format!("k-{t}-{i}"), Entity::Bytes(Bytes::from("v")));
                }
            }));
        }
        for h in handles {
            h.join().expect("writer thread");
        }
        assert_eq!(dict.len(), 4000);
    }

    #[test]
    fn clear_waits_for_inflight_reader() {
        let dict = Arc::new(Dict::new());
        dict.put("k".into(), bytes_entity("v"));

        let reader = {
            let dict = Arc::clone(&dict);
            std::thread::spawn(move || {
                let entry = dict.get("k").expect("present");
                // hold the guard long enough for clear to be waiting
                std::thread::sleep(Duration::from_millis(100));
                assert!(matches!(&*entry, Entity::Bytes(_)));
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        dict.clear();
        assert_eq!(dict.len(), 0);
        reader.join().expect("reader thread");
    }
}
