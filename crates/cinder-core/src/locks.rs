//! Per-key read-write locks with ref-counted lifecycle.
//!
//! Entries are shared by every concurrent acquirer of the same key and
//! reference-counted so an entry is never deleted while someone holds or
//! waits on its lock. Deleting a key marks its entry pending-deletion;
//! the last releaser sweeps it out.
//!
//! The meta-mutex guarding the entry map is never held across an RW-lock
//! acquisition — acquire takes the meta-mutex, bumps the refcount,
//! releases it, and only then blocks on the entry lock. Holding the
//! meta-mutex while blocking would deadlock with concurrent releases.
//!
//! Multi-key acquisition sorts and dedups the key list before locking.
//! That canonical order is the sole deadlock-avoidance discipline for
//! commands touching several keys.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

#[derive(Default)]
struct LockEntry {
    lock: RwLock<()>,
    // refcount and pending_deletion are only mutated with the manager
    // mutex held; atomics spare a second lock around the pair
    refcount: AtomicUsize,
    pending_deletion: AtomicBool,
}

/// Registry of per-key RW locks.
#[derive(Default)]
pub struct KeyLockManager {
    entries: Mutex<HashMap<String, Arc<LockEntry>>>,
}

impl KeyLockManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the shared lock for `key`.
    pub fn with_read<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let entry = self.acquire(key);
        let out = {
            let _guard = entry.lock.read().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(key, &entry);
        out
    }

    /// Runs `f` while holding the exclusive lock for `key`.
    pub fn with_write<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let entry = self.acquire(key);
        let out = {
            let _guard = entry.lock.write().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(key, &entry);
        out
    }

    /// Runs `f` while holding shared locks for every distinct key, taken
    /// in sorted order.
    pub fn with_read_many<T>(&self, keys: &[&str], f: impl FnOnce() -> T) -> T {
        let sorted = sorted_dedup(keys);
        let entries: Vec<Arc<LockEntry>> = sorted.iter().map(|k| self.acquire(k)).collect();
        let out = {
            let _guards: Vec<_> = entries
                .iter()
                .map(|e| e.lock.read().unwrap_or_else(PoisonError::into_inner))
                .collect();
            f()
        };
        for (key, entry) in sorted.iter().zip(&entries) {
            self.release(key, entry);
        }
        out
    }

    /// Runs `f` while holding exclusive locks for every distinct key,
    /// taken in sorted order.
    pub fn with_write_many<T>(&self, keys: &[&str], f: impl FnOnce() -> T) -> T {
        let sorted = sorted_dedup(keys);
        let entries: Vec<Arc<LockEntry>> = sorted.iter().map(|k| self.acquire(k)).collect();
        let out = {
            let _guards: Vec<_> = entries
                .iter()
                .map(|e| e.lock.write().unwrap_or_else(PoisonError::into_inner))
                .collect();
            f()
        };
        for (key, entry) in sorted.iter().zip(&entries) {
            self.release(key, entry);
        }
        out
    }

    /// Flags the entry for `key` for removal; called after the key is
    /// deleted from the keyspace. Entries with no holders go immediately,
    /// otherwise the last releaser sweeps them.
    pub fn mark_removed(&self, key: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.get(key) else {
            return;
        };
        if entry.refcount.load(Ordering::Relaxed) == 0 {
            entries.remove(key);
        } else {
            entry.pending_deletion.store(true, Ordering::Relaxed);
        }
    }

    /// Drops every idle entry and marks the busy ones pending-deletion.
    pub fn clear(&self) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| {
            if entry.refcount.load(Ordering::Relaxed) == 0 {
                false
            } else {
                entry.pending_deletion.store(true, Ordering::Relaxed);
                true
            }
        });
    }

    /// Looks up or creates the entry for `key` and bumps its refcount.
    fn acquire(&self, key: &str) -> Arc<LockEntry> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(LockEntry::default()))
            .clone();
        entry.refcount.fetch_add(1, Ordering::Relaxed);
        entry
    }

    /// Drops one reference; the last holder of a pending-deletion entry
    /// removes it (only if it is still the current entry for the key).
    fn release(&self, key: &str, entry: &Arc<LockEntry>) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if entry.refcount.load(Ordering::Relaxed) > 0 {
            entry.refcount.fetch_sub(1, Ordering::Relaxed);
        }
        if entry.refcount.load(Ordering::Relaxed) == 0
            && entry.pending_deletion.load(Ordering::Relaxed)
        {
            if let Some(current) = entries.get(key) {
                if Arc::ptr_eq(current, entry) {
                    entries.remove(key);
                }
            }
        }
    }
}

fn sorted_dedup<'a>(keys: &[&'a str]) -> Vec<&'a str> {
    let mut sorted = keys.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn read_then_write_same_key() {
        let mgr = KeyLockManager::new();
        assert_eq!(mgr.with_read("k", || 1), 1);
        assert_eq!(mgr.with_write("k", || 2), 2);
    }

    #[test]
    fn entry_removed_after_last_release() {
        let mgr = KeyLockManager::new();
        mgr.with_write("k", || {
            mgr.mark_removed("k");
        });
        // the write holder released last, sweeping the pending entry
        let entries = mgr.entries.lock().unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn mark_removed_idle_entry_goes_immediately() {
        let mgr = KeyLockManager::new();
        mgr.with_write("k", || {});
        // lock released; entry idle but still cached
        mgr.mark_removed("k");
        assert!(mgr.entries.lock().unwrap().is_empty());
    }

    #[test]
    fn mark_removed_unknown_key_is_noop() {
        let mgr = KeyLockManager::new();
        mgr.mark_removed("never-seen");
    }

    #[test]
    fn multi_key_same_key_degenerates() {
        let mgr = KeyLockManager::new();
        // duplicate keys dedup to a single lock; no self-deadlock
        let out = mgr.with_write_many(&["k", "k", "k"], || 7);
        assert_eq!(out, 7);
    }

    #[test]
    fn writers_exclude_each_other() {
        let mgr = Arc::new(KeyLockManager::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = Arc::clone(&mgr);
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..200 {
                    mgr.with_write("shared", || {
                        // non-atomic read-modify-write; only safe under
                        // the key's exclusive lock
                        let seen = counter.load(Ordering::Relaxed);
                        std::hint::black_box(seen);
                        counter.store(seen + 1, Ordering::Relaxed);
                    });
                }
            }));
        }
        for h in handles {
            h.join().expect("writer thread");
        }
        assert_eq!(counter.load(Ordering::Relaxed), 1600);
    }

    #[test]
    fn reverse_order_multi_key_locking_makes_progress() {
        let mgr = Arc::new(KeyLockManager::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let mgr = Arc::clone(&mgr);
            handles.push(std::thread::spawn(move || {
                for _ in 0..200 {
                    // alternating presentation order; canonical sorting
                    // keeps acquisition order identical across threads
                    if t % 2 == 0 {
                        mgr.with_write_many(&["a", "b"], || {});
                    } else {
                        mgr.with_write_many(&["b", "a"], || {});
                    }
                }
            }));
        }
        for h in handles {
            h.join().expect("locker thread");
        }
    }

    #[test]
    fn refcount_invariant_under_churn() {
        let mgr = Arc::new(KeyLockManager::new());
        let mut handles = Vec::new();
        for t in 0..6 {
            let mgr = Arc::clone(&mgr);
            handles.push(std::thread::spawn(move || {
                for i in 0..300 {
                    let key = format!("k{}", (t + i) % 5);
                    match i % 3 {
                        0 => mgr.with_write(&key, || {}),
                        1 => mgr.with_read(&key, || {}),
                        _ => mgr.with_write(&key, || mgr.mark_removed(&key)),
                    }
                }
            }));
        }
        for h in handles {
            h.join().expect("churn thread");
        }
        std::thread::sleep(Duration::from_millis(10));
        // quiescent state: nothing is held, so no entry may linger in the
        // removable (refcount 0, pending deletion) state
        let entries = mgr.entries.lock().unwrap();
        for (key, entry) in entries.iter() {
            let refs = entry.refcount.load(Ordering::Relaxed);
            let pending = entry.pending_deletion.load(Ordering::Relaxed);
            assert_eq!(refs, 0, "entry {key} still referenced after join");
            assert!(
                !pending,
                "entry {key} should have been swept: refs=0 pending=true"
            );
        }
    }

    #[test]
    fn clear_drops_idle_entries() {
        let mgr = KeyLockManager::new();
        mgr.with_write("a", || {});
        mgr.with_read("b", || {});
        mgr.clear();
        assert!(mgr.entries.lock().unwrap().is_empty());
    }
}
