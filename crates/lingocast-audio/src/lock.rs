// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-key async locks.
//!
//! A slot is created when a key is first locked and removed again once no
//! guard holds it and no task waits on it, so the map only ever contains keys
//! that are in use.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};

use tokio::sync::{Mutex, OwnedMutexGuard};

type SlotMap<K> = HashMap<K, Arc<Mutex<()>>>;
type Slots<K> = Arc<StdMutex<SlotMap<K>>>;

fn lock_slots<K>(slots: &StdMutex<SlotMap<K>>) -> StdMutexGuard<'_, SlotMap<K>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One async mutex per key.
pub struct KeyedMutex<K: Eq + Hash> {
    slots: Slots<K>,
}

impl<K: Eq + Hash> Default for KeyedMutex<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(StdMutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash> fmt::Debug for KeyedMutex<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedMutex").field("held", &self.len()).finish()
    }
}

impl<K: Eq + Hash + Clone> KeyedMutex<K> {
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let slot = {
            let mut slots = lock_slots(&self.slots);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let guard = slot.lock_owned().await;
        KeyedGuard {
            key,
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        }
    }
}

impl<K: Eq + Hash> KeyedMutex<K> {
    /// Keys currently held or waited on.
    pub fn len(&self) -> usize {
        lock_slots(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive hold on one key of a [`KeyedMutex`].
pub struct KeyedGuard<K: Eq + Hash> {
    key: K,
    slots: Slots<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        self.guard.take();
        let mut slots = lock_slots(&self.slots);
        // The map's own reference is the last one once nobody holds or awaits the slot.
        if slots.get(&self.key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&self.key);
        }
    }
}

impl<K: Eq + Hash + fmt::Debug> fmt::Debug for KeyedGuard<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedGuard").field("key", &self.key).finish()
    }
}
