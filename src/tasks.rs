//! Keyed Cancellable Task Slots
//!
//! At most one in-flight operation per logical target (a field key, the
//! autosave channel, an options field). Beginning a new operation for a key
//! cancels the previous one first; the cancelled operation must discard its
//! result.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct Slot {
    generation: u64,
    token: CancellationToken,
}

struct SlotTable<K> {
    slots: HashMap<K, Slot>,
    next_generation: u64,
}

/// Table of cancellation tokens keyed by target
pub struct TaskSlots<K> {
    inner: Arc<Mutex<SlotTable<K>>>,
}

impl<K> Clone for TaskSlots<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Eq + Hash + Clone> Default for TaskSlots<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one operation started through [`TaskSlots::begin`]
#[derive(Debug, Clone)]
pub struct TaskTicket<K> {
    key: K,
    generation: u64,
    token: CancellationToken,
}

impl<K> TaskTicket<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl<K: Eq + Hash + Clone> TaskSlots<K> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotTable {
                slots: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    /// Start a new operation for `key`, cancelling any previous one
    pub fn begin(&self, key: K) -> TaskTicket<K> {
        let mut table = self.inner.lock();
        table.next_generation += 1;
        let generation = table.next_generation;
        let token = CancellationToken::new();

        if let Some(previous) = table.slots.insert(
            key.clone(),
            Slot {
                generation,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }

        TaskTicket {
            key,
            generation,
            token,
        }
    }

    /// Cancel the operation running for `key`, if any
    pub fn cancel(&self, key: &K) -> bool {
        match self.inner.lock().slots.remove(key) {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every operation
    pub fn cancel_all(&self) {
        for (_, slot) in self.inner.lock().slots.drain() {
            slot.token.cancel();
        }
    }

    /// Release the slot held by `ticket`. A newer operation for the same key
    /// keeps its slot.
    pub fn finish(&self, ticket: &TaskTicket<K>) {
        let mut table = self.inner.lock();
        if table
            .slots
            .get(&ticket.key)
            .is_some_and(|slot| slot.generation == ticket.generation)
        {
            table.slots.remove(&ticket.key);
        }
    }

    /// Whether `ticket` is still the live operation for its key
    pub fn is_current(&self, ticket: &TaskTicket<K>) -> bool {
        !ticket.is_cancelled()
            && self
                .inner
                .lock()
                .slots
                .get(&ticket.key)
                .is_some_and(|slot| slot.generation == ticket.generation)
    }

    /// Whether an operation is running for `key`
    pub fn is_active(&self, key: &K) -> bool {
        self.inner.lock().slots.contains_key(key)
    }

    /// Number of running operations
    pub fn active(&self) -> usize {
        self.inner.lock().slots.len()
    }
}
