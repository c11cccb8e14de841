//! Order-preserving queue holding at most one value per key.
//!
//! Bursts of state updates for the same logical control collapse to a
//! single transmission of the latest value: re-enqueueing a pending key
//! overwrites its stored value without moving its place in line.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Mutex;
use tokio::sync::Notify;

pub struct UniqueQueue<K, V> {
    values: DashMap<K, V>,
    order: Mutex<VecDeque<K>>,
    notify: Notify,
}

impl<K, V> UniqueQueue<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> UniqueQueue<K, V> {
        UniqueQueue {
            values: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Queues `value` under `key`. A key already waiting keeps its position
    /// and only its value is replaced; waiters are only woken for fresh keys.
    pub fn enqueue(&self, key: K, value: V) {
        let fresh = self.values.insert(key.clone(), value).is_none();
        if fresh {
            self.order
                .lock()
                .expect("unique queue order lock poisoned")
                .push_back(key);
            self.notify.notify_one();
        }
    }

    /// Removes and returns the head entry, or `None` when empty.
    pub fn try_dequeue(&self) -> Option<(K, V)> {
        let key = self
            .order
            .lock()
            .expect("unique queue order lock poisoned")
            .pop_front()?;
        let entry = self.values.remove(&key);
        // Keys enter the order list exactly when their value slot is vacant
        // and only this side removes values, so the entry must exist.
        debug_assert!(entry.is_some(), "queued key without a stored value");
        entry
    }

    /// Like [`try_dequeue`](Self::try_dequeue), but only pops when the head
    /// value satisfies `accept`. Lets the consumer respect a size budget
    /// without removing work it cannot take yet.
    pub fn try_dequeue_when<F>(&self, accept: F) -> Option<(K, V)>
    where
        F: FnOnce(&V) -> bool,
    {
        let mut order = self
            .order
            .lock()
            .expect("unique queue order lock poisoned");
        let admit = {
            let key = order.front()?;
            match self.values.get(key) {
                Some(value) => accept(value.value()),
                None => {
                    debug_assert!(false, "queued key without a stored value");
                    false
                }
            }
        };
        if !admit {
            return None;
        }
        let key = order.pop_front()?;
        drop(order);
        self.values.remove(&key)
    }

    /// Waits until an entry is available and dequeues it.
    pub async fn dequeue(&self) -> (K, V) {
        loop {
            if let Some(entry) = self.try_dequeue() {
                return entry;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.order
            .lock()
            .expect("unique queue order lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut order = self
            .order
            .lock()
            .expect("unique queue order lock poisoned");
        order.clear();
        self.values.clear();
    }
}

impl<K, V> Default for UniqueQueue<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        UniqueQueue::new()
    }
}
