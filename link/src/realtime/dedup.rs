use std::collections::{HashSet, VecDeque};

/// Bounded window of recently seen event keys.
///
/// Oldest keys fall out first once `capacity` is reached. A capacity of 0
/// disables deduplication.
#[derive(Debug, Clone)]
pub struct SeenEvents {
    capacity: usize,
    order: VecDeque<String>,
    keys: HashSet<String>,
}

impl SeenEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(1024)),
            keys: HashSet::with_capacity(capacity.min(1024)),
        }
    }

    /// Record `key`; returns `false` when it was already in the window.
    pub fn insert(&mut self, key: String) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.keys.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.keys.remove(&evicted);
            }
        }
        self.keys.insert(key.clone());
        self.order.push_back(key);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
