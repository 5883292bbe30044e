//! Bookkeeping for optimistic mutations.
//!
//! Each local write is recorded as `Pending` before the backend call and
//! resolved to `Confirmed` or `Failed` afterwards, so callers can roll back
//! a local patch the backend rejected.

use std::collections::VecDeque;

use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Confirmed,
    Failed(String),
}

impl MutationState {
    pub fn is_pending(&self) -> bool {
        matches!(self, MutationState::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub id: Uuid,
    pub description: String,
    pub state: MutationState,
}

/// Bounded log of recent mutations. Resolved entries are evicted oldest
/// first once the log is full; pending ones are kept.
#[derive(Debug)]
pub struct MutationTracker {
    entries: Mutex<VecDeque<Mutation>>,
    capacity: usize,
}

impl Default for MutationTracker {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MutationTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record a new pending mutation and return its id.
    pub fn begin(&self, description: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            match entries.iter().position(|m| !m.state.is_pending()) {
                Some(index) => {
                    entries.remove(index);
                },
                None => break,
            }
        }
        entries.push_back(Mutation {
            id,
            description: description.into(),
            state: MutationState::Pending,
        });
        id
    }

    pub fn confirm(&self, id: Uuid) {
        self.resolve(id, MutationState::Confirmed);
    }

    pub fn fail(&self, id: Uuid, reason: impl Into<String>) {
        self.resolve(id, MutationState::Failed(reason.into()));
    }

    fn resolve(&self, id: Uuid, state: MutationState) {
        if let Some(entry) = self.entries.lock().iter_mut().find(|m| m.id == id) {
            entry.state = state;
        }
    }

    pub fn state(&self, id: Uuid) -> Option<MutationState> {
        self.entries
            .lock()
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.state.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.entries.lock().iter().filter(|m| m.state.is_pending()).count()
    }

    /// Snapshot, oldest first.
    pub fn recent(&self) -> Vec<Mutation> {
        self.entries.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let tracker = MutationTracker::default();
        let ok = tracker.begin("mark n1 read");
        let bad = tracker.begin("mark n2 read");
        assert_eq!(tracker.pending_count(), 2);

        tracker.confirm(ok);
        tracker.fail(bad, "503");
        assert_eq!(tracker.state(ok), Some(MutationState::Confirmed));
        assert_eq!(tracker.state(bad), Some(MutationState::Failed("503".into())));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_eviction_keeps_pending() {
        let tracker = MutationTracker::new(2);
        let first = tracker.begin("a");
        let second = tracker.begin("b");
        tracker.confirm(second);
        let third = tracker.begin("c");

        assert_eq!(tracker.state(first), Some(MutationState::Pending));
        assert_eq!(tracker.state(second), None);
        assert_eq!(tracker.state(third), Some(MutationState::Pending));
    }
}
