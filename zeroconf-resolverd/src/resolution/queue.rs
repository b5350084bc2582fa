use std::collections::VecDeque;
use shared::types::ServiceRecord;

/// Services waiting to be resolved. The head is the one being (or about to be) resolved.
///
/// `enqueue` does not check for duplicates; callers decide whether a name may be
/// queued twice.
#[derive(Debug, Default)]
pub struct ResolutionQueue {
    pending: VecDeque<ServiceRecord>,
}

impl ResolutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, record: ServiceRecord) {
        self.pending.push_back(record);
    }

    pub fn peek_head(&self) -> Option<&ServiceRecord> {
        self.pending.front()
    }

    pub fn pop_head(&mut self) -> Option<ServiceRecord> {
        self.pending.pop_front()
    }

    /// Moves the head to the tail so one unresolvable service cannot block the rest.
    pub fn requeue_head_to_tail(&mut self) {
        if let Some(head) = self.pending.pop_front() {
            self.pending.push_back(head);
        }
    }

    /// Removes every occurrence of `name`, wherever it sits. Returns how many were removed.
    pub fn remove_all_by_name(&mut self, name: &str) -> usize {
        let before = self.pending.len();
        self.pending.retain(|record| record.name != name);
        before - self.pending.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pending.iter().any(|record| record.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.pending.iter().map(|record| record.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(names: &[&str]) -> ResolutionQueue {
        let mut queue = ResolutionQueue::new();
        for name in names {
            queue.enqueue(ServiceRecord::named(*name, "_http._tcp.local."));
        }
        queue
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = queue_of(&["a", "b", "c"]);
        assert_eq!(queue.peek_head().unwrap().name, "a");
        assert_eq!(queue.pop_head().unwrap().name, "a");
        assert_eq!(queue.names(), ["b", "c"]);
    }

    #[test]
    fn test_pop_and_requeue_on_empty_are_noops() {
        let mut queue = ResolutionQueue::new();
        assert!(queue.pop_head().is_none());
        queue.requeue_head_to_tail();
        assert!(queue.is_empty());
        assert!(queue.peek_head().is_none());
    }

    #[test]
    fn test_requeue_moves_head_to_tail() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.requeue_head_to_tail();
        assert_eq!(queue.names(), ["b", "c", "a"]);
    }

    #[test]
    fn test_requeue_single_element() {
        let mut queue = queue_of(&["a"]);
        queue.requeue_head_to_tail();
        assert_eq!(queue.names(), ["a"]);
    }

    #[test]
    fn test_remove_all_by_name_hits_every_position() {
        let mut queue = queue_of(&["a", "b", "a", "c", "a"]);
        assert_eq!(queue.remove_all_by_name("a"), 3);
        assert_eq!(queue.names(), ["b", "c"]);
        assert_eq!(queue.remove_all_by_name("a"), 0);
        assert!(!queue.contains("a"));
    }

    #[test]
    fn test_enqueue_does_not_dedupe() {
        let queue = queue_of(&["a", "a"]);
        assert_eq!(queue.len(), 2);
    }
}
