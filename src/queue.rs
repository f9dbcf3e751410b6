use std::collections::VecDeque;

/// Ordered pending messages owned by the controller.
///
/// Delivery is FIFO, but a human may edit the queue by index. Out-of-range
/// indices are no-ops rather than errors; a stale UI must not be able to
/// break anything.
#[derive(Debug, Default, Clone)]
pub struct MessageQueue {
    items: VecDeque<String>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, text: String) {
        self.items.push_back(text);
    }

    pub fn pop(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    /// Put an item back at the head, e.g. after a failed delivery.
    pub fn requeue(&mut self, text: String) {
        self.items.push_front(text);
    }

    pub fn remove(&mut self, index: usize) -> Option<String> {
        self.items.remove(index)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Move the item at `from` so it ends up at index `to`.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        if from >= self.items.len() || to >= self.items.len() {
            return false;
        }
        if let Some(item) = self.items.remove(from) {
            self.items.insert(to, item);
        }
        true
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::MessageQueue;

    fn abc() -> MessageQueue {
        let mut q = MessageQueue::new();
        for s in ["A", "B", "C"] {
            q.push(s.to_string());
        }
        q
    }

    #[test]
    fn pops_in_fifo_order() {
        let mut q = abc();
        assert_eq!(q.pop().as_deref(), Some("A"));
        assert_eq!(q.pop().as_deref(), Some("B"));
        assert_eq!(q.pop().as_deref(), Some("C"));
        assert!(q.pop().is_none());
    }

    #[test]
    fn reorder_moves_head_to_tail() {
        let mut q = abc();
        assert!(q.reorder(0, 2));
        assert_eq!(q.snapshot(), vec!["B", "C", "A"]);
    }

    #[test]
    fn reorder_moves_tail_to_head() {
        let mut q = abc();
        assert!(q.reorder(2, 0));
        assert_eq!(q.snapshot(), vec!["C", "A", "B"]);
    }

    #[test]
    fn reorder_out_of_range_is_noop() {
        let mut q = abc();
        assert!(!q.reorder(0, 3));
        assert!(!q.reorder(7, 0));
        assert_eq!(q.snapshot(), vec!["A", "B", "C"]);
    }

    #[test]
    fn remove_middle() {
        let mut q = abc();
        assert_eq!(q.remove(1).as_deref(), Some("B"));
        assert_eq!(q.snapshot(), vec!["A", "C"]);
        assert!(q.remove(5).is_none());
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn requeue_goes_to_head() {
        let mut q = abc();
        let head = q.pop().unwrap();
        q.requeue(head);
        assert_eq!(q.snapshot(), vec!["A", "B", "C"]);
    }
}
