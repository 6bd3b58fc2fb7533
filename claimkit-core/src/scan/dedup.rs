//! Bounded memory of recently seen fragments.

use std::collections::{HashSet, VecDeque};

/// Remembers the most recent `capacity` distinct fragment strings.
#[derive(Debug, Clone)]
pub struct DedupWindow {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl DedupWindow {
    /// Creates an empty window holding at most `capacity` entries (minimum one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity + 1),
            seen: HashSet::with_capacity(capacity + 1),
        }
    }

    /// Whether `fragment` is in the window.
    #[must_use]
    pub fn contains(&self, fragment: &str) -> bool {
        self.seen.contains(fragment)
    }

    /// Adds `fragment`, evicting the oldest entry once over capacity.
    /// Returns `false` if it was already present.
    pub fn insert(&mut self, fragment: &str) -> bool {
        if !self.seen.insert(fragment.to_string()) {
            return false;
        }
        self.order.push_back(fragment.to_string());
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    /// Number of remembered fragments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let mut window = DedupWindow::new(4);
        assert!(window.insert("a"));
        assert!(!window.insert("a"));
        assert!(window.contains("a"));
        assert!(!window.contains("b"));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_evicts_oldest_past_capacity() {
        let mut window = DedupWindow::new(256);
        for i in 0..257 {
            assert!(window.insert(&format!("f{i}")));
        }
        assert_eq!(window.len(), 256);
        assert!(!window.contains("f0"));
        assert!(window.contains("f1"));
        assert!(window.contains("f256"));

        // The evicted entry is new again.
        assert!(window.insert("f0"));
        assert!(!window.contains("f1"));
    }

    #[test]
    fn test_clear() {
        let mut window = DedupWindow::new(2);
        window.insert("a");
        window.clear();
        assert!(window.is_empty());
        assert!(!window.contains("a"));
    }
}
