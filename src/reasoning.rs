//! Bounded buffer of the most recent reasoning lines shown while an answer is produced

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of reasoning lines kept when nothing else is configured
pub const DEFAULT_REASONING_CAPACITY: usize = 4;

/// Ordered, fixed-capacity FIFO of reasoning lines. Oldest lines are evicted first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningBuffer {
    capacity: usize,
    lines: VecDeque<String>,
}

impl ReasoningBuffer {
    /// A capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Append a trimmed line, evicting from the head beyond capacity.
    /// Returns false if the line was blank and nothing changed.
    pub fn append(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }

        self.lines.push_back(line.to_string());
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
        true
    }

    /// Current lines, newest last, joined for display
    pub fn snapshot(&self) -> String {
        self.lines
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn reset(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ReasoningBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_REASONING_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_last_k_in_order() {
        let mut buffer = ReasoningBuffer::new(4);
        for i in 0..7 {
            assert!(buffer.append(&format!("step {i}")));
            assert!(buffer.len() <= 4);
        }

        assert_eq!(
            buffer.lines().collect::<Vec<_>>(),
            vec!["step 3", "step 4", "step 5", "step 6"]
        );
        assert_eq!(buffer.snapshot(), "step 3\nstep 4\nstep 5\nstep 6");
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let mut buffer = ReasoningBuffer::default();
        assert!(!buffer.append(""));
        assert!(!buffer.append("   \t "));
        assert!(buffer.append("  padded  "));

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.snapshot(), "padded");
    }

    #[test]
    fn test_reset_empties_buffer() {
        let mut buffer = ReasoningBuffer::new(2);
        buffer.append("a");
        buffer.append("b");
        buffer.reset();

        assert!(buffer.is_empty());
        assert_eq!(buffer.snapshot(), "");
        assert_eq!(buffer.capacity(), 2);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut buffer = ReasoningBuffer::new(0);
        buffer.append("a");
        buffer.append("b");
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.snapshot(), "b");
    }
}
