//! Bounded store of engine log lines.

use std::collections::VecDeque;

/// Keeps the most recent `retention` lines; older lines are dropped and counted.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    retention: usize,
    dropped: usize,
}

impl LogBuffer {
    pub fn new(retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            lines: VecDeque::with_capacity(retention.min(1024)),
            retention,
            dropped: 0,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.retention {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line.into());
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.dropped = 0;
    }

    /// The last `window` lines, oldest first
    pub fn tail(&self, window: usize) -> impl Iterator<Item = &str> {
        let skip = self.lines.len().saturating_sub(window);
        self.lines.iter().skip(skip).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Lines discarded since the last `clear`
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}
