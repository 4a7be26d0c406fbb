//! Leaf scheduling node: one plugin expansion's ordered trial list.

use crate::core::types::TrialSpec;

/// Fixed, ordered list of trials with a traversal cursor.
#[derive(Debug, Clone)]
pub struct Block {
    trials: Vec<TrialSpec>,
    cursor: usize,
}

impl Block {
    pub fn new(trials: Vec<TrialSpec>) -> Self {
        Self { trials, cursor: 0 }
    }

    /// Trial under the cursor, or `None` once the block is complete.
    pub fn next(&self) -> Option<&TrialSpec> {
        self.trials.get(self.cursor)
    }

    /// Move past the current trial. Never moves beyond the end of the list.
    pub fn advance(&mut self) {
        if self.cursor < self.trials.len() {
            self.cursor += 1;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.trials.len()
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn trials(&self) -> &[TrialSpec] {
        &self.trials
    }
}
