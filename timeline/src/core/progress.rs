//! Point-in-time progress snapshots derived from root traversal state.

use serde::Serialize;

use crate::core::chunk::Timeline;

/// Progress of a session as seen from the root chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    /// Trials in one static pass of the tree; extra `while` passes are not counted.
    pub total_trials: usize,
    /// Trials completed so far, across every pass.
    pub current_trial_global: usize,
    /// Index inside the active block; `None` once the tree has no active block.
    pub current_trial_local: Option<usize>,
    /// Root-level children.
    pub total_chunks: usize,
    /// Index of the active root-level child.
    pub current_chunk: usize,
}

impl ProgressReport {
    /// Share of root-level children already finished, in percent.
    pub fn percent_complete(&self) -> f64 {
        if self.total_chunks == 0 {
            return 100.0;
        }
        100.0 * self.current_chunk as f64 / self.total_chunks as f64
    }
}

pub fn progress(timeline: &Timeline) -> ProgressReport {
    let root = timeline.root();
    ProgressReport {
        total_trials: timeline.length(),
        current_trial_global: root.trials_total(),
        current_trial_local: timeline.current_trial_local_index(),
        total_chunks: root.children().len(),
        current_chunk: root.cursor(),
    }
}
