//! Recorded trial outcomes and the data-store capability the core reads from.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::identity::ChunkId;

/// Keys the driver writes on every record; plugin values never override them.
pub const DEFAULT_RECORD_KEYS: [&str; 5] = [
    "trial_type",
    "trial_index",
    "trial_index_global",
    "time_elapsed",
    "internal_chunk_id",
];

/// One recorded trial outcome with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Plugin that ran the trial.
    pub trial_type: String,
    /// Index of the trial inside its block, if a block was active.
    pub trial_index: Option<usize>,
    /// Number of trials completed in the session before this one.
    pub trial_index_global: usize,
    /// Milliseconds since the session started.
    pub time_elapsed: u64,
    /// Identity path of the deepest chunk active when the trial ran.
    pub internal_chunk_id: String,
    /// Values produced by the plugin and the trial's user data.
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl TrialRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Read access to recorded outcomes, scoped by identity path.
pub trait DataStore {
    /// Records generated by the chunk instance `chunk_id` (including nested
    /// descendants), in write order.
    fn query_by_path_prefix(&self, chunk_id: &ChunkId) -> Vec<TrialRecord>;
}

/// Ordered, append-only record store kept for the lifetime of a session.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataStore {
    records: Vec<TrialRecord>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, record: TrialRecord) {
        debug!(
            trial_type = %record.trial_type,
            chunk_id = %record.internal_chunk_id,
            global = record.trial_index_global,
            "record written"
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records produced by the plugin named `trial_type`, in write order.
    pub fn trials_of_type(&self, trial_type: &str) -> Vec<&TrialRecord> {
        self.records
            .iter()
            .filter(|record| record.trial_type == trial_type)
            .collect()
    }
}

impl DataStore for InMemoryDataStore {
    fn query_by_path_prefix(&self, chunk_id: &ChunkId) -> Vec<TrialRecord> {
        self.records
            .iter()
            .filter(|record| chunk_id.covers(&record.internal_chunk_id))
            .cloned()
            .collect()
    }
}
