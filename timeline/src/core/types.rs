//! Shared types for the scheduling core.
//!
//! These types define the contracts between the factory, the traversal
//! protocol and the session driver. They carry no I/O.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::TrialRecord;

/// Plugin-specific trial parameters, as produced by a trial factory.
pub type TrialParams = Map<String, Value>;

/// Kind of composite node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Root,
    Linear,
    While,
}

impl ChunkType {
    /// Parse a `chunk_type` declared in a definition.
    ///
    /// `root` is reserved for the implicit top-level node and is rejected here.
    pub fn from_declared(value: &str) -> Option<Self> {
        match value {
            "linear" => Some(Self::Linear),
            "while" => Some(Self::While),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Linear => "linear",
            Self::While => "while",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating a `while` chunk's predicate at the end of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// The chunk is done; its parent moves on.
    Terminal,
    /// The chunk rewinds itself and its descendants and runs another pass.
    ResetAndContinue,
}

/// Continuation predicate of a `while` chunk.
///
/// Receives the records generated by the chunk's current pass (in write order)
/// and returns `true` to run another pass.
#[derive(Clone)]
pub struct ContinuePredicate(Arc<dyn Fn(&[TrialRecord]) -> bool + Send + Sync>);

impl ContinuePredicate {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&[TrialRecord]) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    pub fn decide(&self, records: &[TrialRecord]) -> Continuation {
        if (self.0)(records) {
            Continuation::ResetAndContinue
        } else {
            Continuation::Terminal
        }
    }
}

impl fmt::Debug for ContinuePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContinuePredicate(..)")
    }
}

/// Per-trial finish hook, called with the record written for that trial.
#[derive(Clone)]
pub struct TrialHook(Arc<dyn Fn(&TrialRecord) + Send + Sync>);

impl TrialHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&TrialRecord) + Send + Sync + 'static,
    {
        Self(Arc::new(hook))
    }

    pub fn call(&self, record: &TrialRecord) {
        (self.0)(record);
    }
}

impl fmt::Debug for TrialHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TrialHook(..)")
    }
}

/// One fully resolved trial: generic fields plus the plugin's own parameters.
#[derive(Debug, Clone)]
pub struct TrialSpec {
    /// Registered plugin name (`type`).
    pub plugin: String,
    /// User data attached to the trial's record.
    pub data: Option<Value>,
    /// Delay after the trial before the next one starts (`timing_post_trial`).
    pub post_trial_ms: u64,
    /// Hook run once the trial's record is written.
    pub on_finish: Option<TrialHook>,
    /// Plugin-specific parameters; never contains generic keys.
    pub params: TrialParams,
}

impl TrialSpec {
    pub fn post_trial_delay(&self) -> Duration {
        Duration::from_millis(self.post_trial_ms)
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_chunk_types_exclude_root() {
        assert_eq!(ChunkType::from_declared("linear"), Some(ChunkType::Linear));
        assert_eq!(ChunkType::from_declared("while"), Some(ChunkType::While));
        assert_eq!(ChunkType::from_declared("root"), None);
        assert_eq!(ChunkType::from_declared("loop"), None);
    }

    #[test]
    fn predicate_maps_to_continuation() {
        let always = ContinuePredicate::new(|_| true);
        let empty = ContinuePredicate::new(|records| !records.is_empty());
        assert_eq!(always.decide(&[]), Continuation::ResetAndContinue);
        assert_eq!(empty.decide(&[]), Continuation::Terminal);
    }
}
