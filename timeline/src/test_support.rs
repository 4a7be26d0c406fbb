//! Test-only helpers for building trials, records and small timelines.

use std::fs;
use std::path::PathBuf;

use serde_json::{Map, Value, json};
use tempfile::TempDir;

use crate::core::chunk::Timeline;
use crate::core::types::{TrialParams, TrialSpec};
use crate::data::{InMemoryDataStore, TrialRecord};
use crate::definition::{Entry, TrialDefinition};
use crate::error::Result;
use crate::registry::{ExpandingFactory, Registry};

/// Resolved trial whose `stimulus` is `"{plugin}-{index}"`.
pub fn spec(plugin: &str, index: usize) -> TrialSpec {
    let mut params = TrialParams::new();
    params.insert("stimulus".to_string(), json!(format!("{plugin}-{index}")));
    TrialSpec {
        plugin: plugin.to_string(),
        data: None,
        post_trial_ms: 0,
        on_finish: None,
        params,
    }
}

/// Minimal record tagged with `chunk_id`.
pub fn record(trial_type: &str, chunk_id: &str) -> TrialRecord {
    TrialRecord {
        trial_type: trial_type.to_string(),
        trial_index: Some(0),
        trial_index_global: 0,
        time_elapsed: 0,
        internal_chunk_id: chunk_id.to_string(),
        values: Map::new(),
    }
}

/// Registry where every name expands its `stimuli` list into one trial per item.
pub fn echo_registry(plugins: &[&str]) -> Registry {
    let mut registry = Registry::new();
    for plugin in plugins {
        registry.register_plugin(*plugin, ExpandingFactory::over("stimuli", "stimulus"));
    }
    registry
}

/// Entry producing `count` trials of `plugin` under an [`echo_registry`].
pub fn trials(plugin: &str, count: usize) -> Entry {
    let stimuli: Vec<Value> = (0..count)
        .map(|i| json!(format!("{plugin}-{i}")))
        .collect();
    TrialDefinition::new(plugin)
        .param("stimuli", stimuli)
        .post_trial_ms(0)
        .into()
}

/// One trial handed out by [`drive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub plugin: String,
    pub stimulus: String,
    pub chunk_id: String,
}

/// Run the traversal protocol directly, writing one record per trial.
///
/// Stops when the tree completes or after `limit` trials.
pub fn drive(
    timeline: &mut Timeline,
    store: &mut InMemoryDataStore,
    limit: usize,
) -> Result<Vec<Delivered>> {
    let mut delivered = Vec::new();
    while delivered.len() < limit && !timeline.is_complete(&*store) {
        let chunk_id = timeline.active_chunk_id();
        let local = timeline.current_trial_local_index();
        let trial = timeline.next(&*store)?;
        let stimulus = trial
            .param("stimulus")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let plugin = trial.plugin.clone();

        let mut rec = record(&plugin, chunk_id.as_str());
        rec.trial_index = local;
        rec.trial_index_global = delivered.len();
        store.write(rec);
        timeline.advance(&*store);

        delivered.push(Delivered {
            plugin,
            stimulus,
            chunk_id: chunk_id.to_string(),
        });
    }
    Ok(delivered)
}

/// Temporary directory holding definition and config files for I/O tests.
pub struct DefinitionFixture {
    pub temp: TempDir,
}

impl DefinitionFixture {
    pub fn new() -> Self {
        Self {
            temp: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }

    pub fn write_definition(&self, name: &str, definition: &Value) -> PathBuf {
        let path = self.path(name);
        let contents = serde_json::to_string_pretty(definition).expect("serialize definition");
        fs::write(&path, contents).expect("write definition");
        path
    }

    pub fn write_config(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("write config");
        path
    }
}

impl Default for DefinitionFixture {
    fn default() -> Self {
        Self::new()
    }
}
