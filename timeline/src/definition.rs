//! Declarative experiment definitions.
//!
//! A definition is an ordered list of entries. An entry is either a chunk
//! descriptor (`chunk_type` plus `children`) or a terminal trial descriptor
//! (`type` plus plugin parameters). Definitions can be built in Rust, where
//! `while` predicates and finish hooks are closures, or parsed from JSON, where
//! predicates are referenced by registered name.
//!
//! Parsing keeps `chunk_type` and `type` raw (a non-string `chunk_type` is
//! kept as its JSON text); the chunk factory is the single place that
//! validates them.

use serde::Deserialize;
use serde_json::Value;

use crate::core::types::{ContinuePredicate, TrialHook, TrialParams};
use crate::data::TrialRecord;
use crate::error::SchedulerError;

/// Top-level definition: the children of the implicit root chunk.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "Value")]
pub struct ExperimentDefinition {
    pub entries: Vec<Entry>,
}

impl ExperimentDefinition {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    /// Parse a JSON definition.
    ///
    /// Accepts a bare array of entries, or an object carrying the array under
    /// `experiment_structure` or `timeline`.
    pub fn from_json(value: &Value) -> Result<Self, SchedulerError> {
        let entries = match value {
            Value::Array(entries) => entries,
            Value::Object(map) => match map
                .get("experiment_structure")
                .or_else(|| map.get("timeline"))
            {
                Some(Value::Array(entries)) => entries,
                _ => {
                    return Err(malformed(
                        "root",
                        "expected an `experiment_structure` or `timeline` array",
                    ));
                }
            },
            _ => return Err(malformed("root", "expected an array of entries")),
        };
        let entries = parse_entries(entries, "root")?;
        Ok(Self { entries })
    }
}

impl TryFrom<Value> for ExperimentDefinition {
    type Error = SchedulerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

/// One definition entry.
#[derive(Debug, Clone)]
pub enum Entry {
    Chunk(ChunkDefinition),
    Trials(TrialDefinition),
}

impl From<ChunkDefinition> for Entry {
    fn from(chunk: ChunkDefinition) -> Self {
        Entry::Chunk(chunk)
    }
}

impl From<TrialDefinition> for Entry {
    fn from(trials: TrialDefinition) -> Self {
        Entry::Trials(trials)
    }
}

/// How a `while` chunk obtains its continuation predicate.
#[derive(Debug, Clone)]
pub enum ContinueCondition {
    /// Resolved from the registry at construction.
    Named(String),
    Predicate(ContinuePredicate),
}

/// Composite entry.
#[derive(Debug, Clone)]
pub struct ChunkDefinition {
    /// Declared type; validated by the factory.
    pub chunk_type: String,
    pub children: Vec<Entry>,
    /// Required for `while` chunks, ignored otherwise.
    pub continue_while: Option<ContinueCondition>,
}

impl ChunkDefinition {
    pub fn new(chunk_type: impl Into<String>, children: Vec<Entry>) -> Self {
        Self {
            chunk_type: chunk_type.into(),
            children,
            continue_while: None,
        }
    }

    pub fn linear(children: Vec<Entry>) -> Self {
        Self::new("linear", children)
    }

    /// `while` chunk repeating its children as long as `predicate` holds.
    pub fn repeat_while<F>(children: Vec<Entry>, predicate: F) -> Self
    where
        F: Fn(&[TrialRecord]) -> bool + Send + Sync + 'static,
    {
        Self {
            continue_while: Some(ContinueCondition::Predicate(ContinuePredicate::new(
                predicate,
            ))),
            ..Self::new("while", children)
        }
    }

    /// `while` chunk whose predicate is looked up by name.
    pub fn repeat_while_named(children: Vec<Entry>, name: impl Into<String>) -> Self {
        Self {
            continue_while: Some(ContinueCondition::Named(name.into())),
            ..Self::new("while", children)
        }
    }
}

/// A generic parameter given once for the whole block or once per trial.
#[derive(Debug, Clone)]
pub enum GenericValue<T> {
    Single(T),
    PerTrial(Vec<T>),
}

/// Terminal entry: a plugin reference plus its parameters.
///
/// A missing or non-string `type` is reported as `PluginNotFound` by the factory.
#[derive(Debug, Clone, Default)]
pub struct TrialDefinition {
    /// All JSON parameters, including `type`, `data` and `timing_post_trial`.
    pub params: TrialParams,
    /// Finish hooks cannot come from JSON, so they live outside `params`.
    pub on_finish: Option<GenericValue<TrialHook>>,
}

impl TrialDefinition {
    pub fn new(plugin: impl Into<String>) -> Self {
        let plugin: String = plugin.into();
        Self::default().param("type", plugin)
    }

    pub fn from_params(params: TrialParams) -> Self {
        Self {
            params,
            on_finish: None,
        }
    }

    /// Plugin named by `type`, if it is a string.
    pub fn plugin(&self) -> Option<&str> {
        self.params.get("type").and_then(Value::as_str)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn data(self, data: impl Into<Value>) -> Self {
        self.param("data", data)
    }

    pub fn post_trial_ms(self, ms: u64) -> Self {
        self.param("timing_post_trial", ms)
    }

    pub fn on_finish<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TrialRecord) + Send + Sync + 'static,
    {
        self.on_finish = Some(GenericValue::Single(TrialHook::new(hook)));
        self
    }

    pub fn on_finish_each(mut self, hooks: Vec<TrialHook>) -> Self {
        self.on_finish = Some(GenericValue::PerTrial(hooks));
        self
    }
}

fn parse_entries(values: &[Value], path: &str) -> Result<Vec<Entry>, SchedulerError> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| parse_entry(value, &format!("{path}/{index}")))
        .collect()
}

fn parse_entry(value: &Value, path: &str) -> Result<Entry, SchedulerError> {
    let Value::Object(map) = value else {
        return Err(malformed(path, "entry must be an object"));
    };

    let Some(chunk_type) = map.get("chunk_type") else {
        return Ok(Entry::Trials(TrialDefinition::from_params(map.clone())));
    };

    let chunk_type = match chunk_type {
        Value::String(chunk_type) => chunk_type.clone(),
        other => other.to_string(),
    };
    let children = match map.get("children").or_else(|| map.get("blocks")) {
        Some(Value::Array(children)) => parse_entries(children, path)?,
        Some(_) => return Err(malformed(path, "`children` must be an array")),
        None => return Err(malformed(path, "chunk has no `children`")),
    };
    let continue_while = match map
        .get("continue_while")
        .or_else(|| map.get("continue_function"))
    {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) => Some(ContinueCondition::Named(name.clone())),
        Some(_) => {
            return Err(malformed(
                path,
                "`continue_while` must name a registered predicate",
            ));
        }
    };

    Ok(Entry::Chunk(ChunkDefinition {
        chunk_type,
        children,
        continue_while,
    }))
}

fn malformed(path: &str, reason: &str) -> SchedulerError {
    SchedulerError::MalformedEntry {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
