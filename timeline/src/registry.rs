//! Capability registry: plugin trial factories and named `while` predicates.
//!
//! Plugins are resolved by name exactly once, while the factory builds the
//! tree. Nothing is looked up during traversal.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::params::GENERIC_PARAMETERS;
use crate::core::types::{ContinuePredicate, TrialParams};
use crate::data::TrialRecord;
use crate::definition::TrialDefinition;

/// Expands a terminal definition into the plugin-specific parameters of each trial.
pub trait TrialFactory: Send + Sync {
    /// Ordered parameters, one map per trial. Generic keys in the output are ignored.
    fn create(&self, definition: &TrialDefinition) -> Result<Vec<TrialParams>>;
}

impl<F> TrialFactory for F
where
    F: Fn(&TrialDefinition) -> Result<Vec<TrialParams>> + Send + Sync,
{
    fn create(&self, definition: &TrialDefinition) -> Result<Vec<TrialParams>> {
        self(definition)
    }
}

type PredicateMaker = Arc<dyn Fn() -> ContinuePredicate + Send + Sync>;

/// Name → capability mapping consulted by the chunk factory.
#[derive(Clone, Default)]
pub struct Registry {
    plugins: BTreeMap<String, Arc<dyn TrialFactory>>,
    predicates: BTreeMap<String, PredicateMaker>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_plugin(
        &mut self,
        name: impl Into<String>,
        factory: impl TrialFactory + 'static,
    ) -> &mut Self {
        self.plugins.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register a stateless predicate shared by every chunk that names it.
    pub fn register_predicate<F>(&mut self, name: impl Into<String>, predicate: F) -> &mut Self
    where
        F: Fn(&[TrialRecord]) -> bool + Send + Sync + 'static,
    {
        let predicate = ContinuePredicate::new(predicate);
        self.predicates
            .insert(name.into(), Arc::new(move || predicate.clone()));
        self
    }

    /// Register a predicate constructor; each chunk naming it gets its own instance.
    pub fn register_predicate_factory<F>(&mut self, name: impl Into<String>, make: F) -> &mut Self
    where
        F: Fn() -> ContinuePredicate + Send + Sync + 'static,
    {
        self.predicates.insert(name.into(), Arc::new(make));
        self
    }

    pub fn resolve(&self, plugin: &str) -> Option<Arc<dyn TrialFactory>> {
        self.plugins.get(plugin).cloned()
    }

    pub fn predicate(&self, name: &str) -> Option<ContinuePredicate> {
        self.predicates.get(name).map(|make| make())
    }

    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn predicate_names(&self) -> impl Iterator<Item = &str> {
        self.predicates.keys().map(String::as_str)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// General-purpose trial factory.
///
/// Without a list field the entry becomes one trial carrying every
/// non-generic parameter. With a list field, each element of that array
/// becomes one trial, stored under `item_field`; the remaining parameters are
/// copied onto every trial. A scalar list field yields a single trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandingFactory {
    pub list_field: Option<String>,
    pub item_field: String,
}

impl ExpandingFactory {
    pub fn single() -> Self {
        Self {
            list_field: None,
            item_field: String::new(),
        }
    }

    pub fn over(list_field: impl Into<String>, item_field: impl Into<String>) -> Self {
        Self {
            list_field: Some(list_field.into()),
            item_field: item_field.into(),
        }
    }
}

impl TrialFactory for ExpandingFactory {
    fn create(&self, definition: &TrialDefinition) -> Result<Vec<TrialParams>> {
        let mut shared = definition.params.clone();
        for key in GENERIC_PARAMETERS {
            shared.remove(key);
        }

        let Some(list_field) = &self.list_field else {
            return Ok(vec![shared]);
        };
        let items = match shared.remove(list_field) {
            Some(Value::Array(items)) => items,
            Some(item) => vec![item],
            None => return Err(anyhow!("missing parameter '{}'", list_field)),
        };

        Ok(items
            .into_iter()
            .map(|item| {
                let mut trial = shared.clone();
                trial.insert(self.item_field.clone(), item);
                trial
            })
            .collect())
    }
}
