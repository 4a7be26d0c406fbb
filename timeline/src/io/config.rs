//! Session configuration (TOML).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::factory::FactoryOptions;
use crate::core::params::DEFAULT_POST_TRIAL_MS;
use crate::core::types::ContinuePredicate;
use crate::registry::{ExpandingFactory, Registry};
use crate::session::DEFAULT_MAX_TRIALS;

/// Session configuration.
///
/// Edited by hand; missing fields fall back to `Default`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// `timing_post_trial` for entries that do not set one.
    pub default_post_trial_ms: u64,

    /// Upper bound on delivered trials per session.
    pub max_trials: usize,

    /// Print a progress snapshot next to every simulated trial.
    pub show_progress: bool,

    /// Plugins available to definitions, by `type` name.
    pub plugins: BTreeMap<String, PluginConfig>,

    /// Continuation predicates available to `while` chunks, by name.
    pub predicates: BTreeMap<String, PredicateConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_post_trial_ms: DEFAULT_POST_TRIAL_MS,
            max_trials: DEFAULT_MAX_TRIALS,
            show_progress: false,
            plugins: BTreeMap::new(),
            predicates: BTreeMap::new(),
        }
    }
}

/// Built-in expanding plugin; see [`ExpandingFactory`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PluginConfig {
    /// Array parameter expanded into one trial per element.
    pub list_field: Option<String>,
    /// Key each element is stored under.
    pub item_field: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            list_field: None,
            item_field: "stimulus".to_string(),
        }
    }
}

impl PluginConfig {
    fn factory(&self) -> ExpandingFactory {
        ExpandingFactory {
            list_field: self.list_field.clone(),
            item_field: self.item_field.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PredicateConfig {
    /// Run exactly `passes` passes each time the chunk is entered.
    Passes { passes: u32 },
    /// Run another pass while any record of the current pass has `field == equals`.
    FieldEquals { field: String, equals: Value },
}

impl PredicateConfig {
    /// Fresh predicate instance; pass counters are never shared between chunks.
    fn make(&self) -> ContinuePredicate {
        match self {
            Self::Passes { passes } => {
                let passes = *passes;
                let done = AtomicU32::new(0);
                ContinuePredicate::new(move |_| {
                    if done.fetch_add(1, Ordering::SeqCst) + 1 < passes {
                        return true;
                    }
                    // The chunk is finished; an enclosing reset starts it from pass one.
                    done.store(0, Ordering::SeqCst);
                    false
                })
            }
            Self::FieldEquals { field, equals } => {
                let (field, equals) = (field.clone(), equals.clone());
                ContinuePredicate::new(move |records| {
                    records
                        .iter()
                        .any(|record| record.get(&field) == Some(&equals))
                })
            }
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_trials == 0 {
            return Err(anyhow!("max_trials must be > 0"));
        }
        for (name, plugin) in &self.plugins {
            if name.trim().is_empty() {
                return Err(anyhow!("plugin names must be non-empty"));
            }
            if plugin.item_field.trim().is_empty() {
                return Err(anyhow!("plugins.{name}.item_field must be non-empty"));
            }
            if matches!(&plugin.list_field, Some(field) if field.trim().is_empty()) {
                return Err(anyhow!("plugins.{name}.list_field must be non-empty when set"));
            }
        }
        for (name, predicate) in &self.predicates {
            match predicate {
                PredicateConfig::Passes { passes: 0 } => {
                    return Err(anyhow!("predicates.{name}.passes must be > 0"));
                }
                PredicateConfig::FieldEquals { field, .. } if field.trim().is_empty() => {
                    return Err(anyhow!("predicates.{name}.field must be non-empty"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Registry holding every configured plugin and predicate.
    pub fn build_registry(&self) -> Registry {
        let mut registry = Registry::new();
        for (name, plugin) in &self.plugins {
            registry.register_plugin(name.clone(), plugin.factory());
        }
        for (name, predicate) in &self.predicates {
            let predicate = predicate.clone();
            registry.register_predicate_factory(name.clone(), move || predicate.make());
        }
        debug!(
            plugins = self.plugins.len(),
            predicates = self.predicates.len(),
            "registry built from config"
        );
        registry
    }

    pub fn factory_options(&self) -> FactoryOptions {
        FactoryOptions {
            default_post_trial_ms: self.default_post_trial_ms,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SessionConfig::default()`.
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    if !path.exists() {
        let cfg = SessionConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SessionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SessionConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
