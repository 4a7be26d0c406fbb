//! Experiment definition loading.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::definition::ExperimentDefinition;

/// Read and parse a JSON experiment definition.
pub fn load_definition(path: &Path) -> Result<ExperimentDefinition> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read definition {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse definition {}", path.display()))?;
    let definition = ExperimentDefinition::from_json(&value)
        .with_context(|| format!("load definition {}", path.display()))?;
    debug!(
        path = %path.display(),
        entries = definition.entries.len(),
        "definition loaded"
    );
    Ok(definition)
}
