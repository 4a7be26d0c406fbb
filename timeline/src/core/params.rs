//! Generic trial parameters shared by every plugin.
//!
//! `data`, `timing_post_trial` and `on_finish` may be given once for a whole
//! block or as an array with one value per generated trial. `type` names the
//! plugin and is consumed by the factory.

use serde_json::Value;

use crate::core::types::{TrialHook, TrialParams, TrialSpec};
use crate::definition::{GenericValue, TrialDefinition};
use crate::error::{Result, SchedulerError};

pub const GENERIC_PARAMETERS: [&str; 4] = ["type", "data", "timing_post_trial", "on_finish"];

pub const DEFAULT_POST_TRIAL_MS: u64 = 1000;

/// Combine the plugin's per-trial parameters with the entry's generic parameters.
pub(crate) fn merge_generic(
    plugin: &str,
    definition: &TrialDefinition,
    produced: Vec<TrialParams>,
    default_post_trial_ms: u64,
) -> Result<Vec<TrialSpec>> {
    let count = produced.len();

    let data = match definition.params.get("data") {
        None => vec![None; count],
        Some(Value::Array(items)) => {
            check_len("data", plugin, count, items.len())?;
            items.iter().cloned().map(Some).collect()
        }
        Some(single) => vec![Some(single.clone()); count],
    };

    let post_trial = match definition.params.get("timing_post_trial") {
        None => vec![default_post_trial_ms; count],
        Some(Value::Array(items)) => {
            check_len("timing_post_trial", plugin, count, items.len())?;
            items
                .iter()
                .map(|item| as_millis(item, plugin))
                .collect::<Result<Vec<_>>>()?
        }
        Some(single) => vec![as_millis(single, plugin)?; count],
    };

    let hooks: Vec<Option<TrialHook>> = match &definition.on_finish {
        None => vec![None; count],
        Some(GenericValue::Single(hook)) => vec![Some(hook.clone()); count],
        Some(GenericValue::PerTrial(hooks)) => {
            check_len("on_finish", plugin, count, hooks.len())?;
            hooks.iter().cloned().map(Some).collect()
        }
    };

    Ok(produced
        .into_iter()
        .zip(data)
        .zip(post_trial)
        .zip(hooks)
        .map(|(((mut params, data), post_trial_ms), on_finish)| {
            for key in GENERIC_PARAMETERS {
                params.remove(key);
            }
            TrialSpec {
                plugin: plugin.to_string(),
                data,
                post_trial_ms,
                on_finish,
                params,
            }
        })
        .collect())
}

fn check_len(param: &str, plugin: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(SchedulerError::ParameterLengthMismatch {
            param: param.to_string(),
            plugin: plugin.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn as_millis(value: &Value, plugin: &str) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| SchedulerError::InvalidParameter {
            param: "timing_post_trial".to_string(),
            plugin: plugin.to_string(),
            reason: format!("expected a non-negative integer, got {value}"),
        })
}
