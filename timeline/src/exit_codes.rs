//! Stable exit codes for timeline CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid definition, config or plugin parameters, or any other error.
pub const INVALID: i32 = 1;
/// `timeline simulate` delivered more trials than `max_trials` allows.
pub const TRIAL_LIMIT: i32 = 2;
