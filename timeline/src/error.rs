//! Error taxonomy for timeline construction and traversal.
//!
//! Every variant is fatal: construction or execution stops at the point of
//! detection and the error is surfaced unchanged to the caller.

use thiserror::Error;

/// Errors raised by the chunk factory, the traversal protocol and the session driver.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A chunk entry declared a `chunk_type` outside `linear` / `while`.
    #[error("invalid chunk_type '{chunk_type}' at {path}")]
    UnknownChunkType { chunk_type: String, path: String },

    /// A terminal entry named a plugin that is not registered (or named none).
    #[error("no plugin registered for type '{plugin}' at {path}")]
    PluginNotFound { plugin: String, path: String },

    /// An array-valued generic parameter does not match the block's trial count.
    #[error(
        "parameter '{param}' of plugin '{plugin}' has {actual} values but the block has {expected} trials"
    )]
    ParameterLengthMismatch {
        param: String,
        plugin: String,
        expected: usize,
        actual: usize,
    },

    /// `next()` was called on a node that has no trial left to deliver.
    #[error("tried to get the next trial from chunk {chunk_id}, which is finished")]
    SchedulerExhausted { chunk_id: String },

    /// A `while` chunk was declared without a continuation predicate.
    #[error("while chunk at {path} has no continuation predicate")]
    MissingContinuePredicate { path: String },

    /// A `while` chunk referenced a predicate name that is not registered.
    #[error("no continuation predicate registered as '{name}' at {path}")]
    PredicateNotFound { name: String, path: String },

    /// A chunk without children or a block without trials.
    #[error("{path}: {what} is empty")]
    EmptyNode { path: String, what: &'static str },

    /// A definition entry that is neither a chunk nor a trial descriptor.
    #[error("malformed entry at {path}: {reason}")]
    MalformedEntry { path: String, reason: String },

    /// A generic parameter carried a value of the wrong JSON type.
    #[error("parameter '{param}' of plugin '{plugin}': {reason}")]
    InvalidParameter {
        param: String,
        plugin: String,
        reason: String,
    },

    /// The plugin's trial factory rejected the entry.
    #[error("plugin '{plugin}' failed to create trials at {path}")]
    PluginCreate {
        plugin: String,
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// The session run loop delivered more trials than the configured bound.
    #[error("session exceeded max_trials ({max_trials})")]
    TrialLimitExceeded { max_trials: usize },

    /// `finish_trial` was called while no trial was in flight.
    #[error("no trial is in progress")]
    NoTrialInProgress,

    /// `start` was called on a session that is already running or finished.
    #[error("session already started")]
    AlreadyStarted,
}

pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;
