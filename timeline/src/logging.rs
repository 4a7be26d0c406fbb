//! Diagnostic tracing for the scheduler and the CLI.
//!
//! Events cover tree construction, trial delivery and advance, `while`
//! decisions and session start/finish. They go to stderr so `outline` and
//! `simulate` keep stdout clean.
//!
//! Trial records are the product output. They live in the session's
//! [`DataStore`](crate::data::DataStore) and are never emitted as events, so
//! a quiet filter loses no experiment data.

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset or blank.
pub const DEFAULT_DIRECTIVE: &str = "warn";

/// Install the global subscriber, compact on stderr.
///
/// Reads `RUST_LOG`; unparsable directives are skipped. Does nothing when a
/// subscriber is already installed, e.g. by an embedding application.
///
/// # Example
/// ```bash
/// RUST_LOG=timeline=debug timeline simulate experiment.json
/// ```
pub fn init() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(directives.as_deref()))
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn env_filter(directives: Option<&str>) -> EnvFilter {
    match directives.map(str::trim) {
        Some(directives) if !directives.is_empty() => {
            EnvFilter::builder().parse_lossy(directives)
        }
        _ => EnvFilter::new(DEFAULT_DIRECTIVE),
    }
}
