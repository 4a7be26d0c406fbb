//! Hierarchical identity paths for chunk execution instances.
//!
//! A path is built from `<relative index>-<iteration>` segments joined by `.`,
//! rooted at `0-<root iteration>`. Records are tagged with the path of the
//! deepest active chunk, so a chunk's own path is a prefix key over every
//! record produced during its current pass, including nested descendants.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one execution instance (structural position + iteration) of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Path of the root chunk at `iteration`.
    pub fn root(iteration: u32) -> Self {
        Self(format!("0-{iteration}"))
    }

    /// Path of the child at `relative_index` below `self`, at `iteration`.
    pub fn child(&self, relative_index: usize, iteration: u32) -> Self {
        Self(format!("{}.{relative_index}-{iteration}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of segments; the root has depth 1.
    pub fn depth(&self) -> usize {
        self.0.split('.').count()
    }

    /// True if a record tagged with `path` was generated by this chunk instance.
    ///
    /// Matches the path itself and every descendant path. The match only ends on
    /// a segment boundary, so `0-1` does not claim records of `0-10`.
    pub fn covers(&self, path: &str) -> bool {
        match path.strip_prefix(self.0.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChunkId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
