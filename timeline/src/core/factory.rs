//! Builds a [`Timeline`] from an [`ExperimentDefinition`].
//!
//! Construction is eager and fail-fast: every chunk type, plugin and `while`
//! predicate is resolved here, and every block is expanded into its final
//! trial list. The first error aborts the build.

use tracing::{debug, info};

use crate::core::block::Block;
use crate::core::chunk::{ChunkIdx, ChunkKind, Timeline};
use crate::core::params::{DEFAULT_POST_TRIAL_MS, merge_generic};
use crate::core::types::{ChunkType, ContinuePredicate};
use crate::definition::{
    ChunkDefinition, ContinueCondition, Entry, ExperimentDefinition, TrialDefinition,
};
use crate::error::{Result, SchedulerError};
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryOptions {
    /// `timing_post_trial` for entries that do not set one.
    pub default_post_trial_ms: u64,
}

impl Default for FactoryOptions {
    fn default() -> Self {
        Self {
            default_post_trial_ms: DEFAULT_POST_TRIAL_MS,
        }
    }
}

pub struct ChunkFactory<'r> {
    registry: &'r Registry,
    options: FactoryOptions,
}

impl<'r> ChunkFactory<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            options: FactoryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FactoryOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the tree rooted at an implicit root chunk whose children are the
    /// definition's entries.
    pub fn build(&self, definition: &ExperimentDefinition) -> Result<Timeline> {
        if definition.entries.is_empty() {
            return Err(SchedulerError::EmptyNode {
                path: "root".to_string(),
                what: "experiment",
            });
        }

        let mut timeline = Timeline::with_root();
        self.build_children(&mut timeline, ChunkIdx::ROOT, &definition.entries, "root")?;

        info!(
            chunks = timeline.chunk_count(),
            blocks = timeline.block_count(),
            trials = timeline.length(),
            "timeline built"
        );
        Ok(timeline)
    }

    fn build_children(
        &self,
        timeline: &mut Timeline,
        parent: ChunkIdx,
        entries: &[Entry],
        path: &str,
    ) -> Result<()> {
        for (index, entry) in entries.iter().enumerate() {
            let path = format!("{path}/{index}");
            match entry {
                Entry::Chunk(chunk) => self.build_chunk(timeline, parent, chunk, &path)?,
                Entry::Trials(trials) => self.build_block(timeline, parent, trials, &path)?,
            }
        }
        Ok(())
    }

    fn build_chunk(
        &self,
        timeline: &mut Timeline,
        parent: ChunkIdx,
        chunk: &ChunkDefinition,
        path: &str,
    ) -> Result<()> {
        let kind = match ChunkType::from_declared(&chunk.chunk_type) {
            Some(ChunkType::Linear) => ChunkKind::Linear,
            Some(ChunkType::While) => ChunkKind::While(self.resolve_predicate(chunk, path)?),
            Some(ChunkType::Root) | None => {
                return Err(SchedulerError::UnknownChunkType {
                    chunk_type: chunk.chunk_type.clone(),
                    path: path.to_string(),
                });
            }
        };
        if chunk.children.is_empty() {
            return Err(SchedulerError::EmptyNode {
                path: path.to_string(),
                what: "chunk",
            });
        }

        let idx = timeline.push_chunk(parent, kind);
        debug!(path, chunk_type = %chunk.chunk_type, "chunk created");
        self.build_children(timeline, idx, &chunk.children, path)
    }

    fn resolve_predicate(
        &self,
        chunk: &ChunkDefinition,
        path: &str,
    ) -> Result<ContinuePredicate> {
        match &chunk.continue_while {
            Some(ContinueCondition::Predicate(predicate)) => Ok(predicate.clone()),
            Some(ContinueCondition::Named(name)) => {
                self.registry
                    .predicate(name)
                    .ok_or_else(|| SchedulerError::PredicateNotFound {
                        name: name.clone(),
                        path: path.to_string(),
                    })
            }
            None => Err(SchedulerError::MissingContinuePredicate {
                path: path.to_string(),
            }),
        }
    }

    fn build_block(
        &self,
        timeline: &mut Timeline,
        parent: ChunkIdx,
        trials: &TrialDefinition,
        path: &str,
    ) -> Result<()> {
        let plugin = trials.plugin().unwrap_or_default();
        let factory =
            self.registry
                .resolve(plugin)
                .ok_or_else(|| SchedulerError::PluginNotFound {
                    plugin: plugin.to_string(),
                    path: path.to_string(),
                })?;

        let produced = factory
            .create(trials)
            .map_err(|source| SchedulerError::PluginCreate {
                plugin: plugin.to_string(),
                path: path.to_string(),
                source,
            })?;
        if produced.is_empty() {
            return Err(SchedulerError::EmptyNode {
                path: path.to_string(),
                what: "block",
            });
        }

        let specs = merge_generic(plugin, trials, produced, self.options.default_post_trial_ms)?;
        debug!(path, plugin, trials = specs.len(), "block created");
        timeline.push_block(parent, Block::new(specs));
        Ok(())
    }
}
