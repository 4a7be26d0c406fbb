//! Static outline of a built timeline for `timeline outline`.

use std::fmt;

use crate::core::chunk::{ChunkIdx, NodeRef, Timeline};
use crate::core::types::ChunkType;

/// One line of the outline: a chunk or a block, in depth-first declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutlineEntry {
    Chunk {
        depth: usize,
        chunk_id: String,
        chunk_type: ChunkType,
        trials: usize,
    },
    Block {
        depth: usize,
        plugin: String,
        trials: usize,
    },
}

impl fmt::Display for OutlineEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chunk {
                depth,
                chunk_id,
                chunk_type,
                trials,
            } => write!(
                f,
                "{:indent$}{chunk_type} {chunk_id} ({trials} trials)",
                "",
                indent = depth * 2
            ),
            Self::Block {
                depth,
                plugin,
                trials,
            } => write!(
                f,
                "{:indent$}block {plugin} x{trials}",
                "",
                indent = depth * 2
            ),
        }
    }
}

/// Walk the tree from the root. Chunk ids are those of the current iteration.
pub fn outline(timeline: &Timeline) -> Vec<OutlineEntry> {
    let mut entries = Vec::new();
    walk(timeline, ChunkIdx::ROOT, 0, &mut entries);
    entries
}

fn walk(timeline: &Timeline, idx: ChunkIdx, depth: usize, entries: &mut Vec<OutlineEntry>) {
    let chunk = timeline.chunk(idx);
    entries.push(OutlineEntry::Chunk {
        depth,
        chunk_id: timeline.chunk_id(idx).to_string(),
        chunk_type: chunk.chunk_type(),
        trials: timeline.length_of(idx),
    });
    for child in chunk.children() {
        match *child {
            NodeRef::Chunk(child) => walk(timeline, child, depth + 1, entries),
            NodeRef::Block(block) => {
                let block = timeline.block(block);
                entries.push(OutlineEntry::Block {
                    depth: depth + 1,
                    plugin: block
                        .trials()
                        .first()
                        .map(|trial| trial.plugin.clone())
                        .unwrap_or_default(),
                    trials: block.len(),
                });
            }
        }
    }
}
