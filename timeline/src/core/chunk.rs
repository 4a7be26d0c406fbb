//! Composite scheduling nodes and the traversal protocol.
//!
//! The tree is stored as an arena: chunks and blocks live in two vectors and
//! refer to each other by index. Ownership runs strictly root → leaves through
//! `children`; the `parent` link is a plain index and owns nothing.
//!
//! Only cursors, trial counters and iteration numbers change after the factory
//! has built the tree. Every mutation goes through `&mut Timeline`, so calls to
//! `next` / `advance` / `reset` on one tree are serialized by construction.

use tracing::{debug, info, warn};

use crate::core::block::Block;
use crate::core::identity::ChunkId;
use crate::core::types::{ChunkType, ContinuePredicate, Continuation, TrialSpec};
use crate::data::DataStore;
use crate::error::{Result, SchedulerError};

/// Index of a chunk inside its [`Timeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkIdx(usize);

impl ChunkIdx {
    pub const ROOT: ChunkIdx = ChunkIdx(0);
}

/// Index of a block inside its [`Timeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockIdx(usize);

/// A chunk's child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    Chunk(ChunkIdx),
    Block(BlockIdx),
}

/// Chunk behaviour; `while` chunks own their continuation predicate.
#[derive(Debug, Clone)]
pub enum ChunkKind {
    Root,
    Linear,
    While(ContinuePredicate),
}

impl ChunkKind {
    pub fn chunk_type(&self) -> ChunkType {
        match self {
            Self::Root => ChunkType::Root,
            Self::Linear => ChunkType::Linear,
            Self::While(_) => ChunkType::While,
        }
    }
}

/// Composite node: ordered children plus traversal state.
#[derive(Debug, Clone)]
pub struct ChunkNode {
    kind: ChunkKind,
    children: Vec<NodeRef>,
    parent: Option<ChunkIdx>,
    relative_index: usize,
    cursor: usize,
    iteration: u32,
    /// Trials advanced past since the last reset.
    trials_in_pass: usize,
    /// Trials advanced past since construction, across resets.
    trials_total: usize,
}

impl ChunkNode {
    fn new(kind: ChunkKind, parent: Option<ChunkIdx>, relative_index: usize) -> Self {
        Self {
            kind,
            children: Vec::new(),
            parent,
            relative_index,
            cursor: 0,
            iteration: 0,
            trials_in_pass: 0,
            trials_total: 0,
        }
    }

    pub fn kind(&self) -> &ChunkKind {
        &self.kind
    }

    pub fn chunk_type(&self) -> ChunkType {
        self.kind.chunk_type()
    }

    pub fn children(&self) -> &[NodeRef] {
        &self.children
    }

    pub fn parent(&self) -> Option<ChunkIdx> {
        self.parent
    }

    pub fn relative_index(&self) -> usize {
        self.relative_index
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn trials_in_pass(&self) -> usize {
        self.trials_in_pass
    }

    pub fn trials_total(&self) -> usize {
        self.trials_total
    }

    /// Child under the cursor, if the current pass has not run out of children.
    pub fn active_child(&self) -> Option<NodeRef> {
        self.children.get(self.cursor).copied()
    }
}

/// A constructed chunk tree. The root is always [`ChunkIdx::ROOT`].
#[derive(Debug, Clone)]
pub struct Timeline {
    chunks: Vec<ChunkNode>,
    blocks: Vec<Block>,
}

impl Timeline {
    /// Tree containing only an empty root chunk.
    pub(crate) fn with_root() -> Self {
        Self {
            chunks: vec![ChunkNode::new(ChunkKind::Root, None, 0)],
            blocks: Vec::new(),
        }
    }

    /// Append a chunk as the next child of `parent`.
    pub(crate) fn push_chunk(&mut self, parent: ChunkIdx, kind: ChunkKind) -> ChunkIdx {
        let relative_index = self.chunks[parent.0].children.len();
        let idx = ChunkIdx(self.chunks.len());
        self.chunks.push(ChunkNode::new(kind, Some(parent), relative_index));
        self.chunks[parent.0].children.push(NodeRef::Chunk(idx));
        idx
    }

    /// Append a block as the next child of `parent`.
    pub(crate) fn push_block(&mut self, parent: ChunkIdx, block: Block) -> BlockIdx {
        let idx = BlockIdx(self.blocks.len());
        self.blocks.push(block);
        self.chunks[parent.0].children.push(NodeRef::Block(idx));
        idx
    }

    pub fn root(&self) -> &ChunkNode {
        &self.chunks[ChunkIdx::ROOT.0]
    }

    pub fn chunk(&self, idx: ChunkIdx) -> &ChunkNode {
        &self.chunks[idx.0]
    }

    pub fn block(&self, idx: BlockIdx) -> &Block {
        &self.blocks[idx.0]
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    // Root-level protocol.

    /// Next trial of the whole tree. Fails with `SchedulerExhausted` once complete.
    pub fn next<S: DataStore + ?Sized>(&mut self, store: &S) -> Result<&TrialSpec> {
        self.next_in(ChunkIdx::ROOT, store)
    }

    pub fn advance<S: DataStore + ?Sized>(&mut self, store: &S) {
        self.advance_in(ChunkIdx::ROOT, store);
    }

    pub fn is_complete<S: DataStore + ?Sized>(&mut self, store: &S) -> bool {
        self.is_complete_in(ChunkIdx::ROOT, store)
    }

    pub fn reset(&mut self) {
        self.reset_in(ChunkIdx::ROOT);
    }

    pub fn length(&self) -> usize {
        self.length_of(ChunkIdx::ROOT)
    }

    pub fn active_chunk_id(&self) -> ChunkId {
        self.active_chunk_id_of(ChunkIdx::ROOT)
    }

    pub fn current_trial_local_index(&self) -> Option<usize> {
        self.current_trial_local_index_of(ChunkIdx::ROOT)
    }

    // Per-chunk protocol.

    /// Next trial below `idx`, without moving any cursor.
    ///
    /// Checks completeness first, which may rewind a finished `while` chunk
    /// whose predicate asks for another pass.
    pub fn next_in<S: DataStore + ?Sized>(
        &mut self,
        idx: ChunkIdx,
        store: &S,
    ) -> Result<&TrialSpec> {
        if self.is_complete_in(idx, store) {
            return Err(self.exhausted(idx));
        }
        match self.chunks[idx.0].active_child() {
            Some(NodeRef::Chunk(child)) => self.next_in(child, store),
            Some(NodeRef::Block(block)) => match self.blocks[block.0].next() {
                Some(trial) => Ok(trial),
                None => Err(self.exhausted(idx)),
            },
            None => Err(self.exhausted(idx)),
        }
    }

    /// Move past the trial most recently returned by `next_in(idx)`.
    pub fn advance_in<S: DataStore + ?Sized>(&mut self, idx: ChunkIdx, store: &S) {
        let Some(child) = self.chunks[idx.0].active_child() else {
            warn!(chunk_id = %self.chunk_id(idx), "advance on a chunk with no active child");
            return;
        };

        let child_complete = match child {
            NodeRef::Block(block) => {
                let block = &mut self.blocks[block.0];
                block.advance();
                block.is_complete()
            }
            NodeRef::Chunk(chunk) => {
                self.advance_in(chunk, store);
                self.is_complete_in(chunk, store)
            }
        };

        let node = &mut self.chunks[idx.0];
        if child_complete {
            node.cursor += 1;
        }
        node.trials_in_pass += 1;
        node.trials_total += 1;
    }

    /// Completion rule for `idx`.
    ///
    /// A `while` chunk that has run out of children evaluates its predicate over
    /// the records of its current pass; on `ResetAndContinue` it rewinds and
    /// reports incomplete.
    pub fn is_complete_in<S: DataStore + ?Sized>(&mut self, idx: ChunkIdx, store: &S) -> bool {
        let node = &self.chunks[idx.0];
        if node.cursor < node.children.len() {
            return false;
        }
        let predicate = match &node.kind {
            ChunkKind::Root | ChunkKind::Linear => return true,
            ChunkKind::While(predicate) => predicate.clone(),
        };

        let chunk_id = self.chunk_id(idx);
        let records = store.query_by_path_prefix(&chunk_id);
        match predicate.decide(&records) {
            Continuation::ResetAndContinue => {
                info!(%chunk_id, records = records.len(), "while chunk continues");
                self.reset_in(idx);
                false
            }
            Continuation::Terminal => {
                debug!(%chunk_id, records = records.len(), "while chunk terminal");
                true
            }
        }
    }

    /// Rewind `idx` and every descendant; each rewound chunk starts a new iteration.
    pub fn reset_in(&mut self, idx: ChunkIdx) {
        let node = &mut self.chunks[idx.0];
        node.cursor = 0;
        node.trials_in_pass = 0;
        node.iteration += 1;

        for position in 0..self.chunks[idx.0].children.len() {
            match self.chunks[idx.0].children[position] {
                NodeRef::Block(block) => self.blocks[block.0].reset(),
                NodeRef::Chunk(chunk) => self.reset_in(chunk),
            }
        }
    }

    /// Identity path of the current execution instance of `idx`.
    pub fn chunk_id(&self, idx: ChunkIdx) -> ChunkId {
        let node = &self.chunks[idx.0];
        match node.parent {
            None => ChunkId::root(node.iteration),
            Some(parent) => self
                .chunk_id(parent)
                .child(node.relative_index, node.iteration),
        }
    }

    /// Identity path of the deepest chunk currently active below `idx`.
    pub fn active_chunk_id_of(&self, idx: ChunkIdx) -> ChunkId {
        match self.chunks[idx.0].active_child() {
            Some(NodeRef::Chunk(child)) => self.active_chunk_id_of(child),
            Some(NodeRef::Block(_)) | None => self.chunk_id(idx),
        }
    }

    /// Trials in one static pass below `idx`.
    ///
    /// Does not project the extra passes a `while` chunk may run.
    pub fn length_of(&self, idx: ChunkIdx) -> usize {
        self.chunks[idx.0]
            .children
            .iter()
            .map(|child| match child {
                NodeRef::Block(block) => self.blocks[block.0].len(),
                NodeRef::Chunk(chunk) => self.length_of(*chunk),
            })
            .sum()
    }

    /// Cursor of the active block below `idx`.
    pub fn current_trial_local_index_of(&self, idx: ChunkIdx) -> Option<usize> {
        match self.chunks[idx.0].active_child()? {
            NodeRef::Block(block) => Some(self.blocks[block.0].cursor()),
            NodeRef::Chunk(child) => self.current_trial_local_index_of(child),
        }
    }

    fn exhausted(&self, idx: ChunkIdx) -> SchedulerError {
        SchedulerError::SchedulerExhausted {
            chunk_id: self.chunk_id(idx).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::data::InMemoryDataStore;
    use crate::test_support::{drive, spec};

    fn block(plugin: &str, n: usize) -> Block {
        Block::new((0..n).map(|i| spec(plugin, i)).collect())
    }

    /// `linear[A(2), while(B(1))]` built by hand.
    fn scenario(predicate: ContinuePredicate) -> Timeline {
        let mut timeline = Timeline::with_root();
        let linear = timeline.push_chunk(ChunkIdx::ROOT, ChunkKind::Linear);
        timeline.push_block(linear, block("a", 2));
        let repeat = timeline.push_chunk(linear, ChunkKind::While(predicate));
        timeline.push_block(repeat, block("b", 1));
        timeline
    }

    fn calls_until(limit: usize) -> ContinuePredicate {
        let calls = Arc::new(AtomicUsize::new(0));
        ContinuePredicate::new(move |_| calls.fetch_add(1, Ordering::SeqCst) < limit)
    }

    #[test]
    fn linear_tree_delivers_blocks_in_order() {
        let mut timeline = Timeline::with_root();
        timeline.push_block(ChunkIdx::ROOT, block("a", 2));
        let linear = timeline.push_chunk(ChunkIdx::ROOT, ChunkKind::Linear);
        timeline.push_block(linear, block("b", 1));
        timeline.push_block(linear, block("c", 2));

        let mut store = InMemoryDataStore::new();
        let delivered = drive(&mut timeline, &mut store, 100).expect("drive");
        let stimuli: Vec<&str> = delivered.iter().map(|d| d.stimulus.as_str()).collect();
        assert_eq!(stimuli, vec!["a-0", "a-1", "b-0", "c-0", "c-1"]);
        assert!(timeline.is_complete(&store));
    }

    #[test]
    fn chunk_ids_follow_position_and_iteration() {
        let mut timeline = scenario(calls_until(1));
        let mut store = InMemoryDataStore::new();
        let delivered = drive(&mut timeline, &mut store, 100).expect("drive");

        let tagged: Vec<(&str, &str)> = delivered
            .iter()
            .map(|d| (d.stimulus.as_str(), d.chunk_id.as_str()))
            .collect();
        assert_eq!(
            tagged,
            vec![
                ("a-0", "0-0.0-0"),
                ("a-1", "0-0.0-0"),
                ("b-0", "0-0.1-0"),
                ("b-0", "0-0.1-1"),
            ]
        );
    }

    #[test]
    fn chunk_id_is_stable_without_reset() {
        let timeline = scenario(calls_until(0));
        let repeat = ChunkIdx(2);
        assert_eq!(timeline.chunk_id(repeat), timeline.chunk_id(repeat));
        assert_eq!(timeline.chunk_id(repeat).as_str(), "0-0.1-0");
        assert_eq!(timeline.chunk_id(ChunkIdx::ROOT).as_str(), "0-0");
    }

    #[test]
    fn while_true_twice_then_false_runs_three_passes() {
        let mut timeline = Timeline::with_root();
        let repeat = timeline.push_chunk(ChunkIdx::ROOT, ChunkKind::While(calls_until(2)));
        timeline.push_block(repeat, block("b", 2));

        let mut store = InMemoryDataStore::new();
        let delivered = drive(&mut timeline, &mut store, 100).expect("drive");
        assert_eq!(delivered.len(), 6);
        assert_eq!(timeline.chunk(repeat).iteration(), 2);
        assert_eq!(timeline.chunk(repeat).trials_total(), 6);
        assert!(timeline.is_complete(&store));
    }

    #[test]
    fn while_always_true_never_completes() {
        let mut timeline = Timeline::with_root();
        let repeat = timeline.push_chunk(
            ChunkIdx::ROOT,
            ChunkKind::While(ContinuePredicate::new(|_| true)),
        );
        timeline.push_block(repeat, block("b", 1));

        let mut store = InMemoryDataStore::new();
        let delivered = drive(&mut timeline, &mut store, 50).expect("drive");
        assert_eq!(delivered.len(), 50);
        assert!(!timeline.is_complete(&store));
    }

    #[test]
    fn predicate_sees_only_current_pass_records() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_by_predicate = Arc::clone(&seen);
        let predicate = ContinuePredicate::new(move |records| {
            let mut seen = seen_by_predicate.lock().expect("lock");
            seen.push(records.len());
            seen.len() < 3
        });
        let mut timeline = scenario(predicate);
        let mut store = InMemoryDataStore::new();
        drive(&mut timeline, &mut store, 100).expect("drive");

        assert_eq!(*seen.lock().expect("lock"), vec![1, 1, 1]);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn reset_rewinds_descendants_and_bumps_their_iteration() {
        let mut timeline = Timeline::with_root();
        let outer = timeline.push_chunk(ChunkIdx::ROOT, ChunkKind::While(calls_until(1)));
        let inner = timeline.push_chunk(outer, ChunkKind::Linear);
        timeline.push_block(inner, block("x", 1));

        let mut store = InMemoryDataStore::new();
        let delivered = drive(&mut timeline, &mut store, 100).expect("drive");
        let paths: Vec<&str> = delivered.iter().map(|d| d.chunk_id.as_str()).collect();
        assert_eq!(paths, vec!["0-0.0-0.0-0", "0-0.0-1.0-1"]);
        assert_eq!(timeline.chunk(inner).iteration(), 1);
    }

    #[test]
    fn length_counts_one_static_pass() {
        let mut timeline = scenario(calls_until(3));
        assert_eq!(timeline.length(), 3);

        let mut store = InMemoryDataStore::new();
        let delivered = drive(&mut timeline, &mut store, 100).expect("drive");
        assert_eq!(delivered.len(), 6);
        assert_eq!(timeline.length(), 3);
    }

    #[test]
    fn next_on_complete_tree_is_exhausted() {
        let mut timeline = Timeline::with_root();
        timeline.push_block(ChunkIdx::ROOT, block("a", 1));
        let store = InMemoryDataStore::new();

        timeline.next(&store).expect("first trial");
        timeline.advance(&store);
        let err = timeline.next(&store).expect_err("exhausted");
        assert!(matches!(
            err,
            SchedulerError::SchedulerExhausted { ref chunk_id } if chunk_id == "0-0"
        ));
    }

    #[test]
    fn local_index_tracks_active_block() {
        let mut timeline = scenario(calls_until(0));
        let store = InMemoryDataStore::new();
        assert_eq!(timeline.current_trial_local_index(), Some(0));
        timeline.advance(&store);
        assert_eq!(timeline.current_trial_local_index(), Some(1));
        timeline.advance(&store);
        assert_eq!(timeline.current_trial_local_index(), Some(0));
        assert_eq!(timeline.active_chunk_id().as_str(), "0-0.1-0");
        timeline.advance(&store);
        assert_eq!(timeline.current_trial_local_index(), None);
        assert_eq!(timeline.active_chunk_id().as_str(), "0-0");
    }
}
