use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod tt;
pub mod move_order;
pub mod dfs;
pub mod deepen;
pub mod parallel;

pub use dfs::{Enumerator, PassReport, TerminalReason, TerminalState};
pub use deepen::{DeepeningController, PartialReason, SearchReport, StopCriteria};
pub use move_order::{KindPriority, NullOrdering, OrderingHint};
pub use tt::{InMemoryTt, TranspositionTable, TtEntry, TtStats};

/// Shared bounds for one traversal pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchBudget {
    /// Maximum plies of board-mutating actions below the root.
    pub max_depth: u8,
    /// Maximum fully explored paths before the pass stops and reports
    /// partial results. `None` means unbounded.
    pub max_paths: Option<u64>,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_depth: 24,
            max_paths: None,
        }
    }
}

impl SearchBudget {
    #[inline]
    pub fn with_depth(max_depth: u8) -> Self {
        Self { max_depth, max_paths: None }
    }
}

/// Cooperative cancellation token. Checked only between path explorations,
/// never mid-path, so a requested stop finishes the in-flight path and
/// leaves the transposition table consistent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters for one traversal pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassStats {
    /// Nodes expanded (signature built, menu queried).
    pub nodes: u64,
    /// Fully explored root-to-terminal paths.
    pub paths: u64,
    /// Natural terminals recorded (first discovery).
    pub terminals: u64,
    /// Paths whose terminal deduplicated onto an existing record.
    pub duplicate_terminals: u64,
    /// Subtrees skipped on a sufficiently strong cache hit.
    pub tt_shortcircuits: u64,
    /// Actions recorded as permanently failed at a state.
    pub failed_actions: u64,
    /// Paths aborted on a malformed snapshot.
    pub integrity_aborts: u64,
    /// Forward replays of the path prefix (the cost of no save/restore).
    pub replays: u64,
    /// Paths cut by the depth limit.
    pub depth_cutoffs: u64,
    /// Deepest ply reached by any path.
    pub max_depth_reached: u8,
}

impl PassStats {
    pub fn absorb(&mut self, other: &PassStats) {
        self.nodes += other.nodes;
        self.paths += other.paths;
        self.terminals += other.terminals;
        self.duplicate_terminals += other.duplicate_terminals;
        self.tt_shortcircuits += other.tt_shortcircuits;
        self.failed_actions += other.failed_actions;
        self.integrity_aborts += other.integrity_aborts;
        self.replays += other.replays;
        self.depth_cutoffs += other.depth_cutoffs;
        self.max_depth_reached = self.max_depth_reached.max(other.max_depth_reached);
    }
}
