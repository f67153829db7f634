use std::hash::BuildHasherDefault;

use hashbrown::{HashMap as HbHashMap, HashSet as HbHashSet};
use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::hash::ZobristSeed;
use crate::score::{BoardPresence, Evaluator};
use crate::search::move_order::OrderingHint;
use crate::search::tt::{InMemoryTt, TranspositionTable, TtEntry};
use crate::search::{CancelToken, PassStats, SearchBudget};
use crate::signature::{BoardSignature, SignatureBuilder};
use crate::source::{replay, ApplyOutcome, DecisionSource, StartConfig};
use crate::types::ActionId;

type FastHasher = BuildHasherDefault<ahash::AHasher>;
type FastMap<V> = HbHashMap<u128, V, FastHasher>;
type FastSet = HbHashSet<ActionId, FastHasher>;

/// Why a path stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// An explicit stop action was taken.
    VoluntaryStop,
    /// The filtered legal-action menu was empty.
    NoMoves,
    /// The depth limit cut the path; not proof of exhaustion.
    DepthLimit,
}

impl TerminalReason {
    /// Natural terminals enter the deduplicated collection; cutoffs are
    /// per-pass diagnostics.
    #[inline]
    pub fn is_natural(self) -> bool {
        !matches!(self, TerminalReason::DepthLimit)
    }
}

/// One reached end-state: the ordered action line that produced it, the
/// resulting board signature, depth in board-mutating actions (a trailing
/// stop token is recorded in the line but not counted), evaluator value and
/// the termination reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalState {
    pub line: Vec<ActionId>,
    pub signature: BoardSignature,
    pub depth: u8,
    pub value: i16,
    pub reason: TerminalReason,
}

/// Result of one traversal pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub stats: PassStats,
    /// All branches exhausted within budget. A capped or halted pass is
    /// partial and must never be mistaken for a proof of exhaustion.
    pub complete: bool,
    pub depth_capped: bool,
    pub budget_exhausted: bool,
    pub cancelled: bool,
    /// Frontier records cut by the depth limit this pass.
    pub cutoff_records: Vec<TerminalState>,
    /// Best terminal value backed up to the root, if any path completed.
    pub root_value: Option<i16>,
}

/// Backed-up outcome of one node.
#[derive(Debug, Clone, Copy)]
struct NodeOutcome {
    value: i16,
    distance: u8,
    exhausted: bool,
}

static DEFAULT_EVALUATOR: BoardPresence = BoardPresence;

/// Depth-first enumeration engine over one decision source.
///
/// Per node: snapshot, signature, transposition probe, failed-action
/// filtering, expansion in reported order, forward replay between siblings
/// (the source has no save/restore), terminal emission with board-level
/// deduplication. The transposition table, failed-action map and terminal
/// collection persist across passes so a deepening ladder reuses them.
pub struct Enumerator<'a, S> {
    source: S,
    start: StartConfig,
    builder: SignatureBuilder,
    tt: InMemoryTt,
    evaluator: &'a dyn Evaluator,
    ordering: Option<&'a dyn OrderingHint>,
    cancel: CancelToken,
    /// state key -> actions that failed to resolve there. Consulted whenever
    /// legal actions are re-enumerated at a revisited state; an action
    /// recorded here is never retried at that state.
    failed: FastMap<FastSet>,
    terminals: Vec<TerminalState>,
    terminal_index: FastMap<usize>,
    cutoffs: Vec<TerminalState>,
    pass: PassStats,
    depth_capped: bool,
    budget_exhausted: bool,
    cancelled: bool,
}

impl<'a, S: DecisionSource> Enumerator<'a, S> {
    pub fn new(source: S, start: StartConfig, seed: ZobristSeed) -> Self {
        Self {
            source,
            start,
            builder: SignatureBuilder::new(seed),
            tt: InMemoryTt::default(),
            evaluator: &DEFAULT_EVALUATOR,
            ordering: None,
            cancel: CancelToken::new(),
            failed: FastMap::default(),
            terminals: Vec::new(),
            terminal_index: FastMap::default(),
            cutoffs: Vec::new(),
            pass: PassStats::default(),
            depth_capped: false,
            budget_exhausted: false,
            cancelled: false,
        }
    }

    #[must_use]
    pub fn with_tt(mut self, tt: InMemoryTt) -> Self {
        self.tt = tt;
        self
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: &'a dyn Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    #[must_use]
    pub fn with_ordering(mut self, hint: &'a dyn OrderingHint) -> Self {
        self.ordering = Some(hint);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    #[inline]
    pub fn start_config(&self) -> &StartConfig {
        &self.start
    }

    /// Deduplicated natural terminals, in discovery order.
    #[inline]
    pub fn terminals(&self) -> &[TerminalState] {
        &self.terminals
    }

    #[inline]
    pub fn take_terminals(&mut self) -> Vec<TerminalState> {
        self.terminal_index.clear();
        std::mem::take(&mut self.terminals)
    }

    #[inline]
    pub fn tt(&self) -> &InMemoryTt {
        &self.tt
    }

    #[inline]
    pub fn tt_mut(&mut self) -> &mut InMemoryTt {
        &mut self.tt
    }

    /// Give the source and transposition table back, so a worker can reuse
    /// both across the hands of its batch.
    #[inline]
    pub fn into_parts(self) -> (S, InMemoryTt) {
        (self.source, self.tt)
    }

    /// Reseed the terminal collection from a persisted snapshot. Must pair
    /// with restoring the table it was saved with: a cache hit stands in for
    /// re-emitting these.
    pub fn absorb_terminals(&mut self, terminals: Vec<TerminalState>) {
        for t in terminals {
            let key = crate::hash::recompute_board_key(self.builder.seed(), &t.signature);
            if let Some(&idx) = self.terminal_index.get(&key) {
                if t.depth < self.terminals[idx].depth {
                    self.terminals[idx] = t;
                }
            } else {
                self.terminal_index.insert(key, self.terminals.len());
                self.terminals.push(t);
            }
        }
    }

    /// Run one depth-bounded pass from the configured start.
    pub fn run_pass(&mut self, budget: &SearchBudget) -> Result<PassReport, SearchError> {
        self.pass = PassStats::default();
        self.cutoffs.clear();
        self.depth_capped = false;
        self.budget_exhausted = false;
        self.cancelled = false;

        self.source.start(&self.start)?;
        let mut path: Vec<ActionId> = Vec::with_capacity(budget.max_depth as usize + 1);
        let root = self.visit(&mut path, budget)?;

        Ok(PassReport {
            stats: self.pass,
            complete: !(self.depth_capped || self.budget_exhausted || self.cancelled),
            depth_capped: self.depth_capped,
            budget_exhausted: self.budget_exhausted,
            cancelled: self.cancelled,
            cutoff_records: std::mem::take(&mut self.cutoffs),
            root_value: root.map(|r| r.value),
        })
    }

    #[inline]
    fn halted(&self) -> bool {
        self.budget_exhausted || self.cancelled
    }

    /// Forward replay of the applied-action prefix; the only way back to a
    /// position.
    fn replay_prefix(&mut self, path: &[ActionId]) -> Result<(), SearchError> {
        self.pass.replays += 1;
        replay(&mut self.source, &self.start, path)
    }

    /// One path completed. Counts it against the budget and checks the
    /// cancellation token; both fire between path explorations only.
    fn emit_terminal(
        &mut self,
        board: BoardSignature,
        board_key: u128,
        line: Vec<ActionId>,
        depth: u8,
        reason: TerminalReason,
        budget: &SearchBudget,
    ) -> i16 {
        let value = self.evaluator.evaluate(&board);
        self.pass.paths += 1;
        self.pass.max_depth_reached = self.pass.max_depth_reached.max(depth);

        if reason.is_natural() {
            if let Some(&idx) = self.terminal_index.get(&board_key) {
                self.pass.duplicate_terminals += 1;
                let existing = &mut self.terminals[idx];
                if depth < existing.depth {
                    existing.line = line;
                    existing.depth = depth;
                    existing.reason = reason;
                }
            } else {
                self.terminal_index.insert(board_key, self.terminals.len());
                self.terminals.push(TerminalState { line, signature: board, depth, value, reason });
                self.pass.terminals += 1;
            }
        } else {
            self.pass.depth_cutoffs += 1;
            self.depth_capped = true;
            self.cutoffs.push(TerminalState { line, signature: board, depth, value, reason });
        }

        if let Some(max_paths) = budget.max_paths {
            if self.pass.paths >= max_paths {
                self.budget_exhausted = true;
            }
        }
        if self.cancel.is_cancelled() {
            self.cancelled = true;
        }
        value
    }

    #[inline]
    fn store_node(&mut self, key: u128, outcome: NodeOutcome, searched: u8) {
        self.tt.store(
            key,
            TtEntry {
                value: outcome.value,
                terminal_distance: outcome.distance,
                searched,
                exhausted: outcome.exhausted,
                visits: 0,
            },
        );
    }

    #[inline]
    fn merge_best(best: &mut Option<(i16, u8)>, value: i16, distance: u8) {
        match best {
            Some((bv, bd)) if (*bv, std::cmp::Reverse(*bd)) >= (value, std::cmp::Reverse(distance)) => {}
            _ => *best = Some((value, distance)),
        }
    }

    /// Per-node state machine. `path` is the applied-action prefix; the
    /// source is positioned at its end on entry and on exit.
    #[allow(clippy::too_many_lines, clippy::cast_possible_truncation)]
    fn visit(
        &mut self,
        path: &mut Vec<ActionId>,
        budget: &SearchBudget,
    ) -> Result<Option<NodeOutcome>, SearchError> {
        let ply = path.len() as u8;
        let snap = self.source.snapshot()?;
        let offered = self.source.legal_actions()?;
        let inter = self.builder.intermediate(&snap, &offered)?;
        self.pass.nodes += 1;

        let allowance = budget.max_depth - ply;

        // The root is rebuilt by replay every pass; probing it could only
        // short-circuit a whole deepening pass into a no-op.
        if ply > 0 {
            if let Some(entry) = self.tt.lookup(inter.key) {
                if entry.exhausted || entry.searched >= allowance {
                    self.pass.tt_shortcircuits += 1;
                    if !entry.exhausted {
                        // The cached subtree was depth-capped and still is at
                        // this allowance; the pass stays partial.
                        self.depth_capped = true;
                    }
                    return Ok(Some(NodeOutcome {
                        value: entry.value,
                        distance: entry.terminal_distance,
                        exhausted: entry.exhausted,
                    }));
                }
            }
        }

        // Reported order, minus actions recorded as failed at this state.
        let mut menu = offered;
        if let Some(failed) = self.failed.get(&inter.key) {
            menu.retain(|a| !failed.contains(a));
        }
        if let Some(hint) = self.ordering {
            hint.prioritize(&inter.board, &mut menu);
        }

        if menu.is_empty() {
            let value = self.emit_terminal(
                inter.board,
                inter.board_key,
                path.clone(),
                ply,
                TerminalReason::NoMoves,
                budget,
            );
            let outcome = NodeOutcome { value, distance: 0, exhausted: true };
            if ply > 0 {
                self.store_node(inter.key, outcome, allowance);
            }
            return Ok(Some(outcome));
        }

        if allowance == 0 {
            let value = self.emit_terminal(
                inter.board,
                inter.board_key,
                path.clone(),
                ply,
                TerminalReason::DepthLimit,
                budget,
            );
            let outcome = NodeOutcome { value, distance: 0, exhausted: false };
            if ply > 0 {
                self.store_node(inter.key, outcome, 0);
            }
            return Ok(Some(outcome));
        }

        let mut best: Option<(i16, u8)> = None;
        let mut exhausted = true;
        let mut interrupted = false;

        for action in menu {
            if self.halted() {
                interrupted = true;
                break;
            }

            if action.is_stop() {
                path.push(action);
                let line = path.clone();
                path.pop();
                let value = self.emit_terminal(
                    inter.board.clone(),
                    inter.board_key,
                    line,
                    ply,
                    TerminalReason::VoluntaryStop,
                    budget,
                );
                Self::merge_best(&mut best, value, 0);
                continue;
            }

            match self.source.apply(&action)? {
                ApplyOutcome::Applied => {
                    path.push(action);
                    let child = self.visit(path, budget);
                    path.pop();
                    match child {
                        Ok(Some(outcome)) => {
                            Self::merge_best(&mut best, outcome.value, outcome.distance.saturating_add(1));
                            if !outcome.exhausted {
                                exhausted = false;
                            }
                        }
                        Ok(None) => {
                            exhausted = false;
                        }
                        Err(err) if err.aborts_path_only() => {
                            // Malformed snapshot below: abort that path only,
                            // keep exploring siblings.
                            self.pass.integrity_aborts += 1;
                            exhausted = false;
                        }
                        Err(err) => return Err(err),
                    }
                    self.replay_prefix(path)?;
                }
                ApplyOutcome::Unresolved => {
                    // Permanently failed at this exact state, however the
                    // state is reached again later.
                    self.failed.entry(inter.key).or_default().insert(action);
                    self.pass.failed_actions += 1;
                    self.replay_prefix(path)?;
                }
            }
        }

        let interrupted = interrupted || self.halted();
        if interrupted {
            exhausted = false;
        }

        let outcome = best.map(|(value, distance)| NodeOutcome { value, distance, exhausted });
        if ply > 0 && !interrupted {
            if let Some(o) = outcome {
                self.store_node(inter.key, o, allowance);
            }
        }
        Ok(outcome)
    }
}
