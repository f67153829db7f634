use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::search::dfs::{Enumerator, TerminalState};
use crate::search::tt::{TranspositionTable, TtStats};
use crate::search::{PassStats, SearchBudget};
use crate::source::DecisionSource;

/// Stopping criteria layered on top of the depth ladder. The first criterion
/// to fire ends the search; all are optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopCriteria {
    /// Stop once any recorded terminal reaches this value.
    pub target_value: Option<i16>,
    /// Elapsed-time budget for the whole ladder.
    pub time_limit: Option<Duration>,
    /// Path budget shared across all passes.
    pub max_paths: Option<u64>,
}

/// Why a search ended short of exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialReason {
    TargetReached,
    TimeBudget,
    PathBudget,
    DepthCapped,
    Cancelled,
}

/// Outcome of a deepening search. `complete` means every branch was
/// exhausted within the depth ladder; anything else is partial and says why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchReport {
    /// Deduplicated terminals in discovery order, which the depth ladder
    /// makes non-decreasing in depth: shortest results first.
    pub terminals: Vec<TerminalState>,
    pub stats: PassStats,
    pub tt_stats: TtStats,
    pub complete: bool,
    pub partial_reason: Option<PartialReason>,
    /// Highest depth limit actually run.
    pub depth_reached: u8,
    pub passes: u8,
}

impl SearchReport {
    /// Best-effort answer at any point: the shortest recorded terminal.
    #[inline]
    pub fn shortest(&self) -> Option<&TerminalState> {
        self.terminals.iter().min_by_key(|t| t.depth)
    }

    #[inline]
    pub fn best_value(&self) -> Option<i16> {
        self.terminals.iter().map(|t| t.value).max()
    }
}

/// Runs the engine at depth limits 1, 2, 3, … up to a configured maximum,
/// preserving the transposition table, failed-action map and terminal
/// collection across passes. Shallowest terminals are discovered first, so
/// the search is anytime: stop it whenever, the shortest results are already
/// in hand.
pub struct DeepeningController<'a, S> {
    engine: Enumerator<'a, S>,
    max_depth: u8,
}

impl<'a, S: DecisionSource> DeepeningController<'a, S> {
    pub fn new(engine: Enumerator<'a, S>, max_depth: u8) -> Self {
        Self { engine, max_depth }
    }

    #[inline]
    pub fn engine(&self) -> &Enumerator<'a, S> {
        &self.engine
    }

    #[inline]
    pub fn into_engine(self) -> Enumerator<'a, S> {
        self.engine
    }

    /// Run the ladder until a stop criterion fires, the tree is exhausted,
    /// or the depth limit is reached.
    pub fn search(&mut self, criteria: &StopCriteria) -> Result<SearchReport, SearchError> {
        let started = Instant::now();
        let mut total = PassStats::default();
        let mut paths_spent: u64 = 0;
        let mut passes: u8 = 0;
        let mut depth_reached: u8 = 0;
        let mut complete = false;
        let mut partial_reason: Option<PartialReason> = None;

        for depth in 1..=self.max_depth {
            if let Some(limit) = criteria.time_limit {
                if started.elapsed() >= limit {
                    partial_reason = Some(PartialReason::TimeBudget);
                    break;
                }
            }
            let pass_paths = match criteria.max_paths {
                Some(max) => {
                    let remaining = max.saturating_sub(paths_spent);
                    if remaining == 0 {
                        partial_reason = Some(PartialReason::PathBudget);
                        break;
                    }
                    Some(remaining)
                }
                None => None,
            };

            let budget = SearchBudget { max_depth: depth, max_paths: pass_paths };
            let report = self.engine.run_pass(&budget)?;
            passes += 1;
            depth_reached = depth;
            total.absorb(&report.stats);
            paths_spent += report.stats.paths;

            if report.cancelled {
                partial_reason = Some(PartialReason::Cancelled);
                break;
            }
            if report.budget_exhausted {
                partial_reason = Some(PartialReason::PathBudget);
                break;
            }
            if let Some(target) = criteria.target_value {
                if self.engine.terminals().iter().any(|t| t.value >= target) {
                    partial_reason = Some(PartialReason::TargetReached);
                    break;
                }
            }
            if let Some(limit) = criteria.time_limit {
                if started.elapsed() >= limit {
                    partial_reason = Some(PartialReason::TimeBudget);
                    break;
                }
            }
            if report.complete {
                // Nothing was depth-capped: the tree is exhausted and deeper
                // passes cannot add anything.
                complete = true;
                break;
            }
        }

        if !complete && partial_reason.is_none() {
            partial_reason = Some(PartialReason::DepthCapped);
        }

        Ok(SearchReport {
            terminals: self.engine.terminals().to_vec(),
            stats: total,
            tt_stats: self.engine.tt().stats(),
            complete,
            partial_reason: if complete { None } else { partial_reason },
            depth_reached,
            passes,
        })
    }
}
