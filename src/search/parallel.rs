use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::hash::ZobristSeed;
use crate::score::Evaluator;
use crate::search::deepen::{DeepeningController, SearchReport, StopCriteria};
use crate::search::dfs::Enumerator;
use crate::search::move_order::OrderingHint;
use crate::search::tt::{InMemoryTt, TranspositionTable, TtStats};
use crate::search::{CancelToken, PassStats};
use crate::source::{DecisionSource, StartConfig};
use crate::types::CardCode;

/// Exact binomial coefficient; 0 when k > n.
pub fn binomial(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * u128::from(n - i) / u128::from(i + 1);
    }
    u64::try_from(acc).unwrap_or(u64::MAX)
}

/// Combinatorial space of candidate starting hands: all `hand_size`-subsets
/// of a card pool, enumerated in lexicographic order over pool positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandSpace {
    pub pool: Vec<CardCode>,
    pub hand_size: usize,
}

impl HandSpace {
    #[inline]
    pub fn new(pool: Vec<CardCode>, hand_size: usize) -> Self {
        Self { pool, hand_size }
    }

    #[inline]
    pub fn combination_count(&self) -> u64 {
        binomial(self.pool.len() as u64, self.hand_size as u64)
    }

    /// Unrank `index` into its combination. Index order is lexicographic by
    /// pool position, so enumeration is deterministic and gap-free.
    #[allow(clippy::cast_possible_truncation)]
    pub fn combination_at(&self, mut index: u64) -> Vec<CardCode> {
        let n = self.pool.len();
        let k = self.hand_size;
        debug_assert!(index < self.combination_count());
        let mut hand = Vec::with_capacity(k);
        let mut next = 0usize;
        for slot in 0..k {
            for candidate in next..n {
                let below = binomial((n - candidate - 1) as u64, (k - slot - 1) as u64);
                if index < below {
                    hand.push(self.pool[candidate]);
                    next = candidate + 1;
                    break;
                }
                index -= below;
            }
        }
        hand
    }
}

/// Strided partition of combination indices across workers: every index to
/// exactly one batch, batch sizes within one of each other.
pub fn partition(indices: &[u64], workers: usize) -> Vec<Vec<u64>> {
    let workers = workers.max(1);
    let mut batches: Vec<Vec<u64>> = vec![Vec::with_capacity(indices.len() / workers + 1); workers];
    for (i, &index) in indices.iter().enumerate() {
        batches[i % workers].push(index);
    }
    batches
}

/// Deterministic down-sampling of an oversized hand space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSpec {
    pub count: u64,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub workers: usize,
    pub max_depth: u8,
    /// Per-hand stopping criteria, applied by each worker's controller.
    pub criteria: StopCriteria,
    /// Shared across every worker so independently computed keys agree.
    pub zobrist_seed: ZobristSeed,
    pub sample: Option<SampleSpec>,
    /// Per-worker transposition table budget.
    pub tt_budget_mib: Option<usize>,
    pub cancel: CancelToken,
    pub progress: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_depth: 12,
            criteria: StopCriteria::default(),
            zobrist_seed: ZobristSeed::default(),
            sample: None,
            tt_budget_mib: None,
            cancel: CancelToken::new(),
            progress: false,
        }
    }
}

/// One starting hand's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandReport {
    pub index: u64,
    pub hand: Vec<CardCode>,
    pub search: Option<SearchReport>,
    /// Fatal search error for this hand (corrupted source, replay
    /// divergence); other hands are unaffected.
    pub error: Option<String>,
}

/// One worker's batch outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker: usize,
    pub assigned: u64,
    pub completed: u64,
    pub failed: bool,
    pub hands: Vec<HandReport>,
    pub stats: PassStats,
    pub tt_stats: TtStats,
}

impl WorkerReport {
    fn poisoned(worker: usize, assigned: u64) -> Self {
        Self {
            worker,
            assigned,
            completed: 0,
            failed: true,
            hands: Vec::new(),
            stats: PassStats::default(),
            tt_stats: TtStats::default(),
        }
    }
}

/// Merged run outcome: per-hand reports in combination-index order plus
/// aggregate statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub hands: Vec<HandReport>,
    pub stats: PassStats,
    pub tt_stats: TtStats,
    pub assigned: u64,
    pub completed: u64,
    pub failed_workers: Vec<usize>,
}

impl RunReport {
    /// Every assigned combination was processed and no worker failed.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failed_workers.is_empty() && self.completed == self.assigned
    }
}

/// Fans a hand space out across a worker pool. Each worker owns a private
/// decision source (built by the factory), signature builder and
/// transposition table; workers share no mutable state, so one worker's
/// forward replay can never race another's.
pub struct Coordinator<'a, F> {
    factory: F,
    space: HandSpace,
    config: CoordinatorConfig,
    evaluator: Option<&'a dyn Evaluator>,
    ordering: Option<&'a dyn OrderingHint>,
}

impl<'a, F, S> Coordinator<'a, F>
where
    F: Fn() -> S + Sync,
    S: DecisionSource,
{
    pub fn new(factory: F, space: HandSpace, config: CoordinatorConfig) -> Self {
        Self {
            factory,
            space,
            config,
            evaluator: None,
            ordering: None,
        }
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: &'a dyn Evaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    #[must_use]
    pub fn with_ordering(mut self, hint: &'a dyn OrderingHint) -> Self {
        self.ordering = Some(hint);
        self
    }

    /// Combination indices for this run: the full space, or a deterministic
    /// sample of it.
    #[allow(clippy::cast_possible_truncation)]
    pub fn plan_indices(&self) -> Vec<u64> {
        let total = self.space.combination_count();
        match self.config.sample {
            Some(spec) if spec.count < total => {
                let mut rng = Pcg64::seed_from_u64(spec.seed);
                let mut picked =
                    rand::seq::index::sample(&mut rng, total as usize, spec.count as usize)
                        .into_iter()
                        .map(|i| i as u64)
                        .collect::<Vec<_>>();
                picked.sort_unstable();
                picked
            }
            _ => (0..total).collect(),
        }
    }

    /// Run the whole space and merge the results.
    pub fn run(&self) -> RunReport {
        let indices = self.plan_indices();
        let assigned = indices.len() as u64;
        let batches = partition(&indices, self.config.workers);

        if self.config.progress {
            eprintln!(
                "[coordinator] {} of {} combinations across {} workers",
                assigned,
                self.space.combination_count(),
                batches.len()
            );
        }

        let done = Arc::new(AtomicU64::new(0));
        let ticker_stop = Arc::new(AtomicBool::new(false));
        let ticker = self.config.progress.then(|| {
            let bar = ProgressBar::new(assigned);
            bar.set_style(
                ProgressStyle::with_template(
                    "[{elapsed_precise}] hands {bar:40.cyan/blue} {pos}/{len} eta {eta}",
                )
                .unwrap()
                .progress_chars("=>-"),
            );
            let done = Arc::clone(&done);
            let stop = Arc::clone(&ticker_stop);
            let bar_bg = bar.clone();
            let join = thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    bar_bg.set_position(done.load(Ordering::Relaxed));
                    thread::sleep(Duration::from_millis(200));
                }
            });
            (bar, join)
        });

        let results: Vec<WorkerReport> = batches
            .into_par_iter()
            .enumerate()
            .map(|(worker, batch)| {
                let assigned = batch.len() as u64;
                // A panicking worker loses its batch, nothing else.
                catch_unwind(AssertUnwindSafe(|| self.run_worker(worker, &batch, &done)))
                    .unwrap_or_else(|_| WorkerReport::poisoned(worker, assigned))
            })
            .collect();

        if let Some((bar, join)) = ticker {
            ticker_stop.store(true, Ordering::Relaxed);
            join.join().ok();
            bar.finish_and_clear();
        }

        let mut hands: Vec<HandReport> = Vec::with_capacity(assigned as usize);
        let mut stats = PassStats::default();
        let mut tt_stats = TtStats::default();
        let mut completed = 0u64;
        let mut failed_workers = Vec::new();

        for report in results {
            if report.failed {
                failed_workers.push(report.worker);
            }
            completed += report.completed;
            stats.absorb(&report.stats);
            tt_stats.absorb(&report.tt_stats);
            hands.extend(report.hands);
        }
        hands.sort_by_key(|h| h.index);
        failed_workers.sort_unstable();

        if self.config.progress {
            eprintln!(
                "[coordinator] done: {completed}/{assigned} hands, {} paths, tt hit-rate {:.3}",
                stats.paths,
                tt_stats.hit_rate()
            );
        }

        RunReport {
            hands,
            stats,
            tt_stats,
            assigned,
            completed,
            failed_workers,
        }
    }

    fn make_tt(&self) -> InMemoryTt {
        match self.config.tt_budget_mib {
            Some(mib) => InMemoryTt::with_budget_mib(mib),
            None => InMemoryTt::default(),
        }
    }

    fn run_worker(&self, worker: usize, batch: &[u64], done: &AtomicU64) -> WorkerReport {
        let mut source = (self.factory)();
        let mut tt = self.make_tt();
        let mut hands = Vec::with_capacity(batch.len());
        let mut stats = PassStats::default();
        let mut completed = 0u64;

        for &index in batch {
            if self.config.cancel.is_cancelled() {
                break;
            }
            let hand = self.space.combination_at(index);
            let mut engine =
                Enumerator::new(source, StartConfig::new(hand.clone()), self.config.zobrist_seed)
                    .with_tt(tt)
                    .with_cancel(self.config.cancel.clone());
            if let Some(ev) = self.evaluator {
                engine = engine.with_evaluator(ev);
            }
            if let Some(hint) = self.ordering {
                engine = engine.with_ordering(hint);
            }

            let mut controller = DeepeningController::new(engine, self.config.max_depth);
            let outcome = controller.search(&self.config.criteria);
            let (recovered_source, recovered_tt) = controller.into_engine().into_parts();
            tt = recovered_tt;
            source = match outcome {
                Ok(search) => {
                    stats.absorb(&search.stats);
                    hands.push(HandReport { index, hand, search: Some(search), error: None });
                    recovered_source
                }
                Err(err) => {
                    // The source may be wedged mid-path; rebuild it so the
                    // failure stays confined to this hand.
                    hands.push(HandReport { index, hand, search: None, error: Some(err.to_string()) });
                    (self.factory)()
                }
            };
            completed += 1;
            done.fetch_add(1, Ordering::Relaxed);
        }

        WorkerReport {
            worker,
            assigned: batch.len() as u64,
            completed,
            failed: false,
            hands,
            stats,
            tt_stats: tt.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binomial_basics() {
        assert_eq!(binomial(10, 3), 120);
        assert_eq!(binomial(5, 0), 1);
        assert_eq!(binomial(5, 5), 1);
        assert_eq!(binomial(4, 6), 0);
        assert_eq!(binomial(52, 5), 2_598_960);
    }

    #[test]
    fn unranking_is_lexicographic_and_gap_free() {
        let space = HandSpace::new(vec![1, 2, 3, 4, 5], 3);
        assert_eq!(space.combination_count(), 10);
        let all: Vec<Vec<CardCode>> =
            (0..space.combination_count()).map(|i| space.combination_at(i)).collect();
        assert_eq!(all[0], vec![1, 2, 3]);
        assert_eq!(all[9], vec![3, 4, 5]);
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted, "index order is lexicographic");
        sorted.dedup();
        assert_eq!(sorted.len(), 10, "all combinations distinct");
    }

    #[test]
    fn partition_is_complete_and_disjoint() {
        let indices: Vec<u64> = (0..120).collect();
        let batches = partition(&indices, 4);
        assert_eq!(batches.len(), 4);
        let mut seen: Vec<u64> = batches.iter().flatten().copied().collect();
        assert_eq!(seen.len(), 120);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 120, "every index exactly once");
        for batch in &batches {
            assert_eq!(batch.len(), 30);
        }
    }

    #[test]
    fn sampling_is_deterministic_and_sorted() {
        let space = HandSpace::new((1..=10).collect(), 3);
        let config = CoordinatorConfig {
            sample: Some(SampleSpec { count: 17, seed: 7 }),
            ..CoordinatorConfig::default()
        };
        let make = || crate::script::ScriptedSource::new(crate::script::ScriptBuilder::new().build());
        let c1 = Coordinator::new(make, space.clone(), config.clone());
        let c2 = Coordinator::new(make, space, config);
        let p1 = c1.plan_indices();
        let p2 = c2.plan_indices();
        assert_eq!(p1, p2);
        assert_eq!(p1.len(), 17);
        assert!(p1.windows(2).all(|w| w[0] < w[1]));
    }
}
