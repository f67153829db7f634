use std::hash::BuildHasherDefault;
use std::mem::size_of;

use hashbrown::HashMap as HbHashMap;
use serde::{Deserialize, Serialize};

type FastHasher = BuildHasherDefault<ahash::AHasher>;
type FastMap = HbHashMap<u128, TtEntry, FastHasher>;

/// Cached outcome for an intermediate-state key.
///
/// Once stored, the result fields may only be replaced by a strictly better
/// result; `visits` is the only freely mutable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtEntry {
    /// Best known terminal value below this state.
    pub value: i16,
    /// Plies from this state to that terminal at caching time.
    pub terminal_distance: u8,
    /// Depth allowance actually searched when the entry was stored.
    pub searched: u8,
    /// Whether the subtree was exhausted (vs cut by the depth limit).
    pub exhausted: bool,
    /// Revisit counter, fed to the eviction policy.
    pub visits: u32,
}

impl TtEntry {
    /// Strict-improvement ordering: exhausted beats depth-capped, then a
    /// deeper searched allowance, then a higher value, then a shorter way to
    /// it. Ties do not supersede, so the incumbent survives (determinism).
    #[inline]
    pub fn supersedes(&self, old: &TtEntry) -> bool {
        if self.exhausted != old.exhausted {
            return self.exhausted;
        }
        if self.searched != old.searched {
            return self.searched > old.searched;
        }
        if self.value != old.value {
            return self.value > old.value;
        }
        self.terminal_distance < old.terminal_distance
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub overwrites: u64,
    pub rejected: u64,
    pub evictions: u64,
}

impl TtStats {
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn absorb(&mut self, other: &TtStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.stores += other.stores;
        self.overwrites += other.overwrites;
        self.rejected += other.rejected;
        self.evictions += other.evictions;
    }
}

pub trait TranspositionTable {
    /// Returns the entry or a miss indicator; never fails. Bumps the visit
    /// counter and hit/miss accounting.
    fn lookup(&mut self, key: u128) -> Option<TtEntry>;
    /// Insert on first occurrence; on a repeat key overwrite only if the new
    /// entry strictly supersedes the cached one.
    fn store(&mut self, key: u128, entry: TtEntry);
    fn clear(&mut self);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn stats(&self) -> TtStats;
}

/// Fraction of entries dropped per eviction sweep.
const EVICT_DENOM: usize = 10;

/// Bounded in-memory table. At capacity, a sweep evicts the ~10% of entries
/// with the least captured search work: ascending (terminal_distance,
/// visits), key as the deterministic tie-break. Evicting an entry on the
/// active call stack only costs recomputation.
#[derive(Debug)]
pub struct InMemoryTt {
    map: FastMap,
    capacity: usize,
    stats: TtStats,
}

impl Default for InMemoryTt {
    fn default() -> Self {
        Self::with_capacity(1 << 20)
    }
}

impl InMemoryTt {
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: FastMap::default(),
            capacity: capacity.max(EVICT_DENOM),
            stats: TtStats::default(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Approximate bytes per resident entry, map overhead included.
    #[inline]
    pub fn bytes_per_entry() -> usize {
        // key + entry + ~1/3 slack for the open-addressing table
        let payload = size_of::<u128>() + size_of::<TtEntry>();
        payload + payload / 3
    }

    /// Largest capacity fitting a byte budget. Returns at least the minimum
    /// evictable size.
    #[inline]
    pub fn capacity_for_budget_bytes(budget_bytes: usize) -> usize {
        (budget_bytes / Self::bytes_per_entry()).max(EVICT_DENOM)
    }

    /// Convenience: construct from a MiB budget.
    #[inline]
    pub fn with_budget_mib(mib: usize) -> Self {
        Self::with_capacity(Self::capacity_for_budget_bytes(mib.saturating_mul(1024 * 1024)))
    }

    /// Iterate resident entries, for export/persistence.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&u128, &TtEntry)> {
        self.map.iter()
    }

    /// Consume into a Vec for deterministic processing at the caller.
    #[inline]
    pub fn into_vec(self) -> Vec<(u128, TtEntry)> {
        self.map.into_iter().collect()
    }

    /// Bulk re-insert persisted entries, bypassing stats.
    pub fn absorb_entries(&mut self, entries: impl IntoIterator<Item = (u128, TtEntry)>) {
        for (key, entry) in entries {
            match self.map.get(&key) {
                Some(old) if !entry.supersedes(old) => {}
                _ => {
                    self.map.insert(key, entry);
                }
            }
        }
        if self.map.len() > self.capacity {
            self.evict();
        }
    }

    fn evict(&mut self) {
        let drop_count = (self.capacity / EVICT_DENOM).max(1);
        let mut ranked: Vec<(u8, u32, u128)> = self
            .map
            .iter()
            .map(|(k, e)| (e.terminal_distance, e.visits, *k))
            .collect();
        ranked.sort_unstable();
        for &(_, _, key) in ranked.iter().take(drop_count) {
            self.map.remove(&key);
        }
        self.stats.evictions += drop_count as u64;
    }
}

impl TranspositionTable for InMemoryTt {
    #[inline]
    fn lookup(&mut self, key: u128) -> Option<TtEntry> {
        if let Some(entry) = self.map.get_mut(&key) {
            entry.visits = entry.visits.saturating_add(1);
            self.stats.hits += 1;
            Some(*entry)
        } else {
            self.stats.misses += 1;
            None
        }
    }

    fn store(&mut self, key: u128, entry: TtEntry) {
        match self.map.get_mut(&key) {
            Some(old) => {
                if entry.supersedes(old) {
                    // visits survive replacement
                    let visits = old.visits;
                    *old = entry;
                    old.visits = visits;
                    self.stats.overwrites += 1;
                } else {
                    self.stats.rejected += 1;
                }
            }
            None => {
                if self.map.len() >= self.capacity {
                    self.evict();
                }
                self.map.insert(key, entry);
                self.stats.stores += 1;
            }
        }
    }

    #[inline]
    fn clear(&mut self) {
        self.map.clear();
        self.stats = TtStats::default();
    }

    #[inline]
    fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    fn stats(&self) -> TtStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: i16, dist: u8, searched: u8, exhausted: bool) -> TtEntry {
        TtEntry { value, terminal_distance: dist, searched, exhausted, visits: 0 }
    }

    #[test]
    fn first_store_inserts() {
        let mut tt = InMemoryTt::with_capacity(64);
        tt.store(1, entry(5, 2, 3, true));
        assert_eq!(tt.len(), 1);
        assert_eq!(tt.lookup(1).expect("hit").value, 5);
    }

    #[test]
    fn monotonic_improvement_only() {
        let mut tt = InMemoryTt::with_capacity(64);
        let good = entry(5, 2, 3, true);
        tt.store(1, good);
        // Worse on every axis: rejected.
        tt.store(1, entry(3, 4, 2, false));
        let got = tt.lookup(1).expect("hit");
        assert_eq!((got.value, got.terminal_distance), (5, 2));
        // Strictly better value: accepted.
        tt.store(1, entry(9, 2, 3, true));
        assert_eq!(tt.lookup(1).expect("hit").value, 9);
        assert_eq!(tt.stats().rejected, 1);
        assert_eq!(tt.stats().overwrites, 1);
    }

    #[test]
    fn ties_keep_incumbent() {
        let mut tt = InMemoryTt::with_capacity(64);
        let e = entry(5, 2, 3, true);
        tt.store(1, e);
        tt.store(1, e);
        assert_eq!(tt.stats().rejected, 1);
        assert_eq!(tt.stats().stores, 1);
    }

    #[test]
    fn exhausted_beats_capped_regardless_of_value() {
        let capped = entry(100, 1, 9, false);
        let exhausted = entry(-3, 5, 2, true);
        assert!(exhausted.supersedes(&capped));
        assert!(!capped.supersedes(&exhausted));
    }

    #[test]
    fn lookup_counts_and_visits() {
        let mut tt = InMemoryTt::with_capacity(64);
        assert!(tt.lookup(7).is_none());
        tt.store(7, entry(1, 1, 1, true));
        tt.lookup(7);
        tt.lookup(7);
        let s = tt.stats();
        assert_eq!((s.hits, s.misses), (2, 1));
        assert_eq!(tt.lookup(7).expect("hit").visits, 3);
        assert!((tt.stats().hit_rate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn eviction_bounds_size_and_drops_shallow_cold_entries() {
        let mut tt = InMemoryTt::with_capacity(20);
        for i in 0..20u128 {
            // Entry i has terminal_distance i: low ids are the shallow ones.
            tt.store(i, entry(0, u8::try_from(i).unwrap(), 1, true));
        }
        // Warm the deep half so visit counts also favor it.
        for i in 10..20u128 {
            tt.lookup(i);
        }
        tt.store(1000, entry(0, 30, 1, true));
        assert!(tt.len() <= 20, "capacity exceeded: {}", tt.len());
        assert!(tt.stats().evictions >= 2);
        // The shallowest, coldest entries went first.
        assert!(tt.lookup(0).is_none());
        assert!(tt.lookup(19).is_some());
        assert!(tt.lookup(1000).is_some());
    }

    #[test]
    fn budget_sizing_is_monotonic() {
        let small = InMemoryTt::capacity_for_budget_bytes(1 << 20);
        let large = InMemoryTt::capacity_for_budget_bytes(1 << 26);
        assert!(large > small);
        assert!(InMemoryTt::with_budget_mib(16).capacity() > 0);
    }
}
