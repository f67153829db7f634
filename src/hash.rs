use std::hash::BuildHasherDefault;

use hashbrown::HashMap as HbHashMap;

use crate::signature::BoardSignature;
use crate::types::{ActionId, CardCode, Zone};

type FastHasher = BuildHasherDefault<ahash::AHasher>;
type CountMap<K> = HbHashMap<K, u16, FastHasher>;

/// SplitMix64 PRNG step for stable, fast token generation.
#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[inline]
fn token128_from_seed(seed: u64) -> u128 {
    // Two rounds to build 128 bits deterministically.
    let lo = splitmix64(seed ^ 0xC0FF_EE00_D15E_CAFE);
    let hi = splitmix64(seed ^ 0xDEAD_BEEF_F00D_FACE ^ lo.rotate_left(17));
    ((hi as u128) << 64) | (lo as u128)
}

// Domain tags (arbitrary but fixed)
const DOM_CARD: u64 = 0x5160_AC7E_0000_0001;
const DOM_EQUIP: u64 = 0x5160_AC7E_0000_00A0;
const DOM_ACTION: u64 = 0x5160_AC7E_0000_00C0;

/// Explicit Zobrist seed. Every worker in a parallel run must be built with
/// the same seed so independently computed keys are compatible without
/// inter-process coordination; it is never derived from process randomness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ZobristSeed(pub u64);

impl Default for ZobristSeed {
    fn default() -> Self {
        // Fixed crate-wide default; overridable per run.
        Self(0xC0A1_E5CE_D0_u64)
    }
}

/// Token for one (card, zone-role) pair. Assigned once per distinct pair and
/// identical across workers sharing the seed. `occurrence` distinguishes the
/// k-th copy of the same card in the same zone: zones are multisets, and
/// plain XOR would cancel duplicate copies out of the composite key.
#[inline]
pub fn z_token_card(seed: ZobristSeed, zone: Zone, code: CardCode, occurrence: u16) -> u128 {
    let s = DOM_CARD
        ^ seed.0.rotate_left(29)
        ^ ((zone.tag() as u64) << 40)
        ^ ((occurrence as u64) << 44)
        ^ (code as u64);
    token128_from_seed(s)
}

/// Token for one equip relationship (equipped-item, host) pair.
#[inline]
pub fn z_token_equip(seed: ZobristSeed, equip: CardCode, host: CardCode, occurrence: u16) -> u128 {
    let s = DOM_EQUIP
        ^ seed.0.rotate_left(29)
        ^ (equip as u64)
        ^ ((host as u64) << 32)
        ^ ((occurrence as u64) << 20);
    token128_from_seed(s)
}

/// Token for one legal-action identifier, used to refine a board key into an
/// intermediate-state key.
#[inline]
pub fn z_token_action(seed: ZobristSeed, action: &ActionId) -> u128 {
    let s = DOM_ACTION
        ^ seed.0.rotate_left(29)
        ^ (action.kind.tag() as u64)
        ^ ((action.code as u64) << 8)
        ^ ((action.effect as u64) << 44)
        ^ ((action.zone.tag() as u64) << 52);
    token128_from_seed(s)
}

/// Incremental Zobrist accumulator. XOR is its own inverse, so one element
/// add/remove/move updates the composite key in O(1); per-element occurrence
/// counters keep duplicate copies from cancelling.
#[derive(Debug, Clone, Default)]
pub struct IncrementalHash {
    seed: ZobristSeed,
    acc: u128,
    card_counts: CountMap<(u8, CardCode)>,
    equip_counts: CountMap<(CardCode, CardCode)>,
}

impl IncrementalHash {
    #[inline]
    pub fn new(seed: ZobristSeed) -> Self {
        Self {
            seed,
            acc: 0,
            card_counts: CountMap::default(),
            equip_counts: CountMap::default(),
        }
    }

    #[inline]
    pub fn value(&self) -> u128 {
        self.acc
    }

    pub fn add_card(&mut self, zone: Zone, code: CardCode) {
        let count = self.card_counts.entry((zone.tag(), code)).or_insert(0);
        self.acc ^= z_token_card(self.seed, zone, code, *count);
        *count += 1;
    }

    pub fn remove_card(&mut self, zone: Zone, code: CardCode) {
        let count = self.card_counts.entry((zone.tag(), code)).or_insert(0);
        debug_assert!(*count > 0, "removing a card that was never added");
        *count = count.saturating_sub(1);
        // XOR removal; identical to the matching add by reversibility.
        self.acc ^= z_token_card(self.seed, zone, code, *count);
    }

    #[inline]
    pub fn move_card(&mut self, from: Zone, to: Zone, code: CardCode) {
        self.remove_card(from, code);
        self.add_card(to, code);
    }

    pub fn add_equip(&mut self, equip: CardCode, host: CardCode) {
        let count = self.equip_counts.entry((equip, host)).or_insert(0);
        self.acc ^= z_token_equip(self.seed, equip, host, *count);
        *count += 1;
    }

    pub fn remove_equip(&mut self, equip: CardCode, host: CardCode) {
        let count = self.equip_counts.entry((equip, host)).or_insert(0);
        debug_assert!(*count > 0, "removing an equip pair that was never added");
        *count = count.saturating_sub(1);
        self.acc ^= z_token_equip(self.seed, equip, host, *count);
    }
}

/// Full recomputation of a board key from a canonical signature. Used to
/// initialize and to validate incremental updates during tests. Zone vectors
/// are sorted, so the k-th copy of a code is its position within the run of
/// equal codes.
pub fn recompute_board_key(seed: ZobristSeed, sig: &BoardSignature) -> u128 {
    let mut z: u128 = 0;
    for (zone, codes) in sig.zones() {
        let mut run: u16 = 0;
        let mut prev: Option<CardCode> = None;
        for &code in codes {
            run = if prev == Some(code) { run + 1 } else { 0 };
            prev = Some(code);
            z ^= z_token_card(seed, zone, code, run);
        }
    }
    let mut run: u16 = 0;
    let mut prev: Option<(CardCode, CardCode)> = None;
    for &pair in &sig.equips {
        run = if prev == Some(pair) { run + 1 } else { 0 };
        prev = Some(pair);
        z ^= z_token_equip(seed, pair.0, pair.1, run);
    }
    z
}

/// Key for an intermediate state: board key refined by the legal-action menu.
/// Two positions with identical contents but different menus must not share a
/// cache entry.
pub fn intermediate_key(seed: ZobristSeed, board_key: u128, actions: &[ActionId]) -> u128 {
    let mut z = board_key.rotate_left(1);
    for action in actions {
        z ^= z_token_action(seed, action);
    }
    z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_depend_on_zone_role() {
        let seed = ZobristSeed::default();
        assert_ne!(
            z_token_card(seed, Zone::Field, 1000, 0),
            z_token_card(seed, Zone::Graveyard, 1000, 0)
        );
    }

    #[test]
    fn tokens_depend_on_seed() {
        assert_ne!(
            z_token_card(ZobristSeed(1), Zone::Field, 1000, 0),
            z_token_card(ZobristSeed(2), Zone::Field, 1000, 0)
        );
    }

    #[test]
    fn add_remove_round_trips() {
        let seed = ZobristSeed::default();
        let mut h = IncrementalHash::new(seed);
        h.add_card(Zone::Hand, 42);
        h.add_card(Zone::Field, 7);
        let mid = h.value();
        h.add_card(Zone::Graveyard, 99);
        h.remove_card(Zone::Graveyard, 99);
        assert_eq!(h.value(), mid);
        h.remove_card(Zone::Field, 7);
        h.remove_card(Zone::Hand, 42);
        assert_eq!(h.value(), 0);
    }

    #[test]
    fn duplicate_copies_do_not_cancel() {
        let seed = ZobristSeed::default();
        let mut two = IncrementalHash::new(seed);
        two.add_card(Zone::Graveyard, 9);
        two.add_card(Zone::Graveyard, 9);
        assert_ne!(two.value(), 0, "two copies must not XOR away");

        let mut one = IncrementalHash::new(seed);
        one.add_card(Zone::Graveyard, 9);
        assert_ne!(two.value(), one.value());

        two.remove_card(Zone::Graveyard, 9);
        assert_eq!(two.value(), one.value(), "back to one copy");
    }

    #[test]
    fn move_equals_remove_then_add() {
        let seed = ZobristSeed::default();
        let mut a = IncrementalHash::new(seed);
        let mut b = IncrementalHash::new(seed);
        a.add_card(Zone::Hand, 5);
        b.add_card(Zone::Hand, 5);
        a.move_card(Zone::Hand, Zone::Field, 5);
        b.remove_card(Zone::Hand, 5);
        b.add_card(Zone::Field, 5);
        assert_eq!(a.value(), b.value());
    }

    #[test]
    fn menu_refines_board_key() {
        let seed = ZobristSeed::default();
        let board = 0xABCD_u128;
        let a = ActionId::new(crate::types::ActionKind::Activate, 10, 0, Zone::Hand);
        let b = ActionId::new(crate::types::ActionKind::Summon, 10, 0, Zone::Hand);
        let k1 = intermediate_key(seed, board, &[a]);
        let k2 = intermediate_key(seed, board, &[a, b]);
        assert_ne!(k1, k2);
        assert_ne!(k1, board);
    }
}
