use serde::{Deserialize, Serialize};

use crate::error::SignatureError;
use crate::hash::{intermediate_key, IncrementalHash, ZobristSeed};
use crate::source::RawSnapshot;
use crate::types::{ActionId, CardCode, Zone};

/// Canonical fingerprint of a position's contents: per-zone sorted code
/// multisets plus sorted equip pairs. Equal up to permutation of elements
/// within a zone; the physical sub-slot a card occupies is not part of
/// equivalence. Two positions with equal signatures are interchangeable for
/// result reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BoardSignature {
    pub field: Vec<CardCode>,
    pub graveyard: Vec<CardCode>,
    pub hand: Vec<CardCode>,
    pub banished: Vec<CardCode>,
    pub extra: Vec<CardCode>,
    pub equips: Vec<(CardCode, CardCode)>,
}

impl BoardSignature {
    /// Zone contents in fixed tag order, for hashing and reporting.
    #[inline]
    pub fn zones(&self) -> [(Zone, &[CardCode]); 5] {
        [
            (Zone::Field, self.field.as_slice()),
            (Zone::Graveyard, self.graveyard.as_slice()),
            (Zone::Hand, self.hand.as_slice()),
            (Zone::Banished, self.banished.as_slice()),
            (Zone::Extra, self.extra.as_slice()),
        ]
    }

    #[inline]
    fn zone_mut(&mut self, zone: Zone) -> &mut Vec<CardCode> {
        match zone {
            Zone::Field => &mut self.field,
            Zone::Graveyard => &mut self.graveyard,
            Zone::Hand => &mut self.hand,
            Zone::Banished => &mut self.banished,
            Zone::Extra => &mut self.extra,
        }
    }

    #[inline]
    pub fn total_cards(&self) -> usize {
        self.zones().iter().map(|(_, codes)| codes.len()).sum()
    }

    #[inline]
    fn contains(&self, code: CardCode) -> bool {
        self.zones().iter().any(|(_, codes)| codes.contains(&code))
    }
}

/// A board signature refined by the currently legal action menu. Two
/// positions with identical contents but different menus are not safely
/// interchangeable mid-path, so this is the memoization key, not the board
/// signature alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntermediateState {
    pub board: BoardSignature,
    /// Menu in canonical sorted order (the source's reported order is a
    /// traversal concern, not an identity concern).
    pub actions: Vec<ActionId>,
    /// Zobrist key of the board contents alone.
    pub board_key: u128,
    /// Cache key: board key refined by the menu.
    pub key: u128,
}

/// Translates raw positional snapshots into canonical signature/state pairs.
///
/// Deterministic: semantically identical snapshots, whatever their internal
/// ordering, yield structurally equal signatures and equal keys. Malformed
/// snapshots are rejected rather than silently absorbed.
#[derive(Debug, Clone, Copy)]
pub struct SignatureBuilder {
    seed: ZobristSeed,
}

impl SignatureBuilder {
    #[inline]
    pub fn new(seed: ZobristSeed) -> Self {
        Self { seed }
    }

    #[inline]
    pub fn seed(&self) -> ZobristSeed {
        self.seed
    }

    /// Build the canonical signature and its board key.
    pub fn build(&self, snap: &RawSnapshot) -> Result<(BoardSignature, u128), SignatureError> {
        let mut sig = BoardSignature::default();
        let mut hash = IncrementalHash::new(self.seed);
        let mut slots: Vec<(u8, u8)> = Vec::with_capacity(snap.cards.len());

        for card in &snap.cards {
            let slot = (card.zone.tag(), card.seq);
            if slots.contains(&slot) {
                return Err(SignatureError::DuplicateSlot { zone: card.zone, seq: card.seq });
            }
            slots.push(slot);
            sig.zone_mut(card.zone).push(card.code);
            hash.add_card(card.zone, card.code);
        }

        for pair in &snap.equips {
            if pair.equip == pair.host {
                return Err(SignatureError::SelfEquip { code: pair.equip });
            }
            for code in [pair.equip, pair.host] {
                if !sig.contains(code) {
                    return Err(SignatureError::DanglingEquip {
                        equip: pair.equip,
                        host: pair.host,
                        missing: code,
                    });
                }
            }
            sig.equips.push((pair.equip, pair.host));
            hash.add_equip(pair.equip, pair.host);
        }

        // Canonical order inside every zone; XOR accumulation is already
        // order-independent, so the hash needs no re-fold.
        sig.field.sort_unstable();
        sig.graveyard.sort_unstable();
        sig.hand.sort_unstable();
        sig.banished.sort_unstable();
        sig.extra.sort_unstable();
        sig.equips.sort_unstable();

        Ok((sig, hash.value()))
    }

    /// Build the full intermediate state: signature plus canonical menu and
    /// both keys.
    pub fn intermediate(
        &self,
        snap: &RawSnapshot,
        actions: &[ActionId],
    ) -> Result<IntermediateState, SignatureError> {
        let (board, board_key) = self.build(snap)?;
        let mut menu = actions.to_vec();
        // The menu is a set: canonical order, and a repeated identifier must
        // not cancel out of the XOR-combined key.
        menu.sort_unstable();
        menu.dedup();
        let key = intermediate_key(self.seed, board_key, &menu);
        Ok(IntermediateState { board, actions: menu, board_key, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{RawCard, RawEquip};
    use crate::types::ActionKind;

    fn snap(cards: &[(CardCode, Zone, u8)], equips: &[(CardCode, CardCode)]) -> RawSnapshot {
        RawSnapshot {
            cards: cards.iter().map(|&(code, zone, seq)| RawCard { code, zone, seq }).collect(),
            equips: equips.iter().map(|&(equip, host)| RawEquip { equip, host }).collect(),
        }
    }

    #[test]
    fn permuted_snapshots_are_equal() {
        let b = SignatureBuilder::new(ZobristSeed::default());
        let s1 = snap(
            &[(10, Zone::Field, 0), (20, Zone::Field, 3), (30, Zone::Hand, 1)],
            &[(10, 20)],
        );
        let s2 = snap(
            &[(30, Zone::Hand, 1), (20, Zone::Field, 3), (10, Zone::Field, 0)],
            &[(10, 20)],
        );
        let (sig1, k1) = b.build(&s1).expect("build s1");
        let (sig2, k2) = b.build(&s2).expect("build s2");
        assert_eq!(sig1, sig2);
        assert_eq!(k1, k2);
    }

    #[test]
    fn slot_identity_not_part_of_equivalence() {
        let b = SignatureBuilder::new(ZobristSeed::default());
        let s1 = snap(&[(10, Zone::Field, 0)], &[]);
        let s2 = snap(&[(10, Zone::Field, 4)], &[]);
        let (sig1, k1) = b.build(&s1).expect("build s1");
        let (sig2, k2) = b.build(&s2).expect("build s2");
        assert_eq!(sig1, sig2, "sub-slot must not distinguish positions");
        assert_eq!(k1, k2);
    }

    #[test]
    fn dangling_equip_is_rejected() {
        let b = SignatureBuilder::new(ZobristSeed::default());
        let s = snap(&[(10, Zone::Field, 0)], &[(10, 99)]);
        match b.build(&s) {
            Err(SignatureError::DanglingEquip { missing, .. }) => assert_eq!(missing, 99),
            other => panic!("expected DanglingEquip, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_slot_is_rejected() {
        let b = SignatureBuilder::new(ZobristSeed::default());
        let s = snap(&[(10, Zone::Field, 2), (11, Zone::Field, 2)], &[]);
        assert!(matches!(
            b.build(&s),
            Err(SignatureError::DuplicateSlot { zone: Zone::Field, seq: 2 })
        ));
    }

    #[test]
    fn incremental_matches_recompute() {
        let b = SignatureBuilder::new(ZobristSeed::default());
        let s = snap(
            &[(10, Zone::Field, 0), (20, Zone::Graveyard, 0), (30, Zone::Extra, 2)],
            &[],
        );
        let (sig, key) = b.build(&s).expect("build");
        assert_eq!(key, crate::hash::recompute_board_key(ZobristSeed::default(), &sig));
    }

    #[test]
    fn duplicate_copies_are_distinguished() {
        let b = SignatureBuilder::new(ZobristSeed::default());
        let two = snap(&[(9, Zone::Graveyard, 0), (9, Zone::Graveyard, 1)], &[]);
        let one = snap(&[(9, Zone::Graveyard, 0)], &[]);
        let (sig2, k2) = b.build(&two).expect("two copies");
        let (sig1, k1) = b.build(&one).expect("one copy");
        assert_eq!(sig2.graveyard, vec![9, 9]);
        assert_ne!(sig1, sig2);
        assert_ne!(k1, k2, "multiset hashing must see the second copy");
        assert_eq!(k2, crate::hash::recompute_board_key(ZobristSeed::default(), &sig2));
    }

    #[test]
    fn menu_order_does_not_change_key() {
        let b = SignatureBuilder::new(ZobristSeed::default());
        let s = snap(&[(10, Zone::Hand, 0)], &[]);
        let a1 = ActionId::new(ActionKind::Activate, 10, 0, Zone::Hand);
        let a2 = ActionId::new(ActionKind::Set, 10, 0, Zone::Hand);
        let i1 = b.intermediate(&s, &[a1, a2]).expect("i1");
        let i2 = b.intermediate(&s, &[a2, a1]).expect("i2");
        assert_eq!(i1.key, i2.key);
        assert_eq!(i1.actions, i2.actions);
    }

    #[test]
    fn different_menu_different_key() {
        let b = SignatureBuilder::new(ZobristSeed::default());
        let s = snap(&[(10, Zone::Hand, 0)], &[]);
        let a1 = ActionId::new(ActionKind::Activate, 10, 0, Zone::Hand);
        let a2 = ActionId::new(ActionKind::Set, 10, 0, Zone::Hand);
        let i1 = b.intermediate(&s, &[a1]).expect("i1");
        let i2 = b.intermediate(&s, &[a1, a2]).expect("i2");
        assert_eq!(i1.board_key, i2.board_key);
        assert_ne!(i1.key, i2.key);
    }
}
