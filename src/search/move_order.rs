use crate::signature::BoardSignature;
use crate::types::{ActionId, ActionKind};

/// Advisory move-ordering hint. Implementations may re-prioritize which
/// branch is tried first but must not add or drop actions: the contract is
/// reorder-in-place, so completeness is preserved by construction.
pub trait OrderingHint: Sync {
    fn prioritize(&self, sig: &BoardSignature, actions: &mut Vec<ActionId>);
}

/// Keeps the decision source's reported order untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOrdering;

impl OrderingHint for NullOrdering {
    #[inline]
    fn prioritize(&self, _sig: &BoardSignature, _actions: &mut Vec<ActionId>) {}
}

/// Category rank: development actions first, stop last.
#[inline]
fn kind_rank(kind: ActionKind) -> u8 {
    match kind {
        ActionKind::SpecialSummon => 0,
        ActionKind::Summon => 1,
        ActionKind::Activate => 2,
        ActionKind::Set => 3,
        ActionKind::Stop => 4,
    }
}

/// Deterministic default ordering:
/// - development categories before stop
/// - then ascending card code
/// - then ascending effect index
#[derive(Debug, Clone, Copy, Default)]
pub struct KindPriority;

impl OrderingHint for KindPriority {
    fn prioritize(&self, _sig: &BoardSignature, actions: &mut Vec<ActionId>) {
        actions.sort_by(|a, b| {
            kind_rank(a.kind)
                .cmp(&kind_rank(b.kind))
                .then(a.code.cmp(&b.code))
                .then(a.effect.cmp(&b.effect))
                .then(a.zone.cmp(&b.zone))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Zone;

    #[test]
    fn kind_priority_is_permutation_only() {
        let sig = BoardSignature::default();
        let a = ActionId::new(ActionKind::Activate, 30, 0, Zone::Hand);
        let s = ActionId::new(ActionKind::SpecialSummon, 99, 1, Zone::Extra);
        let stop = ActionId::stop();
        let mut actions = vec![stop, a, s];
        let mut expected_set = actions.clone();
        expected_set.sort();

        KindPriority.prioritize(&sig, &mut actions);

        assert_eq!(actions, vec![s, a, stop], "special summon first, stop last");
        let mut got_set = actions.clone();
        got_set.sort();
        assert_eq!(got_set, expected_set, "no action added or dropped");
    }

    #[test]
    fn null_ordering_keeps_reported_order() {
        let sig = BoardSignature::default();
        let a = ActionId::new(ActionKind::Activate, 30, 0, Zone::Hand);
        let b = ActionId::new(ActionKind::Summon, 10, 0, Zone::Hand);
        let mut actions = vec![a, b];
        NullOrdering.prioritize(&sig, &mut actions);
        assert_eq!(actions, vec![a, b]);
    }
}
