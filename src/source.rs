use serde::{Deserialize, Serialize};

use crate::error::{SearchError, SourceError};
use crate::types::{ActionId, CardCode, Zone};

/// Opening-position configuration handed to the decision source. The
/// coordinator enumerates these; one config is one root of exploration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StartConfig {
    /// Starting hand, in the order the coordinator generated it.
    pub hand: Vec<CardCode>,
}

impl StartConfig {
    #[inline]
    pub fn new(hand: Vec<CardCode>) -> Self {
        Self { hand }
    }
}

/// One occupant in a raw positional report: card code, zone, and the
/// physical sub-slot it sits in. `seq` is carried for integrity checks but
/// is deliberately not part of signature equivalence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCard {
    pub code: CardCode,
    pub zone: Zone,
    pub seq: u8,
}

/// One equip relationship: `equip` is attached to `host`. Both codes must be
/// present in some zone of the same snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEquip {
    pub equip: CardCode,
    pub host: CardCode,
}

/// Raw positional report from the decision source. Unvalidated; the
/// signature builder is the component that rejects malformed ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub cards: Vec<RawCard>,
    pub equips: Vec<RawEquip>,
}

impl RawSnapshot {
    #[inline]
    pub fn occupant(code: CardCode, zone: Zone, seq: u8) -> RawCard {
        RawCard { code, zone, seq }
    }
}

/// Result of applying one offered action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The action resolved; the source is now at the child position.
    Applied,
    /// The offered action turned out unresolvable. Recoverable: the caller
    /// records it as failed for this exact state and never retries it there.
    Unresolved,
}

/// External rules engine, consumed through queries only. There is no
/// save/restore: forward replay from the configured start is the only way
/// back to a prior position.
pub trait DecisionSource {
    /// Reset to the opening position described by `config`.
    fn start(&mut self, config: &StartConfig) -> Result<(), SourceError>;

    /// Legal actions at the current position, in the source's reported order.
    fn legal_actions(&mut self) -> Result<Vec<ActionId>, SourceError>;

    /// Apply one offered action.
    fn apply(&mut self, action: &ActionId) -> Result<ApplyOutcome, SourceError>;

    /// Raw positional report for the current position.
    fn snapshot(&mut self) -> Result<RawSnapshot, SourceError>;
}

/// Forward replay: reset to the start and re-apply `path` in order.
///
/// A previously applied action failing here means the source is not
/// deterministic over replays, which breaks the traversal model; that
/// surfaces as [`SearchError::ReplayDiverged`].
pub fn replay<S: DecisionSource + ?Sized>(
    source: &mut S,
    config: &StartConfig,
    path: &[ActionId],
) -> Result<(), SearchError> {
    source.start(config)?;
    for (ply, action) in path.iter().enumerate() {
        match source.apply(action)? {
            ApplyOutcome::Applied => {}
            ApplyOutcome::Unresolved => {
                return Err(SearchError::ReplayDiverged { ply, action: *action })
            }
        }
    }
    Ok(())
}
