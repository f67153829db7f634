use thiserror::Error;

use crate::types::{ActionId, CardCode, Zone};

/// Malformed positional snapshot. Poisoning the cache with a corrupted
/// signature is irrecoverable, so the builder rejects instead of absorbing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("equip pair ({equip}, {host}) references card {missing} absent from every zone")]
    DanglingEquip {
        equip: CardCode,
        host: CardCode,
        missing: CardCode,
    },
    #[error("card {code} equipped to itself")]
    SelfEquip { code: CardCode },
    #[error("two cards report the same physical slot {zone:?}/{seq}")]
    DuplicateSlot { zone: Zone, seq: u8 },
}

/// Failures raised by the decision source itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("start position rejected: {0}")]
    Start(String),
    #[error("decision source protocol violation: {0}")]
    Protocol(String),
    /// Shared engine state is corrupted; the whole pass must abort.
    #[error("corrupted engine state: {0}")]
    Corrupted(String),
}

/// Errors surfaced by a traversal pass. Budget exhaustion and failed action
/// applications are not errors: the former is a flagged partial result, the
/// latter is recorded state consulted on re-entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Source(#[from] SourceError),
    /// A previously applied action failed during forward replay of the same
    /// prefix. Replay is the only way back to a position, so this is fatal
    /// for the pass.
    #[error("replay diverged at ply {ply}: action {action:?} no longer resolves")]
    ReplayDiverged { ply: usize, action: ActionId },
}

impl SearchError {
    /// DataIntegrity failures abort only the current path; everything else
    /// aborts the pass.
    #[inline]
    pub fn aborts_path_only(&self) -> bool {
        matches!(self, SearchError::Signature(_))
    }
}
