#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // may be revisited

pub mod types;
pub mod error;
pub mod source;
pub mod script;
pub mod hash;
pub mod signature;
pub mod score;

pub mod search;

pub mod persist;
pub mod report;

// Re-exports: stable minimal API surface for external callers
pub use crate::error::{SearchError, SignatureError, SourceError};
pub use crate::hash::{IncrementalHash, ZobristSeed};
pub use crate::score::{BoardPresence, Evaluator};
pub use crate::signature::{BoardSignature, IntermediateState, SignatureBuilder};
pub use crate::source::{ApplyOutcome, DecisionSource, RawCard, RawEquip, RawSnapshot, StartConfig};
pub use crate::types::{ActionId, ActionKind, CardCode, Zone};

pub use crate::search::dfs::{Enumerator, PassReport, TerminalReason, TerminalState};
pub use crate::search::deepen::{DeepeningController, SearchReport, StopCriteria};
pub use crate::search::parallel::{Coordinator, CoordinatorConfig, HandSpace, RunReport};
pub use crate::search::tt::{InMemoryTt, TranspositionTable, TtEntry, TtStats};
pub use crate::search::{CancelToken, SearchBudget};
