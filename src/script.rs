//! Deterministic scripted decision source.
//!
//! A [`Script`] is a finite position graph: nodes carry a raw snapshot and an
//! ordered action menu, edges say what applying an action does. Used as the
//! test double for the external rules engine and for runnable demos; it obeys
//! the same forward-replay-only contract the real engine has.

use std::collections::HashMap;

use crate::error::SourceError;
use crate::source::{ApplyOutcome, DecisionSource, RawSnapshot, StartConfig};
use crate::types::{ActionId, CardCode};

#[derive(Debug, Clone)]
struct ScriptNode {
    snapshot: RawSnapshot,
    menu: Vec<ActionId>,
}

/// Outcome of applying an action at a given node.
#[derive(Debug, Clone, Copy)]
enum Transition {
    Goto(usize),
    /// Offered but unresolvable; reported as a recoverable failure.
    Unresolved,
    /// Simulates corrupted shared engine state.
    Corrupt,
}

/// Immutable position graph shared by any number of source instances.
#[derive(Debug, Clone, Default)]
pub struct Script {
    nodes: Vec<ScriptNode>,
    edges: HashMap<(usize, ActionId), Transition>,
    starts: HashMap<Vec<CardCode>, usize>,
    default_start: usize,
}

/// Builder for [`Script`]. Node ids are assignment order.
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    script: Script,
}

impl ScriptBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a position node; returns its id.
    pub fn node(&mut self, snapshot: RawSnapshot, menu: Vec<ActionId>) -> usize {
        self.script.nodes.push(ScriptNode { snapshot, menu });
        self.script.nodes.len() - 1
    }

    /// Applying `action` at `from` lands on `to`.
    pub fn edge(&mut self, from: usize, action: ActionId, to: usize) -> &mut Self {
        self.script.edges.insert((from, action), Transition::Goto(to));
        self
    }

    /// Applying `action` at `from` turns out unresolvable.
    pub fn failing(&mut self, from: usize, action: ActionId) -> &mut Self {
        self.script.edges.insert((from, action), Transition::Unresolved);
        self
    }

    /// Applying `action` at `from` corrupts the engine.
    pub fn corrupting(&mut self, from: usize, action: ActionId) -> &mut Self {
        self.script.edges.insert((from, action), Transition::Corrupt);
        self
    }

    /// Route a specific starting hand to its entry node. Unrouted hands use
    /// node 0.
    pub fn start_for(&mut self, hand: Vec<CardCode>, node: usize) -> &mut Self {
        self.script.starts.insert(hand, node);
        self
    }

    pub fn build(self) -> Script {
        self.script
    }
}

/// One live traversal over a script. Holds only a cursor; no history, no
/// save/restore, exactly like the engine being modeled.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    script: Script,
    cursor: Option<usize>,
}

impl ScriptedSource {
    #[inline]
    pub fn new(script: Script) -> Self {
        Self { script, cursor: None }
    }

    fn node(&self) -> Result<&ScriptNode, SourceError> {
        let at = self
            .cursor
            .ok_or_else(|| SourceError::Protocol("query before start".into()))?;
        self.script
            .nodes
            .get(at)
            .ok_or_else(|| SourceError::Protocol(format!("cursor at unknown node {at}")))
    }
}

impl DecisionSource for ScriptedSource {
    fn start(&mut self, config: &StartConfig) -> Result<(), SourceError> {
        if self.script.nodes.is_empty() {
            return Err(SourceError::Start("empty script".into()));
        }
        let entry = self
            .script
            .starts
            .get(&config.hand)
            .copied()
            .unwrap_or(self.script.default_start);
        self.cursor = Some(entry);
        Ok(())
    }

    fn legal_actions(&mut self) -> Result<Vec<ActionId>, SourceError> {
        Ok(self.node()?.menu.clone())
    }

    fn apply(&mut self, action: &ActionId) -> Result<ApplyOutcome, SourceError> {
        // A stop token never moves the position.
        if action.is_stop() {
            self.node()?;
            return Ok(ApplyOutcome::Applied);
        }
        let at = self
            .cursor
            .ok_or_else(|| SourceError::Protocol("apply before start".into()))?;
        match self.script.edges.get(&(at, *action)) {
            Some(Transition::Goto(to)) => {
                self.cursor = Some(*to);
                Ok(ApplyOutcome::Applied)
            }
            Some(Transition::Unresolved) => Ok(ApplyOutcome::Unresolved),
            Some(Transition::Corrupt) => {
                Err(SourceError::Corrupted(format!("scripted corruption at node {at}")))
            }
            None => Err(SourceError::Protocol(format!(
                "action {action:?} was not offered at node {at}"
            ))),
        }
    }

    fn snapshot(&mut self) -> Result<RawSnapshot, SourceError> {
        Ok(self.node()?.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::replay;
    use crate::types::{ActionKind, Zone};

    fn act(code: CardCode) -> ActionId {
        ActionId::new(ActionKind::Activate, code, 0, Zone::Hand)
    }

    fn snap_with(code: CardCode) -> RawSnapshot {
        RawSnapshot {
            cards: vec![crate::source::RawCard { code, zone: Zone::Field, seq: 0 }],
            equips: vec![],
        }
    }

    #[test]
    fn start_and_walk() {
        let mut sb = ScriptBuilder::new();
        let n0 = sb.node(snap_with(1), vec![act(1)]);
        let n1 = sb.node(snap_with(2), vec![]);
        sb.edge(n0, act(1), n1);
        let mut src = ScriptedSource::new(sb.build());

        let cfg = StartConfig::new(vec![1]);
        src.start(&cfg).expect("start");
        assert_eq!(src.legal_actions().expect("menu"), vec![act(1)]);
        assert_eq!(src.apply(&act(1)).expect("apply"), ApplyOutcome::Applied);
        assert!(src.legal_actions().expect("menu").is_empty());
    }

    #[test]
    fn replay_resets_then_reapplies() {
        let mut sb = ScriptBuilder::new();
        let n0 = sb.node(snap_with(1), vec![act(1)]);
        let n1 = sb.node(snap_with(2), vec![act(2)]);
        let n2 = sb.node(snap_with(3), vec![]);
        sb.edge(n0, act(1), n1).edge(n1, act(2), n2);
        let mut src = ScriptedSource::new(sb.build());

        let cfg = StartConfig::new(vec![1]);
        replay(&mut src, &cfg, &[act(1), act(2)]).expect("replay");
        assert_eq!(src.snapshot().expect("snap"), snap_with(3));
        // Replaying a shorter prefix walks back.
        replay(&mut src, &cfg, &[act(1)]).expect("replay prefix");
        assert_eq!(src.snapshot().expect("snap"), snap_with(2));
    }

    #[test]
    fn unresolved_and_corrupt_edges() {
        let mut sb = ScriptBuilder::new();
        let n0 = sb.node(snap_with(1), vec![act(1), act(2)]);
        sb.failing(n0, act(1)).corrupting(n0, act(2));
        let mut src = ScriptedSource::new(sb.build());

        src.start(&StartConfig::new(vec![])).expect("start");
        assert_eq!(src.apply(&act(1)).expect("apply"), ApplyOutcome::Unresolved);
        assert!(matches!(src.apply(&act(2)), Err(SourceError::Corrupted(_))));
    }
}
