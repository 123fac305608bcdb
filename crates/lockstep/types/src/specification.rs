//! Structured FSM specification
//!
//! The declarative form of the round graph, with the same six fields
//! every replica loads at startup:
//!
//! ```yaml
//! alphabet_in: [DONE, NO_MAJORITY, ...]
//! default_start_state: RegistrationStartupRound
//! final_states: []
//! start_states: [RegistrationRound, RegistrationStartupRound]
//! states: [ActionDecisionRound, ...]
//! transition_func:
//!   (RegistrationStartupRound, DONE): LoadDatabaseRound
//! ```
//!
//! A specification is only data. [`FsmSpecification::validate`] checks the
//! structural invariants; the engine refuses to load a table that fails.

use crate::{canonical_edges, Event, LockstepError, LockstepResult, Round, TransitionEdge};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// The declarative round graph
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsmSpecification {
    /// Every event symbol the table may reference
    pub alphabet_in: BTreeSet<Event>,
    /// The round a replica enters unless configured otherwise
    pub default_start_state: Round,
    /// Terminal rounds; empty means perpetual operation
    #[serde(default)]
    pub final_states: BTreeSet<Round>,
    /// Rounds a replica may start from
    pub start_states: BTreeSet<Round>,
    /// Every round of the graph
    pub states: BTreeSet<Round>,
    /// `(Round, EVENT) -> Round` entries, in document order.
    ///
    /// Kept as a list so that duplicate keys survive parsing and are
    /// reported by validation.
    #[serde(with = "transition_func")]
    pub transition_func: Vec<TransitionEdge>,
}

impl FsmSpecification {
    /// The canonical round graph of the workflow
    pub fn canonical() -> Self {
        Self {
            alphabet_in: Event::ALL.into_iter().collect(),
            default_start_state: Round::DEFAULT_START,
            final_states: BTreeSet::new(),
            start_states: Round::START_STATES.into_iter().collect(),
            states: Round::ALL.into_iter().collect(),
            transition_func: canonical_edges(),
        }
    }

    /// Build a specification from an edge list, deriving states and alphabet
    pub fn from_edges(
        default_start_state: Round,
        start_states: impl IntoIterator<Item = Round>,
        edges: Vec<TransitionEdge>,
    ) -> Self {
        let mut states: BTreeSet<Round> = BTreeSet::new();
        let mut alphabet_in = BTreeSet::new();
        for edge in &edges {
            states.insert(edge.from);
            states.insert(edge.to);
            alphabet_in.insert(edge.event);
        }
        let start_states: BTreeSet<Round> = start_states.into_iter().collect();
        states.extend(start_states.iter().copied());
        states.insert(default_start_state);

        Self {
            alphabet_in,
            default_start_state,
            final_states: BTreeSet::new(),
            start_states,
            states,
            transition_func: edges,
        }
    }

    pub fn from_yaml_str(raw: &str) -> LockstepResult<Self> {
        serde_yaml::from_str(raw).map_err(|e| LockstepError::Specification(e.to_string()))
    }

    pub fn from_json_str(raw: &str) -> LockstepResult<Self> {
        serde_json::from_str(raw).map_err(|e| LockstepError::Specification(e.to_string()))
    }

    pub fn to_yaml_string(&self) -> LockstepResult<String> {
        serde_yaml::to_string(self).map_err(|e| LockstepError::Specification(e.to_string()))
    }

    pub fn to_json_string(&self) -> LockstepResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LockstepError::Specification(e.to_string()))
    }

    /// Edges leaving a round
    pub fn outgoing_edges(&self, round: Round) -> Vec<&TransitionEdge> {
        self.transition_func
            .iter()
            .filter(|e| e.from == round)
            .collect()
    }

    /// Total number of edges
    pub fn edge_count(&self) -> usize {
        self.transition_func.len()
    }

    /// Validate the specification for structural correctness.
    ///
    /// Fails on the first violated invariant; returns the non-fatal
    /// findings otherwise.
    pub fn validate(&self) -> LockstepResult<Vec<ValidationWarning>> {
        if self.states.is_empty() {
            return Err(LockstepError::Specification(
                "specification must declare at least one state".into(),
            ));
        }

        if !self.start_states.contains(&self.default_start_state) {
            return Err(LockstepError::Specification(format!(
                "default start state {} is not listed in start_states",
                self.default_start_state
            )));
        }

        for round in self.start_states.iter().chain(self.final_states.iter()) {
            if !self.states.contains(round) {
                return Err(LockstepError::Specification(format!(
                    "{} is not listed in states",
                    round
                )));
            }
        }

        let mut seen: HashMap<(Round, Event), Round> = HashMap::new();
        for edge in &self.transition_func {
            if !self.states.contains(&edge.from) || !self.states.contains(&edge.to) {
                return Err(LockstepError::Specification(format!(
                    "edge {} references a round not listed in states",
                    edge
                )));
            }
            if !self.alphabet_in.contains(&edge.event) {
                return Err(LockstepError::Specification(format!(
                    "edge {} uses {} which is not in alphabet_in",
                    edge, edge.event
                )));
            }
            if let Some(first) = seen.insert((edge.from, edge.event), edge.to) {
                return Err(LockstepError::DuplicateTransition {
                    round: edge.from,
                    event: edge.event,
                    first,
                    second: edge.to,
                });
            }
        }

        for round in &self.states {
            if self.final_states.contains(round) {
                continue;
            }
            if !self.transition_func.iter().any(|e| e.from == *round) {
                return Err(LockstepError::DeadEndState(*round));
            }
        }

        let mut reachable = HashSet::new();
        for start in &self.start_states {
            reachable.extend(self.reachable_from(*start));
        }
        if let Some(orphan) = self.states.iter().find(|r| !reachable.contains(*r)) {
            return Err(LockstepError::UnreachableState(*orphan));
        }

        let mut warnings = Vec::new();

        let used: HashSet<Event> = self.transition_func.iter().map(|e| e.event).collect();
        for event in &self.alphabet_in {
            if !used.contains(event) {
                warnings.push(ValidationWarning::UnusedEvent(*event));
            }
        }

        for round in &self.states {
            if let Some(symbol) = round.timeout_event() {
                if !seen.contains_key(&(*round, symbol)) {
                    warnings.push(ValidationWarning::UnroutedTimeout {
                        round: *round,
                        event: symbol,
                    });
                }
            }
        }

        Ok(warnings)
    }

    /// Find all rounds reachable from a given round via BFS
    pub fn reachable_from(&self, start: Round) -> HashSet<Round> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            if visited.insert(current) {
                for edge in self.outgoing_edges(current) {
                    if !visited.contains(&edge.to) {
                        queue.push_back(edge.to);
                    }
                }
            }
        }

        visited
    }
}

/// A non-fatal validation finding
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationWarning {
    /// An alphabet symbol no edge references
    UnusedEvent(Event),
    /// A round whose timeout symbol has no edge; an injected timeout
    /// would be a protocol violation
    UnroutedTimeout { round: Round, event: Event },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::UnusedEvent(event) => {
                write!(f, "event {} is never referenced by a transition", event)
            }
            ValidationWarning::UnroutedTimeout { round, event } => {
                write!(f, "{} has no transition for its timeout {}", round, event)
            }
        }
    }
}

mod transition_func {
    use crate::{Round, TransitionEdge, TransitionKey};
    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(edges: &[TransitionEdge], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(edges.iter().map(|e| (e.key(), e.to)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<TransitionEdge>, D::Error> {
        struct EdgeListVisitor;

        impl<'de> Visitor<'de> for EdgeListVisitor {
            type Value = Vec<TransitionEdge>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of \"(Round, EVENT)\" keys to rounds")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut edges = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, to)) = map.next_entry::<TransitionKey, Round>()? {
                    edges.push(TransitionEdge::new(key.round, key.event, to));
                }
                Ok(edges)
            }
        }

        deserializer.deserialize_map(EdgeListVisitor)
    }
}
