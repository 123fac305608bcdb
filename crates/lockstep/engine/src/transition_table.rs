//! Transition table: the validated, frozen round graph
//!
//! A table is built once from a structured specification and never
//! changes afterwards. Every replica loads the same table and passes it
//! by reference into its engine; there are no mutators.

use lockstep_types::{
    Event, FsmSpecification, LockstepError, LockstepResult, Round, TransitionEdge,
    ValidationWarning,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write;

/// Immutable `(Round, Event) -> Round` lookup
#[derive(Clone, Debug)]
pub struct TransitionTable {
    spec: FsmSpecification,
    /// Index by domain pair
    edges: BTreeMap<(Round, Event), Round>,
    /// Findings reported at load time
    warnings: Vec<ValidationWarning>,
}

impl TransitionTable {
    /// Validate a specification and freeze it into a table
    pub fn load(spec: FsmSpecification) -> LockstepResult<Self> {
        let warnings = spec.validate()?;

        let edges = spec
            .transition_func
            .iter()
            .map(|e| ((e.from, e.event), e.to))
            .collect();

        for warning in &warnings {
            tracing::warn!(%warning, "Transition table loaded with warning");
        }
        tracing::info!(
            states = spec.states.len(),
            edges = spec.transition_func.len(),
            default_start = %spec.default_start_state,
            "Transition table loaded"
        );

        Ok(Self {
            spec,
            edges,
            warnings,
        })
    }

    /// The canonical round graph of the workflow
    pub fn canonical() -> LockstepResult<Self> {
        Self::load(FsmSpecification::canonical())
    }

    pub fn from_yaml_str(raw: &str) -> LockstepResult<Self> {
        Self::load(FsmSpecification::from_yaml_str(raw)?)
    }

    pub fn from_json_str(raw: &str) -> LockstepResult<Self> {
        Self::load(FsmSpecification::from_json_str(raw)?)
    }

    /// Look up the next round; undefined pairs are protocol violations
    pub fn next_round(&self, round: Round, event: Event) -> LockstepResult<Round> {
        self.edges
            .get(&(round, event))
            .copied()
            .ok_or(LockstepError::ProtocolViolation { round, event })
    }

    /// Events the round accepts, in alphabet order
    pub fn accepted_events(&self, round: Round) -> Vec<Event> {
        self.edges
            .range((round, Event::ALL[0])..=(round, Event::ALL[Event::ALL.len() - 1]))
            .map(|((_, event), _)| *event)
            .collect()
    }

    /// Exit edges of a round
    pub fn outgoing(&self, round: Round) -> Vec<TransitionEdge> {
        self.accepted_events(round)
            .into_iter()
            .filter_map(|event| {
                self.edges
                    .get(&(round, event))
                    .map(|to| TransitionEdge::new(round, event, *to))
            })
            .collect()
    }

    pub fn is_start(&self, round: Round) -> bool {
        self.spec.start_states.contains(&round)
    }

    pub fn is_final(&self, round: Round) -> bool {
        self.spec.final_states.contains(&round)
    }

    pub fn default_start(&self) -> Round {
        self.spec.default_start_state
    }

    pub fn start_states(&self) -> &BTreeSet<Round> {
        &self.spec.start_states
    }

    pub fn states(&self) -> &BTreeSet<Round> {
        &self.spec.states
    }

    pub fn alphabet(&self) -> &BTreeSet<Event> {
        &self.spec.alphabet_in
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    pub fn reachable_from(&self, round: Round) -> HashSet<Round> {
        self.spec.reachable_from(round)
    }

    /// The specification this table was loaded from
    pub fn to_specification(&self) -> FsmSpecification {
        self.spec.clone()
    }

    /// Render the graph in Graphviz dot syntax
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph lockstep {\n    rankdir=LR;\n");
        for round in &self.spec.states {
            let shape = if self.is_start(*round) {
                "doublecircle"
            } else if self.is_final(*round) {
                "box"
            } else {
                "ellipse"
            };
            let _ = writeln!(out, "    \"{}\" [shape={}];", round, shape);
        }
        for ((from, event), to) in &self.edges {
            let _ = writeln!(out, "    \"{}\" -> \"{}\" [label=\"{}\"];", from, to, event);
        }
        out.push_str("}\n");
        out
    }
}
