//! # Gossip Dissemination
//!
//! Synchronous flooding of identity records over the overlay. Each round reads
//! only the previous round's record sets and writes a fresh copy, so no node
//! observes a same-round partial update.

use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::overlay::OverlayGraph;
use crate::topology::{Node, NodeIndex, TrustGraph};
use crate::{SimError, SimResult};

/// Known records per node, indexed by node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSets {
    sets: Vec<BTreeSet<NodeIndex>>,
}

impl RecordSets {
    /// Every node knows only its own record
    pub fn initial(node_count: usize) -> Self {
        Self {
            sets: (0..node_count).map(|i| BTreeSet::from([NodeIndex::new(i)])).collect(),
        }
    }

    /// Wrap explicit per-node record sets
    pub fn from_sets(sets: Vec<BTreeSet<NodeIndex>>) -> Self {
        Self { sets }
    }

    pub fn get(&self, node: NodeIndex) -> &BTreeSet<NodeIndex> {
        &self.sets[node.index()]
    }

    pub fn knows(&self, node: NodeIndex, record: NodeIndex) -> bool {
        self.sets.get(node.index()).map_or(false, |set| set.contains(&record))
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Sum of all record set sizes
    pub fn total_records(&self) -> usize {
        self.sets.iter().map(BTreeSet::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &BTreeSet<NodeIndex>)> {
        self.sets.iter().enumerate().map(|(i, set)| (NodeIndex::new(i), set))
    }

    fn insert(&mut self, node: NodeIndex, record: NodeIndex) -> bool {
        self.sets[node.index()].insert(record)
    }
}

/// Honest propagators never forward into Sybil nodes
pub fn may_forward(from: &Node, to: &Node) -> bool {
    !(to.is_sybil && !from.is_sybil)
}

/// Result of running gossip to a fixed point
#[derive(Debug, Clone, PartialEq)]
pub struct GossipOutcome {
    pub records: RecordSets,
    /// Rounds executed, including the final round that changed nothing
    pub rounds: usize,
}

/// Round-based record flooding over an overlay
pub struct Disseminator<'a> {
    graph: &'a TrustGraph,
    overlay: &'a OverlayGraph,
    max_rounds: usize,
}

impl<'a> Disseminator<'a> {
    /// Disseminator with the default budget of node count + 1 rounds
    pub fn new(graph: &'a TrustGraph, overlay: &'a OverlayGraph) -> Self {
        Self {
            graph,
            overlay,
            max_rounds: graph.node_count() + 1,
        }
    }

    pub fn with_round_budget(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Execute one round against `current`, returning the next state and
    /// whether any record set grew
    pub fn round(&self, current: &RecordSets) -> (RecordSets, bool) {
        let mut next = current.clone();
        let mut changed = false;

        for (from, records) in current.iter() {
            let propagator = self.graph.node(from);
            for to in self.overlay.successors(from) {
                if !may_forward(propagator, self.graph.node(to)) {
                    continue;
                }
                for &record in records {
                    changed |= next.insert(to, record);
                }
            }
        }

        (next, changed)
    }

    /// Run rounds until one changes nothing.
    ///
    /// Returns `NonTermination` with the last state when the budget is
    /// exhausted while records are still moving, and a configuration error
    /// when `initial` does not cover every node.
    pub fn run(&self, initial: RecordSets) -> SimResult<GossipOutcome> {
        let nodes = self.graph.node_count();
        if initial.len() != nodes || self.overlay.node_count() != nodes {
            return Err(SimError::Configuration(format!(
                "record sets cover {} nodes, overlay has {}, graph has {}",
                initial.len(),
                self.overlay.node_count(),
                nodes
            )));
        }

        let mut records = initial;

        for round in 1..=self.max_rounds {
            let (next, changed) = self.round(&records);
            records = next;
            debug!("round {}: {} records known", round, records.total_records());

            if !changed {
                info!("Gossip converged after {} rounds", round);
                return Ok(GossipOutcome { records, rounds: round });
            }
        }

        warn!("Gossip still changing after {} rounds", self.max_rounds);
        Err(SimError::NonTermination {
            rounds: self.max_rounds,
            snapshot: records,
        })
    }
}
