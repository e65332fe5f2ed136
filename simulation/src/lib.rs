//! # Sloppy Group Simulation
//!
//! This library simulates how nodes of a social-trust overlay discover their
//! neighbours, assemble a bounded-degree routing structure (the "sloppy
//! group") and disseminate identity records over it while adversarial Sybil
//! nodes are present. After dissemination it verifies that every honest node
//! has learned all honest members of its group.
//!
//! ## Architecture
//!
//! The pipeline consists of the following components, in dependency order:
//!
//! - **Identity**: hashed identifiers, group prefixes and per-node capacities
//!   derived from an estimated population size
//! - **Proximity**: randomized vicinity sampling and per-prefix color-neighbor buckets
//! - **Overlay**: local views turned into a directed overlay with admission-controlled backlinks
//! - **Walk**: optional random walks that discover distant same-group peers
//! - **Gossip**: synchronous, double-buffered record flooding with Sybil-aware forwarding
//! - **Verify**: per-node convergence checks and structural invariant checks
//!
//! ## Usage
//!
//! ```rust
//! use sloppy_sim::{utils, Simulation, SimulationConfig};
//!
//! let graph = utils::complete_group(10, 9).unwrap();
//! let simulation = Simulation::new(graph, SimulationConfig::new().with_seed(7)).unwrap();
//!
//! let report = simulation.run().unwrap();
//! assert!(report.verification.is_clean());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod topology;
pub mod identity;
pub mod proximity;
pub mod overlay;
pub mod walk;
pub mod gossip;
pub mod verify;
pub mod artifacts;
pub mod simulation;

// Re-export main components
pub use topology::{GroupPrefix, Hops, Node, NodeIdentifier, NodeIndex, RawNode, RawTopology, TrustGraph, HopTable};
pub use identity::{assign_identities, IdentityParameters, PopulationEstimate};
pub use proximity::{Admission, ColorBucket, ColorNeighborBuckets, ProximityIndex, ProximityState, Vicinity};
pub use overlay::{build_overlay, BacklinkDecision, LocalView, OverlayConstruction, OverlayEdge, OverlayGraph};
pub use walk::{ForeignView, RandomWalkMode};
pub use gossip::{Disseminator, GossipOutcome, RecordSets};
pub use verify::{verify_convergence, Mismatch, VerificationReport};
pub use artifacts::{ArtifactEdge, ArtifactKind, GraphArtifact};
pub use simulation::{OverlayStructure, Simulation, SimulationReport};

/// Global configuration for one simulation run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed of the master random source
    pub seed: u64,

    /// Fraction by which each node may misestimate the population size
    pub population_error: f64,

    /// Probability that a Sybil node elects itself as a landmark
    pub sybil_landmark_probability: f64,

    /// Upper bound on gossip rounds; `None` uses node count + 1
    pub max_gossip_rounds: Option<usize>,

    /// Whether random walks run and whether their discoveries are wired into the overlay
    pub random_walk: RandomWalkMode,
}

impl SimulationConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            seed: 0,
            population_error: 0.0,
            sybil_landmark_probability: 0.5,
            max_gossip_rounds: None,
            random_walk: RandomWalkMode::Off,
        }
    }

    /// Set the master seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the population estimation error fraction
    pub fn with_population_error(mut self, error: f64) -> Self {
        self.population_error = error;
        self
    }

    /// Set the Sybil landmark election probability
    pub fn with_sybil_landmark_probability(mut self, probability: f64) -> Self {
        self.sybil_landmark_probability = probability;
        self
    }

    /// Set an explicit gossip round budget
    pub fn with_max_gossip_rounds(mut self, rounds: usize) -> Self {
        self.max_gossip_rounds = Some(rounds);
        self
    }

    /// Set the random walk mode
    pub fn with_random_walk(mut self, mode: RandomWalkMode) -> Self {
        self.random_walk = mode;
        self
    }

    /// Round budget for a graph with `node_count` nodes
    pub fn gossip_round_budget(&self, node_count: usize) -> usize {
        self.max_gossip_rounds.unwrap_or(node_count + 1).max(1)
    }

    /// Validate the configuration
    pub fn validate(&self) -> SimResult<()> {
        if !(0.0..1.0).contains(&self.population_error) {
            return Err(SimError::Configuration(format!(
                "population error must be in [0, 1), got {}",
                self.population_error
            )));
        }

        if !(0.0..=1.0).contains(&self.sybil_landmark_probability) {
            return Err(SimError::Configuration(format!(
                "sybil landmark probability must be in [0, 1], got {}",
                self.sybil_landmark_probability
            )));
        }

        if self.max_gossip_rounds == Some(0) {
            return Err(SimError::Configuration("gossip round budget must be positive".to_string()));
        }

        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural invariant that failed to hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A Sybil node learned the record of an honest node
    SybilLearnedHonest { node: String, record: String },
    /// A color-neighbor bucket grew beyond its capacity
    BucketOverflow { node: String, prefix: String, len: usize, capacity: usize },
    /// A node holds more backlinks than its admission bound
    BacklinkOverflow { node: String, count: usize, capacity: usize },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::SybilLearnedHonest { node, record } => {
                write!(f, "sybil node {} knows honest record {}", node, record)
            }
            Violation::BucketOverflow { node, prefix, len, capacity } => {
                write!(f, "node {} bucket [{}] holds {} entries, capacity {}", node, prefix, len, capacity)
            }
            Violation::BacklinkOverflow { node, count, capacity } => {
                write!(f, "node {} holds {} backlinks, capacity {}", node, count, capacity)
            }
        }
    }
}

/// Common error type for the simulation core
#[derive(Debug, Clone, thiserror::Error)]
pub enum SimError {
    /// Malformed or missing node attributes, invalid population estimate
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A correctness invariant did not hold
    #[error("invariant violation: {0}")]
    InvariantViolation(Violation),

    /// Gossip did not reach a fixed point within the round budget
    #[error("gossip did not converge within {rounds} rounds ({} records known)", .snapshot.total_records())]
    NonTermination { rounds: usize, snapshot: RecordSets },
}

/// Result type for simulation operations
pub type SimResult<T> = Result<T, SimError>;

/// Trait for derived structures whose bounds can be checked against the trust graph
pub trait Verifiable {
    /// Check every capacity invariant, failing on the first violation
    fn verify_invariants(&self, graph: &TrustGraph) -> SimResult<()>;
}

/// Property checkers used by tests and diagnostics
pub mod properties {
    use super::*;

    /// Every color-neighbor bucket is within its owner's capacity
    pub fn color_buckets_bounded(graph: &TrustGraph, index: &ProximityIndex) -> bool {
        index.verify_invariants(graph).is_ok()
    }

    /// Every node holds at most `overlay_fanout²` backlinks
    pub fn backlinks_bounded(graph: &TrustGraph, overlay: &OverlayGraph) -> bool {
        overlay.verify_invariants(graph).is_ok()
    }

    /// Sybil nodes know only Sybil records
    pub fn sybil_records_pure(graph: &TrustGraph, records: &RecordSets) -> bool {
        graph
            .indices()
            .filter(|&node| graph.node(node).is_sybil)
            .all(|node| records.get(node).iter().all(|&record| graph.node(record).is_sybil))
    }

    /// Every honest node knows every honest member of its group
    pub fn honest_groups_complete(graph: &TrustGraph, records: &RecordSets) -> bool {
        verify_convergence(graph, records).map_or(false, |report| report.is_clean())
    }
}

/// Utilities for building small topologies in tests and demos
pub mod utils {
    use super::*;

    /// Build a node with explicit capacities and a group prefix given as a bitstring
    pub fn node_with_prefix(label: &str, prefix: &str, is_sybil: bool, capacity: usize) -> SimResult<Node> {
        let group_prefix = GroupPrefix::parse(prefix)?;
        let mut id_bits = prefix.to_string();
        // Pad with the label hash so identifiers stay distinct within a group
        let hashed = NodeIdentifier::from_label(label);
        id_bits.push_str(hashed.to_string().get(prefix.len()..).unwrap_or(""));

        Ok(Node {
            label: label.to_string(),
            id: NodeIdentifier::parse(&id_bits)?,
            group_prefix,
            is_sybil,
            is_landmark: false,
            vicinity_capacity: capacity,
            color_bucket_capacity: capacity,
            overlay_fanout: capacity,
            community: Some(if is_sybil { "sybil" } else { "honest" }.to_string()),
        })
    }

    /// A fully connected honest group of `size` nodes sharing the empty prefix
    pub fn complete_group(size: usize, capacity: usize) -> SimResult<TrustGraph> {
        let nodes = (0..size)
            .map(|i| node_with_prefix(&format!("honest{}", i), "", false, capacity))
            .collect::<SimResult<Vec<_>>>()?;
        let edges = (0..size).flat_map(|a| ((a + 1)..size).map(move |b| (a, b)));
        TrustGraph::from_parts(nodes, edges)
    }

    /// A ring of `size` unlabelled nodes, useful as raw input for identity assignment
    pub fn ring_topology(size: usize, sybil_every: Option<usize>) -> RawTopology {
        let mut topology = RawTopology::new();
        for i in 0..size {
            let is_sybil = sybil_every.map_or(false, |k| k > 0 && i % k == 0);
            let community = if is_sybil { "sybil" } else { "honest" };
            topology.add_node(&format!("{}{}", community, i), is_sybil, Some(community));
        }
        for i in 0..size {
            topology.add_edge(i, (i + 1) % size);
        }
        topology
    }

    /// Generate configurations for various scenarios
    pub fn test_configs() -> Vec<SimulationConfig> {
        vec![
            SimulationConfig::new().with_seed(1),
            SimulationConfig::new().with_seed(2).with_population_error(0.1),
            SimulationConfig::new().with_seed(3).with_random_walk(RandomWalkMode::Explore),
            SimulationConfig::new().with_seed(4).with_random_walk(RandomWalkMode::Wire),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = SimulationConfig::new().with_seed(9).with_population_error(0.2);
        assert_eq!(config.seed, 9);
        assert_eq!(config.random_walk, RandomWalkMode::Off);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let invalid = SimulationConfig {
            population_error: 1.0,
            ..Default::default()
        };
        assert!(matches!(invalid.validate(), Err(SimError::Configuration(_))));

        let invalid = SimulationConfig::new().with_sybil_landmark_probability(1.5);
        assert!(invalid.validate().is_err());

        let invalid = SimulationConfig::new().with_max_gossip_rounds(0);
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_round_budget() {
        let config = SimulationConfig::new();
        assert_eq!(config.gossip_round_budget(10), 11);
        assert_eq!(config.with_max_gossip_rounds(3).gossip_round_budget(10), 3);
    }

    #[test]
    fn test_config_from_toml_shape() {
        let config: SimulationConfig = serde_json::from_str(r#"{"seed": 5, "random_walk": "wire"}"#).unwrap();
        assert_eq!(config.seed, 5);
        assert_eq!(config.random_walk, RandomWalkMode::Wire);
        assert_eq!(config.sybil_landmark_probability, 0.5);
    }

    #[test]
    fn test_violation_display() {
        let violation = Violation::BacklinkOverflow { node: "a".into(), count: 5, capacity: 4 };
        assert_eq!(violation.to_string(), "node a holds 5 backlinks, capacity 4");
    }

    #[test]
    fn test_node_with_prefix() {
        let node = utils::node_with_prefix("x", "101", false, 2).unwrap();
        assert_eq!(node.group_bits(), 3);
        assert!(node.id.has_prefix(&node.group_prefix));
        assert_eq!(node.id.len(), topology::IDENTIFIER_BITS);
    }
}
