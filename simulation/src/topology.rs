//! Trust graph substrate: node identity types, raw input topologies and the
//! arena-indexed trust graph all algorithms traverse.
//!
//! Nodes are addressed by dense [`NodeIndex`] values into a petgraph
//! `UnGraph`, so derived structures (vicinities, buckets, overlay edges,
//! record sets) are plain index lists rather than pointer graphs.

use bitvec::prelude::*;
use petgraph::graph::UnGraph;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt::{self, Write};

use crate::{SimError, SimResult};

pub use petgraph::graph::NodeIndex;

/// Shortest-path distance in the trust graph
pub type Hops = u32;

/// Length of hash-derived identifiers in bits
pub const IDENTIFIER_BITS: usize = 256;

fn parse_bits(bits: &str, what: &str) -> SimResult<BitVec<u8, Msb0>> {
    let mut parsed = BitVec::with_capacity(bits.len());
    for ch in bits.chars() {
        match ch {
            '0' => parsed.push(false),
            '1' => parsed.push(true),
            other => {
                return Err(SimError::Configuration(format!(
                    "{} contains non-binary character {:?}",
                    what, other
                )))
            }
        }
    }
    Ok(parsed)
}

fn write_bits(bits: &BitSlice<u8, Msb0>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for bit in bits.iter().by_vals() {
        f.write_char(if bit { '1' } else { '0' })?;
    }
    Ok(())
}

/// Fixed-length pseudorandom node identifier, most significant bit first
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdentifier(BitVec<u8, Msb0>);

impl NodeIdentifier {
    /// Derive the identifier of a node from its label
    pub fn from_label(label: &str) -> Self {
        let digest = Sha256::digest(label.as_bytes());
        Self(BitVec::from_slice(digest.as_slice()))
    }

    /// Parse an identifier from a `0`/`1` bitstring
    pub fn parse(bits: &str) -> SimResult<Self> {
        if bits.is_empty() {
            return Err(SimError::Configuration("identifier must not be empty".to_string()));
        }
        parse_bits(bits, "identifier").map(Self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first `bits` bits of the identifier (clamped to its length)
    pub fn prefix(&self, bits: usize) -> GroupPrefix {
        let bits = bits.min(self.0.len());
        GroupPrefix(self.0[..bits].to_bitvec())
    }

    /// Whether this identifier starts with `prefix`
    pub fn has_prefix(&self, prefix: &GroupPrefix) -> bool {
        prefix.0.len() <= self.0.len()
            && self.0.iter().by_vals().zip(prefix.0.iter().by_vals()).all(|(a, b)| a == b)
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_bits(&self.0, f)
    }
}

/// Variable-length bit prefix that partitions nodes into routing groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupPrefix(BitVec<u8, Msb0>);

impl GroupPrefix {
    /// Parse a prefix from a `0`/`1` bitstring; the empty string is the root group
    pub fn parse(bits: &str) -> SimResult<Self> {
        parse_bits(bits, "group prefix").map(Self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for GroupPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_bits(&self.0, f)
    }
}

/// A simulated node. Created once during identity assignment and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Label assigned by the topology generator
    pub label: String,
    /// Hash-derived identifier
    pub id: NodeIdentifier,
    /// First `group_bits` bits of `id`
    pub group_prefix: GroupPrefix,
    pub is_sybil: bool,
    pub is_landmark: bool,
    /// Maximum number of vicinity entries
    pub vicinity_capacity: usize,
    /// Maximum number of entries per color-neighbor bucket
    pub color_bucket_capacity: usize,
    /// Sloppy-group degree; backlinks are bounded by its square
    pub overlay_fanout: usize,
    /// Community the generator placed the node in, if known
    pub community: Option<String>,
}

impl Node {
    pub fn group_bits(&self) -> usize {
        self.group_prefix.len()
    }

    /// Maximum number of backlinks this node admits
    pub fn backlink_capacity(&self) -> usize {
        self.overlay_fanout.saturating_mul(self.overlay_fanout)
    }

    /// Whether `other` belongs to this node's group
    pub fn shares_group(&self, other: &Node) -> bool {
        other.id.has_prefix(&self.group_prefix)
    }
}

/// Node of a topology that has not been through identity assignment yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNode {
    pub label: String,
    pub is_sybil: bool,
    pub community: Option<String>,
}

/// Trust topology as produced by an external generator, before identities exist
#[derive(Debug, Clone, Default)]
pub struct RawTopology {
    nodes: Vec<RawNode>,
    edges: Vec<(usize, usize)>,
    by_label: HashMap<String, usize>,
}

impl RawTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its position. Re-adding a label returns the existing position.
    pub fn add_node(&mut self, label: &str, is_sybil: bool, community: Option<&str>) -> usize {
        if let Some(&existing) = self.by_label.get(label) {
            return existing;
        }
        let position = self.nodes.len();
        self.nodes.push(RawNode {
            label: label.to_string(),
            is_sybil,
            community: community.map(str::to_string),
        });
        self.by_label.insert(label.to_string(), position);
        position
    }

    pub fn add_edge(&mut self, a: usize, b: usize) {
        self.edges.push((a, b));
    }

    pub fn position_of(&self, label: &str) -> Option<usize> {
        self.by_label.get(label).copied()
    }

    pub fn nodes(&self) -> &[RawNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Undirected, immutable trust graph between nodes
#[derive(Debug, Clone)]
pub struct TrustGraph {
    graph: UnGraph<Node, ()>,
    by_label: HashMap<String, NodeIndex>,
}

impl TrustGraph {
    /// Build a trust graph from nodes and edges given as positions into `nodes`.
    ///
    /// Duplicate edges and self-loops are dropped; duplicate labels and
    /// out-of-range endpoints are configuration errors.
    pub fn from_parts<I>(nodes: Vec<Node>, edges: I) -> SimResult<Self>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut graph = UnGraph::with_capacity(nodes.len(), 0);
        let mut by_label = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let label = node.label.clone();
            let index = graph.add_node(node);
            if by_label.insert(label.clone(), index).is_some() {
                return Err(SimError::Configuration(format!("duplicate node label {}", label)));
            }
        }

        let count = graph.node_count();
        for (a, b) in edges {
            if a >= count || b >= count {
                return Err(SimError::Configuration(format!(
                    "edge ({}, {}) references a node outside 0..{}",
                    a, b, count
                )));
            }
            if a != b {
                graph.update_edge(NodeIndex::new(a), NodeIndex::new(b), ());
            }
        }

        Ok(Self { graph, by_label })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.graph[index]
    }

    pub fn index_of(&self, label: &str) -> Option<NodeIndex> {
        self.by_label.get(label).copied()
    }

    pub fn indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> + '_ {
        self.graph.node_indices().map(move |index| (index, &self.graph[index]))
    }

    pub fn neighbors(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors(index)
    }

    /// Each undirected edge once, as `(a, b)` endpoint indices
    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex)> + '_ {
        self.graph
            .edge_indices()
            .filter_map(move |edge| self.graph.edge_endpoints(edge))
    }

    pub fn sybil_count(&self) -> usize {
        self.graph.node_indices().filter(|&index| self.graph[index].is_sybil).count()
    }

    /// Breadth-first distance table rooted at `source`
    pub fn hop_table(&self, source: NodeIndex) -> HopTable {
        let mut distances = vec![None; self.node_count()];
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        distances[source.index()] = Some(0);
        queue.push_back(source);

        while let Some(current) = queue.pop_front() {
            let next_hops = distances[current.index()].unwrap_or(0) + 1;
            for neighbor in self.graph.neighbors(current) {
                if distances[neighbor.index()].is_none() {
                    distances[neighbor.index()] = Some(next_hops);
                    order.push(neighbor);
                    queue.push_back(neighbor);
                }
            }
        }

        HopTable { source, distances, order }
    }
}

/// Shortest-path hop counts from one source, computed once and reused
#[derive(Debug, Clone)]
pub struct HopTable {
    source: NodeIndex,
    distances: Vec<Option<Hops>>,
    order: Vec<NodeIndex>,
}

impl HopTable {
    pub fn source(&self) -> NodeIndex {
        self.source
    }

    /// Hop count to `node`, `None` when unreachable
    pub fn distance(&self, node: NodeIndex) -> Option<Hops> {
        self.distances.get(node.index()).copied().flatten()
    }

    /// Reachable nodes other than the source, in non-decreasing hop order
    pub fn bfs_order(&self) -> &[NodeIndex] {
        &self.order
    }

    /// Largest finite hop count (eccentricity of the source within its component)
    pub fn eccentricity(&self) -> Hops {
        self.distances.iter().flatten().copied().max().unwrap_or(0)
    }
}
