//! # Overlay Statistics
//!
//! Degree distribution summaries and per-component diameters, computed over
//! an exported [`GraphArtifact`].

use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use serde::Serialize;
use sloppy_sim::GraphArtifact;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::fmt;

/// min/max/mean/population standard deviation of one degree sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DegreeStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl DegreeStats {
    /// All zero for an empty sequence
    pub fn from_degrees(degrees: &[usize]) -> Self {
        if degrees.is_empty() {
            return Self::default();
        }
        let values: Vec<f64> = degrees.iter().map(|&d| d as f64).collect();
        Self {
            min: Statistics::min(values.iter()),
            max: Statistics::max(values.iter()),
            mean: Statistics::mean(values.iter()),
            std_dev: Statistics::population_std_dev(values.iter()),
        }
    }
}

impl fmt::Display for DegreeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:.2} {:.2}", self.min, self.max, self.mean, self.std_dev)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DegreeSummary {
    pub incoming: DegreeStats,
    pub outgoing: DegreeStats,
    /// In plus out degree
    pub total: DegreeStats,
}

impl DegreeSummary {
    pub fn of(artifact: &GraphArtifact, node_count: usize) -> Self {
        let degrees = artifact.degrees(node_count);
        let incoming: Vec<usize> = degrees.iter().map(|&(i, _)| i).collect();
        let outgoing: Vec<usize> = degrees.iter().map(|&(_, o)| o).collect();
        let total: Vec<usize> = degrees.iter().map(|&(i, o)| i + o).collect();

        Self {
            incoming: DegreeStats::from_degrees(&incoming),
            outgoing: DegreeStats::from_degrees(&outgoing),
            total: DegreeStats::from_degrees(&total),
        }
    }
}

/// One connected component of the undirected view and its diameter in hops
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentDiameter {
    pub size: usize,
    pub diameter: u32,
}

/// Diameter of every connected component, ignoring edge direction, largest component first
pub fn component_diameters(artifact: &GraphArtifact, node_count: usize) -> Vec<ComponentDiameter> {
    let mut graph: UnGraph<(), ()> = UnGraph::with_capacity(node_count, artifact.edge_count());
    for _ in 0..node_count {
        graph.add_node(());
    }
    let mut components = UnionFind::new(node_count);
    for edge in &artifact.edges {
        let (a, b) = (edge.source.index(), edge.target.index());
        if a < node_count && b < node_count && a != b {
            graph.update_edge(NodeIndex::new(a), NodeIndex::new(b), ());
            components.union(a, b);
        }
    }

    let mut members: BTreeMap<usize, Vec<NodeIndex>> = BTreeMap::new();
    for node in 0..node_count {
        members.entry(components.find(node)).or_default().push(NodeIndex::new(node));
    }

    let mut diameters: Vec<ComponentDiameter> = members
        .into_values()
        .map(|nodes| {
            let diameter = nodes
                .iter()
                .filter_map(|&start| dijkstra(&graph, start, None, |_| 1u32).into_values().max())
                .max()
                .unwrap_or(0);
            ComponentDiameter { size: nodes.len(), diameter }
        })
        .collect();
    diameters.sort_by(|a, b| b.size.cmp(&a.size));
    diameters
}
