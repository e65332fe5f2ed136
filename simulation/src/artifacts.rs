//! Labelled graphs exported after a run: vicinity, color-neighbor, overlay and trust.

use serde::{Deserialize, Serialize};

use crate::overlay::OverlayGraph;
use crate::proximity::ProximityIndex;
use crate::topology::{Hops, NodeIndex, TrustGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Vicinity,
    ColorNeighbors,
    Overlay,
    Trust,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Vicinity,
        ArtifactKind::ColorNeighbors,
        ArtifactKind::Overlay,
        ArtifactKind::Trust,
    ];

    /// File name stem used when the artifact is written out
    pub fn file_stem(&self) -> &'static str {
        match self {
            ArtifactKind::Vicinity => "vicinity",
            ArtifactKind::ColorNeighbors => "cn",
            ArtifactKind::Overlay => "group",
            ArtifactKind::Trust => "trust",
        }
    }

    pub fn is_directed(&self) -> bool {
        !matches!(self, ArtifactKind::Trust)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactEdge {
    pub source: NodeIndex,
    pub target: NodeIndex,
    pub hops: Option<Hops>,
    /// Only set on overlay edges
    pub backlink: Option<bool>,
}

/// Edge list of one exported graph; nodes are those of the trust graph
#[derive(Debug, Clone, PartialEq)]
pub struct GraphArtifact {
    pub kind: ArtifactKind,
    pub edges: Vec<ArtifactEdge>,
}

impl GraphArtifact {
    pub fn vicinity(proximity: &ProximityIndex) -> Self {
        let edges = proximity
            .iter()
            .flat_map(|(node, state)| {
                state.vicinity.entries().iter().map(move |&(hops, peer)| ArtifactEdge {
                    source: node,
                    target: peer,
                    hops: Some(hops),
                    backlink: None,
                })
            })
            .collect();
        Self { kind: ArtifactKind::Vicinity, edges }
    }

    pub fn color_neighbors(proximity: &ProximityIndex) -> Self {
        let edges = proximity
            .iter()
            .flat_map(|(node, state)| {
                state.color_neighbors.iter().flat_map(move |(_, bucket)| {
                    bucket.entries().iter().map(move |&(hops, peer)| ArtifactEdge {
                        source: node,
                        target: peer,
                        hops: Some(hops),
                        backlink: None,
                    })
                })
            })
            .collect();
        Self { kind: ArtifactKind::ColorNeighbors, edges }
    }

    pub fn overlay(overlay: &OverlayGraph) -> Self {
        let mut edges: Vec<ArtifactEdge> = overlay
            .edges()
            .map(|(source, target, edge)| ArtifactEdge {
                source,
                target,
                hops: Some(edge.hops),
                backlink: Some(edge.is_backlink),
            })
            .collect();
        edges.sort_by_key(|edge| (edge.source, edge.target));
        Self { kind: ArtifactKind::Overlay, edges }
    }

    pub fn trust(graph: &TrustGraph) -> Self {
        let edges = graph
            .edges()
            .map(|(source, target)| ArtifactEdge {
                source,
                target,
                hops: None,
                backlink: None,
            })
            .collect();
        Self { kind: ArtifactKind::Trust, edges }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// `(in, out)` degree per node; undirected edges count once towards each end's out-degree
    pub fn degrees(&self, node_count: usize) -> Vec<(usize, usize)> {
        let mut degrees = vec![(0usize, 0usize); node_count];
        for edge in &self.edges {
            if let Some(entry) = degrees.get_mut(edge.source.index()) {
                entry.1 += 1;
            }
            if let Some(entry) = degrees.get_mut(edge.target.index()) {
                if self.kind.is_directed() {
                    entry.0 += 1;
                } else {
                    entry.1 += 1;
                }
            }
        }
        degrees
    }
}
