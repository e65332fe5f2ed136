//! # Sloppy Group Overlay
//!
//! Every node turns its local view (same-group vicinity entries plus its own
//! color-neighbor bucket) into outgoing overlay links. Each link asks the
//! target to add a reciprocal backlink; the target admits it while it holds
//! fewer than `overlay_fanout²` backlinks, otherwise only if the requester is
//! closer than its farthest current backlink, which is then evicted.
//!
//! Admission decisions depend only on the target's own backlink set, but that
//! set is written by other nodes' invocations, so construction runs node by
//! node.

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::proximity::{ProximityIndex, ProximityState};
use crate::topology::{Hops, NodeIndex, TrustGraph};
use crate::walk::{self, ForeignView, RandomWalkMode};
use crate::{SimError, SimResult, Verifiable, Violation};

/// Attributes of a directed overlay edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayEdge {
    pub hops: Hops,
    pub is_backlink: bool,
}

/// What a target decided about a backlink request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacklinkDecision {
    /// Below capacity, admitted
    Admitted,
    /// At capacity, admitted after evicting the farthest backlink
    Replaced { evicted: NodeIndex },
    /// At capacity and the requester is not closer than the farthest backlink
    Declined,
    /// The requester is the target itself
    SelfLink,
}

/// Directed sloppy-group overlay
#[derive(Debug, Clone, Default)]
pub struct OverlayGraph {
    graph: DiGraphMap<NodeIndex, OverlayEdge>,
}

impl OverlayGraph {
    /// An overlay over `node_count` nodes with no edges
    pub fn new(node_count: usize) -> Self {
        let mut graph = DiGraphMap::with_capacity(node_count, 0);
        for i in 0..node_count {
            graph.add_node(NodeIndex::new(i));
        }
        Self { graph }
    }

    /// Insert or overwrite a single edge without admission control
    pub fn insert_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: OverlayEdge) {
        self.graph.add_edge(from, to, edge);
    }

    /// Link `from → to` and ask `to` to admit the backlink `to → from`.
    ///
    /// `capacity` is the target's backlink bound. An existing edge `from → to`
    /// is overwritten as a forward link, and an admitted backlink overwrites
    /// an existing forward link `to → from`. Only edges already marked as
    /// backlinks count against the capacity.
    pub fn add_link(&mut self, from: NodeIndex, to: NodeIndex, hops: Hops, capacity: usize) -> BacklinkDecision {
        self.graph.add_edge(from, to, OverlayEdge { hops, is_backlink: false });
        self.admit_backlink(to, from, hops, capacity)
    }

    fn admit_backlink(&mut self, target: NodeIndex, requester: NodeIndex, hops: Hops, capacity: usize) -> BacklinkDecision {
        if target == requester {
            return BacklinkDecision::SelfLink;
        }

        let backlinks = self.backlinks(target);
        let backlink = OverlayEdge { hops, is_backlink: true };

        if backlinks.len() < capacity {
            self.graph.add_edge(target, requester, backlink);
            return BacklinkDecision::Admitted;
        }

        match backlinks.last() {
            Some(&(max_hops, farthest)) if hops < max_hops => {
                self.graph.remove_edge(target, farthest);
                self.graph.add_edge(target, requester, backlink);
                BacklinkDecision::Replaced { evicted: farthest }
            }
            _ => BacklinkDecision::Declined,
        }
    }

    /// Backlinks held by `node`, sorted by `(hops, peer)`
    pub fn backlinks(&self, node: NodeIndex) -> Vec<(Hops, NodeIndex)> {
        let mut backlinks: Vec<(Hops, NodeIndex)> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .filter_map(|peer| {
                self.graph
                    .edge_weight(node, peer)
                    .filter(|edge| edge.is_backlink)
                    .map(|edge| (edge.hops, peer))
            })
            .collect();
        backlinks.sort();
        backlinks
    }

    pub fn edge(&self, from: NodeIndex, to: NodeIndex) -> Option<&OverlayEdge> {
        self.graph.edge_weight(from, to)
    }

    pub fn successors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Outgoing)
    }

    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, &OverlayEdge)> + '_ {
        self.graph.all_edges()
    }

    pub fn out_degree(&self, node: NodeIndex) -> usize {
        self.graph.neighbors_directed(node, Direction::Outgoing).count()
    }

    pub fn in_degree(&self, node: NodeIndex) -> usize {
        self.graph.neighbors_directed(node, Direction::Incoming).count()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn backlink_count(&self) -> usize {
        self.edges().filter(|(_, _, edge)| edge.is_backlink).count()
    }

}

/// Bounds the backlinks each node holds, i.e. its outgoing backlink edges
impl Verifiable for OverlayGraph {
    fn verify_invariants(&self, graph: &TrustGraph) -> SimResult<()> {
        for (node, data) in graph.nodes() {
            let count = self.backlinks(node).len();
            if count > data.backlink_capacity() {
                return Err(SimError::InvariantViolation(Violation::BacklinkOverflow {
                    node: data.label.clone(),
                    count,
                    capacity: data.backlink_capacity(),
                }));
            }
        }
        Ok(())
    }
}

/// A node's same-group peers known from its own proximity state
#[derive(Debug, Clone, Default)]
pub struct LocalView {
    entries: Vec<(Hops, NodeIndex)>,
    discovered: HashSet<NodeIndex>,
}

impl LocalView {
    /// Same-group vicinity entries first, then own-prefix color neighbors not already present
    pub fn collect(graph: &TrustGraph, node: NodeIndex, state: &ProximityState) -> Self {
        let owner = graph.node(node);
        let mut entries = Vec::new();
        let mut discovered = HashSet::new();
        discovered.insert(node);

        for &(hops, peer) in state.vicinity.entries() {
            if owner.shares_group(graph.node(peer)) && discovered.insert(peer) {
                entries.push((hops, peer));
            }
        }

        if let Some(bucket) = state.color_neighbors.get(&owner.group_prefix) {
            for &(hops, peer) in bucket.entries() {
                if discovered.insert(peer) {
                    entries.push((hops, peer));
                }
            }
        }

        Self { entries, discovered }
    }

    pub fn entries(&self) -> &[(Hops, NodeIndex)] {
        &self.entries
    }

    /// Farthest local-view member, 0 for an empty view
    pub fn max_hops(&self) -> Hops {
        self.entries.iter().map(|&(hops, _)| hops).max().unwrap_or(0)
    }

    /// The owner plus every local-view member
    pub fn discovered(&self) -> &HashSet<NodeIndex> {
        &self.discovered
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of overlay construction
#[derive(Debug, Clone, Default)]
pub struct OverlayConstruction {
    pub overlay: OverlayGraph,
    /// Random-walk discoveries per node; empty when walks are off
    pub foreign_views: Vec<ForeignView>,
}

/// Build the overlay, processing nodes in a shuffled order
pub fn build_overlay<R: Rng + ?Sized>(
    graph: &TrustGraph,
    proximity: &ProximityIndex,
    mode: RandomWalkMode,
    rng: &mut R,
) -> OverlayConstruction {
    let mut overlay = OverlayGraph::new(graph.node_count());
    let mut foreign_views = vec![ForeignView::default(); graph.node_count()];
    let mut declined = 0usize;
    let mut evicted = 0usize;

    let mut order: Vec<NodeIndex> = graph.indices().collect();
    order.shuffle(rng);

    for node in order {
        let view = LocalView::collect(graph, node, proximity.state(node));
        let mut links = view.entries().to_vec();

        if mode.explores() {
            let table = graph.hop_table(node);
            let mut discovered = view.discovered().clone();
            let foreign = walk::explore(graph, &table, walk::walk_length(view.max_hops()), &mut discovered, rng);
            if mode.wires() {
                links.extend(foreign.select_long_neighbors(graph.node(node).overlay_fanout, rng));
            }
            foreign_views[node.index()] = foreign;
        }

        for (hops, target) in links {
            let capacity = graph.node(target).backlink_capacity();
            match overlay.add_link(node, target, hops, capacity) {
                BacklinkDecision::Declined => declined += 1,
                BacklinkDecision::Replaced { .. } => evicted += 1,
                _ => {}
            }
        }
    }

    debug!("backlinks declined: {}, evicted: {}", declined, evicted);
    info!(
        "Built overlay with {} edges ({} backlinks)",
        overlay.edge_count(),
        overlay.backlink_count()
    );

    OverlayConstruction { overlay, foreign_views }
}
