//! Random-walk exploration for distant same-group peers.
//!
//! Walks are off by default. In [`RandomWalkMode::Explore`] they run and their
//! discoveries are reported as each node's foreign view; only
//! [`RandomWalkMode::Wire`] turns foreign-view candidates into overlay links.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::topology::{HopTable, Hops, NodeIndex, TrustGraph};
use crate::SimError;

/// Random walk toggle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RandomWalkMode {
    /// No walks are performed
    #[default]
    Off,
    /// Walks run, foreign views are collected but not linked
    Explore,
    /// Walks run and selected foreign-view candidates become overlay links
    Wire,
}

impl RandomWalkMode {
    pub fn explores(&self) -> bool {
        !matches!(self, RandomWalkMode::Off)
    }

    pub fn wires(&self) -> bool {
        matches!(self, RandomWalkMode::Wire)
    }
}

impl FromStr for RandomWalkMode {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(RandomWalkMode::Off),
            "explore" => Ok(RandomWalkMode::Explore),
            "wire" => Ok(RandomWalkMode::Wire),
            other => Err(SimError::Configuration(format!(
                "unknown random walk mode {:?} (expected off, explore or wire)",
                other
            ))),
        }
    }
}

impl fmt::Display for RandomWalkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RandomWalkMode::Off => "off",
            RandomWalkMode::Explore => "explore",
            RandomWalkMode::Wire => "wire",
        };
        f.write_str(name)
    }
}

/// Same-group peers discovered by random walks, with their shortest-path hop counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForeignView {
    entries: Vec<(Hops, NodeIndex)>,
}

impl ForeignView {
    pub fn entries(&self) -> &[(Hops, NodeIndex)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pick long-range neighbours: shuffle, keep one candidate per distinct hop
    /// count (later candidates overwrite earlier ones), and stop as soon as
    /// `fanout` distinct hop counts are held.
    pub fn select_long_neighbors<R: Rng + ?Sized>(&self, fanout: usize, rng: &mut R) -> Vec<(Hops, NodeIndex)> {
        if fanout == 0 {
            return Vec::new();
        }

        let mut candidates = self.entries.clone();
        candidates.shuffle(rng);

        let mut by_hops: BTreeMap<Hops, NodeIndex> = BTreeMap::new();
        for (hops, node) in candidates {
            by_hops.insert(hops, node);
            if by_hops.len() >= fanout {
                break;
            }
        }
        by_hops.into_iter().collect()
    }
}

/// Walk length for a local view whose farthest member is `max_hops` away
pub fn walk_length(max_hops: Hops) -> usize {
    (1.5 * f64::from(max_hops)).round() as usize
}

/// Run `overlay_fanout` random walks from `table.source()`.
///
/// Each step moves to a uniformly chosen neighbour not yet visited by the same
/// walk; a walk ends early when no such neighbour exists. Every visited node
/// that carries the source's group prefix and is not in `discovered` becomes a
/// foreign-view candidate and is added to `discovered`.
pub fn explore<R: Rng + ?Sized>(
    graph: &TrustGraph,
    table: &HopTable,
    length: usize,
    discovered: &mut HashSet<NodeIndex>,
    rng: &mut R,
) -> ForeignView {
    let source = table.source();
    let origin = graph.node(source);
    let mut entries = Vec::new();

    for _ in 0..origin.overlay_fanout {
        let mut visited = HashSet::new();
        let mut current = source;
        let mut steps = 0;

        loop {
            visited.insert(current);

            if !discovered.contains(&current) && origin.shares_group(graph.node(current)) {
                if let Some(hops) = table.distance(current) {
                    entries.push((hops, current));
                }
                discovered.insert(current);
            }

            if steps >= length {
                break;
            }

            let unvisited: Vec<NodeIndex> = graph
                .neighbors(current)
                .filter(|neighbor| !visited.contains(neighbor))
                .collect();
            let Some(&next) = unvisited.choose(rng) else {
                break;
            };
            current = next;
            steps += 1;
        }
    }

    ForeignView { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Node;
    use crate::utils;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn path_graph(prefixes: &[&str], fanout: usize) -> TrustGraph {
        let nodes: Vec<Node> = prefixes
            .iter()
            .enumerate()
            .map(|(i, prefix)| utils::node_with_prefix(&format!("w{}", i), prefix, false, fanout).unwrap())
            .collect();
        let size = nodes.len();
        TrustGraph::from_parts(nodes, (1..size).map(|i| (i - 1, i))).unwrap()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("wire".parse::<RandomWalkMode>().unwrap(), RandomWalkMode::Wire);
        assert_eq!(RandomWalkMode::Explore.to_string(), "explore");
        assert!("sometimes".parse::<RandomWalkMode>().is_err());
        assert!(!RandomWalkMode::default().explores());
        assert!(RandomWalkMode::Wire.explores() && RandomWalkMode::Wire.wires());
        assert!(!RandomWalkMode::Explore.wires());
    }

    #[test]
    fn test_walk_length_rounding() {
        assert_eq!(walk_length(0), 0);
        assert_eq!(walk_length(1), 2);
        assert_eq!(walk_length(3), 5);
        assert_eq!(walk_length(4), 6);
    }

    #[test]
    fn test_walk_on_path_finds_same_group_nodes() {
        // On a path from one end every walk is forced along the path
        let graph = path_graph(&["0", "1", "0", "1", "0", "0"], 1);
        let table = graph.hop_table(NodeIndex::new(0));
        let mut discovered: HashSet<NodeIndex> = [NodeIndex::new(0)].into_iter().collect();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let view = explore(&graph, &table, 4, &mut discovered, &mut rng);
        let found: Vec<(Hops, usize)> = view.entries().iter().map(|&(h, n)| (h, n.index())).collect();
        assert_eq!(found, vec![(2, 2), (4, 4)]);
        assert!(discovered.contains(&NodeIndex::new(4)));
        assert!(!discovered.contains(&NodeIndex::new(5)));
    }

    #[test]
    fn test_walk_skips_already_discovered() {
        let graph = path_graph(&["0", "0", "0"], 2);
        let table = graph.hop_table(NodeIndex::new(0));
        let mut discovered: HashSet<NodeIndex> = (0..3).map(NodeIndex::new).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        assert!(explore(&graph, &table, 10, &mut discovered, &mut rng).is_empty());
    }

    #[test]
    fn test_zero_length_walk_only_sees_source() {
        let graph = path_graph(&["0", "0"], 3);
        let table = graph.hop_table(NodeIndex::new(0));
        let mut discovered = HashSet::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let view = explore(&graph, &table, 0, &mut discovered, &mut rng);
        assert_eq!(view.entries(), &[(0, NodeIndex::new(0))]);
    }

    #[test]
    fn test_select_long_neighbors_one_per_hop_count() {
        let view = ForeignView {
            entries: vec![
                (3, NodeIndex::new(1)),
                (3, NodeIndex::new(2)),
                (5, NodeIndex::new(3)),
                (7, NodeIndex::new(4)),
            ],
        };
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let selected = view.select_long_neighbors(8, &mut rng);
        let hops: Vec<Hops> = selected.iter().map(|&(h, _)| h).collect();
        assert_eq!(hops, vec![3, 5, 7]);

        let limited = view.select_long_neighbors(2, &mut rng);
        assert_eq!(limited.len(), 2);
        assert!(view.select_long_neighbors(0, &mut rng).is_empty());
    }
}
