//! # Proximity Indexing
//!
//! For every node this module explores the trust graph and records:
//!
//! - a **vicinity**: a randomized local sample of at most `vicinity_capacity`
//!   nearby nodes, found by repeatedly expanding a randomly chosen frontier node
//! - **color-neighbor buckets**: for every group prefix of the node's own prefix
//!   length, the `color_bucket_capacity` nearest nodes carrying that prefix
//!
//! Each node is indexed with its own child random source drawn from the
//! master source up front, so the result does not depend on whether nodes are
//! processed sequentially or on the rayon pool (`parallel` feature).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::topology::{GroupPrefix, HopTable, Hops, NodeIndex, TrustGraph};
use crate::{SimError, SimResult, Verifiable, Violation};

/// Randomly sampled nearby nodes with their exact hop counts, in discovery order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vicinity {
    entries: Vec<(Hops, NodeIndex)>,
}

impl Vicinity {
    /// Sample the vicinity of `table.source()`
    pub fn build<R: Rng + ?Sized>(graph: &TrustGraph, table: &HopTable, rng: &mut R) -> Self {
        let source = table.source();
        let capacity = graph.node(source).vicinity_capacity;
        let mut entries = Vec::new();
        let mut visited = vec![false; graph.node_count()];
        let mut frontier = vec![source];
        visited[source.index()] = true;

        while !frontier.is_empty() && entries.len() < capacity {
            let pick = rng.gen_range(0..frontier.len());
            let current = frontier.swap_remove(pick);

            for neighbor in graph.neighbors(current) {
                if visited[neighbor.index()] {
                    continue;
                }
                visited[neighbor.index()] = true;

                let Some(hops) = table.distance(neighbor) else {
                    continue;
                };
                entries.push((hops, neighbor));
                if entries.len() >= capacity {
                    break;
                }
                frontier.push(neighbor);
            }
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[(Hops, NodeIndex)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of offering a candidate to a color-neighbor bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The bucket had room
    Appended,
    /// The candidate displaced the bucket's maximum entry
    Replaced { evicted: NodeIndex },
    /// Equal hop count, lost the coin flip
    Rejected,
    /// Bucket full and the candidate is farther than every entry
    Saturated,
}

/// Bounded list of the lowest-hop entries seen for one prefix, sorted by hops
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorBucket {
    entries: Vec<(Hops, NodeIndex)>,
}

impl ColorBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a candidate; ties with the current maximum replace it with probability 1/2
    pub fn offer<R: Rng + ?Sized>(
        &mut self,
        capacity: usize,
        hops: Hops,
        node: NodeIndex,
        rng: &mut R,
    ) -> Admission {
        if self.entries.len() < capacity {
            self.insert_sorted(hops, node);
            return Admission::Appended;
        }

        let Some(&(max_hops, _)) = self.entries.last() else {
            // Zero capacity never admits anything
            return Admission::Saturated;
        };

        if hops < max_hops || (hops == max_hops && rng.gen_bool(0.5)) {
            let evicted = self.entries.pop().map(|(_, evicted)| evicted).unwrap_or(node);
            self.insert_sorted(hops, node);
            Admission::Replaced { evicted }
        } else if hops > max_hops {
            Admission::Saturated
        } else {
            Admission::Rejected
        }
    }

    fn insert_sorted(&mut self, hops: Hops, node: NodeIndex) {
        let position = self.entries.partition_point(|&(h, _)| h <= hops);
        self.entries.insert(position, (hops, node));
    }

    pub fn entries(&self) -> &[(Hops, NodeIndex)] {
        &self.entries
    }

    pub fn max_hops(&self) -> Option<Hops> {
        self.entries.last().map(|&(hops, _)| hops)
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        self.entries.iter().any(|&(_, n)| n == node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Color-neighbor buckets of one node, keyed by group prefix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorNeighborBuckets {
    buckets: BTreeMap<GroupPrefix, ColorBucket>,
}

impl ColorNeighborBuckets {
    /// Fill the buckets of `table.source()` by walking the trust graph breadth-first.
    ///
    /// A bucket that reported [`Admission::Saturated`] can no longer change
    /// because hop counts only grow along the traversal, so it is skipped from
    /// then on, and the traversal stops once every possible prefix is saturated.
    pub fn build<R: Rng + ?Sized>(graph: &TrustGraph, table: &HopTable, rng: &mut R) -> Self {
        let owner = graph.node(table.source());
        let capacity = owner.color_bucket_capacity;
        let bits = owner.group_bits();
        let mut buckets: BTreeMap<GroupPrefix, ColorBucket> = BTreeMap::new();

        if capacity == 0 {
            return Self { buckets };
        }

        let prefix_space = u32::try_from(bits).ok().and_then(|b| 1usize.checked_shl(b));
        let mut saturated = BTreeSet::new();

        for &neighbor in table.bfs_order() {
            let Some(hops) = table.distance(neighbor) else {
                continue;
            };
            let prefix = graph.node(neighbor).id.prefix(bits);
            if saturated.contains(&prefix) {
                continue;
            }

            let bucket = buckets.entry(prefix.clone()).or_default();
            if bucket.offer(capacity, hops, neighbor, rng) == Admission::Saturated {
                saturated.insert(prefix);
                if Some(saturated.len()) == prefix_space {
                    break;
                }
            }
        }

        Self { buckets }
    }

    pub fn get(&self, prefix: &GroupPrefix) -> Option<&ColorBucket> {
        self.buckets.get(prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupPrefix, &ColorBucket)> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Per-node proximity state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProximityState {
    pub vicinity: Vicinity,
    pub color_neighbors: ColorNeighborBuckets,
}

impl ProximityState {
    /// Index a single node with its own random source
    pub fn build<R: Rng + ?Sized>(graph: &TrustGraph, node: NodeIndex, rng: &mut R) -> Self {
        let table = graph.hop_table(node);
        let color_neighbors = ColorNeighborBuckets::build(graph, &table, rng);
        let vicinity = Vicinity::build(graph, &table, rng);
        Self { vicinity, color_neighbors }
    }
}

/// Proximity state of every node, indexed by node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProximityIndex {
    states: Vec<ProximityState>,
}

impl ProximityIndex {
    /// Index every node of the trust graph
    pub fn build<R: Rng + ?Sized>(graph: &TrustGraph, rng: &mut R) -> Self {
        let seeds: Vec<u64> = (0..graph.node_count()).map(|_| rng.gen()).collect();
        let index_one = |(position, seed): (usize, &u64)| {
            let mut node_rng = ChaCha8Rng::seed_from_u64(*seed);
            ProximityState::build(graph, NodeIndex::new(position), &mut node_rng)
        };

        #[cfg(feature = "parallel")]
        let states: Vec<ProximityState> = seeds.par_iter().enumerate().map(index_one).collect();
        #[cfg(not(feature = "parallel"))]
        let states: Vec<ProximityState> = seeds.iter().enumerate().map(index_one).collect();

        let index = Self { states };
        debug!(
            "vicinity entries: {}, color-neighbor entries: {}",
            index.vicinity_entries(),
            index.color_neighbor_entries()
        );
        info!("Indexed proximity of {} nodes", index.states.len());
        index
    }

    /// Assemble an index from precomputed per-node states
    pub fn from_states(states: Vec<ProximityState>) -> Self {
        Self { states }
    }

    pub fn state(&self, node: NodeIndex) -> &ProximityState {
        &self.states[node.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &ProximityState)> {
        self.states.iter().enumerate().map(|(i, state)| (NodeIndex::new(i), state))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn vicinity_entries(&self) -> usize {
        self.states.iter().map(|state| state.vicinity.len()).sum()
    }

    pub fn color_neighbor_entries(&self) -> usize {
        self.states
            .iter()
            .flat_map(|state| state.color_neighbors.iter())
            .map(|(_, bucket)| bucket.len())
            .sum()
    }
}

impl Verifiable for ProximityIndex {
    fn verify_invariants(&self, graph: &TrustGraph) -> SimResult<()> {
        for (node, state) in self.iter() {
            let owner = graph.node(node);
            for (prefix, bucket) in state.color_neighbors.iter() {
                if bucket.len() > owner.color_bucket_capacity {
                    return Err(SimError::InvariantViolation(Violation::BucketOverflow {
                        node: owner.label.clone(),
                        prefix: prefix.to_string(),
                        len: bucket.len(),
                        capacity: owner.color_bucket_capacity,
                    }));
                }
            }
        }
        Ok(())
    }
}
