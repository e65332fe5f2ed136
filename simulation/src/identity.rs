//! Identity assignment: hash-derived identifiers, group prefixes and the
//! per-node capacities every later phase is sized by.
//!
//! Each node estimates the population on its own, so with a non-zero
//! estimation error different nodes may end up with different group prefix
//! lengths and capacities.

use rand::Rng;
use tracing::{debug, info};

use crate::topology::{Node, NodeIdentifier, RawTopology, TrustGraph};
use crate::{SimError, SimResult, SimulationConfig};

/// Population size as known to the nodes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationEstimate {
    /// True number of nodes
    pub population: usize,
    /// Fraction by which an individual estimate may deviate in either direction
    pub error: f64,
}

impl PopulationEstimate {
    pub fn exact(population: usize) -> Self {
        Self { population, error: 0.0 }
    }

    pub fn with_error(population: usize, error: f64) -> Self {
        Self { population, error }
    }

    /// Draw one node's estimate `n + 2·(u − 0.5)·error·n`, `u` uniform in [0, 1)
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let n = self.population as f64;
        n + 2.0 * (rng.gen::<f64>() - 0.5) * self.error * n
    }
}

/// Parameters derived from a single population estimate `n̂`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdentityParameters {
    pub group_bits: usize,
    pub vicinity_capacity: usize,
    pub overlay_fanout: usize,
    pub color_bucket_capacity: usize,
    /// Probability that an honest node elects itself as a landmark
    pub honest_landmark_probability: f64,
}

impl IdentityParameters {
    /// Derive parameters from `n̂`; fails when `n̂ ≤ 1` or is not finite
    pub fn derive(n_hat: f64) -> SimResult<Self> {
        if !n_hat.is_finite() || n_hat <= 1.0 {
            return Err(SimError::Configuration(format!(
                "population estimate must exceed 1, got {}",
                n_hat
            )));
        }

        let ln_n = n_hat.ln();
        let group_bits = (n_hat / ln_n).sqrt().log2().floor().max(0.0) as usize;

        Ok(Self {
            group_bits,
            vicinity_capacity: (n_hat * ln_n).sqrt() as usize,
            overlay_fanout: ln_n as usize,
            color_bucket_capacity: ln_n as usize,
            honest_landmark_probability: (ln_n / n_hat).sqrt().min(1.0),
        })
    }
}

/// Assign identities and capacities to every node of a raw topology.
///
/// Per node, in order: one draw for the population estimate, one draw for
/// the landmark election.
pub fn assign_identities<R: Rng + ?Sized>(
    topology: &RawTopology,
    config: &SimulationConfig,
    rng: &mut R,
) -> SimResult<TrustGraph> {
    config.validate()?;

    let estimate = PopulationEstimate::with_error(topology.node_count(), config.population_error);
    let mut nodes = Vec::with_capacity(topology.node_count());
    let mut landmarks = 0usize;

    for raw in topology.nodes() {
        let n_hat = estimate.sample(rng);
        let params = IdentityParameters::derive(n_hat)
            .map_err(|e| SimError::Configuration(format!("node {}: {}", raw.label, e)))?;

        let id = NodeIdentifier::from_label(&raw.label);
        let group_prefix = id.prefix(params.group_bits);

        let landmark_probability = if raw.is_sybil {
            config.sybil_landmark_probability
        } else {
            params.honest_landmark_probability
        };
        let is_landmark = rng.gen_bool(landmark_probability);
        if is_landmark {
            landmarks += 1;
        }

        debug!(
            "node {} n_hat={:.1} group=[{}] vicinity={} fanout={}",
            raw.label, n_hat, group_prefix, params.vicinity_capacity, params.overlay_fanout
        );

        nodes.push(Node {
            label: raw.label.clone(),
            id,
            group_prefix,
            is_sybil: raw.is_sybil,
            is_landmark,
            vicinity_capacity: params.vicinity_capacity,
            color_bucket_capacity: params.color_bucket_capacity,
            overlay_fanout: params.overlay_fanout,
            community: raw.community.clone(),
        });
    }

    info!(
        "Assigned identities to {} nodes ({} landmarks)",
        nodes.len(),
        landmarks
    );

    TrustGraph::from_parts(nodes, topology.edges().iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_parameters_for_known_population() {
        // n = 1333: ln n ≈ 7.195, sqrt(n / ln n) ≈ 13.61, log2 ≈ 3.77
        let params = IdentityParameters::derive(1333.0).unwrap();
        assert_eq!(params.group_bits, 3);
        assert_eq!(params.vicinity_capacity, 97);
        assert_eq!(params.overlay_fanout, 7);
        assert_eq!(params.color_bucket_capacity, 7);
        assert!(params.honest_landmark_probability > 0.07 && params.honest_landmark_probability < 0.08);
    }

    #[test]
    fn test_invalid_estimate_rejected() {
        assert!(IdentityParameters::derive(1.0).is_err());
        assert!(IdentityParameters::derive(0.5).is_err());
        assert!(IdentityParameters::derive(f64::NAN).is_err());
        assert!(IdentityParameters::derive(2.0).is_ok());
    }

    #[test]
    fn test_small_population_has_root_group() {
        let params = IdentityParameters::derive(3.0).unwrap();
        assert_eq!(params.group_bits, 0);
        assert_eq!(params.overlay_fanout, 1);
    }

    #[test]
    fn test_exact_estimate_is_deterministic() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let estimate = PopulationEstimate::exact(100);
        assert_eq!(estimate.sample(&mut rng), 100.0);
    }

    #[test]
    fn test_estimate_error_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let estimate = PopulationEstimate::with_error(1000, 0.2);
        for _ in 0..200 {
            let n_hat = estimate.sample(&mut rng);
            assert!((800.0..=1200.0).contains(&n_hat));
        }
    }

    #[test]
    fn test_assign_identities_on_ring() {
        let raw = utils::ring_topology(64, Some(4));
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let graph = assign_identities(&raw, &SimulationConfig::new(), &mut rng).unwrap();

        assert_eq!(graph.node_count(), 64);
        assert_eq!(graph.edge_count(), 64);
        assert_eq!(graph.sybil_count(), 16);

        let expected = IdentityParameters::derive(64.0).unwrap();
        for (_, node) in graph.nodes() {
            assert_eq!(node.group_bits(), expected.group_bits);
            assert_eq!(node.vicinity_capacity, expected.vicinity_capacity);
            assert!(node.id.has_prefix(&node.group_prefix));
        }
    }

    #[test]
    fn test_sybil_landmark_probability_extremes() {
        let raw = utils::ring_topology(20, Some(1));
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let config = SimulationConfig::new().with_sybil_landmark_probability(1.0);
        let graph = assign_identities(&raw, &config, &mut rng).unwrap();
        assert!(graph.nodes().all(|(_, node)| node.is_landmark));

        let config = SimulationConfig::new().with_sybil_landmark_probability(0.0);
        let graph = assign_identities(&raw, &config, &mut rng).unwrap();
        assert!(graph.nodes().all(|(_, node)| !node.is_landmark));
    }

    #[test]
    fn test_single_node_population_is_configuration_error() {
        let raw = utils::ring_topology(1, None);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let result = assign_identities(&raw, &SimulationConfig::new(), &mut rng);
        assert!(matches!(result, Err(SimError::Configuration(_))));
    }
}
