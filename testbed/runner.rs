//! # Iteration Runner
//!
//! Repeats the full simulation over one topology. Iteration `k` (counting
//! from 1) runs with seed `seed + 2(k − 1)`, keeping the identity and run
//! streams of consecutive iterations apart. After each iteration the overlay
//! statistics are logged, mismatch lines are written to the output sink and
//! the graph artifacts are stored according to the
//! [`StorePolicy`](crate::StorePolicy).

use sloppy_sim::{GraphArtifact, Mismatch, SimError, Simulation, SimulationConfig};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::TestbedConfig;
use crate::gml;
use crate::loader::{self, TopologyInput};
use crate::stats::{component_diameters, ComponentDiameter, DegreeSummary};
use crate::TestbedResult;

/// What one iteration produced
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub iteration: usize,
    pub seed: u64,
    pub rounds: usize,
    pub mismatches: Vec<Mismatch>,
    pub degrees: DegreeSummary,
    pub diameters: Vec<ComponentDiameter>,
    /// Artifact files written for this iteration
    pub stored: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub iterations: Vec<IterationOutcome>,
}

impl RunSummary {
    pub fn mismatched_iterations(&self) -> usize {
        self.iterations.iter().filter(|outcome| !outcome.mismatches.is_empty()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.mismatched_iterations() == 0
    }
}

pub struct Runner {
    config: TestbedConfig,
}

impl Runner {
    pub fn new(config: TestbedConfig) -> TestbedResult<Self> {
        if config.iterations == 0 {
            return Err(SimError::Configuration("iterations must be positive".to_string()).into());
        }
        config.simulation.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TestbedConfig {
        &self.config
    }

    pub fn iteration_seed(&self, iteration: usize) -> u64 {
        let offset = (iteration.saturating_sub(1) as u64).wrapping_mul(2);
        self.config.simulation.seed.wrapping_add(offset)
    }

    /// Load the configured input and run every iteration
    pub fn run<W: Write>(&self, out: &mut W) -> TestbedResult<RunSummary> {
        self.config.validate()?;
        let path = self
            .config
            .input
            .as_deref()
            .ok_or_else(|| SimError::Configuration("no input topology given".to_string()))?;
        let input = loader::load_topology(path)?;
        self.run_topology(&input, out)
    }

    pub fn run_topology<W: Write>(&self, input: &TopologyInput, out: &mut W) -> TestbedResult<RunSummary> {
        let mut summary = RunSummary::default();

        for iteration in 1..=self.config.iterations {
            let outcome = self.run_iteration(input, iteration, out)?;
            summary.iterations.push(outcome);
        }

        info!(
            "Finished {} iterations, {} with mismatches",
            summary.iterations.len(),
            summary.mismatched_iterations()
        );
        Ok(summary)
    }

    fn simulation_for(&self, input: &TopologyInput, seed: u64) -> TestbedResult<Simulation> {
        let config = SimulationConfig {
            seed,
            ..self.config.simulation.clone()
        };
        let simulation = match input {
            TopologyInput::Attributed(graph) => Simulation::new(graph.clone(), config)?,
            TopologyInput::Raw(raw) => Simulation::from_topology(raw, config)?,
        };
        Ok(simulation)
    }

    fn run_iteration<W: Write>(
        &self,
        input: &TopologyInput,
        iteration: usize,
        out: &mut W,
    ) -> TestbedResult<IterationOutcome> {
        let seed = self.iteration_seed(iteration);
        info!("iteration {} (seed {})", iteration, seed);

        let simulation = self.simulation_for(input, seed)?;
        let report = simulation.run()?;
        let graph = simulation.graph();

        let overlay = GraphArtifact::overlay(&report.structure.overlay);
        let degrees = DegreeSummary::of(&overlay, graph.node_count());
        let diameters = component_diameters(&overlay, graph.node_count());
        log_statistics(&degrees, &diameters);

        for mismatch in &report.verification.mismatches {
            writeln!(out, "{}", mismatch)?;
        }

        let mismatched = !report.verification.is_clean();
        let stored = if self.config.store.should_store(mismatched) {
            if mismatched {
                warn!("iteration {} has mismatches, storing topology files", iteration);
            }
            gml::store_artifacts(&self.config.output_dir, graph, &report.artifacts(graph), iteration)?
        } else {
            Vec::new()
        };

        Ok(IterationOutcome {
            iteration,
            seed,
            rounds: report.gossip.rounds,
            mismatches: report.verification.mismatches,
            degrees,
            diameters,
            stored,
        })
    }
}

fn log_statistics(degrees: &DegreeSummary, diameters: &[ComponentDiameter]) {
    info!("in_degree min/max/avg/std {}", degrees.incoming);
    info!("out_degree min/max/avg/std {}", degrees.outgoing);
    info!("degree min/max/avg/std {}", degrees.total);
    for component in diameters {
        info!("diameter {} ({} nodes)", component.diameter, component.size);
    }
}
