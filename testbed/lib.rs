//! Sloppy-group simulation testbed
//!
//! Everything around the simulation core that touches the outside world:
//! loading trust graphs from node-link JSON, reading TOML run configuration,
//! repeating runs, summarizing overlay statistics and exporting graph
//! artifacts as GML.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sloppy_testbed::{Runner, TestbedConfig};
//!
//! let config = TestbedConfig::from_toml_str(r#"
//!     input = "topology.json"
//!     iterations = 10
//!     store = "on-mismatch"
//! "#)?;
//!
//! let summary = Runner::new(config)?.run(&mut std::io::stdout())?;
//! println!("{} iterations with mismatches", summary.mismatched_iterations());
//! # Ok::<(), sloppy_testbed::TestbedError>(())
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod gml;
pub mod loader;
pub mod runner;
pub mod stats;

pub use config::{StorePolicy, TestbedConfig};
pub use loader::{load_topology, parse_topology, TopologyInput};
pub use runner::{IterationOutcome, RunSummary, Runner};
pub use stats::{component_diameters, ComponentDiameter, DegreeStats, DegreeSummary};

use sloppy_sim::SimError;

/// Errors surfaced by the testbed
#[derive(Debug, thiserror::Error)]
pub enum TestbedError {
    #[error(transparent)]
    Simulation(#[from] SimError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed topology: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type TestbedResult<T> = Result<T, TestbedError>;
