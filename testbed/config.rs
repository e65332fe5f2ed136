//! Testbed configuration loaded from TOML.
//!
//! ```toml
//! input = "topology.json"
//! output_dir = "out"
//! iterations = 10
//! store = "on-mismatch"
//!
//! [simulation]
//! seed = 42
//! population_error = 0.1
//! random_walk = "wire"
//! ```

use serde::{Deserialize, Serialize};
use sloppy_sim::{SimError, SimulationConfig};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{TestbedError, TestbedResult};

/// When the four graph artifacts of an iteration are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorePolicy {
    Never,
    Always,
    #[default]
    OnMismatch,
}

impl StorePolicy {
    pub fn should_store(&self, mismatched: bool) -> bool {
        match self {
            StorePolicy::Never => false,
            StorePolicy::Always => true,
            StorePolicy::OnMismatch => mismatched,
        }
    }
}

impl FromStr for StorePolicy {
    type Err = TestbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(StorePolicy::Never),
            "always" => Ok(StorePolicy::Always),
            "on-mismatch" => Ok(StorePolicy::OnMismatch),
            other => Err(TestbedError::Simulation(SimError::Configuration(format!(
                "unknown store policy {:?} (expected never, always or on-mismatch)",
                other
            )))),
        }
    }
}

impl fmt::Display for StorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorePolicy::Never => "never",
            StorePolicy::Always => "always",
            StorePolicy::OnMismatch => "on-mismatch",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestbedConfig {
    /// Node-link JSON topology
    pub input: Option<PathBuf>,
    /// Directory receiving GML artifacts
    pub output_dir: PathBuf,
    pub iterations: usize,
    pub store: StorePolicy,
    pub simulation: SimulationConfig,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            input: None,
            output_dir: PathBuf::from("."),
            iterations: 1,
            store: StorePolicy::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl TestbedConfig {
    pub fn from_toml_str(text: &str) -> TestbedResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> TestbedResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check everything that can be checked before loading the topology
    pub fn validate(&self) -> TestbedResult<()> {
        if self.iterations == 0 {
            return Err(SimError::Configuration("iterations must be positive".to_string()).into());
        }
        if self.input.is_none() {
            return Err(SimError::Configuration("no input topology given".to_string()).into());
        }
        self.simulation.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sloppy_sim::RandomWalkMode;

    #[test]
    fn test_parse_full_config() {
        let config = TestbedConfig::from_toml_str(
            r#"
            input = "topology.json"
            output_dir = "out"
            iterations = 5
            store = "always"

            [simulation]
            seed = 9
            population_error = 0.1
            random_walk = "explore"
            max_gossip_rounds = 40
            "#,
        )
        .unwrap();

        assert_eq!(config.input, Some(PathBuf::from("topology.json")));
        assert_eq!(config.iterations, 5);
        assert_eq!(config.store, StorePolicy::Always);
        assert_eq!(config.simulation.seed, 9);
        assert_eq!(config.simulation.random_walk, RandomWalkMode::Explore);
        assert_eq!(config.simulation.max_gossip_rounds, Some(40));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = TestbedConfig::from_toml_str("input = \"g.json\"").unwrap();
        assert_eq!(config.iterations, 1);
        assert_eq!(config.store, StorePolicy::OnMismatch);
        assert_eq!(config.simulation, SimulationConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(TestbedConfig::from_toml_str("store = \"sometimes\"").is_err());

        let config = TestbedConfig {
            input: Some("g.json".into()),
            iterations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let missing_input = TestbedConfig::default();
        assert!(missing_input.validate().is_err());
    }

    #[test]
    fn test_store_policy() {
        assert!(!StorePolicy::Never.should_store(true));
        assert!(StorePolicy::Always.should_store(false));
        assert!(StorePolicy::OnMismatch.should_store(true));
        assert!(!StorePolicy::OnMismatch.should_store(false));
        assert_eq!("on-mismatch".parse::<StorePolicy>().unwrap(), StorePolicy::OnMismatch);
    }
}
