//! Simulation configuration.
//!
//! Loaded from a TOML file (conventionally `tangle.toml`). Every field has a
//! default, so an empty file or a missing section is valid. CLI flags
//! override file values.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::constants;
use crate::tangle::{walker_count, TipSelector, WalkBias};

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub simulation: SimulationConfig,
    pub selection: SelectionConfig,
}

/// Driver parameters: how many actors, how fast they issue, when to stop.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub actors: usize,
    /// Stop once a transaction with this id is confirmed attached
    pub transaction_limit: u64,
    /// Mean time between an actor's issuances
    pub issue_interval_ms: u64,
    /// Simulated proof-of-work delay between snapshot and attach
    pub pow_time_ms: u64,
    /// One-way delay between an actor and the ledger
    pub link_delay_ms: u64,
    pub issue_time: IssueTime,
    pub seed: u64,
}

/// Which virtual time a new transaction is stamped with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum IssueTime {
    /// When proof of work completes, for every strategy.
    #[default]
    PowComplete,
    /// Walk strategies stamp with the time their tip view was taken; uniform
    /// selection still stamps with the completion time.
    TipView,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            actors: constants::DEFAULT_ACTORS,
            transaction_limit: constants::DEFAULT_TRANSACTION_LIMIT,
            issue_interval_ms: constants::DEFAULT_ISSUE_INTERVAL_MS,
            pow_time_ms: constants::DEFAULT_POW_TIME_MS,
            link_delay_ms: 0,
            issue_time: IssueTime::default(),
            seed: 1,
        }
    }
}

/// Which tip-selection strategy actors use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    UniformRandom,
    #[default]
    WeightedWalk,
    MultiWalker,
}

/// Tip-selection parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub strategy: Strategy,
    /// Approvees per transaction (K)
    pub fan_out: usize,
    /// Probability of stepping to the heaviest candidate, in [0, 1]
    pub alpha: f64,
    pub walk_bias: WalkBias,
    pub backtrack_distance: usize,
    pub k_multiplier: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        SelectionConfig {
            strategy: Strategy::default(),
            fan_out: constants::DEFAULT_FAN_OUT,
            alpha: constants::DEFAULT_ALPHA,
            walk_bias: WalkBias::default(),
            backtrack_distance: constants::DEFAULT_BACKTRACK_DISTANCE,
            k_multiplier: constants::DEFAULT_K_MULTIPLIER,
        }
    }
}

impl SelectionConfig {
    pub fn selector(&self) -> TipSelector {
        match self.strategy {
            Strategy::UniformRandom => TipSelector::UniformRandom,
            Strategy::WeightedWalk => TipSelector::WeightedWalk {
                alpha: self.alpha,
                backtrack_distance: self.backtrack_distance,
                bias: self.walk_bias,
            },
            Strategy::MultiWalker => TipSelector::MultiWalker {
                alpha: self.alpha,
                backtrack_distance: self.backtrack_distance,
                k_multiplier: self.k_multiplier,
            },
        }
    }
}

impl SimConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `tangle.toml` from `dir`, falling back to defaults if the file
    /// doesn't exist.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(constants::CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        let sel = &self.selection;
        if sim.actors == 0 {
            return Err(ConfigError::Invalid("simulation.actors must be at least 1".into()));
        }
        if sim.transaction_limit == 0 {
            return Err(ConfigError::Invalid(
                "simulation.transaction_limit must be at least 1".into(),
            ));
        }
        if sel.fan_out == 0 || sel.fan_out > constants::MAX_FAN_OUT {
            return Err(ConfigError::Invalid(format!(
                "selection.fan_out must be between 1 and {}, got {}",
                constants::MAX_FAN_OUT,
                sel.fan_out
            )));
        }
        if sel.k_multiplier > constants::MAX_K_MULTIPLIER
            || walker_count(sel.k_multiplier, sel.fan_out).is_none()
        {
            return Err(ConfigError::Invalid(format!(
                "selection.k_multiplier must be at most {}, got {}",
                constants::MAX_K_MULTIPLIER,
                sel.k_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&sel.alpha) {
            return Err(ConfigError::Invalid(format!(
                "selection.alpha must be within [0, 1], got {}",
                sel.alpha
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_valid() {
        let config = SimConfig::default();
        config.validate().unwrap();
        assert_eq!(config.selection.fan_out, constants::DEFAULT_FAN_OUT);
        assert_eq!(config.selection.strategy, Strategy::WeightedWalk);
        assert_eq!(config.selection.walk_bias, WalkBias::ExcludeHeaviest);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[simulation]
actors = 4
transaction_limit = 250
seed = 9

[selection]
strategy = "multi-walker"
alpha = 0.25
walk_bias = "inclusive"
k_multiplier = 3
"#;
        let config = SimConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.simulation.actors, 4);
        assert_eq!(config.simulation.transaction_limit, 250);
        assert_eq!(config.simulation.pow_time_ms, constants::DEFAULT_POW_TIME_MS);
        assert_eq!(config.selection.strategy, Strategy::MultiWalker);
        assert_eq!(config.selection.walk_bias, WalkBias::Inclusive);
        assert_eq!(
            config.selection.selector(),
            TipSelector::MultiWalker {
                alpha: 0.25,
                backtrack_distance: constants::DEFAULT_BACKTRACK_DISTANCE,
                k_multiplier: 3,
            }
        );
    }

    #[test]
    fn empty_config_is_default() {
        let config = SimConfig::from_toml_str("").unwrap();
        assert_eq!(config.simulation.actors, constants::DEFAULT_ACTORS);
    }

    #[test]
    fn alpha_out_of_range_rejected() {
        let err = SimConfig::from_toml_str("[selection]\nalpha = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_strategy_rejected() {
        let err = SimConfig::from_toml_str("[selection]\nstrategy = \"greedy\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn fan_out_bounds_enforced() {
        let err = SimConfig::from_toml_str("[selection]\nfan_out = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = SimConfig::from_toml_str("[selection]\nfan_out = 4611686018427387904\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let toml_str = format!("[selection]\nfan_out = {}\n", constants::MAX_FAN_OUT);
        assert!(SimConfig::from_toml_str(&toml_str).is_ok());
    }

    #[test]
    fn huge_k_multiplier_rejected() {
        let err = SimConfig::from_toml_str(
            "[selection]\nstrategy = \"multi-walker\"\nk_multiplier = 9223372036854775807\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let toml_str = format!(
            "[selection]\nk_multiplier = {}\nfan_out = {}\n",
            constants::MAX_K_MULTIPLIER,
            constants::MAX_FAN_OUT
        );
        assert!(SimConfig::from_toml_str(&toml_str).is_ok());
    }

    #[test]
    fn issue_time_parses() {
        let config = SimConfig::from_toml_str("[simulation]\nissue_time = \"tip-view\"\n").unwrap();
        assert_eq!(config.simulation.issue_time, IssueTime::TipView);
        assert_eq!(SimConfig::default().simulation.issue_time, IssueTime::PowComplete);
    }

    #[test]
    fn zero_actors_rejected() {
        let err = SimConfig::from_toml_str("[simulation]\nactors = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_config_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = SimConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.simulation.actors, constants::DEFAULT_ACTORS);
    }

    #[test]
    fn load_from_dir_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(constants::CONFIG_FILE_NAME),
            "[simulation]\nactors = 3\n",
        )
        .unwrap();
        let config = SimConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.simulation.actors, 3);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SimConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
