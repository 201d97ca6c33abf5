use crate::engine::{INITIAL_STATE, SemiMarkovEngine};
use crate::model::{HoldingTimeTable, TransitionTable};
use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Semi-Markov model definition.
    pub model: ModelConfig,
    /// Initial condition.
    #[serde(default)]
    pub init: InitConfig,
    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Transition weights for every state, in state order.
    pub transitions: TransitionTable,
    /// Holding time of every state, in ticks.
    pub holding_times: HoldingTimeTable,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitConfig {
    /// State the engine starts in.
    #[serde(default = "default_state")]
    pub state: String,
    /// Seed of the random number generator (random if absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Number of ticks simulated per run unless overridden.
    #[serde(default = "default_steps")]
    pub steps: u64,
}

fn default_state() -> String {
    INITIAL_STATE.to_string()
}

fn default_steps() -> u64 {
    10_000
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            state: default_state(),
            seed: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
        }
    }
}

impl Default for Config {
    /// Three-state weather model.
    fn default() -> Self {
        let row = |weights: [f64; 3]| -> IndexMap<String, f64> {
            ["sunny", "cloudy", "rainy"]
                .into_iter()
                .map(String::from)
                .zip(weights)
                .collect()
        };

        let transitions: TransitionTable = [
            ("sunny", row([0.7, 0.3, 0.0])),
            ("cloudy", row([0.5, 0.3, 0.2])),
            ("rainy", row([0.6, 0.2, 0.2])),
        ]
        .into_iter()
        .map(|(state, row)| (state.to_string(), row))
        .collect();

        let holding_times: HoldingTimeTable = [("sunny", 1), ("cloudy", 2), ("rainy", 2)]
            .into_iter()
            .map(|(state, ticks)| (state.to_string(), ticks))
            .collect();

        Self {
            model: ModelConfig {
                transitions,
                holding_times,
            },
            init: InitConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Write the config to a TOML file.
    pub fn to_file<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(file, contents).with_context(|| format!("failed to write {file:?}"))?;
        Ok(())
    }

    /// Construct a fresh engine from this configuration.
    pub fn build_engine(&self) -> Result<SemiMarkovEngine> {
        let engine = SemiMarkovEngine::starting_in(
            &self.model.transitions,
            &self.model.holding_times,
            &self.init.state,
            self.init.seed,
        )?;
        Ok(engine)
    }

    fn validate(&self) -> Result<()> {
        check_num(self.model.transitions.len(), 1..1_000).context("invalid number of states")?;
        for (state, &ticks) in &self.model.holding_times {
            check_num(ticks, 1..=1_000_000)
                .with_context(|| format!("invalid holding time of {state:?}"))?;
        }
        check_num(self.output.steps, 0..=100_000_000).context("invalid number of steps")?;

        self.build_engine().context("invalid model")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
