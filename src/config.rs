use crate::observe::ObservationConfig;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs,
    ops::{Bound, RangeBounds},
    path::Path,
};

/// Largest accepted simulation time, which bounds the size of the dense rate curve.
const MAX_T_MAX: f64 = 1.0e5;

/// Simulation configuration parameters.
///
/// Either loaded from a TOML file (see [`Config::from_file`]) or assembled
/// from command line options, and validated before use.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Kinetic parameters of the process.
    pub model: ModelConfig,

    /// Reporting parameters.
    #[serde(default)]
    pub output: OutputConfig,

    /// Measurement model applied to ensemble end sizes.
    #[serde(default)]
    pub observation: Option<ObservationConfig>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Initial number of cells.
    pub n_init: u64,
    /// Birth rate samples, evenly spread over `[0, t_max]`.
    pub birth_rates: Vec<f64>,
    /// Death rate.
    pub death_rate: f64,
    /// Interaction coefficient reducing the birth rate.
    pub birth_interaction: f64,
    /// Interaction coefficient increasing the death rate.
    pub death_interaction: f64,
    /// Simulation time.
    pub t_max: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Time between reported rows.
    pub print_interval: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            print_interval: 0.1,
        }
    }
}

impl Config {
    /// Load a [`Config`] from a TOML file and validate it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Build a [`Config`] from individual values and validate it.
    pub fn new(model: ModelConfig, output: OutputConfig) -> Result<Self> {
        let config = Self {
            model,
            output,
            observation: None,
        };
        config.validate().context("failed to validate config")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        check_num(model.n_init, 1..).context("invalid initial count")?;
        check_rates(&model.birth_rates).context("invalid birth rate samples")?;
        check_num(model.death_rate, 0.0..f64::INFINITY).context("invalid death rate")?;
        check_num(model.birth_interaction, 0.0..f64::INFINITY)
            .context("invalid birth interaction coefficient")?;
        check_num(model.death_interaction, 0.0..f64::INFINITY)
            .context("invalid death interaction coefficient")?;
        check_num(model.t_max, (Bound::Excluded(0.0), Bound::Included(MAX_T_MAX)))
            .context("invalid simulation time")?;

        check_num(
            self.output.print_interval,
            (Bound::Excluded(0.0), Bound::Unbounded),
        )
        .context("invalid print interval")?;

        if let Some(observation) = &self.observation {
            observation
                .validate()
                .context("invalid observation model")?;
        }

        Ok(())
    }
}

/// Parse a birth rate literal such as `[0.5, 1.0 2.0]`.
///
/// Brackets are optional; values may be separated by commas, whitespace or both.
pub fn parse_rate_samples(literal: &str) -> Result<Vec<f64>> {
    let trimmed = literal.trim();
    let inner = trimmed.strip_prefix('[').unwrap_or(trimmed);
    let inner = inner.strip_suffix(']').unwrap_or(inner);

    let samples = inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            tok.parse::<f64>()
                .with_context(|| format!("failed to parse {tok:?} as a number"))
        })
        .collect::<Result<Vec<_>>>()?;

    if samples.is_empty() {
        bail!("no numbers found in {literal:?}");
    }
    Ok(samples)
}

pub fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_rates(vec: &[f64]) -> Result<()> {
    // Interpolation needs at least two knots.
    let len = vec.len();
    if len < 2 {
        bail!("vector must have at least 2 elements, but has {len}");
    }
    for (idx, &ele) in vec.iter().enumerate() {
        check_num(ele, 0.0..f64::INFINITY).with_context(|| format!("invalid element {idx}"))?;
    }
    Ok(())
}
