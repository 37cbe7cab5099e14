use crate::config::check_num;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_distr::{Normal, Poisson};
use serde::{Deserialize, Serialize};
use std::ops::Bound;

/// One step of the measurement process, applied to a population size.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum Filter {
    /// Leaves the size unchanged.
    Copy,
    /// Deterministic sampling of a fraction of the cells.
    Perfect { sample: f64 },
    /// Random sampling of a fraction of the cells.
    Poisson { sample: f64 },
    /// Gaussian noise with a constant coefficient of variation.
    GaussMultiplicative { mean: f64, sigma: f64 },
    /// Gaussian noise with a constant standard deviation.
    GaussAdditive { mean: f64, sigma: f64 },
}

/// Maps a simulated size onto what an experiment would measure.
///
/// The size is first scaled back by every dilution, then passed through the
/// filters in order and rounded.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct ObservationConfig {
    /// Dilution factors undone before measuring.
    #[serde(default)]
    pub dilutions: Vec<f64>,

    /// Measurement filters.
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl ObservationConfig {
    pub fn validate(&self) -> Result<()> {
        for (idx, &dilution) in self.dilutions.iter().enumerate() {
            check_num(dilution, (Bound::Excluded(0.0), Bound::Excluded(f64::INFINITY)))
                .with_context(|| format!("invalid dilution {idx}"))?;
        }
        for (idx, filter) in self.filters.iter().enumerate() {
            filter
                .validate()
                .with_context(|| format!("invalid filter {idx}"))?;
        }
        Ok(())
    }

    /// Observed value of a population of `size` cells.
    pub fn observe<R: Rng + ?Sized>(&self, size: f64, rng: &mut R) -> Result<f64> {
        let mut size = size;
        for &dilution in &self.dilutions {
            size /= dilution;
        }
        for filter in &self.filters {
            size = filter.apply(size, rng)?;
        }
        Ok(size.round())
    }
}

impl Filter {
    fn validate(&self) -> Result<()> {
        match *self {
            Filter::Copy => {}
            Filter::Perfect { sample } | Filter::Poisson { sample } => {
                check_num(sample, 0.0..f64::INFINITY).context("invalid sample fraction")?;
            }
            Filter::GaussMultiplicative { mean, sigma } | Filter::GaussAdditive { mean, sigma } => {
                check_num(mean, f64::MIN..=f64::MAX).context("invalid mean")?;
                check_num(sigma, 0.0..f64::INFINITY).context("invalid standard deviation")?;
            }
        }
        Ok(())
    }

    fn apply<R: Rng + ?Sized>(&self, size: f64, rng: &mut R) -> Result<f64> {
        let size = match *self {
            Filter::Copy => size,
            Filter::Perfect { sample } => size * sample,
            Filter::Poisson { sample } => {
                let lambda = size * sample;
                // Poisson needs a positive mean.
                if lambda > 0.0 {
                    Poisson::new(lambda)
                        .context("failed to build Poisson distribution")?
                        .sample(rng)
                } else {
                    0.0
                }
            }
            Filter::GaussMultiplicative { mean, sigma } => {
                size * Normal::new(mean, sigma)
                    .context("failed to build normal distribution")?
                    .sample(rng)
            }
            Filter::GaussAdditive { mean, sigma } => {
                size + Normal::new(mean, sigma)
                    .context("failed to build normal distribution")?
                    .sample(rng)
            }
        };
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Accumulator;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn observation(dilutions: Vec<f64>, filters: Vec<Filter>) -> ObservationConfig {
        ObservationConfig { dilutions, filters }
    }

    #[test]
    fn deterministic_filters() {
        let mut rng = ChaCha12Rng::seed_from_u64(1);

        let obs = observation(vec![], vec![Filter::Copy]);
        assert_eq!(obs.observe(123.0, &mut rng).unwrap(), 123.0);

        let obs = observation(vec![2.0, 5.0], vec![Filter::Perfect { sample: 0.5 }]);
        assert_eq!(obs.observe(1000.0, &mut rng).unwrap(), 50.0);

        let obs = observation(vec![], vec![Filter::Perfect { sample: 0.3 }]);
        assert_eq!(obs.observe(11.0, &mut rng).unwrap(), 3.0);

        let obs = observation(
            vec![],
            vec![Filter::GaussAdditive {
                mean: 4.0,
                sigma: 0.0,
            }],
        );
        assert_eq!(obs.observe(10.0, &mut rng).unwrap(), 14.0);
    }

    #[test]
    fn poisson_sampling_mean() {
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        let obs = observation(vec![], vec![Filter::Poisson { sample: 0.1 }]);
        let mut acc = Accumulator::new();
        for _ in 0..2000 {
            let val = obs.observe(1000.0, &mut rng).unwrap();
            assert!(val >= 0.0 && val.fract() == 0.0);
            acc.add(val);
        }
        let report = acc.report();
        assert!((report.mean - 100.0).abs() < 1.5, "mean {}", report.mean);
        assert!((report.std_dev - 10.0).abs() < 1.5, "std dev {}", report.std_dev);

        assert_eq!(obs.observe(0.0, &mut rng).unwrap(), 0.0);
    }

    #[test]
    fn multiplicative_noise_scales_with_size() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let filter = Filter::GaussMultiplicative {
            mean: 1.0,
            sigma: 0.1,
        };
        let obs = observation(vec![], vec![filter]);
        let mut acc = Accumulator::new();
        for _ in 0..2000 {
            acc.add(obs.observe(500.0, &mut rng).unwrap());
        }
        let report = acc.report();
        assert!((report.mean - 500.0).abs() < 5.0, "mean {}", report.mean);
        assert!((report.std_dev - 50.0).abs() < 5.0, "std dev {}", report.std_dev);
    }

    #[test]
    fn invalid_observation_is_rejected() {
        let obs = observation(vec![0.0], vec![]);
        assert!(obs.validate().is_err());

        let obs = observation(vec![], vec![Filter::Poisson { sample: -0.1 }]);
        let msg = format!("{:#}", obs.validate().unwrap_err());
        assert!(msg.contains("invalid filter 0"), "{msg}");

        let filter = Filter::GaussAdditive {
            mean: 0.0,
            sigma: f64::INFINITY,
        };
        assert!(observation(vec![], vec![filter]).validate().is_err());

        assert!(observation(vec![2.0], vec![Filter::Copy]).validate().is_ok());
    }

    #[test]
    fn filters_are_deserialized() {
        let contents = r#"
dilutions = [ 4.0,]

[[filters]]
name = "poisson"
sample = 0.25

[[filters]]
name = "gauss-multiplicative"
mean = 1.0
sigma = 0.05

[[filters]]
name = "copy"
"#;
        let obs: ObservationConfig = toml::from_str(contents).unwrap();
        assert_eq!(obs.dilutions, vec![4.0]);
        assert_eq!(
            obs.filters,
            vec![
                Filter::Poisson { sample: 0.25 },
                Filter::GaussMultiplicative {
                    mean: 1.0,
                    sigma: 0.05
                },
                Filter::Copy,
            ]
        );
    }
}
