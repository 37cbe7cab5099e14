use crate::config::Config;
use crate::engine::Engine;
use crate::rate::RateProfile;
use crate::report::{FinalRow, Sink, TsvWriter};
use crate::stats::{Accumulator, AccumulatorReport};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use std::{io::Write, slice};

/// Runs simulations of a validated configuration.
///
/// Every run draws from its own ChaCha stream of a single base seed, so any
/// run can be reproduced from the seed and its index.
pub struct Manager {
    cfg: Config,
    seed: u64,
    profile: RateProfile,
}

impl Manager {
    /// Create a manager, drawing a seed from the OS if none is given.
    pub fn new(cfg: Config, seed: Option<u64>) -> Result<Self> {
        let seed = match seed {
            Some(seed) => seed,
            None => ChaCha12Rng::try_from_os_rng()
                .context("failed to seed from OS")?
                .next_u64(),
        };
        log::info!("seed = {seed}");

        let profile = RateProfile::from_model(&cfg.model).context("failed to build rate profile")?;
        log::info!(
            "interpolated {} birth rate samples over [0, {}]",
            profile.base_samples().len(),
            profile.horizon()
        );

        Ok(Self { cfg, seed, profile })
    }

    /// Simulate one trajectory and write it as a table.
    pub fn run_trajectory<W: Write>(&self, writer: W) -> Result<()> {
        let mut tsv = TsvWriter::new(writer, 1).context("failed to construct writer")?;

        let (final_size, _) = self.run(0, &mut tsv).context("failed to run simulation")?;

        tsv.flush()?;
        log::info!("final size = {final_size}");

        Ok(())
    }

    /// Simulate `n_runs` independent trajectories and write their final rows.
    ///
    /// With an observation model, every row also gets the observed size, drawn
    /// from the same random stream after the run.
    pub fn run_ensemble<W: Write>(&self, n_runs: u64, writer: W) -> Result<AccumulatorReport> {
        let observation = self.cfg.observation.as_ref();
        let extra: &[&str] = if observation.is_some() { &["observed"] } else { &[] };
        let mut tsv =
            TsvWriter::with_run_column(writer, 1, extra).context("failed to construct writer")?;
        let mut acc = Accumulator::new();
        let mut obs_acc = Accumulator::new();

        for run_idx in 0..n_runs {
            let mut fin = FinalRow::new();
            let (final_size, mut rng) = self
                .run(run_idx, &mut fin)
                .with_context(|| format!("failed to run simulation {run_idx}"))?;
            acc.add(final_size as f64);

            let observed = match observation {
                Some(obs) => {
                    let val = obs
                        .observe(final_size as f64, &mut rng)
                        .context("failed to observe final size")?;
                    obs_acc.add(val);
                    vec![val]
                }
                None => Vec::new(),
            };

            if let Some(row) = fin.into_row() {
                tsv.set_run(run_idx);
                tsv.record_with(&row, &observed)?;
            }

            let progress = 100.0 * (run_idx + 1) as f64 / n_runs as f64;
            log::info!("completed {progress:06.2}%");
        }

        tsv.flush()?;

        let report = acc.report();
        log::info!(
            "final size over {} runs: mean = {:.3}, std dev = {:.3}, sem = {:.3}",
            report.n_vals,
            report.mean,
            report.std_dev,
            report.sem
        );
        if observation.is_some() {
            let obs_report = obs_acc.report();
            log::info!(
                "observed size: mean = {:.3}, std dev = {:.3}, sem = {:.3}",
                obs_report.mean,
                obs_report.std_dev,
                obs_report.sem
            );
        }

        Ok(report)
    }

    fn run<S: Sink>(&self, run_idx: u64, sink: &mut S) -> Result<(u64, ChaCha12Rng)> {
        let mut rng = ChaCha12Rng::seed_from_u64(self.seed);
        rng.set_stream(run_idx);

        let model = &self.cfg.model;
        let mut engine = Engine::new(slice::from_ref(&self.profile), vec![model.n_init], rng)
            .context("failed to construct engine")?;

        engine.run(self.profile.horizon(), self.cfg.output.print_interval, sink)?;

        let final_size = engine.state().counts.iter().sum();
        log::debug!("run {run_idx}: {} events", engine.n_events());

        Ok((final_size, engine.into_rng()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, OutputConfig};
    use crate::observe::{Filter, ObservationConfig};

    fn config() -> Config {
        let model = ModelConfig {
            n_init: 20,
            birth_rates: vec![1.0, 0.5],
            death_rate: 0.3,
            birth_interaction: 0.001,
            death_interaction: 0.0,
            t_max: 2.0,
        };
        Config::new(model, OutputConfig::default()).unwrap()
    }

    #[test]
    fn trajectory_is_reproducible() {
        let mgr = Manager::new(config(), Some(17)).unwrap();
        let mut first = Vec::new();
        mgr.run_trajectory(&mut first).unwrap();
        let mut second = Vec::new();
        mgr.run_trajectory(&mut second).unwrap();

        assert_eq!(first, second);
        let text = String::from_utf8(first).unwrap();
        assert!(text.starts_with("time\tsize\trate\n0\t20\t1\n"));
    }

    #[test]
    fn ensemble_writes_one_row_per_run() {
        let mgr = Manager::new(config(), Some(17)).unwrap();
        let mut buf = Vec::new();
        let report = mgr.run_ensemble(4, &mut buf).unwrap();
        assert_eq!(report.n_vals, 4);

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "run\ttime\tsize\trate");
        for (run_idx, line) in lines[1..].iter().enumerate() {
            let fields: Vec<_> = line.split('\t').collect();
            assert_eq!(fields[0], run_idx.to_string());
            assert!(fields[1].parse::<f64>().unwrap() >= 2.0);
        }
    }

    #[test]
    fn ensemble_reports_observed_sizes() {
        let mut cfg = config();
        cfg.observation = Some(ObservationConfig {
            dilutions: vec![2.0],
            filters: vec![Filter::Perfect { sample: 0.5 }],
        });
        cfg.validate().unwrap();
        let mgr = Manager::new(cfg, Some(5)).unwrap();
        let mut buf = Vec::new();
        mgr.run_ensemble(3, &mut buf).unwrap();

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "run\ttime\tsize\trate\tobserved");
        for line in &lines[1..] {
            let fields: Vec<_> = line.split('\t').collect();
            let size: f64 = fields[2].parse().unwrap();
            let observed: f64 = fields[4].parse().unwrap();
            assert_eq!(observed, (size / 4.0).round());
        }
    }
}
