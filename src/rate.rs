use crate::config::ModelConfig;
use anyhow::{Result, bail};

/// Number of dense curve samples per unit of time.
pub const SAMPLES_PER_TIME: usize = 100;

/// Start of the dense curve step that follows the one containing `t`.
pub fn next_step_time(t: f64) -> f64 {
    let per_time = SAMPLES_PER_TIME as f64;
    let step = (t * per_time).floor();
    let next = (step + 1.0) / per_time;
    // Rounding can map `t` to the step before the one it is in.
    if next > t { next } else { (step + 2.0) / per_time }
}

/// Time-dependent birth rate of one cell type plus its constant kinetic parameters.
///
/// The coarse `base_samples` are spread evenly over `[0, horizon]` and linearly
/// interpolated once into a dense lookup curve, so [`RateProfile::birth_rate`] is O(1).
#[derive(Debug, Clone)]
pub struct RateProfile {
    base_samples: Vec<f64>,
    death_rate: f64,
    birth_interaction: f64,
    death_interaction: f64,
    horizon: f64,
    dense_curve: Vec<f64>,
}

impl RateProfile {
    /// Build a profile and its dense interpolation curve.
    ///
    /// # Errors
    /// Returns an error if fewer than two samples are given or the horizon is not positive.
    pub fn new(
        base_samples: Vec<f64>,
        death_rate: f64,
        birth_interaction: f64,
        death_interaction: f64,
        horizon: f64,
    ) -> Result<Self> {
        let n_samples = base_samples.len();
        if n_samples < 2 {
            bail!("at least 2 birth rate samples are required, but got {n_samples}");
        }
        if !(horizon > 0.0 && horizon.is_finite()) {
            bail!("horizon must be positive and finite, but is {horizon}");
        }

        let n_steps = (horizon * SAMPLES_PER_TIME as f64).ceil() as usize;
        let max_knot = n_samples - 2;
        let mut dense_curve = Vec::with_capacity(n_steps + 1);
        for z in 0..n_steps {
            let pos = z as f64 / SAMPLES_PER_TIME as f64 / horizon * (n_samples - 1) as f64;
            let i = (pos as usize).min(max_knot);
            let x = pos - i as f64;
            dense_curve.push(base_samples[i] * (1.0 - x) + base_samples[i + 1] * x);
        }
        // Sentinel for lookups at (or just past) the horizon.
        dense_curve.push(base_samples[n_samples - 1]);

        Ok(Self {
            base_samples,
            death_rate,
            birth_interaction,
            death_interaction,
            horizon,
            dense_curve,
        })
    }

    /// Build the profile described by a validated model configuration.
    pub fn from_model(model: &ModelConfig) -> Result<Self> {
        Self::new(
            model.birth_rates.clone(),
            model.death_rate,
            model.birth_interaction,
            model.death_interaction,
            model.t_max,
        )
    }

    /// Birth rate at time `t`.
    ///
    /// Times past the end of the curve (the engine may overshoot the horizon
    /// by one event) read the final sample.
    pub fn birth_rate(&self, t: f64) -> f64 {
        let idx = (t.max(0.0) * SAMPLES_PER_TIME as f64) as usize;
        let idx = idx.min(self.dense_curve.len() - 1);
        self.dense_curve[idx]
    }

    pub fn base_samples(&self) -> &[f64] {
        &self.base_samples
    }

    pub fn death_rate(&self) -> f64 {
        self.death_rate
    }

    pub fn birth_interaction(&self) -> f64 {
        self.birth_interaction
    }

    pub fn death_interaction(&self) -> f64 {
        self.death_interaction
    }

    pub fn horizon(&self) -> f64 {
        self.horizon
    }
}
