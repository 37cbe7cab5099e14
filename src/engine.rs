use crate::rate::{RateProfile, next_step_time};
use crate::report::{Row, Sink};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_distr::Uniform;

/// Kind of event a channel produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Birth,
    Death,
}

const EVENT_KINDS: [EventKind; 2] = [EventKind::Birth, EventKind::Death];

/// Birth and death values of one cell type.
///
/// Every cell type owns two channels; this pairs the per-channel scalars
/// (propensity, integrated hazard, threshold) of one type.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Channels {
    pub birth: f64,
    pub death: f64,
}

impl Channels {
    pub fn get(&self, kind: EventKind) -> f64 {
        match kind {
            EventKind::Birth => self.birth,
            EventKind::Death => self.death,
        }
    }

    fn get_mut(&mut self, kind: EventKind) -> &mut f64 {
        match kind {
            EventKind::Birth => &mut self.birth,
            EventKind::Death => &mut self.death,
        }
    }
}

/// Evolving state of the simulation.
#[derive(Debug, Clone)]
pub struct PopulationState {
    /// Current simulation time.
    pub time: f64,
    /// Population size of every cell type.
    pub counts: Vec<u64>,
    /// Current propensities.
    pub propensity: Vec<Channels>,
    /// Hazard consumed by every channel so far.
    pub integrated_hazard: Vec<Channels>,
    /// Integrated hazard at which every channel fires next.
    pub threshold: Vec<Channels>,
}

/// Next event selected by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Event {
    i_type: usize,
    kind: EventKind,
    dt: f64,
}

/// Simulation engine.
///
/// Advances the population with a modified next reaction method: every channel
/// has its own unit-rate exponential clock, and propensities are recomputed
/// after each event and held constant until the next one.
pub struct Engine<'a, R: Rng> {
    profiles: &'a [RateProfile],
    state: PopulationState,
    rng: R,
    unif: Uniform<f64>,
    n_events: u64,
}

impl<'a, R: Rng> Engine<'a, R> {
    /// Create an engine with one rate profile and one initial count per cell type.
    ///
    /// Draws the initial thresholds and computes the initial propensities.
    pub fn new(profiles: &'a [RateProfile], counts: Vec<u64>, rng: R) -> Result<Self> {
        let n_types = profiles.len();
        if n_types == 0 {
            bail!("at least one cell type is required");
        }
        if counts.len() != n_types {
            bail!(
                "number of initial counts must be {n_types}, but is {}",
                counts.len()
            );
        }

        // Smallest positive value, so a draw is never 0.
        let unif = Uniform::new(f64::from_bits(1), 1.0).context("failed to build distribution")?;

        let state = PopulationState {
            time: 0.0,
            counts,
            propensity: vec![Channels::default(); n_types],
            integrated_hazard: vec![Channels::default(); n_types],
            threshold: vec![Channels::default(); n_types],
        };

        let mut engine = Self {
            profiles,
            state,
            rng,
            unif,
            n_events: 0,
        };
        engine.init();
        Ok(engine)
    }

    fn init(&mut self) {
        for i_type in 0..self.state.threshold.len() {
            for kind in EVENT_KINDS {
                let threshold = self.draw_threshold();
                *self.state.threshold[i_type].get_mut(kind) = threshold;
            }
        }
        self.update_propensities();
    }

    pub fn state(&self) -> &PopulationState {
        &self.state
    }

    /// Number of events applied so far.
    pub fn n_events(&self) -> u64 {
        self.n_events
    }

    /// Run until the clock reaches `end_time`, reporting rows to `sink`.
    ///
    /// A row is reported at the start, at the first step past every multiple of
    /// `print_interval`, and once more for the end state.
    pub fn run<S: Sink>(&mut self, end_time: f64, print_interval: f64, sink: &mut S) -> Result<()> {
        sink.record(&self.row()).context("failed to record initial row")?;

        let mut next_print = self.state.time + print_interval;
        while self.state.time < end_time {
            let event = self.next_event();

            if self.state.time > next_print {
                sink.record(&self.row()).context("failed to record row")?;
                next_print += print_interval;
            }

            let Some(event) = event else {
                if self.state.counts.iter().all(|&count| count == 0) {
                    log::debug!("population extinct at time {}", self.state.time);
                    self.state.time = end_time;
                    break;
                }
                // Nothing can fire at this rate; wait for the next rate step.
                self.state.time = next_step_time(self.state.time).min(end_time);
                self.update_propensities();
                continue;
            };

            self.apply_event(event).context("failed to apply event")?;
        }

        sink.record(&self.row()).context("failed to record final row")?;

        Ok(())
    }

    /// Give back the random number generator, e.g. to keep drawing from its stream.
    pub fn into_rng(self) -> R {
        self.rng
    }

    /// Current reporting row.
    pub fn row(&self) -> Row {
        Row {
            time: self.state.time,
            counts: self.state.counts.clone(),
            rate: self.profiles[0].birth_rate(self.state.time),
        }
    }

    fn draw_threshold(&mut self) -> f64 {
        -self.unif.sample(&mut self.rng).ln()
    }

    /// Recompute the propensity of every channel at the current time.
    ///
    /// Death propensities are computed first: a negative birth propensity is
    /// clamped to 0 and its deficit added to the death propensity of that type.
    fn update_propensities(&mut self) {
        let t = self.state.time;
        let total: u64 = self.state.counts.iter().sum();
        // Cells do not interact with themselves.
        let others = total as f64 - 1.0;

        for ((prf, &count), prop) in self
            .profiles
            .iter()
            .zip(&self.state.counts)
            .zip(&mut self.state.propensity)
        {
            let n = count as f64;
            let birth_rate = prf.birth_rate(t);
            let death_rate = prf.death_rate();
            // Scaling by the net growth rate keeps the carrying capacity constant.
            let growth_rate = birth_rate - death_rate;

            let death = death_rate * n + others * n * prf.death_interaction() * growth_rate;
            prop.death = death.max(0.0);

            let birth = birth_rate * n - others * n * prf.birth_interaction() * growth_rate;
            if birth >= 0.0 {
                prop.birth = birth;
            } else {
                prop.birth = 0.0;
                prop.death -= birth;
            }
        }
    }

    /// Channel whose threshold is reached first under the current propensities.
    ///
    /// Returns `None` if no channel has a positive propensity.
    fn next_event(&self) -> Option<Event> {
        let mut next: Option<Event> = None;
        for (i_type, ((prop, hzd), thr)) in self
            .state
            .propensity
            .iter()
            .zip(&self.state.integrated_hazard)
            .zip(&self.state.threshold)
            .enumerate()
        {
            for kind in EVENT_KINDS {
                let dt = time_to_threshold(prop.get(kind), hzd.get(kind), thr.get(kind));
                if dt < next.map_or(f64::INFINITY, |event| event.dt) {
                    next = Some(Event { i_type, kind, dt });
                }
            }
        }
        next
    }

    fn apply_event(&mut self, event: Event) -> Result<()> {
        let Event { i_type, kind, dt } = event;

        self.state.time += dt;

        let count = &mut self.state.counts[i_type];
        match kind {
            EventKind::Birth => *count += 1,
            EventKind::Death => {
                *count = count
                    .checked_sub(1)
                    .with_context(|| format!("death of type {i_type} with no cells left"))?;
            }
        }

        // All clocks advance together.
        for (hzd, prop) in self
            .state
            .integrated_hazard
            .iter_mut()
            .zip(&self.state.propensity)
        {
            hzd.birth += prop.birth * dt;
            hzd.death += prop.death * dt;
        }

        let threshold = self.draw_threshold();
        *self.state.threshold[i_type].get_mut(kind) += threshold;

        self.update_propensities();
        self.n_events += 1;

        Ok(())
    }
}

/// Time until a channel reaches its threshold if its propensity stays constant.
fn time_to_threshold(propensity: f64, integrated_hazard: f64, threshold: f64) -> f64 {
    if propensity > 0.0 {
        // Rounding can leave the hazard slightly past the threshold.
        (threshold - integrated_hazard).max(0.0) / propensity
    } else {
        f64::INFINITY
    }
}
