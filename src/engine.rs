use crate::error::ValidationError;
use crate::model::{Chain, FrequencyReport, HoldingTimeTable, TransitionTable};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// State every engine starts in unless told otherwise.
pub const INITIAL_STATE: &str = "sunny";

/// Semi-Markov simulation engine.
///
/// Holds the validated chain, the current state, the ticks left before the
/// next transition draw, and the random number generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemiMarkovEngine {
    chain: Chain,
    current: usize,
    remaining: u64,
    rng: ChaCha12Rng,
}

impl SemiMarkovEngine {
    /// Create a new engine in [`INITIAL_STATE`], seeded from the thread RNG.
    pub fn new(
        transitions: &TransitionTable,
        holding_times: &HoldingTimeTable,
    ) -> Result<Self, ValidationError> {
        let rng = ChaCha12Rng::from_rng(&mut rand::rng());
        Self::build(transitions, holding_times, INITIAL_STATE, rng)
    }

    /// Create a new engine in [`INITIAL_STATE`] with a deterministic seed.
    pub fn with_seed(
        transitions: &TransitionTable,
        holding_times: &HoldingTimeTable,
        seed: u64,
    ) -> Result<Self, ValidationError> {
        let rng = ChaCha12Rng::seed_from_u64(seed);
        Self::build(transitions, holding_times, INITIAL_STATE, rng)
    }

    /// Create a new engine in `initial`, for state sets without [`INITIAL_STATE`].
    ///
    /// Seeds from `seed` when given, otherwise from the thread RNG.
    pub fn starting_in(
        transitions: &TransitionTable,
        holding_times: &HoldingTimeTable,
        initial: &str,
        seed: Option<u64>,
    ) -> Result<Self, ValidationError> {
        let rng = match seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::from_rng(&mut rand::rng()),
        };
        Self::build(transitions, holding_times, initial, rng)
    }

    fn build(
        transitions: &TransitionTable,
        holding_times: &HoldingTimeTable,
        initial: &str,
        rng: ChaCha12Rng,
    ) -> Result<Self, ValidationError> {
        let chain = Chain::new(transitions, holding_times)?;
        let current = chain
            .index_of(initial)
            .ok_or_else(|| ValidationError::UnknownState {
                state: initial.to_string(),
            })?;
        let remaining = chain.holding_time(current);
        log::debug!(
            "constructed engine with states {:?}, starting in {initial:?}",
            chain.names()
        );
        Ok(Self {
            chain,
            current,
            remaining,
            rng,
        })
    }

    /// Ordered state names.
    pub fn states(&self) -> &[String] {
        self.chain.names()
    }

    /// Name of the current state.
    pub fn current_state(&self) -> &str {
        self.chain.name(self.current)
    }

    /// Ticks left before the next transition draw is eligible.
    pub fn remaining_holding_time(&self) -> u64 {
        self.remaining
    }

    /// The validated chain driving this engine.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Advance the process by one tick.
    ///
    /// While ticks remain in the current state only the counter moves;
    /// once it is exhausted exactly one destination is drawn.
    pub fn advance_one_tick(&mut self) {
        if self.remaining > 1 {
            self.remaining -= 1;
            return;
        }
        let u: f64 = self.rng.random();
        self.current = self.chain.draw(self.current, u);
        self.remaining = self.chain.holding_time(self.current);
    }

    /// Move to `state` immediately, resetting its holding time.
    pub fn force_state(&mut self, state: &str) -> Result<(), ValidationError> {
        let idx = self
            .chain
            .index_of(state)
            .ok_or_else(|| ValidationError::UnknownState {
                state: state.to_string(),
            })?;
        self.current = idx;
        self.remaining = self.chain.holding_time(idx);
        log::trace!("forced state {state:?}");
        Ok(())
    }

    /// Simulate `steps` ticks and report the fraction of time spent in each state.
    ///
    /// Each tick is attributed to the state occupied before advancing.
    /// The run continues from the engine's current state and leaves the engine
    /// where the run ended. With `steps == 0` all percentages are zero.
    pub fn run(&mut self, steps: u64) -> FrequencyReport {
        let mut counts = vec![0; self.chain.n_states()];
        for _ in 0..steps {
            counts[self.current] += 1;
            self.advance_one_tick();
        }
        log::debug!("completed run of {steps} ticks");
        FrequencyReport::from_counts(self.chain.names().to_vec(), counts)
    }

    /// Lazy, infinite sequence of state names.
    ///
    /// The first element is the current state; every later element is
    /// produced by advancing the engine one tick when it is requested.
    pub fn ticks(&mut self) -> Ticks<'_> {
        Ticks {
            engine: self,
            started: false,
        }
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self).context("failed to serialize engine")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let engine: Self =
            decode::from_read(&mut reader).context("failed to deserialize engine")?;
        engine.check_checkpoint().context("invalid checkpoint")?;
        Ok(engine)
    }

    fn check_checkpoint(&self) -> Result<()> {
        if !self.chain.is_well_formed() {
            bail!("chain tables have inconsistent dimensions");
        }
        let n_states = self.chain.n_states();
        if self.current >= n_states {
            bail!("current state must be below {n_states}, but is {}", self.current);
        }
        let holding_time = self.chain.holding_time(self.current);
        if !(1..=holding_time).contains(&self.remaining) {
            bail!(
                "remaining ticks must be in the range 1..={holding_time}, but are {}",
                self.remaining
            );
        }
        Ok(())
    }
}

/// Iterator returned by [`SemiMarkovEngine::ticks`].
pub struct Ticks<'a> {
    engine: &'a mut SemiMarkovEngine,
    started: bool,
}

impl Iterator for Ticks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.started {
            self.engine.advance_one_tick();
        } else {
            self.started = true;
        }
        Some(self.engine.current_state().to_string())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}
