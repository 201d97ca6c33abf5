//! Simulation data types.

use crate::error::ValidationError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Transition weights: source state -> (destination state -> weight).
///
/// The key order of the outer map defines the state order.
pub type TransitionTable = IndexMap<String, IndexMap<String, f64>>;

/// Holding times in ticks: state -> minimum number of ticks spent in it once entered.
pub type HoldingTimeTable = IndexMap<String, i64>;

/// Absolute tolerance on the sum of each row of transition weights.
pub const PROB_SUM_TOL: f64 = 1e-6;

/// Validated, index-based form of a transition table and a holding-time table.
///
/// States are identified by their position in the transition table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    names: Vec<String>,
    prob_trans: Vec<Vec<f64>>,
    cum_trans: Vec<Vec<f64>>,
    holding_times: Vec<u64>,
}

impl Chain {
    /// Validate both tables and build the chain.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] if the table is empty, if a weight is
    /// negative, non-finite or points to an unknown state with a non-zero value,
    /// if a row does not sum to one, or if a holding time is missing or not positive.
    pub fn new(
        transitions: &TransitionTable,
        holding_times: &HoldingTimeTable,
    ) -> Result<Self, ValidationError> {
        if transitions.is_empty() {
            return Err(ValidationError::EmptyTable);
        }

        let names: Vec<String> = transitions.keys().cloned().collect();

        let mut prob_trans = Vec::with_capacity(names.len());
        for (from, row) in transitions {
            check_row(from, row, transitions)?;
            prob_trans.push(
                names
                    .iter()
                    .map(|to| row.get(to).copied().unwrap_or(0.0))
                    .collect::<Vec<_>>(),
            );
        }

        let cum_trans = prob_trans
            .iter()
            .map(|row| {
                row.iter()
                    .scan(0.0, |acc, &prob| {
                        *acc += prob;
                        Some(*acc)
                    })
                    .collect()
            })
            .collect();

        let mut ticks_vec = Vec::with_capacity(names.len());
        for state in &names {
            let ticks = *holding_times
                .get(state)
                .ok_or_else(|| ValidationError::MissingHoldingTime {
                    state: state.clone(),
                })?;
            if ticks <= 0 {
                return Err(ValidationError::InvalidHoldingTime {
                    state: state.clone(),
                    ticks,
                });
            }
            ticks_vec.push(ticks as u64);
        }

        Ok(Self {
            names,
            prob_trans,
            cum_trans,
            holding_times: ticks_vec,
        })
    }

    /// Number of states.
    pub fn n_states(&self) -> usize {
        self.names.len()
    }

    /// State names in table order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Name of the state at `idx`.
    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    /// Position of the state called `name`, if it belongs to the chain.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|state| state == name)
    }

    /// Holding time of the state at `idx`.
    pub fn holding_time(&self, idx: usize) -> u64 {
        self.holding_times[idx]
    }

    /// Transition probabilities out of the state at `from`, in state order.
    pub fn prob_row(&self, from: usize) -> &[f64] {
        &self.prob_trans[from]
    }

    /// Whether every table has one entry per state and all holding times are positive.
    pub(crate) fn is_well_formed(&self) -> bool {
        let n = self.names.len();
        n > 0
            && self.prob_trans.len() == n
            && self.cum_trans.len() == n
            && self.holding_times.len() == n
            && self.prob_trans.iter().all(|row| row.len() == n)
            && self.cum_trans.iter().all(|row| row.len() == n)
            && self.holding_times.iter().all(|&ticks| ticks > 0)
    }

    /// Map a uniform variate `u` in `[0, 1)` to a destination of `from`.
    ///
    /// Destinations with zero weight are never returned.
    pub fn draw(&self, from: usize, u: f64) -> usize {
        let cum_row = &self.cum_trans[from];
        let total = cum_row[cum_row.len() - 1];
        let target = u * total;
        let idx = cum_row.partition_point(|&cum| cum <= target);
        if idx < cum_row.len() {
            return idx;
        }
        // Only reachable through rounding when `u` is within an ulp of 1.
        self.prob_trans[from]
            .iter()
            .rposition(|&prob| prob > 0.0)
            .unwrap_or(from)
    }
}

fn check_row(
    from: &str,
    row: &IndexMap<String, f64>,
    transitions: &TransitionTable,
) -> Result<(), ValidationError> {
    for (to, &weight) in row {
        if !weight.is_finite() || weight < 0.0 {
            return Err(ValidationError::InvalidWeight {
                from: from.to_string(),
                to: to.clone(),
                weight,
            });
        }
        if weight > 0.0 && !transitions.contains_key(to) {
            return Err(ValidationError::UnknownDestination {
                from: from.to_string(),
                to: to.clone(),
            });
        }
    }

    let sum: f64 = row.values().sum();
    if (sum - 1.0).abs() > PROB_SUM_TOL {
        return Err(ValidationError::ProbabilitiesDoNotSumToOne {
            state: from.to_string(),
            sum,
        });
    }

    Ok(())
}

/// Long-run visitation frequencies produced by a simulation run.
///
/// Entries follow the state order of the chain that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyReport {
    /// State names.
    pub states: Vec<String>,
    /// Number of ticks spent in each state.
    pub counts: Vec<u64>,
    /// Percentage of ticks spent in each state.
    pub percentages: Vec<f64>,
}

impl FrequencyReport {
    /// Build a report from per-state tick counts.
    ///
    /// With no ticks counted every percentage is zero.
    pub fn from_counts(states: Vec<String>, counts: Vec<u64>) -> Self {
        let total: u64 = counts.iter().sum();
        let percentages = if total == 0 {
            vec![0.0; counts.len()]
        } else {
            counts
                .iter()
                .map(|&count| count as f64 / total as f64 * 100.0)
                .collect()
        };
        Self {
            states,
            counts,
            percentages,
        }
    }

    /// Total number of ticks counted.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Percentage of ticks spent in `state`.
    pub fn percentage(&self, state: &str) -> Option<f64> {
        let idx = self.states.iter().position(|name| name == state)?;
        Some(self.percentages[idx])
    }

    /// `(state, percentage)` pairs in state order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.states
            .iter()
            .map(String::as_str)
            .zip(self.percentages.iter().copied())
    }
}
