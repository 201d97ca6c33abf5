//! Error types for engine construction and state overrides.

/// Error returned when transition or holding-time tables are rejected,
/// or when a state name does not belong to the engine's state set.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Returned when the transition table has no states.
    #[error("transition table is empty")]
    EmptyTable,

    /// Returned when a state's outgoing weights do not sum to one.
    #[error("transition probabilities for '{state}' do not sum to one (sum={sum})")]
    ProbabilitiesDoNotSumToOne {
        /// Source state of the offending row.
        state: String,
        /// Computed sum of the row.
        sum: f64,
    },

    /// Returned when a weight is negative or non-finite.
    #[error("invalid transition weight from '{from}' to '{to}': {weight}")]
    InvalidWeight {
        /// Source state.
        from: String,
        /// Destination state.
        to: String,
        /// The invalid weight.
        weight: f64,
    },

    /// Returned when a non-zero weight points to a state that is not a table key.
    #[error("transition from '{from}' points to unknown state '{to}'")]
    UnknownDestination {
        /// Source state.
        from: String,
        /// Unknown destination state.
        to: String,
    },

    /// Returned when a state has no holding-time entry.
    #[error("missing holding time for state '{state}'")]
    MissingHoldingTime {
        /// State without a holding time.
        state: String,
    },

    /// Returned when a holding time is not a positive number of ticks.
    #[error("invalid holding time for state '{state}': {ticks} (must be > 0)")]
    InvalidHoldingTime {
        /// State with the invalid holding time.
        state: String,
        /// The invalid holding time.
        ticks: i64,
    },

    /// Returned when a state name is not part of the state set.
    #[error("unknown state '{state}'")]
    UnknownState {
        /// The unknown state name.
        state: String,
    },
}
