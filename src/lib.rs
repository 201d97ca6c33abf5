//! Semi-Markov simulation of a small discrete-state weather model.
//!
//! A [`SemiMarkovEngine`] stays in each state for its holding time, then draws
//! the next state from the state's row of transition weights. Long runs
//! estimate the fraction of time spent in each state.
//!
//! ```rust
//! use tempestas::{Config, SemiMarkovEngine};
//!
//! let cfg = Config::default();
//! let mut engine =
//!     SemiMarkovEngine::with_seed(&cfg.model.transitions, &cfg.model.holding_times, 7).unwrap();
//! let report = engine.run(1_000);
//! assert_eq!(report.total(), 1_000);
//! ```

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod model;
pub mod stats;

pub use config::Config;
pub use engine::{INITIAL_STATE, SemiMarkovEngine, Ticks};
pub use error::ValidationError;
pub use model::{Chain, FrequencyReport, HoldingTimeTable, TransitionTable};
