//! Pure domain logic for the savings engine: time-bounded emission-rate
//! lookup, avoided-emissions calculation, and challenge progress/reward
//! derivation. No I/O lives here; the api crate persists what these
//! functions compute.

pub mod challenge;
pub mod rates;
pub mod savings;

pub use challenge::{aggregate_metric, parse_reward_points, progress_pct, RewardError, TripSlice};
pub use rates::{RateError, RateTable};
pub use savings::SavingsCalculator;
