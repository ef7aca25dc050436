//! Challenge progress derivation and reward parsing.
//!
//! Progress for auto-tracked challenges is never stored; it is recomputed
//! from trip history on every read. Manual completion pays out the point
//! amount parsed from the challenge's reward descriptor.

use std::fmt;

use chrono::{DateTime, Utc};
use contracts::{Challenge, MetricKind, TransportMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardError {
    /// The reward descriptor carries no digits to pay out.
    InvalidRewardFormat(String),
}

impl fmt::Display for RewardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRewardFormat(reward) => {
                write!(f, "reward descriptor has no point amount: {reward:?}")
            }
        }
    }
}

impl std::error::Error for RewardError {}

/// Extracts the point amount from a free-text reward descriptor: the first
/// run of ASCII digits, wherever it sits ("에코 크레딧 200P + 뱃지" -> 200).
pub fn parse_reward_points(reward: &str) -> Result<i64, RewardError> {
    let digits: String = reward
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();

    digits
        .parse::<i64>()
        .map_err(|_| RewardError::InvalidRewardFormat(reward.to_string()))
}

/// The minimal trip view the progress engine aggregates over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripSlice {
    pub mode: TransportMode,
    pub distance_km: f64,
    pub saved_g: f64,
    pub started_at: DateTime<Utc>,
}

/// Sums the challenge's target metric over trips inside the challenge
/// window that match its mode filter.
pub fn aggregate_metric(trips: &[TripSlice], challenge: &Challenge) -> f64 {
    trips
        .iter()
        .filter(|trip| challenge.window_contains(trip.started_at))
        .filter(|trip| challenge.target_mode.matches(trip.mode))
        .map(|trip| match challenge.metric {
            MetricKind::DistanceKm => trip.distance_km,
            MetricKind::SavedGrams => trip.saved_g,
        })
        .sum()
}

/// Completion percentage for an aggregate against the challenge target,
/// capped at 100. A zero or unset target yields 0 rather than dividing by
/// zero.
pub fn progress_pct(challenge: &Challenge, aggregate: f64) -> f64 {
    if !challenge.target.is_finite() || challenge.target <= 0.0 {
        return 0.0;
    }
    (100.0 * aggregate / challenge.target).min(100.0)
}
