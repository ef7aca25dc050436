//! Time-bounded emission-rate lookup.

use std::fmt;

use chrono::{DateTime, Utc};
use contracts::{EmissionRate, TransportMode};

#[derive(Debug, Clone, PartialEq)]
pub enum RateError {
    RateNotFound {
        mode: TransportMode,
        at: DateTime<Utc>,
    },
    OverlappingIntervals {
        mode: TransportMode,
    },
    InvalidDistance(f64),
}

impl fmt::Display for RateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateNotFound { mode, at } => {
                write!(f, "no emission rate for mode {mode} at {at}")
            }
            Self::OverlappingIntervals { mode } => {
                write!(f, "overlapping validity intervals for mode {mode}")
            }
            Self::InvalidDistance(km) => write!(f, "distance must be positive, got {km}"),
        }
    }
}

impl std::error::Error for RateError {}

/// Configured emission rates. A lookup resolves to exactly one interval or
/// fails; intervals for a mode must not overlap.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: Vec<EmissionRate>,
}

impl RateTable {
    pub fn new(rates: Vec<EmissionRate>) -> Result<Self, RateError> {
        let table = Self { rates };
        table.validate()?;
        Ok(table)
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn rates(&self) -> &[EmissionRate] {
        &self.rates
    }

    /// Grams of CO2 per km for `mode`, effective at `at`. Pure lookup.
    pub fn resolve(&self, mode: TransportMode, at: DateTime<Utc>) -> Result<f64, RateError> {
        self.rates
            .iter()
            .find(|rate| rate.mode == mode && rate.covers(at))
            .map(|rate| rate.grams_per_km)
            .ok_or(RateError::RateNotFound { mode, at })
    }

    fn validate(&self) -> Result<(), RateError> {
        for (index, rate) in self.rates.iter().enumerate() {
            let overlaps = self.rates[index + 1..].iter().any(|other| {
                other.mode == rate.mode
                    && rate.valid_from <= other.valid_to
                    && other.valid_from <= rate.valid_to
            });
            if overlaps {
                return Err(RateError::OverlappingIntervals { mode: rate.mode });
            }
        }
        Ok(())
    }
}
