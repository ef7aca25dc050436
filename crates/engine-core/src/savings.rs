//! Avoided-emissions calculation for one trip.

use chrono::{DateTime, Utc};
use contracts::{EngineConfig, Savings, TransportMode};

use crate::rates::{RateError, RateTable};

/// Derives baseline/actual/avoided emissions and earned points for a trip.
/// Pure: resolves two rates at the same timestamp and computes values for
/// the caller to persist. A single missing rate interval fails the whole
/// calculation; awarding points from a partial calculation would corrupt
/// the ledger downstream.
#[derive(Debug, Clone)]
pub struct SavingsCalculator {
    rates: RateTable,
    config: EngineConfig,
}

impl SavingsCalculator {
    pub fn new(rates: RateTable, config: EngineConfig) -> Self {
        Self { rates, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    pub fn compute(
        &self,
        mode: TransportMode,
        distance_km: f64,
        at: DateTime<Utc>,
    ) -> Result<Savings, RateError> {
        if !distance_km.is_finite() || distance_km <= 0.0 {
            return Err(RateError::InvalidDistance(distance_km));
        }

        let baseline_rate = self.rates.resolve(self.config.baseline_mode, at)?;
        let actual_rate = self.rates.resolve(mode, at)?;

        let baseline_g = baseline_rate * distance_km;
        let actual_g = actual_rate * distance_km;
        // Negative savings (a mode dirtier than the baseline) clamp to zero
        // rather than recording a penalty.
        let saved_g = (baseline_g - actual_g).max(0.0);
        // Floor, not round: never over-credit.
        let points = (saved_g / self.config.points_unit_g).floor() as i64;

        Ok(Savings {
            baseline_g,
            actual_g,
            saved_g,
            points,
        })
    }
}
