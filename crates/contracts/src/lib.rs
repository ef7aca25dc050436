//! v1 cross-boundary contracts for the savings engine, ledger, API, and CLI.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod challenge;

pub use challenge::{
    Challenge, ChallengeMembership, ChallengeScope, ChallengeStatus, CompletionPolicy, MetricKind,
    ModeFilter,
};

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Grams of avoided CO2 per credit point. Floor division, never rounding.
pub const DEFAULT_POINTS_UNIT_G: f64 = 1.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportMode {
    Bus,
    Subway,
    Bike,
    Walk,
    Car,
}

impl TransportMode {
    pub const ALL: [TransportMode; 5] = [
        TransportMode::Bus,
        TransportMode::Subway,
        TransportMode::Bike,
        TransportMode::Walk,
        TransportMode::Car,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bus => "BUS",
            Self::Subway => "SUBWAY",
            Self::Bike => "BIKE",
            Self::Walk => "WALK",
            Self::Car => "CAR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "BUS" => Some(Self::Bus),
            "SUBWAY" => Some(Self::Subway),
            "BIKE" => Some(Self::Bike),
            "WALK" => Some(Self::Walk),
            "CAR" => Some(Self::Car),
            _ => None,
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One CO2-per-distance rate, effective over a closed validity interval.
/// Superseded by inserting a new interval, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmissionRate {
    pub mode: TransportMode,
    pub grams_per_km: f64,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

impl EmissionRate {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && at <= self.valid_to
    }
}

/// Output of one savings calculation; the caller persists it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Savings {
    pub baseline_g: f64,
    pub actual_g: f64,
    pub saved_g: f64,
    pub points: i64,
}

/// One logged trip with its derived emission figures. The derived fields are
/// computed at creation time; edits to mode or distance force a full
/// recomputation upstream, never an incremental patch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripRecord {
    pub trip_id: i64,
    pub user_id: i64,
    pub mode: TransportMode,
    pub distance_km: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub baseline_g: f64,
    pub actual_g: f64,
    pub saved_g: f64,
    pub points_earned: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Earn,
    Spend,
    Adjust,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earn => "EARN",
            Self::Spend => "SPEND",
            Self::Adjust => "ADJUST",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "EARN" => Some(Self::Earn),
            "SPEND" => Some(Self::Spend),
            "ADJUST" => Some(Self::Adjust),
            _ => None,
        }
    }
}

/// One immutable row of the credit journal. Entries are never updated or
/// deleted; a user's balance is the signed sum over their entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub entry_id: i64,
    pub user_id: i64,
    pub ref_trip_id: Option<i64>,
    pub kind: EntryKind,
    pub points: i64,
    pub reason: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Kind-adjusted contribution to the balance: EARN and ADJUST add,
    /// SPEND subtracts.
    pub fn signed_points(&self) -> i64 {
        match self.kind {
            EntryKind::Earn | EntryKind::Adjust => self.points,
            EntryKind::Spend => -self.points.abs(),
        }
    }
}

/// Static engine configuration, injected at construction rather than read
/// from globals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub points_unit_g: f64,
    pub baseline_mode: TransportMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            points_unit_g: DEFAULT_POINTS_UNIT_G,
            baseline_mode: TransportMode::Car,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RateNotFound,
    DuplicateLedgerEntry,
    DuplicateCompletion,
    InvalidRewardFormat,
    ChallengeWindowClosed,
    NotAMember,
    NotFound,
    InvalidRequest,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_mode_round_trips_through_wire_names() {
        for mode in TransportMode::ALL {
            assert_eq!(TransportMode::parse(mode.as_str()), Some(mode));
            let encoded = serde_json::to_string(&mode).expect("serialize");
            assert_eq!(encoded, format!("\"{}\"", mode.as_str()));
        }
        assert_eq!(TransportMode::parse("scooter"), None);
    }

    #[test]
    fn signed_points_follow_entry_kind() {
        let mut entry = LedgerEntry {
            entry_id: 1,
            user_id: 7,
            ref_trip_id: None,
            kind: EntryKind::Earn,
            points: 120,
            reason: "MOBILITY:SAVING".to_string(),
            metadata: None,
            created_at: Utc::now(),
        };
        assert_eq!(entry.signed_points(), 120);

        entry.kind = EntryKind::Spend;
        assert_eq!(entry.signed_points(), -120);

        entry.kind = EntryKind::Adjust;
        entry.points = -30;
        assert_eq!(entry.signed_points(), -30);
    }
}
