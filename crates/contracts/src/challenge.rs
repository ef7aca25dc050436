//! Challenge, membership, and progress-report contracts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TransportMode;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeScope {
    Personal,
    Group,
}

impl ChallengeScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "PERSONAL",
            Self::Group => "GROUP",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "PERSONAL" => Some(Self::Personal),
            "GROUP" => Some(Self::Group),
            _ => None,
        }
    }
}

/// Which trips count toward a challenge target. Serialized as a plain
/// string: `"ANY"` or a transport-mode name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeFilter {
    Any,
    Only(TransportMode),
}

impl ModeFilter {
    pub fn matches(&self, mode: TransportMode) -> bool {
        match self {
            Self::Any => true,
            Self::Only(target) => *target == mode,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::Only(mode) => mode.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().eq_ignore_ascii_case("ANY") {
            return Some(Self::Any);
        }
        TransportMode::parse(raw).map(Self::Only)
    }
}

impl Serialize for ModeFilter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ModeFilter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown mode filter: {raw}")))
    }
}

/// The trip quantity a challenge target is expressed in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    DistanceKm,
    SavedGrams,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DistanceKm => "distance_km",
            Self::SavedGrams => "saved_grams",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "distance_km" => Some(Self::DistanceKm),
            "saved_grams" => Some(Self::SavedGrams),
            _ => None,
        }
    }
}

/// How a challenge reaches completion. `Auto` progress is derived on every
/// read and never stored; `Manual` completion is a one-time guarded
/// transition that pays out the parsed reward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionPolicy {
    Auto,
    Manual,
}

impl CompletionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Manual => "MANUAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "AUTO" => Some(Self::Auto),
            "MANUAL" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// A time-boxed goal tied to a travel metric. Immutable after creation
/// except by its owner or an admin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Challenge {
    pub challenge_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub scope: ChallengeScope,
    pub target_mode: ModeFilter,
    pub metric: MetricKind,
    pub target: f64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub completion: CompletionPolicy,
    pub reward: String,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    pub fn window_contains(&self, at: DateTime<Utc>) -> bool {
        self.start_at <= at && at <= self.end_at
    }
}

/// Join state between a user and a challenge. `completed_at` moves from
/// null to a single timestamp exactly once; re-completion fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChallengeMembership {
    pub challenge_id: i64,
    pub user_id: i64,
    pub joined_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One row of the challenge list as seen by a user: the challenge plus the
/// derived progress figure for that user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChallengeStatus {
    pub challenge: Challenge,
    pub is_joined: bool,
    pub progress_pct: f64,
    pub completed_at: Option<DateTime<Utc>>,
}
