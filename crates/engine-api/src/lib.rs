//! Service facade over the SQLite store: trip posting, credit ledger,
//! and challenge lifecycle, each a short synchronous transaction.

mod server;
mod store;

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use contracts::{
    Challenge, ChallengeMembership, ChallengeStatus, CompletionPolicy, EmissionRate, EngineConfig,
    EntryKind, LedgerEntry, TransportMode, TripRecord,
};
use engine_core::{
    aggregate_metric, parse_reward_points, progress_pct, RateError, RateTable, RewardError,
    SavingsCalculator,
};
use tracing::{info, warn};

pub use server::{serve, ServerError};
pub use store::SqliteStore;

pub const EARN_REASON_TRIP: &str = "MOBILITY:SAVING";
pub const EARN_REASON_CHALLENGE: &str = "CHALLENGE:REWARD";

const MAX_HISTORY_PAGE: usize = 500;

#[derive(Debug)]
pub enum EngineError {
    Rate(RateError),
    Reward(RewardError),
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    DuplicateLedgerEntry,
    DuplicateCompletion,
    AlreadyJoined,
    NotAMember,
    ChallengeWindowClosed,
    ZeroPointEntry,
    NotFound(String),
    InvalidRequest(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rate(err) => write!(f, "rate error: {err}"),
            Self::Reward(err) => write!(f, "reward error: {err}"),
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::DuplicateLedgerEntry => write!(f, "trip is already ledgered"),
            Self::DuplicateCompletion => write!(f, "challenge is already completed"),
            Self::AlreadyJoined => write!(f, "already a member of this challenge"),
            Self::NotAMember => write!(f, "not a member of this challenge"),
            Self::ChallengeWindowClosed => write!(f, "challenge window is closed"),
            Self::ZeroPointEntry => write!(f, "EARN and SPEND entries must move points"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::InvalidRequest(message) => write!(f, "invalid request: {message}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<RateError> for EngineError {
    fn from(value: RateError) -> Self {
        Self::Rate(value)
    }
}

impl From<RewardError> for EngineError {
    fn from(value: RewardError) -> Self {
        Self::Reward(value)
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Clock source injected into the engine so tests can pin "now".
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Stateless service object over the store; all dependencies are passed at
/// construction, none are global.
pub struct EngineApi {
    store: SqliteStore,
    config: EngineConfig,
    clock: Box<dyn Clock>,
}

impl EngineApi {
    pub fn new(store: SqliteStore, config: EngineConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, EngineError> {
        let store = SqliteStore::open(path)?;
        Ok(Self::new(store, config, Box::new(SystemClock)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn seed_rates(&mut self, rates: &[EmissionRate]) -> Result<(), EngineError> {
        // Validate the combined table before committing the new intervals.
        let mut combined = self.store.load_rates()?;
        combined.extend_from_slice(rates);
        RateTable::new(combined)?;
        self.store.seed_rates(rates)
    }

    fn calculator(&self) -> Result<SavingsCalculator, EngineError> {
        let table = RateTable::new(self.store.load_rates()?)?;
        Ok(SavingsCalculator::new(table, self.config))
    }

    /// Records one trip: computes savings against the baseline mode and
    /// posts trip row plus EARN entry atomically. Nothing is committed when
    /// a rate is missing or the trip is a duplicate.
    pub fn record_trip(
        &mut self,
        user_id: i64,
        mode: TransportMode,
        distance_km: f64,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Result<TripRecord, EngineError> {
        if ended_at < started_at {
            return Err(EngineError::InvalidRequest(
                "ended_at precedes started_at".to_string(),
            ));
        }

        let savings = self.calculator()?.compute(mode, distance_km, started_at)?;
        let now = self.clock.now();
        let trip = self.store.post_trip(
            user_id,
            mode,
            distance_km,
            started_at,
            ended_at,
            &savings,
            EARN_REASON_TRIP,
            now,
        )?;

        info!(
            user_id,
            trip_id = trip.trip_id,
            mode = %mode,
            saved_g = savings.saved_g,
            points = savings.points,
            "trip recorded"
        );
        Ok(trip)
    }

    /// Administrative SPEND/ADJUST path. Zero-point EARN/SPEND entries are
    /// rejected; ADJUST may be zero for audit notes.
    pub fn append_entry(
        &mut self,
        user_id: i64,
        kind: EntryKind,
        points: i64,
        reason: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<LedgerEntry, EngineError> {
        if points == 0 && kind != EntryKind::Adjust {
            return Err(EngineError::ZeroPointEntry);
        }
        let now = self.clock.now();
        self.store
            .append_entry(user_id, None, kind, points, reason, metadata.as_ref(), now)
    }

    pub fn balance(&self, user_id: i64) -> Result<i64, EngineError> {
        self.store.balance(user_id)
    }

    pub fn history(
        &self,
        user_id: i64,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, EngineError> {
        let limit = limit.clamp(1, MAX_HISTORY_PAGE);
        self.store.history(user_id, skip, limit)
    }

    pub fn mode_stats(&self, user_id: i64) -> Result<Vec<(TransportMode, f64)>, EngineError> {
        self.store.mode_stats(user_id)
    }

    pub fn daily_stats(&self, user_id: i64, days: i64) -> Result<Vec<(String, f64)>, EngineError> {
        let days = days.clamp(1, 366);
        self.store.daily_stats(user_id, days, self.clock.now())
    }

    pub fn create_challenge(&mut self, challenge: &Challenge) -> Result<Challenge, EngineError> {
        if challenge.end_at < challenge.start_at {
            return Err(EngineError::InvalidRequest(
                "end_at precedes start_at".to_string(),
            ));
        }
        // A manual challenge with an unparseable reward would be
        // uncompletable; reject it at creation, where it is a data-entry
        // error the operator can still fix.
        if challenge.completion == CompletionPolicy::Manual {
            parse_reward_points(&challenge.reward)?;
        }

        let challenge_id = self.store.insert_challenge(challenge)?;
        Ok(Challenge {
            challenge_id,
            ..challenge.clone()
        })
    }

    pub fn join_challenge(
        &mut self,
        challenge_id: i64,
        user_id: i64,
    ) -> Result<ChallengeMembership, EngineError> {
        let Some(_challenge) = self.store.get_challenge(challenge_id)? else {
            return Err(EngineError::NotFound(format!("challenge {challenge_id}")));
        };
        self.store
            .insert_membership(challenge_id, user_id, self.clock.now())
    }

    /// One-time manual completion. The reward is parsed before the
    /// conditional write so a malformed descriptor can never leave a
    /// half-completed membership, and the write plus the EARN append commit
    /// together.
    pub fn complete_challenge(
        &mut self,
        challenge_id: i64,
        user_id: i64,
    ) -> Result<ChallengeMembership, EngineError> {
        let Some(challenge) = self.store.get_challenge(challenge_id)? else {
            return Err(EngineError::NotFound(format!("challenge {challenge_id}")));
        };
        if challenge.completion != CompletionPolicy::Manual {
            return Err(EngineError::InvalidRequest(
                "challenge is auto-tracked; progress is derived, not declared".to_string(),
            ));
        }

        let Some(membership) = self.store.get_membership(challenge_id, user_id)? else {
            return Err(EngineError::NotAMember);
        };
        if membership.completed_at.is_some() {
            return Err(EngineError::DuplicateCompletion);
        }

        let now = self.clock.now();
        if !challenge.window_contains(now) {
            return Err(EngineError::ChallengeWindowClosed);
        }

        let reward_points = match parse_reward_points(&challenge.reward) {
            Ok(points) => points,
            Err(err) => {
                warn!(challenge_id, reward = %challenge.reward, "unparseable reward descriptor");
                return Err(err.into());
            }
        };

        let completed = self.store.complete_membership(
            challenge_id,
            user_id,
            reward_points,
            EARN_REASON_CHALLENGE,
            now,
        )?;
        info!(challenge_id, user_id, reward_points, "challenge completed");
        Ok(completed)
    }

    /// Challenge list with per-user progress. Auto progress is recomputed
    /// from trip history on every call; a completed manual challenge
    /// reports 100.
    pub fn list_challenges(&self, user_id: i64) -> Result<Vec<ChallengeStatus>, EngineError> {
        let challenges = self.store.load_challenges()?;
        let trips = self.store.trip_slices(user_id)?;

        let mut statuses = Vec::with_capacity(challenges.len());
        for challenge in challenges {
            let membership = self
                .store
                .get_membership(challenge.challenge_id, user_id)?;
            let completed_at = membership.as_ref().and_then(|m| m.completed_at);

            let progress = if completed_at.is_some() {
                100.0
            } else {
                progress_pct(&challenge, aggregate_metric(&trips, &challenge))
            };

            statuses.push(ChallengeStatus {
                is_joined: membership.is_some(),
                progress_pct: progress,
                completed_at,
                challenge,
            });
        }
        Ok(statuses)
    }
}
