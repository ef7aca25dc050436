//! SQLite persistence for the four core tables: emission rates, trips,
//! ledger entries, and challenges/memberships.
//!
//! The journal tables are append-only. No statement here updates or deletes
//! a trip's derived emission fields or a ledger row; the single UPDATE in
//! the schema is the guarded completion write on `challenge_members`.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use contracts::{
    Challenge, ChallengeMembership, ChallengeScope, CompletionPolicy, EmissionRate, EntryKind,
    LedgerEntry, MetricKind, ModeFilter, Savings, TransportMode, TripRecord,
};
use engine_core::TripSlice;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::EngineError;

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(&mut self) -> Result<(), EngineError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), EngineError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS emission_rates (
                rate_id INTEGER PRIMARY KEY AUTOINCREMENT,
                mode TEXT NOT NULL,
                grams_per_km REAL NOT NULL,
                valid_from TEXT NOT NULL,
                valid_to TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trips (
                trip_id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                mode TEXT NOT NULL,
                distance_km REAL NOT NULL CHECK (distance_km > 0),
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                baseline_g REAL NOT NULL,
                actual_g REAL NOT NULL,
                saved_g REAL NOT NULL CHECK (saved_g >= 0),
                points_earned INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (user_id, started_at, ended_at)
            );

            CREATE TABLE IF NOT EXISTS ledger_entries (
                entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                ref_trip_id INTEGER REFERENCES trips(trip_id),
                kind TEXT NOT NULL CHECK (kind IN ('EARN', 'SPEND', 'ADJUST')),
                points INTEGER NOT NULL,
                reason TEXT NOT NULL,
                metadata_json TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS challenges (
                challenge_id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT,
                scope TEXT NOT NULL,
                target_mode TEXT NOT NULL,
                metric TEXT NOT NULL,
                target REAL NOT NULL,
                start_at TEXT NOT NULL,
                end_at TEXT NOT NULL,
                completion TEXT NOT NULL CHECK (completion IN ('AUTO', 'MANUAL')),
                reward TEXT NOT NULL,
                created_by INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS challenge_members (
                challenge_id INTEGER NOT NULL REFERENCES challenges(challenge_id),
                user_id INTEGER NOT NULL,
                joined_at TEXT NOT NULL,
                completed_at TEXT,
                PRIMARY KEY (challenge_id, user_id)
            );

            -- One EARN entry per trip: the dedup key behind idempotent
            -- trip posting.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_earn_per_trip
                ON ledger_entries(ref_trip_id)
                WHERE kind = 'EARN' AND ref_trip_id IS NOT NULL;

            CREATE INDEX IF NOT EXISTS idx_trips_user_started
                ON trips(user_id, started_at);
            CREATE INDEX IF NOT EXISTS idx_ledger_user_created
                ON ledger_entries(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_rates_mode_from
                ON emission_rates(mode, valid_from);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', ?1)",
            params![Utc::now()],
        )?;

        Ok(())
    }

    // ----- emission rates -----

    pub fn insert_rate(&self, rate: &EmissionRate) -> Result<(), EngineError> {
        self.conn.execute(
            "INSERT INTO emission_rates (mode, grams_per_km, valid_from, valid_to)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                rate.mode.as_str(),
                rate.grams_per_km,
                rate.valid_from,
                rate.valid_to
            ],
        )?;
        Ok(())
    }

    pub fn seed_rates(&mut self, rates: &[EmissionRate]) -> Result<(), EngineError> {
        let tx = self.conn.transaction()?;
        for rate in rates {
            tx.execute(
                "INSERT INTO emission_rates (mode, grams_per_km, valid_from, valid_to)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    rate.mode.as_str(),
                    rate.grams_per_km,
                    rate.valid_from,
                    rate.valid_to
                ],
            )?;
        }
        tx.commit()?;
        debug!(count = rates.len(), "seeded emission rates");
        Ok(())
    }

    pub fn load_rates(&self) -> Result<Vec<EmissionRate>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT mode, grams_per_km, valid_from, valid_to
             FROM emission_rates
             ORDER BY mode, valid_from",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EmissionRate {
                mode: parse_mode(row.get::<_, String>(0)?)?,
                grams_per_km: row.get(1)?,
                valid_from: row.get(2)?,
                valid_to: row.get(3)?,
            })
        })?;

        let mut rates = Vec::new();
        for row in rows {
            rates.push(row?);
        }
        Ok(rates)
    }

    // ----- trips and ledger -----

    /// Creates the trip row and its EARN ledger entry (when points were
    /// earned) as one transaction. A uniqueness violation on either row
    /// rolls the whole posting back.
    #[allow(clippy::too_many_arguments)]
    pub fn post_trip(
        &mut self,
        user_id: i64,
        mode: TransportMode,
        distance_km: f64,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        savings: &Savings,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<TripRecord, EngineError> {
        let tx = self.conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO trips (
                user_id, mode, distance_km, started_at, ended_at,
                baseline_g, actual_g, saved_g, points_earned, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user_id,
                mode.as_str(),
                distance_km,
                started_at,
                ended_at,
                savings.baseline_g,
                savings.actual_g,
                savings.saved_g,
                savings.points,
                now,
            ],
        );
        if let Err(err) = inserted {
            return Err(map_unique_violation(err, EngineError::DuplicateLedgerEntry));
        }
        let trip_id = tx.last_insert_rowid();

        if savings.points > 0 {
            let metadata = serde_json::json!({
                "mode": mode.as_str(),
                "distance_km": distance_km,
            });
            let appended = tx.execute(
                "INSERT INTO ledger_entries (
                    user_id, ref_trip_id, kind, points, reason, metadata_json, created_at
                 ) VALUES (?1, ?2, 'EARN', ?3, ?4, ?5, ?6)",
                params![
                    user_id,
                    trip_id,
                    savings.points,
                    reason,
                    metadata.to_string(),
                    now,
                ],
            );
            if let Err(err) = appended {
                return Err(map_unique_violation(err, EngineError::DuplicateLedgerEntry));
            }
        }

        tx.commit()?;

        Ok(TripRecord {
            trip_id,
            user_id,
            mode,
            distance_km,
            started_at,
            ended_at,
            baseline_g: savings.baseline_g,
            actual_g: savings.actual_g,
            saved_g: savings.saved_g,
            points_earned: savings.points,
            created_at: now,
        })
    }

    pub fn append_entry(
        &self,
        user_id: i64,
        ref_trip_id: Option<i64>,
        kind: EntryKind,
        points: i64,
        reason: &str,
        metadata: Option<&serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, EngineError> {
        let metadata_json = metadata.map(|value| value.to_string());
        let appended = self.conn.execute(
            "INSERT INTO ledger_entries (
                user_id, ref_trip_id, kind, points, reason, metadata_json, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id,
                ref_trip_id,
                kind.as_str(),
                points,
                reason,
                metadata_json,
                now,
            ],
        );
        if let Err(err) = appended {
            return Err(map_unique_violation(err, EngineError::DuplicateLedgerEntry));
        }

        Ok(LedgerEntry {
            entry_id: self.conn.last_insert_rowid(),
            user_id,
            ref_trip_id,
            kind,
            points,
            reason: reason.to_string(),
            metadata: metadata.cloned(),
            created_at: now,
        })
    }

    /// Balance is always the kind-adjusted sum over the journal, never a
    /// stored counter.
    pub fn balance(&self, user_id: i64) -> Result<i64, EngineError> {
        let total = self.conn.query_row(
            "SELECT COALESCE(SUM(
                 CASE WHEN kind = 'SPEND' THEN -ABS(points) ELSE points END
             ), 0)
             FROM ledger_entries
             WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    pub fn history(
        &self,
        user_id: i64,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT entry_id, user_id, ref_trip_id, kind, points, reason,
                    metadata_json, created_at
             FROM ledger_entries
             WHERE user_id = ?1
             ORDER BY created_at DESC, entry_id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(
            params![user_id, limit as i64, skip as i64],
            entry_from_row,
        )?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn trip_slices(&self, user_id: i64) -> Result<Vec<TripSlice>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT mode, distance_km, saved_g, started_at
             FROM trips
             WHERE user_id = ?1
             ORDER BY started_at",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(TripSlice {
                mode: parse_mode(row.get::<_, String>(0)?)?,
                distance_km: row.get(1)?,
                saved_g: row.get(2)?,
                started_at: row.get(3)?,
            })
        })?;

        let mut slices = Vec::new();
        for row in rows {
            slices.push(row?);
        }
        Ok(slices)
    }

    pub fn mode_stats(&self, user_id: i64) -> Result<Vec<(TransportMode, f64)>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT mode, SUM(saved_g)
             FROM trips
             WHERE user_id = ?1
             GROUP BY mode
             ORDER BY mode",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((parse_mode(row.get::<_, String>(0)?)?, row.get(1)?))
        })?;

        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?);
        }
        Ok(stats)
    }

    pub fn daily_stats(
        &self,
        user_id: i64,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, f64)>, EngineError> {
        let cutoff = now - Duration::days(days);
        let mut stmt = self.conn.prepare(
            "SELECT DATE(started_at), SUM(saved_g)
             FROM trips
             WHERE user_id = ?1 AND started_at >= ?2
             GROUP BY DATE(started_at)
             ORDER BY DATE(started_at)",
        )?;
        let rows = stmt.query_map(params![user_id, cutoff], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?);
        }
        Ok(stats)
    }

    // ----- challenges and memberships -----

    pub fn insert_challenge(&self, challenge: &Challenge) -> Result<i64, EngineError> {
        self.conn.execute(
            "INSERT INTO challenges (
                title, description, scope, target_mode, metric, target,
                start_at, end_at, completion, reward, created_by, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                challenge.title,
                challenge.description,
                challenge.scope.as_str(),
                challenge.target_mode.as_str(),
                challenge.metric.as_str(),
                challenge.target,
                challenge.start_at,
                challenge.end_at,
                challenge.completion.as_str(),
                challenge.reward,
                challenge.created_by,
                challenge.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_challenge(&self, challenge_id: i64) -> Result<Option<Challenge>, EngineError> {
        let challenge = self
            .conn
            .query_row(
                "SELECT challenge_id, title, description, scope, target_mode, metric,
                        target, start_at, end_at, completion, reward, created_by, created_at
                 FROM challenges
                 WHERE challenge_id = ?1",
                params![challenge_id],
                challenge_from_row,
            )
            .optional()?;
        Ok(challenge)
    }

    pub fn load_challenges(&self) -> Result<Vec<Challenge>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT challenge_id, title, description, scope, target_mode, metric,
                    target, start_at, end_at, completion, reward, created_by, created_at
             FROM challenges
             ORDER BY challenge_id",
        )?;
        let rows = stmt.query_map([], challenge_from_row)?;

        let mut challenges = Vec::new();
        for row in rows {
            challenges.push(row?);
        }
        Ok(challenges)
    }

    pub fn insert_membership(
        &self,
        challenge_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ChallengeMembership, EngineError> {
        let inserted = self.conn.execute(
            "INSERT INTO challenge_members (challenge_id, user_id, joined_at, completed_at)
             VALUES (?1, ?2, ?3, NULL)",
            params![challenge_id, user_id, now],
        );
        if let Err(err) = inserted {
            return Err(map_unique_violation(err, EngineError::AlreadyJoined));
        }

        Ok(ChallengeMembership {
            challenge_id,
            user_id,
            joined_at: now,
            completed_at: None,
        })
    }

    pub fn get_membership(
        &self,
        challenge_id: i64,
        user_id: i64,
    ) -> Result<Option<ChallengeMembership>, EngineError> {
        let membership = self
            .conn
            .query_row(
                "SELECT challenge_id, user_id, joined_at, completed_at
                 FROM challenge_members
                 WHERE challenge_id = ?1 AND user_id = ?2",
                params![challenge_id, user_id],
                |row| {
                    Ok(ChallengeMembership {
                        challenge_id: row.get(0)?,
                        user_id: row.get(1)?,
                        joined_at: row.get(2)?,
                        completed_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(membership)
    }

    /// Marks the membership completed and appends the reward EARN entry in
    /// one transaction. The compare-and-set on `completed_at` guarantees
    /// that concurrent attempts produce exactly one payout; losers see
    /// `DuplicateCompletion`.
    pub fn complete_membership(
        &mut self,
        challenge_id: i64,
        user_id: i64,
        reward_points: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ChallengeMembership, EngineError> {
        let tx = self.conn.transaction()?;

        let changed = tx.execute(
            "UPDATE challenge_members
             SET completed_at = ?3
             WHERE challenge_id = ?1 AND user_id = ?2 AND completed_at IS NULL",
            params![challenge_id, user_id, now],
        )?;
        if changed == 0 {
            return Err(EngineError::DuplicateCompletion);
        }

        let metadata = serde_json::json!({ "challenge_id": challenge_id });
        tx.execute(
            "INSERT INTO ledger_entries (
                user_id, ref_trip_id, kind, points, reason, metadata_json, created_at
             ) VALUES (?1, NULL, 'EARN', ?2, ?3, ?4, ?5)",
            params![user_id, reward_points, reason, metadata.to_string(), now],
        )?;

        let membership = tx.query_row(
            "SELECT challenge_id, user_id, joined_at, completed_at
             FROM challenge_members
             WHERE challenge_id = ?1 AND user_id = ?2",
            params![challenge_id, user_id],
            |row| {
                Ok(ChallengeMembership {
                    challenge_id: row.get(0)?,
                    user_id: row.get(1)?,
                    joined_at: row.get(2)?,
                    completed_at: row.get(3)?,
                })
            },
        )?;

        tx.commit()?;
        Ok(membership)
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let kind_raw: String = row.get(3)?;
    let kind = EntryKind::parse(&kind_raw)
        .ok_or_else(|| conversion_error(3, format!("unknown entry kind: {kind_raw}")))?;
    let metadata_json: Option<String> = row.get(6)?;
    let metadata = metadata_json
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|err| conversion_error(6, err.to_string()))
        })
        .transpose()?;

    Ok(LedgerEntry {
        entry_id: row.get(0)?,
        user_id: row.get(1)?,
        ref_trip_id: row.get(2)?,
        kind,
        points: row.get(4)?,
        reason: row.get(5)?,
        metadata,
        created_at: row.get(7)?,
    })
}

fn challenge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Challenge> {
    let scope_raw: String = row.get(3)?;
    let target_mode_raw: String = row.get(4)?;
    let metric_raw: String = row.get(5)?;
    let completion_raw: String = row.get(9)?;

    Ok(Challenge {
        challenge_id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        scope: ChallengeScope::parse(&scope_raw)
            .ok_or_else(|| conversion_error(3, format!("unknown scope: {scope_raw}")))?,
        target_mode: ModeFilter::parse(&target_mode_raw)
            .ok_or_else(|| conversion_error(4, format!("unknown mode filter: {target_mode_raw}")))?,
        metric: MetricKind::parse(&metric_raw)
            .ok_or_else(|| conversion_error(5, format!("unknown metric: {metric_raw}")))?,
        target: row.get(6)?,
        start_at: row.get(7)?,
        end_at: row.get(8)?,
        completion: CompletionPolicy::parse(&completion_raw)
            .ok_or_else(|| conversion_error(9, format!("unknown completion: {completion_raw}")))?,
        reward: row.get(10)?,
        created_by: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn parse_mode(raw: String) -> rusqlite::Result<TransportMode> {
    TransportMode::parse(&raw)
        .ok_or_else(|| conversion_error(0, format!("unknown transport mode: {raw}")))
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn map_unique_violation(err: rusqlite::Error, replacement: EngineError) -> EngineError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            replacement
        }
        _ => EngineError::Sqlite(err),
    }
}
