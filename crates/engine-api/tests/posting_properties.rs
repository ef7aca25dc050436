use chrono::{DateTime, Duration, TimeZone, Utc};
use contracts::{EmissionRate, EngineConfig, EntryKind, TransportMode};
use engine_api::{EngineApi, EngineError, FixedClock, SqliteStore, EARN_REASON_TRIP};
use proptest::prelude::*;

fn noon(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

fn full_year(mode: TransportMode, grams_per_km: f64) -> EmissionRate {
    EmissionRate {
        mode,
        grams_per_km,
        valid_from: noon(2025, 1, 1),
        valid_to: noon(2025, 12, 31),
    }
}

fn test_engine() -> EngineApi {
    let store = SqliteStore::open_in_memory().expect("open store");
    let mut engine = EngineApi::new(
        store,
        EngineConfig::default(),
        Box::new(FixedClock(noon(2025, 9, 15))),
    );
    engine
        .seed_rates(&[
            full_year(TransportMode::Car, 192.0),
            full_year(TransportMode::Bus, 105.0),
            full_year(TransportMode::Subway, 41.0),
            full_year(TransportMode::Bike, 0.0),
            full_year(TransportMode::Walk, 0.0),
        ])
        .expect("seed rates");
    engine
}

#[test]
fn recorded_trip_posts_matching_earn_entry() {
    let mut engine = test_engine();
    let started = noon(2025, 9, 10);
    let trip = engine
        .record_trip(1, TransportMode::Subway, 10.0, started, started + Duration::hours(1))
        .expect("trip records");

    assert_eq!(trip.baseline_g, 1920.0);
    assert_eq!(trip.actual_g, 410.0);
    assert_eq!(trip.saved_g, 1510.0);
    assert_eq!(trip.points_earned, 1510);

    assert_eq!(engine.balance(1).expect("balance"), 1510);
    let history = engine.history(1, 0, 10).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, EntryKind::Earn);
    assert_eq!(history[0].ref_trip_id, Some(trip.trip_id));
    assert_eq!(history[0].reason, EARN_REASON_TRIP);
}

#[test]
fn zero_savings_trip_creates_no_ledger_entry() {
    let mut engine = test_engine();
    let started = noon(2025, 9, 10);
    let trip = engine
        .record_trip(1, TransportMode::Car, 25.0, started, started + Duration::hours(1))
        .expect("trip records");

    assert_eq!(trip.saved_g, 0.0);
    assert_eq!(trip.points_earned, 0);
    assert_eq!(engine.balance(1).expect("balance"), 0);
    assert!(engine.history(1, 0, 10).expect("history").is_empty());
}

#[test]
fn retried_trip_posting_is_rejected_and_credits_once() {
    let mut engine = test_engine();
    let started = noon(2025, 9, 10);
    let ended = started + Duration::hours(1);

    engine
        .record_trip(1, TransportMode::Subway, 10.0, started, ended)
        .expect("first posting");
    let retry = engine.record_trip(1, TransportMode::Subway, 10.0, started, ended);
    assert!(matches!(retry, Err(EngineError::DuplicateLedgerEntry)));

    // Exactly one trip and one EARN entry survive the retry.
    assert_eq!(engine.store().trip_slices(1).expect("trips").len(), 1);
    assert_eq!(engine.balance(1).expect("balance"), 1510);
    assert_eq!(engine.history(1, 0, 10).expect("history").len(), 1);
}

#[test]
fn duplicate_earn_for_one_trip_is_blocked_at_the_store() {
    let mut engine = test_engine();
    let now = noon(2025, 9, 15);
    let trip = engine
        .record_trip(
            1,
            TransportMode::Bike,
            5.0,
            noon(2025, 9, 10),
            noon(2025, 9, 10) + Duration::hours(1),
        )
        .expect("trip records");

    let second = engine.store().append_entry(
        1,
        Some(trip.trip_id),
        EntryKind::Earn,
        999,
        EARN_REASON_TRIP,
        None,
        now,
    );
    assert!(matches!(second, Err(EngineError::DuplicateLedgerEntry)));
    assert_eq!(engine.balance(1).expect("balance"), trip.points_earned);
}

#[test]
fn missing_rate_interval_commits_nothing() {
    let mut engine = test_engine();
    // 2030 is outside every configured interval.
    let started = noon(2030, 1, 5);
    let result = engine.record_trip(1, TransportMode::Subway, 10.0, started, started);
    assert!(matches!(
        result,
        Err(EngineError::Rate(engine_core::RateError::RateNotFound { .. }))
    ));

    assert!(engine.store().trip_slices(1).expect("trips").is_empty());
    assert_eq!(engine.balance(1).expect("balance"), 0);
}

#[test]
fn dedup_key_holds_across_separate_connections() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.sqlite");
    let clock = FixedClock(noon(2025, 9, 15));
    let started = noon(2025, 9, 10);
    let ended = started + Duration::hours(1);

    let rates = [
        full_year(TransportMode::Car, 192.0),
        full_year(TransportMode::Subway, 41.0),
    ];

    let store_a = SqliteStore::open(&path).expect("open a");
    let mut engine_a = EngineApi::new(store_a, EngineConfig::default(), Box::new(clock));
    engine_a.seed_rates(&rates).expect("seed rates");

    let store_b = SqliteStore::open(&path).expect("open b");
    let mut engine_b = EngineApi::new(store_b, EngineConfig::default(), Box::new(clock));

    engine_a
        .record_trip(7, TransportMode::Subway, 10.0, started, ended)
        .expect("first posting");
    let retry = engine_b.record_trip(7, TransportMode::Subway, 10.0, started, ended);
    assert!(matches!(retry, Err(EngineError::DuplicateLedgerEntry)));

    assert_eq!(engine_b.balance(7).expect("balance"), 1510);
}

#[test]
fn zero_point_earn_and_spend_are_rejected() {
    let mut engine = test_engine();
    assert!(matches!(
        engine.append_entry(1, EntryKind::Earn, 0, "bonus", None),
        Err(EngineError::ZeroPointEntry)
    ));
    assert!(matches!(
        engine.append_entry(1, EntryKind::Spend, 0, "garden:water", None),
        Err(EngineError::ZeroPointEntry)
    ));
    // ADJUST may be zero for audit notes.
    engine
        .append_entry(1, EntryKind::Adjust, 0, "audit:note", None)
        .expect("zero adjust allowed");
}

#[test]
fn history_is_reverse_chronological_and_paginated() {
    let mut engine = test_engine();
    for day in 1..=5 {
        let started = noon(2025, 9, day);
        engine
            .record_trip(1, TransportMode::Subway, 1.0, started, started + Duration::hours(1))
            .expect("trip records");
    }

    let all = engine.history(1, 0, 10).expect("history");
    assert_eq!(all.len(), 5);
    // Same created_at stamp for every entry (fixed clock), so entry_id
    // ordering breaks the tie newest-first.
    for window in all.windows(2) {
        assert!(window[0].entry_id > window[1].entry_id);
    }

    let page = engine.history(1, 2, 2).expect("page");
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].entry_id, all[2].entry_id);
}

#[test]
fn stats_aggregate_by_mode_and_day() {
    let mut engine = test_engine();
    let monday = noon(2025, 9, 8);
    let tuesday = noon(2025, 9, 9);
    engine
        .record_trip(1, TransportMode::Subway, 10.0, monday, monday + Duration::hours(1))
        .expect("subway trip");
    engine
        .record_trip(1, TransportMode::Walk, 2.0, tuesday, tuesday + Duration::hours(1))
        .expect("walk trip");

    let modes = engine.mode_stats(1).expect("mode stats");
    assert_eq!(modes.len(), 2);
    assert!(modes.contains(&(TransportMode::Subway, 1510.0)));
    assert!(modes.contains(&(TransportMode::Walk, 384.0)));

    let daily = engine.daily_stats(1, 7).expect("daily stats");
    assert_eq!(
        daily,
        vec![
            ("2025-09-08".to_string(), 1510.0),
            ("2025-09-09".to_string(), 384.0),
        ]
    );
}

proptest! {
    // Balance is the signed sum of the journal no matter the order entries
    // arrive in.
    #[test]
    fn balance_equals_signed_sum_in_any_order(
        entries in prop::collection::vec(
            (0_usize..3, 1_i64..1_000),
            0..24,
        )
    ) {
        let mut engine = test_engine();
        let mut expected = 0_i64;

        for (kind_index, points) in entries {
            let kind = [EntryKind::Earn, EntryKind::Spend, EntryKind::Adjust][kind_index];
            engine
                .append_entry(9, kind, points, "prop", None)
                .expect("append");
            expected += match kind {
                EntryKind::Earn | EntryKind::Adjust => points,
                EntryKind::Spend => -points,
            };
        }

        prop_assert_eq!(engine.balance(9).expect("balance"), expected);
    }
}
