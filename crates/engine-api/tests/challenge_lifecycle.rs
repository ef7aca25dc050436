use chrono::{DateTime, Duration, TimeZone, Utc};
use contracts::{
    Challenge, ChallengeScope, CompletionPolicy, EmissionRate, EngineConfig, MetricKind,
    ModeFilter, TransportMode,
};
use engine_api::{EngineApi, EngineError, FixedClock, SqliteStore, EARN_REASON_CHALLENGE};

fn noon(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

fn now() -> DateTime<Utc> {
    noon(2025, 9, 15)
}

fn test_engine() -> EngineApi {
    let store = SqliteStore::open_in_memory().expect("open store");
    let mut engine = EngineApi::new(
        store,
        EngineConfig::default(),
        Box::new(FixedClock(now())),
    );
    let rates: Vec<EmissionRate> = [
        (TransportMode::Car, 192.0),
        (TransportMode::Bus, 105.0),
        (TransportMode::Subway, 41.0),
        (TransportMode::Bike, 0.0),
        (TransportMode::Walk, 0.0),
    ]
    .into_iter()
    .map(|(mode, grams_per_km)| EmissionRate {
        mode,
        grams_per_km,
        valid_from: noon(2025, 1, 1),
        valid_to: noon(2025, 12, 31),
    })
    .collect();
    engine.seed_rates(&rates).expect("seed rates");
    engine
}

fn challenge(completion: CompletionPolicy, reward: &str) -> Challenge {
    Challenge {
        challenge_id: 0,
        title: "green commute".to_string(),
        description: None,
        scope: ChallengeScope::Personal,
        target_mode: ModeFilter::Any,
        metric: MetricKind::SavedGrams,
        target: 3_000.0,
        start_at: now() - Duration::days(7),
        end_at: now() + Duration::days(7),
        completion,
        reward: reward.to_string(),
        created_by: None,
        created_at: now(),
    }
}

#[test]
fn manual_completion_pays_reward_exactly_once() {
    let mut engine = test_engine();
    let created = engine
        .create_challenge(&challenge(CompletionPolicy::Manual, "에코 크레딧 200P + 뱃지"))
        .expect("create");

    engine
        .join_challenge(created.challenge_id, 5)
        .expect("join");
    let completed = engine
        .complete_challenge(created.challenge_id, 5)
        .expect("complete");
    assert_eq!(completed.completed_at, Some(now()));

    let again = engine.complete_challenge(created.challenge_id, 5);
    assert!(matches!(again, Err(EngineError::DuplicateCompletion)));

    // One reward payout, parsed out of the Korean descriptor.
    assert_eq!(engine.balance(5).expect("balance"), 200);
    let history = engine.history(5, 0, 10).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reason, EARN_REASON_CHALLENGE);
}

#[test]
fn joining_twice_is_rejected() {
    let mut engine = test_engine();
    let created = engine
        .create_challenge(&challenge(CompletionPolicy::Manual, "100P"))
        .expect("create");

    engine
        .join_challenge(created.challenge_id, 5)
        .expect("join");
    let again = engine.join_challenge(created.challenge_id, 5);
    assert!(matches!(again, Err(EngineError::AlreadyJoined)));
}

#[test]
fn completion_requires_membership_and_an_existing_challenge() {
    let mut engine = test_engine();
    let created = engine
        .create_challenge(&challenge(CompletionPolicy::Manual, "100P"))
        .expect("create");

    assert!(matches!(
        engine.complete_challenge(created.challenge_id, 5),
        Err(EngineError::NotAMember)
    ));
    assert!(matches!(
        engine.complete_challenge(999, 5),
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        engine.join_challenge(999, 5),
        Err(EngineError::NotFound(_))
    ));
}

#[test]
fn auto_challenges_cannot_be_completed_by_hand() {
    let mut engine = test_engine();
    let created = engine
        .create_challenge(&challenge(CompletionPolicy::Auto, "뱃지"))
        .expect("create");

    engine
        .join_challenge(created.challenge_id, 5)
        .expect("join");
    assert!(matches!(
        engine.complete_challenge(created.challenge_id, 5),
        Err(EngineError::InvalidRequest(_))
    ));
}

#[test]
fn completion_outside_the_window_is_rejected() {
    let mut engine = test_engine();
    let mut expired = challenge(CompletionPolicy::Manual, "100P");
    expired.start_at = now() - Duration::days(30);
    expired.end_at = now() - Duration::days(10);
    let created = engine.create_challenge(&expired).expect("create");

    engine
        .join_challenge(created.challenge_id, 5)
        .expect("join");
    assert!(matches!(
        engine.complete_challenge(created.challenge_id, 5),
        Err(EngineError::ChallengeWindowClosed)
    ));
    assert_eq!(engine.balance(5).expect("balance"), 0);
}

#[test]
fn manual_challenge_with_unparseable_reward_is_rejected_at_creation() {
    let mut engine = test_engine();
    let result = engine.create_challenge(&challenge(CompletionPolicy::Manual, "a shiny badge"));
    assert!(matches!(result, Err(EngineError::Reward(_))));
    assert!(engine.store().load_challenges().expect("list").is_empty());
}

#[test]
fn bad_reward_leaves_membership_incomplete() {
    // A MANUAL row with a points-free reward can only enter through the raw
    // store (creation validates it). Completion must fail without touching
    // the membership or the ledger.
    let mut engine = test_engine();
    let challenge_id = engine
        .store()
        .insert_challenge(&challenge(CompletionPolicy::Manual, "a shiny badge"))
        .expect("raw insert");

    engine.join_challenge(challenge_id, 5).expect("join");
    let result = engine.complete_challenge(challenge_id, 5);
    assert!(matches!(result, Err(EngineError::Reward(_))));

    let membership = engine
        .store()
        .get_membership(challenge_id, 5)
        .expect("read membership")
        .expect("membership exists");
    assert_eq!(membership.completed_at, None);
    assert_eq!(engine.balance(5).expect("balance"), 0);
}

#[test]
fn auto_progress_tracks_trips_and_caps_at_hundred() {
    let mut engine = test_engine();
    let created = engine
        .create_challenge(&challenge(CompletionPolicy::Auto, "뱃지"))
        .expect("create");
    engine
        .join_challenge(created.challenge_id, 5)
        .expect("join");

    let status_of = |engine: &EngineApi| {
        engine
            .list_challenges(5)
            .expect("list")
            .into_iter()
            .find(|status| status.challenge.challenge_id == created.challenge_id)
            .expect("status present")
    };

    assert_eq!(status_of(&engine).progress_pct, 0.0);

    // Subway 10 km saves 1510 g against a 3000 g target.
    let started = noon(2025, 9, 10);
    engine
        .record_trip(5, TransportMode::Subway, 10.0, started, started + Duration::hours(1))
        .expect("first trip");
    let halfway = status_of(&engine);
    assert!((halfway.progress_pct - 50.333).abs() < 0.01);
    assert!(halfway.is_joined);
    assert_eq!(halfway.completed_at, None);

    for day in 11..=13 {
        let started = noon(2025, 9, day);
        engine
            .record_trip(5, TransportMode::Subway, 10.0, started, started + Duration::hours(1))
            .expect("trip");
    }
    assert_eq!(status_of(&engine).progress_pct, 100.0);
}

#[test]
fn progress_only_counts_trips_inside_window_and_mode_filter() {
    let mut engine = test_engine();
    let mut bike_only = challenge(CompletionPolicy::Auto, "뱃지");
    bike_only.target_mode = ModeFilter::Only(TransportMode::Bike);
    bike_only.metric = MetricKind::DistanceKm;
    bike_only.target = 20.0;
    let created = engine.create_challenge(&bike_only).expect("create");

    // Outside the window.
    let early = noon(2025, 8, 1);
    engine
        .record_trip(5, TransportMode::Bike, 10.0, early, early + Duration::hours(1))
        .expect("early trip");
    // Wrong mode.
    let inside = noon(2025, 9, 12);
    engine
        .record_trip(5, TransportMode::Walk, 10.0, inside, inside + Duration::hours(1))
        .expect("walk trip");
    // Counts.
    let counted = noon(2025, 9, 13);
    engine
        .record_trip(5, TransportMode::Bike, 10.0, counted, counted + Duration::hours(1))
        .expect("bike trip");

    let status = engine
        .list_challenges(5)
        .expect("list")
        .into_iter()
        .find(|status| status.challenge.challenge_id == created.challenge_id)
        .expect("status present");
    assert_eq!(status.progress_pct, 50.0);
}

#[test]
fn completed_manual_challenge_reports_full_progress() {
    let mut engine = test_engine();
    let created = engine
        .create_challenge(&challenge(CompletionPolicy::Manual, "150P"))
        .expect("create");
    engine
        .join_challenge(created.challenge_id, 5)
        .expect("join");
    engine
        .complete_challenge(created.challenge_id, 5)
        .expect("complete");

    let status = engine
        .list_challenges(5)
        .expect("list")
        .into_iter()
        .find(|status| status.challenge.challenge_id == created.challenge_id)
        .expect("status present");
    assert_eq!(status.progress_pct, 100.0);
    assert_eq!(status.completed_at, Some(now()));
}
