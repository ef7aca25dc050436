use std::env;
use std::net::SocketAddr;

use chrono::{DateTime, TimeZone, Utc};
use contracts::{
    Challenge, ChallengeScope, CompletionPolicy, EmissionRate, EngineConfig, MetricKind,
    ModeFilter, TransportMode,
};
use engine_api::{serve, EngineApi};

fn print_usage() {
    println!("greenledger <command>");
    println!("commands:");
    println!("  init [sqlite_path]");
    println!("    creates tables and seeds default emission rates and demo challenges");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
    println!("  record <user_id> <mode> <distance_km>");
    println!("  balance <user_id>");
    println!("  history <user_id> [skip] [limit]");
    println!("  challenges <user_id>");
    println!("  join <user_id> <challenge_id>");
    println!("  complete <user_id> <challenge_id>");
}

fn parse_i64(value: Option<&String>, label: &str) -> Result<i64, String> {
    let raw = value.ok_or_else(|| format!("missing {label}"))?;
    raw.parse::<i64>()
        .map_err(|_| format!("invalid {label}: {raw}"))
}

fn parse_mode(value: Option<&String>) -> Result<TransportMode, String> {
    let raw = value.ok_or_else(|| "missing mode".to_string())?;
    TransportMode::parse(raw).ok_or_else(|| format!("invalid mode: {raw}"))
}

fn parse_distance(value: Option<&String>) -> Result<f64, String> {
    let raw = value.ok_or_else(|| "missing distance_km".to_string())?;
    raw.parse::<f64>()
        .map_err(|_| format!("invalid distance_km: {raw}"))
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn default_sqlite_path() -> String {
    std::env::var("GREENLEDGER_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "greenledger.sqlite".to_string())
}

fn parse_sqlite_path(value: Option<&String>) -> String {
    value
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path)
}

fn open_engine(path: &str) -> Result<EngineApi, String> {
    EngineApi::open(path, EngineConfig::default())
        .map_err(|err| format!("failed to open store at {path}: {err}"))
}

fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

fn default_rates() -> Vec<EmissionRate> {
    let valid_from = day(2020, 1, 1);
    let valid_to = day(2030, 12, 31);
    [
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
        valid_from,
        valid_to,
    })
    .collect()
}

fn demo_challenges(now: DateTime<Utc>) -> Vec<Challenge> {
    let template = |title: &str, target_mode, target, completion, reward: &str| Challenge {
        challenge_id: 0,
        title: title.to_string(),
        description: None,
        scope: ChallengeScope::Personal,
        target_mode,
        metric: MetricKind::SavedGrams,
        target,
        start_at: now - chrono::Duration::days(7),
        end_at: now + chrono::Duration::days(23),
        completion,
        reward: reward.to_string(),
        created_by: None,
        created_at: now,
    };

    vec![
        template(
            "대중교통 챌린지",
            ModeFilter::Any,
            10_000.0,
            CompletionPolicy::Auto,
            "에코 크레딧 200P + 뱃지",
        ),
        template(
            "자전거 출퇴근 챌린지",
            ModeFilter::Only(TransportMode::Bike),
            5_000.0,
            CompletionPolicy::Manual,
            "에코 크레딧 150P + 뱃지",
        ),
        template(
            "도보 생활 챌린지",
            ModeFilter::Only(TransportMode::Walk),
            1_000.0,
            CompletionPolicy::Manual,
            "에코 크레딧 100P",
        ),
    ]
}

fn run_init(args: &[String]) -> Result<(), String> {
    let sqlite_path = parse_sqlite_path(args.get(2));
    let mut engine = open_engine(&sqlite_path)?;

    if engine
        .store()
        .load_rates()
        .map_err(|err| err.to_string())?
        .is_empty()
    {
        engine
            .seed_rates(&default_rates())
            .map_err(|err| format!("failed to seed rates: {err}"))?;
        for challenge in demo_challenges(Utc::now()) {
            engine
                .create_challenge(&challenge)
                .map_err(|err| format!("failed to seed challenge: {err}"))?;
        }
        println!("initialized {sqlite_path}");
    } else {
        println!("{sqlite_path} is already initialized");
    }
    Ok(())
}

fn run_record(args: &[String]) -> Result<(), String> {
    let user_id = parse_i64(args.get(2), "user_id")?;
    let mode = parse_mode(args.get(3))?;
    let distance_km = parse_distance(args.get(4))?;

    let mut engine = open_engine(&default_sqlite_path())?;
    let now = Utc::now();
    let trip = engine
        .record_trip(user_id, mode, distance_km, now, now)
        .map_err(|err| format!("failed to record trip: {err}"))?;

    println!(
        "trip {} recorded: mode={} distance={:.1}km saved={:.0}g points={}",
        trip.trip_id, trip.mode, trip.distance_km, trip.saved_g, trip.points_earned
    );
    Ok(())
}

fn run_balance(args: &[String]) -> Result<(), String> {
    let user_id = parse_i64(args.get(2), "user_id")?;
    let engine = open_engine(&default_sqlite_path())?;
    let balance = engine
        .balance(user_id)
        .map_err(|err| format!("failed to read balance: {err}"))?;
    println!("user {user_id} balance: {balance} points");
    Ok(())
}

fn run_history(args: &[String]) -> Result<(), String> {
    let user_id = parse_i64(args.get(2), "user_id")?;
    let skip = args.get(3).and_then(|v| v.parse::<usize>().ok()).unwrap_or(0);
    let limit = args
        .get(4)
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(20);

    let engine = open_engine(&default_sqlite_path())?;
    let entries = engine
        .history(user_id, skip, limit)
        .map_err(|err| format!("failed to read history: {err}"))?;

    for entry in entries {
        println!(
            "{} {} {:+} {} ({})",
            entry.created_at,
            entry.kind.as_str(),
            entry.signed_points(),
            entry.reason,
            entry
                .ref_trip_id
                .map(|id| format!("trip {id}"))
                .unwrap_or_else(|| "no trip".to_string()),
        );
    }
    Ok(())
}

fn run_challenges(args: &[String]) -> Result<(), String> {
    let user_id = parse_i64(args.get(2), "user_id")?;
    let engine = open_engine(&default_sqlite_path())?;
    let statuses = engine
        .list_challenges(user_id)
        .map_err(|err| format!("failed to list challenges: {err}"))?;

    for status in statuses {
        println!(
            "[{}] {} ({}): {:.1}% joined={} completed={}",
            status.challenge.challenge_id,
            status.challenge.title,
            status.challenge.completion.as_str(),
            status.progress_pct,
            status.is_joined,
            status.completed_at.is_some(),
        );
    }
    Ok(())
}

fn run_join(args: &[String]) -> Result<(), String> {
    let user_id = parse_i64(args.get(2), "user_id")?;
    let challenge_id = parse_i64(args.get(3), "challenge_id")?;
    let mut engine = open_engine(&default_sqlite_path())?;
    let membership = engine
        .join_challenge(challenge_id, user_id)
        .map_err(|err| format!("failed to join: {err}"))?;
    println!(
        "user {} joined challenge {} at {}",
        membership.user_id, membership.challenge_id, membership.joined_at
    );
    Ok(())
}

fn run_complete(args: &[String]) -> Result<(), String> {
    let user_id = parse_i64(args.get(2), "user_id")?;
    let challenge_id = parse_i64(args.get(3), "challenge_id")?;
    let mut engine = open_engine(&default_sqlite_path())?;
    let membership = engine
        .complete_challenge(challenge_id, user_id)
        .map_err(|err| format!("failed to complete: {err}"))?;
    println!(
        "challenge {} completed at {}",
        membership.challenge_id,
        membership
            .completed_at
            .map(|at| at.to_string())
            .unwrap_or_default(),
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    let result = match command {
        Some("init") => run_init(&args),
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                let sqlite_path = default_sqlite_path();
                match open_engine(&sqlite_path) {
                    Ok(engine) => {
                        println!("serving api on http://{addr} (store: {sqlite_path})");
                        serve(addr, engine).await.map_err(|err| err.to_string())
                    }
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        },
        Some("record") => run_record(&args),
        Some("balance") => run_balance(&args),
        Some("history") => run_history(&args),
        Some("challenges") => run_challenges(&args),
        Some("join") => run_join(&args),
        Some("complete") => run_complete(&args),
        _ => {
            print_usage();
            return;
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        print_usage();
        std::process::exit(2);
    }
}
