use clap::Parser;
use omnitris_server::constants::{normalize_speed, tick_period, PERIMETER_CELL_POINTS};
use omnitris_server::error::ServerError;
use omnitris_server::rng::Rng;
use omnitris_server::room::{Room, RoomPhase};
use omnitris_server::types::{Action, GameMode, GameSettings, Owner, Winner};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

const BOTS: [(&str, &str); 2] = [("bot_1", "Bot-01"), ("bot_2", "Bot-02")];
const START_MS: u64 = 1_700_000_000_000;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless bot matches against the room state machine")]
struct Cli {
    #[arg(long, default_value_t = 3)]
    games: u32,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value = "score")]
    mode: String,
    #[arg(long, default_value_t = 500)]
    target: u32,
    #[arg(long)]
    speed: Option<f64>,
    #[arg(long, default_value_t = 20_000)]
    max_ticks: u64,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct GameResultLine {
    game: u32,
    seed: u32,
    mode: GameMode,
    #[serde(rename = "value")]
    target: u32,
    winner: Option<Winner>,
    ticks: u64,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "primaryScore")]
    primary_score: u32,
    #[serde(rename = "secondaryScore")]
    secondary_score: u32,
    #[serde(rename = "boardSize")]
    board_size: usize,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug)]
struct GameRunResult {
    result: GameResultLine,
    anomaly_records: Vec<AnomalyRecord>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "gameCount")]
    game_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageDurationMs")]
    average_duration_ms: u64,
    #[serde(rename = "winnerCounts")]
    winner_counts: BTreeMap<String, usize>,
    games: Vec<GameResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    #[serde(rename = "timestampMs")]
    timestamp_ms: u64,
    level: String,
    event: String,
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    game: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tick: Option<u64>,
    details: Value,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(mode) = GameMode::parse(&cli.mode) else {
        eprintln!("unknown mode '{}', expected score or time", cli.mode);
        std::process::exit(2);
    };
    let settings = GameSettings {
        mode,
        target: cli.target,
        speed: cli.speed,
    };
    let base_seed = normalize_seed(cli.seed.unwrap_or_else(rand::random::<u64>));
    let run_started_at_ms = now_ms();
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(base_seed, run_started_at_ms));

    let mut results = Vec::new();
    let mut winner_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_anomalies = 0usize;
    let mut total_duration_ms = 0u64;

    for game in 0..cli.games {
        let seed = base_seed.wrapping_add(game);
        emit_log(
            "info",
            "game_started",
            &match_id,
            Some(game),
            Some(seed),
            None,
            json!({ "mode": mode, "value": cli.target }),
        );
        let run = run_game(game, seed, settings, cli.max_ticks);
        for anomaly in &run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &match_id,
                Some(game),
                Some(seed),
                Some(anomaly.tick),
                json!({ "message": anomaly.message }),
            );
        }
        total_anomalies += run.anomaly_records.len();
        total_duration_ms += run.result.duration_ms;
        *winner_counts.entry(winner_key(run.result.winner)).or_insert(0) += 1;

        emit_log(
            "info",
            "game_finished",
            &match_id,
            Some(game),
            Some(seed),
            Some(run.result.ticks),
            json!({
                "winner": run.result.winner,
                "durationMs": run.result.duration_ms,
                "anomalyCount": run.anomaly_records.len(),
            }),
        );
        match serde_json::to_string(&run.result) {
            Ok(line) => println!("{line}"),
            Err(err) => eprintln!("failed to serialize game result: {err}"),
        }
        results.push(run.result);
    }

    let summary = build_run_summary(
        match_id.clone(),
        run_started_at_ms,
        now_ms(),
        results,
        winner_counts,
        total_anomalies,
        total_duration_ms,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &match_id,
                None,
                None,
                None,
                json!({ "error": error.to_string() }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "run_finished",
        &match_id,
        None,
        None,
        None,
        json!({
            "gameCount": summary.game_count,
            "anomalyCount": summary.anomaly_count,
            "averageDurationMs": summary.average_duration_ms,
            "winnerCounts": summary.winner_counts,
            "summaryOut": summary_out_written,
        }),
    );

    if summary.anomaly_count > 0 {
        std::process::exit(1);
    }
}

/// Two scripted bots play one match on a simulated clock.
fn run_game(game: u32, seed: u32, settings: GameSettings, max_ticks: u64) -> GameRunResult {
    let mut room = Room::new(format!("SIM{:03}", game % 1000), seed);
    let mut bot_rng = Rng::new(seed ^ 0x9e37_79b9);
    let mut now = START_MS;
    for (id, name) in BOTS {
        room.join(id, name, now);
    }
    room.toggle_ready(BOTS[1].0);
    let started = room.start_game(BOTS[0].0, settings, now);

    let period_ms = tick_period(normalize_speed(settings.speed)).as_millis() as u64;
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    if !started {
        push_anomaly(
            &mut anomalies,
            &mut anomaly_records,
            &mut anomaly_seen,
            0,
            "game did not start".to_string(),
        );
    }

    let mut ticks = 0u64;
    while started && room.phase() == RoomPhase::Active && ticks < max_ticks {
        for (id, _) in BOTS {
            if let Some(action) = choose_action(&mut bot_rng) {
                room.apply_action(id, action, now);
            }
        }
        now += period_ms;
        room.tick(now);
        ticks += 1;
        for message in collect_room_anomalies(&room) {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                ticks,
                message,
            );
        }
        room.drain_deliveries();
    }

    let stats = room.board().stats();
    GameRunResult {
        result: GameResultLine {
            game,
            seed,
            mode: settings.mode,
            target: settings.target,
            winner: room.config().winner,
            ticks,
            duration_ms: now - START_MS,
            primary_score: stats.primary_score,
            secondary_score: stats.secondary_score,
            board_size: room.config().board_size,
            anomalies,
        },
        anomaly_records,
    }
}

fn choose_action(rng: &mut Rng) -> Option<Action> {
    let roll = rng.next_f32();
    if roll < 0.08 {
        Some(Action::Drop)
    } else if roll < 0.18 {
        Some(Action::Rotate)
    } else if roll < 0.30 {
        Some(Action::Forward)
    } else if roll < 0.50 {
        rng.pick(&[Action::Left, Action::Right, Action::Up, Action::Down])
    } else {
        None
    }
}

fn collect_room_anomalies(room: &Room) -> Vec<String> {
    let mut anomalies = Vec::new();
    let board = room.board();
    let stats = board.stats();
    if stats.primary_count + stats.secondary_count != stats.total {
        anomalies.push("occupancy counts do not add up".to_string());
    }
    for owner in [Owner::Primary, Owner::Secondary] {
        if stats.score(owner) % PERIMETER_CELL_POINTS != 0 {
            anomalies.push(format!("score for {owner:?} is off the perimeter grid"));
        }
    }
    for id in room.participant_ids() {
        let Some(piece) = room.participant(&id).and_then(|p| p.piece.as_ref()) else {
            continue;
        };
        let inside = piece.cells().all(|(x, y)| {
            x >= 0 && y >= 0 && (x as usize) < board.cols() && (y as usize) < board.rows()
        });
        if !inside {
            anomalies.push(format!("live piece of {id} left the board"));
        }
    }
    if room.phase() == RoomPhase::Ended && room.config().winner.is_none() {
        anomalies.push("ended game without winner".to_string());
    }
    anomalies
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_match_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    match_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    games: Vec<GameResultLine>,
    winner_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_duration_ms: u64,
) -> RunSummary {
    let game_count = games.len();
    let average_duration_ms = if game_count == 0 {
        0
    } else {
        total_duration_ms / game_count as u64
    };
    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms,
        game_count,
        anomaly_count,
        average_duration_ms,
        winner_counts,
        games,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    match_id: &str,
    game: Option<u32>,
    seed: Option<u32>,
    tick: Option<u64>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        match_id: match_id.to_string(),
        game,
        seed,
        tick,
        details,
    };
    match serde_json::to_string(&log_line) {
        Ok(line) => eprintln!("{line}"),
        Err(err) => eprintln!("failed to serialize log line: {err}"),
    }
}

fn winner_key(winner: Option<Winner>) -> String {
    match winner {
        Some(Winner::Primary) => "primary",
        Some(Winner::Secondary) => "secondary",
        Some(Winner::Draw) => "draw",
        None => "unfinished",
    }
    .to_string()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<(), ServerError> {
    let summary_error = |source| ServerError::Summary {
        path: path.to_string_lossy().to_string(),
        source,
    };
    let summary_text = serde_json::to_string_pretty(summary)
        .map_err(|err| summary_error(std::io::Error::other(err)))?;
    std::fs::write(path, summary_text).map_err(summary_error)
}
