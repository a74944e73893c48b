mod play;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use spotdiff_contracts::cards::{find_target, Card, Difficulty};
use spotdiff_contracts::events::{ClearReason, EventWriter, SessionEvent};
use spotdiff_contracts::models::ModelSelector;
use spotdiff_contracts::play::GameMode;
use spotdiff_contracts::session::{write_summary, RoundTally, SessionSummary};
use spotdiff_engine::{
    decode_data_url, BackendPlan, BufferMode, EngineConfig, NativeBackend, PrefetchBuffer,
    SlotStatus,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "spotdiff", version, about = "Spot-the-difference card generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate single-mode rounds (one differential card each).
    Single(SingleArgs),
    /// Generate multi-mode rounds (one target among distractors).
    Multi(MultiArgs),
    /// Interactive terminal game.
    Play(PlayArgs),
}

#[derive(Debug, Clone, Args)]
struct BackendArgs {
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long, default_value = "dryrun-image-1")]
    image_model: String,
    /// Simulated per-call latency of the dryrun backend.
    #[arg(long, default_value_t = 0)]
    dryrun_latency_ms: u64,
}

#[derive(Debug, Parser)]
struct SingleArgs {
    #[arg(long, default_value_t = 3)]
    rounds: u32,
    #[arg(long, default_value = "easy")]
    difficulty: Difficulty,
    /// Idle time between rounds, standing in for the player.
    #[arg(long, default_value_t = 0)]
    pause_ms: u64,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Debug, Parser)]
struct MultiArgs {
    #[arg(long, default_value_t = 3)]
    rounds: u32,
    #[arg(long, default_value = "easy")]
    difficulty: Difficulty,
    /// Cards per set; defaults to the difficulty's count.
    #[arg(long)]
    count: Option<usize>,
    #[arg(long, default_value_t = 0)]
    pause_ms: u64,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Debug, Parser)]
struct PlayArgs {
    #[arg(long, default_value = "easy")]
    difficulty: Difficulty,
    /// Adds a memorize countdown to multi-mode rounds.
    #[arg(long)]
    timer: bool,
    #[arg(long)]
    count: Option<usize>,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    backend: BackendArgs,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("spotdiff error: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("spotdiff=info".parse()?))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Single(args) => run_single(args, &mut io::stdout()).await,
        Command::Multi(args) => run_multi(args, &mut io::stdout()).await,
        Command::Play(args) => play::run_play(args).await,
    }
}

async fn run_single<W: Write>(args: SingleArgs, out: &mut W) -> Result<i32> {
    let mut session = GameSession::start(&args.backend, &args.out, "single")?;
    for round in 1..=args.rounds {
        let ready = session.buffer.slot_status(BufferMode::Single) == SlotStatus::Ready;
        let started = Instant::now();
        let Some(card) = session.fetch_single(args.difficulty).await? else {
            writeln!(out, "Round {round}: card generation failed")?;
            continue;
        };
        let latency_ms = started.elapsed().as_millis();
        let dir = session.save_single(&card)?;
        writeln!(
            out,
            "Round {round}: {} [{}] {latency_ms} ms{} -> {}",
            card.diff_description(),
            card.diff_location(),
            if ready { " (prefetched)" } else { "" },
            dir.display()
        )?;
        session.pause(args.pause_ms).await;
    }
    session.finish(None)?;
    Ok(if session.failed_fetches == 0 { 0 } else { 2 })
}

async fn run_multi<W: Write>(args: MultiArgs, out: &mut W) -> Result<i32> {
    let count = args.count.unwrap_or_else(|| args.difficulty.card_count());
    let mut session = GameSession::start(&args.backend, &args.out, "multi")?;
    for round in 1..=args.rounds {
        let ready = session.buffer.slot_status(BufferMode::Multi) == SlotStatus::Ready;
        let started = Instant::now();
        let Some(cards) = session.fetch_multi(args.difficulty, count).await? else {
            writeln!(out, "Round {round}: card set generation failed")?;
            continue;
        };
        let latency_ms = started.elapsed().as_millis();
        let dir = session.save_multi(&cards)?;
        let target = find_target(&cards).map(|index| index + 1).unwrap_or_default();
        writeln!(
            out,
            "Round {round}: {} cards, target #{target} {latency_ms} ms{} -> {}",
            cards.len(),
            if ready { " (prefetched)" } else { "" },
            dir.display()
        )?;
        session.pause(args.pause_ms).await;
    }
    session.finish(None)?;
    Ok(if session.failed_fetches == 0 { 0 } else { 2 })
}

/// Everything one run of the game owns: the buffer, the event log and the
/// round bookkeeping.
pub(crate) struct GameSession {
    buffer: PrefetchBuffer<NativeBackend>,
    events: EventWriter,
    out_dir: PathBuf,
    started_at: String,
    rounds_served: u64,
    failed_fetches: u64,
    tally: RoundTally,
}

impl GameSession {
    fn start(backend_args: &BackendArgs, out_dir: &Path, command: &str) -> Result<Self> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;

        let plan = BackendPlan::resolve(
            &ModelSelector::new(None),
            backend_args.text_model.as_deref(),
            Some(backend_args.image_model.as_str()),
        )?;
        for reason in plan.fallback_reasons() {
            warn!(%reason, "model fallback");
        }
        let backend = NativeBackend::from_plan(
            &plan,
            Duration::from_millis(backend_args.dryrun_latency_ms),
        )?;
        let config = EngineConfig::from_env();
        let buffer = PrefetchBuffer::new(Arc::new(backend), &config);

        let session_id = uuid::Uuid::new_v4().to_string();
        let events = EventWriter::new(out_dir.join("events.jsonl"), session_id.clone());
        events.emit(&SessionEvent::SessionStarted {
            command: command.to_string(),
            provider: plan.provider.clone(),
            text_model: plan.text.model.name.clone(),
            image_model: plan.image.model.name.clone(),
            out_dir: out_dir.to_string_lossy().to_string(),
        })?;
        info!(%session_id, provider = %plan.provider, "session started");

        Ok(Self {
            buffer,
            events,
            out_dir: out_dir.to_path_buf(),
            started_at: now_utc_iso(),
            rounds_served: 0,
            failed_fetches: 0,
            tally: RoundTally::new(),
        })
    }

    /// `Ok(None)` when generation failed; the failure is logged and counted.
    async fn fetch_single(&mut self, difficulty: Difficulty) -> Result<Option<Card>> {
        let started = Instant::now();
        match self.buffer.fetch_single_card(difficulty).await {
            Ok(card) => {
                self.rounds_served += 1;
                self.events.emit(&SessionEvent::CardServed {
                    round: self.rounds_served,
                    card_id: card.id().to_string(),
                    difficulty,
                    diff_location: card.diff_location(),
                    latency_ms: elapsed_ms(started),
                })?;
                Ok(Some(card))
            }
            Err(err) => {
                self.record_failure(GameMode::Single, difficulty, &err)?;
                Ok(None)
            }
        }
    }

    async fn fetch_multi(
        &mut self,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Option<Vec<Card>>> {
        let started = Instant::now();
        match self.buffer.fetch_multi_card_set(difficulty, count).await {
            Ok(cards) => {
                self.rounds_served += 1;
                self.events.emit(&SessionEvent::SetServed {
                    round: self.rounds_served,
                    card_ids: cards.iter().map(|card| card.id().to_string()).collect(),
                    target_index: find_target(&cards),
                    difficulty,
                    latency_ms: elapsed_ms(started),
                })?;
                Ok(Some(cards))
            }
            Err(err) => {
                self.record_failure(GameMode::Multi, difficulty, &err)?;
                Ok(None)
            }
        }
    }

    fn record_failure(
        &mut self,
        mode: GameMode,
        difficulty: Difficulty,
        err: &anyhow::Error,
    ) -> Result<()> {
        self.failed_fetches += 1;
        let error = format!("{err:#}");
        warn!(%mode, %difficulty, %error, "fetch failed");
        self.events.emit(&SessionEvent::FetchFailed {
            mode,
            difficulty,
            error,
        })?;
        Ok(())
    }

    fn round_dir(&self) -> Result<PathBuf> {
        let dir = self.out_dir.join(format!("round-{:03}", self.rounds_served));
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(dir)
    }

    /// Writes both faces and `card.json` under the current round directory.
    fn save_single(&self, card: &Card) -> Result<PathBuf> {
        let dir = self.round_dir()?;
        let meta = write_card_faces(&dir, "card", card)?;
        write_json(&dir.join("card.json"), &meta)?;
        Ok(dir)
    }

    fn save_multi(&self, cards: &[Card]) -> Result<PathBuf> {
        let dir = self.round_dir()?;
        let mut metas = Vec::with_capacity(cards.len());
        for (index, card) in cards.iter().enumerate() {
            metas.push(write_card_faces(&dir, &format!("card-{}", index + 1), card)?);
        }
        write_json(
            &dir.join("set.json"),
            &json!({
                "target_index": find_target(cards),
                "cards": metas,
            }),
        )?;
        Ok(dir)
    }

    fn finish_round(&mut self, mode: GameMode, success: bool) -> Result<()> {
        self.tally.record(success);
        self.events.emit(&SessionEvent::RoundFinished {
            mode,
            success,
            score: self.tally.score,
            streak: self.tally.streak,
            rounds_played: self.tally.rounds_played,
        })?;
        Ok(())
    }

    /// Drops prefetched content; used on return to menu and settings changes.
    fn clear_buffers(&self, reason: ClearReason) -> Result<()> {
        self.buffer.clear_all_buffers();
        self.events.emit(&SessionEvent::BuffersCleared { reason })?;
        Ok(())
    }

    async fn pause(&self, millis: u64) {
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn finish(&self, extra: Option<&Map<String, Value>>) -> Result<SessionSummary> {
        let summary = SessionSummary {
            session_id: self.events.session_id().to_string(),
            started_at: self.started_at.clone(),
            finished_at: now_utc_iso(),
            rounds_played: self.rounds_served,
            score: self.tally.score,
            best_streak: self.tally.best_streak,
            failed_fetches: self.failed_fetches,
        };
        self.events.emit(&SessionEvent::SessionFinished {
            rounds_played: summary.rounds_played,
            score: summary.score,
            failed_fetches: summary.failed_fetches,
        })?;
        write_summary(&self.out_dir.join("summary.json"), &summary, extra)?;
        Ok(summary)
    }
}

/// Decodes and writes the card's faces; distractors get a single image.
fn write_card_faces(dir: &Path, stem: &str, card: &Card) -> Result<Value> {
    let front = decode_data_url(card.front_image()).context("front image")?;
    let front_path = dir.join(format!("{stem}-front.{}", extension_for_mime(&front.mime_type)));
    fs::write(&front_path, &front.bytes)
        .with_context(|| format!("failed to write {}", front_path.display()))?;

    let back_path = if card.back_image() == card.front_image() {
        front_path.clone()
    } else {
        let back = decode_data_url(card.back_image()).context("back image")?;
        let path = dir.join(format!("{stem}-back.{}", extension_for_mime(&back.mime_type)));
        fs::write(&path, &back.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        path
    };

    Ok(json!({
        "id": card.id(),
        "prompt": card.prompt(),
        "diff_description": card.diff_description(),
        "diff_location": card.diff_location().as_str(),
        "is_target": card.is_target(),
        "front": file_name(&front_path),
        "back": file_name(&back_path),
    }))
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/png" => "png",
        _ => "bin",
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn json_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::Value;
    use spotdiff_contracts::cards::Difficulty;
    use spotdiff_contracts::events::SessionEvent;

    use super::{extension_for_mime, run_multi, run_single, BackendArgs, MultiArgs, SingleArgs};

    pub(crate) fn dryrun_args() -> BackendArgs {
        BackendArgs {
            text_model: None,
            image_model: "dryrun-image-1".to_string(),
            dryrun_latency_ms: 0,
        }
    }

    fn read_events(path: &std::path::Path) -> anyhow::Result<Vec<Value>> {
        fs::read_to_string(path)?
            .lines()
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }

    #[test]
    fn mime_types_map_to_file_extensions() {
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("IMAGE/JPEG"), "jpg");
        assert_eq!(extension_for_mime("application/octet-stream"), "bin");
    }

    #[tokio::test]
    async fn single_run_writes_rounds_events_and_summary() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let args = SingleArgs {
            rounds: 2,
            difficulty: Difficulty::Medium,
            pause_ms: 0,
            out: temp.path().to_path_buf(),
            backend: dryrun_args(),
        };
        let mut out = Vec::new();
        let code = run_single(args, &mut out).await?;
        assert_eq!(code, 0);

        for round in ["round-001", "round-002"] {
            let dir = temp.path().join(round);
            assert!(dir.join("card-front.png").exists());
            assert!(dir.join("card-back.png").exists());
            let meta: Value = serde_json::from_str(&fs::read_to_string(dir.join("card.json"))?)?;
            assert_eq!(meta["is_target"], Value::Bool(true));
        }

        let events = read_events(&temp.path().join("events.jsonl"))?;
        let types: Vec<&str> = events
            .iter()
            .filter_map(|event| event["type"].as_str())
            .collect();
        assert_eq!(
            types,
            vec!["session_started", "card_served", "card_served", "session_finished"]
        );
        let typed: Vec<SessionEvent> = fs::read_to_string(temp.path().join("events.jsonl"))?
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert!(matches!(
            typed[1],
            SessionEvent::CardServed {
                round: 1,
                difficulty: Difficulty::Medium,
                ..
            }
        ));

        let summary: Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join("summary.json"))?)?;
        assert_eq!(summary["rounds_played"], 2);
        assert_eq!(summary["failed_fetches"], 0);
        let stdout = String::from_utf8(out)?;
        assert!(stdout.contains("Round 2:"));
        Ok(())
    }

    #[tokio::test]
    async fn multi_run_writes_one_target_per_set() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let args = MultiArgs {
            rounds: 1,
            difficulty: Difficulty::Medium,
            count: None,
            pause_ms: 0,
            out: temp.path().to_path_buf(),
            backend: dryrun_args(),
        };
        let mut out = Vec::new();
        run_multi(args, &mut out).await?;

        let set: Value = serde_json::from_str(&fs::read_to_string(
            temp.path().join("round-001").join("set.json"),
        )?)?;
        let cards = set["cards"].as_array().cloned().unwrap_or_default();
        assert_eq!(cards.len(), 4);
        assert_eq!(
            cards
                .iter()
                .filter(|card| card["is_target"] == Value::Bool(true))
                .count(),
            1
        );
        Ok(())
    }
}
