use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cards::{DiffLocation, Difficulty};
use crate::play::GameMode;

/// Why prefetched content was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearReason {
    Menu,
    ModeChanged,
    DifficultyChanged,
}

/// One line of a session's `events.jsonl`, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        command: String,
        provider: String,
        text_model: String,
        image_model: String,
        out_dir: String,
    },
    CardServed {
        round: u64,
        card_id: String,
        difficulty: Difficulty,
        diff_location: DiffLocation,
        latency_ms: u64,
    },
    SetServed {
        round: u64,
        card_ids: Vec<String>,
        target_index: Option<usize>,
        difficulty: Difficulty,
        latency_ms: u64,
    },
    RoundFinished {
        mode: GameMode,
        success: bool,
        score: u64,
        streak: u64,
        rounds_played: u64,
    },
    BuffersCleared {
        reason: ClearReason,
    },
    FetchFailed {
        mode: GameMode,
        difficulty: Difficulty,
        error: String,
    },
    SessionFinished {
        rounds_played: u64,
        score: u64,
        failed_fetches: u64,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. } => "session_started",
            SessionEvent::CardServed { .. } => "card_served",
            SessionEvent::SetServed { .. } => "set_served",
            SessionEvent::RoundFinished { .. } => "round_finished",
            SessionEvent::BuffersCleared { .. } => "buffers_cleared",
            SessionEvent::FetchFailed { .. } => "fetch_failed",
            SessionEvent::SessionFinished { .. } => "session_finished",
        }
    }
}

/// Append-only writer for a session's `events.jsonl`.
///
/// Each line is the serialized event plus `session_id` and `ts`. Writers are
/// cheap to clone and share one file lock.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    session_id: String,
    append: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                session_id: session_id.into(),
                append: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Appends one record and returns it as written.
    pub fn emit(&self, event: &SessionEvent) -> anyhow::Result<Value> {
        let Value::Object(fields) = serde_json::to_value(event)? else {
            anyhow::bail!("event '{}' did not serialize to an object", event.kind());
        };
        let mut record = Map::new();
        record.insert(
            "session_id".to_string(),
            Value::String(self.shared.session_id.clone()),
        );
        record.insert("ts".to_string(), Value::String(now_utc_iso()));
        record.extend(fields);

        if let Some(parent) = self.shared.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self
            .shared
            .append
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.shared.path)?
            .write_all(line.as_bytes())?;
        Ok(Value::Object(record))
    }
}

pub(crate) fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
