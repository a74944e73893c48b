//! Scripted in-memory backend for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use spotdiff_contracts::cards::{DiffLocation, Difficulty};
use tokio::time::Instant;

use crate::backend::{GenerationBackend, GenerationError, ImagePayload, ImageRequest, Scenario};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    Scenario,
    Image,
    Edit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    RateLimited,
    Blocked,
    Malformed,
}

#[derive(Clone, Debug)]
pub struct CallRecord {
    pub kind: CallKind,
    pub text: String,
    pub started: Instant,
    pub finished: Instant,
}

pub struct ScriptedBackend {
    latency: Duration,
    scripts: Mutex<HashMap<CallKind, VecDeque<Outcome>>>,
    defaults: Mutex<HashMap<CallKind, Outcome>>,
    calls: Mutex<Vec<CallRecord>>,
    serial: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::with_latency(Duration::from_millis(100))
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            scripts: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            serial: AtomicUsize::new(0),
        }
    }

    /// Queues outcomes consumed by the next calls of `kind`.
    pub fn script(&self, kind: CallKind, outcomes: impl IntoIterator<Item = Outcome>) {
        lock(&self.scripts)
            .entry(kind)
            .or_default()
            .extend(outcomes);
    }

    /// Outcome once the script for `kind` runs dry.
    pub fn set_default(&self, kind: CallKind, outcome: Outcome) {
        lock(&self.defaults).insert(kind, outcome);
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        let mut calls = lock(&self.calls).clone();
        calls.sort_by_key(|call| call.started);
        calls
    }

    pub fn calls_of(&self, kind: CallKind) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|call| call.kind == kind)
            .collect()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.kind == kind)
            .count()
    }

    fn next_outcome(&self, kind: CallKind) -> Outcome {
        if let Some(outcome) = lock(&self.scripts).get_mut(&kind).and_then(VecDeque::pop_front) {
            return outcome;
        }
        lock(&self.defaults)
            .get(&kind)
            .copied()
            .unwrap_or(Outcome::Success)
    }

    async fn perform(&self, kind: CallKind, text: String) -> Outcome {
        let outcome = self.next_outcome(kind);
        let started = Instant::now();
        tokio::time::sleep(self.latency).await;
        lock(&self.calls).push(CallRecord {
            kind,
            text,
            started,
            finished: Instant::now(),
        });
        outcome
    }
}

impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_scenario(
        &self,
        _difficulty: Difficulty,
        style_guidance: &str,
    ) -> Result<Scenario> {
        match self
            .perform(CallKind::Scenario, style_guidance.to_string())
            .await
        {
            Outcome::Success => Ok(Scenario {
                original_prompt: "A cute cat sitting".to_string(),
                edit_instruction: "Make the cat standing".to_string(),
                diff_description: "Cat is standing".to_string(),
                diff_location: DiffLocation::BottomLeft,
            }),
            Outcome::RateLimited => {
                Err(GenerationError::rate_limited("429 RESOURCE_EXHAUSTED").into())
            }
            Outcome::Blocked => Err(GenerationError::blocked("scenario blocked").into()),
            Outcome::Malformed => Err(GenerationError::malformed("no scenario text").into()),
        }
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<Option<ImagePayload>> {
        let kind = match &request {
            ImageRequest::Prompt(_) => CallKind::Image,
            ImageRequest::Edit { .. } => CallKind::Edit,
        };
        match self.perform(kind, request.text().to_string()).await {
            Outcome::Success => {
                let serial = self.serial.fetch_add(1, Ordering::SeqCst);
                Ok(Some(ImagePayload::new(
                    format!("image-{serial}").into_bytes(),
                    "image/png",
                )))
            }
            Outcome::RateLimited => {
                Err(GenerationError::rate_limited("429 Too Many Requests").into())
            }
            Outcome::Blocked => Ok(None),
            Outcome::Malformed => Err(GenerationError::malformed("no candidates").into()),
        }
    }
}
