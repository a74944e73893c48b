use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use spotdiff_contracts::cards::{Card, Difficulty};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::assembler::MultiSetAssembler;
use crate::backend::GenerationBackend;
use crate::config::{EngineConfig, RefillDelays};
use crate::generators::CardGenerator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferMode {
    Single,
    Multi,
}

impl fmt::Display for BufferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferMode::Single => f.write_str("single"),
            BufferMode::Multi => f.write_str("multi"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    Empty,
    Pending,
    Ready,
}

type Outcome<T> = Result<T>;

/// At most one generation task per mode, ever.
enum Slot<T> {
    Empty,
    /// A refill is in flight; `ticket` identifies the task that owns the slot.
    Pending {
        ticket: u64,
        receiver: oneshot::Receiver<Outcome<T>>,
    },
    Ready(T),
}

impl<T> Slot<T> {
    fn status(&self) -> SlotStatus {
        match self {
            Slot::Empty => SlotStatus::Empty,
            Slot::Pending { .. } => SlotStatus::Pending,
            Slot::Ready(_) => SlotStatus::Ready,
        }
    }

    fn is_pending(&self, ticket: u64) -> bool {
        matches!(self, Slot::Pending { ticket: owner, .. } if *owner == ticket)
    }

    /// Detaches the content, leaving the slot empty.
    fn take(&mut self) -> Option<Served<T>> {
        match std::mem::replace(self, Slot::Empty) {
            Slot::Empty => None,
            Slot::Pending { receiver, .. } => Some(Served::Pending(receiver)),
            Slot::Ready(value) => Some(Served::Ready(value)),
        }
    }
}

enum Served<T> {
    Ready(T),
    Pending(oneshot::Receiver<Outcome<T>>),
}

impl<T> Served<T> {
    async fn resolve(self) -> Result<T> {
        match self {
            Served::Ready(value) => Ok(value),
            Served::Pending(receiver) => receiver
                .await
                .map_err(|_| anyhow!("prefetch task ended without a result"))?,
        }
    }
}

struct Slots {
    single: Slot<Card>,
    multi: Slot<Vec<Card>>,
    next_ticket: u64,
    /// Bumped by every clear; refills scheduled under an older epoch never run.
    epoch: u64,
}

impl Slots {
    fn single_mut(&mut self) -> &mut Slot<Card> {
        &mut self.single
    }

    fn multi_mut(&mut self) -> &mut Slot<Vec<Card>> {
        &mut self.multi
    }
}

type SlotSelector<T> = fn(&mut Slots) -> &mut Slot<T>;

struct BufferShared<B> {
    generator: CardGenerator<B>,
    assembler: MultiSetAssembler<B>,
    delays: RefillDelays,
    slots: Mutex<Slots>,
}

impl<B> BufferShared<B> {
    fn lock_slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps one card (single mode) and one card set (multi mode) generated
/// ahead of the player.
///
/// Handles are cheap to clone and share one pair of slots. Must be used from
/// within a tokio runtime: refills run as detached tasks.
pub struct PrefetchBuffer<B> {
    shared: Arc<BufferShared<B>>,
}

impl<B> Clone for PrefetchBuffer<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: GenerationBackend> PrefetchBuffer<B> {
    pub fn new(backend: Arc<B>, config: &EngineConfig) -> Self {
        let generator = CardGenerator::new(backend, config.retry);
        let assembler = MultiSetAssembler::new(generator.clone(), config.pacing);
        Self::from_parts(generator, assembler, config.refill)
    }

    pub fn from_parts(
        generator: CardGenerator<B>,
        assembler: MultiSetAssembler<B>,
        delays: RefillDelays,
    ) -> Self {
        Self {
            shared: Arc::new(BufferShared {
                generator,
                assembler,
                delays,
                slots: Mutex::new(Slots {
                    single: Slot::Empty,
                    multi: Slot::Empty,
                    next_ticket: 0,
                    epoch: 0,
                }),
            }),
        }
    }

    pub fn slot_status(&self, mode: BufferMode) -> SlotStatus {
        let slots = self.shared.lock_slots();
        match mode {
            BufferMode::Single => slots.single.status(),
            BufferMode::Multi => slots.multi.status(),
        }
    }

    /// Serves the buffered card if any, otherwise generates one now. Either
    /// way a background refill is scheduled with the same difficulty.
    pub async fn fetch_single_card(&self, difficulty: Difficulty) -> Result<Card> {
        let served = self.shared.lock_slots().single.take();
        let delays = self.shared.delays;
        match served {
            Some(served) => {
                debug!(mode = %BufferMode::Single, "serving prefetched card");
                self.schedule_single_refill(difficulty, delays.single_after_serve);
                served.resolve().await
            }
            None => {
                info!(mode = %BufferMode::Single, %difficulty, "buffer empty, generating card now");
                let task = tokio::spawn(self.single_job(difficulty));
                self.schedule_single_refill(difficulty, delays.single_after_cold);
                task.await.context("card generation task failed")?
            }
        }
    }

    /// Multi-mode counterpart of [`fetch_single_card`](Self::fetch_single_card).
    pub async fn fetch_multi_card_set(
        &self,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<Card>> {
        let served = self.shared.lock_slots().multi.take();
        let delays = self.shared.delays;
        match served {
            Some(served) => {
                debug!(mode = %BufferMode::Multi, "serving prefetched card set");
                self.schedule_multi_refill(difficulty, count, delays.multi_after_serve);
                served.resolve().await
            }
            None => {
                info!(mode = %BufferMode::Multi, %difficulty, count, "buffer empty, generating set now");
                let task = tokio::spawn(self.multi_job(difficulty, count));
                self.schedule_multi_refill(difficulty, count, delays.multi_after_cold);
                task.await.context("card set generation task failed")?
            }
        }
    }

    /// Starts a single-mode refill unless the slot is already occupied.
    pub fn preload_single_card(&self, difficulty: Difficulty) {
        self.refill(
            BufferMode::Single,
            None,
            Slots::single_mut,
            self.single_job(difficulty),
        );
    }

    /// Starts a multi-mode refill unless the slot is already occupied.
    pub fn preload_multi_card_set(&self, difficulty: Difficulty, count: usize) {
        self.refill(
            BufferMode::Multi,
            None,
            Slots::multi_mut,
            self.multi_job(difficulty, count),
        );
    }

    /// Empties both slots. In-flight tasks keep running; their results are
    /// dropped when they settle.
    pub fn clear_all_buffers(&self) {
        let mut slots = self.shared.lock_slots();
        slots.single = Slot::Empty;
        slots.multi = Slot::Empty;
        slots.epoch += 1;
        info!(epoch = slots.epoch, "buffers cleared");
    }

    fn single_job(
        &self,
        difficulty: Difficulty,
    ) -> impl Future<Output = Result<Card>> + Send + 'static {
        let generator = self.shared.generator.clone();
        async move { generator.generate_pair(difficulty).await }
    }

    fn multi_job(
        &self,
        difficulty: Difficulty,
        count: usize,
    ) -> impl Future<Output = Result<Vec<Card>>> + Send + 'static {
        let assembler = self.shared.assembler.clone();
        async move { assembler.assemble(difficulty, count).await }
    }

    fn schedule_single_refill(&self, difficulty: Difficulty, delay: Duration) {
        let epoch = self.shared.lock_slots().epoch;
        let buffer = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            buffer.refill(
                BufferMode::Single,
                Some(epoch),
                Slots::single_mut,
                buffer.single_job(difficulty),
            );
        });
    }

    fn schedule_multi_refill(&self, difficulty: Difficulty, count: usize, delay: Duration) {
        let epoch = self.shared.lock_slots().epoch;
        let buffer = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            buffer.refill(
                BufferMode::Multi,
                Some(epoch),
                Slots::multi_mut,
                buffer.multi_job(difficulty, count),
            );
        });
    }

    /// Places `job` in the slot if it is empty and spawns it.
    ///
    /// When the job settles it either completes the slot (ready on success,
    /// empty on failure) or, if a fetch detached it meanwhile, hands the
    /// outcome to that caller. Outcomes nobody waits for are dropped.
    fn refill<T, Fut>(
        &self,
        mode: BufferMode,
        expected_epoch: Option<u64>,
        select: SlotSelector<T>,
        job: Fut,
    ) where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (sender, ticket) = {
            let mut slots = self.shared.lock_slots();
            if expected_epoch.is_some_and(|epoch| epoch != slots.epoch) {
                debug!(%mode, "buffers cleared since refill was scheduled, skipping");
                return;
            }
            if !matches!(select(&mut slots), Slot::Empty) {
                debug!(%mode, "slot occupied, refill skipped");
                return;
            }
            let ticket = slots.next_ticket;
            slots.next_ticket += 1;
            let (sender, receiver) = oneshot::channel();
            *select(&mut slots) = Slot::Pending { ticket, receiver };
            (sender, ticket)
        };

        info!(%mode, ticket, "prefetching next");
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let outcome = job.await;
            {
                let mut slots = shared.lock_slots();
                let slot = select(&mut slots);
                if slot.is_pending(ticket) {
                    match outcome {
                        Ok(value) => *slot = Slot::Ready(value),
                        Err(err) => {
                            warn!(%mode, ticket, error = %err, "prefetch failed, clearing slot");
                            *slot = Slot::Empty;
                        }
                    }
                    return;
                }
            }
            if let Err(Err(err)) = sender.send(outcome) {
                debug!(%mode, ticket, error = %err, "discarding failure of abandoned prefetch");
            }
        });
    }
}
