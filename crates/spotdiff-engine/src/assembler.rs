use anyhow::Result;
use rand::seq::SliceRandom;
use spotdiff_contracts::cards::{Card, Difficulty};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::backend::GenerationBackend;
use crate::config::AssemblyPacing;
use crate::generators::CardGenerator;

/// Distractors in a set of `total` cards. Never below one, so a request for
/// a single card still yields a two-card set.
pub fn distractor_count(total: usize) -> usize {
    total.saturating_sub(1).max(1)
}

/// Composes one differential pair with distractors into a shuffled set.
pub struct MultiSetAssembler<B> {
    generator: CardGenerator<B>,
    pacing: AssemblyPacing,
}

impl<B> Clone for MultiSetAssembler<B> {
    fn clone(&self) -> Self {
        Self {
            generator: self.generator.clone(),
            pacing: self.pacing,
        }
    }
}

impl<B: GenerationBackend> MultiSetAssembler<B> {
    pub fn new(generator: CardGenerator<B>, pacing: AssemblyPacing) -> Self {
        Self { generator, pacing }
    }

    /// Target first, then distractors one at a time with a pause between
    /// requests, then a uniform shuffle. Any unrecovered failure aborts the
    /// whole set.
    pub async fn assemble(&self, difficulty: Difficulty, count: usize) -> Result<Vec<Card>> {
        match self.assemble_inner(difficulty, count).await {
            Ok(cards) => Ok(cards),
            Err(err) => {
                error!(%difficulty, count, error = %err, "multi-card set generation failed");
                Err(err)
            }
        }
    }

    async fn assemble_inner(&self, difficulty: Difficulty, count: usize) -> Result<Vec<Card>> {
        let target = self.generator.generate_pair(difficulty).await?;

        let wanted = distractor_count(count);
        let mut cards = Vec::with_capacity(wanted + 1);
        cards.push(target);
        for index in 0..wanted {
            if index > 0 {
                sleep(self.pacing.distractor_gap).await;
            }
            cards.push(self.distractor_with_one_retry(index).await?);
        }

        cards.shuffle(&mut rand::thread_rng());
        debug!(%difficulty, cards = cards.len(), "multi-card set ready");
        Ok(cards)
    }

    async fn distractor_with_one_retry(&self, index: usize) -> Result<Card> {
        match self.generator.generate_distractor().await {
            Ok(card) => Ok(card),
            Err(err) => {
                warn!(index, error = %err, "distractor failed, trying one retry");
                sleep(self.pacing.distractor_retry_pause).await;
                self.generator.generate_distractor().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use spotdiff_contracts::cards::{find_target, Difficulty};

    use super::{distractor_count, MultiSetAssembler};
    use crate::config::AssemblyPacing;
    use crate::generators::CardGenerator;
    use crate::retry::RetryPolicy;
    use crate::test_support::{CallKind, Outcome, ScriptedBackend};

    fn assembler(backend: &Arc<ScriptedBackend>) -> MultiSetAssembler<ScriptedBackend> {
        MultiSetAssembler::new(
            CardGenerator::new(Arc::clone(backend), RetryPolicy::default()),
            AssemblyPacing::default(),
        )
    }

    #[test]
    fn distractor_count_clamps_to_one() {
        assert_eq!(distractor_count(0), 1);
        assert_eq!(distractor_count(1), 1);
        assert_eq!(distractor_count(2), 1);
        assert_eq!(distractor_count(6), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn set_has_one_target_and_requested_size() -> anyhow::Result<()> {
        for count in 1..=6 {
            let backend = Arc::new(ScriptedBackend::new());
            let cards = assembler(&backend).assemble(Difficulty::Medium, count).await?;

            assert_eq!(cards.len(), count.max(2));
            assert_eq!(cards.iter().filter(|card| card.is_target()).count(), 1);
            assert!(find_target(&cards).is_some());
            let ids: HashSet<&str> = cards.iter().map(|card| card.id()).collect();
            assert_eq!(ids.len(), cards.len());
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn target_position_varies_across_sets() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::with_latency(Duration::from_millis(1)));
        let assembler = assembler(&backend);
        let mut positions = [0usize; 6];
        for _ in 0..200 {
            let cards = assembler.assemble(Difficulty::Hard, 6).await?;
            let index = find_target(&cards)
                .ok_or_else(|| anyhow::anyhow!("set without a target card"))?;
            positions[index] += 1;
        }
        // uniform placement lands near 33 per slot
        assert!(positions.iter().all(|&hits| hits > 0), "{positions:?}");
        assert!(positions.iter().all(|&hits| hits < 100), "{positions:?}");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn hard_set_throttles_sequential_distractors() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let cards = assembler(&backend).assemble(Difficulty::Hard, 6).await?;
        assert_eq!(cards.len(), 6);

        let edit_done = backend
            .calls_of(CallKind::Edit)
            .last()
            .map(|call| call.finished);
        let distractors = backend.calls_of(CallKind::Image);
        // first Image call is the target's front render
        let distractors = &distractors[1..];
        assert_eq!(distractors.len(), 5);
        assert!(edit_done.map(|done| done <= distractors[0].started).unwrap_or(false));
        for pair in distractors.windows(2) {
            assert!(pair[1].started >= pair[0].finished);
            assert!(pair[1].started - pair[0].finished >= Duration::from_millis(500));
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_distractor_gets_one_manual_retry() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        // target front succeeds, first distractor is blocked once
        backend.script(CallKind::Image, [Outcome::Success, Outcome::Blocked]);
        let cards = assembler(&backend).assemble(Difficulty::Medium, 4).await?;

        assert_eq!(cards.len(), 4);
        assert_eq!(cards.iter().filter(|card| !card.is_target()).count(), 3);
        let images = backend.calls_of(CallKind::Image);
        assert_eq!(images.len(), 5);
        assert!(images[2].started - images[1].finished >= Duration::from_millis(1000));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn second_distractor_failure_aborts_the_set() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.script(
            CallKind::Image,
            [Outcome::Success, Outcome::Blocked, Outcome::Blocked],
        );
        let result = assembler(&backend).assemble(Difficulty::Easy, 2).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn target_failure_skips_distractors() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_default(CallKind::Scenario, Outcome::Malformed);
        let result = assembler(&backend).assemble(Difficulty::Hard, 6).await;
        assert!(result.is_err());
        assert_eq!(backend.count(CallKind::Image), 0);
    }
}
