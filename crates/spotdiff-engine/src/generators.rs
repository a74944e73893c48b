use std::sync::Arc;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use spotdiff_contracts::cards::{Card, Difficulty};
use tracing::debug;

use crate::backend::{GenerationBackend, GenerationError, ImageRequest};
use crate::retry::{with_retry, RetryPolicy};

pub const STYLE_SUFFIX: &str = "vector art, flat color, white background, simple, cute";
pub const EDIT_STYLE_INSTRUCTION: &str = "Maintain exact style and background.";

/// Subjects for distractor cards; picking locally skips a text-model call.
pub const DISTRACTOR_PROMPTS: [&str; 12] = [
    "A cute red apple",
    "A happy yellow sun",
    "A blue ball",
    "A small green tree",
    "A cute cupcake",
    "A smiling star",
    "A simple flower",
    "A cute cat face",
    "A little duck",
    "A slice of watermelon",
    "A cute robot",
    "A purple balloon",
];

pub fn styled_prompt(base: &str) -> String {
    format!("{base}, {STYLE_SUFFIX}")
}

pub fn edit_prompt(instruction: &str) -> String {
    format!(
        "{}. {EDIT_STYLE_INSTRUCTION}",
        instruction.trim().trim_end_matches('.')
    )
}

/// Builds cards on top of a [`GenerationBackend`].
pub struct CardGenerator<B> {
    backend: Arc<B>,
    retry: RetryPolicy,
}

impl<B> Clone for CardGenerator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            retry: self.retry,
        }
    }
}

impl<B: GenerationBackend> CardGenerator<B> {
    pub fn new(backend: Arc<B>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Scenario, base render and edited render as one retry unit: any failure
    /// discards partial results and the whole sequence starts over.
    pub async fn generate_pair(&self, difficulty: Difficulty) -> Result<Card> {
        with_retry(self.retry, || self.generate_pair_once(difficulty)).await
    }

    async fn generate_pair_once(&self, difficulty: Difficulty) -> Result<Card> {
        let scenario = self
            .backend
            .generate_scenario(difficulty, difficulty.style_guidance())
            .await
            .context("scenario request failed")?;
        debug!(
            prompt = %scenario.original_prompt,
            location = %scenario.diff_location,
            "scenario ready"
        );

        let front = self
            .backend
            .generate_image(ImageRequest::Prompt(styled_prompt(&scenario.original_prompt)))
            .await?
            .ok_or_else(|| GenerationError::blocked("Blocked or failed front image"))?;

        let front_url = front.to_data_url();
        let back = self
            .backend
            .generate_image(ImageRequest::Edit {
                reference: front,
                instruction: edit_prompt(&scenario.edit_instruction),
            })
            .await?
            .ok_or_else(|| GenerationError::blocked("Blocked or failed back image"))?;

        Ok(Card::pair(
            front_url,
            back.to_data_url(),
            scenario.diff_description,
            scenario.diff_location,
            scenario.original_prompt,
        ))
    }

    /// One image from a random pool subject; front and back are identical.
    pub async fn generate_distractor(&self) -> Result<Card> {
        with_retry(self.retry, || self.generate_distractor_once()).await
    }

    async fn generate_distractor_once(&self) -> Result<Card> {
        let base = DISTRACTOR_PROMPTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(DISTRACTOR_PROMPTS[0]);
        let image = self
            .backend
            .generate_image(ImageRequest::Prompt(styled_prompt(base)))
            .await?
            .ok_or_else(|| GenerationError::blocked("Blocked or failed distractor image"))?;
        Ok(Card::distractor(image.to_data_url(), base))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use spotdiff_contracts::cards::{DiffLocation, Difficulty};

    use super::{edit_prompt, styled_prompt, CardGenerator, DISTRACTOR_PROMPTS};
    use crate::backend::{GenerationError, GenerationErrorKind};
    use crate::retry::RetryPolicy;
    use crate::test_support::{CallKind, Outcome, ScriptedBackend};

    fn generator(backend: &Arc<ScriptedBackend>) -> CardGenerator<ScriptedBackend> {
        CardGenerator::new(Arc::clone(backend), RetryPolicy::default())
    }

    #[test]
    fn prompts_carry_style_instructions() {
        assert_eq!(
            styled_prompt("A blue ball"),
            "A blue ball, vector art, flat color, white background, simple, cute"
        );
        assert_eq!(
            edit_prompt("Make the cat standing."),
            "Make the cat standing. Maintain exact style and background."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pair_uses_scenario_location_and_description() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let card = generator(&backend).generate_pair(Difficulty::Easy).await?;

        assert_eq!(card.diff_location(), DiffLocation::BottomLeft);
        assert_eq!(card.diff_description(), "Cat is standing");
        assert_eq!(card.prompt(), "A cute cat sitting");
        assert_ne!(card.front_image(), card.back_image());
        assert!(card.front_image().starts_with("data:image/png;base64,"));

        let calls = backend.calls();
        let kinds: Vec<CallKind> = calls.iter().map(|call| call.kind).collect();
        assert_eq!(kinds, vec![CallKind::Scenario, CallKind::Image, CallKind::Edit]);
        assert_eq!(
            calls[1].text,
            "A cute cat sitting, vector art, flat color, white background, simple, cute"
        );
        assert_eq!(
            calls[2].text,
            "Make the cat standing. Maintain exact style and background."
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn pair_restarts_whole_sequence_after_rate_limit() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        backend.script(CallKind::Edit, [Outcome::RateLimited]);
        generator(&backend).generate_pair(Difficulty::Medium).await?;

        let kinds: Vec<CallKind> = backend.calls().iter().map(|call| call.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CallKind::Scenario,
                CallKind::Image,
                CallKind::Edit,
                CallKind::Scenario,
                CallKind::Image,
                CallKind::Edit,
            ]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_image_fails_without_retry() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.script(CallKind::Image, [Outcome::Blocked; 8]);
        let err = generator(&backend)
            .generate_pair(Difficulty::Hard)
            .await
            .err();

        let kind = err
            .as_ref()
            .and_then(|err| err.downcast_ref::<GenerationError>())
            .map(GenerationError::kind);
        assert_eq!(kind, Some(GenerationErrorKind::Blocked));
        assert_eq!(backend.count(CallKind::Scenario), 1);
        assert_eq!(backend.count(CallKind::Edit), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn distractor_has_identical_faces_from_the_pool() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let card = generator(&backend).generate_distractor().await?;

        assert_eq!(card.front_image(), card.back_image());
        assert!(!card.is_target());
        assert_eq!(card.diff_location(), DiffLocation::Center);
        assert!(DISTRACTOR_PROMPTS.contains(&card.prompt()));
        assert_eq!(backend.count(CallKind::Scenario), 0);
        assert_eq!(backend.count(CallKind::Image), 1);
        Ok(())
    }
}
