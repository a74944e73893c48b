use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use spotdiff_contracts::cards::Difficulty;
use spotdiff_contracts::models::{
    ModelSelection, ModelSelector, CAPABILITY_EDIT, CAPABILITY_IMAGE, CAPABILITY_TEXT,
};

use crate::backend::{GenerationBackend, ImagePayload, ImageRequest, Scenario};
use crate::dryrun::DryrunBackend;
use crate::gemini::GeminiBackend;

/// Resolved models for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendPlan {
    pub provider: String,
    pub text: ModelSelection,
    pub image: ModelSelection,
}

impl BackendPlan {
    /// Picks the image model first, then a text model from the same provider.
    pub fn resolve(
        selector: &ModelSelector,
        text_model: Option<&str>,
        image_model: Option<&str>,
    ) -> Result<Self> {
        let image = selector
            .select(image_model, CAPABILITY_IMAGE, None)
            .map_err(|err| anyhow!(err))?;
        if !image.model.supports(CAPABILITY_EDIT) {
            bail!(
                "Image model '{}' cannot edit reference images.",
                image.model.name
            );
        }
        let provider = image.model.provider.clone();
        let text = selector
            .select(text_model, CAPABILITY_TEXT, Some(provider.as_str()))
            .map_err(|err| anyhow!(err))?;
        Ok(Self {
            provider,
            text,
            image,
        })
    }

    pub fn fallback_reasons(&self) -> impl Iterator<Item = &str> {
        [&self.image, &self.text]
            .into_iter()
            .filter_map(|selection| selection.fallback_reason.as_deref())
    }
}

/// The concrete backends, chosen at runtime from a [`BackendPlan`].
#[derive(Debug, Clone)]
pub enum NativeBackend {
    Gemini(GeminiBackend),
    Dryrun(DryrunBackend),
}

impl NativeBackend {
    pub fn from_plan(plan: &BackendPlan, dryrun_latency: Duration) -> Result<Self> {
        match plan.provider.as_str() {
            "gemini" => Ok(NativeBackend::Gemini(GeminiBackend::new(
                plan.text.model.name.clone(),
                plan.image.model.name.clone(),
            ))),
            "dryrun" => Ok(NativeBackend::Dryrun(DryrunBackend::with_latency(
                dryrun_latency,
            ))),
            other => bail!("No backend registered for provider '{other}'."),
        }
    }
}

impl GenerationBackend for NativeBackend {
    fn name(&self) -> &str {
        match self {
            NativeBackend::Gemini(backend) => backend.name(),
            NativeBackend::Dryrun(backend) => backend.name(),
        }
    }

    async fn generate_scenario(
        &self,
        difficulty: Difficulty,
        style_guidance: &str,
    ) -> Result<Scenario> {
        match self {
            NativeBackend::Gemini(backend) => {
                backend.generate_scenario(difficulty, style_guidance).await
            }
            NativeBackend::Dryrun(backend) => {
                backend.generate_scenario(difficulty, style_guidance).await
            }
        }
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<Option<ImagePayload>> {
        match self {
            NativeBackend::Gemini(backend) => backend.generate_image(request).await,
            NativeBackend::Dryrun(backend) => backend.generate_image(request).await,
        }
    }
}
