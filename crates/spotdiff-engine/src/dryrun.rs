use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;
use sha2::{Digest, Sha256};
use spotdiff_contracts::cards::{DiffLocation, Difficulty};
use tracing::debug;

use crate::backend::{GenerationBackend, GenerationError, ImagePayload, ImageRequest, Scenario};

const CARD_SIZE: u32 = 256;

/// (subject, what the edit adds)
const SUBJECTS: [(&str, &str); 8] = [
    ("A cat sitting on a cushion", "a red bow"),
    ("A snowman in a small garden", "a blue scarf"),
    ("A sailing boat on calm water", "a yellow flag"),
    ("A house with a round window", "a green door"),
    ("A teddy bear holding a cup", "a pink heart"),
    ("An owl on a tree branch", "a tiny moon"),
    ("A frog on a lily pad", "an orange butterfly"),
    ("A rocket between two clouds", "a bright star"),
];

/// Offline backend producing flat-colour placeholder cards.
///
/// Scenarios are drawn from a fixed table. Images are solid colours derived
/// from the prompt; edits paint a marker square into the region named by the
/// instruction, so the pair differs exactly where the scenario says.
#[derive(Debug, Clone, Default)]
pub struct DryrunBackend {
    latency: Duration,
}

impl DryrunBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps `latency` before answering.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl GenerationBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    async fn generate_scenario(
        &self,
        difficulty: Difficulty,
        _style_guidance: &str,
    ) -> Result<Scenario> {
        self.simulate_latency().await;
        let (subject, addition, location) = {
            let mut rng = rand::thread_rng();
            let (subject, addition) = SUBJECTS[rng.gen_range(0..SUBJECTS.len())];
            let location = *DiffLocation::ALL
                .choose(&mut rng)
                .unwrap_or(&DiffLocation::Center);
            (subject, addition, location)
        };
        let region = region_phrase(location);
        debug!(%difficulty, %location, "dryrun scenario");
        Ok(Scenario {
            original_prompt: subject.to_string(),
            edit_instruction: format!("Add {addition} in the {region} of the picture"),
            diff_description: format!("There is {addition} in the {region}."),
            diff_location: location,
        })
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<Option<ImagePayload>> {
        self.simulate_latency().await;
        let image = match &request {
            ImageRequest::Prompt(prompt) => solid_card(prompt),
            ImageRequest::Edit {
                reference,
                instruction,
            } => {
                let mut image = image::load_from_memory(&reference.bytes)
                    .map_err(|err| {
                        GenerationError::malformed(format!("reference image did not decode: {err}"))
                    })?
                    .to_rgb8();
                paint_marker(&mut image, region_in_text(instruction), instruction);
                image
            }
        };
        encode_png(&image).map(Some)
    }
}

fn region_phrase(location: DiffLocation) -> String {
    location.as_str().replace('-', " ")
}

/// Region named in free text; `Center` when none is.
pub fn region_in_text(text: &str) -> DiffLocation {
    let lowered = text.to_ascii_lowercase().replace('-', " ");
    DiffLocation::ALL
        .into_iter()
        .find(|location| lowered.contains(&region_phrase(*location)))
        .unwrap_or(DiffLocation::Center)
}

fn color_from_text(text: &str) -> Rgb<u8> {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    Rgb([digest[0], digest[1], digest[2]])
}

fn solid_card(prompt: &str) -> RgbImage {
    RgbImage::from_pixel(CARD_SIZE, CARD_SIZE, color_from_text(prompt))
}

fn paint_marker(image: &mut RgbImage, location: DiffLocation, instruction: &str) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let (fx, fy) = match location {
        DiffLocation::TopLeft => (0.17, 0.25),
        DiffLocation::TopRight => (0.83, 0.25),
        DiffLocation::BottomLeft => (0.17, 0.75),
        DiffLocation::BottomRight => (0.83, 0.75),
        DiffLocation::Center => (0.5, 0.5),
    };
    let cx = (width as f64 * fx) as u32;
    let cy = (height as f64 * fy) as u32;
    let half = (width.min(height) / 12).max(1);

    let Rgb([r, g, b]) = color_from_text(instruction);
    let mut marker = Rgb([r, g, b]);
    let base = image.get_pixel(cx.min(width - 1), cy.min(height - 1));
    if marker == *base {
        marker = Rgb([255 - r, 255 - g, 255 - b]);
    }

    for y in cy.saturating_sub(half)..(cy + half).min(height) {
        for x in cx.saturating_sub(half)..(cx + half).min(width) {
            image.put_pixel(x, y, marker);
        }
    }
}

fn encode_png(image: &RgbImage) -> Result<ImagePayload> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .context("dryrun PNG encode failed")?;
    Ok(ImagePayload::new(bytes.into_inner(), "image/png"))
}
