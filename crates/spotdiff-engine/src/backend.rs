use std::fmt;
use std::future::Future;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use spotdiff_contracts::cards::{DiffLocation, Difficulty};

/// Structured description of one differential pair, as returned by the
/// backend's text model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub original_prompt: String,
    pub edit_instruction: String,
    pub diff_description: String,
    pub diff_location: DiffLocation,
}

impl Scenario {
    /// Parses the backend's JSON text, rejecting blank fields.
    pub fn from_json_text(raw: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(raw.trim()).map_err(|err| {
            GenerationError::malformed(format!("Scenario JSON did not parse: {err}"))
        })?;
        for (field, value) in [
            ("originalPrompt", &scenario.original_prompt),
            ("editInstruction", &scenario.edit_instruction),
            ("diffDescription", &scenario.diff_description),
        ] {
            if value.trim().is_empty() {
                return Err(GenerationError::malformed(format!("Scenario field '{field}' is empty")).into());
            }
        }
        Ok(scenario)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// Self-contained `data:` URL suitable for a card face.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Reverses [`ImagePayload::to_data_url`].
pub fn decode_data_url(url: &str) -> Result<ImagePayload> {
    let rest = url
        .strip_prefix("data:")
        .context("image is not a data URL")?;
    let (mime_type, data) = rest
        .split_once(";base64,")
        .context("data URL is not base64 encoded")?;
    let bytes = BASE64
        .decode(data.as_bytes())
        .context("data URL base64 decode failed")?;
    Ok(ImagePayload::new(bytes, mime_type))
}

#[derive(Debug, Clone)]
pub enum ImageRequest {
    Prompt(String),
    Edit {
        reference: ImagePayload,
        instruction: String,
    },
}

impl ImageRequest {
    pub fn text(&self) -> &str {
        match self {
            ImageRequest::Prompt(prompt) => prompt,
            ImageRequest::Edit { instruction, .. } => instruction,
        }
    }
}

/// The generative service. Implementations carry no game state.
pub trait GenerationBackend: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn generate_scenario(
        &self,
        difficulty: Difficulty,
        style_guidance: &str,
    ) -> impl Future<Output = Result<Scenario>> + Send;

    /// `Ok(None)` means the call succeeded but carried no image (blocked).
    fn generate_image(
        &self,
        request: ImageRequest,
    ) -> impl Future<Output = Result<Option<ImagePayload>>> + Send;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GenerationErrorKind {
    RateLimited,
    QuotaExhausted,
    ServerOverloaded,
    Blocked,
    MalformedResponse,
    Rejected,
    Transport,
    MissingCredentials,
}

impl GenerationErrorKind {
    pub fn is_retry_worthy(&self) -> bool {
        matches!(
            self,
            GenerationErrorKind::RateLimited
                | GenerationErrorKind::QuotaExhausted
                | GenerationErrorKind::ServerOverloaded
        )
    }

    /// Classification of a non-success HTTP status.
    pub fn from_status(code: u16, body: &str) -> Self {
        match code {
            429 => {
                if body.to_ascii_lowercase().contains("quota") {
                    GenerationErrorKind::QuotaExhausted
                } else {
                    GenerationErrorKind::RateLimited
                }
            }
            500..=599 => GenerationErrorKind::ServerOverloaded,
            _ => GenerationErrorKind::Rejected,
        }
    }
}

#[derive(Debug)]
pub struct GenerationError {
    kind: GenerationErrorKind,
    message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::Blocked, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::MalformedResponse, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::RateLimited, message)
    }

    pub fn kind(&self) -> GenerationErrorKind {
        self.kind
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GenerationError {}

/// True when the error chain carries a rate-limit, quota, or overload signal.
pub fn is_retry_worthy(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(generation_err) = cause.downcast_ref::<GenerationError>() {
            return generation_err.kind().is_retry_worthy();
        }
        let text = cause.to_string().to_ascii_lowercase();
        text.contains("429") || text.contains("quota") || text.contains("503")
    })
}
