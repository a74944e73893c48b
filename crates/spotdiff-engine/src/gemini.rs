use std::env;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use spotdiff_contracts::cards::{DiffLocation, Difficulty};
use tracing::debug;

use crate::backend::{
    GenerationBackend, GenerationError, GenerationErrorKind, ImagePayload, ImageRequest, Scenario,
};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const SCENARIO_CONTENTS: &str = "Generate 1 simple scenario.";

/// Backend speaking the Gemini `generateContent` REST API.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    api_base: String,
    text_model: String,
    image_model: String,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(text_model: impl Into<String>, image_model: impl Into<String>) -> Self {
        Self {
            api_base: env::var("GEMINI_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            text_model: text_model.into(),
            image_model: image_model.into(),
            http: HttpClient::new(),
        }
    }

    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    pub fn image_model(&self) -> &str {
        &self.image_model
    }

    fn api_key() -> Result<String> {
        ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"]
            .into_iter()
            .find_map(non_empty_env)
            .ok_or_else(|| {
                GenerationError::new(
                    GenerationErrorKind::MissingCredentials,
                    "Gemini API key not found (set GEMINI_API_KEY)",
                )
                .into()
            })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    async fn post(&self, model: &str, payload: &Value) -> Result<Value> {
        let api_key = Self::api_key()?;
        let endpoint = self.endpoint_for_model(model);
        debug!(%endpoint, "gemini request");
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", api_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                GenerationError::new(
                    GenerationErrorKind::Transport,
                    format!("Gemini request failed ({endpoint}): {err}"),
                )
            })?;

        let status = response.status();
        let code = status.as_u16();
        let body = response
            .text()
            .await
            .context("Gemini response body read failed")?;
        if !status.is_success() {
            return Err(GenerationError::new(
                GenerationErrorKind::from_status(code, &body),
                format!("Gemini request failed ({code}): {}", truncate_text(&body, 512)),
            )
            .into());
        }
        serde_json::from_str(&body).map_err(|err| {
            GenerationError::malformed(format!("Gemini returned invalid JSON payload: {err}"))
                .into()
        })
    }
}

impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate_scenario(
        &self,
        difficulty: Difficulty,
        style_guidance: &str,
    ) -> Result<Scenario> {
        let payload = scenario_payload(difficulty, style_guidance);
        let response = self.post(&self.text_model, &payload).await?;
        let Some(text) = extract_text(&response) else {
            if let Some(reason) = block_reason(&response) {
                return Err(GenerationError::blocked(format!("Scenario blocked: {reason}")).into());
            }
            return Err(GenerationError::malformed("Failed to generate scenario").into());
        };
        Scenario::from_json_text(&text)
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<Option<ImagePayload>> {
        let payload = image_payload(&request);
        let response = self.post(&self.image_model, &payload).await?;
        extract_image(&response)
    }
}

pub fn scenario_payload(difficulty: Difficulty, style_guidance: &str) -> Value {
    let locations: Vec<&str> = DiffLocation::ALL
        .iter()
        .map(|location| location.as_str())
        .collect();
    let system_instruction = format!(
        "Design a spot-the-difference card. Difficulty: {difficulty}. Style: {style_guidance}.\n\
         JSON only, with fields originalPrompt (simple prompt for the base image), \
         editInstruction (one simple visual change), diffDescription (short description \
         of the change) and diffLocation (one of {}).",
        locations.join(", ")
    );
    json!({
        "systemInstruction": { "parts": [{ "text": system_instruction }] },
        "contents": [{ "role": "user", "parts": [{ "text": SCENARIO_CONTENTS }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "originalPrompt": { "type": "STRING" },
                    "editInstruction": { "type": "STRING" },
                    "diffDescription": { "type": "STRING" },
                    "diffLocation": { "type": "STRING", "enum": locations },
                },
                "required": ["originalPrompt", "editInstruction", "diffDescription", "diffLocation"],
            },
        },
    })
}

pub fn image_payload(request: &ImageRequest) -> Value {
    let mut parts = Vec::new();
    if let ImageRequest::Edit { reference, .. } = request {
        parts.push(json!({
            "inlineData": {
                "mimeType": reference.mime_type,
                "data": reference.to_base64(),
            }
        }));
    }
    parts.push(json!({ "text": request.text() }));
    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": { "responseModalities": ["IMAGE", "TEXT"] },
    })
}

fn first_candidate_parts(response: &Value) -> Vec<Value> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Concatenated text parts of the first candidate.
pub fn extract_text(response: &Value) -> Option<String> {
    let text: String = first_candidate_parts(response)
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        return None;
    }
    Some(text)
}

/// First inline image of the first candidate; `None` when there is none.
pub fn extract_image(response: &Value) -> Result<Option<ImagePayload>> {
    for part in first_candidate_parts(response) {
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64.decode(data.as_bytes()).map_err(|err| {
            GenerationError::malformed(format!("Gemini image base64 decode failed: {err}"))
        })?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        return Ok(Some(ImagePayload::new(bytes, mime_type)));
    }
    if let Some(reason) = block_reason(response) {
        debug!(%reason, "gemini returned no image");
    }
    Ok(None)
}

fn block_reason(response: &Value) -> Option<String> {
    response
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
