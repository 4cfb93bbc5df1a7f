use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use guinness_contracts::prompt::PHOTO_INTRO_TEXT;
use image::{DynamicImage, Rgba};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::codec::{encode_data_uri, encode_png, PNG_MIME};
use crate::config::{Credential, EngineConfig};
use crate::error::GenerationError;
use crate::input::GenerationRequest;

const APP_REFERER: &str = "https://github.com/guinness-selfie/guinness-selfie";
const APP_TITLE: &str = "Guinness Selfie Generator";
const ERROR_BODY_MAX_CHARS: usize = 512;

/// Shared flag a caller can flip to abandon an in-flight generation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Something that turns a [`GenerationRequest`] into a chat-completions shaped response.
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn endpoint(&self) -> String;
    fn complete(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<Value, GenerationError>;
}

/// Request body for one selfie: intro text, the photo as a data URI, then the prompt.
pub fn chat_completion_payload(model: &str, request: &GenerationRequest) -> Value {
    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                {
                    "type": "text",
                    "text": PHOTO_INTRO_TEXT,
                },
                {
                    "type": "image_url",
                    "image_url": { "url": request.source_data_uri() },
                },
                {
                    "type": "text",
                    "text": request.prompt(),
                },
            ],
        }],
        "modalities": ["image"],
        "n": 1,
    })
}

pub struct OpenRouterBackend {
    endpoint: String,
    model: String,
    credential: Credential,
    request_timeout: Option<Duration>,
    http: HttpClient,
}

impl OpenRouterBackend {
    pub fn new(credential: Credential, config: &EngineConfig) -> Self {
        Self {
            endpoint: config.chat_completions_endpoint(),
            model: config.model.clone(),
            credential,
            request_timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }
}

impl ImageBackend for OpenRouterBackend {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn complete(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<Value, GenerationError> {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        let payload = chat_completion_payload(&self.model, request);
        let mut builder = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.credential.api_key())
            .header("accept", "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header("HTTP-Referer", APP_REFERER)
            .header("X-Title", APP_TITLE);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        info!(endpoint = %self.endpoint, model = %self.model, "sending generation request");
        let response = builder
            .json(&payload)
            .send()
            .map_err(|source| GenerationError::Network {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        let parsed = response_json_or_error(&self.endpoint, response)?;
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        reject_error_payload(&parsed)?;
        Ok(parsed)
    }
}

/// Offline backend: returns the source photo with a prompt-tinted band, in the `images` shape.
#[derive(Debug, Clone, Default)]
pub struct DryrunBackend;

impl DryrunBackend {
    pub const MODEL: &'static str = "dryrun-composite";
}

impl ImageBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn model(&self) -> &str {
        Self::MODEL
    }

    fn endpoint(&self) -> String {
        "dryrun-native".to_string()
    }

    fn complete(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<Value, GenerationError> {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        let source = image::load_from_memory(request.source_png())?;
        let composite = write_dryrun_band(source, request.prompt());
        let uri = encode_data_uri(&encode_png(&composite)?, PNG_MIME);
        debug!(bytes = uri.len(), "dryrun composite ready");
        Ok(json!({
            "id": format!("dryrun-{}", &request.source_sha256()[..12]),
            "model": Self::MODEL,
            "choices": [{
                "finish_reason": "stop",
                "message": {
                    "role": "assistant",
                    "content": "Here is your legendary selfie!",
                    "images": [{
                        "type": "image_url",
                        "image_url": { "url": uri },
                    }],
                },
            }],
        }))
    }
}

fn write_dryrun_band(source: DynamicImage, prompt: &str) -> DynamicImage {
    let (r, g, b) = color_from_prompt(prompt);
    let mut canvas = source.to_rgba8();
    let height = canvas.height();
    let band_start = height - (height / 5).max(1).min(height);
    for (_, y, pixel) in canvas.enumerate_pixels_mut() {
        if y >= band_start {
            *pixel = Rgba([r, g, b, 255]);
        }
    }
    DynamicImage::ImageRgba8(canvas)
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}

fn response_json_or_error(
    endpoint: &str,
    response: HttpResponse,
) -> Result<Value, GenerationError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|source| GenerationError::Network {
        endpoint: endpoint.to_string(),
        source,
    })?;
    if !status.is_success() {
        return Err(GenerationError::Vendor {
            status: Some(code),
            message: truncate_text(&body, ERROR_BODY_MAX_CHARS),
        });
    }
    serde_json::from_str(&body).map_err(|err| GenerationError::Vendor {
        status: Some(code),
        message: format!("returned invalid JSON payload: {err}"),
    })
}

/// OpenRouter can answer 200 with an `error` object instead of choices.
fn reject_error_payload(payload: &Value) -> Result<(), GenerationError> {
    if payload.get("choices").is_some() {
        return Ok(());
    }
    let Some(error) = payload.get("error") else {
        return Ok(());
    };
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    let status = error
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok());
    Err(GenerationError::Vendor {
        status,
        message: truncate_text(&message, ERROR_BODY_MAX_CHARS),
    })
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
