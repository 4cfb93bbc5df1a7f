pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod extract;
pub mod input;
pub mod session;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDateTime, SecondsFormat, Utc};
use guinness_contracts::catalog::Persona;
use guinness_contracts::events::{EventWriter, SessionEvent};
use guinness_contracts::runs::receipts::{build_receipt, write_receipt, GenerationRecord};
use guinness_contracts::runs::summary::{write_summary, SessionSummary};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

pub use client::{
    chat_completion_payload, CancelToken, DryrunBackend, ImageBackend, OpenRouterBackend,
};
pub use codec::GeneratedImage;
pub use config::{Credential, CredentialLoader, EngineConfig, SETUP_INSTRUCTIONS};
pub use error::GenerationError;
pub use input::{GenerationRequest, SelfieInputs, UploadedImage};
pub use session::{CurrentResult, HistoryEntry, Session, SessionHistory};

pub const NOT_FOUND_TROUBLESHOOTING: &str = "\
Troubleshooting:
1. Check your OpenRouter API key is valid
2. Verify you have credits/quota on OpenRouter
3. Visit https://openrouter.ai/activity to see API logs
4. Try a smaller image (< 5MB)";

pub const ERROR_TROUBLESHOOTING: &str = "\
Troubleshooting:
1. Check your OpenRouter API key is valid
2. Verify you have credits/quota on OpenRouter
3. Visit https://openrouter.ai/activity to see API logs
4. Check image size (should be < 5MB)";

/// Result of a generate action that reached the model.
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    Generated {
        image: Arc<GeneratedImage>,
        latency: Duration,
    },
    /// The model answered but no image could be found in the response.
    NoImage { finish_reason: Option<String> },
}

#[derive(Debug, Clone)]
pub struct SavedArtifact {
    pub image_path: PathBuf,
    pub receipt_path: PathBuf,
}

/// Owns one interactive session: backend, current image, history and event log.
pub struct SelfieGenerator {
    backend: Box<dyn ImageBackend>,
    session: Session,
    events: EventWriter,
    out_dir: PathBuf,
    failures: u64,
    saved: u64,
}

impl SelfieGenerator {
    /// Resolves the API key before the backend exists, so a missing key never reaches the network.
    pub fn start<F>(
        loader: &CredentialLoader,
        config: &EngineConfig,
        out_dir: &Path,
        events_path: &Path,
        make_backend: F,
    ) -> Result<Self, GenerationError>
    where
        F: FnOnce(Credential, &EngineConfig) -> Box<dyn ImageBackend>,
    {
        let credential = loader.load()?;
        info!(source = %credential.source(), "API key loaded");
        let backend = make_backend(credential, config);
        Ok(Self::with_backend(backend, config, out_dir, events_path))
    }

    pub fn with_backend(
        backend: Box<dyn ImageBackend>,
        config: &EngineConfig,
        out_dir: &Path,
        events_path: &Path,
    ) -> Self {
        let session = Session::new(config.history_limit);
        let events = EventWriter::new(events_path, session.id());
        let generator = Self {
            backend,
            session,
            events,
            out_dir: out_dir.to_path_buf(),
            failures: 0,
            saved: 0,
        };
        generator.emit(SessionEvent::SessionStarted {
            backend: generator.backend.name().to_string(),
            model: generator.backend.model().to_string(),
            endpoint: generator.backend.endpoint(),
            out_dir: generator.out_dir.display().to_string(),
            history_limit: config.history_limit,
        });
        generator
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    /// Runs one blocking generation. Session state only changes when an image comes back.
    pub fn generate(
        &mut self,
        inputs: &SelfieInputs,
        cancel: &CancelToken,
    ) -> Result<GenerationOutcome, GenerationError> {
        let request = inputs.build_request()?;
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        self.emit(SessionEvent::GenerationStarted {
            persona: request.persona(),
            style: request.style(),
            source_sha256: request.source_sha256(),
        });

        let started = Instant::now();
        let payload = match self.backend.complete(&request, cancel) {
            Ok(payload) => payload,
            Err(err) => return Err(self.fail(&request, err)),
        };
        let latency = started.elapsed();
        let image = match extract::extract_image(&payload) {
            Ok(image) => image,
            Err(err) => return Err(self.fail(&request, err)),
        };
        let finish_reason = extract::finish_reason(&payload);

        let Some(image) = image else {
            warn!(finish_reason = ?finish_reason, "no image found in response");
            self.emit(SessionEvent::GenerationNoImage {
                persona: request.persona(),
                style: request.style(),
                finish_reason: finish_reason.clone(),
                latency_s: latency.as_secs_f64(),
            });
            return Ok(GenerationOutcome::NoImage { finish_reason });
        };

        let image = Arc::new(image);
        let generated_at = Local::now();
        let record = GenerationRecord {
            session_id: self.session.id().to_string(),
            generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, false),
            persona: request.persona(),
            style: request.style(),
            prompt: request.prompt().to_string(),
            model: self.backend.model().to_string(),
            backend: self.backend.name().to_string(),
            source_sha256: request.source_sha256(),
            width: image.width(),
            height: image.height(),
            finish_reason,
        };
        let provider_request = map_object(json!({
            "endpoint": self.backend.endpoint(),
            "model": self.backend.model(),
            "modalities": ["image"],
            "source_sha256": request.source_sha256(),
            "prompt_chars": request.prompt().chars().count(),
        }));
        let provider_response = map_object(json!({
            "id": payload.get("id").cloned().unwrap_or(Value::Null),
            "model": payload.get("model").cloned().unwrap_or(Value::Null),
            "usage": payload.get("usage").cloned().unwrap_or(Value::Null),
        }));
        self.session.accept(CurrentResult {
            image: Arc::clone(&image),
            generated_at,
            record,
            provider_request,
            provider_response,
        });
        info!(
            width = image.width(),
            height = image.height(),
            latency_ms = latency.as_millis() as u64,
            "selfie generated"
        );
        self.emit(SessionEvent::GenerationSucceeded {
            persona: request.persona(),
            style: request.style(),
            width: image.width(),
            height: image.height(),
            latency_s: latency.as_secs_f64(),
            history_len: self.session.history().len(),
        });
        Ok(GenerationOutcome::Generated { image, latency })
    }

    /// Writes the current image as a PNG download plus its receipt.
    pub fn save_current(&mut self, dir: Option<&Path>) -> Result<SavedArtifact> {
        let Some(current) = self.session.current() else {
            bail!("No generated selfie yet. Upload a photo and generate one first.");
        };
        let dir = dir.unwrap_or(&self.out_dir).to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let image_path = dir.join(download_file_name(
            current.record.persona,
            current.generated_at.naive_local(),
        ));
        let png = current.image.to_png_bytes()?;
        fs::write(&image_path, png)
            .with_context(|| format!("failed to write {}", image_path.display()))?;

        let receipt_path = dir.join(format!(
            "receipt-{}.json",
            current.generated_at.format("%Y%m%d_%H%M%S")
        ));
        let receipt = build_receipt(
            &current.record,
            &current.provider_request,
            &current.provider_response,
            &image_path,
            &receipt_path,
        );
        write_receipt(&receipt_path, &receipt)?;

        self.saved += 1;
        self.emit(SessionEvent::ImageSaved {
            image_path: image_path.display().to_string(),
            receipt_path: receipt_path.display().to_string(),
        });
        Ok(SavedArtifact {
            image_path,
            receipt_path,
        })
    }

    /// Writes `summary.json` for the session.
    pub fn finish(&mut self) -> Result<PathBuf> {
        let summary = SessionSummary {
            session_id: self.session.id().to_string(),
            started_at: self
                .session
                .started_at()
                .to_rfc3339_opts(SecondsFormat::Micros, false),
            finished_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            total_generations: self.session.history().total_recorded(),
            total_failures: self.failures,
            total_saved: self.saved,
        };
        let mut extra = Map::new();
        extra.insert(
            "backend".to_string(),
            Value::String(self.backend.name().to_string()),
        );
        extra.insert(
            "model".to_string(),
            Value::String(self.backend.model().to_string()),
        );
        let path = self.out_dir.join("summary.json");
        write_summary(&path, &summary, Some(&extra))?;
        self.emit(SessionEvent::SessionFinished {
            total_generations: summary.total_generations,
            total_failures: summary.total_failures,
            summary_path: path.display().to_string(),
        });
        Ok(path)
    }

    fn fail(&mut self, request: &GenerationRequest, err: GenerationError) -> GenerationError {
        self.failures += 1;
        warn!(error = %err, "generation failed");
        self.emit(SessionEvent::GenerationFailed {
            persona: request.persona(),
            style: request.style(),
            error: err.to_string(),
        });
        err
    }

    /// Event log problems are reported but never fail a generation.
    fn emit(&self, event: SessionEvent) {
        if let Err(err) = self.events.emit(&event) {
            warn!(event = event.event_type(), error = %err, "failed to append event");
        }
    }
}

/// `guinness_selfie_{persona}_{YYYYMMDD_HHMMSS}.png`
///
/// Callers pass the persona and timestamp of the generation being saved, not the
/// current selection or the time of the save.
pub fn download_file_name(persona: Persona, at: NaiveDateTime) -> String {
    format!(
        "guinness_selfie_{}_{}.png",
        persona.slug(),
        at.format("%Y%m%d_%H%M%S")
    )
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
