use std::fs;
use std::path::Path;

use guinness_contracts::catalog::{Persona, Style};
use guinness_contracts::prompt::compose_prompt;
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};

use crate::codec::{encode_data_uri, encode_png, PNG_MIME};
use crate::error::GenerationError;

/// A photo handed over by the user, still in its original encoding.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    bytes: Vec<u8>,
    file_name: String,
    mime_type: &'static str,
}

impl UploadedImage {
    pub fn from_path(path: &Path) -> Result<Self, GenerationError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_for_name(&file_name)
            .ok_or_else(|| GenerationError::UnsupportedUpload(file_name.clone()))?;
        let bytes = fs::read(path)?;
        Ok(Self {
            bytes,
            file_name,
            mime_type,
        })
    }

    pub fn from_bytes(bytes: Vec<u8>, file_name: &str) -> Result<Self, GenerationError> {
        let mime_type = mime_for_name(file_name)
            .ok_or_else(|| GenerationError::UnsupportedUpload(file_name.to_string()))?;
        Ok(Self {
            bytes,
            file_name: file_name.to_string(),
            mime_type,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// MIME type declared by the file extension.
    pub fn mime_type(&self) -> &str {
        self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn decode(&self) -> Result<DynamicImage, GenerationError> {
        Ok(image::load_from_memory(&self.bytes)?)
    }

    /// Caption shown under the uploaded photo.
    pub fn describe(&self) -> Result<String, GenerationError> {
        let image = self.decode()?;
        let format = image::guess_format(&self.bytes)
            .map(format_label)
            .unwrap_or_else(|_| "unknown".to_string());
        Ok(format!(
            "Size: {}x{} pixels | Format: {format}",
            image.width(),
            image.height()
        ))
    }
}

/// Current selections of the surface plus the uploaded photo, if any.
#[derive(Debug, Clone, Default)]
pub struct SelfieInputs {
    pub persona: Persona,
    pub style: Style,
    upload: Option<UploadedImage>,
}

impl SelfieInputs {
    pub fn new(persona: Persona, style: Style) -> Self {
        Self {
            persona,
            style,
            upload: None,
        }
    }

    pub fn set_upload(&mut self, upload: UploadedImage) {
        self.upload = Some(upload);
    }

    pub fn clear_upload(&mut self) {
        self.upload = None;
    }

    pub fn upload(&self) -> Option<&UploadedImage> {
        self.upload.as_ref()
    }

    /// The generate action is only offered once a photo is present.
    pub fn can_generate(&self) -> bool {
        self.upload.is_some()
    }

    pub fn build_request(&self) -> Result<GenerationRequest, GenerationError> {
        let upload = self.upload.as_ref().ok_or(GenerationError::MissingInput)?;
        let source_png = encode_png(&upload.decode()?)?;
        Ok(GenerationRequest {
            source_png,
            persona: self.persona,
            style: self.style,
            prompt: compose_prompt(self.persona, self.style),
        })
    }
}

/// Immutable input for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    source_png: Vec<u8>,
    persona: Persona,
    style: Style,
    prompt: String,
}

impl GenerationRequest {
    pub fn source_png(&self) -> &[u8] {
        &self.source_png
    }

    pub fn source_data_uri(&self) -> String {
        encode_data_uri(&self.source_png, PNG_MIME)
    }

    pub fn source_sha256(&self) -> String {
        hex::encode(Sha256::digest(&self.source_png))
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

fn mime_for_name(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

fn format_label(format: ImageFormat) -> String {
    match format {
        ImageFormat::Png => "PNG".to_string(),
        ImageFormat::Jpeg => "JPEG".to_string(),
        other => format!("{other:?}").to_ascii_uppercase(),
    }
}
