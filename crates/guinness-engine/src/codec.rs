use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat};

use crate::error::GenerationError;

pub const PNG_MIME: &str = "image/png";

/// A decoded image returned by the model.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    image: DynamicImage,
    mime_type: String,
}

impl GeneratedImage {
    pub fn new(image: DynamicImage, mime_type: impl Into<String>) -> Self {
        Self {
            image,
            mime_type: mime_type.into(),
        }
    }

    pub fn from_data_uri(uri: &str) -> Result<Self, GenerationError> {
        let (mime_type, bytes) = decode_data_uri(uri)?;
        let image = image::load_from_memory(&bytes)
            .map_err(|err| GenerationError::Decode(err.to_string()))?;
        Ok(Self { image, mime_type })
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// MIME type declared by the data URI the image arrived in.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn to_png_bytes(&self) -> Result<Vec<u8>, GenerationError> {
        encode_png(&self.image)
    }
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, GenerationError> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

pub fn encode_data_uri(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
}

/// Splits a `data:<mime>;base64,<payload>` URI at the first comma and decodes the payload.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), GenerationError> {
    let (meta, payload) = uri
        .trim()
        .split_once(',')
        .ok_or_else(|| GenerationError::Decode("data URI has no payload".to_string()))?;
    let mime_type = meta
        .strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(PNG_MIME)
        .to_string();
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .map_err(|err| GenerationError::Decode(format!("base64 payload: {err}")))?;
    Ok((mime_type, bytes))
}
