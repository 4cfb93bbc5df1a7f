use serde_json::{Map, Value};
use tracing::debug;

use crate::codec::GeneratedImage;
use crate::error::GenerationError;

type Probe = fn(&Map<String, Value>) -> Option<&str>;

/// Known places an image can hide in a chat message, in the order they are tried.
const PROBES: &[(&str, Probe)] = &[
    ("content", content_part_image),
    ("images", images_field_image),
];

const IMAGE_PART_TYPES: &[&str] = &["output_image", "image_url"];

/// Finds and decodes the first image in a chat-completions response.
///
/// `Ok(None)` means the response carried no image at all; a matched data URI
/// that fails to decode is an error.
pub fn extract_image(payload: &Value) -> Result<Option<GeneratedImage>, GenerationError> {
    let Some(message) = first_message(payload) else {
        debug!("response has no choices[0].message");
        return Ok(None);
    };
    for (shape, probe) in PROBES {
        if let Some(uri) = probe(message) {
            debug!(shape, "image located in response");
            return GeneratedImage::from_data_uri(uri).map(Some);
        }
    }
    Ok(None)
}

pub fn finish_reason(payload: &Value) -> Option<String> {
    first_choice(payload)
        .and_then(|choice| choice.get("finish_reason"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn first_choice(payload: &Value) -> Option<&Map<String, Value>> {
    payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(Value::as_object)
}

fn first_message(payload: &Value) -> Option<&Map<String, Value>> {
    first_choice(payload)
        .and_then(|choice| choice.get("message"))
        .and_then(Value::as_object)
}

fn content_part_image(message: &Map<String, Value>) -> Option<&str> {
    message
        .get("content")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(Value::as_object)
        .filter(|part| {
            part.get("type")
                .and_then(Value::as_str)
                .is_some_and(|kind| IMAGE_PART_TYPES.contains(&kind))
        })
        .filter_map(|part| part.get("image_url").and_then(image_url_string))
        .find(|url| is_image_data_uri(url))
}

fn images_field_image(message: &Map<String, Value>) -> Option<&str> {
    message
        .get("images")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|image| {
            image
                .get("image_url")
                .and_then(|row| row.get("url"))
                .and_then(Value::as_str)
        })
        .find(|url| is_image_data_uri(url))
}

/// `image_url` is usually `{ "url": ... }`, occasionally a bare string.
fn image_url_string(value: &Value) -> Option<&str> {
    value
        .as_str()
        .or_else(|| value.get("url").and_then(Value::as_str))
}

fn is_image_data_uri(url: &str) -> bool {
    url.starts_with("data:image")
}
