use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::{Persona, Style};

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// What the user asked for and what came back, minus the pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub session_id: String,
    pub generated_at: String,
    pub persona: Persona,
    pub style: Style,
    pub prompt: String,
    pub model: String,
    pub backend: String,
    pub source_sha256: String,
    pub width: u32,
    pub height: u32,
    pub finish_reason: Option<String>,
}

pub fn build_receipt(
    record: &GenerationRecord,
    provider_request: &Map<String, Value>,
    provider_response: &Map<String, Value>,
    image_path: &Path,
    receipt_path: &Path,
) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert(
        "generation".to_string(),
        sanitize_payload(&serde_json::to_value(record).unwrap_or(Value::Null)),
    );
    root.insert(
        "provider_request".to_string(),
        sanitize_payload(&Value::Object(provider_request.clone())),
    );
    root.insert(
        "provider_response".to_string(),
        sanitize_payload(&Value::Object(provider_response.clone())),
    );

    let mut artifacts = Map::new();
    artifacts.insert(
        "image_path".to_string(),
        Value::String(image_path.to_string_lossy().to_string()),
    );
    artifacts.insert(
        "receipt_path".to_string(),
        Value::String(receipt_path.to_string_lossy().to_string()),
    );
    root.insert("artifacts".to_string(), Value::Object(artifacts));
    Value::Object(root)
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

/// Drops inline image payloads so receipts stay small and readable.
fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(raw) => {
            if raw.starts_with("data:") {
                Value::String("<omitted>".to_string())
            } else {
                value.clone()
            }
        }
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                if matches!(
                    lowered.as_str(),
                    "b64_json" | "image_bytes" | "data" | "url"
                ) && row.is_string()
                {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{build_receipt, write_receipt, GenerationRecord, RECEIPT_SCHEMA_VERSION};
    use crate::catalog::{Persona, Style};

    fn record() -> GenerationRecord {
        GenerationRecord {
            session_id: "session-1".to_string(),
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            persona: Persona::Messi,
            style: Style::Cinematic,
            prompt: "hello".to_string(),
            model: "google/gemini-2.5-flash-image-preview".to_string(),
            backend: "openrouter".to_string(),
            source_sha256: "abc".to_string(),
            width: 8,
            height: 4,
            finish_reason: Some("stop".to_string()),
        }
    }

    #[test]
    fn receipt_builder_writes_expected_shape() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let receipt_path = temp.path().join("receipt-1.json");
        let image_path = temp.path().join("image.png");

        let mut provider_request = Map::new();
        provider_request.insert("endpoint".to_string(), json!("https://example/chat"));
        let mut provider_response = Map::new();
        provider_response.insert("usage".to_string(), json!({"total_tokens": 12}));

        let payload = build_receipt(
            &record(),
            &provider_request,
            &provider_response,
            &image_path,
            &receipt_path,
        );
        write_receipt(&receipt_path, &payload)?;

        let raw = std::fs::read_to_string(&receipt_path)?;
        let parsed: Value = serde_json::from_str(&raw)?;
        assert_eq!(parsed["schema_version"], json!(RECEIPT_SCHEMA_VERSION));
        assert_eq!(parsed["generation"]["persona"], json!("Messi"));
        assert_eq!(parsed["generation"]["style"], json!("Cinematic"));
        assert_eq!(parsed["provider_response"]["usage"]["total_tokens"], json!(12));
        assert_eq!(
            parsed["artifacts"]["image_path"],
            json!(image_path.to_string_lossy())
        );
        Ok(())
    }

    #[test]
    fn receipt_omits_inline_image_payloads() {
        let mut provider_request = Map::new();
        provider_request.insert(
            "payload".to_string(),
            json!({
                "messages": [{
                    "content": [
                        {"type": "text", "text": "I will provide my photo:"},
                        {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                    ]
                }]
            }),
        );
        let payload = build_receipt(
            &record(),
            &provider_request,
            &Map::new(),
            std::path::Path::new("a.png"),
            std::path::Path::new("r.json"),
        );
        let content = &payload["provider_request"]["payload"]["messages"][0]["content"];
        assert_eq!(content[0]["text"], json!("I will provide my photo:"));
        assert_eq!(content[1]["image_url"]["url"], json!("<omitted>"));
    }
}
