use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{Persona, Style};

/// Everything a session records in `events.jsonl`, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        backend: String,
        model: String,
        endpoint: String,
        out_dir: String,
        history_limit: Option<usize>,
    },
    GenerationStarted {
        persona: Persona,
        style: Style,
        source_sha256: String,
    },
    GenerationSucceeded {
        persona: Persona,
        style: Style,
        width: u32,
        height: u32,
        latency_s: f64,
        history_len: usize,
    },
    GenerationNoImage {
        persona: Persona,
        style: Style,
        finish_reason: Option<String>,
        latency_s: f64,
    },
    GenerationFailed {
        persona: Persona,
        style: Style,
        error: String,
    },
    ImageSaved {
        image_path: String,
        receipt_path: String,
    },
    SessionFinished {
        total_generations: u64,
        total_failures: u64,
        summary_path: String,
    },
}

impl SessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. } => "session_started",
            SessionEvent::GenerationStarted { .. } => "generation_started",
            SessionEvent::GenerationSucceeded { .. } => "generation_succeeded",
            SessionEvent::GenerationNoImage { .. } => "generation_no_image",
            SessionEvent::GenerationFailed { .. } => "generation_failed",
            SessionEvent::ImageSaved { .. } => "image_saved",
            SessionEvent::SessionFinished { .. } => "session_finished",
        }
    }
}

/// Appends [`SessionEvent`]s as compact JSON lines stamped with `session_id` and `ts`.
///
/// Clones share one lock, so lines from different handles never interleave.
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: PathBuf,
    session_id: String,
    lock: Arc<Mutex<()>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn emit(&self, event: &SessionEvent) -> Result<()> {
        let Value::Object(mut line) = serde_json::to_value(event)? else {
            bail!("{} did not serialize to an object", event.event_type());
        };
        line.insert(
            "session_id".to_string(),
            Value::String(self.session_id.clone()),
        );
        line.insert("ts".to_string(), Value::String(now_utc_iso()));
        let mut encoded = serde_json::to_vec(&line)?;
        encoded.push(b'\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("event writer lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(&encoded)?;
        Ok(())
    }
}

pub(crate) fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::{EventWriter, SessionEvent};
    use crate::catalog::{Persona, Style};

    fn read_lines(path: &std::path::Path) -> anyhow::Result<Vec<Value>> {
        fs::read_to_string(path)?
            .lines()
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }

    #[test]
    fn events_carry_type_session_and_timestamp() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        writer.emit(&SessionEvent::GenerationStarted {
            persona: Persona::Messi,
            style: Style::Cinematic,
            source_sha256: "abc".to_string(),
        })?;

        let lines = read_lines(&path)?;
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["type"], json!("generation_started"));
        assert_eq!(line["session_id"], json!("session-123"));
        assert_eq!(line["persona"], json!("Messi"));
        assert_eq!(line["style"], json!("Cinematic"));
        DateTime::parse_from_rfc3339(line["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn lines_read_back_as_typed_events() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let event = SessionEvent::GenerationNoImage {
            persona: Persona::Both,
            style: Style::Casual,
            finish_reason: Some("content_filter".to_string()),
            latency_s: 1.5,
        };
        EventWriter::new(&path, "s").emit(&event)?;

        let mut line = read_lines(&path)?.remove(0);
        assert_eq!(line["type"], json!(event.event_type()));
        if let Value::Object(map) = &mut line {
            map.remove("session_id");
            map.remove("ts");
        }
        assert_eq!(serde_json::from_value::<SessionEvent>(line)?, event);
        Ok(())
    }

    #[test]
    fn clones_append_to_the_same_file_and_create_parents() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        writer.emit(&SessionEvent::ImageSaved {
            image_path: "a.png".to_string(),
            receipt_path: "a.json".to_string(),
        })?;
        writer.clone().emit(&SessionEvent::SessionFinished {
            total_generations: 1,
            total_failures: 0,
            summary_path: "summary.json".to_string(),
        })?;

        let types: Vec<Value> = read_lines(&path)?
            .into_iter()
            .map(|line| line["type"].clone())
            .collect();
        assert_eq!(types, vec![json!("image_saved"), json!("session_finished")]);
        Ok(())
    }
}
