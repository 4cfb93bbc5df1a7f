use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use guinness_contracts::catalog::{Persona, Style};
use guinness_contracts::runs::receipts::GenerationRecord;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::codec::GeneratedImage;

pub const HISTORY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Local>,
    pub persona: Persona,
    pub style: Style,
    pub image: Arc<GeneratedImage>,
}

impl HistoryEntry {
    pub fn caption(&self) -> String {
        format!("{} - {}", self.persona, self.style)
    }

    pub fn timestamp_label(&self) -> String {
        self.timestamp.format(HISTORY_TIMESTAMP_FORMAT).to_string()
    }
}

/// Append-only record of the session's successful generations.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    entries: VecDeque<HistoryEntry>,
    limit: Option<usize>,
    total_recorded: u64,
}

impl SessionHistory {
    /// `limit` bounds how many entries are retained; `None` keeps everything.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.filter(|value| *value > 0),
            total_recorded: 0,
        }
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        self.total_recorded += 1;
        if let Some(limit) = self.limit {
            while self.entries.len() > limit {
                self.entries.pop_front();
            }
        }
    }

    /// Up to `n` entries, most recent first.
    pub fn recent(&self, n: usize) -> Vec<&HistoryEntry> {
        self.entries.iter().rev().take(n).collect()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Successful generations so far, including evicted ones.
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

/// The image currently on display together with what produced it.
#[derive(Debug, Clone)]
pub struct CurrentResult {
    pub image: Arc<GeneratedImage>,
    pub generated_at: DateTime<Local>,
    pub record: GenerationRecord,
    pub provider_request: Map<String, Value>,
    pub provider_response: Map<String, Value>,
}

#[derive(Debug)]
pub struct Session {
    id: String,
    started_at: DateTime<Utc>,
    current: Option<CurrentResult>,
    history: SessionHistory,
}

impl Session {
    pub fn new(history_limit: Option<usize>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            current: None,
            history: SessionHistory::new(history_limit),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn current(&self) -> Option<&CurrentResult> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    /// Replaces the current image and appends it to history in one step.
    pub(crate) fn accept(&mut self, result: CurrentResult) {
        self.history.record(HistoryEntry {
            timestamp: result.generated_at,
            persona: result.record.persona,
            style: result.record.style,
            image: Arc::clone(&result.image),
        });
        self.current = Some(result);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Local};
    use guinness_contracts::catalog::{Persona, Style};

    use super::{HistoryEntry, SessionHistory};
    use crate::codec::tests::sample_image;
    use crate::codec::GeneratedImage;

    fn entry(minutes: i64, persona: Persona) -> HistoryEntry {
        HistoryEntry {
            timestamp: Local::now() + Duration::minutes(minutes),
            persona,
            style: Style::Casual,
            image: Arc::new(GeneratedImage::new(sample_image(1, 1, minutes as u8), "image/png")),
        }
    }

    #[test]
    fn recent_returns_newest_first() {
        let mut history = SessionHistory::new(None);
        for minute in 0..8 {
            history.record(entry(minute, Persona::Messi));
        }
        let recent = history.recent(6);
        assert_eq!(recent.len(), 6);
        let order: Vec<_> = recent.iter().map(|item| item.timestamp).collect();
        let mut sorted = order.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(order, sorted);
        assert_eq!(recent[0].timestamp, history.latest().unwrap().timestamp);
        assert_eq!(history.len(), 8);
    }

    #[test]
    fn recent_is_a_pure_read() {
        let mut history = SessionHistory::new(None);
        history.record(entry(0, Persona::Ronaldo));
        assert_eq!(history.recent(10).len(), 1);
        assert_eq!(history.recent(0).len(), 0);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn limit_evicts_oldest_but_keeps_total() {
        let mut history = SessionHistory::new(Some(3));
        for minute in 0..5 {
            history.record(entry(minute, Persona::Both));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.total_recorded(), 5);
        assert_eq!(history.limit(), Some(3));
        assert!(SessionHistory::new(Some(0)).limit().is_none());
    }

    #[test]
    fn caption_and_timestamp_label() {
        let item = entry(0, Persona::Messi);
        assert_eq!(item.caption(), "Messi - Casual");
        assert_eq!(item.timestamp_label().len(), "2026-01-01 00:00:00".len());
    }
}
