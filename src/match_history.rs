use std::collections::VecDeque;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::constants::{MATCH_HISTORY_CAPACITY, MATCH_HISTORY_RECENT};
use crate::types::MatchRecord;

#[derive(Clone, Debug, Serialize)]
pub struct HistoryResponse {
    #[serde(rename = "generatedAtIso")]
    pub generated_at_iso: String,
    pub records: Vec<MatchRecord>,
}

/// Process-wide log of finished matches, newest first.
#[derive(Debug, Default)]
pub struct MatchHistory {
    records: VecDeque<MatchRecord>,
}

impl MatchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: MatchRecord) {
        self.records.push_front(record);
        self.records.truncate(MATCH_HISTORY_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Up to `limit` most recent records; `None` means the broadcast default.
    pub fn recent(&self, requested_limit: Option<usize>) -> Vec<MatchRecord> {
        let limit = requested_limit
            .unwrap_or(MATCH_HISTORY_RECENT)
            .clamp(1, MATCH_HISTORY_CAPACITY);
        self.records.iter().take(limit).cloned().collect()
    }

    pub fn build_response(&self, requested_limit: Option<usize>) -> HistoryResponse {
        HistoryResponse {
            generated_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            records: self.recent(requested_limit),
        }
    }
}

pub fn parse_history_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
}
