use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::flatten::{extract_field, flatten, value_to_text, FlatRecord};

/// Logical fields recovered from schema-less log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogField {
    Timestamp,
    Level,
    Message,
}

/// Candidate field names per logical field, matched against flattened keys.
///
/// Environments disagree on naming (`timestamp` vs `@timestamp` vs `_time`), so
/// lookups try every candidate and take the first key that matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCandidates {
    pub timestamp: Vec<String>,
    pub level: Vec<String>,
    pub message: Vec<String>,
}

impl Default for FieldCandidates {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|n| n.to_string()).collect();
        Self {
            timestamp: owned(&["timestamp", "@timestamp", "_time", "time", "ts", "datetime", "eventTime"]),
            level: owned(&["level", "severity", "loglevel", "log_level", "lvl"]),
            message: owned(&["message", "msg", "_raw", "raw", "text", "log"]),
        }
    }
}

impl FieldCandidates {
    pub fn for_field(&self, field: LogField) -> &[String] {
        match field {
            LogField::Timestamp => &self.timestamp,
            LogField::Level => &self.level,
            LogField::Message => &self.message,
        }
    }
}

static STANDARD_CANDIDATES: Lazy<FieldCandidates> = Lazy::new(FieldCandidates::default);

/// One log entry as returned by the search service. No schema is assumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogRecord(Value);

impl LogRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn flattened(&self) -> FlatRecord {
        flatten(&self.0)
    }

    /// Best-effort lookup of a logical field using the standard candidate table.
    pub fn field(&self, field: LogField) -> Option<String> {
        self.field_with(field, &STANDARD_CANDIDATES)
    }

    pub fn field_with(&self, field: LogField, candidates: &FieldCandidates) -> Option<String> {
        let flat = self.flattened();
        extract_field(&flat, candidates.for_field(field)).and_then(value_to_text)
    }

    /// Flatten once and pull every logical field.
    pub fn view(&self) -> RecordView {
        RecordView::from_flat(&self.flattened(), &STANDARD_CANDIDATES)
    }
}

impl From<Value> for LogRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// The logical fields of one record, extracted up front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordView {
    pub timestamp: Option<String>,
    pub level: Option<String>,
    pub message: Option<String>,
}

impl RecordView {
    pub fn from_flat(flat: &FlatRecord, candidates: &FieldCandidates) -> Self {
        let get = |field| extract_field(flat, candidates.for_field(field)).and_then(value_to_text);
        Self {
            timestamp: get(LogField::Timestamp),
            level: get(LogField::Level),
            message: get(LogField::Message),
        }
    }
}
