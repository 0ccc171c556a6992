use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use crate::config::SamplingConfig;
use crate::record::{LogRecord, RecordView};

const ERROR_LEVEL_KEYWORDS: &[&str] = &["error", "exception", "fatal"];
const ERROR_MESSAGE_KEYWORDS: &[&str] = &["error", "exception", "failed", "failure", "fatal", "critical"];
const CONTEXT_KEYWORDS: &[&str] = &["request", "response", "http", "api", "endpoint"];

/// Why a record was picked for the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    First,
    Last,
    Error,
    Context,
}

impl LogSource {
    /// Section order used when rendering a selection.
    pub const DISPLAY_ORDER: [LogSource; 4] = [LogSource::First, LogSource::Error, LogSource::Context, LogSource::Last];

    pub fn label(&self) -> &'static str {
        match self {
            LogSource::First => "FIRST",
            LogSource::Last => "LAST",
            LogSource::Error => "ERROR",
            LogSource::Context => "CONTEXT",
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label().to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedLog {
    pub source: LogSource,
    /// Position in the full result set.
    pub index: usize,
    pub record: LogRecord,
}

/// Picks a small, representative slice of an environment's logs: the start and
/// end of the stream, every error, and request/response lines just before each
/// error.
pub struct LogSampler {
    config: SamplingConfig,
}

impl Default for LogSampler {
    fn default() -> Self {
        Self::new(SamplingConfig::default())
    }
}

impl LogSampler {
    pub fn new(config: SamplingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    pub fn select(&self, logs: &[LogRecord]) -> Vec<SelectedLog> {
        let views: Vec<RecordView> = logs.iter().map(LogRecord::view).collect();
        let mut picks: Vec<(usize, LogSource)> = Vec::new();

        picks.extend((0..logs.len().min(self.config.head)).map(|i| (i, LogSource::First)));

        if logs.len() > self.config.head {
            let tail_start = logs.len().saturating_sub(self.config.tail);
            picks.extend((tail_start..logs.len()).map(|i| (i, LogSource::Last)));
        }

        let error_indices: Vec<usize> = views
            .iter()
            .enumerate()
            .filter(|(_, view)| is_error_like(view))
            .map(|(i, _)| i)
            .collect();
        picks.extend(error_indices.iter().map(|&i| (i, LogSource::Error)));

        for &error_index in &error_indices {
            let window_start = error_index.saturating_sub(self.config.context_window);
            for i in window_start..error_index {
                if is_request_context(&views[i]) {
                    picks.push((i, LogSource::Context));
                }
            }
        }

        let mut seen = HashSet::new();
        let selected: Vec<SelectedLog> = picks
            .into_iter()
            .filter(|&(i, _)| seen.insert(self.dedup_key(&views[i])))
            .take(self.config.max_selected)
            .map(|(index, source)| SelectedLog {
                source,
                index,
                record: logs[index].clone(),
            })
            .collect();

        debug!(
            "Selected {} of {} logs ({} error-like)",
            selected.len(),
            logs.len(),
            error_indices.len()
        );
        selected
    }

    fn dedup_key(&self, view: &RecordView) -> String {
        let timestamp = view.timestamp.as_deref().unwrap_or("");
        let message: String = view
            .message
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(self.config.dedup_prefix_chars)
            .collect();
        format!("{}{}", timestamp, message)
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let haystack = haystack.to_lowercase();
    needles.iter().any(|needle| haystack.contains(needle))
}

fn is_error_like(view: &RecordView) -> bool {
    let level_hit = view
        .level
        .as_deref()
        .map(|level| contains_any(level, ERROR_LEVEL_KEYWORDS))
        .unwrap_or(false);
    level_hit
        || view
            .message
            .as_deref()
            .map(|message| contains_any(message, ERROR_MESSAGE_KEYWORDS))
            .unwrap_or(false)
}

fn is_request_context(view: &RecordView) -> bool {
    view.message
        .as_deref()
        .map(|message| contains_any(message, CONTEXT_KEYWORDS))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log(i: usize, level: &str, message: &str) -> LogRecord {
        LogRecord::new(json!({
            "timestamp": format!("2025-01-01T00:00:{:02}Z", i),
            "level": level,
            "message": message,
        }))
    }

    fn info_logs(n: usize) -> Vec<LogRecord> {
        (0..n).map(|i| log(i, "INFO", &format!("step {} done", i))).collect()
    }

    fn sources(selected: &[SelectedLog]) -> Vec<(usize, LogSource)> {
        selected.iter().map(|s| (s.index, s.source)).collect()
    }

    #[test]
    fn test_small_input_is_all_first() {
        let logs = info_logs(3);
        let selected = LogSampler::default().select(&logs);
        assert_eq!(
            sources(&selected),
            vec![(0, LogSource::First), (1, LogSource::First), (2, LogSource::First)]
        );
        assert_eq!(selected[2].record, logs[2]);
    }

    #[test]
    fn test_empty_input() {
        assert!(LogSampler::default().select(&[]).is_empty());
    }

    #[test]
    fn test_overlapping_first_and_last_are_deduplicated() {
        let logs = info_logs(7);
        let selected = LogSampler::default().select(&logs);
        // Indices 0-4 first, 5-6 last (2-4 already taken)
        assert_eq!(selected.len(), 7);
        assert_eq!(selected[5].source, LogSource::Last);
        assert_eq!(selected[5].index, 5);
    }

    #[test]
    fn test_error_with_context_in_the_middle() {
        let mut logs = info_logs(20);
        logs[7] = log(7, "INFO", "Sending HTTP request to /checkout");
        logs[8] = log(8, "DEBUG", "cache warm");
        logs[9] = log(9, "INFO", "Received response 500 from payments endpoint");
        logs[10] = log(10, "ERROR", "Payment could not be completed");

        let selected = LogSampler::default().select(&logs);
        let picks = sources(&selected);

        let expected_first: Vec<_> = (0..5).map(|i| (i, LogSource::First)).collect();
        let expected_last: Vec<_> = (15..20).map(|i| (i, LogSource::Last)).collect();
        assert_eq!(&picks[..5], expected_first.as_slice());
        assert_eq!(&picks[5..10], expected_last.as_slice());
        assert_eq!(picks[10], (10, LogSource::Error));
        assert_eq!(&picks[11..], &[(7, LogSource::Context), (9, LogSource::Context)]);
        assert!(selected.len() <= 25);

        let keys: HashSet<String> = selected
            .iter()
            .map(|s| LogSampler::default().dedup_key(&s.record.view()))
            .collect();
        assert_eq!(keys.len(), selected.len());
    }

    #[test]
    fn test_error_detection_by_level_or_message() {
        let logs = vec![
            log(0, "INFO", "a"),
            log(1, "INFO", "b"),
            log(2, "INFO", "c"),
            log(3, "INFO", "d"),
            log(4, "INFO", "e"),
            log(5, "Fatal", "shutdown"),
            log(6, "WARN", "Upstream call FAILED"),
            log(7, "INFO", "Critical section entered"),
            log(8, "INFO", "all good"),
            log(9, "INFO", "x"),
            log(10, "INFO", "y"),
            log(11, "INFO", "z"),
            log(12, "INFO", "w"),
            log(13, "INFO", "v"),
        ];
        let selected = LogSampler::default().select(&logs);
        let errors: Vec<usize> = selected
            .iter()
            .filter(|s| s.source == LogSource::Error)
            .map(|s| s.index)
            .collect();
        assert_eq!(errors, vec![5, 6, 7]);
    }

    #[test]
    fn test_first_tag_wins_over_error() {
        let mut logs = info_logs(10);
        logs[1] = log(1, "ERROR", "boom");
        let selected = LogSampler::default().select(&logs);
        let boom = selected.iter().find(|s| s.index == 1).unwrap();
        assert_eq!(boom.source, LogSource::First);
        assert_eq!(selected.iter().filter(|s| s.index == 1).count(), 1);
    }

    #[test]
    fn test_context_window_clamped_at_start() {
        let mut logs = info_logs(12);
        logs[0] = log(0, "INFO", "api call started");
        logs[6] = log(6, "INFO", "GET /api/orders request");
        logs[7] = log(7, "ERROR", "exception thrown");
        let selected = LogSampler::default().select(&logs);
        let context: Vec<usize> = selected
            .iter()
            .filter(|s| s.source == LogSource::Context)
            .map(|s| s.index)
            .collect();
        assert_eq!(context, vec![6]);
    }

    #[test]
    fn test_cap_applies_after_dedup() {
        let logs: Vec<LogRecord> = (0..60).map(|i| log(i, "ERROR", &format!("failure {}", i))).collect();
        let selected = LogSampler::default().select(&logs);
        assert_eq!(selected.len(), 25);
        assert_eq!(selected[0].index, 0);
        assert_eq!(selected[5].source, LogSource::Last);
        assert_eq!(selected[10].source, LogSource::Error);
        assert_eq!(selected[10].index, 5);
    }

    #[test]
    fn test_records_without_timestamp_or_message_collapse() {
        let logs: Vec<LogRecord> = (0..4).map(|i| LogRecord::new(json!({"n": i}))).collect();
        let selected = LogSampler::default().select(&logs);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_custom_limits() {
        let config = SamplingConfig {
            max_selected: 4,
            head: 2,
            tail: 2,
            ..SamplingConfig::default()
        };
        let selected = LogSampler::new(config).select(&info_logs(10));
        assert_eq!(
            sources(&selected),
            vec![(0, LogSource::First), (1, LogSource::First), (8, LogSource::Last), (9, LogSource::Last)]
        );
    }

    #[test]
    fn test_selection_is_deterministic() {
        let mut logs = info_logs(30);
        logs[12] = log(12, "ERROR", "db timeout");
        let sampler = LogSampler::default();
        assert_eq!(sampler.select(&logs), sampler.select(&logs));
    }
}
