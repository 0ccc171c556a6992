use std::fmt::Write;

use crate::environment::Environment;
use crate::sampler::{LogSource, SelectedLog};

pub const DEFAULT_MESSAGE_PREVIEW_CHARS: usize = 300;

/// Renders sampled logs into the text block sent to the summarization service.
pub struct PromptComposer {
    message_preview_chars: usize,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_PREVIEW_CHARS)
    }
}

impl PromptComposer {
    pub fn new(message_preview_chars: usize) -> Self {
        Self { message_preview_chars }
    }

    /// Structured summary of the selection, grouped by why each log was picked.
    pub fn summarize(&self, environment: Environment, total_count: usize, selected: &[SelectedLog]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Environment: {}", environment.display_name());
        let _ = writeln!(out, "Total log entries: {}", total_count);
        let _ = writeln!(out, "Selected for analysis: {}", selected.len());

        for source in LogSource::DISPLAY_ORDER {
            let group: Vec<&SelectedLog> = selected.iter().filter(|log| log.source == source).collect();
            if group.is_empty() {
                continue;
            }

            let _ = writeln!(out);
            let _ = writeln!(out, "=== {} LOGS ({} entries) ===", source.label(), group.len());
            for (i, log) in group.iter().enumerate() {
                let view = log.record.view();
                let message = view.message.as_deref().unwrap_or("N/A");
                let _ = writeln!(out, "[{} #{}]", source.label(), i + 1);
                let _ = writeln!(out, "Timestamp: {}", view.timestamp.as_deref().unwrap_or("N/A"));
                let _ = writeln!(out, "Level: {}", view.level.as_deref().unwrap_or("N/A"));
                let _ = writeln!(out, "Message: {}", truncate_chars(message, self.message_preview_chars));
                let _ = writeln!(out, "---");
            }
        }

        if selected.len() < total_count {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "Note: {} additional log entries were omitted from this summary.",
                total_count - selected.len()
            );
        }

        out
    }

    /// Wrap a summary in the analysis instructions.
    pub fn compose_prompt(environment: Environment, summary: &str) -> String {
        let name = environment.display_name();
        format!(
            r#"Analyze the following logs from the {name} environment and provide insights.

{summary}
Please provide:
1. Errors or anomalies detected, with their likely cause
2. Performance patterns or issues (slow requests, retries, timeouts)
3. Key events and the order in which they happened
4. Recommendations for optimization or fixes
5. Insights specific to the {name} environment

Keep the analysis concise and actionable."#,
            name = name,
            summary = summary
        )
    }
}

/// Cut to `max_chars` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}
