use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::environment::Environment;
use crate::error::{InsightsError, Result};
use crate::flatten::value_to_text;
use crate::result::{AggregatedAnalysisResult, EnvironmentLog};

const FILE_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Plain-text export of a set of environment-tagged records.
pub fn render_export(logs: &[EnvironmentLog], run: &AggregatedAnalysisResult, exported_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Export Date: {}\n", exported_at.to_rfc3339()));
    out.push_str(&format!("# Total Entries: {}\n", logs.len()));
    out.push_str(&format!("# Analysis Timestamp: {}\n", run.timestamp.to_rfc3339()));
    out.push_str(&format!("# Time Filter: {}\n", run.time_filter));

    for log in logs {
        out.push('\n');
        out.push_str(&render_entry(log));
    }
    out
}

/// Header line followed by every flattened field as `key=value`.
pub fn render_entry(log: &EnvironmentLog) -> String {
    let view = log.record.view();
    let mut out = format!(
        "[{}] {} [{}] {}\n",
        log.environment.display_name(),
        view.timestamp.as_deref().unwrap_or("N/A"),
        view.level.as_deref().unwrap_or("N/A").to_uppercase(),
        view.message.as_deref().unwrap_or("N/A"),
    );

    let fields: Vec<String> = log
        .record
        .flattened()
        .iter()
        .map(|(key, value)| format!("{}={}", key, value_to_text(value).unwrap_or_else(|| "null".to_string())))
        .collect();
    out.push_str(&fields.join(" | "));
    out.push('\n');
    out
}

pub fn export_file_name(environment: Option<Environment>, at: DateTime<Utc>) -> String {
    let stem = environment.map(|env| env.key()).unwrap_or("all_environments");
    format!("{}_logs_{}.log", stem, at.format(FILE_TIME_FORMAT))
}

fn logs_for(run: &AggregatedAnalysisResult, environment: Environment) -> Vec<EnvironmentLog> {
    run.all_logs
        .iter()
        .filter(|log| log.environment == environment)
        .cloned()
        .collect()
}

async fn write_export(path: PathBuf, content: String) -> Result<PathBuf> {
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| InsightsError::ExportError(format!("Failed to write {}: {}", path.display(), e)))?;
    info!("Exported logs to {}", path.display());
    Ok(path)
}

pub async fn export_environment(run: &AggregatedAnalysisResult, environment: Environment, dir: &Path) -> Result<PathBuf> {
    let logs = logs_for(run, environment);
    if logs.is_empty() {
        return Err(InsightsError::ExportError(format!("No logs to export for {}", environment)));
    }

    let now = Utc::now();
    let path = dir.join(export_file_name(Some(environment), now));
    write_export(path, render_export(&logs, run, now)).await
}

pub async fn export_combined(run: &AggregatedAnalysisResult, dir: &Path) -> Result<PathBuf> {
    if run.all_logs.is_empty() {
        return Err(InsightsError::ExportError("No logs to export".to_string()));
    }

    let now = Utc::now();
    let path = dir.join(export_file_name(None, now));
    write_export(path, render_export(&run.all_logs, run, now)).await
}

/// One file per environment that has logs, pausing `stagger` between writes.
pub async fn export_all_to_dir(run: &AggregatedAnalysisResult, dir: &Path, stagger: Duration) -> Result<Vec<PathBuf>> {
    let environments: Vec<Environment> = Environment::ALL
        .into_iter()
        .filter(|env| run.all_logs.iter().any(|log| log.environment == *env))
        .collect();
    if environments.is_empty() {
        return Err(InsightsError::ExportError("No logs to export".to_string()));
    }

    let mut written = Vec::with_capacity(environments.len());
    for (i, environment) in environments.into_iter().enumerate() {
        if i > 0 && !stagger.is_zero() {
            debug!("Waiting {:?} before next export", stagger);
            tokio::time::sleep(stagger).await;
        }
        written.push(export_environment(run, environment, dir).await?);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogRecord;
    use crate::time_filter::TimeFilter;
    use chrono::TimeZone;
    use serde_json::json;
    use uuid::Uuid;

    fn run_with_logs(logs: Vec<EnvironmentLog>) -> AggregatedAnalysisResult {
        let mut run = AggregatedAnalysisResult::from_results(
            Uuid::new_v4(),
            Vec::new(),
            TimeFilter::DEFAULT,
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        );
        run.all_logs = logs;
        run
    }

    fn entry(environment: Environment, value: serde_json::Value) -> EnvironmentLog {
        EnvironmentLog {
            environment,
            record: LogRecord::new(value),
        }
    }

    #[test]
    fn test_render_entry_header_and_fields() {
        let log = entry(
            Environment::Kamino,
            json!({
                "timestamp": "2025-03-01T11:59:00Z",
                "level": "warn",
                "message": "slow response",
                "http": {"status": 504, "tags": ["a", "b"]},
                "extra": null,
            }),
        );
        let text = render_entry(&log);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("[Kamino] 2025-03-01T11:59:00Z [WARN] slow response"));
        assert_eq!(
            lines.next(),
            Some(
                "timestamp=2025-03-01T11:59:00Z | level=warn | message=slow response | http.status=504 | http.tags.0=a | http.tags.1=b | extra=null"
            )
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_render_export_metadata_lines() {
        let run = run_with_logs(vec![entry(Environment::Hq, json!({"message": "x"}))]);
        let exported_at = Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap();
        let text = render_export(&run.all_logs, &run, exported_at);
        let header: Vec<&str> = text.lines().take(4).collect();
        assert_eq!(
            header,
            vec![
                "# Export Date: 2025-03-02T08:00:00+00:00",
                "# Total Entries: 1",
                "# Analysis Timestamp: 2025-03-01T12:00:00+00:00",
                "# Time Filter: -8h",
            ]
        );
        assert!(text.contains("[HQ] N/A [N/A] x"));
    }

    #[test]
    fn test_export_file_name() {
        let at = Utc.with_ymd_and_hms(2025, 3, 2, 8, 5, 9).unwrap();
        assert_eq!(export_file_name(Some(Environment::Ardent), at), "ardent_logs_20250302_080509.log");
        assert_eq!(export_file_name(None, at), "all_environments_logs_20250302_080509.log");
    }

    #[tokio::test]
    async fn test_export_environment_without_logs_fails() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_with_logs(vec![entry(Environment::Hq, json!({"message": "x"}))]);
        let err = export_environment(&run, Environment::Kamino, dir.path()).await.unwrap_err();
        assert!(matches!(err, InsightsError::ExportError(_)));
    }

    #[tokio::test]
    async fn test_export_all_writes_one_file_per_environment() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_with_logs(vec![
            entry(Environment::Hq, json!({"message": "one"})),
            entry(Environment::Lightbridge, json!({"message": "two"})),
            entry(Environment::Hq, json!({"message": "three"})),
        ]);

        let paths = export_all_to_dir(&run, dir.path(), Duration::from_millis(1)).await.unwrap();
        assert_eq!(paths.len(), 2);
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names[0].starts_with("hq_logs_"));
        assert!(names[1].starts_with("lightbridge_logs_"));

        let hq = std::fs::read_to_string(&paths[0]).unwrap();
        assert!(hq.contains("# Total Entries: 2"));
        assert!(hq.contains("message=three"));
        assert!(!hq.contains("message=two"));
    }

    #[tokio::test]
    async fn test_export_combined_and_empty_run() {
        let dir = tempfile::tempdir().unwrap();
        let empty = run_with_logs(Vec::new());
        assert!(export_combined(&empty, dir.path()).await.is_err());
        assert!(export_all_to_dir(&empty, dir.path(), Duration::ZERO).await.is_err());

        let run = run_with_logs(vec![entry(Environment::Ardent, json!({"message": "m"}))]);
        let path = export_combined(&run, dir.path()).await.unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("[Ardent]"));
    }
}
