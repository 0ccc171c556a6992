use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::environment::Environment;
use crate::record::LogRecord;
use crate::sampler::SelectedLog;
use crate::time_filter::TimeFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSuccess {
    pub environment: Environment,
    pub log_count: usize,
    pub selected_count: usize,
    pub query: String,
    pub analysis: String,
    /// The summarizer was unreachable and `analysis` carries the error instead.
    pub analysis_degraded: bool,
    pub raw_logs: Vec<LogRecord>,
    pub selected_logs: Vec<SelectedLog>,
    pub prompt: String,
    pub completed_at: DateTime<Utc>,
}

/// Outcome of one environment in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EnvironmentAnalysisResult {
    Failure {
        environment: Environment,
        error: String,
        retryable: bool,
    },
    Empty {
        environment: Environment,
        log_count: usize,
        message: String,
    },
    Success(Box<AnalysisSuccess>),
}

impl EnvironmentAnalysisResult {
    pub fn failure(environment: Environment, error: &crate::error::InsightsError) -> Self {
        EnvironmentAnalysisResult::Failure {
            environment,
            error: error.to_string(),
            retryable: error.is_retryable(),
        }
    }

    pub fn empty(environment: Environment, message: impl Into<String>) -> Self {
        EnvironmentAnalysisResult::Empty {
            environment,
            log_count: 0,
            message: message.into(),
        }
    }

    pub fn environment(&self) -> Environment {
        match self {
            EnvironmentAnalysisResult::Failure { environment, .. } => *environment,
            EnvironmentAnalysisResult::Empty { environment, .. } => *environment,
            EnvironmentAnalysisResult::Success(success) => success.environment,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, EnvironmentAnalysisResult::Failure { .. })
    }

    pub fn as_success(&self) -> Option<&AnalysisSuccess> {
        match self {
            EnvironmentAnalysisResult::Success(success) => Some(success),
            _ => None,
        }
    }

    /// One line of the cross-environment narrative.
    pub fn narrative_line(&self) -> String {
        match self {
            EnvironmentAnalysisResult::Failure { environment, error, .. } => {
                format!("{}: analysis failed - {}", environment, error)
            }
            EnvironmentAnalysisResult::Empty { environment, message, .. } => {
                format!("{}: {}", environment, message)
            }
            EnvironmentAnalysisResult::Success(success) => format!(
                "{}: {} logs analyzed, {} selected for review",
                success.environment, success.log_count, success.selected_count
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentLog {
    pub environment: Environment,
    pub record: LogRecord,
}

/// Everything produced by one run across all environments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedAnalysisResult {
    pub run_id: Uuid,
    pub results: Vec<EnvironmentAnalysisResult>,
    pub all_logs: Vec<EnvironmentLog>,
    pub narrative: String,
    pub timestamp: DateTime<Utc>,
    pub time_filter: TimeFilter,
}

impl AggregatedAnalysisResult {
    pub fn from_results(
        run_id: Uuid,
        results: Vec<EnvironmentAnalysisResult>,
        time_filter: TimeFilter,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let all_logs = results
            .iter()
            .filter_map(EnvironmentAnalysisResult::as_success)
            .flat_map(|success| {
                success.raw_logs.iter().map(move |record| EnvironmentLog {
                    environment: success.environment,
                    record: record.clone(),
                })
            })
            .collect();

        let narrative = results
            .iter()
            .map(EnvironmentAnalysisResult::narrative_line)
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            run_id,
            results,
            all_logs,
            narrative,
            timestamp,
            time_filter,
        }
    }

    pub fn result_for(&self, environment: Environment) -> Option<&EnvironmentAnalysisResult> {
        self.results.iter().find(|r| r.environment() == environment)
    }

    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InsightsError;
    use serde_json::json;

    fn success(environment: Environment, logs: usize) -> EnvironmentAnalysisResult {
        EnvironmentAnalysisResult::Success(Box::new(AnalysisSuccess {
            environment,
            log_count: logs,
            selected_count: logs.min(25),
            query: "search".to_string(),
            analysis: "fine".to_string(),
            analysis_degraded: false,
            raw_logs: (0..logs).map(|i| LogRecord::new(json!({"i": i}))).collect(),
            selected_logs: Vec::new(),
            prompt: String::new(),
            completed_at: Utc::now(),
        }))
    }

    #[test]
    fn test_aggregation_concatenates_success_logs_in_order() {
        let results = vec![
            success(Environment::Hq, 2),
            EnvironmentAnalysisResult::failure(
                Environment::Kamino,
                &InsightsError::ServiceError {
                    status: 500,
                    body: "down".to_string(),
                },
            ),
            EnvironmentAnalysisResult::empty(Environment::Lightbridge, "No logs found for this session"),
            success(Environment::Ardent, 1),
        ];
        let agg = AggregatedAnalysisResult::from_results(Uuid::new_v4(), results, TimeFilter::DEFAULT, Utc::now());

        assert_eq!(agg.all_logs.len(), 3);
        assert_eq!(agg.all_logs[0].environment, Environment::Hq);
        assert_eq!(agg.all_logs[2].environment, Environment::Ardent);
        assert_eq!(agg.failure_count(), 1);
        assert_eq!(
            agg.narrative,
            "HQ: 2 logs analyzed, 2 selected for review\n\
             Kamino: analysis failed - Service request failed with HTTP 500: down\n\
             Lightbridge: No logs found for this session\n\
             Ardent: 1 logs analyzed, 1 selected for review"
        );
        assert!(agg.result_for(Environment::Kamino).unwrap().is_failure());
    }

    #[test]
    fn test_result_serializes_with_status_tag() {
        let empty = EnvironmentAnalysisResult::empty(Environment::Hq, "nothing");
        let value = serde_json::to_value(&empty).unwrap();
        assert_eq!(value["status"], "empty");
        assert_eq!(value["environment"], "hq");
        assert_eq!(value["log_count"], 0);
    }
}
