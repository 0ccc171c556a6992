use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::environment::Environment;
use crate::error::Result;
use crate::result::{AggregatedAnalysisResult, EnvironmentAnalysisResult};
use crate::time_filter::TimeFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    ResolvingContext,
    PerEnvironment,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentPhase {
    Pending,
    Querying,
    Empty,
    Sampling,
    Prompting,
    Summarizing,
    Done,
    Failed,
}

impl EnvironmentPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EnvironmentPhase::Empty | EnvironmentPhase::Done | EnvironmentPhase::Failed)
    }
}

/// Receives progress from the orchestrator. Every method defaults to a no-op.
pub trait AnalysisObserver: Send + Sync {
    fn on_run_phase(&self, _run_id: Uuid, _phase: RunPhase) {}

    fn on_environment_phase(&self, _environment: Environment, _phase: EnvironmentPhase) {}

    /// Called with the full prompt before the summarization call is made.
    fn on_prompt(&self, _environment: Environment, _prompt: &str) {}

    fn on_result(&self, _result: &EnvironmentAnalysisResult) {}

    fn on_run_complete(&self, _result: &AggregatedAnalysisResult) {}
}

pub struct NoopObserver;

impl AnalysisObserver for NoopObserver {}

/// Operations a front end may invoke.
#[async_trait]
pub trait InsightsPort: Send + Sync {
    async fn analyze_all(&self) -> Result<Arc<AggregatedAnalysisResult>>;

    async fn analyze_environment(&self, environment: Environment) -> Result<EnvironmentAnalysisResult>;

    /// Parse and apply a free-text time filter. Unparsable text leaves the
    /// active filter unchanged and returns `None`.
    fn apply_time_filter(&self, text: &str) -> Option<TimeFilter>;

    fn latest_result(&self, environment: Environment) -> Option<EnvironmentAnalysisResult>;

    fn latest_run(&self) -> Option<Arc<AggregatedAnalysisResult>>;

    async fn export_environment(&self, environment: Environment, dir: &Path) -> Result<PathBuf>;

    async fn export_combined(&self, dir: &Path) -> Result<PathBuf>;

    async fn export_all(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        let terminal: Vec<EnvironmentPhase> = [
            EnvironmentPhase::Pending,
            EnvironmentPhase::Querying,
            EnvironmentPhase::Empty,
            EnvironmentPhase::Sampling,
            EnvironmentPhase::Prompting,
            EnvironmentPhase::Summarizing,
            EnvironmentPhase::Done,
            EnvironmentPhase::Failed,
        ]
        .into_iter()
        .filter(EnvironmentPhase::is_terminal)
        .collect();
        assert_eq!(
            terminal,
            vec![EnvironmentPhase::Empty, EnvironmentPhase::Done, EnvironmentPhase::Failed]
        );
    }
}
