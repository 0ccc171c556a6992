use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::debug;

use crate::config::AnalysisConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerKind {
    #[default]
    Sequential,
    BoundedConcurrency,
}

impl std::str::FromStr for SchedulerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(SchedulerKind::Sequential),
            "bounded-concurrency" | "bounded" | "concurrent" => Ok(SchedulerKind::BoundedConcurrency),
            _ => Err(anyhow::anyhow!("Unknown scheduler: {}", s)),
        }
    }
}

/// How per-environment jobs are driven within a run.
///
/// Either way results come back in job order, so the display order stays fixed.
/// Jobs are plain futures and do nothing until the scheduler polls them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheduler {
    #[default]
    Sequential,
    BoundedConcurrency(usize),
}

impl Scheduler {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        match config.scheduler {
            SchedulerKind::Sequential => Scheduler::Sequential,
            SchedulerKind::BoundedConcurrency => Scheduler::BoundedConcurrency(config.concurrency_limit.max(1)),
        }
    }

    pub async fn run<F, T>(&self, jobs: Vec<F>) -> Vec<T>
    where
        F: Future<Output = T>,
    {
        match *self {
            Scheduler::Sequential => {
                debug!("Running {} jobs sequentially", jobs.len());
                let mut results = Vec::with_capacity(jobs.len());
                for job in jobs {
                    results.push(job.await);
                }
                results
            }
            Scheduler::BoundedConcurrency(limit) => {
                debug!("Running {} jobs with concurrency limit {}", jobs.len(), limit);
                stream::iter(jobs).buffered(limit.max(1)).collect().await
            }
        }
    }
}
