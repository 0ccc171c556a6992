use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::scheduler::SchedulerKind;
use crate::time_filter::{self, TimeFilter};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub sampling: SamplingConfig,
    pub environments: EnvironmentConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub search_path: String,
    pub summarize_path: String,
    /// No timeout is applied unless set.
    pub request_timeout_secs: Option<u64>,
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            search_path: "/api/search".to_string(),
            summarize_path: "/api/ai/summarize".to_string(),
            request_timeout_secs: None,
            api_token: None,
        }
    }
}

impl ServiceConfig {
    pub fn search_url(&self) -> String {
        join_url(&self.base_url, &self.search_path)
    }

    pub fn summarize_url(&self) -> String {
        join_url(&self.base_url, &self.summarize_path)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Bounds for the representative log subset sent to the summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub max_selected: usize,
    pub head: usize,
    pub tail: usize,
    pub context_window: usize,
    pub dedup_prefix_chars: usize,
    pub message_preview_chars: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_selected: 25,
            head: 5,
            tail: 5,
            context_window: 5,
            dedup_prefix_chars: 100,
            message_preview_chars: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// A captured request URL containing this marker means the session ran on staging.
    pub staging_marker: String,
    /// Relative lookback used for Ardent base queries.
    pub ardent_lookback: TimeFilter,
    /// Widens the captured session window on both sides.
    pub session_padding_minutes: u32,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            staging_marker: "staging".to_string(),
            ardent_lookback: TimeFilter::new(1, time_filter::TimeUnit::Hours)
                .unwrap_or(TimeFilter::DEFAULT),
            session_padding_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Active filter at startup; `None` means the default window.
    pub time_filter: Option<TimeFilter>,
    pub scheduler: SchedulerKind,
    pub concurrency_limit: usize,
    /// Pause between per-environment export writes.
    pub export_stagger_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            time_filter: None,
            scheduler: SchedulerKind::Sequential,
            concurrency_limit: 2,
            export_stagger_ms: 500,
        }
    }
}

impl AnalysisConfig {
    pub fn export_stagger(&self) -> Duration {
        Duration::from_millis(self.export_stagger_ms)
    }
}

impl Config {
    /// Load from the first config file found, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::get_config_path() {
            Some(path) => Self::load_from_path(&path)?,
            None => {
                debug!("No config file found, using defaults");
                Config::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        info!("Loading config from {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = env::var("INSIGHTS_BASE_URL") {
            self.service.base_url = base_url;
        }

        if let Ok(token) = env::var("INSIGHTS_API_TOKEN") {
            if !token.trim().is_empty() {
                self.service.api_token = Some(token);
            }
        }

        if let Ok(text) = env::var("INSIGHTS_TIME_FILTER") {
            match time_filter::parse(&text) {
                Some(filter) => self.analysis.time_filter = Some(filter),
                None => warn!("Ignoring unparsable INSIGHTS_TIME_FILTER '{}'", text),
            }
        }

        if let Ok(scheduler) = env::var("INSIGHTS_SCHEDULER") {
            match scheduler.parse::<SchedulerKind>() {
                Ok(kind) => self.analysis.scheduler = kind,
                Err(e) => warn!("Ignoring INSIGHTS_SCHEDULER: {}", e),
            }
        }
    }

    fn get_config_path() -> Option<PathBuf> {
        // Check for project-level config first
        if let Ok(current_dir) = env::current_dir() {
            let project_config = current_dir.join(".insights.toml");
            if project_config.exists() {
                return Some(project_config);
            }
        }

        // Check for user-level config
        if let Some(home_dir) = dirs::home_dir() {
            let user_config = home_dir.join(".config").join("insights").join("config.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }
}
