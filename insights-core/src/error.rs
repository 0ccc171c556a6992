use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::environment::Environment;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("No active session data available")]
    NoSession,
    #[error("No authentication token available")]
    NoToken,
    #[error("No query available for {0}")]
    NoQuery(Environment),
    #[error("Service request failed with HTTP {status}: {body}")]
    ServiceError { status: u16, body: String },
    #[error("Malformed service response: {0}")]
    MalformedResponse(String),
    #[error("Export failed: {0}")]
    ExportError(String),
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Analysis of {0} was superseded by a newer run")]
    Superseded(Environment),
}

pub type Result<T> = std::result::Result<T, InsightsError>;

/// Actionable guidance shown instead of a raw error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guidance {
    pub title: String,
    pub message: String,
    pub action: String,
}

impl InsightsError {
    /// Structured guidance for the failures a user can fix themselves.
    pub fn guidance(&self) -> Option<Guidance> {
        match self {
            InsightsError::NoToken => Some(Guidance {
                title: "Authentication required".to_string(),
                message: "An API token is needed before logs can be searched and analyzed."
                    .to_string(),
                action: "Sign in again or pass --token / set INSIGHTS_API_TOKEN".to_string(),
            }),
            InsightsError::NoSession => Some(Guidance {
                title: "No session captured".to_string(),
                message: "Session data is required to locate logs for this session.".to_string(),
                action: "Capture a session first, then retry the analysis".to_string(),
            }),
            _ => None,
        }
    }

    /// Failures scoped to a single environment that are worth retrying there.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InsightsError::ServiceError { .. }
                | InsightsError::Request(_)
                | InsightsError::MalformedResponse(_)
                | InsightsError::Json(_)
        )
    }
}
