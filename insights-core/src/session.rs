use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A network request seen while the session was being captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub url: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

/// The captured web session handed over by the capture layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCapture {
    pub session_id: String,
    #[serde(default)]
    pub workstation_id: Option<String>,
    #[serde(default)]
    pub requests: Vec<CapturedRequest>,
}

impl SessionCapture {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            workstation_id: None,
            requests: Vec::new(),
        }
    }

    pub fn with_workstation(mut self, workstation_id: impl Into<String>) -> Self {
        self.workstation_id = Some(workstation_id.into());
        self
    }

    pub fn with_request(mut self, url: impl Into<String>, started_at: Option<DateTime<Utc>>) -> Self {
        self.requests.push(CapturedRequest {
            url: url.into(),
            started_at,
        });
        self
    }

    /// A session is only usable with a non-blank identifier.
    pub fn is_active(&self) -> bool {
        !self.session_id.trim().is_empty()
    }

    pub fn workstation(&self) -> Option<&str> {
        self.workstation_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Earliest and latest capture times, if any request carried one.
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut times = self.requests.iter().filter_map(|r| r.started_at);
        let first = times.next()?;
        Some(times.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
    }
}
