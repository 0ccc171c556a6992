use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of deployment environments analyzed for every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Hq,
    Kamino,
    Lightbridge,
    Ardent,
}

/// Field a search query correlates on for a given environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationKey {
    SessionId,
    WorkstationId,
}

impl CorrelationKey {
    pub fn field_name(&self) -> &'static str {
        match self {
            CorrelationKey::SessionId => "sessionId",
            CorrelationKey::WorkstationId => "workstationId",
        }
    }
}

impl Environment {
    /// Display order; also the order environments are analyzed in.
    pub const ALL: [Environment; 4] = [
        Environment::Hq,
        Environment::Kamino,
        Environment::Lightbridge,
        Environment::Ardent,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Environment::Hq => "hq",
            Environment::Kamino => "kamino",
            Environment::Lightbridge => "lightbridge",
            Environment::Ardent => "ardent",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Environment::Hq => "HQ",
            Environment::Kamino => "Kamino",
            Environment::Lightbridge => "Lightbridge",
            Environment::Ardent => "Ardent",
        }
    }

    pub fn correlation_key(&self) -> CorrelationKey {
        match self {
            Environment::Hq | Environment::Kamino => CorrelationKey::SessionId,
            Environment::Lightbridge | Environment::Ardent => CorrelationKey::WorkstationId,
        }
    }

    /// Ardent is searched with a relative lookback instead of the session window.
    pub fn uses_relative_window(&self) -> bool {
        matches!(self, Environment::Ardent)
    }

    /// Resolve either the internal key or the display name, case-insensitively.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|env| env.key().eq_ignore_ascii_case(key) || env.display_name().eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Self::from_key(s).ok_or_else(|| anyhow::anyhow!("Unknown environment: {}", s))
    }
}
