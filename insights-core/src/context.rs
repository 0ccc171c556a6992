use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::EnvironmentConfig;
use crate::environment::{CorrelationKey, Environment};
use crate::query::{absolute_query, format_search_time, relative_query};
use crate::session::SessionCapture;
use crate::time_filter::TimeFilter;

/// Everything needed to search each environment for one captured session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentContext {
    pub session_id: String,
    pub workstation_id: Option<String>,
    pub is_staging: bool,
    pub index_names: BTreeMap<Environment, String>,
    pub start_time: String,
    pub end_time: String,
    pub base_queries: BTreeMap<Environment, String>,
    pub resolved_at: DateTime<Utc>,
}

impl EnvironmentContext {
    pub fn base_query(&self, environment: Environment) -> Option<&str> {
        self.base_queries.get(&environment).map(String::as_str)
    }

    pub fn index_name(&self, environment: Environment) -> Option<&str> {
        self.index_names.get(&environment).map(String::as_str)
    }

    pub fn correlation_value(&self, key: CorrelationKey) -> Option<&str> {
        match key {
            CorrelationKey::SessionId => Some(self.session_id.as_str()),
            CorrelationKey::WorkstationId => self.workstation_id.as_deref(),
        }
    }

    fn matches(&self, session: &SessionCapture) -> bool {
        self.session_id == session.session_id && self.workstation_id.as_deref() == session.workstation()
    }
}

pub fn index_name(environment: Environment, is_staging: bool) -> String {
    let stage = if is_staging { "stage" } else { "prod" };
    format!("app_logs_{}_{}", stage, environment.key())
}

/// Derives and caches the [`EnvironmentContext`] for the current session.
///
/// Holds a single entry keyed by `(session id, workstation id)`; any change to
/// that pair rebuilds it. Every resolved context is also published on a watch
/// channel so collaborators can inspect the latest one.
pub struct EnvironmentContextResolver {
    config: EnvironmentConfig,
    cache: Mutex<Option<Arc<EnvironmentContext>>>,
    published: watch::Sender<Option<Arc<EnvironmentContext>>>,
}

impl EnvironmentContextResolver {
    pub fn new(config: EnvironmentConfig) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            config,
            cache: Mutex::new(None),
            published,
        }
    }

    pub fn resolve(&self, session: Option<&SessionCapture>, now: DateTime<Utc>) -> Option<Arc<EnvironmentContext>> {
        let session = match session {
            Some(session) if session.is_active() => session,
            _ => {
                warn!("Cannot resolve environment context without an active session");
                return None;
            }
        };

        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(cached) = cache.as_ref() {
            if cached.matches(session) {
                debug!("Environment context cache hit for session {}", session.session_id);
                return Some(cached.clone());
            }
            debug!("Session identity changed, rebuilding environment context");
        }

        let context = Arc::new(self.build(session, now));
        info!(
            "Resolved environment context for session {} ({})",
            context.session_id,
            if context.is_staging { "staging" } else { "production" }
        );
        *cache = Some(context.clone());
        self.published.send_replace(Some(context.clone()));
        Some(context)
    }

    /// Drop the cached context; the next resolve rebuilds it.
    pub fn clear(&self) {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *cache = None;
        debug!("Environment context cache cleared");
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<EnvironmentContext>>> {
        self.published.subscribe()
    }

    fn build(&self, session: &SessionCapture, now: DateTime<Utc>) -> EnvironmentContext {
        let marker = self.config.staging_marker.as_str();
        let is_staging = !marker.is_empty() && session.requests.iter().any(|r| r.url.contains(marker));

        let padding = Duration::try_minutes(i64::from(self.config.session_padding_minutes)).unwrap_or_else(Duration::zero);
        let (start, end) = match session.time_span() {
            Some((first, last)) => (
                first.checked_sub_signed(padding).unwrap_or(first),
                last.checked_add_signed(padding).unwrap_or(last),
            ),
            None => (TimeFilter::DEFAULT.to_absolute_time(now), now),
        };
        let start_time = format_search_time(start);
        let end_time = format_search_time(end);

        let mut index_names = BTreeMap::new();
        let mut base_queries = BTreeMap::new();
        for environment in Environment::ALL {
            let index = index_name(environment, is_staging);
            let key = environment.correlation_key();
            let value = match key {
                CorrelationKey::SessionId => Some(session.session_id.as_str()),
                CorrelationKey::WorkstationId => session.workstation(),
            };

            match value {
                Some(value) => {
                    let query = if environment.uses_relative_window() {
                        relative_query(&index, key, value, self.config.ardent_lookback)
                    } else {
                        absolute_query(&index, key, value, &start_time, &end_time)
                    };
                    base_queries.insert(environment, query);
                }
                None => debug!("No {} available, skipping base query for {}", key.field_name(), environment),
            }
            index_names.insert(environment, index);
        }

        EnvironmentContext {
            session_id: session.session_id.clone(),
            workstation_id: session.workstation().map(str::to_string),
            is_staging,
            index_names,
            start_time,
            end_time,
            base_queries,
            resolved_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 10, hour, minute, 0).unwrap()
    }

    fn session() -> SessionCapture {
        SessionCapture::new("sess-1")
            .with_workstation("ws-9")
            .with_request("https://app.example.com/login", Some(at(9, 0)))
            .with_request("https://app.example.com/cart", Some(at(9, 45)))
    }

    #[test]
    fn test_missing_session_resolves_to_none() {
        let resolver = EnvironmentContextResolver::new(EnvironmentConfig::default());
        assert!(resolver.resolve(None, at(10, 0)).is_none());
        assert!(resolver.resolve(Some(&SessionCapture::new("")), at(10, 0)).is_none());
    }

    #[test]
    fn test_production_context_and_base_queries() {
        let resolver = EnvironmentContextResolver::new(EnvironmentConfig::default());
        let ctx = resolver.resolve(Some(&session()), at(10, 0)).unwrap();

        assert!(!ctx.is_staging);
        assert_eq!(ctx.index_name(Environment::Kamino), Some("app_logs_prod_kamino"));
        assert_eq!(ctx.start_time, "02/10/2025:08:55:00");
        assert_eq!(ctx.end_time, "02/10/2025:09:50:00");

        let hq = ctx.base_query(Environment::Hq).unwrap();
        assert!(hq.contains("index=\"app_logs_prod_hq\" sessionId=\"sess-1\""));
        assert!(hq.contains("earliest=\"02/10/2025:08:55:00\" latest=\"02/10/2025:09:50:00\""));

        let lightbridge = ctx.base_query(Environment::Lightbridge).unwrap();
        assert!(lightbridge.contains("workstationId=\"ws-9\""));

        let ardent = ctx.base_query(Environment::Ardent).unwrap();
        assert!(ardent.contains("workstationId=\"ws-9\" earliest=\"-1h\" |"));
    }

    #[test]
    fn test_staging_detection() {
        let resolver = EnvironmentContextResolver::new(EnvironmentConfig::default());
        let session = session().with_request("https://staging.example.com/api", None);
        let ctx = resolver.resolve(Some(&session), at(10, 0)).unwrap();
        assert!(ctx.is_staging);
        assert_eq!(ctx.index_name(Environment::Ardent), Some("app_logs_stage_ardent"));
    }

    #[test]
    fn test_no_workstation_leaves_workstation_environments_without_queries() {
        let resolver = EnvironmentContextResolver::new(EnvironmentConfig::default());
        let ctx = resolver.resolve(Some(&SessionCapture::new("solo")), at(10, 0)).unwrap();
        assert!(ctx.base_query(Environment::Hq).is_some());
        assert!(ctx.base_query(Environment::Kamino).is_some());
        assert!(ctx.base_query(Environment::Lightbridge).is_none());
        assert!(ctx.base_query(Environment::Ardent).is_none());
        // Default window when nothing carried a capture time
        assert_eq!(ctx.start_time, "02/10/2025:02:00:00");
        assert_eq!(ctx.end_time, "02/10/2025:10:00:00");
    }

    #[test]
    fn test_cache_hit_and_invalidation() {
        let resolver = EnvironmentContextResolver::new(EnvironmentConfig::default());
        let first = resolver.resolve(Some(&session()), at(10, 0)).unwrap();
        let again = resolver.resolve(Some(&session()), at(11, 0)).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.resolved_at, at(10, 0));

        let other = session().with_workstation("ws-10");
        let rebuilt = resolver.resolve(Some(&other), at(11, 0)).unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.workstation_id.as_deref(), Some("ws-10"));

        resolver.clear();
        let after_clear = resolver.resolve(Some(&other), at(12, 0)).unwrap();
        assert!(!Arc::ptr_eq(&rebuilt, &after_clear));
        assert_eq!(after_clear.resolved_at, at(12, 0));
    }

    #[test]
    fn test_resolved_context_is_published() {
        let resolver = EnvironmentContextResolver::new(EnvironmentConfig::default());
        let receiver = resolver.subscribe();
        assert!(receiver.borrow().is_none());

        let ctx = resolver.resolve(Some(&session()), at(10, 0)).unwrap();
        let published = receiver.borrow().clone().unwrap();
        assert!(Arc::ptr_eq(&ctx, &published));
    }
}
