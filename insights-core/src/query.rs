use chrono::{DateTime, Utc};
use tracing::debug;

use crate::context::EnvironmentContext;
use crate::environment::{CorrelationKey, Environment};
use crate::time_filter::TimeFilter;

/// Row cap appended to every search query.
pub const RESULT_LIMIT: usize = 10000;

/// Timestamp layout the search service expects in `earliest`/`latest`.
pub const SEARCH_TIME_FORMAT: &str = "%m/%d/%Y:%H:%M:%S";

pub fn format_search_time(time: DateTime<Utc>) -> String {
    time.format(SEARCH_TIME_FORMAT).to_string()
}

/// Escape a value for use inside a double-quoted query term.
pub fn quote_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Query bounded by an absolute window.
pub fn absolute_query(index: &str, key: CorrelationKey, value: &str, start: &str, end: &str) -> String {
    format!(
        "search index=\"{}\" {}=\"{}\" earliest=\"{}\" latest=\"{}\" | fields * | extract | sort timestamp, seqId | head {}",
        index,
        key.field_name(),
        quote_value(value),
        start,
        end,
        RESULT_LIMIT
    )
}

/// Query bounded only by a relative lookback from now.
pub fn relative_query(index: &str, key: CorrelationKey, value: &str, earliest: TimeFilter) -> String {
    format!(
        "search index=\"{}\" {}=\"{}\" earliest=\"{}\" | fields * | extract | sort timestamp, seqId | head {}",
        index,
        key.field_name(),
        quote_value(value),
        earliest,
        RESULT_LIMIT
    )
}

/// Produces the final per-environment search query for the active time filter.
pub struct QueryBuilder;

impl QueryBuilder {
    /// With no active filter, or the default one, the cached base query is
    /// returned untouched. Otherwise the window is rebuilt as `filter .. now`.
    pub fn build(
        context: &EnvironmentContext,
        environment: Environment,
        active_filter: Option<TimeFilter>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let base = context.base_query(environment)?;

        let filter = match active_filter {
            Some(filter) if !filter.is_default() => filter,
            _ => return Some(base.to_string()),
        };

        let index = context.index_name(environment)?;
        let key = environment.correlation_key();
        let value = context.correlation_value(key)?;

        let query = if environment.uses_relative_window() {
            relative_query(index, key, value, filter)
        } else {
            let start = format_search_time(filter.to_absolute_time(now));
            let end = format_search_time(now);
            absolute_query(index, key, value, &start, &end)
        };
        debug!("Rebuilt {} query for filter {}", environment, filter);
        Some(query)
    }

    /// Same as [`QueryBuilder::build`], addressed by internal key. Unknown keys yield `None`.
    pub fn build_for_key(
        context: &EnvironmentContext,
        environment_key: &str,
        active_filter: Option<TimeFilter>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let environment = Environment::from_key(environment_key)?;
        Self::build(context, environment, active_filter, now)
    }
}
