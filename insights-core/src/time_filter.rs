use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn suffix(&self) -> char {
        match self {
            TimeUnit::Minutes => 'm',
            TimeUnit::Hours => 'h',
            TimeUnit::Days => 'd',
        }
    }

    fn from_suffix(c: char) -> Option<Self> {
        match c {
            'm' => Some(TimeUnit::Minutes),
            'h' => Some(TimeUnit::Hours),
            'd' => Some(TimeUnit::Days),
            _ => None,
        }
    }
}

/// Relative offset rooted at "now", always rendered as `-<N><m|h|d>`.
///
/// Values can only be built through [`TimeFilter::new`], [`parse`] or the strict
/// `FromStr` impl, so every instance in circulation matches the canonical grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeFilter {
    amount: u32,
    unit: TimeUnit,
}

impl TimeFilter {
    pub const DEFAULT: TimeFilter = TimeFilter {
        amount: 8,
        unit: TimeUnit::Hours,
    };

    /// Returns `None` for a zero amount; the grammar only admits positive offsets.
    pub fn new(amount: u32, unit: TimeUnit) -> Option<Self> {
        (amount > 0).then_some(Self { amount, unit })
    }

    pub fn amount(&self) -> u32 {
        self.amount
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }

    pub fn duration(&self) -> Option<Duration> {
        let amount = i64::from(self.amount);
        match self.unit {
            TimeUnit::Minutes => Duration::try_minutes(amount),
            TimeUnit::Hours => Duration::try_hours(amount),
            TimeUnit::Days => Duration::try_days(amount),
        }
    }

    /// `now` shifted back by this offset, or `now` if the offset is out of range.
    pub fn to_absolute_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.duration()
            .and_then(|offset| now.checked_sub_signed(offset))
            .unwrap_or(now)
    }
}

impl Default for TimeFilter {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-{}{}", self.amount, self.unit.suffix())
    }
}

impl std::str::FromStr for TimeFilter {
    type Err = anyhow::Error;

    /// Strict parse of the canonical grammar. Free text goes through [`parse`].
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let invalid = || anyhow::anyhow!("Invalid time filter: {}", s);
        let body = s.strip_prefix('-').ok_or_else(invalid)?;
        let unit = body.chars().last().and_then(TimeUnit::from_suffix).ok_or_else(invalid)?;
        let digits = &body[..body.len() - 1];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let amount: u32 = digits.parse().map_err(|_| invalid())?;
        TimeFilter::new(amount, unit).ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeFilter {
    type Error = anyhow::Error;

    fn try_from(value: String) -> anyhow::Result<Self> {
        value.parse()
    }
}

impl From<TimeFilter> for String {
    fn from(filter: TimeFilter) -> Self {
        filter.to_string()
    }
}

// Priority order matters: the first matching pattern wins. A `None` unit means the
// unit letter is taken from the second capture group.
static PATTERNS: Lazy<Vec<(Regex, Option<TimeUnit>)>> = Lazy::new(|| {
    [
        (r"(?i)\b(?:last|past)\s+(\d+)\s*(?:minutes?|mins?)\b", Some(TimeUnit::Minutes)),
        (r"(?i)\b(?:last|past)\s+(\d+)\s*(?:hours?|hrs?)\b", Some(TimeUnit::Hours)),
        (r"(?i)\b(?:last|past)\s+(\d+)\s*days?\b", Some(TimeUnit::Days)),
        (r"(?i)\b(\d+)\s*(?:minutes?|mins?)\s+ago\b", Some(TimeUnit::Minutes)),
        (r"(?i)\b(\d+)\s*(?:hours?|hrs?)\s+ago\b", Some(TimeUnit::Hours)),
        (r"(?i)\b(\d+)\s*days?\s+ago\b", Some(TimeUnit::Days)),
        (r"(?i)\b(\d+)([mhd])\b", None),
    ]
    .into_iter()
    .filter_map(|(pattern, unit)| Regex::new(pattern).ok().map(|re| (re, unit)))
    .collect()
});

static FIRST_INTEGER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\d+").ok());

/// Amounts too large for `u32` saturate instead of being rejected.
fn parse_amount(digits: &str) -> Option<u32> {
    digits
        .parse::<u32>()
        .ok()
        .or_else(|| digits.chars().all(|c| c.is_ascii_digit()).then_some(u32::MAX))
}

/// Best-effort parse of a loose time expression such as "last 10 minutes",
/// "2 hours ago" or "3d". Returns `None` when the text holds no usable integer.
pub fn parse(text: &str) -> Option<TimeFilter> {
    for (re, unit) in PATTERNS.iter() {
        if let Some(caps) = re.captures(text) {
            let unit = match unit {
                Some(unit) => Some(*unit),
                None => caps
                    .get(2)
                    .and_then(|m| m.as_str().chars().next())
                    .and_then(|c| TimeUnit::from_suffix(c.to_ascii_lowercase())),
            };
            let amount = caps.get(1).and_then(|m| parse_amount(m.as_str()));
            if let (Some(amount), Some(unit)) = (amount, unit) {
                debug!("Time expression '{}' matched pattern {}", text, re.as_str());
                return TimeFilter::new(amount, unit);
            }
        }
    }

    // Fallback: first integer anywhere, unit guessed from keywords
    let amount = FIRST_INTEGER
        .as_ref()?
        .find(text)
        .and_then(|m| parse_amount(m.as_str()))?;
    let lower = text.to_lowercase();
    let unit = if lower.contains("hour") || lower.contains("hr") {
        TimeUnit::Hours
    } else if lower.contains("day") {
        TimeUnit::Days
    } else {
        TimeUnit::Minutes
    };
    debug!("Time expression '{}' resolved by integer fallback", text);
    TimeFilter::new(amount, unit)
}

/// Absolute start time for a canonical filter string. Anything that does not
/// match the canonical grammar yields `now` unchanged.
pub fn to_absolute_time(filter: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    match filter.parse::<TimeFilter>() {
        Ok(filter) => filter.to_absolute_time(now),
        Err(_) => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_equivalent_phrasings_share_canonical_form() {
        for text in ["last 10 minutes", "10 mins ago", "10m", "past 10 min"] {
            assert_eq!(parse(text).map(|f| f.to_string()), Some("-10m".to_string()), "{}", text);
        }
    }

    #[test]
    fn test_hours_and_days() {
        assert_eq!(parse("past 2 hours").unwrap().to_string(), "-2h");
        assert_eq!(parse("Last 24 Hours").unwrap().to_string(), "-24h");
        assert_eq!(parse("3 hrs ago").unwrap().to_string(), "-3h");
        assert_eq!(parse("2d").unwrap().to_string(), "-2d");
        assert_eq!(parse("last 7 days").unwrap().to_string(), "-7d");
        assert_eq!(parse("1 day ago").unwrap().to_string(), "-1d");
    }

    #[test]
    fn test_integer_fallback_infers_unit() {
        assert_eq!(parse("about 4 hr window").unwrap().to_string(), "-4h");
        assert_eq!(parse("within 3 business days").unwrap().to_string(), "-3d");
        assert_eq!(parse("15 please").unwrap().to_string(), "-15m");
    }

    #[test]
    fn test_first_match_wins_for_multiple_quantities() {
        assert_eq!(parse("last 5 minutes or 2 hours ago").unwrap().to_string(), "-5m");
    }

    #[test]
    fn test_unparsable_text() {
        assert_eq!(parse("sometime"), None);
        assert_eq!(parse(""), None);
        assert_eq!(parse("0 minutes ago"), None);
    }

    #[test]
    fn test_strict_grammar() {
        assert_eq!("-8h".parse::<TimeFilter>().unwrap(), TimeFilter::DEFAULT);
        assert!("8h".parse::<TimeFilter>().is_err());
        assert!("-h".parse::<TimeFilter>().is_err());
        assert!("-8w".parse::<TimeFilter>().is_err());
        assert!("-8H".parse::<TimeFilter>().is_err());
        assert!("-0m".parse::<TimeFilter>().is_err());
        assert!("-1.5h".parse::<TimeFilter>().is_err());
        assert!("banana".parse::<TimeFilter>().is_err());
    }

    #[test]
    fn test_to_absolute_time() {
        assert_eq!(to_absolute_time("-2h", now()), now() - Duration::hours(2));
        assert_eq!(to_absolute_time("-30m", now()), now() - Duration::minutes(30));
        assert_eq!(to_absolute_time("-1d", now()), now() - Duration::days(1));
    }

    #[test]
    fn test_malformed_filter_is_now() {
        assert_eq!(to_absolute_time("banana", now()), now());
        assert_eq!(to_absolute_time("-2x", now()), now());
    }

    #[test]
    fn test_out_of_range_offset_is_now() {
        let filter = TimeFilter::new(u32::MAX, TimeUnit::Days).unwrap();
        assert_eq!(filter.to_absolute_time(now()), now());
    }

    #[test]
    fn test_oversized_amount_saturates() {
        let filter = parse("last 99999999999 minutes").unwrap();
        assert_eq!(filter.amount(), u32::MAX);
        assert_eq!(filter.unit(), TimeUnit::Minutes);
        assert_eq!(filter.to_string().parse::<TimeFilter>().unwrap(), filter);

        let fallback = parse("around 123456789012 hours back").unwrap();
        assert_eq!(fallback.amount(), u32::MAX);
        assert_eq!(fallback.unit(), TimeUnit::Hours);
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let json = serde_json::to_string(&TimeFilter::DEFAULT).unwrap();
        assert_eq!(json, "\"-8h\"");
        let back: TimeFilter = serde_json::from_str("\"-45m\"").unwrap();
        assert_eq!(back.to_string(), "-45m");
        assert!(serde_json::from_str::<TimeFilter>("\"soon\"").is_err());
    }
}
