//! Rate-limit hints from the moderation platform.
//!
//! The platform says "slow down" three ways: a `Retry-After` header, an
//! `x-ratelimit-reset` header (seconds until the window resets), or a
//! RATELIMIT error whose message ends in "try again in N minutes.".

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Delay announced by response headers, if any.
pub fn from_headers(headers: &HeaderMap) -> Option<Duration> {
    header_secs(headers, RETRY_AFTER.as_str()).or_else(|| header_secs(headers, "x-ratelimit-reset"))
}

fn header_secs(headers: &HeaderMap, name: &str) -> Option<Duration> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| Duration::from_secs(secs.ceil() as u64))
}

/// Parse "... again in 9 minutes." into a delay. Case-insensitive; the unit
/// may be singular or plural.
pub fn parse_message(message: &str) -> Option<Duration> {
    let lower = message.to_ascii_lowercase();
    let idx = lower.rfind("again in ")?;
    let mut words = lower[idx + "again in ".len()..].split_whitespace();

    let number: u64 = words.next()?.parse().ok()?;
    let unit = words.next()?.trim_end_matches('.');
    let unit = unit.strip_suffix('s').unwrap_or(unit);

    let per_unit = match unit {
        "millisecond" => return Some(Duration::from_millis(number)),
        "second" => 1,
        "minute" => 60,
        "hour" => 60 * 60,
        _ => return None,
    };
    Some(Duration::from_secs(number * per_unit))
}
