//! Timestamp tokens and the newest-first ordering of logs.
//!
//! A token is a lexical `YYYY-MM-DD-HH-mm` string interpreted as UTC.
//! Out-of-range fields roll over (`2019-02-30` is March 2nd). Tokens with
//! fewer than five numeric components are ordered as if they were created
//! "now", which places bad data at the top of the feed. That degradation is
//! pinned by `test_unparseable_token_sorts_as_now`.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use std::cmp::Ordering;

/// Number of dash-separated numeric components a token must carry.
const TOKEN_COMPONENTS: usize = 5;

/// Parse a timestamp token into a UTC instant.
///
/// Returns `None` only for fewer than five numeric components (or a year
/// chrono cannot represent). Out-of-range fields roll over into the next
/// unit, so `2019-02-30-10-00` is 2019-03-02 10:00. Components past the
/// fifth are ignored.
pub fn parse_token(token: &str) -> Option<DateTime<Utc>> {
    let [year, month, day, hour, minute] = components(token)?;

    // Months are counted from January of `year`; a month of 0 is December of
    // the year before.
    let months = i64::from(year) * 12 + i64::from(month) - 1;
    let year = i32::try_from(months.div_euclid(12)).ok()?;
    let month = u32::try_from(months.rem_euclid(12)).ok()? + 1;

    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()?
        .checked_add_signed(Duration::days(i64::from(day) - 1))?
        .checked_add_signed(Duration::hours(i64::from(hour)))?
        .checked_add_signed(Duration::minutes(i64::from(minute)))
}

/// The five numeric components of a token, without range checks.
fn components(token: &str) -> Option<[u32; TOKEN_COMPONENTS]> {
    let mut parts = [0u32; TOKEN_COMPONENTS];
    let mut count = 0;

    for raw in token.trim().split('-').take(TOKEN_COMPONENTS) {
        parts[count] = raw.trim().parse().ok()?;
        count += 1;
    }

    (count == TOKEN_COMPONENTS).then_some(parts)
}

/// Format an instant as a timestamp token (minute precision).
pub fn format_token(at: DateTime<Utc>) -> String {
    format!(
        "{:04}-{:02}-{:02}-{:02}-{:02}",
        at.year(),
        at.month(),
        at.day(),
        at.hour(),
        at.minute()
    )
}

/// Whether `token` names a real calendar minute, with every field in range.
///
/// Stricter than [`parse_token`]: rolled-over tokens such as
/// `2019-02-30-10-00` order fine but are rejected on write.
pub fn is_valid_token(token: &str) -> bool {
    let Some([year, month, day, hour, minute]) = components(token) else {
        return false;
    };
    let Ok(year) = i32::try_from(year) else {
        return false;
    };
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .is_some()
}

/// Instant used for ordering: the parsed token, or `now` when unparseable.
pub fn instant_or(token: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    parse_token(token).unwrap_or(now)
}

/// Order two tokens newest first, resolving unparseable tokens to `now`.
///
/// Sorting with this comparator yields descending creation time. Callers that
/// sort many entries should capture `now` once so the order stays total.
pub fn compare_newest_first_at(a: &str, b: &str, now: DateTime<Utc>) -> Ordering {
    instant_or(b, now).cmp(&instant_or(a, now))
}

/// Order two tokens newest first using the current time as fallback.
pub fn compare_newest_first(a: &str, b: &str) -> Ordering {
    compare_newest_first_at(a, b, Utc::now())
}
