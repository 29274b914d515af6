use crate::config::TimeAgoVocab;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use tracing::debug;

/// Resolve a site-provided date string to an absolute instant.
///
/// Sites mix absolute dates and relative "N units ago" phrasing, sometimes
/// within the same listing, so resolution is layered: "now" vocabulary, then
/// "yesterday", then `<integer> <unit>` against the relative-time vocabulary,
/// then an absolute calendar date via the month-name vocabulary. Anything
/// unrecognized falls back to `now` rather than failing the enclosing row.
pub fn resolve_date(
    raw: &str,
    months: &[String],
    ago: &TimeAgoVocab,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return now;
    }

    if matches_any(&text, &ago.now) {
        return now;
    }
    if matches_any(&text, &ago.yesterday) {
        return now - Duration::days(1);
    }

    if let Some(resolved) = resolve_relative(&text, ago, now) {
        return resolved;
    }
    if let Some(resolved) = resolve_absolute(&text, months) {
        return resolved;
    }

    debug!("unrecognized date string '{}', falling back to now", raw);
    now
}

fn matches_any(text: &str, vocabulary: &[String]) -> bool {
    vocabulary
        .iter()
        .any(|word| !word.is_empty() && text.contains(&word.to_lowercase()))
}

/// `<integer> <unit>` phrasing. Substring match on the unit, so the singular
/// vocabulary entry also covers the plural form.
fn resolve_relative(text: &str, ago: &TimeAgoVocab, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let number_re = Regex::new(r"(\d+)").ok()?;
    let amount: i64 = number_re.captures(text)?.get(1)?.as_str().parse().ok()?;

    // Longest units first so "month" wins over the "min" vocabulary entry.
    let buckets: [(&[String], fn(i64) -> Duration); 7] = [
        (&ago.years, |n| Duration::days(365 * n)),
        (&ago.months, |n| Duration::days(30 * n)),
        (&ago.weeks, |n| Duration::weeks(n)),
        (&ago.days, |n| Duration::days(n)),
        (&ago.hours, |n| Duration::hours(n)),
        (&ago.minutes, |n| Duration::minutes(n)),
        (&ago.seconds, |n| Duration::seconds(n)),
    ];

    for (vocabulary, to_duration) in buckets {
        if matches_any(text, vocabulary) {
            return Some(now - to_duration(amount));
        }
    }
    None
}

/// Absolute calendar date built from the month-name vocabulary plus the day
/// and year tokens found anywhere in the string.
fn resolve_absolute(text: &str, months: &[String]) -> Option<DateTime<Utc>> {
    let month_index = months
        .iter()
        .position(|name| !name.is_empty() && text.contains(&name.to_lowercase()))?;

    let number_re = Regex::new(r"\d+").ok()?;
    let mut day: Option<u32> = None;
    let mut year: Option<i32> = None;
    for token in number_re.find_iter(text) {
        let digits = token.as_str();
        if digits.len() == 4 && year.is_none() {
            year = digits.parse().ok();
        } else if digits.len() <= 2 && day.is_none() {
            day = digits.parse().ok();
        }
    }

    let date = NaiveDate::from_ymd_opt(year?, month_index as u32 + 1, day?)?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn vocab() -> TimeAgoVocab {
        TimeAgoVocab::default()
    }

    fn months() -> Vec<String> {
        crate::config::Selectors::default().months
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn just_now_resolves_to_now() {
        let now = fixed_now();
        assert_eq!(resolve_date("Just Now", &months(), &vocab(), now), now);
        assert_eq!(
            resolve_date("less than an hour ago", &months(), &vocab(), now),
            now
        );
    }

    #[test]
    fn yesterday_resolves_to_day_before() {
        let now = fixed_now();
        assert_eq!(
            resolve_date("Yesterday", &months(), &vocab(), now),
            now - Duration::days(1)
        );
    }

    #[test]
    fn relative_hours_subtract_from_now() {
        let now = fixed_now();
        assert_eq!(
            resolve_date("2 hours ago", &months(), &vocab(), now),
            now - Duration::hours(2)
        );
    }

    #[test]
    fn plural_form_matches_singular_vocabulary() {
        let now = fixed_now();
        assert_eq!(
            resolve_date("3 days ago", &months(), &vocab(), now),
            now - Duration::days(3)
        );
        assert_eq!(
            resolve_date("10 mins ago", &months(), &vocab(), now),
            now - Duration::minutes(10)
        );
    }

    #[test]
    fn absolute_date_uses_month_vocabulary() {
        let now = fixed_now();
        let expected = Utc.with_ymd_and_hms(2023, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(
            resolve_date("January 5, 2023", &months(), &vocab(), now),
            expected
        );
        assert_eq!(
            resolve_date("5 January 2023", &months(), &vocab(), now),
            expected
        );
    }

    #[test]
    fn unrecognized_string_falls_back_to_now() {
        let now = fixed_now();
        assert_eq!(resolve_date("soon(tm)", &months(), &vocab(), now), now);
        assert_eq!(resolve_date("", &months(), &vocab(), now), now);
    }
}
