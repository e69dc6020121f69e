//! Human-readable duration parsing shared across the workspace: step
//! timeouts, suspend durations, and the `restart-workflow` annotation all
//! go through here rather than each crate rolling its own parser.

use std::time::Duration;

use jiff::Timestamp;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use snafu::{OptionExt, ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse {input:?} as a duration"))]
    ParseDuration {
        input: String,
        source: humantime::DurationError,
    },

    #[snafu(display("failed to parse {input:?} as an RFC3339 timestamp"))]
    ParseTimestamp {
        input: String,
        source: jiff::Error,
    },

    #[snafu(display(
        "{annotation} must be exactly one of an RFC3339 timestamp, a duration, or a recurring duration, found {input:?}"
    ))]
    AmbiguousRestartForm { annotation: String, input: String },
}

/// Parses a plain human duration such as `5m`, `1h`, or `2d`.
pub fn parse_duration(input: &str) -> Result<Duration, Error> {
    humantime::parse_duration(input).context(ParseDurationSnafu {
        input: input.to_owned(),
    })
}

/// Parses an RFC3339 timestamp such as `2026-07-28T09:00:00Z`.
pub fn parse_timestamp(input: &str) -> Result<Timestamp, Error> {
    input.parse::<Timestamp>().context(ParseTimestampSnafu {
        input: input.to_owned(),
    })
}

/// The three mutually exclusive forms the `app.oam.dev/restart-workflow`
/// annotation may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartSchedule {
    /// Restart once, at this absolute instant.
    At(jiff::Timestamp),
    /// Restart once, this far in the future from when the annotation is first observed.
    After(Duration),
    /// Restart every time this duration elapses, anchored to a reference instant.
    Every(Duration),
}

/// Parses the `restart-workflow` annotation value.
///
/// The source distinguishes "after" from "every" only by convention: a bare
/// duration with no other marker is ambiguous between one-shot and
/// recurring, so callers pass `recurring_marker` — the literal suffix `"!"`
/// denoting an explicit recurring form is recognized here; a duration
/// without it parses as [`RestartSchedule::Every`] (the documented
/// default for a bare duration), and an RFC3339 timestamp
/// always parses as [`RestartSchedule::At`].
pub fn parse_restart_schedule(input: &str) -> Result<RestartSchedule, Error> {
    if let Ok(timestamp) = parse_timestamp(input) {
        return Ok(RestartSchedule::At(timestamp));
    }

    if let Some(once) = input.strip_suffix('!') {
        let duration = parse_duration(once)?;
        return Ok(RestartSchedule::After(duration));
    }

    let duration = parse_duration(input)?;
    Ok(RestartSchedule::Every(duration))
}

/// Computes the next restart instant for a recurring schedule anchored at
/// `reference`, strictly after `now`.
pub fn next_recurring_restart(
    reference: Timestamp,
    period: Duration,
    now: Timestamp,
) -> Result<Timestamp, Error> {
    let period = jiff::Span::try_from(period).context(ParseTimestampSnafu {
        input: format!("{period:?}"),
    })?;
    let mut next = reference;
    // `reference` may be in the past; step forward until we're strictly ahead of `now`.
    while next <= now {
        next = next.checked_add(period).context(ParseTimestampSnafu {
            input: format!("{period:?}"),
        })?;
    }
    Ok(next)
}

/// Converts a [`Timestamp`] to the `metav1.Time` wire form used in status
/// subresources. Sub-nanosecond precision beyond what `chrono` represents is
/// never at stake here since both sides are nanosecond-resolution.
pub fn to_k8s_time(timestamp: Timestamp) -> Time {
    let seconds = timestamp.as_second();
    let nanos = timestamp.subsec_nanosecond().max(0) as u32;
    Time(chrono::DateTime::from_timestamp(seconds, nanos).unwrap_or_default())
}

/// Converts a `metav1.Time` read back off the API server into a [`Timestamp`].
pub fn from_k8s_time(time: &Time) -> Timestamp {
    let seconds = time.0.timestamp();
    let nanos = time.0.timestamp_subsec_nanos();
    Timestamp::new(seconds, i32::try_from(nanos).unwrap_or(0)).unwrap_or(Timestamp::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k8s_time_roundtrips_through_timestamp() {
        let original: Timestamp = "2026-01-01T00:12:00Z".parse().unwrap();
        let roundtripped = from_k8s_time(&to_k8s_time(original));
        assert_eq!(original, roundtripped);
    }

    #[test]
    fn parses_plain_duration() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn parses_rfc3339_timestamp() {
        let schedule = parse_restart_schedule("2026-01-01T00:00:00Z").unwrap();
        assert!(matches!(schedule, RestartSchedule::At(_)));
    }

    #[test]
    fn bare_duration_is_recurring() {
        let schedule = parse_restart_schedule("5m").unwrap();
        assert_eq!(schedule, RestartSchedule::Every(Duration::from_secs(300)));
    }

    #[test]
    fn bang_suffixed_duration_is_one_shot() {
        let schedule = parse_restart_schedule("5m!").unwrap();
        assert_eq!(schedule, RestartSchedule::After(Duration::from_secs(300)));
    }

    #[test]
    fn recurring_schedule_advances_past_now() {
        let reference: Timestamp = "2026-01-01T00:00:00Z".parse().unwrap();
        let now: Timestamp = "2026-01-01T00:12:00Z".parse().unwrap();
        let next = next_recurring_restart(reference, Duration::from_secs(300), now).unwrap();
        assert_eq!(next, "2026-01-01T00:15:00Z".parse::<Timestamp>().unwrap());
    }
}
