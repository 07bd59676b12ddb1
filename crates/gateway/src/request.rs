//! Routing of a completed HTTP request line.
//!
//! The only recognized input is a `LOG=<value>` query parameter. Every value
//! lands in the telemetry stream; values of the form `~yyyymmddhhmmss` are
//! additionally treated as a clock-set command.

use std::ops::Range;

use thiserror::Error;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};
use tracing::{debug, warn};

use crate::clock::{Clock, ClockSource};
use crate::decode::percent_decode;
use crate::logbook::LogWriter;

const LOG_MARKER: &[u8] = b"LOG=";
const TIME_COMMAND_PREFIX: char = '~';
const TIME_COMMAND_LEN: usize = 14;

#[derive(Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    /// No `LOG=` parameter; only the status page goes back.
    NoPayload,
    /// Value appended to the telemetry stream.
    Telemetry,
    /// Value appended and the clock corrected.
    ClockSet(OffsetDateTime),
    /// Value appended; the time command was rejected and the clock left
    /// alone.
    ClockRejected(TimeCommandError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeCommandError {
    #[error("time command needs 14 digits, got {0} characters")]
    TooShort(usize),
    #[error("{field} '{raw}' is not numeric")]
    NotNumeric { field: &'static str, raw: String },
    #[error("{field} {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: u16,
        min: u16,
        max: u16,
    },
    #[error("{year:04}-{month:02}-{day:02} is not a calendar date")]
    NoSuchDate { year: u16, month: u16, day: u16 },
}

/// Bytes following `LOG=` up to the next space (or the end of the line).
pub fn extract_log_value(line: &[u8]) -> Option<&[u8]> {
    let start = line
        .windows(LOG_MARKER.len())
        .position(|w| w == LOG_MARKER)?
        + LOG_MARKER.len();
    let rest = &line[start..];
    let end = rest.iter().position(|&b| b == b' ').unwrap_or(rest.len());
    Some(&rest[..end])
}

pub fn process(line: &[u8], clock: &mut Clock, logs: &LogWriter) -> RequestOutcome {
    let Some(raw) = extract_log_value(line) else {
        debug!("request without LOG= parameter");
        return RequestOutcome::NoPayload;
    };

    let decoded = percent_decode(raw);
    let payload = String::from_utf8_lossy(&decoded);

    // Written before any command handling so the telemetry stream keeps an
    // audit trail of every inbound value, commands included.
    logs.telemetry(clock.now(), &payload);

    let Some(digits) = payload.strip_prefix(TIME_COMMAND_PREFIX) else {
        return RequestOutcome::Telemetry;
    };

    match parse_time_command(digits) {
        Ok(instant) => {
            clock.apply_correction(instant, ClockSource::Command, logs);
            RequestOutcome::ClockSet(instant)
        }
        Err(e) => {
            warn!(command = %payload, "time command rejected: {e}");
            RequestOutcome::ClockRejected(e)
        }
    }
}

/// Parse `yyyymmddhhmmss` (UTC) by fixed offsets. Characters past the
/// fourteenth are ignored.
pub fn parse_time_command(digits: &str) -> Result<OffsetDateTime, TimeCommandError> {
    let digits = digits
        .as_bytes()
        .get(..TIME_COMMAND_LEN)
        .ok_or(TimeCommandError::TooShort(digits.len()))?;

    let year = field(digits, 0..4, "year", 2024, 2099)?;
    let month = field(digits, 4..6, "month", 1, 12)?;
    let day = field(digits, 6..8, "day", 1, 31)?;
    let hour = field(digits, 8..10, "hour", 0, 23)?;
    let minute = field(digits, 10..12, "minute", 0, 59)?;
    let second = field(digits, 12..14, "second", 0, 59)?;

    let no_such_date = || TimeCommandError::NoSuchDate { year, month, day };
    let date = Month::try_from(month as u8)
        .and_then(|m| Date::from_calendar_date(year as i32, m, day as u8))
        .map_err(|_| no_such_date())?;
    // Hour, minute and second are already range-checked, so this cannot
    // fail; the mapping only keeps the signature total.
    let time = Time::from_hms(hour as u8, minute as u8, second as u8).map_err(|_| {
        TimeCommandError::OutOfRange {
            field: "hour",
            value: hour,
            min: 0,
            max: 23,
        }
    })?;

    Ok(PrimitiveDateTime::new(date, time).assume_utc())
}

/// Decimal value of `digits[range]`. Works on bytes so multi-byte input can
/// never split a character.
fn field(
    digits: &[u8],
    range: Range<usize>,
    name: &'static str,
    min: u16,
    max: u16,
) -> Result<u16, TimeCommandError> {
    let raw = &digits[range];
    if !raw.iter().all(u8::is_ascii_digit) {
        return Err(TimeCommandError::NotNumeric {
            field: name,
            raw: String::from_utf8_lossy(raw).into_owned(),
        });
    }
    let value = raw
        .iter()
        .fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'));
    if !(min..=max).contains(&value) {
        return Err(TimeCommandError::OutOfRange {
            field: name,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::DEFAULT_INSTANT;
    use crate::logbook::{read_lines, Stream};
    use std::path::Path;
    use time::macros::datetime;

    fn writer(dir: &Path) -> LogWriter {
        LogWriter::new(dir, "log.txt", "data.txt")
    }

    /// Run `process` against a fresh clock; returns the outcome plus the
    /// telemetry and operational lines it produced.
    fn run(line: &str) -> (RequestOutcome, Clock, Vec<String>, Vec<String>) {
        let dir = tempfile::tempdir().unwrap();
        let logs = writer(dir.path());
        let mut clock = Clock::new();
        let outcome = process(line.as_bytes(), &mut clock, &logs);
        let telemetry = read_lines(logs.path(Stream::Telemetry));
        let operational = read_lines(logs.path(Stream::Operational));
        (outcome, clock, telemetry, operational)
    }

    fn payload(line: &str) -> &str {
        // Strip "YYYY/MM/DD,HH:MM:SS," (20 chars).
        &line[20..]
    }

    // -- extract_log_value -----------------------------------------------

    #[test]
    fn extract_value_up_to_space() {
        assert_eq!(
            extract_log_value(b"GET /?LOG=abc HTTP/1.1"),
            Some(&b"abc"[..])
        );
    }

    #[test]
    fn extract_value_to_end_of_line() {
        assert_eq!(extract_log_value(b"GET /?LOG=abc\r"), Some(&b"abc\r"[..]));
    }

    #[test]
    fn extract_value_keeps_other_parameters() {
        assert_eq!(
            extract_log_value(b"GET /x?a=1&LOG=t%3D5&b=2 HTTP/1.1"),
            Some(&b"t%3D5&b=2"[..])
        );
    }

    #[test]
    fn extract_empty_value() {
        assert_eq!(extract_log_value(b"GET /?LOG= HTTP/1.1"), Some(&b""[..]));
    }

    #[test]
    fn extract_missing_marker() {
        assert_eq!(extract_log_value(b"GET /status HTTP/1.1"), None);
        assert_eq!(extract_log_value(b"GET /?log=abc HTTP/1.1"), None);
        assert_eq!(extract_log_value(b""), None);
    }

    // -- process: telemetry ----------------------------------------------

    #[test]
    fn telemetry_value_is_decoded_and_logged() {
        let (outcome, clock, telemetry, operational) = run("GET /?LOG=123%20ABC HTTP/1.1");
        assert_eq!(outcome, RequestOutcome::Telemetry);
        assert_eq!(telemetry.len(), 1);
        assert_eq!(payload(&telemetry[0]), "123 ABC");
        assert!(operational.is_empty());
        assert_eq!(clock.source(), ClockSource::Default);
    }

    #[test]
    fn request_without_marker_logs_nothing() {
        let (outcome, _, telemetry, operational) = run("GET / HTTP/1.1\r");
        assert_eq!(outcome, RequestOutcome::NoPayload);
        assert!(telemetry.is_empty());
        assert!(operational.is_empty());
    }

    #[test]
    fn trailing_carriage_return_never_reaches_the_log() {
        let (_, _, telemetry, _) = run("GET /?LOG=abc\r");
        assert_eq!(payload(&telemetry[0]), "abc");
    }

    // -- process: time command -------------------------------------------

    #[test]
    fn time_command_sets_clock_and_logs_both_streams() {
        let (outcome, clock, telemetry, operational) =
            run("GET /?LOG=~20240112201101 HTTP/1.1");

        let expected = datetime!(2024-01-12 20:11:01 UTC);
        assert_eq!(outcome, RequestOutcome::ClockSet(expected));
        assert_eq!(clock.source(), ClockSource::Command);
        let drift = clock.epoch_seconds() - expected.unix_timestamp();
        assert!((0..=1).contains(&drift), "unexpected drift {drift}");

        assert_eq!(telemetry.len(), 1);
        assert_eq!(payload(&telemetry[0]), "~20240112201101");
        assert_eq!(operational.len(), 1);
        assert!(operational[0].contains("clock set from command"));
    }

    #[test]
    fn rejected_time_command_still_reaches_telemetry() {
        let (outcome, clock, telemetry, operational) =
            run("GET /?LOG=~20241312201101 HTTP/1.1");

        assert!(matches!(
            outcome,
            RequestOutcome::ClockRejected(TimeCommandError::OutOfRange { field: "month", .. })
        ));
        assert_eq!(clock.source(), ClockSource::Default);
        let drift = clock.epoch_seconds() - DEFAULT_INSTANT.unix_timestamp();
        assert!((0..=1).contains(&drift));
        assert_eq!(payload(&telemetry[0]), "~20241312201101");
        assert!(operational.is_empty());
    }

    #[test]
    fn encoded_time_command_is_recognized() {
        let (outcome, _, _, _) = run("GET /?LOG=%7E20250101000000 HTTP/1.1");
        assert_eq!(
            outcome,
            RequestOutcome::ClockSet(datetime!(2025-01-01 0:00 UTC))
        );
    }

    // -- parse_time_command ------------------------------------------------

    #[test]
    fn parse_valid_instants() {
        let cases = [
            ("20240101000000", datetime!(2024-01-01 0:00 UTC)),
            ("20240229235959", datetime!(2024-02-29 23:59:59 UTC)),
            ("20991231235959", datetime!(2099-12-31 23:59:59 UTC)),
            ("20250704120000", datetime!(2025-07-04 12:00 UTC)),
        ];
        for (digits, expected) in cases {
            assert_eq!(parse_time_command(digits), Ok(expected), "{digits}");
        }
    }

    #[test]
    fn parse_ignores_trailing_characters() {
        assert_eq!(
            parse_time_command("20240112201101xyz"),
            Ok(datetime!(2024-01-12 20:11:01 UTC))
        );
    }

    #[test]
    fn parse_rejects_each_field_bound() {
        let cases = [
            ("20231231235959", "year"),
            ("21000101000000", "year"),
            ("20240001000000", "month"),
            ("20241301000000", "month"),
            ("20240100000000", "day"),
            ("20240132000000", "day"),
            ("20240101240000", "hour"),
            ("20240101006000", "minute"),
            ("20240101000060", "second"),
        ];
        for (digits, expected_field) in cases {
            match parse_time_command(digits) {
                Err(TimeCommandError::OutOfRange { field, .. }) => {
                    assert_eq!(field, expected_field, "{digits}")
                }
                other => panic!("{digits}: expected {expected_field} out of range, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_rejects_short_input() {
        assert_eq!(
            parse_time_command("2024011220110"),
            Err(TimeCommandError::TooShort(13))
        );
        assert_eq!(parse_time_command(""), Err(TimeCommandError::TooShort(0)));
    }

    #[test]
    fn parse_rejects_non_digits() {
        assert!(matches!(
            parse_time_command("2024+112201101"),
            Err(TimeCommandError::NotNumeric { field: "month", .. })
        ));
        assert!(matches!(
            parse_time_command("20240112 01101"),
            Err(TimeCommandError::NotNumeric { field: "hour", .. })
        ));
    }

    #[test]
    fn parse_rejects_non_ascii_without_panicking() {
        assert!(matches!(
            parse_time_command("202\u{e9}0112201101"),
            Err(TimeCommandError::NotNumeric { field: "year", .. })
        ));
        // Fourteenth byte lands inside a multi-byte character.
        assert!(matches!(
            parse_time_command("2024011220110\u{e9}"),
            Err(TimeCommandError::NotNumeric { field: "second", .. })
        ));
    }

    #[test]
    fn parse_rejects_impossible_dates() {
        assert_eq!(
            parse_time_command("20240431000000"),
            Err(TimeCommandError::NoSuchDate {
                year: 2024,
                month: 4,
                day: 31
            })
        );
        assert!(matches!(
            parse_time_command("20250229000000"),
            Err(TimeCommandError::NoSuchDate { .. })
        ));
    }
}
