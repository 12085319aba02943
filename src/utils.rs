/// Utility functions for parsing reporter fields and formatting timestamps
use time::macros::format_description;
use time::OffsetDateTime;

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    let format = format_description!("[day].[month].[year] - [hour]:[minute]:[second]");
    dt.format(&format).unwrap_or_else(|_| dt.to_string())
}

/// Milliseconds since the Unix epoch, as handed to chart renderers
pub fn epoch_millis(dt: &OffsetDateTime) -> i64 {
    (dt.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Parse an epoch timestamp written as an integer literal
///
/// Reporters send plain decimal seconds, but base prefixes are accepted too:
/// `0x`/`0o`/`0b`, a bare leading `0` for octal, an optional sign, and
/// single underscores between digits (`1_700_000_000`).
///
/// # Returns
/// None if the text is not a valid literal or does not fit in an i64
pub fn parse_epoch(raw: &str) -> Option<i64> {
    let (negative, body) = match raw.as_bytes().first().copied()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };

    let prefixed = |prefixes: [&'static str; 2]| {
        prefixes.iter().find_map(|p| body.strip_prefix(p))
    };
    let (radix, digits, has_prefix) = if let Some(rest) = prefixed(["0x", "0X"]) {
        (16, rest, true)
    } else if let Some(rest) = prefixed(["0o", "0O"]) {
        (8, rest, true)
    } else if let Some(rest) = prefixed(["0b", "0B"]) {
        (2, rest, true)
    } else if body.len() > 1 && body.starts_with('0') {
        (8, &body[1..], true)
    } else {
        (10, body, false)
    };

    let cleaned = strip_digit_separators(digits, has_prefix)?;
    if cleaned.is_empty() || !cleaned.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }

    let magnitude = i128::from(u64::from_str_radix(&cleaned, radix).ok()?);
    i64::try_from(if negative { -magnitude } else { magnitude }).ok()
}

/// Remove `_` separators, rejecting any that do not sit between two digits
/// (or between a base prefix and a digit).
fn strip_digit_separators(digits: &str, has_prefix: bool) -> Option<String> {
    let bytes = digits.as_bytes();
    let mut cleaned = String::with_capacity(digits.len());
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'_' {
            cleaned.push(b as char);
            continue;
        }
        let before_ok = if i == 0 {
            has_prefix
        } else {
            bytes[i - 1].is_ascii_alphanumeric()
        };
        let after_ok = bytes.get(i + 1).is_some_and(|n| n.is_ascii_alphanumeric());
        if !before_ok || !after_ok {
            return None;
        }
    }
    Some(cleaned)
}

/// Parse a temperature or humidity reading; non-finite values are rejected
pub fn parse_reading(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_epoch_decimal() {
        assert_eq!(parse_epoch("1345678910"), Some(1_345_678_910));
        assert_eq!(parse_epoch("0"), Some(0));
        assert_eq!(parse_epoch("-60"), Some(-60));
        assert_eq!(parse_epoch("+60"), Some(60));
    }

    #[test]
    fn test_parse_epoch_prefixes() {
        assert_eq!(parse_epoch("0x10"), Some(16));
        assert_eq!(parse_epoch("0o17"), Some(15));
        assert_eq!(parse_epoch("017"), Some(15));
        assert_eq!(parse_epoch("0b101"), Some(5));
        assert_eq!(parse_epoch("1_000"), Some(1000));
        assert_eq!(parse_epoch("0x_ff"), Some(255));
    }

    #[test]
    fn test_parse_epoch_rejects_garbage() {
        for raw in [
            "", "-", "abc", "12.5", "08", "0x", "1__0", "_1", "1_", "--1", "+-1", " 1", "1e3",
            "99999999999999999999",
        ] {
            assert_eq!(parse_epoch(raw), None, "{raw:?} should not parse");
        }
    }

    #[test]
    fn test_parse_epoch_limits() {
        assert_eq!(parse_epoch("9223372036854775807"), Some(i64::MAX));
        assert_eq!(parse_epoch("-9223372036854775808"), Some(i64::MIN));
        assert_eq!(parse_epoch("9223372036854775808"), None);
    }

    #[test]
    fn test_parse_reading() {
        assert_eq!(parse_reading("21.5"), Some(21.5));
        assert_eq!(parse_reading("-3"), Some(-3.0));
        assert_eq!(parse_reading("warm"), None);
        assert_eq!(parse_reading("NaN"), None);
        assert_eq!(parse_reading("inf"), None);
    }

    #[test]
    fn test_epoch_millis_and_format() {
        let dt = OffsetDateTime::from_unix_timestamp(1000).unwrap();
        assert_eq!(epoch_millis(&dt), 1_000_000);
        assert_eq!(format_datetime(&dt), "01.01.1970 - 00:16:40");
    }
}
