use chrono::TimeDelta;
use thiserror::Error;

/// Errors raised while parsing a retention period such as `"7d"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetentionParseError {
    /// Input was empty or only whitespace
    #[error("retention period is empty")]
    Empty,
    /// Input did not start with a positive integer
    #[error("retention period {0:?} must start with a positive integer")]
    InvalidAmount(String),
    /// Unit suffix is not one of `s`, `m`, `h`, `d`, `w`, `mo`, `y`
    #[error("retention period {0:?} has unknown unit {1:?}")]
    UnknownUnit(String, String),
    /// Period does not fit into a duration
    #[error("retention period {0:?} is out of range")]
    OutOfRange(String),
}

/// Parse a compact retention period into a look-back duration.
///
/// The result is negative so callers compute the cutoff as `now + duration`.
/// Accepted units: `s`, `m` (minutes), `h`, `d`, `w`, `mo` (30 days) and
/// `y` (365 days).
pub fn parse_retention_period(period: &str) -> Result<TimeDelta, RetentionParseError> {
    let period = period.trim();
    if period.is_empty() {
        return Err(RetentionParseError::Empty);
    }

    let split = period.find(|c: char| !c.is_ascii_digit()).unwrap_or(period.len());
    let (amount, unit) = period.split_at(split);
    let amount: i64 = match amount.parse() {
        Ok(n) if n > 0 => n,
        Ok(_) => return Err(RetentionParseError::InvalidAmount(period.to_owned())),
        Err(e) if matches!(e.kind(), std::num::IntErrorKind::PosOverflow) => {
            return Err(RetentionParseError::OutOfRange(period.to_owned()));
        }
        Err(_) => return Err(RetentionParseError::InvalidAmount(period.to_owned())),
    };

    let unit_secs: i64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 7 * 86_400,
        "mo" => 30 * 86_400,
        "y" => 365 * 86_400,
        other => return Err(RetentionParseError::UnknownUnit(period.to_owned(), other.to_owned())),
    };

    amount
        .checked_mul(unit_secs)
        .and_then(TimeDelta::try_seconds)
        .map(|delta| -delta)
        .ok_or_else(|| RetentionParseError::OutOfRange(period.to_owned()))
}
