//! Delegation lifetime parsing.
//!
//! Delegation requests carry a lifetime as `"<number><unit>"` with units of
//! `h` (hours), `m` (minutes), or `s` (seconds), e.g. `"2h"`, `"30m"`, `"45s"`.

use std::time::Duration;

use crate::constants::MAX_DELEGATION_SECS;
use crate::CustodiaError;

/// Parse a delegation lifetime string.
///
/// The value must be a non-negative integer followed by a single unit
/// suffix, and the resulting duration must not exceed
/// [`MAX_DELEGATION_SECS`].
pub fn parse_duration(raw: &str) -> Result<Duration, CustodiaError> {
    let raw = raw.trim();
    let Some(unit) = raw.chars().last() else {
        return Err(CustodiaError::InvalidRequest(
            "duration must not be empty".into(),
        ));
    };

    let multiplier: u64 = match unit {
        'h' => 3600,
        'm' => 60,
        's' => 1,
        _ => {
            return Err(CustodiaError::InvalidRequest(format!(
                "unknown duration unit {unit:?}; expected h, m, or s"
            )))
        }
    };

    let digits = &raw[..raw.len() - 1];
    let count: u64 = digits.parse().map_err(|_| {
        CustodiaError::InvalidRequest(format!("bad duration value {digits:?}"))
    })?;

    let secs = count.checked_mul(multiplier).ok_or_else(|| {
        CustodiaError::InvalidRequest("duration overflows".into())
    })?;
    if secs > MAX_DELEGATION_SECS {
        return Err(CustodiaError::InvalidRequest(format!(
            "duration exceeds ceiling of {MAX_DELEGATION_SECS} seconds"
        )));
    }

    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hours_minutes_seconds() {
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn zero_is_allowed() {
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn rejects_missing_or_unknown_unit() {
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn rejects_negative_and_garbage() {
        assert!(parse_duration("-1h").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("1.5h").is_err());
    }

    #[test]
    fn rejects_above_ceiling() {
        // 7 days is the ceiling; 169 hours is over it.
        assert!(parse_duration("168h").is_ok());
        assert!(parse_duration("169h").is_err());
    }
}
