use crate::AutomationError;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Parse human-readable duration strings such as "500ms", "1s", "1.5s" or "2m".
/// A bare number is taken as milliseconds.
pub fn parse_duration(input: &str) -> Result<Duration, AutomationError> {
    let input = input.trim();

    if let Ok(ms) = input.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }

    let (number_part, unit_part) = split_number_and_unit(input)?;
    let value: f64 = number_part.parse().map_err(|_| {
        AutomationError::InvalidConfig(format!("invalid number in duration: {number_part}"))
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(AutomationError::InvalidConfig(format!(
            "duration must be a non-negative number: {input}"
        )));
    }

    let multiplier = match unit_part {
        "ms" | "milliseconds" | "millisecond" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        _ => {
            return Err(AutomationError::InvalidConfig(format!(
                "unknown time unit: {unit_part}"
            )))
        }
    };

    Ok(Duration::from_millis((value * multiplier).round() as u64))
}

fn split_number_and_unit(input: &str) -> Result<(&str, &str), AutomationError> {
    let split_pos = input
        .char_indices()
        .find(|(_, ch)| ch.is_alphabetic())
        .map(|(i, _)| i)
        .unwrap_or(input.len());

    let number_part = input[..split_pos].trim();
    let unit_part = input[split_pos..].trim();

    if number_part.is_empty() {
        return Err(AutomationError::InvalidConfig(format!(
            "no numeric value in duration: {input:?}"
        )));
    }

    Ok((number_part, unit_part))
}

/// Serde adapter accepting either a duration string or an integer of milliseconds.
pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_milliseconds() {
        assert_eq!(parse_duration("500").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_duration_seconds() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("0.5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30 seconds").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_duration_minutes() {
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-1s").is_err());
    }
}
