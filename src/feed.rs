//! Text line protocol for feeding events into the queue.
//!
//! One event per line: `<kind> <timestamp> <entity> <value>`, separated by
//! whitespace. Blank lines and lines starting with `#` are skipped. The kind
//! is passed through as text so unknown kinds reach `push` and are dropped
//! there.

use thiserror::Error;

/// Errors that can occur while parsing a feed line.
#[derive(Error, Debug, PartialEq)]
pub enum FeedError {
    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("invalid value {0:?}")]
    InvalidValue(String),

    #[error("unexpected trailing field {0:?}")]
    TrailingField(String),
}

/// A parsed, not yet validated, event line.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedLine<'a> {
    pub kind: &'a str,
    pub timestamp: u64,
    pub entity: &'a str,
    pub value: f64,
}

/// Parses one line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<FeedLine<'_>>, FeedError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.split_whitespace();
    let kind = fields.next().ok_or(FeedError::MissingField("kind"))?;
    let timestamp = fields.next().ok_or(FeedError::MissingField("timestamp"))?;
    let entity = fields.next().ok_or(FeedError::MissingField("entity"))?;
    let value = fields.next().ok_or(FeedError::MissingField("value"))?;

    if let Some(extra) = fields.next() {
        return Err(FeedError::TrailingField(extra.to_string()));
    }

    let timestamp = timestamp
        .parse::<u64>()
        .map_err(|_| FeedError::InvalidTimestamp(timestamp.to_string()))?;
    let value = value
        .parse::<f64>()
        .map_err(|_| FeedError::InvalidValue(value.to_string()))?;

    Ok(Some(FeedLine {
        kind,
        timestamp,
        entity,
        value,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_line() {
        let parsed = parse_line("connected 1700000000123 7 1").expect("valid");
        assert_eq!(
            parsed,
            Some(FeedLine {
                kind: "connected",
                timestamp: 1_700_000_000_123,
                entity: "7",
                value: 1.0,
            })
        );
    }

    #[test]
    fn test_parse_tolerates_extra_whitespace() {
        let parsed = parse_line("  age\t10   t1  42.5 \n")
            .expect("valid")
            .expect("not blank");
        assert_eq!(parsed.kind, "age");
        assert_eq!(parsed.value, 42.5);
    }

    #[test]
    fn test_parse_skips_blank_and_comments() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   "), Ok(None));
        assert_eq!(parse_line("# header"), Ok(None));
    }

    #[test]
    fn test_parse_keeps_unknown_kind() {
        let parsed = parse_line("exploded 1 t1 1").expect("valid").expect("line");
        assert_eq!(parsed.kind, "exploded");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_line("failed 1 t1"),
            Err(FeedError::MissingField("value"))
        );
        assert_eq!(
            parse_line("failed soon t1 1"),
            Err(FeedError::InvalidTimestamp("soon".to_string()))
        );
        assert_eq!(
            parse_line("failed 1 t1 lots"),
            Err(FeedError::InvalidValue("lots".to_string()))
        );
        assert_eq!(
            parse_line("failed 1 t1 1 extra"),
            Err(FeedError::TrailingField("extra".to_string()))
        );
    }
}
