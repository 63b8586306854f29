use chrono::{DateTime, Utc};

use crate::hash::{is_hex_digest, parse_timestamp, BallotData};

pub fn parse_hex_digest(s: &str) -> Result<String, String> {
    let s = s.strip_prefix("0x").unwrap_or(s).to_lowercase();
    if !is_hex_digest(&s) {
        return Err(format!("Expected 64 hex characters, got '{}'", s));
    }
    Ok(s)
}

pub fn parse_ballot(s: &str) -> Result<BallotData, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid ballot JSON: {e}"))
}

pub fn parse_utc(s: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(s).map_err(|e| format!("invalid RFC 3339 timestamp: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_digest() {
        let upper = "AB".repeat(32);
        assert_eq!(parse_hex_digest(&upper).unwrap(), "ab".repeat(32));
        assert!(parse_hex_digest(&format!("0x{}", "0".repeat(64))).is_ok());
        assert!(parse_hex_digest("abc").is_err());
    }

    #[test]
    fn test_parse_ballot() {
        let ballot = parse_ballot(r#"{"VP":"Dana","President":"Alice"}"#).unwrap();
        assert_eq!(ballot.keys().collect::<Vec<_>>(), ["President", "VP"]);
        assert!(parse_ballot(r#"{"President":1}"#).is_err());
    }
}
