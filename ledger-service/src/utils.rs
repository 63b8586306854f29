//! Shared utility functions for the ledger service

use tracing::info;

use crate::error::Error;

/// Longest slug accepted as an election id
pub const MAX_ELECTION_ID_LEN: usize = 255;

/// Validate that an election id is a URL slug: ASCII letters, digits, `-` or `_`
pub fn validate_election_id(election_id: &str) -> Result<(), Error> {
    let well_formed = !election_id.is_empty()
        && election_id.len() <= MAX_ELECTION_ID_LEN
        && election_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if !well_formed {
        info!("Invalid election id '{}'", election_id);
        return Err(Error::Validation(format!(
            "'{}' is not a valid election id",
            election_id
        )));
    }
    Ok(())
}

/// Parse an environment variable into a type implementing FromStr, with a default fallback
pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read an optional environment variable, treating blank values as unset
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
