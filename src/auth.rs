//! Bearer token authentication for the daemon.
//!
//! Tokens are issued elsewhere; the daemon only maps a presented token to
//! a user id through the configured table.

use std::collections::HashMap;

/// Constant-time token comparison. Empty tokens never match.
pub fn validate_token(provided: &str, expected: &str) -> bool {
    if provided.is_empty() || expected.is_empty() {
        return false;
    }

    let diff = provided
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));

    provided.len() == expected.len() && diff == 0
}

/// Token from an `Authorization: Bearer <token>` header value.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();

    if header.len() < 7 || !header.is_char_boundary(7) {
        return None;
    }

    let (prefix, token) = header.split_at(7);
    if !prefix.eq_ignore_ascii_case("Bearer ") {
        return None;
    }

    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Token -> user id table.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    entries: Vec<(String, String)>,
}

impl TokenTable {
    pub fn new(tokens: &HashMap<String, String>) -> Self {
        let mut entries: Vec<(String, String)> = tokens
            .iter()
            .map(|(token, user)| (token.clone(), user.clone()))
            .collect();
        entries.sort();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// User id for an `Authorization` header value.
    ///
    /// Every entry is compared so the time taken does not reveal which
    /// token came closest.
    pub fn resolve(&self, authorization: Option<&str>) -> Option<&str> {
        let token = authorization.and_then(extract_bearer_token)?;

        let mut found = None;
        for (expected, user) in &self.entries {
            if validate_token(token, expected) && found.is_none() {
                found = Some(user.as_str());
            }
        }
        found
    }
}
