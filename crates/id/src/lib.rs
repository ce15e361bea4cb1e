//! Canonical document identifiers.
//!
//! Every document stored by HMS is addressed by a [`DocId`]. To keep identifier
//! handling deterministic across the API boundary and the store, HMS uses a
//! *canonical* representation: **32 lowercase hexadecimal characters** (no
//! hyphens), i.e. the value you would get from `Uuid::new_v4().simple()`.
//!
//! This crate is the identifier codec for the rest of the workspace:
//!
//! - [`DocId::new`] allocates a fresh identifier for a new document.
//! - [`DocId::parse`] validates an externally supplied identifier (API path
//!   segment, query parameter, stored reference) and returns an error for
//!   anything non-canonical. It never panics on malformed input.
//!
//! Non-canonical values (uppercase, hyphenated, wrong length, non-hex) are
//! rejected rather than normalised, so a given document has exactly one
//! string representation everywhere in the system.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Error type for identifier parsing.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// The input was not a canonical identifier.
    #[error("invalid identifier: {0}")]
    Invalid(String),
}

/// Result type for identifier operations.
pub type IdResult<T> = Result<T, IdError>;

/// A validated document identifier in canonical form.
///
/// Once constructed, the contained value is guaranteed to render as 32
/// lowercase hex characters. `DocId` is `Copy` and ordered, so it can be used
/// directly as a map key in the store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId(Uuid);

impl DocId {
    /// Allocates a fresh identifier for a new document.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses an identifier that must already be canonical.
    ///
    /// This does **not** normalise other common UUID forms (hyphenated,
    /// uppercase); callers supply the canonical representation or get an
    /// error back.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::Invalid`] if `input` is not 32 lowercase hex
    /// characters.
    pub fn parse(input: &str) -> IdResult<Self> {
        if !Self::is_canonical(input) {
            return Err(IdError::Invalid(format!(
                "identifier must be 32 lowercase hex characters, got '{input}'"
            )));
        }
        // is_canonical guarantees valid hex, so parse_str succeeds
        let uuid = Uuid::parse_str(input).map_err(|e| IdError::Invalid(e.to_string()))?;
        Ok(Self(uuid))
    }

    /// Returns true if `input` is in canonical form.
    ///
    /// Purely syntactic: exactly 32 bytes, `0-9` and `a-f` only.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl Default for DocId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl fmt::Debug for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocId({})", self.0.simple())
    }
}

impl FromStr for DocId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for DocId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for DocId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DocId::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_canonical() {
        let id = DocId::new();
        let rendered = id.to_string();
        assert!(DocId::is_canonical(&rendered));
        assert_eq!(rendered.len(), 32);
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = DocId::new();
        let parsed = DocId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_valid_literal() {
        let id = DocId::parse("550e8400e29b41d4a716446655440000").unwrap();
        assert_eq!(id.to_string(), "550e8400e29b41d4a716446655440000");
    }

    #[test]
    fn test_parse_rejects_hyphenated() {
        let result = DocId::parse("550e8400-e29b-41d4-a716-446655440000");
        assert!(matches!(result, Err(IdError::Invalid(_))));
    }

    #[test]
    fn test_parse_rejects_uppercase() {
        let result = DocId::parse("550E8400E29B41D4A716446655440000");
        assert!(matches!(result, Err(IdError::Invalid(_))));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(DocId::parse("abc123").is_err());
        assert!(DocId::parse("").is_err());
        assert!(DocId::parse("550e8400e29b41d4a7164466554400001").is_err());
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        let result = DocId::parse("550e8400e29b41d4a71644665544000g");
        assert!(result.is_err());
    }

    #[test]
    fn test_serde_string_representation() {
        let id = DocId::parse("550e8400e29b41d4a716446655440000").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400e29b41d4a716446655440000\"");

        let back: DocId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_serde_rejects_non_canonical() {
        let result: Result<DocId, _> =
            serde_json::from_str("\"550e8400-e29b-41d4-a716-446655440000\"");
        assert!(result.is_err());
    }
}
