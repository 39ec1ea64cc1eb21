use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Canonical lookup form of a user-typed short code.
///
/// Lower-cases with Unicode case mapping, then drops every whitespace
/// character. Total and idempotent: empty input yields an empty string.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    raw.to_lowercase().chars().filter(|ch| !ch.is_whitespace()).collect()
}

/// A short code in both its raw (as typed) and normalized (as indexed) form.
///
/// Snapshot backends key on [`ShortCode::normalized`]; point-query backends
/// match [`ShortCode::raw`] exactly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShortCode {
    raw: String,
    normalized: String,
}

impl ShortCode {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        Self { raw, normalized }
    }

    /// Accepts only ASCII alphanumeric codes, the shape operators type into
    /// the lookup endpoint and CLI.
    pub fn parse_strict(raw: &str) -> Result<Self, DomainError> {
        let valid = !raw.is_empty() && raw.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !valid {
            return Err(DomainError::InvalidShortCode(raw.to_owned()));
        }
        Ok(Self::new(raw))
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

impl fmt::Display for ShortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
