//! Caller identity normalization.

use serde::{Deserialize, Serialize};

/// A caller identifier reduced to a comparable canonical form: either
/// empty, or a single leading `+` followed by the digits of the raw
/// identifier. Two raw identifiers name the same caller iff their
/// canonical forms are string-equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalIdentity(String);

impl CanonicalIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the raw identifier carried no digits at all. An empty
    /// identity can never match an allowlist entry.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for CanonicalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a raw caller identifier.
///
/// Keeps digits only and prepends a single `+`; input without any digits
/// normalizes to the empty identity (never to a bare `"+"`). Total and
/// idempotent.
pub fn normalize(raw: &str) -> CanonicalIdentity {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        CanonicalIdentity(String::new())
    } else {
        CanonicalIdentity(format!("+{digits}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_pretty_printed_numbers() {
        assert_eq!(normalize("(555) 123-4567").as_str(), "+5551234567");
        assert_eq!(normalize("+1 555 123 4567").as_str(), "+15551234567");
    }

    #[test]
    fn already_canonical_is_unchanged() {
        assert_eq!(normalize("+15551234567").as_str(), "+15551234567");
    }

    #[test]
    fn empty_and_digitless_stay_empty() {
        assert!(normalize("").is_empty());
        assert!(normalize("+").is_empty());
        assert!(normalize("no digits here").is_empty());
    }

    #[test]
    fn message_handles_lose_non_digits() {
        // iMessage handles can be email addresses; only digits survive.
        assert_eq!(normalize("friend99@example.com").as_str(), "+99");
    }
}
