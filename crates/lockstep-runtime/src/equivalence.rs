//! Key equivalence capability for shared-state identifiers.
//!
//! Instrumentation may attach an equivalence policy to the shared-state
//! key it reports, so that distinct key spellings can be treated as the
//! same state (for example per-element keys of one collection). Kept as a
//! closed enum rather than a trait object so operations carrying it stay
//! serializable.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// KeyEquivalence — equivalence policies over shared-state keys
// ---------------------------------------------------------------------------

/// Equivalence policy over shared-state keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEquivalence {
    /// Byte-for-byte equality. The fallback when no policy is carried.
    #[default]
    Exact,
    /// ASCII case-folded equality.
    AsciiCaseInsensitive,
    /// Keys are equivalent when their prefixes before the first
    /// occurrence of the delimiter match. Collapses element-indexed keys
    /// such as `account.balance#3` and `account.balance#7`.
    UpToDelimiter { delimiter: char },
}

impl KeyEquivalence {
    /// Whether two keys denote the same shared state under this policy.
    pub fn equivalent(&self, a: &str, b: &str) -> bool {
        match self {
            Self::Exact => a == b,
            Self::AsciiCaseInsensitive => a.eq_ignore_ascii_case(b),
            Self::UpToDelimiter { delimiter } => {
                prefix_before(a, *delimiter) == prefix_before(b, *delimiter)
            }
        }
    }

    /// Canonical representative of a key: two keys are equivalent exactly
    /// when their canonical forms are equal.
    pub fn canonicalize(&self, key: &str) -> String {
        match self {
            Self::Exact => key.to_string(),
            Self::AsciiCaseInsensitive => key.to_ascii_lowercase(),
            Self::UpToDelimiter { delimiter } => prefix_before(key, *delimiter).to_string(),
        }
    }
}

impl fmt::Display for KeyEquivalence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::AsciiCaseInsensitive => write!(f, "ascii_case_insensitive"),
            Self::UpToDelimiter { delimiter } => write!(f, "up_to_delimiter({delimiter})"),
        }
    }
}

fn prefix_before(key: &str, delimiter: char) -> &str {
    match key.find(delimiter) {
        Some(position) => &key[..position],
        None => key,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Exact --

    #[test]
    fn exact_requires_byte_equality() {
        let eq = KeyEquivalence::Exact;
        assert!(eq.equivalent("counter", "counter"));
        assert!(!eq.equivalent("counter", "Counter"));
        assert_eq!(eq.canonicalize("Counter"), "Counter");
    }

    // -- AsciiCaseInsensitive --

    #[test]
    fn case_insensitive_folds_ascii() {
        let eq = KeyEquivalence::AsciiCaseInsensitive;
        assert!(eq.equivalent("Counter", "counter"));
        assert!(!eq.equivalent("counter", "count"));
        assert_eq!(eq.canonicalize("CoUnTeR"), "counter");
    }

    // -- UpToDelimiter --

    #[test]
    fn delimiter_collapses_suffixes() {
        let eq = KeyEquivalence::UpToDelimiter { delimiter: '#' };
        assert!(eq.equivalent("account.balance#3", "account.balance#7"));
        assert!(!eq.equivalent("account.balance#3", "account.owner#3"));
        assert_eq!(eq.canonicalize("account.balance#3"), "account.balance");
    }

    #[test]
    fn delimiter_absent_compares_whole_key() {
        let eq = KeyEquivalence::UpToDelimiter { delimiter: '#' };
        assert!(eq.equivalent("queue", "queue"));
        assert!(!eq.equivalent("queue", "stack"));
        assert_eq!(eq.canonicalize("queue"), "queue");
    }

    // -- Canonical forms agree with equivalence --

    #[test]
    fn canonical_forms_match_equivalence() {
        let policies = [
            KeyEquivalence::Exact,
            KeyEquivalence::AsciiCaseInsensitive,
            KeyEquivalence::UpToDelimiter { delimiter: '#' },
        ];
        let keys = ["a#1", "a#2", "A#1", "b", "B"];
        for policy in policies {
            for a in keys {
                for b in keys {
                    assert_eq!(
                        policy.equivalent(a, b),
                        policy.canonicalize(a) == policy.canonicalize(b),
                        "{policy} on {a} / {b}"
                    );
                }
            }
        }
    }

    // -- Display and serialization --

    #[test]
    fn display_names_the_policy() {
        assert_eq!(KeyEquivalence::Exact.to_string(), "exact");
        assert_eq!(
            KeyEquivalence::UpToDelimiter { delimiter: '#' }.to_string(),
            "up_to_delimiter(#)"
        );
    }

    #[test]
    fn serde_round_trip() {
        for policy in [
            KeyEquivalence::Exact,
            KeyEquivalence::AsciiCaseInsensitive,
            KeyEquivalence::UpToDelimiter { delimiter: ':' },
        ] {
            let json = serde_json::to_string(&policy).expect("serialize");
            let restored: KeyEquivalence = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(policy, restored);
        }
    }
}
