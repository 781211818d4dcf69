//! Revision classification
//!
//! A revision is whatever the caller typed: a branch, a tag, a full or
//! truncated commit hash, or nothing at all (meaning "latest"). These
//! predicates decide which of those it is without touching the network.

/// Length of a full git commit hash in hex characters
pub const FULL_HASH_LEN: usize = 40;

/// Shortest hex string accepted as a truncated commit hash
pub const MIN_TRUNCATED_HASH_LEN: usize = 7;

/// True iff `revision` is exactly a 40 character hex commit hash.
pub fn is_full_identifier(revision: &str) -> bool {
    revision.len() == FULL_HASH_LEN && is_hex(revision)
}

/// True iff `revision` is hex and between 7 and 39 characters long.
///
/// Six characters or fewer are too ambiguous to be treated as a hash and
/// must go through symbolic resolution instead.
pub fn is_truncated_identifier(revision: &str) -> bool {
    (MIN_TRUNCATED_HASH_LEN..FULL_HASH_LEN).contains(&revision.len()) && is_hex(revision)
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// How a revision string should be treated by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionKind {
    /// Empty revision: the backend's default reference
    Latest,
    /// Full content hash, usable without any lookup
    Full,
    /// Hex prefix of a content hash
    Truncated,
    /// Branch, tag, version, or anything else needing a remote lookup
    Symbolic,
}

impl RevisionKind {
    pub fn classify(revision: &str) -> Self {
        if revision.is_empty() {
            RevisionKind::Latest
        } else if is_full_identifier(revision) {
            RevisionKind::Full
        } else if is_truncated_identifier(revision) {
            RevisionKind::Truncated
        } else {
            RevisionKind::Symbolic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_identifier() {
        assert!(is_full_identifier("9d921f65f3c5373b682e2eb4b37afba6592e8f8b"));
        assert!(is_full_identifier("9D921F65F3C5373B682E2EB4B37AFBA6592E8F8B"));
        assert!(!is_full_identifier("gd921f65f3c5373b682e2eb4b37afba6592e8f8b"));
        assert!(!is_full_identifier("9d921f65f3c5373b682e2eb4b37afba6592e8f8b0"));
        assert!(!is_full_identifier("master"));
        assert!(!is_full_identifier("HEAD"));
        assert!(!is_full_identifier("9d921f6"));
        assert!(!is_full_identifier(""));
    }

    #[test]
    fn test_truncated_identifier() {
        assert!(is_truncated_identifier("9d921f6"));
        assert!(is_truncated_identifier("9d921f65f3c5373b682e2eb4b37afba6592e8f8"));
        assert!(!is_truncated_identifier("9d921f"));
        assert!(!is_truncated_identifier("4e22a3"));
        assert!(!is_truncated_identifier("branch-name"));
        assert!(!is_truncated_identifier("9d921f65f3c5373b682e2eb4b37afba6592e8f8b"));
    }

    #[test]
    fn test_every_truncated_length() {
        let full = "0123456789abcdef0123456789abcdef01234567";
        for len in 1..=FULL_HASH_LEN {
            let prefix = &full[..len];
            assert_eq!(
                is_truncated_identifier(prefix),
                (7..40).contains(&len),
                "length {}",
                len
            );
            assert_eq!(is_full_identifier(prefix), len == 40, "length {}", len);
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(RevisionKind::classify(""), RevisionKind::Latest);
        assert_eq!(
            RevisionKind::classify("4e22a3cb21fa447ca362a05a505a69397c8a0d44"),
            RevisionKind::Full
        );
        assert_eq!(RevisionKind::classify("4e22a3c"), RevisionKind::Truncated);
        assert_eq!(RevisionKind::classify("4e22a3"), RevisionKind::Symbolic);
        assert_eq!(RevisionKind::classify("release-0.8"), RevisionKind::Symbolic);
        assert_eq!(RevisionKind::classify("v0.8.0"), RevisionKind::Symbolic);
    }
}
