//! Repository URL normalization
//!
//! Two URLs name the same repository when their normalized forms are equal.
//! Normalization lower-cases, trims, drops a trailing `.git`, and folds the
//! scp-like SSH shorthand (`git@host:org/repo`) and explicit `ssh://` forms
//! into one representation. The algorithm is only meant for comparison and
//! for keying working trees and caches; do not display its output.

use sha2::{Digest, Sha256};
use url::Url;

const SSH_SCHEME: &str = "ssh://";

/// Returns true if the URL uses SSH, either as `ssh://` or scp-like `git@`.
pub fn is_ssh_url(url: &str) -> bool {
    url.starts_with("git@") || url.starts_with(SSH_SCHEME)
}

/// Normalize a repository URL.
///
/// Malformed input normalizes to an empty string.
pub fn normalize(location: &str) -> String {
    let mut repo = location.trim().to_lowercase();
    let ssh = is_ssh_url(&repo);
    if ssh {
        repo = ensure_prefix(&repo, SSH_SCHEME);
    }
    repo = remove_suffix(&repo, ".git").to_string();
    if ssh {
        repo = scp_path_to_url_path(&repo);
    }

    match Url::parse(&repo) {
        Ok(parsed) => {
            let normalized = parsed.to_string();
            normalized
                .strip_prefix(SSH_SCHEME)
                .map(str::to_string)
                .unwrap_or(normalized)
        }
        Err(_) => String::new(),
    }
}

/// Returns whether two repository URLs refer to the same location.
///
/// A URL that fails to normalize is never the same as anything.
pub fn same_location(left: &str, right: &str) -> bool {
    let left = normalize(left);
    !left.is_empty() && left == normalize(right)
}

/// Stable filesystem/cache key for a repository URL (hex SHA-256 of the normalized form).
pub fn location_key(location: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(location).as_bytes());
    hex::encode(hasher.finalize())
}

fn ensure_prefix(s: &str, prefix: &str) -> String {
    if s.starts_with(prefix) {
        s.to_string()
    } else {
        format!("{}{}", prefix, s)
    }
}

fn remove_suffix<'a>(s: &'a str, suffix: &str) -> &'a str {
    s.strip_suffix(suffix).unwrap_or(s)
}

/// `ssh://git@host:org/repo` carries a path where a port is expected; turn
/// the separator into `/` unless it really is a numeric port.
fn scp_path_to_url_path(repo: &str) -> String {
    let Some(rest) = repo.strip_prefix(SSH_SCHEME) else {
        return repo.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    if authority.ends_with(']') {
        return repo.to_string();
    }

    match authority.rfind(':') {
        Some(idx) => {
            let port = &authority[idx + 1..];
            if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
                repo.to_string()
            } else {
                format!("{}{}/{}", SSH_SCHEME, &rest[..idx], &rest[idx + 1..])
            }
        }
        None => repo.to_string(),
    }
}
