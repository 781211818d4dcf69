//! Chart repository index (`index.yaml`)

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{Result, SourceError};

/// Parsed repository index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartIndex {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub generated: Option<DateTime<Utc>>,

    /// Chart versions by chart name
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartEntry>>,
}

impl ChartIndex {
    /// Parse index from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| SourceError::IndexParseError {
            message: format!("Invalid UTF-8: {}", e),
        })?;
        serde_yaml::from_str(yaml).map_err(|e| SourceError::IndexParseError {
            message: e.to_string(),
        })
    }

    /// True if the index lists `name`
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Chart names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Highest semver version of a chart
    pub fn get_latest(&self, name: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .max_by(|a, b| compare_versions(&a.version, &b.version))
    }

    /// Exact version of a chart
    pub fn get_version(&self, name: &str, version: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .find(|e| e.version == version)
    }

    /// Available versions of a chart, for error messages
    pub fn versions(&self, name: &str) -> Vec<&str> {
        self.entries
            .get(name)
            .map(|v| v.iter().map(|e| e.version.as_str()).collect())
            .unwrap_or_default()
    }
}

/// One chart version in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    pub name: String,

    pub version: String,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Archive locations, absolute or relative to the repository URL
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 digest of the archive
    #[serde(default)]
    pub digest: Option<String>,

    #[serde(default)]
    pub created: Option<DateTime<Utc>>,

    #[serde(default)]
    pub deprecated: bool,
}

impl ChartEntry {
    /// Get the primary download URL
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }
}

/// Semver ordering; unparseable versions sort below parseable ones
fn compare_versions(a: &str, b: &str) -> Ordering {
    match (Version::parse(a).ok(), Version::parse(b).ok()) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Hex SHA256 of a byte slice
pub fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compare digests ignoring case and an optional `sha256:` prefix
pub fn digest_matches(expected: &str, actual: &str) -> bool {
    fn norm(d: &str) -> String {
        d.trim()
            .to_lowercase()
            .replace("sha256:", "")
            .replace("sha256-", "")
    }
    norm(expected) == norm(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
apiVersion: v1
entries:
  wordpress:
    - name: wordpress
      version: 5.7.1
      urls: [wordpress-5.7.1.tgz]
      digest: abc
    - name: wordpress
      version: 5.10.0
      urls: [https://cdn.example.com/wordpress-5.10.0.tgz]
    - name: wordpress
      version: nightly
  mysql:
    - name: mysql
      version: 1.0.0
      created: 2024-01-01T00:00:00Z
generated: 2024-01-02T00:00:00Z
"#;

    #[test]
    fn test_parse_and_lookup() {
        let index = ChartIndex::from_bytes(INDEX.as_bytes()).unwrap();
        assert_eq!(index.names().collect::<Vec<_>>(), vec!["mysql", "wordpress"]);
        assert!(index.contains("mysql"));
        assert!(!index.contains("wordpress1"));
        assert_eq!(
            index.get_version("wordpress", "5.7.1").unwrap().download_url(),
            Some("wordpress-5.7.1.tgz")
        );
        assert!(index.get_version("wordpress", "5.7").is_none());
    }

    #[test]
    fn test_latest_uses_semver() {
        let index = ChartIndex::from_bytes(INDEX.as_bytes()).unwrap();
        assert_eq!(index.get_latest("wordpress").unwrap().version, "5.10.0");
        assert!(index.get_latest("nope").is_none());
    }

    #[test]
    fn test_invalid_index() {
        assert!(matches!(
            ChartIndex::from_bytes(b"entries: [unclosed"),
            Err(SourceError::IndexParseError { .. })
        ));
    }

    #[test]
    fn test_digest_matches() {
        let digest = compute_digest(b"hello world");
        assert_eq!(digest.len(), 64);
        assert!(digest_matches(&format!("sha256:{}", digest.to_uppercase()), &digest));
        assert!(!digest_matches("sha256:abc", &digest));
    }
}
