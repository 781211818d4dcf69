//! Chart repository backend
//!
//! A chart repository serves an `index.yaml` listing every chart and its
//! versions, plus one gzipped tarball per version. Revisions are chart
//! versions; the first component of a path names the chart. With no chart
//! named, the revision is the digest of the index itself.

pub mod http;
pub mod index;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use keel_core::{BackendKind, RepositoryConfig};

use crate::client::SourceClient;
use crate::error::{Result, SourceError};
use crate::files::{compile_pattern, list_matching};
use http::ChartHttpClient;
use index::{ChartEntry, ChartIndex, compute_digest, digest_matches};

/// Chart metadata file name
pub const CHART_FILE: &str = "Chart.yaml";

#[derive(Clone)]
struct LoadedIndex {
    index: Arc<ChartIndex>,
    digest: String,
}

/// Client for one chart repository
pub struct ChartRepoClient {
    config: RepositoryConfig,
    work_dir: PathBuf,
    http: ChartHttpClient,
    index: Mutex<Option<LoadedIndex>>,
}

impl ChartRepoClient {
    pub fn new(config: RepositoryConfig, work_dir: impl Into<PathBuf>) -> Result<Self> {
        let http = ChartHttpClient::for_config(&config)?;
        Ok(Self {
            config,
            work_dir: work_dir.into(),
            http,
            index: Mutex::new(None),
        })
    }

    fn index_url(&self) -> String {
        format!("{}/index.yaml", self.config.url.trim_end_matches('/'))
    }

    async fn download_index(&self) -> Result<LoadedIndex> {
        let url = self.index_url();
        let data = match self.http.get_bytes(&url).await {
            Err(SourceError::HttpError { status: 404, .. }) => {
                return Err(SourceError::IndexNotFound { url });
            }
            other => other?,
        };
        let index = ChartIndex::from_bytes(&data)?;
        debug!(url = %url, charts = index.entries.len(), "fetched chart index");
        Ok(LoadedIndex {
            index: Arc::new(index),
            digest: compute_digest(&data),
        })
    }

    /// Index fetched once per client and reused
    async fn load_index(&self) -> Result<LoadedIndex> {
        let mut cached = self.index.lock().await;
        if let Some(loaded) = cached.as_ref() {
            return Ok(loaded.clone());
        }
        let loaded = self.download_index().await?;
        *cached = Some(loaded.clone());
        Ok(loaded)
    }

    /// Resolve an archive URL relative to the repository
    fn archive_url(&self, entry: &ChartEntry) -> Result<String> {
        let url = entry
            .download_url()
            .ok_or_else(|| SourceError::UnresolvableRevision {
                revision: entry.version.clone(),
                reason: format!("chart {} lists no download URL", entry.name),
            })?;
        if url.starts_with("http://") || url.starts_with("https://") {
            Ok(url.to_string())
        } else {
            Ok(format!(
                "{}/{}",
                self.config.url.trim_end_matches('/'),
                url.trim_start_matches('/')
            ))
        }
    }

    async fn download_archive(&self, entry: &ChartEntry) -> Result<Vec<u8>> {
        let url = self.archive_url(entry)?;
        let data = self.http.get_bytes(&url).await?;

        if let Some(expected) = &entry.digest {
            let actual = compute_digest(&data);
            if !digest_matches(expected, &actual) {
                return Err(SourceError::IntegrityCheckFailed {
                    name: entry.name.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(data)
    }

    /// Version of the chart currently extracted in the working directory
    async fn extracted_version(&self, chart: &str) -> Option<String> {
        let path = self.work_dir.join(chart).join(CHART_FILE);
        let content = tokio::fs::read_to_string(&path).await.ok()?;
        let value: serde_yaml::Value = serde_yaml::from_str(&content).ok()?;
        match value.get("version")? {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[async_trait]
impl SourceClient for ChartRepoClient {
    fn url(&self) -> &str {
        &self.config.url
    }

    fn kind(&self) -> BackendKind {
        BackendKind::ChartRepository
    }

    fn working_directory(&self) -> &Path {
        &self.work_dir
    }

    fn default_revision(&self) -> &'static str {
        ""
    }

    async fn test(&self) -> Result<()> {
        let loaded = self.download_index().await?;
        *self.index.lock().await = Some(loaded);
        Ok(())
    }

    async fn resolve_revision(&self, path_glob: &str, revision: &str) -> Result<String> {
        let loaded = self.load_index().await?;

        let Some(chart) = chart_name(path_glob) else {
            if revision.is_empty() || revision == loaded.digest {
                return Ok(loaded.digest);
            }
            return Err(SourceError::UnresolvableRevision {
                revision: revision.to_string(),
                reason: "a chart version needs a chart path".to_string(),
            });
        };

        if !loaded.index.contains(chart) {
            return Err(SourceError::UnknownPackage {
                name: chart.to_string(),
            });
        }

        let entry = if revision.is_empty() {
            loaded.index.get_latest(chart)
        } else {
            loaded.index.get_version(chart, revision)
        };

        entry
            .map(|e| e.version.clone())
            .ok_or_else(|| SourceError::UnresolvableRevision {
                revision: revision.to_string(),
                reason: format!(
                    "chart {} has versions [{}]",
                    chart,
                    loaded.index.versions(chart).join(", ")
                ),
            })
    }

    async fn checkout(&self, path_glob: &str, revision: &str) -> Result<String> {
        if revision.is_empty() {
            return Err(SourceError::UnresolvedRevisionUsed {
                revision: revision.to_string(),
            });
        }

        let loaded = self.load_index().await?;

        let Some(chart) = chart_name(path_glob) else {
            if revision == loaded.digest {
                return Ok(loaded.digest);
            }
            return Err(SourceError::UnresolvableRevision {
                revision: revision.to_string(),
                reason: "index changed since it was resolved".to_string(),
            });
        };

        if !loaded.index.contains(chart) {
            return Err(SourceError::UnknownPackage {
                name: chart.to_string(),
            });
        }

        let entry = loaded.index.get_version(chart, revision).ok_or_else(|| {
            SourceError::UnresolvableRevision {
                revision: revision.to_string(),
                reason: format!("no version {} of chart {}", revision, chart),
            }
        })?;

        if self.extracted_version(chart).await.as_deref() == Some(revision) {
            debug!(chart = %chart, version = %revision, "chart already extracted");
            return Ok(revision.to_string());
        }

        let data = self.download_archive(entry).await?;

        let chart_dir = self.work_dir.join(chart);
        if tokio::fs::try_exists(&chart_dir).await? {
            tokio::fs::remove_dir_all(&chart_dir).await?;
        }
        let dest = self.work_dir.clone();
        tokio::task::spawn_blocking(move || extract_chart_archive(&data, &dest))
            .await
            .map_err(|e| SourceError::Io(std::io::Error::other(e.to_string())))??;

        info!(chart = %chart, version = %revision, "extracted chart");
        Ok(revision.to_string())
    }

    /// Index-level patterns see published charts only; patterns under a
    /// chart also see the files of its extracted archive.
    async fn list_files(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = compile_pattern(pattern)?;
        let loaded = self.load_index().await?;

        let mut files: BTreeSet<String> = loaded
            .index
            .names()
            .map(|name| format!("{}/{}", name, CHART_FILE))
            .filter(|path| matcher.matches(path))
            .collect();
        if chart_name(pattern).is_some_and(|chart| loaded.index.contains(chart)) {
            files.extend(list_matching(&self.work_dir, pattern)?);
        }

        Ok(files.into_iter().collect())
    }
}

/// First path component, when it names a chart
pub fn chart_name(path_glob: &str) -> Option<&str> {
    let trimmed = path_glob.trim().trim_start_matches("./").trim_start_matches('/');
    let first = trimmed.split('/').next()?;
    if first.is_empty() || first == "." || first.contains(['*', '?', '[']) {
        None
    } else {
        Some(first)
    }
}

/// Extract a chart archive (tar.gz) into a directory
fn extract_chart_archive(data: &[u8], dest: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let gz = GzDecoder::new(std::io::Cursor::new(data));
    let mut archive = Archive::new(gz);

    std::fs::create_dir_all(dest)?;
    archive.unpack(dest)?;

    Ok(())
}
