//! Unified source client trait
//!
//! Provides a single interface over every backend kind (git remotes and
//! chart repositories), plus the factory that picks one for a config.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use keel_core::{BackendKind, RepositoryConfig};

use crate::chart::ChartRepoClient;
use crate::error::Result;
use crate::git::GitClient;

/// One backend bound to one repository and one working directory
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Repository URL as configured
    fn url(&self) -> &str;

    /// Backend kind
    fn kind(&self) -> BackendKind;

    /// Directory files are materialized into
    fn working_directory(&self) -> &Path;

    /// Revision meaning "latest" for this backend
    fn default_revision(&self) -> &'static str;

    /// Check that the repository is reachable with the configured credentials
    async fn test(&self) -> Result<()>;

    /// Resolve a symbolic revision to a concrete one.
    ///
    /// `path_glob` selects the package for backends that version per package.
    async fn resolve_revision(&self, path_glob: &str, revision: &str) -> Result<String>;

    /// Materialize `revision` into the working directory, returning the
    /// revision actually checked out
    async fn checkout(&self, path_glob: &str, revision: &str) -> Result<String>;

    /// Paths relative to the working directory matching `pattern`, sorted
    async fn list_files(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Creates source clients for repository configs
pub trait ClientFactory: Send + Sync {
    fn new_client(
        &self,
        config: &RepositoryConfig,
        work_dir: &Path,
    ) -> Result<Box<dyn SourceClient>>;
}

/// Dispatches on the configured backend kind
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClientFactory;

impl ClientFactory for DefaultClientFactory {
    fn new_client(
        &self,
        config: &RepositoryConfig,
        work_dir: &Path,
    ) -> Result<Box<dyn SourceClient>> {
        let work_dir: PathBuf = work_dir.to_path_buf();
        match config.kind {
            BackendKind::VersionControl => Ok(Box::new(GitClient::new(config.clone(), work_dir))),
            BackendKind::ChartRepository => {
                Ok(Box::new(ChartRepoClient::new(config.clone(), work_dir)?))
            }
        }
    }
}

/// Probe a repository in a throwaway working directory.
pub async fn test_repository(factory: &dyn ClientFactory, config: &RepositoryConfig) -> Result<()> {
    config.validate()?;
    let scratch = tempfile::Builder::new().prefix("keel-probe-").tempdir()?;
    let client = factory.new_client(config, scratch.path())?;
    client.test().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let factory = DefaultClientFactory;

        let git = RepositoryConfig::new("https://github.com/org/repo", BackendKind::VersionControl);
        let client = factory.new_client(&git, dir.path()).unwrap();
        assert_eq!(client.kind(), BackendKind::VersionControl);
        assert_eq!(client.default_revision(), "HEAD");
        assert_eq!(client.working_directory(), dir.path());

        let chart = RepositoryConfig::new("https://charts.example.com", BackendKind::ChartRepository);
        let client = factory.new_client(&chart, dir.path()).unwrap();
        assert_eq!(client.kind(), BackendKind::ChartRepository);
        assert_eq!(client.default_revision(), "");
        assert_eq!(client.url(), "https://charts.example.com");
    }

    #[tokio::test]
    async fn test_probe_rejects_invalid_config() {
        let config = RepositoryConfig::new("", BackendKind::VersionControl);
        assert!(test_repository(&DefaultClientFactory, &config).await.is_err());
    }
}
