//! Repository registration storage
//!
//! Registrations are keyed by normalized location, so two spellings of the
//! same URL address one entry. Connection state is never persisted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

use crate::error::{Result, ServiceError};
use keel_core::{ConnectionState, RepositoryConfig, same_location};

/// Backing store for repository registrations
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// All registrations, in registration order
    async fn list(&self) -> Result<Vec<RepositoryConfig>>;

    /// Registration for a location, or `NotFound`
    async fn get(&self, url: &str) -> Result<RepositoryConfig>;

    /// Add a registration; `AlreadyExists` if the location is taken
    async fn create(&self, config: &RepositoryConfig) -> Result<RepositoryConfig>;

    /// Replace an existing registration, or `NotFound`
    async fn update(&self, config: &RepositoryConfig) -> Result<RepositoryConfig>;

    /// Remove a registration, or `NotFound`
    async fn delete(&self, url: &str) -> Result<()>;

    /// Check if a location is registered
    async fn exists(&self, url: &str) -> Result<bool> {
        match self.get(url).await {
            Ok(_) => Ok(true),
            Err(ServiceError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Ordered set of registrations, the on-disk document of the file store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryList {
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

impl RepositoryList {
    fn position(&self, url: &str) -> Option<usize> {
        self.repositories
            .iter()
            .position(|r| same_location(&r.url, url))
    }

    pub fn get(&self, url: &str) -> Result<RepositoryConfig> {
        self.position(url)
            .map(|idx| self.repositories[idx].clone())
            .ok_or_else(|| not_found(url))
    }

    pub fn add(&mut self, config: &RepositoryConfig) -> Result<RepositoryConfig> {
        if self.position(&config.url).is_some() {
            return Err(ServiceError::AlreadyExists {
                url: config.url.clone(),
            });
        }
        let stored = without_state(config);
        self.repositories.push(stored.clone());
        Ok(stored)
    }

    pub fn replace(&mut self, config: &RepositoryConfig) -> Result<RepositoryConfig> {
        let idx = self.position(&config.url).ok_or_else(|| not_found(&config.url))?;
        let stored = without_state(config);
        self.repositories[idx] = stored.clone();
        Ok(stored)
    }

    pub fn remove(&mut self, url: &str) -> Result<RepositoryConfig> {
        let idx = self.position(url).ok_or_else(|| not_found(url))?;
        Ok(self.repositories.remove(idx))
    }
}

fn not_found(url: &str) -> ServiceError {
    ServiceError::NotFound {
        url: url.to_string(),
    }
}

fn without_state(config: &RepositoryConfig) -> RepositoryConfig {
    RepositoryConfig {
        connection_state: ConnectionState::default(),
        ..config.clone()
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory store, for embedding and tests
#[derive(Clone, Default)]
pub struct MemoryRepositoryStore {
    list: Arc<RwLock<RepositoryList>>,
    operations: Arc<Mutex<OperationCounts>>,
}

/// Counts of operations performed, for test assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub lists: usize,
    pub gets: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl MemoryRepositoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated registrations
    pub fn with_repositories(repositories: Vec<RepositoryConfig>) -> Self {
        let list = RepositoryList {
            repositories: repositories.iter().map(without_state).collect(),
        };
        Self {
            list: Arc::new(RwLock::new(list)),
            operations: Arc::default(),
        }
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut self.operations.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

#[async_trait]
impl RepositoryStore for MemoryRepositoryStore {
    async fn list(&self) -> Result<Vec<RepositoryConfig>> {
        self.record(|ops| ops.lists += 1);
        Ok(self.list.read().await.repositories.clone())
    }

    async fn get(&self, url: &str) -> Result<RepositoryConfig> {
        self.record(|ops| ops.gets += 1);
        self.list.read().await.get(url)
    }

    async fn create(&self, config: &RepositoryConfig) -> Result<RepositoryConfig> {
        self.record(|ops| ops.creates += 1);
        self.list.write().await.add(config)
    }

    async fn update(&self, config: &RepositoryConfig) -> Result<RepositoryConfig> {
        self.record(|ops| ops.updates += 1);
        self.list.write().await.replace(config)
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.record(|ops| ops.deletes += 1);
        self.list.write().await.remove(url).map(|_| ())
    }
}

// ============================================================================
// YAML file store
// ============================================================================

/// Registrations kept in a `repositories.yaml` file
pub struct FileRepositoryStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileRepositoryStore {
    /// File name inside the config directory
    pub const FILE_NAME: &'static str = "repositories.yaml";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Store at `<config_dir>/repositories.yaml`
    pub fn in_dir(config_dir: &Path) -> Self {
        Self::new(config_dir.join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file; a missing file is an empty list
    pub async fn load(&self) -> Result<RepositoryList> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(RepositoryList::default()),
            Ok(content) => serde_yaml::from_str(&content).map_err(|e| ServiceError::Store {
                message: format!("{}: {}", self.path.display(), e),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RepositoryList::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the file, readable by the owner only
    async fn save(&self, list: &RepositoryList) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_yaml::to_string(list).map_err(|e| ServiceError::Store {
            message: e.to_string(),
        })?;

        let tmp = self.path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp, content).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn modify<T>(&self, f: impl FnOnce(&mut RepositoryList) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut list = self.load().await?;
        let out = f(&mut list)?;
        self.save(&list).await?;
        Ok(out)
    }
}

#[async_trait]
impl RepositoryStore for FileRepositoryStore {
    async fn list(&self) -> Result<Vec<RepositoryConfig>> {
        Ok(self.load().await?.repositories)
    }

    async fn get(&self, url: &str) -> Result<RepositoryConfig> {
        self.load().await?.get(url)
    }

    async fn create(&self, config: &RepositoryConfig) -> Result<RepositoryConfig> {
        self.modify(|list| list.add(config)).await
    }

    async fn update(&self, config: &RepositoryConfig) -> Result<RepositoryConfig> {
        self.modify(|list| list.replace(config)).await
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.modify(|list| list.remove(url).map(|_| ())).await
    }
}
