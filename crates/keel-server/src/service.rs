//! Repository service
//!
//! Request handlers over the store, the connection state cache, the policy
//! enforcer and the source backends. Every handler authorizes and validates
//! before any network I/O.

use futures::future::try_join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use keel_core::{
    AppDetails, AppInfo, AppSourceType, BackendKind, ConnectionState, DeclarativeTemplateSpec,
    OverlayCompositionSpec, PackagedChartSpec, RepositoryConfig, location_key,
};
use keel_source::detect::join;
use keel_source::{ClientFactory, SourceClient, clean_path, detect_apps, test_repository};

use crate::cache::ConnectionStateCache;
use crate::error::{Result, ServiceError};
use crate::policy::{Action, Claims, Enforcer, RESOURCE_REPOSITORIES};
use crate::store::RepositoryStore;

/// Values files reported beside a chart
const VALUES_PATTERN: &str = "*values*.yaml";

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Parent of every per-location working tree
    pub work_dir_root: PathBuf,
}

/// Where to look for applications
#[derive(Debug, Clone, Default)]
pub struct AppQuery {
    pub url: String,
    /// Empty means the backend's latest
    pub revision: String,
    /// Repository-relative path; empty for the root
    pub path: String,
    /// Backend for unregistered locations (git when unset)
    pub kind: Option<BackendKind>,
}

impl AppQuery {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn kind(mut self, kind: BackendKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// `Chart.yaml` fields reported in details; `version` may be written as a number
#[derive(Debug, Default, Deserialize)]
struct ChartMetadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: Option<serde_yaml::Value>,
    #[serde(default)]
    description: Option<String>,
}

fn scalar_string(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct RepositoryService {
    store: Arc<dyn RepositoryStore>,
    cache: Arc<dyn ConnectionStateCache>,
    enforcer: Arc<dyn Enforcer>,
    factory: Arc<dyn ClientFactory>,
    settings: ServiceSettings,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RepositoryService {
    pub fn new(
        store: Arc<dyn RepositoryStore>,
        cache: Arc<dyn ConnectionStateCache>,
        enforcer: Arc<dyn Enforcer>,
        factory: Arc<dyn ClientFactory>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            cache,
            enforcer,
            factory,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Registration at a location, `None` when unregistered
    async fn registered(&self, url: &str) -> Result<Option<RepositoryConfig>> {
        match self.store.get(url).await {
            Ok(config) => Ok(Some(config)),
            Err(ServiceError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check `action` against the registered URL of the location, so every
    /// spelling of one location gets the same decision
    fn authorize(
        &self,
        claims: &Claims,
        action: Action,
        url: &str,
        registered: Option<&RepositoryConfig>,
    ) -> Result<()> {
        let object = registered.map_or(url, |config| config.url.as_str());
        self.enforcer
            .enforce_err(claims, RESOURCE_REPOSITORIES, action, object)
    }

    /// Working tree of a location
    pub fn work_dir(&self, url: &str) -> PathBuf {
        self.settings.work_dir_root.join(location_key(url))
    }

    /// Serialize access to one location's working tree.
    ///
    /// Entries nobody holds or waits for are dropped on the next call.
    async fn lock_location(&self, url: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(location_key(url)).or_default().clone()
        };
        lock.lock_owned().await
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Registrations the caller may read, with their connection state
    pub async fn list(&self, claims: &Claims) -> Result<Vec<RepositoryConfig>> {
        let repositories: Vec<RepositoryConfig> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|r| {
                self.enforcer
                    .enforce(claims, RESOURCE_REPOSITORIES, Action::Get, &r.url)
            })
            .collect();

        let workers = repositories.into_iter().map(|config| {
            let cache = Arc::clone(&self.cache);
            let factory = Arc::clone(&self.factory);
            let handle = tokio::spawn(hydrate(cache, factory, config));
            async move { handle.await.unwrap_or_else(|e| Err(e.into())) }
        });

        let hydrated = try_join_all(workers).await?;
        Ok(hydrated.iter().map(RepositoryConfig::redacted).collect())
    }

    // ========================================================================
    // Applications
    // ========================================================================

    /// Authorize a read, then the registered config or an anonymous one
    /// for unregistered locations
    async fn config_for(&self, claims: &Claims, query: &AppQuery) -> Result<RepositoryConfig> {
        let registered = self.registered(&query.url).await?;
        self.authorize(claims, Action::Get, &query.url, registered.as_ref())?;

        let config = registered.unwrap_or_else(|| {
            debug!(url = %query.url, "location not registered, using anonymous access");
            RepositoryConfig::new(query.url.clone(), query.kind.unwrap_or_default())
        });
        config.validate()?;
        Ok(config)
    }

    fn client_for(&self, config: &RepositoryConfig) -> Result<Box<dyn SourceClient>> {
        Ok(self
            .factory
            .new_client(config, &self.work_dir(&config.url))?)
    }

    /// Every application in the repository
    pub async fn list_apps(&self, claims: &Claims, query: &AppQuery) -> Result<Vec<AppInfo>> {
        let config = self.config_for(claims, query).await?;

        let _guard = self.lock_location(&config.url).await;
        let client = self.client_for(&config)?;
        let revision = effective_revision(client.as_ref(), &query.revision);
        let detected = detect_apps(client.as_ref(), &revision, "").await?;
        Ok(detected.apps())
    }

    /// Details of the application at `query.path`
    pub async fn get_app_details(&self, claims: &Claims, query: &AppQuery) -> Result<AppDetails> {
        let config = self.config_for(claims, query).await?;

        let _guard = self.lock_location(&config.url).await;
        let client = self.client_for(&config)?;
        let revision = effective_revision(client.as_ref(), &query.revision);
        let detected = detect_apps(client.as_ref(), &revision, &query.path).await?;

        let Some((manifest, app_type)) = detected.best_match(&query.path) else {
            return Ok(AppDetails::PlainDirectory);
        };
        let app_path = keel_source::dir_of(manifest);
        debug!(manifest, %app_type, "reading application manifest");
        if app_type != AppSourceType::OverlayComposition {
            materialize(client.as_ref(), manifest, &app_path).await?;
        }

        match app_type {
            AppSourceType::DeclarativeTemplate => {
                let content = read_manifest(client.as_ref(), manifest).await?;
                let mut spec: DeclarativeTemplateSpec = serde_yaml::from_str(&content)
                    .map_err(|e| invalid_manifest(manifest, e))?;
                spec.path = app_path;
                Ok(AppDetails::DeclarativeTemplate(spec))
            }
            AppSourceType::PackagedChart => {
                let content = read_manifest(client.as_ref(), manifest).await?;
                let metadata: ChartMetadata = serde_yaml::from_str(&content)
                    .map_err(|e| invalid_manifest(manifest, e))?;

                let value_files = client
                    .list_files(&join(&app_path, VALUES_PATTERN))
                    .await?
                    .into_iter()
                    .map(|file| relative_to(&app_path, &file))
                    .collect();

                Ok(AppDetails::PackagedChart(PackagedChartSpec {
                    name: metadata.name,
                    path: app_path,
                    version: metadata.version.and_then(scalar_string),
                    description: metadata.description,
                    value_files,
                }))
            }
            AppSourceType::OverlayComposition => {
                Ok(AppDetails::OverlayComposition(OverlayCompositionSpec { path: app_path }))
            }
            AppSourceType::PlainDirectory => Err(ServiceError::UnsupportedSourceType {
                source_type: app_type,
            }),
        }
    }

    /// Resolve a revision without touching the working tree
    pub async fn resolve_revision(&self, claims: &Claims, query: &AppQuery) -> Result<String> {
        let config = self.config_for(claims, query).await?;

        let _guard = self.lock_location(&config.url).await;
        let client = self.client_for(&config)?;
        let revision = effective_revision(client.as_ref(), &query.revision);
        Ok(client.resolve_revision(&query.path, &revision).await?)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// One registration, without connection state
    pub async fn get(&self, claims: &Claims, url: &str) -> Result<RepositoryConfig> {
        let registered = self.registered(url).await?;
        self.authorize(claims, Action::Get, url, registered.as_ref())?;
        registered
            .map(|config| config.redacted())
            .ok_or_else(|| ServiceError::NotFound {
                url: url.to_string(),
            })
    }

    /// Register a repository after a successful probe.
    ///
    /// Registering an identical config again is a no-op. A differing config
    /// at the same location is a conflict unless `upsert` is set.
    pub async fn create(
        &self,
        claims: &Claims,
        mut config: RepositoryConfig,
        upsert: bool,
    ) -> Result<RepositoryConfig> {
        let registered = self.registered(&config.url).await?;
        self.authorize(claims, Action::Create, &config.url, registered.as_ref())?;
        config.validate()?;

        test_repository(self.factory.as_ref(), &config).await?;
        config.connection_state = ConnectionState::successful();

        match self.store.create(&config).await {
            Ok(mut created) => {
                info!(url = %created.url, kind = %created.kind, "registered repository");
                created.connection_state = config.connection_state;
                Ok(created.redacted())
            }
            Err(ServiceError::AlreadyExists { url }) => {
                let mut existing = self.store.get(&url).await?;
                existing.connection_state = config.connection_state.clone();
                if existing.same_spec(&config) {
                    debug!(url = %existing.url, "repository already registered");
                    Ok(existing.redacted())
                } else if upsert {
                    self.update(claims, config).await
                } else {
                    Err(ServiceError::Conflict {
                        message: "existing repository spec is different; use upsert flag to force update"
                            .to_string(),
                    })
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the fields of a registration; the backend kind cannot change
    pub async fn update(&self, claims: &Claims, config: RepositoryConfig) -> Result<RepositoryConfig> {
        let registered = self.registered(&config.url).await?;
        self.authorize(claims, Action::Update, &config.url, registered.as_ref())?;
        config.validate()?;

        let existing = registered.ok_or_else(|| ServiceError::NotFound {
            url: config.url.clone(),
        })?;
        if existing.kind != config.kind {
            return Err(ServiceError::Validation {
                message: format!(
                    "repository type cannot be changed from '{}' to '{}'",
                    existing.kind, config.kind
                ),
            });
        }

        let mut updated = self.store.update(&config).await?;
        if let Err(e) = self.cache.set_connection_state(&config.url, None).await {
            warn!(url = %config.url, "failed to invalidate connection state: {}", e);
        }
        info!(url = %updated.url, "updated repository");
        updated.connection_state = config.connection_state;
        Ok(updated.redacted())
    }

    /// Remove a registration and its cached state
    pub async fn delete(&self, claims: &Claims, url: &str) -> Result<()> {
        let registered = self.registered(url).await?;
        self.authorize(claims, Action::Delete, url, registered.as_ref())?;

        if let Err(e) = self.cache.set_connection_state(url, None).await {
            warn!(url, "failed to invalidate connection state: {}", e);
        }
        self.store.delete(url).await?;
        info!(url, "removed repository");

        let _guard = self.lock_location(url).await;
        let work_dir = self.work_dir(url);
        match tokio::fs::remove_dir_all(&work_dir).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                warn!(path = %work_dir.display(), "failed to remove working tree: {}", e);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Fill in the connection state of one registration
async fn hydrate(
    cache: Arc<dyn ConnectionStateCache>,
    factory: Arc<dyn ClientFactory>,
    mut config: RepositoryConfig,
) -> Result<RepositoryConfig> {
    match cache.get_connection_state(&config.url).await {
        Ok(Some(state)) => {
            config.connection_state = state;
            return Ok(config);
        }
        Ok(None) => {}
        Err(e) => warn!(url = %config.url, "failed to read cached connection state: {}", e),
    }

    let scratch = tempfile::Builder::new().prefix("keel-probe-").tempdir()?;
    let probe = match factory.new_client(&config, scratch.path()) {
        Ok(client) => client.test().await,
        Err(e) => Err(e),
    };

    config.connection_state = match probe {
        Ok(()) => {
            let state = ConnectionState::successful();
            if let Err(e) = cache.set_connection_state(&config.url, Some(&state)).await {
                warn!(url = %config.url, "failed to cache connection state: {}", e);
            }
            state
        }
        Err(e) => {
            debug!(url = %config.url, "connection test failed: {}", e);
            ConnectionState::failed(format!("Unable to connect to repository: {}", e))
        }
    };
    Ok(config)
}

fn effective_revision(client: &dyn SourceClient, revision: &str) -> String {
    if revision.is_empty() {
        client.default_revision().to_string()
    } else {
        revision.to_string()
    }
}

/// Check out the application directory when its manifest is not on disk
/// yet. A chart index lists charts whose archives are fetched on demand.
async fn materialize(client: &dyn SourceClient, manifest: &str, app_path: &str) -> Result<()> {
    if tokio::fs::try_exists(client.working_directory().join(manifest)).await? {
        return Ok(());
    }
    let revision = client
        .resolve_revision(app_path, client.default_revision())
        .await?;
    client.checkout(app_path, &revision).await?;
    debug!(path = app_path, %revision, "checked out application");
    Ok(())
}

async fn read_manifest(client: &dyn SourceClient, manifest: &str) -> Result<String> {
    let path = client.working_directory().join(manifest);
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| invalid_manifest(manifest, e))
}

fn invalid_manifest(path: &str, e: impl std::fmt::Display) -> ServiceError {
    ServiceError::InvalidManifest {
        path: path.to_string(),
        message: e.to_string(),
    }
}

/// `file` relative to the application directory
fn relative_to(app_path: &str, file: &str) -> String {
    match clean_path(app_path).as_str() {
        "." => file.to_string(),
        dir => file
            .strip_prefix(dir)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(file)
            .to_string(),
    }
}
