//! Wiring of the repository service from CLI settings

use std::path::PathBuf;
use std::sync::Arc;

use keel_server::{
    AllowAll, Claims, Enforcer, FileRepositoryStore, RepositoryService, RuleEnforcer,
    ServiceSettings, SqliteConnectionCache,
};
use keel_source::DefaultClientFactory;

use crate::error::{CliError, Result};

/// Resolved global options
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub work_dir: PathBuf,
    pub claims: Claims,
    pub cache_ttl_secs: u64,
}

/// A ready service plus the caller identity
pub struct Context {
    pub service: RepositoryService,
    pub claims: Claims,
}

impl Settings {
    pub fn resolve(
        config_dir: Option<PathBuf>,
        work_dir: Option<PathBuf>,
        subject: String,
        groups: Vec<String>,
        cache_ttl_secs: u64,
    ) -> Result<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => dirs::config_dir()
                .map(|d| d.join("keel"))
                .ok_or_else(|| CliError::input("cannot determine a config directory, pass --config-dir"))?,
        };
        let work_dir = match work_dir {
            Some(dir) => dir,
            None => dirs::cache_dir()
                .map(|d| d.join("keel").join("repos"))
                .ok_or_else(|| CliError::input("cannot determine a cache directory, pass --work-dir"))?,
        };

        Ok(Self {
            config_dir,
            work_dir,
            claims: Claims::new(subject).with_groups(groups),
            cache_ttl_secs,
        })
    }

    /// Policy from `policy.yaml`, or allow-all when the file is absent
    fn enforcer(&self) -> Result<Arc<dyn Enforcer>> {
        let path = self.config_dir.join(RuleEnforcer::FILE_NAME);
        if path.exists() {
            let policy = RuleEnforcer::load(&path)?;
            tracing::debug!(path = %path.display(), rules = policy.len(), "loaded policy");
            Ok(Arc::new(policy))
        } else {
            Ok(Arc::new(AllowAll))
        }
    }

    pub fn build(self) -> Result<Context> {
        let ttl = chrono::Duration::seconds(self.cache_ttl_secs.min(u64::from(u32::MAX)) as i64);
        let cache = SqliteConnectionCache::open_at(
            &self.config_dir.join(SqliteConnectionCache::FILE_NAME),
        )?
        .with_ttl(ttl);
        if let Err(e) = cache.prune() {
            tracing::warn!("failed to prune connection cache: {}", e);
        }

        let service = RepositoryService::new(
            Arc::new(FileRepositoryStore::in_dir(&self.config_dir)),
            Arc::new(cache),
            self.enforcer()?,
            Arc::new(DefaultClientFactory),
            ServiceSettings {
                work_dir_root: self.work_dir,
            },
        );

        Ok(Context {
            service,
            claims: self.claims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> Settings {
        Settings::resolve(
            Some(dir.path().join("config")),
            Some(dir.path().join("work")),
            "dev".to_string(),
            vec!["platform".to_string()],
            60,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_uses_explicit_dirs() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        assert_eq!(settings.config_dir, dir.path().join("config"));
        assert_eq!(settings.claims.groups, vec!["platform"]);
    }

    #[test]
    fn test_build_creates_state_cache() {
        let dir = TempDir::new().unwrap();
        let ctx = settings(&dir).build().unwrap();
        assert_eq!(ctx.claims.subject, "dev");
        assert!(dir.path().join("config").join(SqliteConnectionCache::FILE_NAME).exists());
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        std::fs::create_dir_all(&settings.config_dir).unwrap();
        std::fs::write(settings.config_dir.join(RuleEnforcer::FILE_NAME), "rules: [oops").unwrap();
        assert!(settings.build().is_err());
    }
}
