//! Keel Server - repository registration and application discovery
//!
//! This crate provides the service layer the CLI (or an RPC front end) calls:
//!
//! - **RepositoryService**: list, register, update and remove repositories,
//!   discover applications and read their details
//! - **Stores**: registrations in memory or in a `repositories.yaml` file
//! - **Connection cache**: last probe outcome per location, in memory or SQLite
//! - **Policy**: per-request authorization, allow-all or rule based
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keel_core::{BackendKind, RepositoryConfig};
//! use keel_server::{
//!     AllowAll, Claims, MemoryConnectionCache, MemoryRepositoryStore, RepositoryService,
//!     ServiceSettings,
//! };
//! use keel_source::DefaultClientFactory;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = RepositoryService::new(
//!     Arc::new(MemoryRepositoryStore::new()),
//!     Arc::new(MemoryConnectionCache::new()),
//!     Arc::new(AllowAll),
//!     Arc::new(DefaultClientFactory),
//!     ServiceSettings { work_dir_root: "/tmp/keel".into() },
//! );
//!
//! let claims = Claims::new("admin");
//! let config = RepositoryConfig::new("https://github.com/argoproj/argocd-example-apps", BackendKind::VersionControl);
//! service.create(&claims, config, false).await?;
//! for repo in service.list(&claims).await? {
//!     println!("{} {}", repo.url, repo.connection_state.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod policy;
pub mod service;
pub mod store;

pub use cache::{ConnectionStateCache, MemoryConnectionCache, SqliteConnectionCache};
pub use error::{Result, ServiceError};
pub use policy::{Action, AllowAll, Claims, Effect, Enforcer, PolicyRule, RESOURCE_REPOSITORIES, RuleEnforcer};
pub use service::{AppQuery, RepositoryService, ServiceSettings};
pub use store::{
    FileRepositoryStore, MemoryRepositoryStore, OperationCounts, RepositoryList, RepositoryStore,
};
