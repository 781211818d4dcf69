//! Keel Core - shared types for the GitOps repository layer
//!
//! This crate provides the foundational types used throughout Keel:
//! - `RepositoryConfig`: A registered source location with its credentials
//! - `ConnectionState`: Last known outcome of a reachability probe
//! - `AppSourceType`: Packaging format of a discovered application
//! - `revision`: Classification of caller-supplied revisions
//! - `location`: Canonicalization and comparison of repository URLs

pub mod app;
pub mod error;
pub mod location;
pub mod repository;
pub mod revision;

pub use app::{
    AppDetails, AppInfo, AppSourceType, DeclarativeTemplateSpec, OverlayCompositionSpec,
    PackagedChartSpec, TemplateDestination, TemplateEnvironment,
};
pub use error::{CoreError, Result};
pub use location::{is_ssh_url, location_key, normalize, same_location};
pub use repository::{
    BackendKind, ConnectionState, ConnectionStatus, RepositoryConfig, RepositoryCredentials,
};
pub use revision::{RevisionKind, is_full_identifier, is_truncated_identifier};
