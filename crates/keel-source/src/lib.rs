//! Keel Source - access to git remotes and chart repositories
//!
//! This crate provides:
//! - `SourceClient`: resolve, check out, and list files of a repository
//! - `GitClient`: git remotes driven through the `git` CLI
//! - `ChartRepoClient`: chart repositories served over HTTP(S)
//! - `detect_apps`: discovery of deployable applications in a working tree

pub mod chart;
pub mod client;
pub mod detect;
pub mod error;
pub mod files;
pub mod git;

pub use chart::ChartRepoClient;
pub use client::{ClientFactory, DefaultClientFactory, SourceClient, test_repository};
pub use detect::{DetectedApps, clean_path, detect_apps, dir_of};
pub use error::{Result, SourceError};
pub use git::GitClient;
