//! Application discovery
//!
//! Marker files decide what kind of application a directory holds:
//! - `app.yaml` with a `components/params.libsonnet` beside it: declarative template
//! - `Chart.yaml`: packaged chart
//! - a kustomization file: overlay composition
//!
//! Globs use `*` across directory separators, so a marker anywhere below
//! the requested path is found.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tracing::debug;

use keel_core::{AppInfo, AppSourceType};

use crate::client::SourceClient;
use crate::error::Result;

pub const TEMPLATE_MANIFEST: &str = "app.yaml";
pub const TEMPLATE_PARAMS: &str = "components/params.libsonnet";
pub const CHART_MANIFEST: &str = "Chart.yaml";
/// Accepted kustomization file names, in lookup order
pub const OVERLAY_MANIFESTS: [&str; 3] = ["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// Applications found under a path at one revision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectedApps {
    /// Revision the working tree was checked out at
    pub revision: String,
    /// Manifest path to application type
    pub manifests: BTreeMap<String, AppSourceType>,
}

impl DetectedApps {
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// One entry per manifest, located at the manifest's directory
    pub fn apps(&self) -> Vec<AppInfo> {
        self.manifests
            .iter()
            .map(|(manifest, app_type)| AppInfo {
                path: dir_of(manifest),
                app_type: *app_type,
            })
            .collect()
    }

    /// The manifest describing the application at `root`.
    ///
    /// A manifest directly in `root` wins over nested ones; after that
    /// chart beats overlay beats template, then path order.
    pub fn best_match(&self, root: &str) -> Option<(&str, AppSourceType)> {
        let root = clean_path(root);
        self.manifests
            .iter()
            .min_by_key(|(manifest, app_type)| {
                (dir_of(manifest) != root, app_type.priority(), manifest.as_str())
            })
            .map(|(manifest, app_type)| (manifest.as_str(), *app_type))
    }
}

/// Detect every application under `sub_path` at `revision`.
///
/// Resolves and checks out the revision first, so the working tree is
/// materialized when this returns.
pub async fn detect_apps(
    client: &dyn SourceClient,
    revision: &str,
    sub_path: &str,
) -> Result<DetectedApps> {
    let resolved = client.resolve_revision(sub_path, revision).await?;
    let revision = client.checkout(sub_path, &resolved).await?;

    let mut manifests = BTreeMap::new();

    let templates = client
        .list_files(&join(sub_path, &format!("*{}", TEMPLATE_MANIFEST)))
        .await?;
    if !templates.is_empty() {
        let params = client
            .list_files(&join(sub_path, &format!("*{}", TEMPLATE_PARAMS)))
            .await?;
        let component_dirs: BTreeSet<String> =
            params.iter().map(|p| dir_of(&dir_of(p))).collect();
        for manifest in templates {
            if component_dirs.contains(&dir_of(&manifest)) {
                manifests.insert(manifest, AppSourceType::DeclarativeTemplate);
            }
        }
    }

    for manifest in client
        .list_files(&join(sub_path, &format!("*{}", CHART_MANIFEST)))
        .await?
    {
        manifests.insert(manifest, AppSourceType::PackagedChart);
    }

    for name in OVERLAY_MANIFESTS {
        let found = client.list_files(&join(sub_path, &format!("*{}", name))).await?;
        if found.is_empty() {
            continue;
        }
        for manifest in found {
            manifests.insert(manifest, AppSourceType::OverlayComposition);
        }
        break;
    }

    debug!(path = %sub_path, revision = %revision, apps = manifests.len(), "detected applications");
    Ok(DetectedApps {
        revision,
        manifests,
    })
}

/// Directory of a `/`-separated path, `.` at the root
pub fn dir_of(path: &str) -> String {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((dir, _)) => dir.to_string(),
        None => ".".to_string(),
    }
}

/// Repository-relative form of a caller path: no leading `./` or `/`, `.` for the root
pub fn clean_path(path: &str) -> String {
    let trimmed = path
        .trim()
        .trim_start_matches("./")
        .trim_start_matches('/')
        .trim_end_matches('/');
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Join a sub-path and a pattern
pub fn join(sub_path: &str, pattern: &str) -> String {
    match clean_path(sub_path).as_str() {
        "." => pattern.to_string(),
        dir => format!("{}/{}", dir, pattern),
    }
}
