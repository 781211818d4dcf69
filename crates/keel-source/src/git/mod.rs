//! Git remote backend
//!
//! Drives the `git` CLI. Every invocation gets its own credential
//! environment (see [`auth`]) and runs without a terminal.

pub mod auth;
pub mod refs;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

use keel_core::{BackendKind, RepositoryConfig, RevisionKind};

use crate::client::SourceClient;
use crate::error::{Result, SourceError};
use crate::files::list_matching;
use auth::AuthEnv;
use refs::{RefMatch, match_revision, parse_ls_remote};

/// Git's name for the remote's default branch
pub const HEAD: &str = "HEAD";

/// Client for one git remote
pub struct GitClient {
    config: RepositoryConfig,
    work_dir: PathBuf,
}

impl GitClient {
    pub fn new(config: RepositoryConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            work_dir: work_dir.into(),
        }
    }

    /// Checks if the working directory holds a repository.
    pub fn is_git_repo(&self) -> bool {
        self.work_dir.join(".git").exists()
    }

    /// Refs advertised by the remote
    pub async fn ls_remote(&self) -> Result<Vec<refs::RemoteRef>> {
        let output = self
            .run_git(&["ls-remote", self.config.url.as_str()], None)
            .await?;
        Ok(parse_ls_remote(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Commit currently checked out, if any
    pub async fn head_commit(&self) -> Result<String> {
        let output = self
            .run_git(&["rev-parse", HEAD], Some(&self.work_dir))
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Initialize the working directory and point `origin` at the remote.
    async fn ensure_repository(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        if !self.is_git_repo() {
            self.run_git(&["init", "--quiet"], Some(&self.work_dir))
                .await?;
            self.run_git(
                &["remote", "add", "origin", self.config.url.as_str()],
                Some(&self.work_dir),
            )
            .await?;
            return Ok(());
        }

        let current = self
            .run_git(&["remote", "get-url", "origin"], Some(&self.work_dir))
            .await;
        match current {
            Ok(output) if String::from_utf8_lossy(&output.stdout).trim() == self.config.url => {}
            Ok(_) => {
                self.run_git(
                    &["remote", "set-url", "origin", self.config.url.as_str()],
                    Some(&self.work_dir),
                )
                .await?;
            }
            Err(_) => {
                self.run_git(
                    &["remote", "add", "origin", self.config.url.as_str()],
                    Some(&self.work_dir),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn run_git(&self, args: &[&str], cwd: Option<&Path>) -> Result<Output> {
        let auth = AuthEnv::for_config(&self.config)?;

        let mut cmd = Command::new("git");
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &auth.env_vars {
            cmd.env(key, value);
        }

        debug!(command = %args.first().copied().unwrap_or_default(), "running git");
        let output = cmd.output().await.map_err(|e| SourceError::Git {
            message: format!("failed to run git: {}", e),
        })?;

        drop(auth);

        if output.status.success() {
            Ok(output)
        } else {
            Err(SourceError::Git {
                message: format_git_error(&output),
            })
        }
    }
}

#[async_trait]
impl SourceClient for GitClient {
    fn url(&self) -> &str {
        &self.config.url
    }

    fn kind(&self) -> BackendKind {
        BackendKind::VersionControl
    }

    fn working_directory(&self) -> &Path {
        &self.work_dir
    }

    fn default_revision(&self) -> &'static str {
        HEAD
    }

    async fn test(&self) -> Result<()> {
        self.run_git(&["ls-remote", self.config.url.as_str(), HEAD], None)
            .await?;
        Ok(())
    }

    async fn resolve_revision(&self, _path_glob: &str, revision: &str) -> Result<String> {
        let kind = RevisionKind::classify(revision);
        if kind == RevisionKind::Full {
            return Ok(revision.to_string());
        }

        let wanted = if kind == RevisionKind::Latest {
            HEAD
        } else {
            revision
        };
        let refs = self.ls_remote().await?;

        match match_revision(&refs, wanted) {
            RefMatch::Found(commit) => {
                debug!(revision = %wanted, commit = %commit, "resolved revision");
                Ok(commit)
            }
            RefMatch::Ambiguous(commits) => Err(SourceError::UnresolvableRevision {
                revision: wanted.to_string(),
                reason: format!("ambiguous, matches commits {}", commits.join(", ")),
            }),
            RefMatch::NotFound if kind == RevisionKind::Truncated => Ok(revision.to_string()),
            RefMatch::NotFound => Err(SourceError::UnresolvableRevision {
                revision: wanted.to_string(),
                reason: "no matching branch or tag".to_string(),
            }),
        }
    }

    async fn checkout(&self, path_glob: &str, revision: &str) -> Result<String> {
        let revision = match RevisionKind::classify(revision) {
            RevisionKind::Full | RevisionKind::Truncated => revision.to_lowercase(),
            RevisionKind::Latest | RevisionKind::Symbolic => {
                self.resolve_revision(path_glob, revision).await?
            }
        };

        self.ensure_repository().await?;

        if let Ok(head) = self.head_commit().await {
            if head.starts_with(&revision) {
                debug!(commit = %head, "working tree already at revision");
                return Ok(head);
            }
        }

        self.run_git(
            &["fetch", "--quiet", "--tags", "--force", "origin"],
            Some(&self.work_dir),
        )
        .await?;
        self.run_git(
            &["checkout", "--quiet", "--force", revision.as_str()],
            Some(&self.work_dir),
        )
        .await?;
        self.run_git(&["clean", "-fdx", "--quiet"], Some(&self.work_dir))
            .await?;

        self.head_commit().await
    }

    async fn list_files(&self, pattern: &str) -> Result<Vec<String>> {
        list_matching(&self.work_dir, pattern)
    }
}

/// Formats a git error with both stdout and stderr.
pub fn format_git_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!(
            "command failed with exit code {}",
            output.status.code().unwrap_or(-1)
        ),
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}
