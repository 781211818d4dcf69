//! Repository management commands

use clap::{Args, ValueEnum};
use console::style;
use serde::Serialize;
use std::path::{Path, PathBuf};

use keel_core::{AppDetails, BackendKind, ConnectionStatus, RepositoryConfig};
use keel_server::AppQuery;

use crate::context::Context;
use crate::error::{CliError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Yaml,
    Json,
}

/// Connection settings shared by `add` and `update`
#[derive(Args, Debug, Default)]
pub struct CredentialArgs {
    /// Display name
    #[arg(long)]
    pub name: Option<String>,

    /// Username for HTTPS or chart repository basic auth
    #[arg(long)]
    pub username: Option<String>,

    /// Password or access token
    #[arg(long, env = "KEEL_REPO_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// PEM private key file for SSH remotes
    #[arg(long)]
    pub ssh_private_key_path: Option<PathBuf>,

    /// PEM client certificate file
    #[arg(long)]
    pub tls_client_cert_path: Option<PathBuf>,

    /// PEM client key file
    #[arg(long)]
    pub tls_client_key_path: Option<PathBuf>,

    /// PEM CA bundle to trust
    #[arg(long)]
    pub ca_path: Option<PathBuf>,

    /// Skip TLS verification and SSH host key checking
    #[arg(long)]
    pub insecure: bool,
}

fn read_pem(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|p| {
        std::fs::read_to_string(p).map_err(|e| CliError::Io {
            message: format!("{}: {}", p.display(), e),
        })
    })
    .transpose()
}

impl CredentialArgs {
    fn to_config(&self, url: &str, kind: BackendKind) -> Result<RepositoryConfig> {
        let mut config = RepositoryConfig::new(url, kind);
        config.name = self.name.clone();
        config.insecure = self.insecure;

        let creds = &mut config.credentials;
        creds.username = self.username.clone();
        creds.password = self.password.clone();
        creds.ssh_private_key = read_pem(self.ssh_private_key_path.as_deref())?;
        creds.tls_client_cert_data = read_pem(self.tls_client_cert_path.as_deref())?;
        creds.tls_client_cert_key = read_pem(self.tls_client_key_path.as_deref())?;
        creds.ca_data = read_pem(self.ca_path.as_deref())?;
        Ok(config)
    }
}

fn print_structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|e| CliError::internal(e.to_string()))?,
        _ => serde_yaml::to_string(value).map_err(|e| CliError::internal(e.to_string()))?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

fn query(url: &str, path: &str, revision: &str, kind: Option<BackendKind>) -> AppQuery {
    let query = AppQuery::new(url).path(path).revision(revision);
    match kind {
        Some(kind) => query.kind(kind),
        None => query,
    }
}

/// List registered repositories
pub async fn list(ctx: &Context, output: OutputFormat) -> Result<()> {
    let repositories = ctx.service.list(&ctx.claims).await?;

    if output != OutputFormat::Table {
        return print_structured(&repositories, output);
    }

    if repositories.is_empty() {
        println!("No repositories configured.");
        println!();
        println!("Add one with: keel repo add <url>");
        return Ok(());
    }

    println!("{:<6} {:<12} {:<20} {}", "TYPE", "STATUS", "NAME", "URL");
    println!("{}", "-".repeat(80));
    for repo in &repositories {
        let state = &repo.connection_state;
        let status = match state.status {
            ConnectionStatus::Successful => style(state.status.to_string()).green(),
            ConnectionStatus::Failed => style(state.status.to_string()).red(),
            ConnectionStatus::Unknown => style(state.status.to_string()).dim(),
        };
        println!(
            "{:<6} {:<12} {:<20} {}",
            repo.kind.as_str(),
            status,
            repo.name.as_deref().unwrap_or("-"),
            repo.url
        );
        if !state.message.is_empty() {
            println!("       {}", style(&state.message).dim());
        }
    }
    Ok(())
}

/// Register a repository
pub async fn add(
    ctx: &Context,
    url: &str,
    kind: BackendKind,
    credentials: &CredentialArgs,
    upsert: bool,
) -> Result<()> {
    let config = credentials.to_config(url, kind)?;
    let created = ctx.service.create(&ctx.claims, config, upsert).await?;
    println!(
        "{} \"{}\" has been added to your repositories ({})",
        style("✓").green(),
        created.url,
        created.kind
    );
    Ok(())
}

/// Replace the settings of a repository
pub async fn update(
    ctx: &Context,
    url: &str,
    kind: Option<BackendKind>,
    credentials: &CredentialArgs,
) -> Result<()> {
    let kind = match kind {
        Some(kind) => kind,
        None => ctx.service.get(&ctx.claims, url).await?.kind,
    };
    let config = credentials.to_config(url, kind)?;
    let updated = ctx.service.update(&ctx.claims, config).await?;
    println!("{} \"{}\" has been updated", style("✓").green(), updated.url);
    Ok(())
}

/// Remove a repository
pub async fn remove(ctx: &Context, url: &str) -> Result<()> {
    ctx.service.delete(&ctx.claims, url).await?;
    println!("\"{}\" has been removed from your repositories", url);
    Ok(())
}

/// List applications found in a repository
pub async fn apps(
    ctx: &Context,
    url: &str,
    revision: &str,
    kind: Option<BackendKind>,
    output: OutputFormat,
) -> Result<()> {
    let apps = ctx
        .service
        .list_apps(&ctx.claims, &query(url, "", revision, kind))
        .await?;

    if output != OutputFormat::Table {
        return print_structured(&apps, output);
    }
    if apps.is_empty() {
        println!("No applications found.");
        return Ok(());
    }

    println!("{:<22} {}", "TYPE", "PATH");
    for app in &apps {
        println!("{:<22} {}", app.app_type.to_string(), app.path);
    }
    Ok(())
}

/// Show details of one application
pub async fn app(
    ctx: &Context,
    url: &str,
    path: &str,
    revision: &str,
    kind: Option<BackendKind>,
    output: OutputFormat,
) -> Result<()> {
    let details = ctx
        .service
        .get_app_details(&ctx.claims, &query(url, path, revision, kind))
        .await?;

    if output != OutputFormat::Table {
        return print_structured(&details, output);
    }

    println!("{} {}", style("Type:").bold(), details.source_type());
    match &details {
        AppDetails::DeclarativeTemplate(spec) => {
            println!("{} {}", style("Name:").bold(), spec.name);
            println!("{} {}", style("Path:").bold(), spec.path);
            for (env, settings) in &spec.environments {
                println!(
                    "  {} -> {} ({})",
                    style(env).cyan(),
                    settings.destination.server,
                    settings.destination.namespace
                );
            }
        }
        AppDetails::PackagedChart(spec) => {
            println!("{} {}", style("Name:").bold(), spec.name);
            println!("{} {}", style("Path:").bold(), spec.path);
            if let Some(version) = &spec.version {
                println!("{} {}", style("Version:").bold(), version);
            }
            if let Some(description) = &spec.description {
                println!("{} {}", style("Description:").bold(), description);
            }
            for file in &spec.value_files {
                println!("  {}", file);
            }
        }
        AppDetails::OverlayComposition(spec) => {
            println!("{} {}", style("Path:").bold(), spec.path);
        }
        AppDetails::PlainDirectory => {}
    }
    Ok(())
}

/// Resolve a revision
pub async fn resolve(
    ctx: &Context,
    url: &str,
    path: &str,
    revision: &str,
    kind: Option<BackendKind>,
) -> Result<()> {
    let resolved = ctx
        .service
        .resolve_revision(&ctx.claims, &query(url, path, revision, kind))
        .await?;
    println!("{}", resolved);
    Ok(())
}
