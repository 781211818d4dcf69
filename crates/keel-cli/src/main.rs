//! Keel CLI - register GitOps source repositories and discover their applications

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use keel_core::BackendKind;

mod commands;
mod context;
mod error;
mod exit_codes;

use commands::repo::{CredentialArgs, OutputFormat};
use context::Settings;
use error::Result;

#[derive(Parser)]
#[command(name = "keel")]
#[command(author = "Keel Contributors")]
#[command(version)]
#[command(about = "Register GitOps source repositories and discover their applications", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding repositories.yaml, policy.yaml and the state cache
    #[arg(long, global = true, env = "KEEL_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Directory for repository working trees
    #[arg(long, global = true, env = "KEEL_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Subject the policy is evaluated for
    #[arg(long, global = true, env = "KEEL_SUBJECT", default_value = "admin")]
    subject: String,

    /// Group of the subject (repeatable)
    #[arg(long = "group", global = true)]
    groups: Vec<String>,

    /// Seconds a successful connection test is trusted
    #[arg(long, global = true, env = "KEEL_CACHE_TTL", default_value_t = 300)]
    cache_ttl: u64,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage source repositories
    #[command(subcommand)]
    Repo(RepoCommands),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Git,
    Helm,
}

impl From<Kind> for BackendKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Git => BackendKind::VersionControl,
            Kind::Helm => BackendKind::ChartRepository,
        }
    }
}

#[derive(Subcommand)]
enum RepoCommands {
    /// List repositories with their connection state
    List {
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Register a repository after testing the connection
    Add {
        /// Repository URL
        url: String,

        /// Backend type
        #[arg(long = "type", value_enum, default_value = "git")]
        kind: Kind,

        /// Replace an existing registration with different settings
        #[arg(long)]
        upsert: bool,

        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Change the settings of a registered repository
    Update {
        /// Repository URL
        url: String,

        /// Backend type (defaults to the registered one, which cannot change)
        #[arg(long = "type", value_enum)]
        kind: Option<Kind>,

        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Remove a repository
    #[command(alias = "remove")]
    Rm {
        /// Repository URL
        url: String,
    },

    /// List the applications in a repository
    Apps {
        /// Repository URL
        url: String,

        /// Revision (branch, tag, commit, or chart version)
        #[arg(short, long, default_value = "")]
        revision: String,

        /// Backend type for unregistered repositories
        #[arg(long = "type", value_enum)]
        kind: Option<Kind>,

        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Show the application at a path
    App {
        /// Repository URL
        url: String,

        /// Application path (chart name for chart repositories)
        path: String,

        #[arg(short, long, default_value = "")]
        revision: String,

        #[arg(long = "type", value_enum)]
        kind: Option<Kind>,

        #[arg(short, long, value_enum, default_value = "yaml")]
        output: OutputFormat,
    },

    /// Resolve a revision to a commit or chart version
    Resolve {
        /// Repository URL
        url: String,

        #[arg(short, long, default_value = "")]
        revision: String,

        /// Path (chart name for chart repositories)
        #[arg(short, long, default_value = "")]
        path: String,

        #[arg(long = "type", value_enum)]
        kind: Option<Kind>,
    },
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();

    let default_level = if cli.debug { "keel=debug" } else { "keel=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("KEEL_LOG").unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::resolve(
        cli.config_dir,
        cli.work_dir,
        cli.subject,
        cli.groups,
        cli.cache_ttl,
    )?;
    let ctx = settings.build()?;

    match cli.command {
        Commands::Repo(command) => match command {
            RepoCommands::List { output } => commands::repo::list(&ctx, output).await,

            RepoCommands::Add {
                url,
                kind,
                upsert,
                credentials,
            } => commands::repo::add(&ctx, &url, kind.into(), &credentials, upsert).await,

            RepoCommands::Update {
                url,
                kind,
                credentials,
            } => commands::repo::update(&ctx, &url, kind.map(Into::into), &credentials).await,

            RepoCommands::Rm { url } => commands::repo::remove(&ctx, &url).await,

            RepoCommands::Apps {
                url,
                revision,
                kind,
                output,
            } => commands::repo::apps(&ctx, &url, &revision, kind.map(Into::into), output).await,

            RepoCommands::App {
                url,
                path,
                revision,
                kind,
                output,
            } => {
                commands::repo::app(&ctx, &url, &path, &revision, kind.map(Into::into), output)
                    .await
            }

            RepoCommands::Resolve {
                url,
                revision,
                path,
                kind,
            } => commands::repo::resolve(&ctx, &url, &path, &revision, kind.map(Into::into)).await,
        },
    }
}
