//! Repository configuration and connection state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::location;

/// A registered source location
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    /// Repository URL (git remote or chart repository base URL)
    pub url: String,

    /// Optional display name (chart repositories use it as their local alias)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Which backend serves this repository
    #[serde(default, rename = "type")]
    pub kind: BackendKind,

    /// Authentication and TLS material
    #[serde(flatten)]
    pub credentials: RepositoryCredentials,

    /// Skip TLS verification and SSH host key checking
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure: bool,

    /// Last known connectivity result (never persisted by stores)
    #[serde(default, skip_serializing_if = "ConnectionState::is_unknown")]
    pub connection_state: ConnectionState,
}

impl RepositoryConfig {
    /// Create an unauthenticated configuration for a URL
    pub fn new(url: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            url: url.into(),
            kind,
            ..Default::default()
        }
    }

    /// Normalized form of the URL, the identity of this repository
    pub fn normalized_url(&self) -> String {
        location::normalize(&self.url)
    }

    /// Reject configurations that can never work, before any network I/O
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() || self.normalized_url().is_empty() {
            return Err(CoreError::InvalidLocation {
                url: self.url.clone(),
            });
        }

        let creds = &self.credentials;
        if creds.password.is_some() && creds.username.is_none() {
            return Err(CoreError::InvalidConfig {
                message: "password supplied without a username".to_string(),
            });
        }
        if creds.tls_client_cert_data.is_some() != creds.tls_client_cert_key.is_some() {
            return Err(CoreError::InvalidConfig {
                message: "TLS client certificate and key must be supplied together".to_string(),
            });
        }

        match self.kind {
            BackendKind::VersionControl => Ok(()),
            BackendKind::ChartRepository => {
                if creds.ssh_private_key.is_some() {
                    return Err(CoreError::InvalidConfig {
                        message: "SSH private keys are not supported for chart repositories"
                            .to_string(),
                    });
                }
                let url = self.url.trim().to_lowercase();
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(CoreError::InvalidConfig {
                        message: format!(
                            "chart repository URL must start with http:// or https://: {}",
                            self.url
                        ),
                    });
                }
                Ok(())
            }
        }
    }

    /// Field-by-field equality of everything except `connection_state`.
    ///
    /// Used to decide whether a repeated registration is a no-op. Every new
    /// field must be added here explicitly.
    pub fn same_spec(&self, other: &RepositoryConfig) -> bool {
        let RepositoryCredentials {
            username,
            password,
            ssh_private_key,
            tls_client_cert_data,
            tls_client_cert_key,
            ca_data,
        } = &self.credentials;

        self.url == other.url
            && self.name == other.name
            && self.kind == other.kind
            && self.insecure == other.insecure
            && *username == other.credentials.username
            && *password == other.credentials.password
            && *ssh_private_key == other.credentials.ssh_private_key
            && *tls_client_cert_data == other.credentials.tls_client_cert_data
            && *tls_client_cert_key == other.credentials.tls_client_cert_key
            && *ca_data == other.credentials.ca_data
    }

    /// Copy without credentials, for listing
    pub fn redacted(&self) -> Self {
        Self {
            url: self.url.clone(),
            name: self.name.clone(),
            kind: self.kind,
            credentials: RepositoryCredentials::default(),
            insecure: self.insecure,
            connection_state: self.connection_state.clone(),
        }
    }
}

impl std::fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("url", &self.url)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("credentials", &self.credentials)
            .field("insecure", &self.insecure)
            .field("connection_state", &self.connection_state)
            .finish()
    }
}

/// Repository backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Git repository
    #[default]
    #[serde(rename = "git")]
    VersionControl,

    /// Helm-style chart repository with index.yaml
    #[serde(rename = "helm")]
    ChartRepository,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::VersionControl => "git",
            BackendKind::ChartRepository => "helm",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "git" => Ok(BackendKind::VersionControl),
            "helm" => Ok(BackendKind::ChartRepository),
            other => Err(CoreError::InvalidConfig {
                message: format!("unknown repository type '{}', expected git or helm", other),
            }),
        }
    }
}

/// Credentials attached to a repository
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// PEM private key for SSH remotes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_private_key: Option<String>,

    /// PEM client certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_client_cert_data: Option<String>,

    /// PEM client certificate key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_client_cert_key: Option<String>,

    /// PEM CA bundle used to verify the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_data: Option<String>,
}

impl RepositoryCredentials {
    pub fn is_empty(&self) -> bool {
        *self == RepositoryCredentials::default()
    }
}

impl std::fmt::Debug for RepositoryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(v: &Option<String>) -> &'static str {
            if v.is_some() { "<redacted>" } else { "<none>" }
        }
        f.debug_struct("RepositoryCredentials")
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .field("ssh_private_key", &mask(&self.ssh_private_key))
            .field("tls_client_cert_data", &mask(&self.tls_client_cert_data))
            .field("tls_client_cert_key", &mask(&self.tls_client_cert_key))
            .field("ca_data", &mask(&self.ca_data))
            .finish()
    }
}

/// Outcome of the last reachability probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub status: ConnectionStatus,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl ConnectionState {
    pub fn successful() -> Self {
        Self {
            status: ConnectionStatus::Successful,
            message: String::new(),
            modified_at: Some(Utc::now()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ConnectionStatus::Failed,
            message: message.into(),
            modified_at: Some(Utc::now()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.status == ConnectionStatus::Unknown
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Unknown,
    Successful,
    Failed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Unknown => "Unknown",
            ConnectionStatus::Successful => "Successful",
            ConnectionStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}
