//! Credential plumbing for git subprocesses.
//!
//! Secrets never appear on the command line. They are written to a private
//! scratch directory and handed to git through environment variables; the
//! directory is removed when the `AuthEnv` is dropped.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{Result, SourceError};
use keel_core::RepositoryConfig;

const SSH_INSECURE_OPTS: &str = "-o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null";

/// Escapes a token for safe use inside a single-quoted shell string.
pub fn shell_escape_token(token: &str) -> String {
    token.replace('\'', "'\\''")
}

/// Quote a path for a shell command line.
fn shell_quote_path(path: &Path) -> String {
    let escaped = shell_escape_token(&path.display().to_string());
    if escaped.starts_with('-') {
        format!("'./{}'", escaped)
    } else {
        format!("'{}'", escaped)
    }
}

/// Environment for one git invocation.
///
/// Must outlive the command: dropping it deletes the scratch files.
#[derive(Debug)]
pub struct AuthEnv {
    pub env_vars: Vec<(String, String)>,
    _scratch: Option<TempDir>,
}

impl AuthEnv {
    /// Build the git environment for a repository's credentials.
    pub fn for_config(config: &RepositoryConfig) -> Result<Self> {
        let creds = &config.credentials;
        let mut env = vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())];

        let needs_scratch = creds.username.is_some()
            || creds.ssh_private_key.is_some()
            || creds.ca_data.is_some()
            || (creds.tls_client_cert_data.is_some() && creds.tls_client_cert_key.is_some());

        let scratch = if needs_scratch {
            Some(
                tempfile::Builder::new()
                    .prefix("keel-git-auth-")
                    .tempdir()?,
            )
        } else {
            None
        };

        if let Some(dir) = &scratch {
            if let Some(username) = &creds.username {
                let password = creds.password.as_deref().unwrap_or("");
                let script = askpass_script(username, password);
                let path = write_private(dir.path(), "askpass.sh", &script, 0o700)?;
                env.push(("GIT_ASKPASS".to_string(), path_string(&path)?));
            }

            if let Some(key) = &creds.ssh_private_key {
                let mut key = key.clone();
                if !key.ends_with('\n') {
                    key.push('\n');
                }
                let path = write_private(dir.path(), "id_key", &key, 0o600)?;
                let mut command = format!("ssh -i {} -o IdentitiesOnly=yes", shell_quote_path(&path));
                if config.insecure {
                    command.push(' ');
                    command.push_str(SSH_INSECURE_OPTS);
                }
                env.push(("GIT_SSH_COMMAND".to_string(), command));
            }

            if let Some(ca) = &creds.ca_data {
                let path = write_private(dir.path(), "ca.pem", ca, 0o600)?;
                env.push(("GIT_SSL_CAINFO".to_string(), path_string(&path)?));
            }

            if let (Some(cert), Some(key)) = (&creds.tls_client_cert_data, &creds.tls_client_cert_key)
            {
                let cert_path = write_private(dir.path(), "client.crt", cert, 0o600)?;
                let key_path = write_private(dir.path(), "client.key", key, 0o600)?;
                env.push(("GIT_SSL_CERT".to_string(), path_string(&cert_path)?));
                env.push(("GIT_SSL_KEY".to_string(), path_string(&key_path)?));
            }
        }

        if config.insecure {
            env.push(("GIT_SSL_NO_VERIFY".to_string(), "true".to_string()));
            if creds.ssh_private_key.is_none() {
                env.push((
                    "GIT_SSH_COMMAND".to_string(),
                    format!("ssh {}", SSH_INSECURE_OPTS),
                ));
            }
        }

        Ok(Self {
            env_vars: env,
            _scratch: scratch,
        })
    }

    /// Look up a variable this environment sets
    pub fn get(&self, key: &str) -> Option<&str> {
        self.env_vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Askpass helper: git asks for the username first, then the password.
fn askpass_script(username: &str, password: &str) -> String {
    format!(
        r#"#!/bin/sh
case "$1" in
  Username*) echo '{}' ;;
  *) echo '{}' ;;
esac
"#,
        shell_escape_token(username),
        shell_escape_token(password)
    )
}

fn write_private(dir: &Path, name: &str, contents: &str, mode: u32) -> Result<PathBuf> {
    let path = dir.join(name);

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&path)?;
        file.write_all(contents.as_bytes())?;
    }

    #[cfg(not(unix))]
    {
        let _ = mode;
        fs::write(&path, contents)?;
    }

    Ok(path)
}

fn path_string(path: &Path) -> Result<String> {
    path.to_str().map(str::to_string).ok_or_else(|| SourceError::AuthFailed {
        message: "temp directory path contains non-UTF8 characters".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::BackendKind;

    fn config() -> RepositoryConfig {
        RepositoryConfig::new("https://git.example.com/org/repo.git", BackendKind::VersionControl)
    }

    #[test]
    fn test_anonymous_env() {
        let auth = AuthEnv::for_config(&config()).unwrap();
        assert_eq!(auth.get("GIT_TERMINAL_PROMPT"), Some("0"));
        assert!(auth.get("GIT_ASKPASS").is_none());
        assert!(auth.get("GIT_SSH_COMMAND").is_none());
        assert!(auth.get("GIT_SSL_NO_VERIFY").is_none());
    }

    #[test]
    fn test_askpass_written_and_cleaned_up() {
        let mut cfg = config();
        cfg.credentials.username = Some("deploy".to_string());
        cfg.credentials.password = Some("it's-secret".to_string());

        let auth = AuthEnv::for_config(&cfg).unwrap();
        let path = PathBuf::from(auth.get("GIT_ASKPASS").unwrap());
        let script = fs::read_to_string(&path).unwrap();
        assert!(script.contains("Username*) echo 'deploy'"));
        assert!(script.contains("it'\\''s-secret"));

        drop(auth);
        assert!(!path.exists());
    }

    #[test]
    fn test_ssh_key_command() {
        let mut cfg = config();
        cfg.url = "git@github.com:org/repo.git".to_string();
        cfg.credentials.ssh_private_key = Some("-----BEGIN KEY-----".to_string());
        cfg.insecure = true;

        let auth = AuthEnv::for_config(&cfg).unwrap();
        let command = auth.get("GIT_SSH_COMMAND").unwrap();
        assert!(command.starts_with("ssh -i '"));
        assert!(command.contains("IdentitiesOnly=yes"));
        assert!(command.contains("StrictHostKeyChecking=no"));
    }

    #[test]
    fn test_tls_material() {
        let mut cfg = config();
        cfg.credentials.ca_data = Some("CA".to_string());
        cfg.credentials.tls_client_cert_data = Some("CERT".to_string());
        cfg.credentials.tls_client_cert_key = Some("KEY".to_string());

        let auth = AuthEnv::for_config(&cfg).unwrap();
        let ca = auth.get("GIT_SSL_CAINFO").unwrap();
        assert_eq!(fs::read_to_string(ca).unwrap(), "CA");
        assert!(auth.get("GIT_SSL_CERT").is_some());
        assert!(auth.get("GIT_SSL_KEY").is_some());
    }

    #[test]
    fn test_insecure_disables_verification() {
        let mut cfg = config();
        cfg.insecure = true;
        let auth = AuthEnv::for_config(&cfg).unwrap();
        assert_eq!(auth.get("GIT_SSL_NO_VERIFY"), Some("true"));
        assert!(auth.get("GIT_SSH_COMMAND").unwrap().contains("UserKnownHostsFile=/dev/null"));
    }

    #[test]
    fn test_shell_escape_token() {
        assert_eq!(shell_escape_token("simple"), "simple");
        assert_eq!(shell_escape_token("a'b'c"), "a'\\''b'\\''c");
    }
}
