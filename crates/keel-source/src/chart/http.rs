//! HTTP transport for chart repositories
//!
//! Redirects are followed by hand so credentials only ever travel to the
//! origin they were configured for.

use std::time::Duration;

use base64::Engine;
use reqwest::{Certificate, Identity, StatusCode};
use url::Url;

use crate::error::{Result, SourceError};
use keel_core::RepositoryConfig;

/// Request timeout for index and archive downloads
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

const MAX_REDIRECTS: u32 = 10;

/// Basic credentials bound to the origin of the repository URL
#[derive(Clone)]
struct ScopedBasicAuth {
    origin: String,
    header: String,
}

/// HTTP client carrying one repository's credentials and TLS settings
pub struct ChartHttpClient {
    client: reqwest::Client,
    auth: Option<ScopedBasicAuth>,
}

impl ChartHttpClient {
    /// Build a client from a repository config
    pub fn for_config(config: &RepositoryConfig) -> Result<Self> {
        let creds = &config.credentials;

        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(config.insecure);

        if let Some(ca) = &creds.ca_data {
            let cert = Certificate::from_pem(ca.as_bytes()).map_err(|e| SourceError::InvalidTls {
                message: format!("CA data: {}", e),
            })?;
            builder = builder.add_root_certificate(cert);
        }

        if let (Some(cert), Some(key)) = (&creds.tls_client_cert_data, &creds.tls_client_cert_key) {
            let pem = format!("{}\n{}", key.trim_end(), cert.trim_end());
            let identity = Identity::from_pem(pem.as_bytes()).map_err(|e| SourceError::InvalidTls {
                message: format!("client certificate: {}", e),
            })?;
            builder = builder.identity(identity);
        }

        let client = builder.build().map_err(|e| SourceError::NetworkError {
            message: e.to_string(),
        })?;

        let auth = match &creds.username {
            Some(username) => {
                let password = creds.password.as_deref().unwrap_or("");
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                Some(ScopedBasicAuth {
                    origin: origin_of(&config.url).unwrap_or_default(),
                    header: format!("Basic {}", encoded),
                })
            }
            None => None,
        };

        Ok(Self { client, auth })
    }

    /// Fetch a URL, following redirects without leaking credentials
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let mut current_url = url.to_string();
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(&current_url);

            if let Some(auth) = &self.auth {
                if origin_of(&current_url).as_deref() == Some(auth.origin.as_str()) {
                    request = request.header("Authorization", &auth.header);
                } else {
                    tracing::warn!(
                        url = %current_url,
                        "cross-origin request, credentials not forwarded"
                    );
                }
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    return Err(SourceError::NetworkError {
                        message: format!("Too many redirects (max {})", MAX_REDIRECTS),
                    });
                }

                let location = response
                    .headers()
                    .get("Location")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| SourceError::NetworkError {
                        message: "Redirect without Location header".to_string(),
                    })?;

                let base = Url::parse(&current_url)?;
                current_url = base.join(location)?.to_string();
                continue;
            }

            if status == StatusCode::UNAUTHORIZED {
                return Err(SourceError::AuthRequired { url: current_url });
            }
            if status == StatusCode::FORBIDDEN {
                return Err(SourceError::AuthFailed {
                    message: format!("Access denied to {}", current_url),
                });
            }
            if !status.is_success() {
                return Err(SourceError::HttpError {
                    status: status.as_u16(),
                    message: format!("Request to {} failed", current_url),
                });
            }

            return Ok(response);
        }
    }

    /// Fetch bytes from URL
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// `scheme://host:port` with the port made explicit
fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    Some(format!(
        "{}://{}:{}",
        parsed.scheme(),
        parsed.host_str()?,
        parsed.port_or_known_default()?
    ))
}
