//! HTTP-backed collaborators
//!
//! The registry core only sees the [`MatchOracle`], [`AccountManager`] and
//! [`Provisioner`] traits. These implementations reach the game backend and
//! the allocator over HTTP with one shared `reqwest` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

use matchdir_core::{AccountManager, MatchOracle, Provisioner, RegistryError, Result};

/// Build the shared outbound client
pub fn http_client(timeout_ms: u64) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
}

fn parse_base(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| RegistryError::MalformedRequest {
        reason: format!("invalid url '{}': {}", url, e),
    })
}

/// `base` with `segments` appended, each percent-encoded
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| RegistryError::MalformedRequest {
            reason: format!("url '{}' cannot carry a path", base),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Asks the game backend whether a match exists
///
/// `GET {base}/matches/{match_id}`: any 2xx means live, 404 means gone,
/// everything else (including transport errors) is unreachable.
pub struct HttpMatchOracle {
    client: Client,
    base: Url,
}

impl HttpMatchOracle {
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            base: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl MatchOracle for HttpMatchOracle {
    async fn match_exists(&self, match_id: &str) -> Result<bool> {
        let url = endpoint(&self.base, &["matches", match_id])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::OracleUnavailable {
                reason: e.to_string(),
            })?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(RegistryError::OracleUnavailable {
                reason: format!("match lookup returned {}", status),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Deletes owner accounts on the game backend
///
/// `DELETE {base}/accounts/{owner_id}`; a 404 counts as already removed.
pub struct HttpAccountManager {
    client: Client,
    base: Url,
}

impl HttpAccountManager {
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            base: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl AccountManager for HttpAccountManager {
    async fn delete_owner(&self, owner_id: &str) -> Result<()> {
        let url = endpoint(&self.base, &["accounts", owner_id])?;
        let cleanup_failed = |reason: String| RegistryError::AccountCleanupFailed {
            owner_id: owner_id.to_string(),
            reason,
        };

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| cleanup_failed(e.to_string()))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(cleanup_failed(format!("account service returned {}", status)))
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Fire-and-forget `HEAD {url}?query={namespace}` to the allocator
///
/// The request runs on its own task so a slow allocator never delays the
/// caller; failures are logged only.
pub struct HttpProvisioner {
    client: Client,
    url: Url,
}

impl HttpProvisioner {
    pub fn new(client: Client, url: &str) -> Result<Self> {
        Ok(Self {
            client,
            url: parse_base(url)?,
        })
    }

    fn request_url(&self, namespace: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("query", namespace);
        url
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn request_match(&self, namespace: &str) {
        let url = self.request_url(namespace);
        let client = self.client.clone();
        let namespace = namespace.to_string();

        tokio::spawn(async move {
            match client.head(url).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(namespace = %namespace, "provision request accepted");
                }
                Ok(response) => {
                    tracing::warn!(
                        namespace = %namespace,
                        status = %response.status(),
                        "provision request rejected"
                    );
                }
                Err(e) => {
                    tracing::warn!(namespace = %namespace, error = %e, "provision request failed");
                }
            }
        });
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
