use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{GHCR_URL, MANIFEST_ACCEPT_HEADER, TRANSPORT_RETRIES};
use crate::error::{snippet, PruneError, Result};
use crate::manifest::Manifest;
use crate::registry::auth;

/// Registry operations the engine depends on.
#[async_trait]
pub trait RegistryGateway: Send + Sync {
    /// Fetch a manifest by digest or tag.
    async fn fetch_manifest(&self, reference: &str) -> Result<Manifest>;

    /// Put a manifest under a tag; used by the tag-deletion protocol.
    async fn put_manifest(&self, tag: &str, manifest: &Manifest) -> Result<()>;
}

/// ghcr.io gateway. The Bearer token obtained from the first 401 challenge
/// is kept for the lifetime of the client; a later 401 triggers exactly one
/// re-authentication before surfacing.
pub struct GhcrClient {
    http: Client,
    base_url: String,
    repository: String,
    github_token: String,
    bearer: RwLock<Option<String>>,
}

impl GhcrClient {
    pub fn new(owner: &str, package: &str, github_token: String) -> Result<GhcrClient> {
        let http = Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(GhcrClient {
            http,
            base_url: GHCR_URL.to_string(),
            // Registry paths are lowercase even when the GitHub owner is not
            repository: format!("{}/{}", owner, package).to_lowercase(),
            github_token,
            bearer: RwLock::new(None),
        })
    }

    fn manifest_url(&self, reference: &str) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            self.base_url, self.repository, reference
        )
    }

    async fn bearer(&self) -> Option<String> {
        self.bearer.read().await.clone()
    }

    /// Handle a 401: parse the challenge, exchange it for a token, store it.
    async fn authorize(&self, response: &reqwest::Response) -> Result<()> {
        let header = response
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                PruneError::AuthChallengeInvalid(
                    "401 without a WWW-Authenticate header".to_string(),
                )
            })?;
        let challenge = auth::parse_challenge(header)?;
        let token = auth::exchange_token(&self.http, &challenge, &self.github_token).await?;
        *self.bearer.write().await = Some(token);
        Ok(())
    }
}

#[async_trait]
impl RegistryGateway for GhcrClient {
    async fn fetch_manifest(&self, reference: &str) -> Result<Manifest> {
        let url = self.manifest_url(reference);
        let mut attempt = 0u32;
        let mut reauthenticated = false;
        loop {
            attempt += 1;
            let mut request = self.http.get(&url).header(ACCEPT, MANIFEST_ACCEPT_HEADER);
            if let Some(token) = self.bearer().await {
                request = request.bearer_auth(token);
            }
            let response = match request.send().await {
                Ok(r) => r,
                Err(e) if attempt < TRANSPORT_RETRIES => {
                    warn!(url = %url, attempt, error = %e, "manifest fetch failed, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                reauthenticated = true;
                self.authorize(&response).await?;
                attempt -= 1;
                continue;
            }
            // Stale listings surface as 404, one ghcr path as 400
            if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST {
                return Err(PruneError::ManifestNotFound(reference.to_string()));
            }
            if status.is_server_error() && attempt < TRANSPORT_RETRIES {
                warn!(url = %url, attempt, status = %status, "manifest fetch got server error, retrying");
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(PruneError::Api {
                    status: status.as_u16(),
                    body: snippet(&body),
                });
            }

            let payload = response.text().await?;
            debug!(reference = %reference, bytes = payload.len(), "manifest fetched");
            return Manifest::decode_with_index_fallback(&payload);
        }
    }

    async fn put_manifest(&self, tag: &str, manifest: &Manifest) -> Result<()> {
        let url = self.manifest_url(tag);
        let payload = serde_json::to_string(manifest)
            .map_err(|e| PruneError::InvalidJson(e.to_string()))?;
        let mut attempt = 0u32;
        let mut reauthenticated = false;
        loop {
            attempt += 1;
            let mut request = self
                .http
                .put(&url)
                .header(CONTENT_TYPE, manifest.media_type())
                .body(payload.clone());
            if let Some(token) = self.bearer().await {
                request = request.bearer_auth(token);
            }
            let response = match request.send().await {
                Ok(r) => r,
                Err(e) if attempt < TRANSPORT_RETRIES => {
                    warn!(url = %url, attempt, error = %e, "manifest put failed, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                reauthenticated = true;
                self.authorize(&response).await?;
                attempt -= 1;
                continue;
            }
            if status.is_server_error() && attempt < TRANSPORT_RETRIES {
                warn!(url = %url, attempt, status = %status, "manifest put got server error, retrying");
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(PruneError::Api {
                    status: status.as_u16(),
                    body: snippet(&body),
                });
            }

            debug!(tag = %tag, "manifest put");
            return Ok(());
        }
    }
}
