use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{
    Config, GITHUB_API_URL, GITHUB_API_VERSION, TRANSPORT_RETRIES, VERSIONS_PER_PAGE,
};
use crate::error::{snippet, PruneError, Result};
use crate::version::Version;

/// GitHub Packages operations the engine depends on.
#[async_trait]
pub trait PackagesApi: Send + Sync {
    /// List all active container versions, in API pagination order.
    async fn list_versions(&self) -> Result<Vec<Version>>;

    /// Delete a single version by numeric id.
    async fn delete_version(&self, id: i32) -> Result<()>;
}

/// Which REST route owns the package versions. Organizations have one
/// route; user packages split by visibility (private packages are only
/// reachable through the authenticated-user route).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerRoute {
    Organization,
    UserPublic,
    UserPrivate,
}

pub struct GithubPackages {
    http: Client,
    api_url: String,
    token: String,
    owner: String,
    package: String,
    route: OwnerRoute,
}

impl GithubPackages {
    /// Build the client and discover the owner's route before the first
    /// versions call.
    pub async fn connect(config: &Config) -> Result<GithubPackages> {
        let http = Client::builder()
            .user_agent("ghcr-prune")
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let mut client = GithubPackages {
            http,
            api_url: GITHUB_API_URL.to_string(),
            token: config.token.clone(),
            owner: config.owner.clone(),
            package: config.package.clone(),
            route: OwnerRoute::UserPublic,
        };
        client.route = client.discover_route().await?;
        debug!(owner = %client.owner, route = ?client.route, "packages route discovered");
        Ok(client)
    }

    async fn discover_route(&self) -> Result<OwnerRoute> {
        let url = format!("{}/users/{}", self.api_url, self.owner);
        let body = self.get_json(&url).await?;
        let owner_type = body
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("User")
            .to_string();
        if owner_type == "Organization" {
            return Ok(OwnerRoute::Organization);
        }
        // A user package: probe the authenticated-user route, which is the
        // only one that can see private packages.
        let probe = format!(
            "{}/user/packages/container/{}",
            self.api_url,
            self.encoded_package()
        );
        match self.get_json(&probe).await {
            Ok(_) => Ok(OwnerRoute::UserPrivate),
            Err(_) => Ok(OwnerRoute::UserPublic),
        }
    }

    /// Container package names may contain `/`; the API takes them encoded.
    fn encoded_package(&self) -> String {
        self.package.replace('/', "%2F")
    }

    fn versions_url(&self) -> String {
        let package = self.encoded_package();
        match self.route {
            OwnerRoute::Organization => format!(
                "{}/orgs/{}/packages/container/{}/versions",
                self.api_url, self.owner, package
            ),
            OwnerRoute::UserPublic => format!(
                "{}/users/{}/packages/container/{}/versions",
                self.api_url, self.owner, package
            ),
            OwnerRoute::UserPrivate => format!(
                "{}/user/packages/container/{}/versions",
                self.api_url, package
            ),
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let text = self.request_text(reqwest::Method::GET, url).await?;
        serde_json::from_str(&text)
            .map_err(|e| PruneError::InvalidJson(format!("{}: {}", e, snippet(&text))))
    }

    async fn request_text(&self, method: reqwest::Method, url: &str) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let response = match self
                .http
                .request(method.clone(), url)
                .bearer_auth(&self.token)
                .header(ACCEPT, "application/vnd.github+json")
                .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) if attempt < TRANSPORT_RETRIES => {
                    warn!(url = %url, attempt, error = %e, "api request failed, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status.is_server_error() && attempt < TRANSPORT_RETRIES {
                warn!(url = %url, attempt, status = %status, "api request got server error, retrying");
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(PruneError::Api {
                    status: status.as_u16(),
                    body: snippet(&body),
                });
            }
            return Ok(response.text().await?);
        }
    }
}

#[async_trait]
impl PackagesApi for GithubPackages {
    async fn list_versions(&self) -> Result<Vec<Version>> {
        let mut versions = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}?per_page={}&page={}&state=active",
                self.versions_url(),
                VERSIONS_PER_PAGE,
                page
            );
            let text = self.request_text(reqwest::Method::GET, &url).await?;
            let batch: Vec<Version> = serde_json::from_str(&text)
                .map_err(|e| PruneError::InvalidJson(format!("{}: {}", e, snippet(&text))))?;
            let count = batch.len();
            versions.extend(batch);
            debug!(page, count, total = versions.len(), "versions page loaded");
            if count < VERSIONS_PER_PAGE as usize {
                break;
            }
            page += 1;
        }
        Ok(versions)
    }

    async fn delete_version(&self, id: i32) -> Result<()> {
        let url = format!("{}/{}", self.versions_url(), id);
        self.request_text(reqwest::Method::DELETE, &url).await?;
        debug!(id, "version deleted");
        Ok(())
    }
}
