use std::collections::HashMap;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{PruneError, Result};

/// Parsed Bearer challenge from a `WWW-Authenticate` header. All three
/// attributes must be present for the challenge to be usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: String,
    pub scope: String,
}

/// Parse a header of the form
/// `Bearer realm="…",service="…",scope="…"`. Values may be quoted or
/// bare; whitespace around pairs is tolerated.
pub fn parse_challenge(header: &str) -> Result<BearerChallenge> {
    let attrs_str = header.trim().strip_prefix("Bearer ").unwrap_or(header);

    let mut attrs = HashMap::new();
    for part in attrs_str.split(',') {
        let part = part.trim();
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        attrs.insert(key.trim().to_string(), value.to_string());
    }

    match (
        attrs.remove("realm"),
        attrs.remove("service"),
        attrs.remove("scope"),
    ) {
        (Some(realm), Some(service), Some(scope)) => Ok(BearerChallenge {
            realm,
            service,
            scope,
        }),
        _ => Err(PruneError::AuthChallengeInvalid(header.to_string())),
    }
}

/// Token endpoint URL for a parsed challenge.
pub fn token_url(challenge: &BearerChallenge) -> String {
    format!(
        "{}?service={}&scope={}",
        challenge.realm, challenge.service, challenge.scope
    )
}

/// Exchange the challenge for a Bearer token with HTTP Basic credentials
/// (`token` / the configured GitHub token).
pub async fn exchange_token(
    http: &Client,
    challenge: &BearerChallenge,
    github_token: &str,
) -> Result<String> {
    let url = token_url(challenge);
    debug!(url = %url, "exchanging auth challenge for registry token");

    let response = http
        .get(&url)
        .basic_auth("token", Some(github_token))
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(PruneError::AuthFailed);
    }

    let body: Value = response.json().await?;
    // ghcr.io returns "token"; some registries use "access_token"
    body.get("token")
        .and_then(Value::as_str)
        .or_else(|| body.get("access_token").and_then(Value::as_str))
        .map(str::to_string)
        .ok_or(PruneError::AuthFailed)
}
