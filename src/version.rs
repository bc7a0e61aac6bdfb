use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{snippet, PruneError, Result};
use crate::manifest::Manifest;

/// One entry in a GitHub package repository. `name` is the manifest digest.
/// The manifest itself is attached after ingest; it stays `None` when the
/// registry no longer has the manifest (stale pagination).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: i32,
    pub name: String,
    pub url: String,
    pub package_html_url: String,
    pub html_url: String,
    pub created_at: String,
    pub updated_at: String,
    pub metadata: VersionMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(skip)]
    pub manifest: Option<Manifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMetadata {
    pub package_type: String,
    pub container: ContainerMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMetadata {
    /// Tags in API order; order is preserved through every edit.
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Version {
    pub fn decode(payload: &str) -> Result<Version> {
        serde_json::from_str(payload)
            .map_err(|e| PruneError::InvalidJson(format!("{}: {}", e, snippet(payload))))
    }

    pub fn tags(&self) -> &[String] {
        &self.metadata.container.tags
    }

    /// `updated_at` parsed as RFC 3339; unparseable values sort as the epoch.
    pub fn updated_at_or_epoch(&self) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}
