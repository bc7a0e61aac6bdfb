use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{
    MEDIA_TYPE_DOCKER_LIST, MEDIA_TYPE_DOCKER_MANIFEST, MEDIA_TYPE_OCI_INDEX,
    MEDIA_TYPE_OCI_MANIFEST,
};
use crate::error::{snippet, PruneError, Result};

/// Reference to another manifest: an index child, a layer, or a subject.
/// Fields the decoder does not model are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestRef {
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields shared by all four manifest variants. `manifests` is only
/// meaningful on index variants but tolerated everywhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<ManifestRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifests: Option<Vec<ManifestRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<ManifestRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A manifest payload, discriminated by `mediaType`. Media types outside
/// the closed four-type set fail to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mediaType")]
pub enum Manifest {
    #[serde(rename = "application/vnd.oci.image.manifest.v1+json")]
    OciImage(ManifestBody),
    #[serde(rename = "application/vnd.oci.image.index.v1+json")]
    OciIndex(ManifestBody),
    #[serde(rename = "application/vnd.docker.distribution.manifest.v2+json")]
    DockerImage(ManifestBody),
    #[serde(rename = "application/vnd.docker.distribution.manifest.list.v2+json")]
    DockerList(ManifestBody),
}

impl Manifest {
    /// Decode a manifest payload. Missing or unrecognized `mediaType` is an
    /// error here; registry responses without one go through
    /// [`Manifest::decode_with_index_fallback`].
    pub fn decode(payload: &str) -> Result<Manifest> {
        serde_json::from_str(payload)
            .map_err(|e| PruneError::InvalidJson(format!("{}: {}", e, snippet(payload))))
    }

    /// Decode a registry response. ghcr.io occasionally omits `mediaType`
    /// from index manifests; those payloads are treated as OCI indexes.
    pub fn decode_with_index_fallback(payload: &str) -> Result<Manifest> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| PruneError::InvalidJson(format!("{}: {}", e, snippet(payload))))?;
        let Value::Object(mut fields) = value else {
            return Err(PruneError::InvalidJson(format!(
                "manifest payload is not an object: {}",
                snippet(payload)
            )));
        };
        fields
            .entry("mediaType")
            .or_insert_with(|| Value::String(MEDIA_TYPE_OCI_INDEX.to_string()));
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| PruneError::InvalidJson(format!("{}: {}", e, snippet(payload))))
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            Manifest::OciImage(_) => MEDIA_TYPE_OCI_MANIFEST,
            Manifest::OciIndex(_) => MEDIA_TYPE_OCI_INDEX,
            Manifest::DockerImage(_) => MEDIA_TYPE_DOCKER_MANIFEST,
            Manifest::DockerList(_) => MEDIA_TYPE_DOCKER_LIST,
        }
    }

    /// Index variants carry child manifests; the other two carry layers.
    pub fn is_index(&self) -> bool {
        matches!(self, Manifest::OciIndex(_) | Manifest::DockerList(_))
    }

    pub fn body(&self) -> &ManifestBody {
        match self {
            Manifest::OciImage(body)
            | Manifest::OciIndex(body)
            | Manifest::DockerImage(body)
            | Manifest::DockerList(body) => body,
        }
    }

    pub fn body_mut(&mut self) -> &mut ManifestBody {
        match self {
            Manifest::OciImage(body)
            | Manifest::OciIndex(body)
            | Manifest::DockerImage(body)
            | Manifest::DockerList(body) => body,
        }
    }
}
