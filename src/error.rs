use thiserror::Error;

pub type Result<T> = std::result::Result<T, PruneError>;

/// Maximum number of payload characters echoed into an error message.
const SNIPPET_LEN: usize = 200;

/// Truncate a payload for inclusion in logs and error messages.
pub fn snippet(payload: &str) -> String {
    if payload.chars().count() <= SNIPPET_LEN {
        payload.to_string()
    } else {
        let cut: String = payload.chars().take(SNIPPET_LEN).collect();
        format!("{}...", cut)
    }
}

#[derive(Error, Debug)]
pub enum PruneError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("manifest not found: {0}")]
    ManifestNotFound(String),

    #[error("invalid auth challenge: {0}")]
    AuthChallengeInvalid(String),

    #[error("token endpoint returned no usable token")]
    AuthFailed,

    #[error("graph inconsistency: {0}")]
    GraphInconsistency(String),

    #[error("cannot link a node to itself")]
    SelfLink,

    #[error("node {child} already has parent {existing}, cannot relink to {proposed}")]
    ConflictingParent {
        child: usize,
        existing: usize,
        proposed: usize,
    },

    #[error("tag deletion failed: {0}")]
    TagDeletion(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("api error: status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("configuration error: {0}")]
    Config(String),
}
