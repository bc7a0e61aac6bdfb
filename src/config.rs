use regex_lite::Regex;

use crate::error::{PruneError, Result};
use crate::select::SelectionRules;

// Constants for hardcoded values
/// OCI single-arch image manifest media type
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// OCI multi-arch image index media type
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Docker schema 2 single-arch manifest media type
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Docker schema 2 manifest list media type
pub const MEDIA_TYPE_DOCKER_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Layer media type used by in-toto attestations
pub const MEDIA_TYPE_IN_TOTO: &str = "application/vnd.in-toto+json";

/// Default manifest Accept header for registry requests
/// Must include manifest list types FIRST to get multi-arch images
pub const MANIFEST_ACCEPT_HEADER: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.oci.image.manifest.v1+json";

/// GitHub REST API base URL
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// ghcr.io registry base URL
pub const GHCR_URL: &str = "https://ghcr.io";

/// REST API version header value sent with every Packages call
pub const GITHUB_API_VERSION: &str = "2022-11-28";

/// Page size for version listing
pub const VERSIONS_PER_PAGE: u32 = 100;

/// Worker pool size for version deletions (stays below the API rate limit)
pub const DELETE_CONCURRENCY: usize = 3;

/// Attempts per HTTP operation before a transient failure surfaces
pub const TRANSPORT_RETRIES: u32 = 3;

/// Log verbosity for the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

impl LogLevel {
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub token with `packages: write`
    pub token: String,
    pub owner: String,
    pub repository: String,
    pub package: String,
    pub include_tags: Option<Regex>,
    pub exclude_tags: Option<Regex>,
    pub keep_n_tagged: Option<usize>,
    pub keep_n_untagged: Option<usize>,
    pub dry_run: bool,
    pub log_level: LogLevel,
}

/// Read an action input: `INPUT_<NAME>` with dashes upper-snaked.
/// Empty values count as unset.
fn input(name: &str) -> Option<String> {
    let key = format!("INPUT_{}", name.to_uppercase().replace('-', "_"));
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_regex(name: &str) -> Result<Option<Regex>> {
    match input(name) {
        Some(pattern) => Regex::new(&pattern)
            .map(Some)
            .map_err(|e| PruneError::Config(format!("bad {} pattern `{}`: {}", name, pattern, e))),
        None => Ok(None),
    }
}

fn parse_count(name: &str) -> Result<Option<usize>> {
    match input(name) {
        Some(raw) => raw
            .parse::<usize>()
            .map(Some)
            .map_err(|_| {
                PruneError::Config(format!("{} must be a non-negative integer, got `{}`", name, raw))
            }),
        None => Ok(None),
    }
}

impl Config {
    /// Load configuration from the environment. Inputs follow the GitHub
    /// Actions convention (`INPUT_*`), with workflow-context fallbacks for
    /// owner, repository, and package.
    pub fn from_env() -> Result<Config> {
        let token = input("token")
            .or_else(|| env("GITHUB_TOKEN"))
            .ok_or_else(|| PruneError::Config("token is required".to_string()))?;

        let repository = input("repository")
            .or_else(|| env("GITHUB_REPOSITORY"))
            .ok_or_else(|| PruneError::Config("repository is required".to_string()))?;

        let owner = input("owner")
            .or_else(|| env("GITHUB_REPOSITORY_OWNER"))
            .or_else(|| repository.split('/').next().map(str::to_string))
            .filter(|o| !o.is_empty())
            .ok_or_else(|| PruneError::Config("owner is required".to_string()))?;

        // Default package name: the repository name
        let package = input("package")
            .or_else(|| repository.split('/').nth(1).map(str::to_string))
            .filter(|p| !p.is_empty())
            .ok_or_else(|| PruneError::Config("package is required".to_string()))?;

        let log_level = match input("log-level") {
            Some(raw) => raw.parse::<LogLevel>().map_err(PruneError::Config)?,
            None => LogLevel::default(),
        };

        Ok(Config {
            token,
            owner,
            repository,
            package,
            include_tags: parse_regex("include-tags")?,
            exclude_tags: parse_regex("exclude-tags")?,
            keep_n_tagged: parse_count("keep-n-tagged")?,
            keep_n_untagged: parse_count("keep-n-untagged")?,
            // Any non-empty value enables dry-run
            dry_run: input("dry-run").is_some(),
            log_level,
        })
    }

    /// Selection knobs consumed by the planner.
    pub fn rules(&self) -> SelectionRules {
        SelectionRules {
            include_tags: self.include_tags.clone(),
            exclude_tags: self.exclude_tags.clone(),
            keep_n_tagged: self.keep_n_tagged,
            keep_n_untagged: self.keep_n_untagged,
        }
    }
}
