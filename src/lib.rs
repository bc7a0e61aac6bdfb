pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod manifest;
pub mod packages;
pub mod registry;
pub mod select;
pub mod tree;
pub mod version;

use std::sync::Arc;

pub use config::{Config, LogLevel};
pub use error::{PruneError, Result};
pub use executor::{PruneExecutor, RunSummary};
pub use graph::{ArtifactKind, Forest};
pub use manifest::{Manifest, ManifestRef};
pub use select::{Plan, SelectionRules};
pub use version::Version;

use packages::GithubPackages;
use registry::GhcrClient;

/// Run a prune with the given configuration against the live GitHub
/// Packages API and ghcr.io.
pub async fn run(config: Config) -> Result<RunSummary> {
    let registry = Arc::new(GhcrClient::new(
        &config.owner,
        &config.package,
        config.token.clone(),
    )?);
    let packages = Arc::new(GithubPackages::connect(&config).await?);
    let executor = PruneExecutor::new(registry, packages, config.rules(), config.dry_run);
    executor.run().await
}
