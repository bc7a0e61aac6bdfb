use std::sync::Arc;
use std::time::Instant;

use futures::future;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::DELETE_CONCURRENCY;
use crate::error::{PruneError, Result};
use crate::graph::Forest;
use crate::packages::PackagesApi;
use crate::registry::RegistryGateway;
use crate::select::{self, Plan, SelectionRules};
use crate::version::Version;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tags_deleted: usize,
    pub versions_deleted: usize,
    pub failures: usize,
    pub dry_run: bool,
}

/// Orchestrates a prune run: load versions, build the forest, compute the
/// plan, apply it. The gateways are injected so the whole loop runs
/// against fakes in tests.
pub struct PruneExecutor<R, P> {
    registry: Arc<R>,
    packages: Arc<P>,
    rules: SelectionRules,
    dry_run: bool,
}

impl<R: RegistryGateway + 'static, P: PackagesApi + 'static> PruneExecutor<R, P> {
    pub fn new(registry: Arc<R>, packages: Arc<P>, rules: SelectionRules, dry_run: bool) -> Self {
        PruneExecutor {
            registry,
            packages,
            rules,
            dry_run,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        if self.dry_run {
            info!("dry-run enabled: no registry or API writes will happen");
        }

        let versions = self.load_versions().await?;
        let mut forest = Forest::build(versions)?;
        info!(
            versions = forest.len(),
            roots = forest.roots().len(),
            "forest built"
        );

        let plan = select::plan(&forest, &self.rules);
        info!(
            tags = plan.tags_delete.len(),
            versions = plan.versions_delete.len(),
            "deletion plan computed"
        );
        self.log_plan(&forest, &plan);

        // Tag deletions are sequential: each one mutates the version list
        // and requires a re-list. Any failure here is fatal because the
        // in-memory model would diverge from the registry.
        let mut tags_deleted = 0usize;
        for tag in &plan.tags_delete {
            self.delete_tag(&mut forest, tag).await?;
            tags_deleted += 1;
        }

        let (versions_deleted, failures) = self.delete_versions(&mut forest, &plan).await?;

        let summary = RunSummary {
            tags_deleted,
            versions_deleted,
            failures,
            dry_run: self.dry_run,
        };
        info!(
            tags = summary.tags_deleted,
            versions = summary.versions_deleted,
            failures = summary.failures,
            dry_run = summary.dry_run,
            "prune run finished"
        );
        info!(
            "[TIMING] prune run completed in {}ms",
            started.elapsed().as_millis()
        );
        Ok(summary)
    }

    /// Load the version list and attach each manifest. A version whose
    /// manifest is gone from the registry stays in the set without one so
    /// it can still be deleted by id.
    async fn load_versions(&self) -> Result<Vec<Version>> {
        let load_started = Instant::now();
        let raw = self.packages.list_versions().await?;
        let mut versions = Vec::with_capacity(raw.len());
        for mut version in raw {
            match self.registry.fetch_manifest(&version.name).await {
                Ok(manifest) => version.manifest = Some(manifest),
                Err(PruneError::ManifestNotFound(_)) => {
                    warn!(
                        digest = %version.name,
                        id = version.id,
                        "manifest missing from registry, version kept without one"
                    );
                }
                Err(e) => return Err(e),
            }
            versions.push(version);
        }
        info!(
            "[TIMING] version load completed in {}ms",
            load_started.elapsed().as_millis()
        );
        Ok(versions)
    }

    /// Render the version-delete plan as trees, one per scheduled version
    /// that is not itself under another scheduled version.
    fn log_plan(&self, forest: &Forest, plan: &Plan) {
        if plan.versions_delete.is_empty() {
            info!("no versions scheduled for deletion");
            return;
        }
        let scheduled: Vec<usize> = plan
            .versions_delete
            .iter()
            .filter_map(|digest| forest.lookup(digest))
            .collect();
        info!("versions scheduled for deletion:");
        for &slot in &scheduled {
            let under_scheduled_parent = forest
                .node(slot)
                .parent
                .map(|p| scheduled.contains(&p))
                .unwrap_or(false);
            if under_scheduled_parent {
                continue;
            }
            forest.render_subtree(slot, &mut |line| info!("{}", line));
        }
    }

    /// ghcr.io has no DELETE-tag API. The tag is detached by pushing a
    /// ghost manifest (the owner's manifest with its references emptied)
    /// under the tag, then deleting the temporary version that push created.
    async fn delete_tag(&self, forest: &mut Forest, tag: &str) -> Result<()> {
        let Some(slot) = forest.lookup(tag) else {
            warn!(tag = %tag, "tag not in forest, skipping");
            return Ok(());
        };
        if self.dry_run {
            info!(tag = %tag, "dry-run: would delete tag");
            forest.remove_tag(tag);
            return Ok(());
        }

        let owner_digest = forest.version(slot).name.clone();
        let Some(manifest) = forest.version(slot).manifest.clone() else {
            return Err(PruneError::TagDeletion(format!(
                "owner {} of tag {} has no manifest to rewrite",
                owner_digest, tag
            )));
        };

        let mut ghost = manifest;
        {
            let body = ghost.body_mut();
            if body.manifests.as_deref().is_some_and(|m| !m.is_empty()) {
                body.manifests = Some(Vec::new());
            } else {
                body.layers = Some(Vec::new());
            }
        }
        self.registry.put_manifest(tag, &ghost).await?;

        // The push created a new version that now carries the tag
        let listed = self.packages.list_versions().await?;
        let ghost_version = listed
            .into_iter()
            .find(|v| v.name != owner_digest && v.tags().iter().any(|t| t == tag))
            .ok_or_else(|| {
                PruneError::TagDeletion(format!(
                    "no temporary version carrying tag {} after manifest push",
                    tag
                ))
            })?;
        self.packages.delete_version(ghost_version.id).await?;

        forest.remove_tag(tag);
        info!(tag = %tag, "tag deleted");
        Ok(())
    }

    /// Delete planned versions through a bounded worker pool. Workers only
    /// perform the HTTP delete; the forest and key index are updated here
    /// once results come back, then relinked over the reduced set.
    async fn delete_versions(&self, forest: &mut Forest, plan: &Plan) -> Result<(usize, usize)> {
        if plan.versions_delete.is_empty() {
            return Ok((0, 0));
        }
        let delete_started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(DELETE_CONCURRENCY));
        let mut handles = Vec::with_capacity(plan.versions_delete.len());
        for digest in &plan.versions_delete {
            let Some(slot) = forest.lookup(digest) else {
                continue;
            };
            let id = forest.version(slot).id;
            let digest = digest.clone();
            let packages = self.packages.clone();
            let semaphore = semaphore.clone();
            let dry_run = self.dry_run;
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.unwrap();
                if dry_run {
                    info!(digest = %digest, id, "dry-run: would delete version");
                    return (digest, id, Ok(()));
                }
                let result = packages.delete_version(id).await;
                (digest, id, result)
            }));
        }

        let mut deleted = 0usize;
        let mut failures = 0usize;
        let results = future::join_all(handles).await;
        for result in results {
            match result {
                Ok((digest, id, Ok(()))) => {
                    deleted += 1;
                    info!(digest = %digest, id, "version deleted");
                    if let Some(slot) = forest.lookup(&digest) {
                        forest.remove(slot)?;
                    }
                }
                Ok((digest, id, Err(e))) => {
                    failures += 1;
                    warn!(digest = %digest, id, error = %e, "version deletion failed");
                }
                Err(e) => {
                    failures += 1;
                    error!(error = %e, "version deletion task panicked");
                }
            }
        }
        info!(
            "[TIMING] version deletion completed in {}ms",
            delete_started.elapsed().as_millis()
        );
        Ok((deleted, failures))
    }
}
