use std::collections::HashSet;
use std::sync::OnceLock;

use regex_lite::Regex;
use tracing::debug;

use crate::config::MEDIA_TYPE_IN_TOTO;
use crate::error::{PruneError, Result};
use crate::graph::forest::{ArtifactKind, Forest};
use crate::manifest::{Manifest, ManifestBody};
use crate::tree;
use crate::version::Version;

/// OCI 1.0 referrers-tag schema: `sha256-<hex digest>`.
fn attestation_tag() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^sha256-[a-f0-9]{64}$").unwrap())
}

/// Pass 1: parent→child edges from index manifests. A child digest absent
/// from the package repository is dropped. A child already claimed by
/// another index is a shared child: the extra edge is recorded and the
/// parent pointer stays with the first claimer.
pub(crate) fn link_index_children(forest: &mut Forest) -> Result<Vec<usize>> {
    let mut linked = Vec::new();
    for parent in 0..forest.versions.len() {
        let child_digests: Vec<String> = forest.versions[parent]
            .manifest
            .as_ref()
            .and_then(|m| m.body().manifests.as_ref())
            .map(|refs| refs.iter().filter_map(|r| r.digest.clone()).collect())
            .unwrap_or_default();
        for digest in child_digests {
            let Some(child) = forest.lookup(&digest) else {
                debug!(digest = %digest, "index child not in package repository, dropping edge");
                continue;
            };
            if child == parent {
                continue;
            }
            match tree::link(&mut forest.nodes, parent, child) {
                Ok(()) => linked.push(child),
                Err(PruneError::ConflictingParent { .. }) => {
                    tree::add_child_edge(&mut forest.nodes, parent, child);
                    linked.push(child);
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(linked)
}

/// Pass 2: child→parent edges from the OCI 1.1 `subject` field. The
/// referrer becomes a child of its subject. A referrer already claimed by
/// an index is ambiguous and fails the build.
pub(crate) fn link_referrer_subjects(forest: &mut Forest) -> Result<Vec<usize>> {
    let mut linked = Vec::new();
    for child in 0..forest.versions.len() {
        let subject_digest = forest.versions[child]
            .manifest
            .as_ref()
            .and_then(|m| m.body().subject.as_ref())
            .and_then(|s| s.digest.clone());
        let Some(digest) = subject_digest else { continue };
        let Some(parent) = forest.lookup(&digest) else {
            // Subject absent from the repository: the referrer stays a root
            debug!(digest = %digest, "referrer subject not in package repository");
            continue;
        };
        if parent == child {
            continue;
        }
        match tree::link(&mut forest.nodes, parent, child) {
            Ok(()) => linked.push(child),
            Err(PruneError::ConflictingParent { existing, .. }) => {
                return Err(PruneError::GraphInconsistency(format!(
                    "version {} is both a child of {} and a subject referrer of {}",
                    forest.versions[child].name,
                    forest.versions[existing].name,
                    forest.versions[parent].name,
                )));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(linked)
}

/// Pass 3: child→parent edges from the OCI 1.0 referrers-tag fallback. A
/// tag whose first `-` replaced by `:` resolves to another version links
/// the tag's owner under that version. Each tag is an independent attempt:
/// a second tag on the same owner adds a second edge. A collision with an
/// edge from an earlier pass is ambiguous and fails the build.
pub(crate) fn link_referrer_tags(forest: &mut Forest) -> Result<Vec<usize>> {
    let mut linked = Vec::new();
    let mut claimed_here: HashSet<usize> = HashSet::new();
    for child in 0..forest.versions.len() {
        let tags: Vec<String> = forest.versions[child].tags().to_vec();
        for tag in tags {
            let key = tag.replacen('-', ":", 1);
            let Some(parent) = forest.lookup(&key) else { continue };
            if parent == child {
                // The tag encodes the owner's own digest
                continue;
            }
            match tree::link(&mut forest.nodes, parent, child) {
                Ok(()) => {
                    claimed_here.insert(child);
                    linked.push(child);
                }
                Err(PruneError::ConflictingParent { existing, .. }) => {
                    if claimed_here.contains(&child) {
                        tree::add_child_edge(&mut forest.nodes, parent, child);
                        linked.push(child);
                    } else {
                        return Err(PruneError::GraphInconsistency(format!(
                            "version {} is both a child of {} and a tag referrer of {}",
                            forest.versions[child].name,
                            forest.versions[existing].name,
                            forest.versions[parent].name,
                        )));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(linked)
}

/// Classify a single version. Attestation checks run first so that an
/// attestation carrying layers is not mistaken for a single-arch image.
/// A version whose manifest is missing classifies as if it had an empty
/// one, so the tag check still applies.
pub(crate) fn classify(version: &Version) -> ArtifactKind {
    let empty = ManifestBody::default();
    let body = version
        .manifest
        .as_ref()
        .map(Manifest::body)
        .unwrap_or(&empty);
    let layers = body.layers.as_deref().unwrap_or(&[]);
    if !layers.is_empty()
        && layers
            .iter()
            .all(|l| l.media_type.as_deref() == Some(MEDIA_TYPE_IN_TOTO))
    {
        return ArtifactKind::Attestation;
    }
    if body.subject.is_some() {
        return ArtifactKind::Attestation;
    }
    if version.tags().iter().any(|t| attestation_tag().is_match(t)) {
        return ArtifactKind::Attestation;
    }
    if !layers.is_empty() {
        return ArtifactKind::SingleArchImage;
    }
    if body.manifests.as_deref().is_some_and(|m| !m.is_empty()) {
        return ArtifactKind::MultiArchImage;
    }
    ArtifactKind::Unknown
}

pub(crate) fn classify_all(forest: &mut Forest) {
    for slot in 0..forest.versions.len() {
        forest.kinds[slot] = classify(&forest.versions[slot]);
    }
}
