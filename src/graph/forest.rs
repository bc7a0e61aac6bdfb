use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::warn;

use crate::error::Result;
use crate::graph::resolver;
use crate::tree::{self, Node};
use crate::version::Version;

/// Artifact classification derived from manifest shape and tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactKind {
    MultiArchImage,
    SingleArchImage,
    Attestation,
    #[default]
    Unknown,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArtifactKind::MultiArchImage => "multi-arch image",
            ArtifactKind::SingleArchImage => "single-arch image",
            ArtifactKind::Attestation => "attestation",
            ArtifactKind::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// All package versions plus the linkage derived from their manifests.
/// Versions are stored in ingest order in a flat arena; edges and the key
/// index refer to arena slots.
#[derive(Debug)]
pub struct Forest {
    pub(crate) versions: Vec<Version>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) kinds: Vec<ArtifactKind>,
    pub(crate) by_key: HashMap<String, usize>,
    pub(crate) by_id: HashMap<i32, usize>,
}

impl Forest {
    /// Build the forest from ingested versions: index the keys, run the
    /// three linkage passes in order, classify every version. Pure: the
    /// same input always produces the same forest.
    pub fn build(versions: Vec<Version>) -> Result<Forest> {
        let mut forest = Forest {
            nodes: Vec::new(),
            kinds: Vec::new(),
            by_key: HashMap::new(),
            by_id: HashMap::new(),
            versions,
        };
        forest.rebuild()?;
        Ok(forest)
    }

    /// Re-derive linkage, classification, and the key index from the
    /// current version set. Invoked after every successful deletion.
    pub fn rebuild(&mut self) -> Result<()> {
        self.nodes = vec![Node::default(); self.versions.len()];
        self.kinds = vec![ArtifactKind::Unknown; self.versions.len()];
        self.reindex();
        resolver::link_index_children(self)?;
        resolver::link_referrer_subjects(self)?;
        resolver::link_referrer_tags(self)?;
        resolver::classify_all(self);
        Ok(())
    }

    fn reindex(&mut self) {
        self.by_key.clear();
        self.by_id.clear();
        for (slot, version) in self.versions.iter().enumerate() {
            if let Some(previous) = self.by_key.insert(version.name.clone(), slot) {
                warn!(
                    digest = %version.name,
                    previous,
                    "digest already indexed by another version"
                );
            }
            self.by_id.insert(version.id, slot);
            for tag in version.tags() {
                if let Some(previous) = self.by_key.insert(tag.clone(), slot) {
                    if previous != slot {
                        warn!(tag = %tag, previous, "tag already indexed by another version");
                    }
                }
            }
        }
    }

    /// Resolve a digest or tag to its owning version's slot.
    pub fn lookup(&self, key: &str) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    /// Resolve a numeric version id to its slot.
    pub fn lookup_id(&self, id: i32) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn version(&self, slot: usize) -> &Version {
        &self.versions[slot]
    }

    pub fn node(&self, slot: usize) -> &Node {
        &self.nodes[slot]
    }

    pub fn kind(&self, slot: usize) -> ArtifactKind {
        self.kinds[slot]
    }

    /// Slots of versions with no parent, in ingest order.
    pub fn roots(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|slot| self.nodes[*slot].parent.is_none())
            .collect()
    }

    /// The seeds together with every slot transitively reachable through
    /// child edges, in discovery order. Shared descendants appear once.
    pub fn closure(&self, seeds: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for seed in seeds {
            tree::visit(&self.nodes, seed, &mut |slot| {
                if seen.insert(slot) {
                    out.push(slot);
                }
            });
        }
        out
    }

    /// Remove a version after a successful deletion and re-derive the
    /// forest over the remaining set.
    pub fn remove(&mut self, slot: usize) -> Result<Version> {
        let removed = self.versions.remove(slot);
        self.rebuild()?;
        Ok(removed)
    }

    /// Drop a tag from its owning version and the key index; the final
    /// step of the tag-deletion protocol.
    pub fn remove_tag(&mut self, tag: &str) {
        if let Some(slot) = self.by_key.get(tag).copied() {
            self.versions[slot]
                .metadata
                .container
                .tags
                .retain(|t| t != tag);
            self.by_key.remove(tag);
        }
    }

    /// Render the subtree rooted at `slot` into lines.
    pub fn render_subtree(&self, slot: usize, emit: &mut impl FnMut(String)) {
        tree::render(&self.nodes, slot, &|s| self.label(s), emit);
    }

    fn label(&self, slot: usize) -> String {
        let version = &self.versions[slot];
        if version.tags().is_empty() {
            format!("{} ({})", version.name, self.kinds[slot])
        } else {
            format!(
                "{} [{}] ({})",
                version.name,
                version.tags().join(", "),
                self.kinds[slot]
            )
        }
    }
}
