//! Unit tests for forest construction
//!
//! Tests the three linkage passes, shared children, cycle tolerance,
//! artifact classification, and tree rendering.

use ghcr_prune::error::PruneError;
use ghcr_prune::graph::{ArtifactKind, Forest};
use ghcr_prune::manifest::Manifest;
use ghcr_prune::tree::{self, Node};
use ghcr_prune::version::Version;
use serde_json::{json, Value};

fn digest(fill: char) -> String {
    format!("sha256:{}", fill.to_string().repeat(64))
}

fn referrer_tag(fill: char) -> String {
    format!("sha256-{}", fill.to_string().repeat(64))
}

fn version(id: i32, name: &str, tags: &[&str], manifest: Option<Value>) -> Version {
    let payload = json!({
        "id": id,
        "name": name,
        "url": format!("https://api.github.com/orgs/acme/packages/container/app/versions/{}", id),
        "package_html_url": "https://github.com/orgs/acme/packages/container/package/app",
        "html_url": format!("https://github.com/orgs/acme/packages/container/app/{}", id),
        "created_at": "2024-03-01T10:00:00Z",
        "updated_at": "2024-03-02T11:30:00Z",
        "metadata": {
            "package_type": "container",
            "container": {"tags": tags}
        }
    });
    let mut version = Version::decode(&payload.to_string()).unwrap();
    version.manifest = manifest.map(|m| Manifest::decode(&m.to_string()).unwrap());
    version
}

fn index_manifest(children: &[&str]) -> Value {
    json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": children
            .iter()
            .map(|d| json!({"mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": d}))
            .collect::<Vec<_>>()
    })
}

fn image_manifest() -> Value {
    json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "layers": [
            {"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:layer"}
        ]
    })
}

fn attestation_manifest(subject: Option<&str>) -> Value {
    let mut manifest = json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "layers": [
            {"mediaType": "application/vnd.in-toto+json", "digest": "sha256:payload"}
        ]
    });
    if let Some(subject_digest) = subject {
        manifest["subject"] = json!({
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "digest": subject_digest
        });
    }
    manifest
}

#[test]
fn test_link_primitives() {
    let mut nodes = vec![Node::default(), Node::default(), Node::default()];

    assert!(matches!(
        tree::link(&mut nodes, 0, 0).unwrap_err(),
        PruneError::SelfLink
    ));

    tree::link(&mut nodes, 0, 1).unwrap();
    assert_eq!(nodes[1].parent, Some(0));
    assert_eq!(nodes[0].children, [1]);

    // Re-linking the same pair is a no-op
    tree::link(&mut nodes, 0, 1).unwrap();
    assert_eq!(nodes[0].children, [1]);

    // A second parent is a conflict
    assert!(matches!(
        tree::link(&mut nodes, 2, 1).unwrap_err(),
        PruneError::ConflictingParent { child: 1, existing: 0, proposed: 2 }
    ));
}

#[test]
fn test_index_children_linked() {
    let parent = digest('a');
    let c1 = digest('b');
    let c2 = digest('c');
    let forest = Forest::build(vec![
        version(1, &parent, &["v1"], Some(index_manifest(&[&c1, &c2]))),
        version(2, &c1, &[], Some(image_manifest())),
        version(3, &c2, &[], Some(image_manifest())),
    ])
    .unwrap();

    assert_eq!(forest.roots(), [0]);
    assert_eq!(forest.node(0).children, [1, 2], "manifests order preserved");
    assert_eq!(forest.node(1).parent, Some(0));
    assert_eq!(forest.node(2).parent, Some(0));
    assert_eq!(forest.kind(0), ArtifactKind::MultiArchImage);
    assert_eq!(forest.kind(1), ArtifactKind::SingleArchImage);
}

#[test]
fn test_missing_child_edge_dropped() {
    let parent = digest('a');
    let absent = digest('f');
    let forest = Forest::build(vec![version(
        1,
        &parent,
        &["v1"],
        Some(index_manifest(&[&absent])),
    )])
    .unwrap();

    assert_eq!(forest.roots(), [0]);
    assert!(forest.node(0).children.is_empty());
}

#[test]
fn test_shared_child_between_two_indexes() {
    let x = digest('a');
    let y = digest('b');
    let shared = digest('c');
    let forest = Forest::build(vec![
        version(1, &x, &["v1"], Some(index_manifest(&[&shared]))),
        version(2, &y, &["v2"], Some(index_manifest(&[&shared]))),
        version(3, &shared, &[], Some(image_manifest())),
    ])
    .unwrap();

    // The parent pointer stays with the first claimer; both indexes still
    // reach the child
    assert_eq!(forest.node(2).parent, Some(0));
    assert_eq!(forest.node(0).children, [2]);
    assert_eq!(forest.node(1).children, [2]);
    assert_eq!(forest.roots(), [0, 1]);
    assert!(forest.closure([1]).contains(&2));
}

#[test]
fn test_subject_links_referrer() {
    let image = digest('a');
    let referrer = digest('b');
    let forest = Forest::build(vec![
        version(1, &image, &[], Some(image_manifest())),
        version(2, &referrer, &[], Some(attestation_manifest(Some(&image)))),
    ])
    .unwrap();

    assert_eq!(forest.node(1).parent, Some(0));
    assert_eq!(forest.roots(), [0]);
    assert_eq!(forest.kind(1), ArtifactKind::Attestation);
}

#[test]
fn test_orphan_subject_stays_root() {
    let referrer = digest('b');
    let absent = digest('f');
    let forest = Forest::build(vec![version(
        1,
        &referrer,
        &[],
        Some(attestation_manifest(Some(&absent))),
    )])
    .unwrap();

    assert_eq!(forest.roots(), [0]);
    assert_eq!(forest.kind(0), ArtifactKind::Attestation);
}

#[test]
fn test_referrer_tag_links() {
    let image = digest('1');
    let tag = referrer_tag('1');
    let referrer = digest('2');
    let forest = Forest::build(vec![
        version(1, &image, &["v1"], Some(image_manifest())),
        version(2, &referrer, &[&tag], Some(attestation_manifest(None))),
    ])
    .unwrap();

    assert_eq!(forest.node(1).parent, Some(0));
    assert_eq!(forest.roots(), [0]);
    assert_eq!(forest.kind(1), ArtifactKind::Attestation);
}

#[test]
fn test_referrer_tag_never_links_to_self() {
    // The version's own tag encodes its own digest
    let image = digest('1');
    let own_tag = referrer_tag('1');
    let forest = Forest::build(vec![version(
        1,
        &image,
        &[&own_tag],
        Some(image_manifest()),
    )])
    .unwrap();

    assert_eq!(forest.roots(), [0]);
    assert!(forest.node(0).children.is_empty());
    assert_eq!(forest.node(0).parent, None);
}

#[test]
fn test_cycle_terminates() {
    // Two indexes referencing each other: malformed but must not hang
    let a = digest('a');
    let b = digest('b');
    let forest = Forest::build(vec![
        version(1, &a, &[], Some(index_manifest(&[&b]))),
        version(2, &b, &[], Some(index_manifest(&[&a]))),
    ])
    .unwrap();

    let closure = forest.closure([0]);
    assert_eq!(closure, [0, 1]);
    assert!(forest.roots().is_empty(), "both are children in the cycle");
}

#[test]
fn test_cross_mechanism_conflict_fails() {
    // A version claimed as an index child AND pointing at a different
    // subject is ambiguous
    let x = digest('a');
    let y = digest('b');
    let child = digest('c');
    let err = Forest::build(vec![
        version(1, &x, &[], Some(index_manifest(&[&child]))),
        version(2, &y, &[], Some(image_manifest())),
        version(3, &child, &[], Some(attestation_manifest(Some(&y)))),
    ])
    .unwrap_err();

    assert!(
        matches!(err, PruneError::GraphInconsistency(_)),
        "expected GraphInconsistency, got {:?}",
        err
    );
}

#[test]
fn test_classification_priority() {
    // In-toto layers beat the single-arch check
    let attestation = version(1, &digest('a'), &[], Some(attestation_manifest(None)));
    // A subject with ordinary layers is still an attestation
    let mut subject_manifest = image_manifest();
    subject_manifest["subject"] =
        json!({"mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": digest('f')});
    let with_subject = version(2, &digest('b'), &[], Some(subject_manifest));
    // Referrer tag alone marks an attestation, even without a manifest
    let tag = referrer_tag('9');
    let by_tag = version(3, &digest('c'), &[&tag], None);
    let by_tag_with_manifest = version(
        4,
        &digest('d'),
        &[&tag],
        Some(json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json"
        })),
    );

    let forest = Forest::build(vec![attestation, with_subject, by_tag_with_manifest]).unwrap();
    assert_eq!(forest.kind(0), ArtifactKind::Attestation);
    assert_eq!(forest.kind(1), ArtifactKind::Attestation);
    assert_eq!(forest.kind(2), ArtifactKind::Attestation);

    let forest = Forest::build(vec![by_tag]).unwrap();
    assert_eq!(forest.kind(0), ArtifactKind::Attestation);

    // No manifest and no special tag is unknown
    let forest = Forest::build(vec![version(5, &digest('e'), &["v5"], None)]).unwrap();
    assert_eq!(forest.kind(0), ArtifactKind::Unknown);
}

#[test]
fn test_empty_manifest_is_unknown() {
    let empty = version(
        1,
        &digest('a'),
        &["v1"],
        Some(json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": []
        })),
    );
    let forest = Forest::build(vec![empty]).unwrap();
    assert_eq!(forest.kind(0), ArtifactKind::Unknown);
}

#[test]
fn test_remove_rebuilds_linkage() {
    let parent = digest('a');
    let c1 = digest('b');
    let c2 = digest('c');
    let mut forest = Forest::build(vec![
        version(1, &parent, &["v1"], Some(index_manifest(&[&c1, &c2]))),
        version(2, &c1, &[], Some(image_manifest())),
        version(3, &c2, &[], Some(image_manifest())),
    ])
    .unwrap();

    let slot = forest.lookup(&c1).unwrap();
    forest.remove(slot).unwrap();

    assert_eq!(forest.len(), 2);
    assert!(forest.lookup(&c1).is_none());
    let parent_slot = forest.lookup(&parent).unwrap();
    assert_eq!(forest.node(parent_slot).children.len(), 1);
    let remaining_child = forest.node(parent_slot).children[0];
    assert_eq!(forest.version(remaining_child).name, c2);
}

#[test]
fn test_remove_tag_updates_index() {
    let image = digest('a');
    let mut forest = Forest::build(vec![version(
        1,
        &image,
        &["v1", "latest"],
        Some(image_manifest()),
    )])
    .unwrap();

    forest.remove_tag("v1");
    assert!(forest.lookup("v1").is_none());
    assert_eq!(forest.lookup("latest"), Some(0));
    assert_eq!(forest.version(0).tags(), ["latest"]);
}

#[test]
fn test_render_prefixes() {
    let root = digest('a');
    let mid = digest('b');
    let leaf = digest('c');
    let last = digest('d');
    let forest = Forest::build(vec![
        version(1, &root, &[], Some(index_manifest(&[&mid, &last]))),
        version(2, &mid, &[], Some(index_manifest(&[&leaf]))),
        version(3, &leaf, &[], Some(image_manifest())),
        version(4, &last, &[], Some(image_manifest())),
    ])
    .unwrap();

    let mut lines = Vec::new();
    forest.render_subtree(0, &mut |line| lines.push(line));

    assert_eq!(
        lines,
        vec![
            format!("- {} (multi-arch image)", root),
            format!(" ├─ {} (multi-arch image)", mid),
            format!(" │  └─ {} (single-arch image)", leaf),
            format!(" └─ {} (single-arch image)", last),
        ]
    );
}
