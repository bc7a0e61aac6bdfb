use std::cmp::Reverse;
use std::collections::HashSet;

use regex_lite::Regex;
use tracing::debug;

use crate::graph::{ArtifactKind, Forest};

/// The four selection knobs. Regexes are pre-compiled by config loading.
#[derive(Debug, Clone, Default)]
pub struct SelectionRules {
    pub include_tags: Option<Regex>,
    pub exclude_tags: Option<Regex>,
    pub keep_n_tagged: Option<usize>,
    pub keep_n_untagged: Option<usize>,
}

/// The deletion plan: tags to detach and version digests to delete, both
/// in deterministic order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub tags_delete: Vec<String>,
    pub versions_delete: Vec<String>,
}

/// Compute the deletion plan. The subtraction at the end is the integrity
/// rule: a digest inside any kept closure survives even when another rule
/// selects it, so shared children of a kept index are never orphaned.
pub fn plan(forest: &Forest, rules: &SelectionRules) -> Plan {
    // Every tag in the forest with its owning slot, in ingest order.
    let all_tags: Vec<(String, usize)> = forest
        .versions()
        .iter()
        .enumerate()
        .flat_map(|(slot, v)| v.tags().iter().map(move |t| (t.clone(), slot)))
        .collect();

    let matches = |pattern: &Option<Regex>, tag: &str| {
        pattern.as_ref().map(|p| p.is_match(tag)).unwrap_or(false)
    };

    let a_tag: Vec<(String, usize)> = all_tags
        .iter()
        .filter(|(t, _)| matches(&rules.include_tags, t))
        .cloned()
        .collect();
    let b_tag: Vec<(String, usize)> = all_tags
        .iter()
        .filter(|(t, _)| matches(&rules.exclude_tags, t))
        .cloned()
        .collect();
    let a_names: HashSet<&str> = a_tag.iter().map(|(t, _)| t.as_str()).collect();
    let b_names: HashSet<&str> = b_tag.iter().map(|(t, _)| t.as_str()).collect();

    // Remaining tags, newest owner first. The sort is stable, so equal
    // timestamps keep ingest order and the plan stays deterministic.
    let mut tags_rest: Vec<(String, usize)> = all_tags
        .iter()
        .filter(|(t, _)| !a_names.contains(t.as_str()) && !b_names.contains(t.as_str()))
        .cloned()
        .collect();
    tags_rest.sort_by_key(|(_, slot)| Reverse(forest.version(*slot).updated_at_or_epoch()));

    let keep_tagged = rules
        .keep_n_tagged
        .unwrap_or(tags_rest.len())
        .min(tags_rest.len());
    let (c_tag, d_tag) = tags_rest.split_at(keep_tagged);

    let closure_of = |tags: &[(String, usize)]| -> HashSet<usize> {
        let owners: Vec<usize> = tags.iter().map(|(_, slot)| *slot).collect();
        forest.closure(owners).into_iter().collect()
    };
    let a_dig = closure_of(&a_tag);
    let b_dig = closure_of(&b_tag);
    let c_dig = closure_of(c_tag);
    let d_dig = closure_of(d_tag);

    // Untagged-retention pool: roots not reached by any tag rule, images only.
    let mut images_rest: Vec<usize> = forest
        .roots()
        .into_iter()
        .filter(|r| {
            !a_dig.contains(r) && !b_dig.contains(r) && !c_dig.contains(r) && !d_dig.contains(r)
        })
        .filter(|r| forest.kind(*r) != ArtifactKind::Attestation)
        .collect();
    images_rest.sort_by_key(|slot| Reverse(forest.version(*slot).updated_at_or_epoch()));

    let keep_untagged = rules
        .keep_n_untagged
        .unwrap_or(images_rest.len())
        .min(images_rest.len());
    let e_dig: HashSet<usize> = forest
        .closure(images_rest[..keep_untagged].iter().copied())
        .into_iter()
        .collect();
    // Surplus roots are scheduled whole, descendants included
    let f_dig: HashSet<usize> = forest
        .closure(images_rest[keep_untagged..].iter().copied())
        .into_iter()
        .collect();

    debug!(
        include = a_tag.len(),
        exclude = b_tag.len(),
        keep_tagged = c_tag.len(),
        drop_tagged = d_tag.len(),
        untagged_pool = images_rest.len(),
        "selection sets computed"
    );

    // tags_delete = (A ∖ B) ∪ D
    let mut tags_delete = Vec::new();
    let mut scheduled: HashSet<&str> = HashSet::new();
    for (tag, _) in &a_tag {
        if !b_names.contains(tag.as_str()) && scheduled.insert(tag.as_str()) {
            tags_delete.push(tag.clone());
        }
    }
    for (tag, _) in d_tag {
        if scheduled.insert(tag.as_str()) {
            tags_delete.push(tag.clone());
        }
    }

    // versions_delete = (A ∪ D ∪ F) ∖ (B ∪ C ∪ E), in ingest order
    let versions_delete: Vec<String> = (0..forest.len())
        .filter(|slot| a_dig.contains(slot) || d_dig.contains(slot) || f_dig.contains(slot))
        .filter(|slot| !b_dig.contains(slot) && !c_dig.contains(slot) && !e_dig.contains(slot))
        .map(|slot| forest.version(slot).name.clone())
        .collect();

    Plan {
        tags_delete,
        versions_delete,
    }
}
