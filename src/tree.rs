use std::collections::HashSet;

use crate::error::{PruneError, Result};

/// Parent/child linkage for one arena slot. Versions live in a flat arena;
/// edges are arena indices, never owned pointers.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// Make `child` a child of `parent`. Re-linking the same pair is a no-op;
/// linking a node to itself or re-parenting an already-claimed node fails.
pub fn link(nodes: &mut [Node], parent: usize, child: usize) -> Result<()> {
    if parent == child {
        return Err(PruneError::SelfLink);
    }
    match nodes[child].parent {
        Some(existing) if existing == parent => return Ok(()),
        Some(existing) => {
            return Err(PruneError::ConflictingParent {
                child,
                existing,
                proposed: parent,
            })
        }
        None => {}
    }
    nodes[child].parent = Some(parent);
    if !nodes[parent].children.contains(&child) {
        nodes[parent].children.push(child);
    }
    Ok(())
}

/// Record a secondary edge to a child that already belongs to another
/// parent. The parent pointer stays with the first claimer; traversal
/// still reaches the child from here.
pub fn add_child_edge(nodes: &mut [Node], parent: usize, child: usize) {
    if parent != child && !nodes[parent].children.contains(&child) {
        nodes[parent].children.push(child);
    }
}

/// Pre-order traversal from `root`. Visited slots are tracked so cyclic or
/// diamond-shaped graphs terminate.
pub fn visit<F: FnMut(usize)>(nodes: &[Node], root: usize, f: &mut F) {
    let mut seen = HashSet::new();
    visit_inner(nodes, root, f, &mut seen);
}

fn visit_inner<F: FnMut(usize)>(
    nodes: &[Node],
    slot: usize,
    f: &mut F,
    seen: &mut HashSet<usize>,
) {
    if !seen.insert(slot) {
        return;
    }
    f(slot);
    for &child in &nodes[slot].children {
        visit_inner(nodes, child, f, seen);
    }
}

/// Render a subtree as an ASCII tree. The root line is `- {label}`;
/// children use ` ├─` / ` └─` branches with ` │ ` / `   ` continuations.
/// Shared children appear under their first-rendered parent only.
pub fn render<L, E>(nodes: &[Node], root: usize, label: &L, emit: &mut E)
where
    L: Fn(usize) -> String,
    E: FnMut(String),
{
    emit(format!("- {}", label(root)));
    let mut seen = HashSet::new();
    seen.insert(root);
    render_children(nodes, root, "", label, emit, &mut seen);
}

fn render_children<L, E>(
    nodes: &[Node],
    slot: usize,
    prefix: &str,
    label: &L,
    emit: &mut E,
    seen: &mut HashSet<usize>,
) where
    L: Fn(usize) -> String,
    E: FnMut(String),
{
    let fresh: Vec<usize> = nodes[slot]
        .children
        .iter()
        .copied()
        .filter(|child| seen.insert(*child))
        .collect();
    let count = fresh.len();
    for (position, child) in fresh.into_iter().enumerate() {
        let last = position + 1 == count;
        let branch = if last { " └─" } else { " ├─" };
        emit(format!("{}{} {}", prefix, branch, label(child)));
        let continuation = if last { "   " } else { " │ " };
        let child_prefix = format!("{}{}", prefix, continuation);
        render_children(nodes, child, &child_prefix, label, emit, seen);
    }
}
