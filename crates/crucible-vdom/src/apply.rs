//! Patch application against the live document
//!
//! Two passes. `locate` walks the old snapshot alongside the live tree and
//! stamps each patch with its target node and event root, descending only
//! into index ranges that still have patches. The second pass applies the
//! patches in order, tracking root replacement.

use crate::document::{Document, NodeId};
use crate::error::{VdomError, VdomResult};
use crate::event::EventRoot;
use crate::node::{flatten_tagged, Node, NodeKind};
use crate::patch::{InsertSource, Patch, PatchKind, Reorder};
use crate::render::render;
use std::collections::HashMap;

/// Apply `patches` (diffed against `old`) to the live tree at `root`
///
/// Returns the live root afterwards, which differs from `root` when the root
/// itself was redrawn.
pub fn apply(
    doc: &mut Document,
    root: NodeId,
    old: &Node,
    mut patches: Vec<Patch>,
    event_root: &EventRoot,
) -> VdomResult<NodeId> {
    if patches.is_empty() {
        return Ok(root);
    }
    let located = locate(doc, root, old, &mut patches, 0, 0, old.descendants(), event_root)?;
    if let Some(stray) = patches.get(located) {
        return Err(VdomError::MissingLiveNode { index: stray.index });
    }
    apply_patches(doc, root, patches)
}

/// Stamp targets on `patches[i..]` whose indices fall within `low..=high`
///
/// `id` is the live node for the snapshot `node` sitting at index `low`.
/// Returns the position of the first patch left unlocated.
#[allow(clippy::too_many_arguments)]
fn locate(
    doc: &Document,
    id: NodeId,
    node: &Node,
    patches: &mut [Patch],
    mut i: usize,
    low: usize,
    high: usize,
    event_root: &EventRoot,
) -> VdomResult<usize> {
    let Some(mut patch_index) = patches.get(i).map(|p| p.index) else {
        return Ok(i);
    };
    if patch_index > high {
        return Ok(i);
    }

    while patch_index == low {
        let patch = &mut patches[i];
        patch.target = Some(id);
        patch.event_root = Some(event_root.clone());
        match &mut patch.kind {
            PatchKind::Thunk(sub) => {
                let NodeKind::Thunk(thunk) = node.kind() else {
                    return Err(VdomError::integrity(format!(
                        "thunk patch at {low} lines up with a {} node",
                        node.kind_name()
                    )));
                };
                let inner = thunk.force();
                locate_all(doc, id, inner, sub, 0, inner.descendants(), event_root)?;
            }
            PatchKind::Reorder(reorder) => {
                locate_all(doc, id, node, &mut reorder.patches, low, high, event_root)?;
            }
            PatchKind::Remove(Some(moved)) => {
                locate_all(doc, id, node, &mut moved.patches, low, high, event_root)?;
            }
            _ => {}
        }

        i += 1;
        match patches.get(i) {
            Some(next) if next.index <= high => patch_index = next.index,
            _ => return Ok(i),
        }
    }

    match node.kind() {
        NodeKind::Tagged(tagged) => {
            let (_, inner) = flatten_tagged(tagged);
            let own_root = doc.tagger_root(id, event_root)?;
            locate(doc, id, inner, patches, i, low + 1, high, &own_root)
        }
        NodeKind::Element(e) => {
            locate_children(doc, id, e.children.iter(), patches, i, low, high, event_root)
        }
        NodeKind::Keyed(k) => locate_children(
            doc,
            id,
            k.children.iter().map(|(_, child)| child),
            patches,
            i,
            low,
            high,
            event_root,
        ),
        NodeKind::Text(_) | NodeKind::Custom(_) | NodeKind::Thunk(_) => Ok(i),
    }
}

/// Locate a nested patch list that must be fully consumed
fn locate_all(
    doc: &Document,
    id: NodeId,
    node: &Node,
    patches: &mut [Patch],
    low: usize,
    high: usize,
    event_root: &EventRoot,
) -> VdomResult<()> {
    let located = locate(doc, id, node, patches, 0, low, high, event_root)?;
    match patches.get(located) {
        Some(stray) => Err(VdomError::MissingLiveNode { index: stray.index }),
        None => Ok(()),
    }
}

#[allow(clippy::too_many_arguments)]
fn locate_children<'a>(
    doc: &Document,
    id: NodeId,
    children: impl Iterator<Item = &'a Node>,
    patches: &mut [Patch],
    mut i: usize,
    mut low: usize,
    high: usize,
    event_root: &EventRoot,
) -> VdomResult<usize> {
    let live = doc.children(id)?.to_vec();
    for (position, child) in children.enumerate() {
        low += 1;
        let next_high = low + child.descendants();
        let patch_index = match patches.get(i) {
            Some(patch) if patch.index <= high => patch.index,
            _ => return Ok(i),
        };
        if (low..=next_high).contains(&patch_index) {
            let live_child = live
                .get(position)
                .copied()
                .ok_or(VdomError::MissingLiveNode { index: low })?;
            i = locate(doc, live_child, child, patches, i, low, next_high, event_root)?;
        }
        low = next_high;
    }
    Ok(i)
}

fn apply_patches(doc: &mut Document, mut root: NodeId, patches: Vec<Patch>) -> VdomResult<NodeId> {
    for patch in patches {
        let target = patch
            .target
            .ok_or(VdomError::MissingLiveNode { index: patch.index })?;
        let replacement = apply_patch(doc, target, patch)?;
        if target == root {
            root = replacement;
        }
    }
    Ok(root)
}

fn apply_patch(doc: &mut Document, target: NodeId, patch: Patch) -> VdomResult<NodeId> {
    let index = patch.index;
    let event_root = patch
        .event_root
        .ok_or(VdomError::MissingLiveNode { index })?;

    match patch.kind {
        PatchKind::Redraw(node) => {
            let fresh = render(doc, &node, &event_root)?;
            if doc.event_root(fresh).is_none() {
                if let Some(inherited) = doc.event_root(target).cloned() {
                    doc.set_event_root(fresh, inherited)?;
                }
            }
            doc.replace(target, fresh)?;
            tracing::trace!(index, old = %target, new = %fresh, "redrew subtree");
            Ok(fresh)
        }

        PatchKind::Facts(diff) => {
            doc.apply_facts_diff(target, &diff, &event_root)?;
            Ok(target)
        }

        PatchKind::Text(value) => {
            doc.set_text(target, &value)?;
            Ok(target)
        }

        PatchKind::Retag(chain) => {
            doc.tagger_root(target, &event_root)?.retag(chain);
            Ok(target)
        }

        PatchKind::Thunk(sub) => apply_patches(doc, target, sub),

        PatchKind::RemoveLast { keep, count } => {
            for _ in 0..count {
                let child = doc
                    .children(target)?
                    .get(keep)
                    .copied()
                    .ok_or_else(|| VdomError::integrity(format!("{target} has too few children")))?;
                doc.free(child)?;
            }
            Ok(target)
        }

        PatchKind::Append(nodes) => {
            for node in &nodes {
                let child = render(doc, node, &event_root)?;
                doc.append_child(target, child)?;
            }
            Ok(target)
        }

        PatchKind::Reorder(reorder) => {
            apply_reorder(doc, target, reorder, &event_root)?;
            Ok(target)
        }

        PatchKind::Remove(_) => Err(VdomError::integrity(format!(
            "remove patch at {index} outside a keyed reorder"
        ))),

        PatchKind::Custom(payload) => {
            doc.with_widget_handle(target, |handle| payload.apply(handle))?;
            Ok(target)
        }
    }
}

/// Removals and in-place patches first, then positional inserts, then appends
fn apply_reorder(
    doc: &mut Document,
    parent: NodeId,
    reorder: Reorder,
    event_root: &EventRoot,
) -> VdomResult<()> {
    let mut moved: HashMap<String, NodeId> = HashMap::new();

    for patch in reorder.patches {
        let target = patch
            .target
            .ok_or(VdomError::MissingLiveNode { index: patch.index })?;
        match patch.kind {
            PatchKind::Remove(None) => {
                doc.free(target)?;
            }
            PatchKind::Remove(Some(subtree)) => {
                doc.detach(target)?;
                let node = apply_patches(doc, target, subtree.patches)?;
                moved.insert(subtree.key, node);
            }
            kind => {
                apply_patch(doc, target, Patch { kind, ..patch })?;
            }
        }
    }

    for insert in reorder.inserts {
        let child = match insert.source {
            InsertSource::Render(node) => render(doc, &node, event_root)?,
            InsertSource::Move => take_moved(&mut moved, &insert.key)?,
        };
        let position = insert.position.unwrap_or(usize::MAX);
        doc.insert_child(parent, position, child)?;
    }

    for insert in reorder.end_inserts {
        let child = match insert.source {
            InsertSource::Render(node) => render(doc, &node, event_root)?,
            InsertSource::Move => take_moved(&mut moved, &insert.key)?,
        };
        doc.append_child(parent, child)?;
    }

    if !moved.is_empty() {
        tracing::warn!(count = moved.len(), "moved subtrees were never reinserted");
        for (_, orphan) in moved.drain() {
            doc.free(orphan)?;
        }
    }
    Ok(())
}

fn take_moved(moved: &mut HashMap<String, NodeId>, key: &str) -> VdomResult<NodeId> {
    moved
        .remove(key)
        .ok_or_else(|| VdomError::integrity(format!("no detached subtree for key {key}")))
}
