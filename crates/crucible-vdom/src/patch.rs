//! Patch operations produced by the differ and consumed by the applier

use crate::document::NodeId;
use crate::event::{EventRoot, MapperChain};
use crate::facts::FactsDiff;
use crate::node::Node;
use crate::widget::WidgetPatch;

/// A targeted mutation of one live node
///
/// `index` is the node's position in a pre-order traversal of the *old*
/// snapshot. The live target and event root are filled in by the applier's
/// locate pass.
#[derive(Debug)]
pub struct Patch {
    pub index: usize,
    pub kind: PatchKind,
    pub(crate) target: Option<NodeId>,
    pub(crate) event_root: Option<EventRoot>,
}

#[derive(Debug)]
pub enum PatchKind {
    /// Render the node from scratch and swap it in
    Redraw(Node),
    /// Bucketed fact deltas
    Facts(FactsDiff),
    /// New text data
    Text(String),
    /// Overwrite the tagger record's mapper chain; no live node is touched
    Retag(MapperChain),
    /// Patches inside a memoized subtree, indexed from the thunk's result
    Thunk(Vec<Patch>),
    /// Drop trailing children, keeping the first `keep`
    RemoveLast { keep: usize, count: usize },
    /// Render and append new trailing children
    Append(Vec<Node>),
    /// Keyed children reconciliation
    Reorder(Reorder),
    /// Remove a keyed child; `Some` when it moves elsewhere in the same parent
    Remove(Option<MovedSubtree>),
    /// Widget payload for the custom node's apply hook
    Custom(WidgetPatch),
}

/// Composite patch for a keyed parent
#[derive(Debug, Default)]
pub struct Reorder {
    /// In-place child patches and removals, in index order
    pub patches: Vec<Patch>,
    /// Positional inserts, ascending by position
    pub inserts: Vec<Insert>,
    /// Appended after everything else
    pub end_inserts: Vec<Insert>,
}

#[derive(Debug)]
pub struct Insert {
    /// Position in the new child list; `None` for end inserts
    pub position: Option<usize>,
    pub key: String,
    pub source: InsertSource,
}

#[derive(Debug)]
pub enum InsertSource {
    Render(Node),
    /// Reuse the live subtree detached by the `Remove` carrying the same key
    Move,
}

/// A removed keyed child that is re-inserted under `key`
#[derive(Debug)]
pub struct MovedSubtree {
    pub key: String,
    /// Patches for the moved subtree, indexed like the removal
    pub patches: Vec<Patch>,
}

impl Patch {
    pub(crate) fn new(index: usize, kind: PatchKind) -> Self {
        Self {
            index,
            kind,
            target: None,
            event_root: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match &self.kind {
            PatchKind::Redraw(_) => "redraw",
            PatchKind::Facts(_) => "facts",
            PatchKind::Text(_) => "text",
            PatchKind::Retag(_) => "retag",
            PatchKind::Thunk(_) => "thunk",
            PatchKind::RemoveLast { .. } => "remove-last",
            PatchKind::Append(_) => "append",
            PatchKind::Reorder(_) => "reorder",
            PatchKind::Remove(_) => "remove",
            PatchKind::Custom(_) => "custom",
        }
    }

    /// Live node this patch was located at, once the applier has run
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }
}

/// Count patches including those nested in thunk, reorder and move payloads
pub fn count_patches(patches: &[Patch]) -> usize {
    patches
        .iter()
        .map(|patch| {
            1 + match &patch.kind {
                PatchKind::Thunk(inner) => count_patches(inner),
                PatchKind::Reorder(reorder) => count_patches(&reorder.patches),
                PatchKind::Remove(Some(moved)) => count_patches(&moved.patches),
                _ => 0,
            }
        })
        .sum()
}

/// Flattened `(index, name)` listing, nested patches indented by depth
pub fn describe(patches: &[Patch]) -> Vec<String> {
    fn walk(patches: &[Patch], depth: usize, out: &mut Vec<String>) {
        for patch in patches {
            out.push(format!(
                "{}{}@{}",
                "  ".repeat(depth),
                patch.name(),
                patch.index
            ));
            match &patch.kind {
                PatchKind::Thunk(inner) => walk(inner, depth + 1, out),
                PatchKind::Reorder(reorder) => walk(&reorder.patches, depth + 1, out),
                PatchKind::Remove(Some(moved)) => walk(&moved.patches, depth + 1, out),
                _ => {}
            }
        }
    }
    let mut out = Vec::new();
    walk(patches, 0, &mut out);
    out
}
