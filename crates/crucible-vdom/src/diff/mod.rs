//! Snapshot differ
//!
//! Walks two snapshots depth-first, tracking the pre-order index of the old
//! tree, and emits patches in strictly non-decreasing index order. Subtrees of
//! incompatible shape are redrawn wholesale rather than repaired.

mod keyed;

use crate::config::ReconcileConfig;
use crate::error::VdomResult;
use crate::facts::{diff_facts, OrganizedFacts};
use crate::node::{flatten_tagged, ElementNode, KeyedNode, Node, NodeKind};
use crate::patch::{Patch, PatchKind};
use std::borrow::Cow;

/// Diff with the default configuration
pub fn diff(old: &Node, new: &Node) -> VdomResult<Vec<Patch>> {
    Differ::new(&ReconcileConfig::default()).diff(old, new)
}

pub struct Differ<'a> {
    duplicate_key_suffix: &'a str,
}

/// Element or keyed element seen through a positional lens
struct ElementView<'a> {
    tag: &'a str,
    namespace: Option<&'a str>,
    facts: &'a OrganizedFacts,
    children: Cow<'a, [Node]>,
}

impl<'a> ElementView<'a> {
    fn element(e: &'a ElementNode) -> Self {
        Self {
            tag: &e.tag,
            namespace: e.namespace.as_deref(),
            facts: &e.facts,
            children: Cow::Borrowed(&e.children),
        }
    }

    fn dekeyed(k: &'a KeyedNode) -> Self {
        Self {
            tag: &k.tag,
            namespace: k.namespace.as_deref(),
            facts: &k.facts,
            children: Cow::Owned(k.children.iter().map(|(_, node)| node.clone()).collect()),
        }
    }
}

impl<'a> Differ<'a> {
    pub fn new(config: &'a ReconcileConfig) -> Self {
        Self {
            duplicate_key_suffix: &config.duplicate_key_suffix,
        }
    }

    pub fn diff(&self, old: &Node, new: &Node) -> VdomResult<Vec<Patch>> {
        let mut patches = Vec::new();
        self.diff_help(old, new, &mut patches, 0)?;
        tracing::debug!(patches = patches.len(), "diff complete");
        Ok(patches)
    }

    fn diff_help(&self, x: &Node, y: &Node, patches: &mut Vec<Patch>, index: usize) -> VdomResult<()> {
        if x.ptr_eq(y) {
            return Ok(());
        }

        match (x.kind(), y.kind()) {
            (NodeKind::Thunk(xt), NodeKind::Thunk(yt)) => {
                if xt.same_args(yt) {
                    yt.adopt(xt.force());
                    return Ok(());
                }
                let mut sub = Vec::new();
                self.diff_help(xt.force(), yt.force(), &mut sub, 0)?;
                if !sub.is_empty() {
                    patches.push(Patch::new(index, PatchKind::Thunk(sub)));
                }
            }

            (NodeKind::Tagged(xt), NodeKind::Tagged(yt)) => {
                let (x_chain, x_inner) = flatten_tagged(xt);
                let (y_chain, y_inner) = flatten_tagged(yt);
                if !x_chain.pairwise_ptr_eq(&y_chain) {
                    patches.push(Patch::new(index, PatchKind::Retag(y_chain)));
                }
                self.diff_help(x_inner, y_inner, patches, index + 1)?;
            }

            (NodeKind::Text(a), NodeKind::Text(b)) => {
                if a != b {
                    patches.push(Patch::new(index, PatchKind::Text(b.clone())));
                }
            }

            (NodeKind::Element(xe), NodeKind::Element(ye)) => {
                self.diff_elements(ElementView::element(xe), ElementView::element(ye), y, patches, index)?;
            }

            (NodeKind::Element(xe), NodeKind::Keyed(yk)) => {
                self.diff_elements(ElementView::element(xe), ElementView::dekeyed(yk), y, patches, index)?;
            }

            (NodeKind::Keyed(xk), NodeKind::Element(ye)) => {
                self.diff_elements(ElementView::dekeyed(xk), ElementView::element(ye), y, patches, index)?;
            }

            (NodeKind::Keyed(xk), NodeKind::Keyed(yk)) => {
                if xk.tag != yk.tag || xk.namespace != yk.namespace {
                    patches.push(Patch::new(index, PatchKind::Redraw(y.clone())));
                    return Ok(());
                }
                if let Some(facts) = diff_facts(&xk.facts, &yk.facts) {
                    patches.push(Patch::new(index, PatchKind::Facts(facts)));
                }
                self.diff_keyed_kids(&xk.children, &yk.children, patches, index)?;
            }

            (NodeKind::Custom(xc), NodeKind::Custom(yc)) => {
                if !xc.widget.same_implementation(&yc.widget) {
                    patches.push(Patch::new(index, PatchKind::Redraw(y.clone())));
                    return Ok(());
                }
                if let Some(facts) = diff_facts(&xc.facts, &yc.facts) {
                    patches.push(Patch::new(index, PatchKind::Facts(facts)));
                }
                if let Some(payload) = xc.widget.diff(&yc.widget)? {
                    patches.push(Patch::new(index, PatchKind::Custom(payload)));
                }
            }

            _ => {
                tracing::trace!(
                    index,
                    from = x.kind_name(),
                    to = y.kind_name(),
                    "shape changed, redrawing"
                );
                patches.push(Patch::new(index, PatchKind::Redraw(y.clone())));
            }
        }
        Ok(())
    }

    fn diff_elements(
        &self,
        x: ElementView<'_>,
        y: ElementView<'_>,
        y_node: &Node,
        patches: &mut Vec<Patch>,
        index: usize,
    ) -> VdomResult<()> {
        if x.tag != y.tag || x.namespace != y.namespace {
            patches.push(Patch::new(index, PatchKind::Redraw(y_node.clone())));
            return Ok(());
        }
        if let Some(facts) = diff_facts(x.facts, y.facts) {
            patches.push(Patch::new(index, PatchKind::Facts(facts)));
        }
        self.diff_kids(&x.children, &y.children, patches, index)
    }

    fn diff_kids(
        &self,
        xs: &[Node],
        ys: &[Node],
        patches: &mut Vec<Patch>,
        mut index: usize,
    ) -> VdomResult<()> {
        if xs.len() > ys.len() {
            patches.push(Patch::new(
                index,
                PatchKind::RemoveLast {
                    keep: ys.len(),
                    count: xs.len() - ys.len(),
                },
            ));
        } else if xs.len() < ys.len() {
            patches.push(Patch::new(index, PatchKind::Append(ys[xs.len()..].to_vec())));
        }

        for (x, y) in xs.iter().zip(ys.iter()) {
            index += 1;
            self.diff_help(x, y, patches, index)?;
            index += x.descendants();
        }
        Ok(())
    }
}
