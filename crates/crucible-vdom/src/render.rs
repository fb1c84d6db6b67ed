//! Materialize a snapshot into the live document

use crate::document::{Document, NodeId};
use crate::error::VdomResult;
use crate::event::EventRoot;
use crate::node::{flatten_tagged, Node, NodeKind};

/// Build the live subtree for `node`; listeners deliver through `event_root`
///
/// The returned node is detached. A tagger installs a fresh record under
/// `event_root` and stamps it on the node it produced unless an inner tagger
/// already did.
pub fn render(doc: &mut Document, node: &Node, event_root: &EventRoot) -> VdomResult<NodeId> {
    match node.kind() {
        NodeKind::Text(value) => Ok(doc.create_text(value)),

        NodeKind::Element(e) => {
            let id = doc.create_element(&e.tag, e.namespace.as_deref());
            doc.apply_facts(id, &e.facts, event_root)?;
            for child in &e.children {
                let child = render(doc, child, event_root)?;
                doc.append_child(id, child)?;
            }
            Ok(id)
        }

        NodeKind::Keyed(k) => {
            let id = doc.create_element(&k.tag, k.namespace.as_deref());
            doc.apply_facts(id, &k.facts, event_root)?;
            for (_, child) in &k.children {
                let child = render(doc, child, event_root)?;
                doc.append_child(id, child)?;
            }
            Ok(id)
        }

        NodeKind::Tagged(t) => {
            let (chain, inner) = flatten_tagged(t);
            let sub_root = EventRoot::tagger(chain, event_root);
            let id = render(doc, inner, &sub_root)?;
            if doc.event_root(id).is_none() {
                doc.set_event_root(id, sub_root)?;
            }
            Ok(id)
        }

        NodeKind::Thunk(t) => render(doc, t.force(), event_root),

        NodeKind::Custom(c) => {
            let handle = c.widget.render()?;
            let id = doc.create_widget(c.widget.name(), handle);
            doc.apply_facts(id, &c.facts, event_root)?;
            Ok(id)
        }
    }
}
