//! Arena-backed live document
//!
//! Live nodes are addressed by stable [`NodeId`]s. The document owns every
//! node; nothing is collected implicitly, a subtree disappears only when a
//! patch frees it. Callers get read access; all mutation goes through the
//! renderer and the patch applier.

use crate::error::{VdomError, VdomResult};
use crate::event::{EventRoot, Handler};
use crate::facts::{FactsDiff, NsAttribute, OrganizedFacts};
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Stable handle to a live node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One physical listener; its handler may be swapped without reattaching
pub struct Listener {
    handler: Handler,
    event_root: EventRoot,
}

impl Listener {
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn event_root(&self) -> &EventRoot {
        &self.event_root
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("kind", &self.handler.kind())
            .finish()
    }
}

enum ListenerChange {
    Unchanged,
    Attached,
    Swapped,
    Replaced,
    Detached,
}

/// Facts as they currently stand on a live element
#[derive(Debug, Default)]
pub struct LiveFacts {
    pub properties: BTreeMap<String, Value>,
    pub attributes: BTreeMap<String, String>,
    pub attributes_ns: BTreeMap<String, NsAttribute>,
    pub styles: BTreeMap<String, String>,
    pub listeners: BTreeMap<String, Listener>,
}

impl LiveFacts {
    fn set_listener(
        &mut self,
        event: &str,
        handler: Option<&Handler>,
        root: &EventRoot,
    ) -> ListenerChange {
        match (self.listeners.get_mut(event), handler) {
            (Some(listener), Some(handler)) if listener.handler.kind() == handler.kind() => {
                listener.handler = handler.clone();
                ListenerChange::Swapped
            }
            (Some(_), Some(handler)) => {
                self.listeners.insert(
                    event.to_string(),
                    Listener {
                        handler: handler.clone(),
                        event_root: root.clone(),
                    },
                );
                ListenerChange::Replaced
            }
            (Some(_), None) => {
                self.listeners.remove(event);
                ListenerChange::Detached
            }
            (None, Some(handler)) => {
                self.listeners.insert(
                    event.to_string(),
                    Listener {
                        handler: handler.clone(),
                        event_root: root.clone(),
                    },
                );
                ListenerChange::Attached
            }
            (None, None) => ListenerChange::Unchanged,
        }
    }
}

pub enum LiveKind {
    Text(String),
    Element {
        tag: String,
        namespace: Option<String>,
        facts: LiveFacts,
    },
    Widget {
        name: &'static str,
        handle: Box<dyn Any>,
        facts: LiveFacts,
    },
}

pub struct LiveNode {
    kind: LiveKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    event_root: Option<EventRoot>,
}

impl LiveNode {
    fn new(kind: LiveKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            event_root: None,
        }
    }

    pub fn kind(&self) -> &LiveKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Innermost tagger record installed on this node, if any
    pub fn event_root(&self) -> Option<&EventRoot> {
        self.event_root.as_ref()
    }

    pub fn facts(&self) -> Option<&LiveFacts> {
        match &self.kind {
            LiveKind::Text(_) => None,
            LiveKind::Element { facts, .. } | LiveKind::Widget { facts, .. } => Some(facts),
        }
    }

    fn facts_mut(&mut self) -> Option<&mut LiveFacts> {
        match &mut self.kind {
            LiveKind::Text(_) => None,
            LiveKind::Element { facts, .. } | LiveKind::Widget { facts, .. } => Some(facts),
        }
    }
}

/// Counters for structural and listener churn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentStats {
    pub nodes_created: usize,
    pub nodes_freed: usize,
    pub listeners_attached: usize,
    pub listeners_detached: usize,
    pub handlers_swapped: usize,
}

/// Result of delivering one event occurrence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers whose decoder produced a message
    pub delivered: usize,
    pub propagation_stopped: bool,
    pub default_prevented: bool,
}

#[derive(Default)]
pub struct Document {
    slots: Vec<Option<LiveNode>>,
    free_slots: Vec<u32>,
    live: usize,
    stats: DocumentStats,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn stats(&self) -> DocumentStats {
        self.stats
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.slots.get(id.index()), Some(Some(_)))
    }

    pub fn node(&self, id: NodeId) -> VdomResult<&LiveNode> {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(VdomError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> VdomResult<&mut LiveNode> {
        self.slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(VdomError::UnknownNode(id))
    }

    fn alloc(&mut self, node: LiveNode) -> NodeId {
        self.live += 1;
        self.stats.nodes_created += 1;
        match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(node);
                NodeId(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeId((self.slots.len() - 1) as u32)
            }
        }
    }

    pub(crate) fn create_text(&mut self, value: &str) -> NodeId {
        self.alloc(LiveNode::new(LiveKind::Text(value.to_string())))
    }

    pub(crate) fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> NodeId {
        self.alloc(LiveNode::new(LiveKind::Element {
            tag: tag.to_string(),
            namespace: namespace.map(str::to_string),
            facts: LiveFacts::default(),
        }))
    }

    pub(crate) fn create_widget(&mut self, name: &'static str, handle: Box<dyn Any>) -> NodeId {
        self.alloc(LiveNode::new(LiveKind::Widget {
            name,
            handle,
            facts: LiveFacts::default(),
        }))
    }

    pub fn children(&self, id: NodeId) -> VdomResult<&[NodeId]> {
        Ok(&self.node(id)?.children)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.parent)
    }

    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) -> VdomResult<()> {
        let len = self.node(parent)?.children.len();
        self.insert_child(parent, len, child)
    }

    /// Insert at `position`, clamped to the end of the child list
    pub(crate) fn insert_child(
        &mut self,
        parent: NodeId,
        position: usize,
        child: NodeId,
    ) -> VdomResult<()> {
        if self.node(child)?.parent.is_some() {
            self.detach(child)?;
        }
        let parent_node = self.node_mut(parent)?;
        if matches!(parent_node.kind, LiveKind::Text(_)) {
            return Err(VdomError::NotAnElement(parent));
        }
        let position = position.min(parent_node.children.len());
        parent_node.children.insert(position, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    pub(crate) fn remove_child_at(&mut self, parent: NodeId, position: usize) -> VdomResult<NodeId> {
        let parent_node = self.node_mut(parent)?;
        if position >= parent_node.children.len() {
            return Err(VdomError::integrity(format!(
                "{parent} has no child at position {position}"
            )));
        }
        let child = parent_node.children.remove(position);
        self.node_mut(child)?.parent = None;
        Ok(child)
    }

    /// Unlink a node from its parent; the subtree stays allocated
    pub(crate) fn detach(&mut self, id: NodeId) -> VdomResult<()> {
        let Some(parent) = self.node_mut(id)?.parent.take() else {
            return Ok(());
        };
        let siblings = &mut self.node_mut(parent)?.children;
        match siblings.iter().position(|&c| c == id) {
            Some(position) => {
                siblings.remove(position);
                Ok(())
            }
            None => Err(VdomError::integrity(format!(
                "{id} names {parent} as parent but is not among its children"
            ))),
        }
    }

    /// Put `new` where `old` is and free the old subtree
    pub(crate) fn replace(&mut self, old: NodeId, new: NodeId) -> VdomResult<()> {
        if let Some(parent) = self.node(old)?.parent {
            let siblings = &mut self.node_mut(parent)?.children;
            let position = siblings.iter().position(|&c| c == old).ok_or_else(|| {
                VdomError::integrity(format!("{old} missing from children of {parent}"))
            })?;
            siblings[position] = new;
            self.node_mut(new)?.parent = Some(parent);
            self.node_mut(old)?.parent = None;
        }
        self.free(old)?;
        Ok(())
    }

    /// Detach and deallocate a whole subtree; returns the number of nodes freed
    pub(crate) fn free(&mut self, id: NodeId) -> VdomResult<usize> {
        self.detach(id)?;
        let mut stack = vec![id];
        let mut freed = 0;
        while let Some(next) = stack.pop() {
            let node = self
                .slots
                .get_mut(next.index())
                .and_then(Option::take)
                .ok_or(VdomError::UnknownNode(next))?;
            if let Some(facts) = node.facts() {
                self.stats.listeners_detached += facts.listeners.len();
            }
            stack.extend(node.children.iter().copied());
            self.free_slots.push(next.0);
            freed += 1;
        }
        self.live -= freed;
        self.stats.nodes_freed += freed;
        Ok(freed)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).ok()?.kind {
            LiveKind::Text(value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn set_text(&mut self, id: NodeId, value: &str) -> VdomResult<()> {
        match &mut self.node_mut(id)?.kind {
            LiveKind::Text(current) => {
                value.clone_into(current);
                Ok(())
            }
            _ => Err(VdomError::NotAText(id)),
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).ok()?.kind {
            LiveKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn property(&self, id: NodeId, key: &str) -> Option<&Value> {
        self.node(id).ok()?.facts()?.properties.get(key)
    }

    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&str> {
        self.node(id)
            .ok()?
            .facts()?
            .attributes
            .get(key)
            .map(String::as_str)
    }

    pub fn attribute_ns(&self, id: NodeId, key: &str) -> Option<&NsAttribute> {
        self.node(id).ok()?.facts()?.attributes_ns.get(key)
    }

    pub fn style(&self, id: NodeId, key: &str) -> Option<&str> {
        self.node(id).ok()?.facts()?.styles.get(key).map(String::as_str)
    }

    pub fn listener(&self, id: NodeId, event: &str) -> Option<&Listener> {
        self.node(id).ok()?.facts()?.listeners.get(event)
    }

    pub fn widget_handle<H: 'static>(&self, id: NodeId) -> Option<&H> {
        match &self.node(id).ok()?.kind {
            LiveKind::Widget { handle, .. } => handle.downcast_ref::<H>(),
            _ => None,
        }
    }

    pub(crate) fn with_widget_handle(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut dyn Any) -> VdomResult<()>,
    ) -> VdomResult<()> {
        match &mut self.node_mut(id)?.kind {
            LiveKind::Widget { handle, .. } => f(&mut **handle),
            _ => Err(VdomError::integrity(format!("{id} is not a widget"))),
        }
    }

    pub fn event_root(&self, id: NodeId) -> Option<&EventRoot> {
        self.node(id).ok()?.event_root.as_ref()
    }

    pub(crate) fn set_event_root(&mut self, id: NodeId, root: EventRoot) -> VdomResult<()> {
        self.node_mut(id)?.event_root = Some(root);
        Ok(())
    }

    /// The tagger record a `Tagged` snapshot at `id` installed: the record in
    /// the node's chain whose parent is `enclosing`
    pub(crate) fn tagger_root(&self, id: NodeId, enclosing: &EventRoot) -> VdomResult<EventRoot> {
        let mut current = self.node(id)?.event_root.as_ref();
        while let Some(root) = current {
            match root.parent() {
                Some(parent) if parent.ptr_eq(enclosing) => return Ok(root.clone()),
                Some(parent) => current = Some(parent),
                None => break,
            }
        }
        Err(VdomError::integrity(format!(
            "{id} carries no tagger record under the expected event root"
        )))
    }

    fn record_listener_change(&mut self, change: ListenerChange) {
        match change {
            ListenerChange::Unchanged => {}
            ListenerChange::Attached => self.stats.listeners_attached += 1,
            ListenerChange::Swapped => self.stats.handlers_swapped += 1,
            ListenerChange::Replaced => {
                self.stats.listeners_detached += 1;
                self.stats.listeners_attached += 1;
            }
            ListenerChange::Detached => self.stats.listeners_detached += 1,
        }
    }

    /// Install a full fact set on a freshly created node
    pub(crate) fn apply_facts(
        &mut self,
        id: NodeId,
        organized: &OrganizedFacts,
        root: &EventRoot,
    ) -> VdomResult<()> {
        let facts = self
            .node_mut(id)?
            .facts_mut()
            .ok_or(VdomError::NotAnElement(id))?;
        facts.properties.extend(
            organized
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        facts.attributes.extend(
            organized
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        facts.attributes_ns.extend(
            organized
                .attributes_ns
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        facts.styles.extend(
            organized
                .styles
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let changes: Vec<ListenerChange> = organized
            .events
            .iter()
            .map(|(event, handler)| facts.set_listener(event, Some(handler), root))
            .collect();
        for change in changes {
            self.record_listener_change(change);
        }
        Ok(())
    }

    /// Apply bucketed deltas produced by the differ
    pub(crate) fn apply_facts_diff(
        &mut self,
        id: NodeId,
        diff: &FactsDiff,
        root: &EventRoot,
    ) -> VdomResult<()> {
        let facts = self
            .node_mut(id)?
            .facts_mut()
            .ok_or(VdomError::NotAnElement(id))?;
        for (key, value) in &diff.properties {
            match value {
                Some(value) => {
                    facts.properties.insert(key.clone(), value.clone());
                }
                None => {
                    facts.properties.remove(key);
                }
            }
        }
        for (key, value) in &diff.attributes {
            match value {
                Some(value) => {
                    facts.attributes.insert(key.clone(), value.clone());
                }
                None => {
                    facts.attributes.remove(key);
                }
            }
        }
        for (key, delta) in &diff.attributes_ns {
            match &delta.value {
                Some(value) => {
                    facts.attributes_ns.insert(
                        key.clone(),
                        NsAttribute {
                            namespace: delta.namespace.clone(),
                            value: value.clone(),
                        },
                    );
                }
                None => {
                    facts.attributes_ns.remove(key);
                }
            }
        }
        for (key, value) in &diff.styles {
            if value.is_empty() {
                facts.styles.remove(key);
            } else {
                facts.styles.insert(key.clone(), value.clone());
            }
        }
        let changes: Vec<ListenerChange> = diff
            .events
            .iter()
            .map(|(event, handler)| facts.set_listener(event, handler.as_ref(), root))
            .collect();
        for change in changes {
            self.record_listener_change(change);
        }
        Ok(())
    }

    /// Fire `event` at `target` and bubble it through the ancestors
    ///
    /// The sink runs while the document is borrowed; it should queue messages
    /// rather than re-enter the reconciler.
    pub fn dispatch_event(
        &self,
        target: NodeId,
        event: &str,
        payload: &Value,
    ) -> VdomResult<DispatchOutcome> {
        let mut outcome = DispatchOutcome::default();
        let mut current = Some(target);
        while let Some(id) = current {
            let node = self.node(id)?;
            if let Some(listener) = node.facts().and_then(|f| f.listeners.get(event)) {
                if let Some(result) = listener.handler.decode(payload) {
                    outcome.delivered += 1;
                    outcome.default_prevented |= result.prevent_default;
                    tracing::trace!(node = %id, event, "delivering event");
                    listener
                        .event_root
                        .send(result.message, result.stop_propagation);
                    if result.stop_propagation {
                        outcome.propagation_stopped = true;
                        break;
                    }
                }
            }
            current = node.parent;
        }
        Ok(outcome)
    }

    /// Pre-order list of `root` and everything below it
    pub fn subtree(&self, root: NodeId) -> VdomResult<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node(id)?;
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(out)
    }

    pub fn descendant_count(&self, id: NodeId) -> VdomResult<usize> {
        Ok(self.subtree(id)?.len() - 1)
    }

    /// Verify parent/child links below `root`; returns the number of nodes reached
    pub fn check_integrity(&self, root: NodeId) -> VdomResult<usize> {
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                return Err(VdomError::integrity(format!("{id} reachable twice")));
            }
            let node = self.node(id)?;
            if matches!(node.kind, LiveKind::Text(_)) && !node.children.is_empty() {
                return Err(VdomError::integrity(format!("text node {id} has children")));
            }
            for &child in &node.children {
                let child_node = self.node(child)?;
                if child_node.parent != Some(id) {
                    return Err(VdomError::integrity(format!(
                        "{child} listed under {id} but points at {:?}",
                        child_node.parent
                    )));
                }
                stack.push(child);
            }
        }
        Ok(seen.len())
    }

    /// Deterministic markup rendering, used to compare documents observably
    pub fn to_html(&self, id: NodeId) -> VdomResult<String> {
        let mut out = String::new();
        self.write_html(id, &mut out)?;
        Ok(out)
    }

    fn write_html(&self, id: NodeId, out: &mut String) -> VdomResult<()> {
        let node = self.node(id)?;
        match &node.kind {
            LiveKind::Text(value) => out.push_str(&escape(value)),
            LiveKind::Element {
                tag,
                namespace,
                facts,
            } => {
                out.push('<');
                out.push_str(tag);
                if let Some(ns) = namespace {
                    out.push_str(&format!(" xmlns=\"{}\"", escape(ns)));
                }
                write_facts(facts, out);
                out.push('>');
                for &child in &node.children {
                    self.write_html(child, out)?;
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            LiveKind::Widget { name, facts, .. } => {
                out.push_str("<widget name=\"");
                out.push_str(name);
                out.push('"');
                write_facts(facts, out);
                out.push_str("/>");
            }
        }
        Ok(())
    }
}

fn write_facts(facts: &LiveFacts, out: &mut String) {
    for (key, value) in &facts.attributes {
        out.push_str(&format!(" {key}=\"{}\"", escape(value)));
    }
    for (key, attr) in &facts.attributes_ns {
        out.push_str(&format!(
            " {{{}}}{key}=\"{}\"",
            escape(&attr.namespace),
            escape(&attr.value)
        ));
    }
    for (key, value) in &facts.properties {
        out.push_str(&format!(" .{key}={}", escape(&value.to_string())));
    }
    if !facts.styles.is_empty() {
        let styles: Vec<String> = facts
            .styles
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect();
        out.push_str(&format!(" style=\"{}\"", escape(&styles.join(";"))));
    }
    for event in facts.listeners.keys() {
        out.push_str(&format!(" on:{event}"));
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
