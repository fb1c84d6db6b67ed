//! Snapshot tree model
//!
//! A [`Node`] is an immutable, cheaply cloned handle. Application code builds
//! a fresh tree per render but is free to reuse unchanged subtrees; the differ
//! treats reference-equal nodes as unchanged without looking inside them.
//!
//! Every element records its descendant count at construction. The count is
//! what the patch applier uses to skip untouched regions of the live tree:
//!
//! ```text
//! div            index 0, descendants 4
//! ├── p          index 1, descendants 1
//! │   └── "a"    index 2
//! └── map f      index 3, descendants 1
//!     └── "b"    index 4
//! ```

use crate::event::{Mapper, MapperChain};
use crate::facts::{Fact, OrganizedFacts};
use crate::widget::WidgetInstance;
use std::any::Any;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

/// Immutable snapshot node
#[derive(Clone)]
pub struct Node(Rc<NodeKind>);

pub enum NodeKind {
    Text(String),
    Element(ElementNode),
    Keyed(KeyedNode),
    Custom(CustomNode),
    Tagged(TaggedNode),
    Thunk(ThunkNode),
}

pub struct ElementNode {
    pub tag: String,
    pub namespace: Option<String>,
    pub facts: OrganizedFacts,
    pub children: Vec<Node>,
    descendants: usize,
}

pub struct KeyedNode {
    pub tag: String,
    pub namespace: Option<String>,
    pub facts: OrganizedFacts,
    pub children: Vec<(String, Node)>,
    descendants: usize,
}

pub struct CustomNode {
    pub facts: OrganizedFacts,
    pub widget: WidgetInstance,
}

pub struct TaggedNode {
    pub mappers: MapperChain,
    pub inner: Node,
    descendants: usize,
}

/// Lazily computed subtree, memoized on the identity of its arguments
pub struct ThunkNode {
    view: usize,
    args: Vec<Rc<dyn Any>>,
    compute: Rc<dyn Fn() -> Node>,
    cached: OnceCell<Node>,
}

impl ThunkNode {
    /// Same view function and every argument reference-equal
    pub fn same_args(&self, other: &ThunkNode) -> bool {
        self.view == other.view
            && self.args.len() == other.args.len()
            && self
                .args
                .iter()
                .zip(other.args.iter())
                .all(|(a, b)| Rc::ptr_eq(a, b))
    }

    /// Compute the subtree once; later calls return the cached node
    pub fn force(&self) -> &Node {
        self.cached.get_or_init(|| (self.compute)())
    }

    pub fn is_forced(&self) -> bool {
        self.cached.get().is_some()
    }

    /// Take over a previous thunk's result without recomputing
    pub(crate) fn adopt(&self, node: &Node) {
        if self.cached.set(node.clone()).is_err() {
            tracing::trace!("thunk already forced; keeping its own result");
        }
    }

    pub(crate) fn cached(&self) -> Option<&Node> {
        self.cached.get()
    }
}

fn count(children: impl Iterator<Item = usize>) -> usize {
    children.map(|d| d + 1).sum()
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn kind(&self) -> &NodeKind {
        &self.0
    }

    /// Reference equality, the differ's fast path
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of traversal slots below this node
    pub fn descendants(&self) -> usize {
        match &*self.0 {
            NodeKind::Element(e) => e.descendants,
            NodeKind::Keyed(k) => k.descendants,
            NodeKind::Tagged(t) => t.descendants,
            NodeKind::Text(_) | NodeKind::Custom(_) | NodeKind::Thunk(_) => 0,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &*self.0 {
            NodeKind::Text(_) => "text",
            NodeKind::Element(_) => "element",
            NodeKind::Keyed(_) => "keyed",
            NodeKind::Custom(_) => "custom",
            NodeKind::Tagged(_) => "tagged",
            NodeKind::Thunk(_) => "thunk",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &*self.0 {
            NodeKind::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Wrap in a tagger; nested taggers are flattened at diff/render time
    pub fn map(self, mapper: Mapper) -> Node {
        map(mapper, self)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            NodeKind::Text(s) => write!(f, "Text({s:?})"),
            NodeKind::Element(e) => f
                .debug_struct("Element")
                .field("tag", &e.tag)
                .field("facts", &e.facts.keys())
                .field("children", &e.children)
                .finish(),
            NodeKind::Keyed(k) => f
                .debug_struct("Keyed")
                .field("tag", &k.tag)
                .field("facts", &k.facts.keys())
                .field("children", &k.children)
                .finish(),
            NodeKind::Custom(c) => f.debug_tuple("Custom").field(&c.widget).finish(),
            NodeKind::Tagged(t) => f
                .debug_struct("Tagged")
                .field("mappers", &t.mappers.len())
                .field("inner", &t.inner)
                .finish(),
            NodeKind::Thunk(t) => f
                .debug_struct("Thunk")
                .field("args", &t.args.len())
                .field("forced", &t.is_forced())
                .finish(),
        }
    }
}

pub fn text(value: impl Into<String>) -> Node {
    Node::new(NodeKind::Text(value.into()))
}

pub fn element(
    tag: impl Into<String>,
    facts: impl IntoIterator<Item = Fact>,
    children: impl IntoIterator<Item = Node>,
) -> Node {
    build_element(tag.into(), None, facts, children)
}

pub fn element_ns(
    namespace: impl Into<String>,
    tag: impl Into<String>,
    facts: impl IntoIterator<Item = Fact>,
    children: impl IntoIterator<Item = Node>,
) -> Node {
    build_element(tag.into(), Some(namespace.into()), facts, children)
}

fn build_element(
    tag: String,
    namespace: Option<String>,
    facts: impl IntoIterator<Item = Fact>,
    children: impl IntoIterator<Item = Node>,
) -> Node {
    let children: Vec<Node> = children.into_iter().collect();
    let descendants = count(children.iter().map(Node::descendants));
    Node::new(NodeKind::Element(ElementNode {
        tag,
        namespace,
        facts: OrganizedFacts::organize(facts),
        children,
        descendants,
    }))
}

pub fn keyed<K: Into<String>>(
    tag: impl Into<String>,
    facts: impl IntoIterator<Item = Fact>,
    children: impl IntoIterator<Item = (K, Node)>,
) -> Node {
    build_keyed(tag.into(), None, facts, children)
}

pub fn keyed_ns<K: Into<String>>(
    namespace: impl Into<String>,
    tag: impl Into<String>,
    facts: impl IntoIterator<Item = Fact>,
    children: impl IntoIterator<Item = (K, Node)>,
) -> Node {
    build_keyed(tag.into(), Some(namespace.into()), facts, children)
}

fn build_keyed<K: Into<String>>(
    tag: String,
    namespace: Option<String>,
    facts: impl IntoIterator<Item = Fact>,
    children: impl IntoIterator<Item = (K, Node)>,
) -> Node {
    let children: Vec<(String, Node)> = children
        .into_iter()
        .map(|(key, node)| (key.into(), node))
        .collect();
    let descendants = count(children.iter().map(|(_, node)| node.descendants()));
    Node::new(NodeKind::Keyed(KeyedNode {
        tag,
        namespace,
        facts: OrganizedFacts::organize(facts),
        children,
        descendants,
    }))
}

pub fn custom(facts: impl IntoIterator<Item = Fact>, widget: WidgetInstance) -> Node {
    Node::new(NodeKind::Custom(CustomNode {
        facts: OrganizedFacts::organize(facts),
        widget,
    }))
}

pub fn map(mapper: Mapper, inner: Node) -> Node {
    map_chain(MapperChain::single(mapper), inner)
}

/// Tagger carrying several mappers at once, outermost first
pub fn map_chain(mappers: MapperChain, inner: Node) -> Node {
    let descendants = 1 + inner.descendants();
    Node::new(NodeKind::Tagged(TaggedNode {
        mappers,
        inner,
        descendants,
    }))
}

/// Memoize `view(arg)` on the identity of `view` and `arg`
pub fn lazy<A: 'static>(view: fn(&A) -> Node, arg: Rc<A>) -> Node {
    let args: Vec<Rc<dyn Any>> = vec![arg.clone()];
    Node::new(NodeKind::Thunk(ThunkNode {
        view: view as usize,
        args,
        compute: Rc::new(move || view(&arg)),
        cached: OnceCell::new(),
    }))
}

pub fn lazy2<A: 'static, B: 'static>(view: fn(&A, &B) -> Node, a: Rc<A>, b: Rc<B>) -> Node {
    let args: Vec<Rc<dyn Any>> = vec![a.clone(), b.clone()];
    Node::new(NodeKind::Thunk(ThunkNode {
        view: view as usize,
        args,
        compute: Rc::new(move || view(&a, &b)),
        cached: OnceCell::new(),
    }))
}

/// Memoize an arbitrary closure; only `args` take part in the identity check
pub fn thunk(args: Vec<Rc<dyn Any>>, compute: impl Fn() -> Node + 'static) -> Node {
    Node::new(NodeKind::Thunk(ThunkNode {
        view: 0,
        args,
        compute: Rc::new(compute),
        cached: OnceCell::new(),
    }))
}

/// Flatten nested taggers: the combined chain (outermost first) and the first
/// non-tagger node underneath
pub(crate) fn flatten_tagged(tagged: &TaggedNode) -> (MapperChain, &Node) {
    let mut chain = tagged.mappers.clone();
    let mut inner = &tagged.inner;
    while let NodeKind::Tagged(next) = inner.kind() {
        for mapper in next.mappers.iter() {
            chain.push(mapper.clone());
        }
        inner = &next.inner;
    }
    (chain, inner)
}
