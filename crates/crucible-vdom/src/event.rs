//! Event handlers, message mappers and the event-root indirection chain
//!
//! A listener installed on a live node never captures the mapper chain
//! directly. It holds an [`EventRoot`], a small linked record that is walked
//! at fire time, so a retag patch only has to overwrite the record in place.
//!
//! ```text
//! listener ──> EventRoot::Tagger [g] ──> EventRoot::Tagger [f] ──> EventRoot::Sink
//!              (inner map)               (outer map)               dispatch(msg, sync)
//! ```

use serde_json::Value;
use std::any::{type_name, Any};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A type-erased application message
pub type Message = Box<dyn Any>;

/// Application message sink: `dispatch(message, is_synchronous)`
pub type Sink = Rc<dyn Fn(Message, bool)>;

/// Rewrites messages emitted by descendant handlers
#[derive(Clone)]
pub struct Mapper(Rc<dyn Fn(Message) -> Message>);

impl Mapper {
    /// Wrap a typed closure; messages of any other type pass through unchanged
    pub fn new<A: 'static, B: 'static>(f: impl Fn(A) -> B + 'static) -> Self {
        Self(Rc::new(move |msg: Message| match msg.downcast::<A>() {
            Ok(inner) => Box::new(f(*inner)) as Message,
            Err(msg) => {
                tracing::error!(
                    expected = type_name::<A>(),
                    "mapper received a message of an unexpected type"
                );
                msg
            }
        }))
    }

    /// Reference equality
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn call(&self, msg: Message) -> Message {
        (self.0)(msg)
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mapper({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Flattened mapper chain, outermost first
#[derive(Debug, Clone, Default)]
pub struct MapperChain(Vec<Mapper>);

impl MapperChain {
    pub fn new(mappers: Vec<Mapper>) -> Self {
        Self(mappers)
    }

    pub fn single(mapper: Mapper) -> Self {
        Self(vec![mapper])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Mapper> {
        self.0.iter()
    }

    pub(crate) fn push(&mut self, mapper: Mapper) {
        self.0.push(mapper);
    }

    /// Same length and every position reference-equal
    pub fn pairwise_ptr_eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(other.0.iter()).all(|(a, b)| a.ptr_eq(b))
    }

    /// Apply the chain innermost-first
    pub fn apply(&self, mut msg: Message) -> Message {
        for mapper in self.0.iter().rev() {
            msg = mapper.call(msg);
        }
        msg
    }
}

/// What a decoder produced for one event occurrence
pub struct EventOutcome {
    pub message: Message,
    pub stop_propagation: bool,
    pub prevent_default: bool,
}

impl EventOutcome {
    pub fn message<M: 'static>(message: M) -> Self {
        Self {
            message: Box::new(message),
            stop_propagation: false,
            prevent_default: false,
        }
    }
}

/// Handler flavour; a facts patch only swaps handlers in place within a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Normal,
    MayStopPropagation,
    MayPreventDefault,
    Custom,
}

type Decoder = Rc<dyn Fn(&Value) -> Option<EventOutcome>>;

/// An event binding: a decoder from the event payload to a message
#[derive(Clone)]
pub struct Handler {
    kind: HandlerKind,
    decoder: Decoder,
}

impl Handler {
    /// Plain handler; never stops propagation or prevents default
    pub fn normal<M: 'static>(decode: impl Fn(&Value) -> Option<M> + 'static) -> Self {
        Self {
            kind: HandlerKind::Normal,
            decoder: Rc::new(move |payload| decode(payload).map(EventOutcome::message)),
        }
    }

    /// Handler that always emits a clone of `message`
    pub fn message<M: Clone + 'static>(message: M) -> Self {
        Self::normal(move |_| Some(message.clone()))
    }

    /// Decoder also decides whether to stop propagation
    pub fn may_stop_propagation<M: 'static>(
        decode: impl Fn(&Value) -> Option<(M, bool)> + 'static,
    ) -> Self {
        Self {
            kind: HandlerKind::MayStopPropagation,
            decoder: Rc::new(move |payload| {
                decode(payload).map(|(msg, stop)| EventOutcome {
                    message: Box::new(msg),
                    stop_propagation: stop,
                    prevent_default: false,
                })
            }),
        }
    }

    /// Decoder also decides whether to prevent the default action
    pub fn may_prevent_default<M: 'static>(
        decode: impl Fn(&Value) -> Option<(M, bool)> + 'static,
    ) -> Self {
        Self {
            kind: HandlerKind::MayPreventDefault,
            decoder: Rc::new(move |payload| {
                decode(payload).map(|(msg, prevent)| EventOutcome {
                    message: Box::new(msg),
                    stop_propagation: false,
                    prevent_default: prevent,
                })
            }),
        }
    }

    /// Decoder controls both flags
    pub fn custom(decode: impl Fn(&Value) -> Option<EventOutcome> + 'static) -> Self {
        Self {
            kind: HandlerKind::Custom,
            decoder: Rc::new(decode),
        }
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Same kind and the very same decoder
    pub fn equivalent(&self, other: &Self) -> bool {
        self.kind == other.kind && Rc::ptr_eq(&self.decoder, &other.decoder)
    }

    pub fn decode(&self, payload: &Value) -> Option<EventOutcome> {
        (self.decoder)(payload)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("kind", &self.kind)
            .field("decoder", &(Rc::as_ptr(&self.decoder) as *const ()))
            .finish()
    }
}

enum EventRootNode {
    Sink(Sink),
    Tagger {
        mappers: RefCell<MapperChain>,
        parent: EventRoot,
    },
}

/// Mutable indirection record resolving a fired event to its routing chain
#[derive(Clone)]
pub struct EventRoot(Rc<EventRootNode>);

impl EventRoot {
    /// The application sink at the top of every chain
    pub fn sink(dispatch: impl Fn(Message, bool) + 'static) -> Self {
        Self(Rc::new(EventRootNode::Sink(Rc::new(dispatch))))
    }

    pub(crate) fn tagger(mappers: MapperChain, parent: &EventRoot) -> Self {
        Self(Rc::new(EventRootNode::Tagger {
            mappers: RefCell::new(mappers),
            parent: parent.clone(),
        }))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn parent(&self) -> Option<&EventRoot> {
        match &*self.0 {
            EventRootNode::Sink(_) => None,
            EventRootNode::Tagger { parent, .. } => Some(parent),
        }
    }

    /// Current mappers of a tagger record; `None` for the sink
    pub fn mappers(&self) -> Option<MapperChain> {
        match &*self.0 {
            EventRootNode::Sink(_) => None,
            EventRootNode::Tagger { mappers, .. } => Some(mappers.borrow().clone()),
        }
    }

    /// Number of tagger records between this root and the sink
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Some(parent) = current.parent() {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Overwrite the mapper chain in place
    pub(crate) fn retag(&self, chain: MapperChain) {
        match &*self.0 {
            EventRootNode::Tagger { mappers, .. } => *mappers.borrow_mut() = chain,
            EventRootNode::Sink(_) => {
                tracing::warn!("retag targeted the application sink; ignoring");
            }
        }
    }

    /// Route a message up the chain and into the sink
    pub fn send(&self, mut message: Message, is_sync: bool) {
        let mut current = self.clone();
        loop {
            let next = match &*current.0 {
                EventRootNode::Sink(dispatch) => {
                    dispatch(message, is_sync);
                    return;
                }
                EventRootNode::Tagger { mappers, parent } => {
                    let chain = mappers.borrow().clone();
                    message = chain.apply(message);
                    parent.clone()
                }
            };
            current = next;
        }
    }
}

impl fmt::Debug for EventRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            EventRootNode::Sink(_) => write!(f, "EventRoot::Sink"),
            EventRootNode::Tagger { mappers, parent } => f
                .debug_struct("EventRoot::Tagger")
                .field("mappers", &mappers.borrow().len())
                .field("parent", parent)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collecting_sink() -> (EventRoot, Rc<RefCell<Vec<(String, bool)>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink_seen = seen.clone();
        let root = EventRoot::sink(move |msg, sync| {
            let msg = msg.downcast::<String>().map(|s| *s).unwrap_or_default();
            sink_seen.borrow_mut().push((msg, sync));
        });
        (root, seen)
    }

    #[test]
    fn chain_applies_innermost_first() {
        let outer = Mapper::new(|s: String| format!("outer({s})"));
        let inner = Mapper::new(|s: String| format!("inner({s})"));
        let chain = MapperChain::new(vec![outer, inner]);

        let out = chain.apply(Box::new("x".to_string()));
        assert_eq!(*out.downcast::<String>().unwrap(), "outer(inner(x))");
    }

    #[test]
    fn mapper_passes_through_wrong_type() {
        let mapper = Mapper::new(|n: u32| n + 1);
        let out = mapper.call(Box::new("not a number"));
        assert_eq!(*out.downcast::<&str>().unwrap(), "not a number");
    }

    #[test]
    fn send_walks_to_sink() {
        let (sink, seen) = collecting_sink();
        let outer = EventRoot::tagger(
            MapperChain::single(Mapper::new(|s: String| format!("a:{s}"))),
            &sink,
        );
        let inner = EventRoot::tagger(
            MapperChain::single(Mapper::new(|s: String| format!("b:{s}"))),
            &outer,
        );

        inner.send(Box::new("click".to_string()), true);
        assert_eq!(seen.borrow().as_slice(), &[("a:b:click".to_string(), true)]);
        assert_eq!(inner.depth(), 2);
    }

    #[test]
    fn retag_is_visible_to_existing_holders() {
        let (sink, seen) = collecting_sink();
        let root = EventRoot::tagger(
            MapperChain::single(Mapper::new(|s: String| format!("f:{s}"))),
            &sink,
        );
        let held_by_listener = root.clone();

        root.retag(MapperChain::single(Mapper::new(|s: String| format!("g:{s}"))));
        held_by_listener.send(Box::new("x".to_string()), false);

        assert_eq!(seen.borrow()[0].0, "g:x");
    }

    #[test]
    fn handler_equivalence_requires_same_decoder() {
        let a = Handler::message("go".to_string());
        let b = a.clone();
        let c = Handler::message("go".to_string());

        assert!(a.equivalent(&b));
        assert!(!a.equivalent(&c));
    }

    #[test]
    fn handler_flags_follow_kind() {
        let handler = Handler::may_stop_propagation(|v: &Value| {
            v.get("key").and_then(Value::as_str).map(|k| (k.to_string(), true))
        });
        let outcome = handler.decode(&json!({"key": "Enter"})).unwrap();
        assert!(outcome.stop_propagation);
        assert!(!outcome.prevent_default);
        assert!(handler.decode(&json!({})).is_none());
        assert_eq!(handler.kind(), HandlerKind::MayStopPropagation);
    }
}
