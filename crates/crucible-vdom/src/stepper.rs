//! Update driver and draw coalescing
//!
//! [`Reconciler`] owns the live document and the snapshot it reflects, and
//! turns each new snapshot into one diff + apply round. [`Animator`] sits in
//! front of it and collapses bursts of model updates into one draw per frame:
//!
//! ```text
//!            request(async)             on_frame()
//!   Idle ──────────────────> Scheduled ───────────> Drawing ──> Idle
//!    ^                          │  request(_) only replaces     │
//!    │                          │  the pending model            │
//!    └──────────────────────────┴───────────────────────────────┘
//! ```

use crate::apply::apply;
use crate::config::ReconcileConfig;
use crate::diff::Differ;
use crate::document::{DispatchOutcome, Document, NodeId};
use crate::error::{VdomError, VdomResult};
use crate::event::{EventRoot, Message};
use crate::node::Node;
use crate::patch::{count_patches, describe};
use crate::render::render;
use serde_json::Value;

/// What one [`Reconciler::update`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReport {
    /// Patches applied, nested ones included
    pub patches: usize,
    /// The live root was redrawn and now has a new id
    pub root_replaced: bool,
}

/// Owns a live document and keeps it in step with successive snapshots
pub struct Reconciler {
    document: Document,
    root: NodeId,
    current: Node,
    event_root: EventRoot,
    config: ReconcileConfig,
}

impl Reconciler {
    /// Render the initial snapshot; listeners deliver messages to `sink`
    pub fn mount(
        snapshot: Node,
        sink: impl Fn(Message, bool) + 'static,
        config: ReconcileConfig,
    ) -> VdomResult<Self> {
        let event_root = EventRoot::sink(sink);
        let mut document = Document::new();
        let root = render(&mut document, &snapshot, &event_root)?;
        tracing::debug!(root = %root, nodes = document.len(), "mounted");

        let reconciler = Self {
            document,
            root,
            current: snapshot,
            event_root,
            config,
        };
        if reconciler.config.verify_integrity {
            reconciler.verify()?;
        }
        Ok(reconciler)
    }

    /// Bring the live document in line with `snapshot`
    pub fn update(&mut self, snapshot: Node) -> VdomResult<UpdateReport> {
        let patches = Differ::new(&self.config).diff(&self.current, &snapshot)?;
        let count = count_patches(&patches);
        if self.config.trace_patches {
            for line in describe(&patches) {
                tracing::debug!(patch = %line, "applying");
            }
        }

        let root = apply(
            &mut self.document,
            self.root,
            &self.current,
            patches,
            &self.event_root,
        )?;
        let root_replaced = root != self.root;
        if root_replaced {
            tracing::debug!(old = %self.root, new = %root, "root replaced");
        }
        self.root = root;
        self.current = snapshot;

        if self.config.verify_integrity {
            self.verify()?;
        }
        Ok(UpdateReport {
            patches: count,
            root_replaced,
        })
    }

    fn verify(&self) -> VdomResult<()> {
        let reached = self.document.check_integrity(self.root)?;
        if reached != self.document.len() {
            return Err(VdomError::integrity(format!(
                "{} live nodes unreachable from root {}",
                self.document.len() - reached.min(self.document.len()),
                self.root
            )));
        }
        Ok(())
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The snapshot the live document currently reflects
    pub fn current(&self) -> &Node {
        &self.current
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn dispatch_event(
        &self,
        target: NodeId,
        event: &str,
        payload: &Value,
    ) -> VdomResult<DispatchOutcome> {
        self.document.dispatch_event(target, event, payload)
    }

    pub fn html(&self) -> VdomResult<String> {
        self.document.to_html(self.root)
    }
}

/// Draw scheduling state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawState {
    /// Nothing pending
    Idle,
    /// A frame has been requested; the latest model is drawn when it fires
    Scheduled,
    /// Inside the draw callback
    Drawing,
}

/// Outcome of [`Animator::request`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRequest {
    /// Caller should arrange for [`Animator::on_frame`] to run
    RequestFrame,
    /// A frame is already pending; the model was replaced
    AlreadyScheduled,
    /// Drawn immediately
    DrewSynchronously,
}

/// Coalesces model updates into at most one draw per frame
pub struct Animator<M> {
    model: M,
    state: DrawState,
    /// Latest model not yet drawn
    dirty: bool,
    draws: usize,
    draw: Box<dyn FnMut(&M)>,
}

impl<M> Animator<M> {
    /// Draws `model` once right away
    pub fn new(model: M, draw: impl FnMut(&M) + 'static) -> Self {
        let mut animator = Self {
            model,
            state: DrawState::Idle,
            dirty: false,
            draws: 0,
            draw: Box::new(draw),
        };
        animator.draw_now();
        animator
    }

    pub fn state(&self) -> DrawState {
        self.state
    }

    pub fn draws(&self) -> usize {
        self.draws
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn request(&mut self, model: M, is_sync: bool) -> FrameRequest {
        self.model = model;
        if is_sync {
            let resume = self.state;
            self.draw_now();
            // a pending frame stays pending but has nothing left to draw
            self.state = resume;
            return FrameRequest::DrewSynchronously;
        }

        self.dirty = true;
        match self.state {
            DrawState::Idle => {
                self.state = DrawState::Scheduled;
                FrameRequest::RequestFrame
            }
            DrawState::Scheduled | DrawState::Drawing => FrameRequest::AlreadyScheduled,
        }
    }

    /// Frame callback; returns whether a draw happened
    pub fn on_frame(&mut self) -> bool {
        if self.state != DrawState::Scheduled {
            tracing::trace!(state = ?self.state, "frame without a pending request");
            return false;
        }
        let drew = self.dirty;
        if drew {
            self.draw_now();
        }
        self.state = DrawState::Idle;
        drew
    }

    fn draw_now(&mut self) {
        self.state = DrawState::Drawing;
        (self.draw)(&self.model);
        self.draws += 1;
        self.dirty = false;
        self.state = DrawState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Handler;
    use crate::facts::Fact;
    use crate::node::{element, text};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn counter_view(n: u32) -> Node {
        element(
            "div",
            [],
            [
                text(n.to_string()),
                element("button", [Fact::on("click", Handler::message(1u32))], []),
            ],
        )
    }

    #[test]
    fn mount_update_and_dispatch() {
        let inbox = Rc::new(RefCell::new(Vec::new()));
        let writer = inbox.clone();
        let mut reconciler = Reconciler::mount(
            counter_view(0),
            move |msg, is_sync| {
                if let Ok(n) = msg.downcast::<u32>() {
                    writer.borrow_mut().push((*n, is_sync));
                }
            },
            ReconcileConfig::strict(),
        )
        .unwrap();
        assert_eq!(reconciler.html().unwrap(), "<div>0<button on:click></button></div>");

        let report = reconciler.update(counter_view(1)).unwrap();
        assert!(!report.root_replaced);
        assert!(report.patches >= 1);
        assert!(reconciler.html().unwrap().starts_with("<div>1"));

        let button = reconciler.document().children(reconciler.root()).unwrap()[1];
        reconciler.dispatch_event(button, "click", &json!({})).unwrap();
        assert_eq!(inbox.borrow().as_slice(), &[(1, false)]);
    }

    #[test]
    fn root_replacement_is_reported() {
        let mut reconciler =
            Reconciler::mount(text("a"), |_, _| {}, ReconcileConfig::strict()).unwrap();
        let before = reconciler.root();
        let report = reconciler.update(element("p", [], [])).unwrap();
        assert!(report.root_replaced);
        assert_ne!(reconciler.root(), before);
        assert_eq!(reconciler.document().len(), 1);
    }

    #[test]
    fn identical_update_is_empty() {
        let tree = counter_view(3);
        let mut reconciler =
            Reconciler::mount(tree.clone(), |_, _| {}, ReconcileConfig::default()).unwrap();
        let report = reconciler.update(tree).unwrap();
        assert_eq!(report.patches, 0);
    }

    fn recording_animator() -> (Animator<u32>, Rc<RefCell<Vec<u32>>>) {
        let drawn = Rc::new(RefCell::new(Vec::new()));
        let writer = drawn.clone();
        let animator = Animator::new(0, move |m: &u32| writer.borrow_mut().push(*m));
        (animator, drawn)
    }

    #[test]
    fn initial_model_is_drawn() {
        let (animator, drawn) = recording_animator();
        assert_eq!(animator.state(), DrawState::Idle);
        assert_eq!(drawn.borrow().as_slice(), &[0]);
    }

    #[test]
    fn async_requests_coalesce_into_one_frame() {
        let (mut animator, drawn) = recording_animator();
        assert_eq!(animator.request(1, false), FrameRequest::RequestFrame);
        assert_eq!(animator.request(2, false), FrameRequest::AlreadyScheduled);
        assert_eq!(animator.request(3, false), FrameRequest::AlreadyScheduled);
        assert_eq!(animator.state(), DrawState::Scheduled);

        assert!(animator.on_frame());
        assert_eq!(animator.state(), DrawState::Idle);
        assert_eq!(drawn.borrow().as_slice(), &[0, 3]);
        assert!(!animator.on_frame());
    }

    #[test]
    fn sync_request_draws_immediately() {
        let (mut animator, drawn) = recording_animator();
        assert_eq!(animator.request(5, true), FrameRequest::DrewSynchronously);
        assert_eq!(drawn.borrow().as_slice(), &[0, 5]);
        assert_eq!(animator.state(), DrawState::Idle);
    }

    #[test]
    fn sync_draw_leaves_pending_frame_with_nothing_to_do() {
        let (mut animator, drawn) = recording_animator();
        animator.request(1, false);
        animator.request(2, true);
        assert_eq!(animator.state(), DrawState::Scheduled);
        assert!(!animator.on_frame());
        assert_eq!(drawn.borrow().as_slice(), &[0, 2]);
        assert_eq!(animator.draws(), 2);
    }
}
