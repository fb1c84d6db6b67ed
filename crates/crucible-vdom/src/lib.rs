//! Virtual tree reconciliation engine
//!
//! Applications describe their UI as immutable [`Node`] snapshots. The engine
//! renders the first snapshot into a live [`Document`], then for every later
//! snapshot computes a minimal-ish list of [`Patch`]es and applies them in
//! place, so live nodes (and whatever identity they carry) survive updates.
//!
//! - **Snapshots are cheap**: nodes are reference counted, and reused
//!   subtrees are skipped by pointer comparison
//! - **Keyed children** move instead of being rebuilt
//! - **Taggers** (`map`) rewrite messages on their way out; changing a tagger
//!   never touches the live tree
//! - **Widgets** embed opaque state behind a render/diff/apply contract
//!
//! # Architecture
//!
//! ```text
//! model -> view() -> Node ──diff(old, new)──> Vec<Patch>
//!                     │                          │
//!                  render()                   apply()
//!                     v                          v
//!                  Document <────────────────────┘
//!                     │
//!              dispatch_event() -> EventRoot chain -> sink(message, is_sync)
//! ```
//!
//! [`Reconciler`] wires these together; [`Animator`] coalesces model updates
//! into one draw per frame.

pub mod apply;
pub mod config;
pub mod diff;
pub mod document;
pub mod error;
pub mod event;
pub mod facts;
pub mod node;
pub mod patch;
pub mod render;
pub mod stepper;
pub mod widget;

#[cfg(any(test, feature = "test-utils"))]
pub mod proptest_strategies;

pub use apply::apply;
pub use config::ReconcileConfig;
pub use diff::{diff, Differ};
pub use document::{DispatchOutcome, Document, DocumentStats, LiveKind, LiveNode, NodeId};
pub use error::{VdomError, VdomResult};
pub use event::{EventOutcome, EventRoot, Handler, HandlerKind, Mapper, MapperChain, Message};
pub use facts::{diff_facts, Fact, FactsDiff, OrganizedFacts};
pub use node::{
    custom, element, element_ns, keyed, keyed_ns, lazy, lazy2, map, map_chain, text, thunk, Node,
    NodeKind,
};
pub use patch::{Patch, PatchKind};
pub use render::render;
pub use stepper::{Animator, DrawState, FrameRequest, Reconciler, UpdateReport};
pub use widget::{Widget, WidgetInstance};
