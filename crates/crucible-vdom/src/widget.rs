//! Custom widgets: externally rendered leaves with their own diff and patch hooks

use crate::error::{VdomError, VdomResult};
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::rc::Rc;

/// Extension point for embedding content the tree differ cannot see into
/// (charts, maps, editors).
///
/// Two custom nodes are considered the same implementation when their widget
/// types are identical; otherwise the differ redraws the whole leaf.
pub trait Widget: 'static {
    /// Opaque state carried by the snapshot
    type State: 'static;
    /// Live handle produced by `render` and mutated by `apply`
    type Handle: 'static;
    /// Payload produced by `diff` and consumed by `apply`
    type Patch: 'static;

    fn render(&self, state: &Self::State) -> VdomResult<Self::Handle>;

    /// `Ok(None)` means the live handle is already up to date
    fn diff(&self, old: &Self::State, new: &Self::State) -> VdomResult<Option<Self::Patch>>;

    fn apply(&self, handle: &mut Self::Handle, patch: &Self::Patch) -> VdomResult<()>;
}

pub(crate) trait ErasedWidget {
    fn widget_id(&self) -> TypeId;
    fn name(&self) -> &'static str;
    fn render(&self, state: &dyn Any) -> VdomResult<Box<dyn Any>>;
    fn diff(&self, old: &dyn Any, new: &dyn Any) -> VdomResult<Option<Rc<dyn Any>>>;
    fn apply(&self, handle: &mut dyn Any, patch: &dyn Any) -> VdomResult<()>;
}

struct WidgetBox<W>(W);

impl<W: Widget> WidgetBox<W> {
    fn mismatch() -> VdomError {
        VdomError::WidgetStateMismatch {
            widget: type_name::<W>(),
        }
    }
}

impl<W: Widget> ErasedWidget for WidgetBox<W> {
    fn widget_id(&self) -> TypeId {
        TypeId::of::<W>()
    }

    fn name(&self) -> &'static str {
        type_name::<W>()
    }

    fn render(&self, state: &dyn Any) -> VdomResult<Box<dyn Any>> {
        let state = state.downcast_ref::<W::State>().ok_or_else(Self::mismatch)?;
        Ok(Box::new(self.0.render(state)?))
    }

    fn diff(&self, old: &dyn Any, new: &dyn Any) -> VdomResult<Option<Rc<dyn Any>>> {
        let old = old.downcast_ref::<W::State>().ok_or_else(Self::mismatch)?;
        let new = new.downcast_ref::<W::State>().ok_or_else(Self::mismatch)?;
        Ok(self
            .0
            .diff(old, new)?
            .map(|patch| Rc::new(patch) as Rc<dyn Any>))
    }

    fn apply(&self, handle: &mut dyn Any, patch: &dyn Any) -> VdomResult<()> {
        let handle = handle.downcast_mut::<W::Handle>().ok_or_else(Self::mismatch)?;
        let patch = patch.downcast_ref::<W::Patch>().ok_or_else(Self::mismatch)?;
        self.0.apply(handle, patch)
    }
}

/// A widget implementation plus the state for one snapshot
#[derive(Clone)]
pub struct WidgetInstance {
    widget: Rc<dyn ErasedWidget>,
    state: Rc<dyn Any>,
}

impl WidgetInstance {
    pub fn new<W: Widget>(widget: W, state: W::State) -> Self {
        Self {
            widget: Rc::new(WidgetBox(widget)),
            state: Rc::new(state),
        }
    }

    pub fn name(&self) -> &'static str {
        self.widget.name()
    }

    pub(crate) fn same_implementation(&self, other: &Self) -> bool {
        self.widget.widget_id() == other.widget.widget_id()
    }

    pub(crate) fn render(&self) -> VdomResult<Box<dyn Any>> {
        self.widget.render(&*self.state)
    }

    /// Run the widget's diff hook with `self` as the old state
    pub(crate) fn diff(&self, new: &Self) -> VdomResult<Option<WidgetPatch>> {
        Ok(self
            .widget
            .diff(&*self.state, &*new.state)?
            .map(|payload| WidgetPatch {
                widget: new.widget.clone(),
                payload,
            }))
    }
}

impl fmt::Debug for WidgetInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetInstance")
            .field("widget", &self.widget.name())
            .finish()
    }
}

/// Payload of a custom-node patch, applied through the new node's widget
#[derive(Clone)]
pub struct WidgetPatch {
    widget: Rc<dyn ErasedWidget>,
    payload: Rc<dyn Any>,
}

impl WidgetPatch {
    pub(crate) fn apply(&self, handle: &mut dyn Any) -> VdomResult<()> {
        self.widget.apply(handle, &*self.payload)
    }
}

impl fmt::Debug for WidgetPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetPatch")
            .field("widget", &self.widget.name())
            .finish()
    }
}
