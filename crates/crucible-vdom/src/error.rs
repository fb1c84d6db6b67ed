//! Reconciliation error types

use crate::document::NodeId;
use thiserror::Error;

/// Errors surfaced by render, diff and apply
///
/// Shape mismatches between snapshots are never errors; they fall back to a
/// whole-subtree redraw. Everything here is either an engine bug or a widget
/// hook failure that is handed back to the caller untouched.
#[derive(Debug, Error)]
pub enum VdomError {
    /// A patch index could not be resolved to a live node
    #[error("No live node located for patch at index {index}")]
    MissingLiveNode {
        /// Traversal index of the patch
        index: usize,
    },

    /// A node id that is not (or no longer) part of the document
    #[error("Unknown live node {0}")]
    UnknownNode(NodeId),

    /// An element operation targeted a non-element node
    #[error("Live node {0} is not an element")]
    NotAnElement(NodeId),

    /// A text operation targeted a non-text node
    #[error("Live node {0} is not a text node")]
    NotAText(NodeId),

    /// A widget render/diff/apply hook failed
    #[error("Widget hook failed: {0}")]
    Widget(String),

    /// Widget state or patch payload had an unexpected type
    #[error("Widget state mismatch for {widget}")]
    WidgetStateMismatch {
        /// Type name of the widget implementation
        widget: &'static str,
    },

    /// Structural integrity check failed after an update
    #[error("Document integrity violated: {0}")]
    Integrity(String),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Specialized Result type for reconciliation
pub type VdomResult<T> = Result<T, VdomError>;

impl VdomError {
    /// Create a widget hook failure
    pub fn widget(msg: impl Into<String>) -> Self {
        Self::Widget(msg.into())
    }

    /// Create an integrity failure
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True when the error points at a bug inside the engine itself
    pub fn is_engine_bug(&self) -> bool {
        matches!(
            self,
            Self::MissingLiveNode { .. }
                | Self::UnknownNode(_)
                | Self::NotAnElement(_)
                | Self::NotAText(_)
                | Self::Integrity(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingLiveNode { .. } => "missing_live_node",
            Self::UnknownNode(_) => "unknown_node",
            Self::NotAnElement(_) => "not_an_element",
            Self::NotAText(_) => "not_a_text",
            Self::Widget(_) => "widget",
            Self::WidgetStateMismatch { .. } => "widget_state",
            Self::Integrity(_) => "integrity",
            Self::Config(_) => "config",
        }
    }
}
