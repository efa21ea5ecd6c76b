use std::fmt;

use serde::Serialize;

use crate::classifier::ViewMode;
use crate::dom::NodeId;

/// Binds a panel to the button invocation that opened it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayButton {
    pub node: NodeId,
    pub context_id: ContextId,
    pub container: NodeId,
}

/// Session-wide mutable state. Everything here describes the current page
/// and is reset together on navigation.
#[derive(Debug, Default)]
pub struct SessionState {
    pub button: Option<OverlayButton>,
    pub view_mode: Option<ViewMode>,
    pub last_input: Option<NodeId>,
    next_context: u64,
}

impl SessionState {
    pub fn button_present(&self) -> bool {
        self.button.is_some()
    }

    pub fn next_context_id(&mut self) -> ContextId {
        self.next_context += 1;
        ContextId(self.next_context)
    }

    /// Clears every page-bound reference. Context ids keep counting so an id
    /// from a previous page never matches a new one.
    pub fn reset(&mut self) {
        self.button = None;
        self.view_mode = None;
        self.last_input = None;
    }
}
