pub mod memory;
pub mod selector;
mod visibility;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::geometry::{Rect, Size};

pub use memory::MemoryDom;
pub use selector::{ElementView, Selector, SelectorError};
pub use visibility::{first_visible, is_visible};

/// Opaque handle to a host node. Handles are weak: a node may be detached
/// or discarded by the host at any time, so every use re-checks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("node {0} does not exist")]
    Missing(NodeId),
    #[error("node {0} is not attached to the document")]
    Detached(NodeId),
    #[error("node {0} is not an editable text field")]
    NotAField(NodeId),
    #[error("selection range operation failed: {0}")]
    Range(String),
    #[error("failed to dispatch `{event}`: {reason}")]
    Dispatch { event: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
        }
    }
}

/// How a host text field stores its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `contenteditable` element; the text lives in its child nodes.
    ContentEditable,
    /// `<input>` / `<textarea>`; the text lives in the `value` property.
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    BeforeInput,
    Input,
    Change,
    KeyDown,
    KeyUp,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::BeforeInput => "beforeinput",
            EventKind::Input => "input",
            EventKind::Change => "change",
            EventKind::KeyDown => "keydown",
            EventKind::KeyUp => "keyup",
        }
    }
}

/// An event synthesized by the overlay and dispatched on a host node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntheticEvent {
    pub kind: EventKind,
    pub bubbles: bool,
    pub cancelable: bool,
    pub input_type: Option<String>,
    pub data: Option<String>,
    pub key: Option<String>,
    pub key_code: Option<u32>,
}

impl SyntheticEvent {
    pub fn bubbling(kind: EventKind) -> Self {
        Self {
            kind,
            bubbles: true,
            cancelable: false,
            input_type: None,
            data: None,
            key: None,
            key_code: None,
        }
    }
}

/// Everything the overlay needs from the host document.
///
/// Reads never fail: a missing node reads as empty, invisible and
/// parentless. A detached node keeps its last content, so callers check
/// [`HostDom::is_connected`] before trusting it. Writes report faults through
/// [`DomError`] so callers can log and degrade.
pub trait HostDom {
    fn location_path(&self) -> String;
    fn viewport(&self) -> Size;
    fn body(&self) -> NodeId;

    /// All connected elements matching `selector`, in document order.
    fn query_all(&self, selector: &Selector) -> Vec<NodeId>;
    fn matches(&self, node: NodeId, selector: &Selector) -> bool;
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn is_connected(&self, node: NodeId) -> bool;
    fn tag_name(&self, node: NodeId) -> Option<String>;
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;
    fn text_content(&self, node: NodeId) -> String;
    fn computed_style(&self, node: NodeId) -> Option<ComputedStyle>;
    fn bounding_rect(&self, node: NodeId) -> Rect;
    /// The `value` property of an input-like field.
    fn field_value(&self, node: NodeId) -> Option<String>;
    fn is_disabled(&self, node: NodeId) -> bool;

    fn create_element(&mut self, tag: &str) -> NodeId;
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError>;
    fn set_style(&mut self, node: NodeId, property: &str, value: &str) -> Result<(), DomError>;
    /// Replaces all children of `node` with a single text node.
    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), DomError>;
    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError>;
    fn insert_before(&mut self, reference: NodeId, node: NodeId) -> Result<(), DomError>;
    /// Detaches `node`. Detaching an already detached node is a no-op.
    fn remove(&mut self, node: NodeId);
    fn set_field_value(&mut self, node: NodeId, value: &str) -> Result<(), DomError>;
    fn set_selection_range(&mut self, node: NodeId, start: usize, end: usize)
    -> Result<(), DomError>;
    /// Collapses the document selection to the end of `node`'s contents.
    fn collapse_selection_to_end(&mut self, node: NodeId) -> Result<(), DomError>;
    fn focus(&mut self, node: NodeId) -> Result<(), DomError>;
    fn dispatch(&mut self, node: NodeId, event: &SyntheticEvent) -> Result<(), DomError>;
    fn set_disabled(&mut self, node: NodeId, disabled: bool) -> Result<(), DomError>;

    fn query_first(&self, selector: &Selector) -> Option<NodeId> {
        self.query_all(selector).into_iter().next()
    }

    /// Whether `node` is `ancestor` or one of its descendants.
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    fn field_kind(&self, node: NodeId) -> Option<FieldKind> {
        if let Some(editable) = self.attribute(node, "contenteditable") {
            let editable = editable.to_ascii_lowercase();
            if editable.is_empty() || editable == "true" || editable == "plaintext-only" {
                return Some(FieldKind::ContentEditable);
            }
        }
        match self.tag_name(node)?.to_ascii_lowercase().as_str() {
            "input" | "textarea" => Some(FieldKind::Value),
            _ => None,
        }
    }

    /// The text a user would see in the field.
    fn field_text(&self, node: NodeId) -> Option<String> {
        match self.field_kind(node)? {
            FieldKind::ContentEditable => Some(self.text_content(node)),
            FieldKind::Value => self.field_value(node),
        }
    }
}
