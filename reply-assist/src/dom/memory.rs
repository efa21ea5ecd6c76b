//! In-memory [`HostDom`] used for headless simulation and tests.
//!
//! Layout is explicit: every element carries the box it was given with
//! [`MemoryDom::set_rect`], and freshly created elements have an empty box.
//! A couple of host behaviours can be switched on to exercise the overlay's
//! degradation paths: fields that silently revert writes, submit buttons that
//! unlock on `input`, and selection APIs that throw.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::dom::{
    ComputedStyle, DomError, ElementView, EventKind, HostDom, NodeId, Selector, SyntheticEvent,
};
use crate::geometry::{Rect, Size};

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    style: HashMap<String, String>,
    text: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    rect: Rect,
    value: String,
    disabled: bool,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            style: HashMap::new(),
            text: String::new(),
            children: Vec::new(),
            parent: None,
            rect: Rect::default(),
            value: String::new(),
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    pub node: NodeId,
    pub event: SyntheticEvent,
}

#[derive(Debug)]
pub struct MemoryDom {
    nodes: Vec<Node>,
    body: NodeId,
    location: String,
    viewport: Size,
    focused: Option<NodeId>,
    selection: Option<(NodeId, usize, usize)>,
    dispatched: Vec<DispatchRecord>,
    field_writes: HashMap<NodeId, usize>,
    reverting_fields: HashSet<NodeId>,
    submit_bindings: Vec<(NodeId, NodeId)>,
    failing_selection: bool,
}

impl MemoryDom {
    pub fn new(location: &str, viewport: Size) -> Self {
        Self {
            nodes: vec![Node::new("body")],
            body: NodeId(0),
            location: location.to_string(),
            viewport,
            focused: None,
            selection: None,
            dispatched: Vec::new(),
            field_writes: HashMap::new(),
            reverting_fields: HashSet::new(),
            submit_bindings: Vec::new(),
            failing_selection: false,
        }
    }

    /// Appends a new element under `parent` and returns it.
    pub fn element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let node = self.create_element(tag);
        if let Some(data) = self.node_mut(node) {
            for (name, value) in attrs {
                data.attrs.insert((*name).to_string(), (*value).to_string());
            }
        }
        self.link(parent, node, None);
        node
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        if let Some(data) = self.node_mut(node) {
            data.rect = rect;
        }
    }

    pub fn set_location(&mut self, path: &str) {
        self.location = path.to_string();
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
    }

    /// Makes the host throw away every write to `field`, the way a framework
    /// re-renders a controlled input from its own state.
    pub fn revert_writes(&mut self, field: NodeId) {
        self.reverting_fields.insert(field);
    }

    /// Emulates host state tracking: an `input` event on `field` with
    /// non-empty text enables `submit`.
    pub fn bind_submit(&mut self, field: NodeId, submit: NodeId) {
        self.submit_bindings.push((field, submit));
    }

    pub fn fail_selection(&mut self, failing: bool) {
        self.failing_selection = failing;
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub fn selection(&self) -> Option<(NodeId, usize, usize)> {
        self.selection
    }

    pub fn dispatched(&self) -> &[DispatchRecord] {
        &self.dispatched
    }

    pub fn dispatched_on(&self, node: NodeId) -> Vec<EventKind> {
        self.dispatched
            .iter()
            .filter(|record| record.node == node)
            .map(|record| record.event.kind)
            .collect()
    }

    /// Number of text writes attempted on `field`, reverted or not.
    pub fn write_count(&self, field: NodeId) -> usize {
        self.field_writes.get(&field).copied().unwrap_or(0)
    }

    pub fn style(&self, node: NodeId, property: &str) -> Option<&str> {
        self.node(node)?.style.get(property).map(String::as_str)
    }

    fn node(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(node.0 as usize)
    }

    fn node_mut(&mut self, node: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node.0 as usize)
    }

    fn existing(&self, node: NodeId) -> Result<&Node, DomError> {
        self.node(node).ok_or(DomError::Missing(node))
    }

    fn existing_mut(&mut self, node: NodeId) -> Result<&mut Node, DomError> {
        self.node_mut(node).ok_or(DomError::Missing(node))
    }

    fn unlink(&mut self, node: NodeId) {
        let Some(parent) = self.node(node).and_then(|data| data.parent) else {
            return;
        };
        if let Some(parent_data) = self.node_mut(parent) {
            parent_data.children.retain(|child| *child != node);
        }
        if let Some(data) = self.node_mut(node) {
            data.parent = None;
        }
    }

    fn link(&mut self, parent: NodeId, node: NodeId, index: Option<usize>) {
        self.unlink(node);
        if let Some(parent_data) = self.node_mut(parent) {
            match index {
                Some(index) => parent_data.children.insert(index, node),
                None => parent_data.children.push(node),
            }
        }
        if let Some(data) = self.node_mut(node) {
            data.parent = Some(parent);
        }
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        let Some(data) = self.node(node) else {
            return;
        };
        out.push_str(&data.text);
        for child in &data.children {
            self.collect_text(*child, out);
        }
    }

    fn walk(&self, node: NodeId, out: &mut Vec<NodeId>) {
        out.push(node);
        if let Some(data) = self.node(node) {
            for child in &data.children {
                self.walk(*child, out);
            }
        }
    }

    fn record_write(&mut self, field: NodeId) -> bool {
        *self.field_writes.entry(field).or_insert(0) += 1;
        !self.reverting_fields.contains(&field)
    }

    fn apply_host_reactions(&mut self, node: NodeId, kind: EventKind) {
        if kind != EventKind::Input {
            return;
        }
        let has_text = self
            .field_text(node)
            .is_some_and(|text| !text.trim().is_empty());
        if !has_text {
            return;
        }
        let targets: Vec<NodeId> = self
            .submit_bindings
            .iter()
            .filter(|(field, _)| *field == node)
            .map(|(_, submit)| *submit)
            .collect();
        for submit in targets {
            if let Some(data) = self.node_mut(submit) {
                data.disabled = false;
                data.attrs.remove("aria-disabled");
            }
        }
    }
}

/// Borrowed view handed to the selector engine.
struct Elements<'a>(&'a MemoryDom);

impl ElementView for Elements<'_> {
    type Handle = NodeId;

    fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.0.node(node).map(|data| data.tag.as_str())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.0.node(node)?.attrs.get(name).map(String::as_str)
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.0.node(node)?.parent
    }
}

impl HostDom for MemoryDom {
    fn location_path(&self) -> String {
        self.location.clone()
    }

    fn viewport(&self) -> Size {
        self.viewport
    }

    fn body(&self) -> NodeId {
        self.body
    }

    fn query_all(&self, selector: &Selector) -> Vec<NodeId> {
        let view = Elements(self);
        let mut all = Vec::new();
        self.walk(self.body, &mut all);
        all.into_iter()
            .filter(|node| selector.matches(&view, *node))
            .collect()
    }

    fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        self.node(node).is_some() && selector.matches(&Elements(self), node)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.parent
    }

    fn is_connected(&self, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == self.body {
                return true;
            }
            cursor = self.node(current).and_then(|data| data.parent);
        }
        false
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.node(node).map(|data| data.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.node(node)?.attrs.get(name).cloned()
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn computed_style(&self, node: NodeId) -> Option<ComputedStyle> {
        let data = self.node(node)?;
        let mut style = ComputedStyle::default();
        if let Some(display) = data.style.get("display") {
            style.display = display.clone();
        }

        let mut visibility = None;
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            let current_data = self.node(current)?;
            if current_data.style.get("display").map(String::as_str) == Some("none") {
                style.display = "none".to_string();
            }
            if visibility.is_none() {
                visibility = current_data.style.get("visibility").cloned();
            }
            if let Some(opacity) = current_data
                .style
                .get("opacity")
                .and_then(|value| value.parse::<f64>().ok())
            {
                style.opacity *= opacity;
            }
            cursor = current_data.parent;
        }
        if let Some(visibility) = visibility {
            style.visibility = visibility;
        }
        Some(style)
    }

    fn bounding_rect(&self, node: NodeId) -> Rect {
        if !self.is_connected(node) {
            return Rect::default();
        }
        self.node(node).map(|data| data.rect).unwrap_or_default()
    }

    fn field_value(&self, node: NodeId) -> Option<String> {
        let data = self.node(node)?;
        matches!(data.tag.as_str(), "input" | "textarea").then(|| data.value.clone())
    }

    fn is_disabled(&self, node: NodeId) -> bool {
        self.node(node).is_some_and(|data| {
            data.disabled || data.attrs.get("aria-disabled").map(String::as_str) == Some("true")
        })
    }

    fn create_element(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(Node::new(tag));
        id
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.existing_mut(node)?
            .attrs
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn set_style(&mut self, node: NodeId, property: &str, value: &str) -> Result<(), DomError> {
        self.existing_mut(node)?
            .style
            .insert(property.to_string(), value.to_string());
        Ok(())
    }

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), DomError> {
        self.existing(node)?;
        if self.field_kind(node).is_some() && !self.record_write(node) {
            return Ok(());
        }

        let children = std::mem::take(&mut self.existing_mut(node)?.children);
        for child in children {
            if let Some(data) = self.node_mut(child) {
                data.parent = None;
            }
        }
        self.existing_mut(node)?.text = text.to_string();
        Ok(())
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.existing(parent)?;
        self.existing(child)?;
        self.link(parent, child, None);
        Ok(())
    }

    fn insert_before(&mut self, reference: NodeId, node: NodeId) -> Result<(), DomError> {
        self.existing(node)?;
        let parent = self
            .existing(reference)?
            .parent
            .ok_or(DomError::Detached(reference))?;
        self.unlink(node);
        let index = self
            .existing(parent)?
            .children
            .iter()
            .position(|child| *child == reference)
            .ok_or(DomError::Detached(reference))?;
        self.link(parent, node, Some(index));
        Ok(())
    }

    fn remove(&mut self, node: NodeId) {
        if node == self.body {
            return;
        }
        self.unlink(node);
        if self.focused.is_some_and(|focused| !self.is_connected(focused)) {
            self.focused = None;
        }
    }

    fn set_field_value(&mut self, node: NodeId, value: &str) -> Result<(), DomError> {
        if self.field_value(node).is_none() {
            return Err(DomError::NotAField(node));
        }
        if self.record_write(node) {
            self.existing_mut(node)?.value = value.to_string();
        }
        Ok(())
    }

    fn set_selection_range(
        &mut self,
        node: NodeId,
        start: usize,
        end: usize,
    ) -> Result<(), DomError> {
        if self.failing_selection {
            return Err(DomError::Range("setSelectionRange rejected".to_string()));
        }
        let length = self
            .field_value(node)
            .ok_or(DomError::NotAField(node))?
            .chars()
            .count();
        self.selection = Some((node, start.min(length), end.min(length)));
        Ok(())
    }

    fn collapse_selection_to_end(&mut self, node: NodeId) -> Result<(), DomError> {
        if self.failing_selection {
            return Err(DomError::Range("range.collapse failed".to_string()));
        }
        if !self.is_connected(node) {
            return Err(DomError::Detached(node));
        }
        let end = self.text_content(node).chars().count();
        self.selection = Some((node, end, end));
        Ok(())
    }

    fn focus(&mut self, node: NodeId) -> Result<(), DomError> {
        if !self.is_connected(node) {
            return Err(DomError::Detached(node));
        }
        self.focused = Some(node);
        Ok(())
    }

    fn dispatch(&mut self, node: NodeId, event: &SyntheticEvent) -> Result<(), DomError> {
        if !self.is_connected(node) {
            return Err(DomError::Dispatch {
                event: event.kind.as_str(),
                reason: format!("target {node} is detached"),
            });
        }
        self.dispatched.push(DispatchRecord {
            node,
            event: event.clone(),
        });
        self.apply_host_reactions(node, event.kind);
        Ok(())
    }

    fn set_disabled(&mut self, node: NodeId, disabled: bool) -> Result<(), DomError> {
        let data = self.existing_mut(node)?;
        data.disabled = disabled;
        if !disabled {
            data.attrs.remove("aria-disabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dom() -> MemoryDom {
        MemoryDom::new("/home", Size::new(1280.0, 800.0))
    }

    #[test]
    fn insert_before_places_node_ahead_of_reference() {
        let mut dom = dom();
        let body = dom.body();
        let group = dom.element(body, "div", &[("role", "group")]);
        let first = dom.element(group, "span", &[]);
        let submit = dom.element(group, "button", &[]);
        let injected = dom.create_element("div");

        dom.insert_before(submit, injected).unwrap();

        let order = dom.node(group).unwrap().children.clone();
        assert_eq!(order, vec![first, injected, submit]);
        assert!(dom.is_connected(injected));
    }

    #[test]
    fn set_text_replaces_children() {
        let mut dom = dom();
        let body = dom.body();
        let panel = dom.element(body, "div", &[]);
        let child = dom.element(panel, "span", &[]);
        dom.set_text(child, "old").unwrap();
        assert_eq!(dom.text_content(panel), "old");

        dom.set_text(panel, "new").unwrap();
        assert_eq!(dom.text_content(panel), "new");
        assert!(!dom.is_connected(child));
    }

    #[test]
    fn reverting_field_counts_writes_but_keeps_text() {
        let mut dom = dom();
        let body = dom.body();
        let field = dom.element(body, "textarea", &[]);
        dom.revert_writes(field);

        dom.set_field_value(field, "hello").unwrap();
        dom.set_field_value(field, "hello").unwrap();

        assert_eq!(dom.write_count(field), 2);
        assert_eq!(dom.field_text(field).as_deref(), Some(""));
    }

    #[test]
    fn input_event_unlocks_bound_submit() {
        let mut dom = dom();
        let body = dom.body();
        let field = dom.element(body, "div", &[("contenteditable", "true")]);
        let submit = dom.element(body, "button", &[("aria-disabled", "true")]);
        dom.bind_submit(field, submit);
        assert!(dom.is_disabled(submit));

        dom.set_text(field, "hi").unwrap();
        dom.dispatch(field, &SyntheticEvent::bubbling(EventKind::Input))
            .unwrap();
        assert!(!dom.is_disabled(submit));
    }

    #[test]
    fn dispatch_on_detached_node_fails() {
        let mut dom = dom();
        let orphan = dom.create_element("div");
        let result = dom.dispatch(orphan, &SyntheticEvent::bubbling(EventKind::Change));
        assert!(matches!(result, Err(DomError::Dispatch { .. })));
    }
}
