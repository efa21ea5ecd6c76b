//! The quick-reply panel: one lazily created node, bound to the button
//! invocation that opened it.

mod placement;

use tracing::{debug, warn};

use crate::config::{PANEL_ACTION_ATTR, PANEL_ID, PanelConfig, QuickReply};
use crate::dom::{DomError, HostDom, NodeId};
use crate::extract::ExtractionResult;
use crate::geometry::{Point, Rect, Size};
use crate::state::{ContextId, OverlayButton};

pub use placement::place_panel;

const HEADER_TEXT: &str = "Quick Replies";
const PROCESSED_ACTION: &str = "processed";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopupState {
    pub visible: bool,
    pub context_id: Option<ContextId>,
    pub source_button: Option<NodeId>,
    pub extraction: Option<ExtractionResult>,
    pub processed: Option<String>,
}

/// Content of a freshly opened panel.
#[derive(Debug, Clone)]
pub struct PanelContent {
    pub extraction: ExtractionResult,
    pub processed: String,
}

#[derive(Debug)]
pub struct Panel {
    node: Option<NodeId>,
    state: PopupState,
    /// Action element and the text it inserts.
    actions: Vec<(NodeId, String)>,
    config: PanelConfig,
    quick_replies: Vec<QuickReply>,
}

impl Panel {
    pub fn new(config: PanelConfig, quick_replies: Vec<QuickReply>) -> Self {
        Self {
            node: None,
            state: PopupState::default(),
            actions: Vec::new(),
            config,
            quick_replies,
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn state(&self) -> &PopupState {
        &self.state
    }

    pub fn is_visible(&self) -> bool {
        self.state.visible
    }

    /// Whether the panel is currently showing for `button`'s invocation.
    pub fn is_showing_for(&self, button: &OverlayButton) -> bool {
        self.state.visible && self.state.context_id == Some(button.context_id)
    }

    pub fn show<D: HostDom + ?Sized>(
        &mut self,
        dom: &mut D,
        anchor: Rect,
        button: &OverlayButton,
        content: PanelContent,
    ) -> Result<Point, DomError> {
        self.hide(dom);

        let node = self.ensure_node(dom)?;
        self.render(dom, node, &content.processed)?;

        let measured = dom.bounding_rect(node);
        let size = if measured.is_empty() {
            Size::new(self.config.width, self.config.height)
        } else {
            measured.size()
        };
        let position = place_panel(anchor, size, dom.viewport(), &self.config);
        dom.set_style(node, "left", &format!("{}px", position.left))?;
        dom.set_style(node, "top", &format!("{}px", position.top))?;
        dom.set_style(node, "display", "block")?;

        debug!(
            context = %button.context_id,
            method = ?content.extraction.method,
            left = position.left,
            top = position.top,
            "panel shown"
        );
        self.state = PopupState {
            visible: true,
            context_id: Some(button.context_id),
            source_button: Some(button.node),
            extraction: Some(content.extraction),
            processed: Some(content.processed),
        };
        Ok(position)
    }

    /// Idempotent. Clears the bound invocation so a stale panel is never
    /// reused.
    pub fn hide<D: HostDom + ?Sized>(&mut self, dom: &mut D) {
        if let Some(node) = self.node {
            if let Err(err) = dom.set_style(node, "display", "none") {
                warn!(%node, "failed to hide panel: {err}");
            }
        }
        if self.state.visible {
            debug!("panel hidden");
        }
        self.state = PopupState::default();
    }

    /// Navigation teardown: hidden, emptied, unbound.
    pub fn reset<D: HostDom + ?Sized>(&mut self, dom: &mut D) {
        self.hide(dom);
        if let Some(node) = self.node {
            if let Err(err) = dom.set_text(node, "") {
                warn!(%node, "failed to clear panel content: {err}");
            }
        }
        self.actions.clear();
    }

    pub fn contains<D: HostDom + ?Sized>(&self, dom: &D, target: NodeId) -> bool {
        self.node.is_some_and(|node| dom.contains(node, target))
    }

    /// Text inserted by the panel action containing `target`, if any.
    pub fn action_text<D: HostDom + ?Sized>(&self, dom: &D, target: NodeId) -> Option<String> {
        if !self.state.visible {
            return None;
        }
        self.actions
            .iter()
            .find(|(action, _)| dom.contains(*action, target))
            .map(|(_, text)| text.clone())
    }

    fn ensure_node<D: HostDom + ?Sized>(&mut self, dom: &mut D) -> Result<NodeId, DomError> {
        if let Some(node) = self.node {
            if !dom.is_connected(node) {
                // The host wiped part of the page; re-home the same node.
                let body = dom.body();
                dom.append_child(body, node)?;
            }
            return Ok(node);
        }

        let node = dom.create_element("div");
        dom.set_attribute(node, "id", PANEL_ID)?;
        dom.set_attribute(node, "role", "dialog")?;
        dom.set_style(node, "position", "fixed")?;
        dom.set_style(node, "z-index", "10000")?;
        dom.set_style(node, "display", "none")?;
        let body = dom.body();
        dom.append_child(body, node)?;
        self.node = Some(node);
        Ok(node)
    }

    fn render<D: HostDom + ?Sized>(
        &mut self,
        dom: &mut D,
        node: NodeId,
        processed: &str,
    ) -> Result<(), DomError> {
        dom.set_text(node, "")?;
        self.actions.clear();

        let header = dom.create_element("div");
        dom.set_attribute(header, "class", "reply-assist-header")?;
        dom.set_text(header, HEADER_TEXT)?;
        dom.append_child(node, header)?;

        let primary = dom.create_element("div");
        dom.set_attribute(primary, "class", "reply-assist-processed")?;
        dom.set_attribute(primary, PANEL_ACTION_ATTR, PROCESSED_ACTION)?;
        dom.set_attribute(primary, "role", "button")?;
        dom.set_text(primary, processed)?;
        dom.append_child(node, primary)?;
        self.actions.push((primary, processed.to_string()));

        for (index, reply) in self.quick_replies.iter().enumerate() {
            let item = dom.create_element("div");
            dom.set_attribute(item, "class", "reply-assist-suggestion")?;
            dom.set_attribute(item, PANEL_ACTION_ATTR, &index.to_string())?;
            dom.set_attribute(item, "role", "button")?;

            if !reply.icon.is_empty() {
                let icon = dom.create_element("span");
                dom.set_attribute(icon, "class", "reply-assist-icon")?;
                dom.set_text(icon, &reply.icon)?;
                dom.append_child(item, icon)?;
            }
            let label = dom.create_element("span");
            dom.set_text(label, &reply.text)?;
            dom.append_child(item, label)?;

            dom.append_child(node, item)?;
            self.actions.push((item, reply.text.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlayConfig;
    use crate::dom::{MemoryDom, Selector};
    use crate::extract::ExtractionMethod;

    fn panel() -> Panel {
        let config = OverlayConfig::default();
        Panel::new(config.panel, config.quick_replies)
    }

    fn content(text: &str) -> PanelContent {
        PanelContent {
            extraction: ExtractionResult {
                text: text.to_string(),
                method: ExtractionMethod::Fallback,
                elapsed_ms: 0,
            },
            processed: text.to_string(),
        }
    }

    fn button(id: u64) -> OverlayButton {
        OverlayButton {
            node: NodeId(100 + id),
            context_id: ContextId(id),
            container: NodeId(0),
        }
    }

    fn panel_nodes(dom: &MemoryDom) -> usize {
        dom.query_all(&Selector::parse(&format!("#{PANEL_ID}")).unwrap())
            .len()
    }

    #[test]
    fn repeated_show_reuses_single_node() {
        let mut dom = MemoryDom::new("/home", Size::new(1280.0, 800.0));
        let mut panel = panel();
        let anchor = Rect::new(600.0, 500.0, 32.0, 32.0);

        for id in 1..=5 {
            panel.show(&mut dom, anchor, &button(id), content("Thanks")).unwrap();
        }

        assert_eq!(panel_nodes(&dom), 1);
        assert_eq!(panel.state().context_id, Some(ContextId(5)));
        let node = panel.node().unwrap();
        assert_eq!(dom.style(node, "display"), Some("block"));
        assert_eq!(dom.style(node, "left"), Some("382px"));
        assert_eq!(dom.style(node, "top"), Some("322px"));
    }

    #[test]
    fn content_lists_processed_text_then_quick_replies() {
        let mut dom = MemoryDom::new("/home", Size::new(1280.0, 800.0));
        let mut panel = panel();
        panel
            .show(&mut dom, Rect::new(600.0, 500.0, 32.0, 32.0), &button(1), content("Hello world"))
            .unwrap();

        let text = dom.text_content(panel.node().unwrap());
        assert_eq!(
            text,
            "Quick RepliesHello world👍Thank you📧Contact Us via email☀️Have a great day"
        );
        let actions: Vec<&str> = panel.actions.iter().map(|(_, text)| text.as_str()).collect();
        assert_eq!(
            actions,
            vec!["Hello world", "Thank you", "Contact Us via email", "Have a great day"]
        );
    }

    #[test]
    fn hide_is_idempotent_and_unbinds() {
        let mut dom = MemoryDom::new("/home", Size::new(1280.0, 800.0));
        let mut panel = panel();
        panel.hide(&mut dom);
        panel
            .show(&mut dom, Rect::new(600.0, 500.0, 32.0, 32.0), &button(1), content("Hi there"))
            .unwrap();
        assert!(panel.is_showing_for(&button(1)));
        assert!(!panel.is_showing_for(&button(2)));

        panel.hide(&mut dom);
        panel.hide(&mut dom);
        assert_eq!(panel.state(), &PopupState::default());
        assert_eq!(dom.style(panel.node().unwrap(), "display"), Some("none"));
    }

    #[test]
    fn action_lookup_resolves_nested_targets() {
        let mut dom = MemoryDom::new("/home", Size::new(1280.0, 800.0));
        let mut panel = panel();
        panel
            .show(&mut dom, Rect::new(600.0, 500.0, 32.0, 32.0), &button(1), content("Hi there"))
            .unwrap();

        let (item, _) = panel.actions[2];
        let label = dom.query_all(&Selector::parse(".reply-assist-suggestion span").unwrap())
            .into_iter()
            .find(|span| dom.contains(item, *span) && dom.text_content(*span) == "Contact Us via email")
            .unwrap();
        assert_eq!(panel.action_text(&dom, label).as_deref(), Some("Contact Us via email"));

        let header = dom.query_first(&Selector::parse(".reply-assist-header").unwrap()).unwrap();
        assert!(panel.contains(&dom, header));
        assert_eq!(panel.action_text(&dom, header), None);
    }

    #[test]
    fn detached_panel_is_rehomed() {
        let mut dom = MemoryDom::new("/home", Size::new(1280.0, 800.0));
        let mut panel = panel();
        let anchor = Rect::new(600.0, 500.0, 32.0, 32.0);
        panel.show(&mut dom, anchor, &button(1), content("Hi there")).unwrap();
        let node = panel.node().unwrap();
        dom.remove(node);

        panel.show(&mut dom, anchor, &button(2), content("Hi there")).unwrap();
        assert_eq!(panel.node(), Some(node));
        assert!(dom.is_connected(node));
        assert_eq!(panel_nodes(&dom), 1);
    }
}
