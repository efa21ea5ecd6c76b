use serde::Serialize;

use crate::config::CompiledSelectors;
use crate::dom::{HostDom, NodeId, first_visible, is_visible};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Listing,
    Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyContext {
    pub view_mode: ViewMode,
    /// The reply input that was matched.
    pub anchor: NodeId,
    /// Where the overlay button belongs.
    pub container: NodeId,
}

/// Decides the view mode purely from the navigation path.
pub fn view_mode_for_path(path: &str, detail_segment: &str) -> ViewMode {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    if path.split('/').any(|segment| segment == detail_segment) {
        ViewMode::Detail
    } else {
        ViewMode::Listing
    }
}

pub struct ContextClassifier<'a> {
    selectors: &'a CompiledSelectors,
    detail_segment: &'a str,
}

impl<'a> ContextClassifier<'a> {
    pub fn new(selectors: &'a CompiledSelectors, detail_segment: &'a str) -> Self {
        Self {
            selectors,
            detail_segment,
        }
    }

    pub fn view_mode<D: HostDom + ?Sized>(&self, dom: &D) -> ViewMode {
        view_mode_for_path(&dom.location_path(), self.detail_segment)
    }

    pub fn find_reply_input<D: HostDom + ?Sized>(&self, dom: &D) -> Option<NodeId> {
        first_visible(dom, &self.selectors.reply_inputs)
    }

    pub fn find_primary_action<D: HostDom + ?Sized>(&self, dom: &D) -> Option<NodeId> {
        first_visible(dom, &self.selectors.primary_actions)
    }

    /// First visible primary action inside `container`, trying selectors in
    /// priority order. Actions elsewhere on the page never shadow it.
    pub fn find_primary_action_in<D: HostDom + ?Sized>(
        &self,
        dom: &D,
        container: NodeId,
    ) -> Option<NodeId> {
        self.selectors.primary_actions.iter().find_map(|selector| {
            dom.query_all(selector)
                .into_iter()
                .find(|node| dom.contains(container, *node) && is_visible(dom, *node))
        })
    }

    /// Any element the host marks as a primary action, visible or not. The
    /// submit control is often rendered disabled and collapsed.
    pub fn find_any_primary_action<D: HostDom + ?Sized>(&self, dom: &D) -> Option<NodeId> {
        self.selectors
            .primary_actions
            .iter()
            .find_map(|selector| dom.query_first(selector))
    }

    pub fn classify<D: HostDom + ?Sized>(&self, dom: &D) -> Option<ReplyContext> {
        let anchor = self.find_reply_input(dom)?;
        let container = self
            .grouped_ancestor(dom, anchor)
            .or_else(|| self.primary_action_parent(dom))?;

        Some(ReplyContext {
            view_mode: self.view_mode(dom),
            anchor,
            container,
        })
    }

    fn grouped_ancestor<D: HostDom + ?Sized>(&self, dom: &D, input: NodeId) -> Option<NodeId> {
        let body = dom.body();
        let mut cursor = dom.parent(input);
        while let Some(node) = cursor {
            if node == body {
                return None;
            }
            if self
                .selectors
                .containers
                .iter()
                .any(|selector| dom.matches(node, selector))
            {
                return Some(node);
            }
            cursor = dom.parent(node);
        }
        None
    }

    fn primary_action_parent<D: HostDom + ?Sized>(&self, dom: &D) -> Option<NodeId> {
        let action = self.find_primary_action(dom)?;
        dom.parent(action).filter(|parent| is_visible(dom, *parent))
    }
}
