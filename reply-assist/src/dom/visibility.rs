use crate::dom::{HostDom, NodeId, Selector};

/// Whether `node` is rendered: attached, not hidden by computed style, and
/// with a non-empty layout box.
pub fn is_visible<D: HostDom + ?Sized>(dom: &D, node: NodeId) -> bool {
    if !dom.is_connected(node) {
        return false;
    }
    let Some(style) = dom.computed_style(node) else {
        return false;
    };
    if style.display == "none" || style.visibility == "hidden" || style.opacity <= 0.0 {
        return false;
    }
    !dom.bounding_rect(node).is_empty()
}

/// First visible match, trying each selector in priority order.
pub fn first_visible<D: HostDom + ?Sized>(dom: &D, selectors: &[Selector]) -> Option<NodeId> {
    selectors.iter().find_map(|selector| {
        dom.query_all(selector)
            .into_iter()
            .find(|node| is_visible(dom, *node))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;
    use crate::geometry::{Rect, Size};

    fn dom() -> MemoryDom {
        MemoryDom::new("/home", Size::new(1280.0, 800.0))
    }

    #[test]
    fn laid_out_element_is_visible() {
        let mut dom = dom();
        let body = dom.body();
        let node = dom.element(body, "div", &[]);
        dom.set_rect(node, Rect::new(10.0, 10.0, 100.0, 20.0));
        assert!(is_visible(&dom, node));
    }

    #[test]
    fn zero_box_is_not_visible() {
        let mut dom = dom();
        let body = dom.body();
        let node = dom.element(body, "div", &[]);
        assert!(!is_visible(&dom, node));
    }

    #[test]
    fn hidden_ancestor_hides_descendants() {
        let mut dom = dom();
        let body = dom.body();
        let wrapper = dom.element(body, "div", &[]);
        let node = dom.element(wrapper, "span", &[]);
        dom.set_rect(wrapper, Rect::new(0.0, 0.0, 100.0, 100.0));
        dom.set_rect(node, Rect::new(0.0, 0.0, 50.0, 20.0));
        assert!(is_visible(&dom, node));

        dom.set_style(wrapper, "display", "none").unwrap();
        assert!(!is_visible(&dom, node));

        dom.set_style(wrapper, "display", "block").unwrap();
        dom.set_style(node, "visibility", "hidden").unwrap();
        assert!(!is_visible(&dom, node));
    }

    #[test]
    fn detached_node_is_not_visible() {
        let mut dom = dom();
        let body = dom.body();
        let node = dom.element(body, "div", &[]);
        dom.set_rect(node, Rect::new(0.0, 0.0, 10.0, 10.0));
        dom.remove(node);
        assert!(!is_visible(&dom, node));
    }

    #[test]
    fn first_visible_respects_selector_priority() {
        let mut dom = dom();
        let body = dom.body();
        let low = dom.element(body, "div", &[("data-testid", "low")]);
        // Unlaid-out match comes first in document order and must be skipped.
        dom.element(body, "div", &[("data-testid", "high")]);
        let high = dom.element(body, "div", &[("data-testid", "high")]);
        dom.set_rect(low, Rect::new(0.0, 0.0, 10.0, 10.0));
        dom.set_rect(high, Rect::new(0.0, 20.0, 10.0, 10.0));

        let selectors = vec![
            Selector::parse(r#"[data-testid="high"]"#).unwrap(),
            Selector::parse(r#"[data-testid="low"]"#).unwrap(),
        ];
        assert_eq!(first_visible(&dom, &selectors), Some(high));
    }
}
