use crate::dom::{DomError, HostDom, Selector, is_visible};
use crate::extract::{
    ExtractionInput, ExtractionMethod, ExtractionStrategy, is_excluded, trimmed_len,
};

/// Scans the document for host content markers above the anchor.
pub struct AttributeStrategy {
    markers: Vec<Selector>,
    min_chars: usize,
}

impl AttributeStrategy {
    pub fn new(markers: Vec<Selector>, min_chars: usize) -> Self {
        Self { markers, min_chars }
    }
}

impl<D: HostDom + ?Sized> ExtractionStrategy<D> for AttributeStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::AttributeSelector
    }

    fn try_extract(&self, dom: &D, input: &ExtractionInput<'_>) -> Result<Option<String>, DomError> {
        for selector in &self.markers {
            for node in dom.query_all(selector) {
                if is_excluded(dom, node, input.excluded) || !is_visible(dom, node) {
                    continue;
                }
                if dom.bounding_rect(node).top >= input.anchor.top {
                    continue;
                }
                let text = dom.text_content(node);
                if trimmed_len(&text) > self.min_chars {
                    return Ok(Some(text.trim().to_string()));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ViewMode;
    use crate::config::OverlayConfig;
    use crate::dom::{MemoryDom, NodeId};
    use crate::geometry::{Rect, Size};

    fn strategy() -> AttributeStrategy {
        let config = OverlayConfig::default();
        AttributeStrategy::new(
            config.compile().unwrap().content_markers,
            config.extraction.attribute_min_chars,
        )
    }

    fn marker(dom: &mut MemoryDom, text: &str, top: f64) -> NodeId {
        let body = dom.body();
        let node = dom.element(body, "div", &[("data-testid", "tweetText")]);
        dom.set_text(node, text).unwrap();
        dom.set_rect(node, Rect::new(0.0, top, 500.0, 40.0));
        node
    }

    fn run(dom: &MemoryDom, anchor_top: f64) -> Option<String> {
        let input = ExtractionInput {
            anchor: Rect::new(0.0, anchor_top, 40.0, 30.0),
            anchor_node: None,
            excluded: &[],
            view_mode: ViewMode::Detail,
            path: "/a/status/1",
        };
        strategy().try_extract(dom, &input).unwrap()
    }

    #[test]
    fn first_marker_strictly_above_anchor_wins() {
        let mut dom = MemoryDom::new("/a/status/1", Size::new(1280.0, 800.0));
        marker(&mut dom, "short", 100.0);
        marker(&mut dom, "  The post this reply answers  ", 150.0);
        marker(&mut dom, "A marker level with the anchor", 600.0);

        assert_eq!(run(&dom, 600.0).as_deref(), Some("The post this reply answers"));
    }

    #[test]
    fn exactly_minimum_length_is_rejected() {
        let mut dom = MemoryDom::new("/a/status/1", Size::new(1280.0, 800.0));
        marker(&mut dom, "0123456789", 100.0);
        assert_eq!(run(&dom, 600.0), None);
    }
}
