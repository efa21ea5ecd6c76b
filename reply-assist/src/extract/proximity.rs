use std::cmp::Ordering;
use std::collections::HashSet;

use crate::config::ExtractionConfig;
use crate::dom::{DomError, HostDom, NodeId, Selector, is_visible};
use crate::extract::{
    ExtractionInput, ExtractionMethod, ExtractionStrategy, is_excluded, trimmed_len,
};
use crate::geometry::Rect;

/// Picks the plausible text block nearest above the anchor.
pub struct ProximityStrategy {
    text_bearing: Vec<Selector>,
    config: ExtractionConfig,
}

#[derive(Debug)]
struct Candidate {
    above: bool,
    distance: f64,
    chars: usize,
    text: String,
}

impl ProximityStrategy {
    pub fn new(text_bearing: Vec<Selector>, config: ExtractionConfig) -> Self {
        Self {
            text_bearing,
            config,
        }
    }

    fn is_anchor_lineage<D: HostDom + ?Sized>(dom: &D, anchor: Option<NodeId>, node: NodeId) -> bool {
        let Some(anchor) = anchor else {
            return false;
        };
        // Ancestors would swallow the whole thread; the subtree is the draft.
        dom.contains(node, anchor) || dom.contains(anchor, node)
    }

    fn candidate(&self, rect: Rect, anchor: Rect, text: String) -> Candidate {
        let above = rect.top < anchor.top;
        let distance = if above {
            (anchor.top - rect.bottom()).max(0.0)
        } else {
            (rect.top - anchor.top).abs()
        };
        Candidate {
            above,
            distance,
            chars: trimmed_len(&text),
            text,
        }
    }
}

impl<D: HostDom + ?Sized> ExtractionStrategy<D> for ProximityStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Proximity
    }

    fn try_extract(&self, dom: &D, input: &ExtractionInput<'_>) -> Result<Option<String>, DomError> {
        if input.anchor.is_empty() {
            return Ok(None);
        }
        let config = &self.config;
        let region = input.anchor.expand(
            config.horizontal_margin,
            config.upward_margin,
            config.downward_margin,
        );

        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut candidates = Vec::new();
        for selector in &self.text_bearing {
            for node in dom.query_all(selector) {
                if !seen.insert(node) {
                    continue;
                }

                if is_excluded(dom, node, input.excluded)
                    || Self::is_anchor_lineage(dom, input.anchor_node, node)
                    || !is_visible(dom, node)
                {
                    continue;
                }
                let rect = dom.bounding_rect(node);
                if !rect.intersects(&region) {
                    continue;
                }
                let text = dom.text_content(node).trim().to_string();
                let chars = text.chars().count();
                if chars < config.min_text_chars || chars > config.max_text_chars {
                    continue;
                }
                candidates.push(self.candidate(rect, input.anchor, text));
            }
        }

        candidates.sort_by(|a, b| {
            b.above
                .cmp(&a.above)
                .then(a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal))
                .then(a.chars.cmp(&b.chars))
        });
        Ok(candidates.into_iter().next().map(|candidate| candidate.text))
    }
}
