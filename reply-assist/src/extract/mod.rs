//! Best-effort recovery of the text a reply responds to.
//!
//! Strategies run in priority order and the first non-empty result wins.
//! The last strategy never misses, so [`Extractor::extract`] always yields
//! text.

mod attribute;
mod fallback;
mod proximity;

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use crate::classifier::ViewMode;
use crate::config::{CompiledSelectors, ExtractionConfig};
use crate::dom::{DomError, HostDom, NodeId};
use crate::geometry::Rect;
use crate::transform::strip_links;

pub use attribute::AttributeStrategy;
pub use fallback::FallbackStrategy;
pub use proximity::ProximityStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtractionMethod {
    Proximity,
    AttributeSelector,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub text: String,
    pub method: ExtractionMethod,
    pub elapsed_ms: u64,
}

/// Everything a strategy may look at for one extraction.
pub struct ExtractionInput<'a> {
    pub anchor: Rect,
    /// Anchor node, if the anchor is an element; its ancestors are skipped.
    pub anchor_node: Option<NodeId>,
    /// Overlay-owned subtrees that must never be read as host content.
    pub excluded: &'a [NodeId],
    pub view_mode: ViewMode,
    pub path: &'a str,
}

pub type BoxedStrategy<D> = Box<dyn ExtractionStrategy<D> + Send>;

pub trait ExtractionStrategy<D: HostDom + ?Sized> {
    fn method(&self) -> ExtractionMethod;

    /// `Ok(None)` is a miss; an error is logged and also treated as a miss.
    fn try_extract(&self, dom: &D, input: &ExtractionInput<'_>) -> Result<Option<String>, DomError>;
}

pub struct Extractor<D: HostDom + ?Sized> {
    strategies: Vec<BoxedStrategy<D>>,
}

impl<D: HostDom + ?Sized> Extractor<D> {
    pub fn new(selectors: &CompiledSelectors, config: &ExtractionConfig) -> Self {
        let mut strategies: Vec<BoxedStrategy<D>> = Vec::with_capacity(3);
        strategies.push(Box::new(ProximityStrategy::new(
            selectors.text_bearing.clone(),
            config.clone(),
        )));
        strategies.push(Box::new(AttributeStrategy::new(
            selectors.content_markers.clone(),
            config.attribute_min_chars,
        )));
        strategies.push(Box::new(FallbackStrategy::new(
            selectors.author_markers.clone(),
        )));
        Self::with_strategies(strategies)
    }

    pub fn with_strategies(strategies: Vec<BoxedStrategy<D>>) -> Self {
        Self { strategies }
    }

    pub fn extract(&self, dom: &D, input: &ExtractionInput<'_>) -> ExtractionResult {
        let started = Instant::now();

        for strategy in &self.strategies {
            let method = strategy.method();
            let raw = match strategy.try_extract(dom, input) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(err) => {
                    warn!(?method, "extraction strategy failed: {err}");
                    continue;
                }
            };

            let text = strip_links(&raw);
            if text.is_empty() {
                debug!(?method, "extracted text was only links; trying next strategy");
                continue;
            }

            let elapsed_ms = started.elapsed().as_millis() as u64;
            debug!(?method, elapsed_ms, chars = text.chars().count(), "extracted reply source");
            return ExtractionResult {
                text,
                method,
                elapsed_ms,
            };
        }

        // Only reachable with a custom strategy list lacking a fallback.
        ExtractionResult {
            text: fallback::sentence(None, input.view_mode, input.path),
            method: ExtractionMethod::Fallback,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Trimmed character count, the unit of every length window here.
fn trimmed_len(text: &str) -> usize {
    text.trim().chars().count()
}

fn is_excluded<D: HostDom + ?Sized>(dom: &D, node: NodeId, excluded: &[NodeId]) -> bool {
    excluded.iter().any(|root| dom.contains(*root, node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlayConfig;
    use crate::dom::MemoryDom;
    use crate::geometry::Size;

    struct Failing;

    impl ExtractionStrategy<MemoryDom> for Failing {
        fn method(&self) -> ExtractionMethod {
            ExtractionMethod::Proximity
        }

        fn try_extract(
            &self,
            _dom: &MemoryDom,
            _input: &ExtractionInput<'_>,
        ) -> Result<Option<String>, DomError> {
            Err(DomError::Range("boom".to_string()))
        }
    }

    struct LinksOnly;

    impl ExtractionStrategy<MemoryDom> for LinksOnly {
        fn method(&self) -> ExtractionMethod {
            ExtractionMethod::AttributeSelector
        }

        fn try_extract(
            &self,
            _dom: &MemoryDom,
            _input: &ExtractionInput<'_>,
        ) -> Result<Option<String>, DomError> {
            Ok(Some("https://t.co/abc   pic.twitter.com/xyz".to_string()))
        }
    }

    fn input(path: &str, view_mode: ViewMode) -> ExtractionInput<'_> {
        ExtractionInput {
            anchor: Rect::new(300.0, 400.0, 100.0, 30.0),
            anchor_node: None,
            excluded: &[],
            view_mode,
            path,
        }
    }

    fn default_extractor() -> Extractor<MemoryDom> {
        let config = OverlayConfig::default();
        Extractor::new(&config.compile().unwrap(), &config.extraction)
    }

    #[test]
    fn empty_document_falls_back() {
        let dom = MemoryDom::new("/home", Size::new(1280.0, 800.0));
        let result = default_extractor().extract(&dom, &input("/home", ViewMode::Listing));
        assert_eq!(result.method, ExtractionMethod::Fallback);
        assert_eq!(result.text, "Replying about this conversation.");
    }

    #[test]
    fn faulty_and_link_only_strategies_are_skipped() {
        let dom = MemoryDom::new("/jack/status/1", Size::new(1280.0, 800.0));
        let extractor = Extractor::with_strategies(vec![
            Box::new(Failing) as BoxedStrategy<MemoryDom>,
            Box::new(LinksOnly),
            Box::new(FallbackStrategy::new(Vec::new())),
        ]);
        let result = extractor.extract(&dom, &input("/jack/status/1", ViewMode::Detail));
        assert_eq!(result.method, ExtractionMethod::Fallback);
        assert_eq!(result.text, "Replying about this post.");
    }

    #[test]
    fn strategy_list_without_fallback_still_yields_text() {
        let dom = MemoryDom::new("/search", Size::new(1280.0, 800.0));
        let extractor = Extractor::with_strategies(vec![
            Box::new(Failing) as BoxedStrategy<MemoryDom>,
        ]);
        let result = extractor.extract(&dom, &input("/search?q=x", ViewMode::Listing));
        assert_eq!(result.method, ExtractionMethod::Fallback);
        assert_eq!(result.text, "Replying about this search result.");
    }
}
