use crate::classifier::ViewMode;
use crate::dom::{DomError, HostDom, Selector, is_visible};
use crate::extract::{ExtractionInput, ExtractionMethod, ExtractionStrategy, is_excluded};

/// Synthesizes a sentence from the author name and the page kind. Never
/// misses.
pub struct FallbackStrategy {
    author_markers: Vec<Selector>,
}

impl FallbackStrategy {
    pub fn new(author_markers: Vec<Selector>) -> Self {
        Self { author_markers }
    }

    fn author<D: HostDom + ?Sized>(&self, dom: &D, input: &ExtractionInput<'_>) -> Option<String> {
        self.author_markers.iter().find_map(|selector| {
            dom.query_all(selector)
                .into_iter()
                .filter(|node| !is_excluded(dom, *node, input.excluded) && is_visible(dom, *node))
                .find_map(|node| display_name(&dom.text_content(node)))
        })
    }
}

impl<D: HostDom + ?Sized> ExtractionStrategy<D> for FallbackStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Fallback
    }

    fn try_extract(&self, dom: &D, input: &ExtractionInput<'_>) -> Result<Option<String>, DomError> {
        let author = self.author(dom, input);
        Ok(Some(sentence(author.as_deref(), input.view_mode, input.path)))
    }
}

/// The display name in an author block, skipping `@handle` lines.
fn display_name(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('@'))
        .map(|line| line.split('@').next().unwrap_or_default().trim())
        .find(|name| !name.is_empty())
        .map(str::to_string)
}

fn context_hint(view_mode: ViewMode, path: &str) -> &'static str {
    if view_mode == ViewMode::Detail {
        "this post"
    } else if path.starts_with("/search") {
        "this search result"
    } else {
        "this conversation"
    }
}

pub(crate) fn sentence(author: Option<&str>, view_mode: ViewMode, path: &str) -> String {
    let hint = context_hint(view_mode, path);
    match author {
        Some(author) => format!("Replying to {author} about {hint}."),
        None => format!("Replying about {hint}."),
    }
}
