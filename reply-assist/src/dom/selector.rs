//! A small CSS selector subset used for the host marker lists.
//!
//! Supported: type and universal selectors, `#id`, `.class`, attribute
//! selectors with presence, `=`, `^=`, `$=` and `*=` operators, the
//! descendant and child combinators, and comma-separated lists. This covers
//! every marker the host configuration needs; a `HostDom` backed by a real
//! browser can hand [`Selector::as_str`] straight to `querySelectorAll`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected character `{found}` at offset {offset} in `{selector}`")]
    Unexpected {
        selector: String,
        offset: usize,
        found: char,
    },
    #[error("unterminated {what} in `{selector}`")]
    Unterminated { selector: String, what: &'static str },
}

/// Read access to an element tree, enough to evaluate a selector.
pub trait ElementView {
    type Handle: Copy;

    fn tag_name(&self, node: Self::Handle) -> Option<&str>;
    fn attribute(&self, node: Self::Handle, name: &str) -> Option<&str>;
    fn parent_element(&self, node: Self::Handle) -> Option<Self::Handle>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Prefix,
    Suffix,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrFilter {
    name: String,
    op: AttrOp,
    value: String,
}

impl AttrFilter {
    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == self.value,
            AttrOp::Prefix => !self.value.is_empty() && actual.starts_with(&self.value),
            AttrOp::Suffix => !self.value.is_empty() && actual.ends_with(&self.value),
            AttrOp::Contains => !self.value.is_empty() && actual.contains(&self.value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrFilter>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attrs.is_empty()
    }

    fn matches<V: ElementView>(&self, view: &V, node: V::Handle) -> bool {
        let Some(tag) = view.tag_name(node) else {
            return false;
        };
        if let Some(expected) = &self.tag {
            if !tag.eq_ignore_ascii_case(expected) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if view.attribute(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_attr = view.attribute(node, "class").unwrap_or_default();
            let has_all = self
                .classes
                .iter()
                .all(|class| class_attr.split_whitespace().any(|c| c == class));
            if !has_all {
                return false;
            }
        }
        self.attrs
            .iter()
            .all(|filter| filter.matches(view.attribute(node, &filter.name)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// One comma-separated alternative. `parts[0]` has no combinator; every later
/// part records how it relates to the part before it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    parts: Vec<(Option<Combinator>, Compound)>,
}

impl Complex {
    fn matches<V: ElementView>(&self, view: &V, node: V::Handle) -> bool {
        self.matches_at(view, node, self.parts.len() - 1)
    }

    fn matches_at<V: ElementView>(&self, view: &V, node: V::Handle, index: usize) -> bool {
        let (combinator, compound) = &self.parts[index];
        if !compound.matches(view, node) {
            return false;
        }
        let Some(combinator) = combinator else {
            return true;
        };

        match combinator {
            Combinator::Child => view
                .parent_element(node)
                .is_some_and(|parent| self.matches_at(view, parent, index - 1)),
            Combinator::Descendant => {
                let mut cursor = view.parent_element(node);
                while let Some(ancestor) = cursor {
                    if self.matches_at(view, ancestor, index - 1) {
                        return true;
                    }
                    cursor = view.parent_element(ancestor);
                }
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        Parser::new(source).parse()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches<V: ElementView>(&self, view: &V, node: V::Handle) -> bool {
        self.alternatives
            .iter()
            .any(|complex| complex.matches(view, node))
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Selector::parse(source)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Selector, SelectorError> {
        let mut alternatives = Vec::new();
        loop {
            self.skip_whitespace();
            alternatives.push(self.parse_complex()?);
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(',') => self.pos += 1,
                Some(found) => return Err(self.unexpected(found)),
            }
        }

        Ok(Selector {
            source: self.source.trim().to_string(),
            alternatives,
        })
    }

    fn parse_complex(&mut self) -> Result<Complex, SelectorError> {
        let first = self.parse_compound()?;
        let mut parts = vec![(None, first)];

        loop {
            let had_space = self.skip_whitespace();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some(_) if had_space => Combinator::Descendant,
                Some(found) => return Err(self.unexpected(found)),
            };
            let compound = self.parse_compound()?;
            parts.push((Some(combinator), compound));
        }

        Ok(Complex { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let mut universal = false;

        match self.peek() {
            Some('*') => {
                self.pos += 1;
                universal = true;
            }
            Some(ch) if is_ident_char(ch) => compound.tag = Some(self.ident().to_lowercase()),
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.required_ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    let class = self.required_ident()?;
                    compound.classes.push(class);
                }
                Some('[') => {
                    self.pos += 1;
                    let filter = self.parse_attr()?;
                    compound.attrs.push(filter);
                }
                _ => break,
            }
        }

        if compound.is_empty() && !universal {
            return match self.peek() {
                Some(found) => Err(self.unexpected(found)),
                None => Err(SelectorError::Empty),
            };
        }

        Ok(compound)
    }

    fn parse_attr(&mut self) -> Result<AttrFilter, SelectorError> {
        self.skip_whitespace();
        let name = self.required_ident()?;
        self.skip_whitespace();

        let op = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrFilter {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                });
            }
            Some('=') => {
                self.pos += 1;
                AttrOp::Equals
            }
            Some(prefix @ ('^' | '$' | '*')) if self.chars.get(self.pos + 1) == Some(&'=') => {
                self.pos += 2;
                match prefix {
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    _ => AttrOp::Contains,
                }
            }
            Some(found) => return Err(self.unexpected(found)),
            None => return Err(self.unterminated("attribute selector")),
        };

        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|ch| ch != quote) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.unterminated("string"));
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                value
            }
            _ => self.required_ident()?,
        };

        self.skip_whitespace();
        match self.peek() {
            Some(']') => {
                self.pos += 1;
                Ok(AttrFilter { name, op, value })
            }
            Some(found) => Err(self.unexpected(found)),
            None => Err(self.unterminated("attribute selector")),
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn required_ident(&mut self) -> Result<String, SelectorError> {
        let ident = self.ident();
        if ident.is_empty() {
            return match self.peek() {
                Some(found) => Err(self.unexpected(found)),
                None => Err(self.unterminated("selector")),
            };
        }
        Ok(ident)
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn unexpected(&self, found: char) -> SelectorError {
        SelectorError::Unexpected {
            selector: self.source.to_string(),
            offset: self.pos,
            found,
        }
    }

    fn unterminated(&self, what: &'static str) -> SelectorError {
        SelectorError::Unterminated {
            selector: self.source.to_string(),
            what,
        }
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '-' || ch == '_'
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct Tree {
        nodes: Vec<(&'static str, Option<usize>, HashMap<&'static str, &'static str>)>,
    }

    impl ElementView for Tree {
        type Handle = usize;

        fn tag_name(&self, node: usize) -> Option<&str> {
            self.nodes.get(node).map(|(tag, _, _)| *tag)
        }

        fn attribute(&self, node: usize, name: &str) -> Option<&str> {
            self.nodes[node].2.get(name).copied()
        }

        fn parent_element(&self, node: usize) -> Option<usize> {
            self.nodes[node].1
        }
    }

    fn tree() -> Tree {
        Tree {
            nodes: vec![
                ("body", None, HashMap::new()),
                ("form", Some(0), HashMap::from([("class", "reply compose")])),
                ("div", Some(1), HashMap::from([("role", "group")])),
                (
                    "div",
                    Some(2),
                    HashMap::from([
                        ("contenteditable", "true"),
                        ("aria-label", "Post your reply"),
                        ("role", "textbox"),
                    ]),
                ),
                ("span", Some(0), HashMap::from([("data-testid", "tweetText")])),
            ],
        }
    }

    #[test]
    fn attribute_equality_and_presence() {
        let tree = tree();
        let selector = Selector::parse(r#"[role="textbox"][aria-label="Post your reply"]"#).unwrap();
        assert!(selector.matches(&tree, 3));
        assert!(!selector.matches(&tree, 2));

        let presence = Selector::parse("[contenteditable]").unwrap();
        assert!(presence.matches(&tree, 3));
        assert!(!presence.matches(&tree, 4));
    }

    #[test]
    fn descendant_combinator_searches_all_ancestors() {
        let tree = tree();
        let selector = Selector::parse(r#"form [contenteditable="true"]"#).unwrap();
        assert!(selector.matches(&tree, 3));

        let child_only = Selector::parse(r#"form > [contenteditable="true"]"#).unwrap();
        assert!(!child_only.matches(&tree, 3));

        let direct = Selector::parse(r#"form > div[role=group]"#).unwrap();
        assert!(direct.matches(&tree, 2));
    }

    #[test]
    fn class_and_tag_matching() {
        let tree = tree();
        assert!(Selector::parse("form.reply").unwrap().matches(&tree, 1));
        assert!(Selector::parse("FORM.compose.reply").unwrap().matches(&tree, 1));
        assert!(!Selector::parse("form.missing").unwrap().matches(&tree, 1));
    }

    #[test]
    fn selector_lists_match_any_alternative() {
        let tree = tree();
        let selector = Selector::parse(r#"article, [data-testid^="tweet"]"#).unwrap();
        assert!(selector.matches(&tree, 4));
        assert!(!selector.matches(&tree, 1));
    }

    #[test]
    fn malformed_selectors_are_rejected() {
        assert_eq!(Selector::parse("   "), Err(SelectorError::Empty));
        assert!(matches!(
            Selector::parse("[role=\"group\""),
            Err(SelectorError::Unterminated { .. })
        ));
        assert!(matches!(
            Selector::parse("div > > span"),
            Err(SelectorError::Unexpected { found: '>', .. })
        ));
    }
}
