//! Read-only document scopes
//!
//! A `Scope` is the view a template is resolved against: the whole document at
//! the top level, or the element(s) matched by an enclosing template during
//! recursion. Scopes only ever narrow; nothing here can reach outside or
//! mutate the document.

use scraper::{ElementRef, Html, Selector};

use crate::error::MapError;

/// Read-only handle to a set of document nodes, in document order.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    nodes: Vec<ElementRef<'a>>,
}

impl<'a> Scope<'a> {
    /// Scope over the root element of a parsed document.
    pub fn root(document: &'a Html) -> Self {
        Self {
            nodes: vec![document.root_element()],
        }
    }

    /// Scope over a single element (one match of an enclosing template).
    pub fn from_element(element: ElementRef<'a>) -> Self {
        Self {
            nodes: vec![element],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Matched elements, in document order.
    pub fn elements(&self) -> &[ElementRef<'a>] {
        &self.nodes
    }

    pub fn first(&self) -> Option<ElementRef<'a>> {
        self.nodes.first().copied()
    }

    /// Narrow this scope by a selector.
    ///
    /// An empty selector, or one textually equal to the configured
    /// scope-selector key, is a self reference and returns the scope
    /// unchanged. Zero matches yields a valid empty scope, not an error.
    pub fn resolve(&self, selector: &str, select_key: &str) -> Result<Scope<'a>, MapError> {
        let selector = selector.trim();
        if selector.is_empty() || selector == select_key {
            return Ok(self.clone());
        }

        let parsed = Selector::parse(selector).map_err(|e| MapError::Selector {
            selector: selector.to_string(),
            message: e.to_string(),
        })?;

        let mut nodes: Vec<ElementRef<'a>> = Vec::new();
        for element in &self.nodes {
            for found in element.select(&parsed) {
                // overlapping scope nodes can surface the same descendant twice
                if !nodes.iter().any(|n| n.id() == found.id()) {
                    nodes.push(found);
                }
            }
        }

        Ok(Scope { nodes })
    }

    /// Concatenated text content of all nodes, trimmed.
    /// `None` when the scope holds no nodes.
    pub fn text(&self) -> Option<String> {
        if self.nodes.is_empty() {
            return None;
        }
        let joined: String = self.nodes.iter().flat_map(|el| el.text()).collect();
        Some(joined.trim().to_string())
    }

    /// Trimmed attribute value of the first node.
    pub fn attr(&self, name: &str) -> Option<String> {
        self.first()
            .and_then(|el| el.value().attr(name))
            .map(|v| v.trim().to_string())
    }

    /// Document-order position of the first node: its index in a depth-first
    /// traversal of the whole document. Used to restore markup order when
    /// array templates collect matches from several sub-templates.
    pub fn position(&self) -> Option<usize> {
        self.first().map(document_position)
    }
}

fn document_position(element: ElementRef<'_>) -> usize {
    let node = *element;
    let root = node.ancestors().last().unwrap_or(node);
    root.descendants()
        .position(|n| n.id() == node.id())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_narrows_in_document_order() {
        let html = r#"
        <html>
        <body>
            <div class="item">first</div>
            <div class="item">second</div>
        </body>
        </html>
        "#;

        let document = Html::parse_document(html);
        let scope = Scope::root(&document);

        let items = scope.resolve(".item", "$").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items.text().unwrap(), "firstsecond");

        let first = Scope::from_element(items.elements()[0]);
        assert_eq!(first.text().unwrap(), "first");
    }

    #[test]
    fn self_reference_returns_scope_unchanged() {
        let html = "<html><body><p>hello</p></body></html>";
        let document = Html::parse_document(html);
        let scope = Scope::root(&document);

        assert_eq!(scope.resolve("", "$").unwrap().len(), scope.len());
        assert_eq!(scope.resolve("$", "$").unwrap().len(), scope.len());
        assert_eq!(scope.resolve(" $ ", "$").unwrap().len(), scope.len());
    }

    #[test]
    fn zero_matches_is_an_empty_scope() {
        let html = "<html><body><p>hello</p></body></html>";
        let document = Html::parse_document(html);
        let scope = Scope::root(&document);

        let missing = scope.resolve(".does-not-exist", "$").unwrap();
        assert!(missing.is_empty());
        assert_eq!(missing.text(), None);
        assert_eq!(missing.position(), None);
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let html = "<html><body></body></html>";
        let document = Html::parse_document(html);
        let scope = Scope::root(&document);

        let err = scope.resolve("[[[", "$").unwrap_err();
        assert!(matches!(err, MapError::Selector { .. }));
    }

    #[test]
    fn attr_reads_first_match_trimmed() {
        let html = r#"<html><body><a href=" /first ">one</a><a href="/second">two</a></body></html>"#;
        let document = Html::parse_document(html);
        let scope = Scope::root(&document);

        let links = scope.resolve("a", "$").unwrap();
        assert_eq!(links.attr("href").unwrap(), "/first");
        assert_eq!(links.attr("missing"), None);
    }

    #[test]
    fn positions_follow_markup_order() {
        let html = r#"
        <html>
        <body>
            <span class="y">second</span>
            <span class="x">first</span>
        </body>
        </html>
        "#;

        let document = Html::parse_document(html);
        let scope = Scope::root(&document);

        let x = scope.resolve(".x", "$").unwrap().position().unwrap();
        let y = scope.resolve(".y", "$").unwrap().position().unwrap();
        assert!(y < x, "`.y` appears before `.x` in the markup");
    }
}
