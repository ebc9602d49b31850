//! # Live document model
//!
//! An arena of nodes standing in for the host page's DOM tree. Documents are
//! built from HTML with `scraper` and written back out as HTML, but unlike a
//! `scraper::Html` they can be mutated: nodes can be reparented, restyled and
//! parked outside the tree.
//!
//! A [`NodeId`] is never reused. A node that has been detached keeps its id,
//! attributes and children, which is what lets the pipeline move a borrowed
//! tile out of the page and put it back later without losing it.
//!
//! Every mutation bumps [`Document::mutation_seq`], which the settle helper
//! watches to decide when the host has stopped changing the page.

mod style;

pub use style::{InlineStyle, StyleDecl};

use scraper::{Html, Node as HtmlNode};
use serde::{Deserialize, Serialize};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Page scroll offsets, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
    style: InlineStyle,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Doctype(String),
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// Mutable document tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    scroll: ScrollPosition,
    mutation_seq: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document containing only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            root: NodeId(0),
            scroll: ScrollPosition::default(),
            mutation_seq: 0,
        }
    }

    /// Parse a complete HTML document.
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut doc = Self::new();
        let root = doc.root;

        let mut stack = vec![(parsed.tree.root(), root)];
        while let Some((source, target)) = stack.pop() {
            for child in source.children() {
                if let Some(id) = doc.import_node(child.value(), target) {
                    stack.push((child, id));
                }
            }
        }

        doc.mutation_seq = 0;
        doc
    }

    /// Parse `html` as a fragment and append the resulting nodes to `parent`.
    /// Returns the top-level nodes that were created, in order.
    pub fn append_html(&mut self, parent: NodeId, html: &str) -> Vec<NodeId> {
        let parsed = Html::parse_fragment(html);
        let before = self.nodes[parent.0].children.len();

        // Fragments are wrapped in a synthetic <html> element.
        let mut stack = vec![(*parsed.root_element(), parent)];
        while let Some((source, target)) = stack.pop() {
            for child in source.children() {
                if let Some(id) = self.import_node(child.value(), target) {
                    stack.push((child, id));
                }
            }
        }

        self.touch();
        self.nodes[parent.0].children[before..].to_vec()
    }

    fn import_node(&mut self, node: &HtmlNode, parent: NodeId) -> Option<NodeId> {
        let kind = match node {
            HtmlNode::Element(element) => {
                let mut attrs = Vec::new();
                let mut style = InlineStyle::default();
                for (name, value) in element.attrs() {
                    if name.eq_ignore_ascii_case("style") {
                        style = InlineStyle::parse(value);
                    } else {
                        attrs.push((name.to_string(), value.to_string()));
                    }
                }
                NodeKind::Element(ElementData {
                    tag: element.name().to_ascii_lowercase(),
                    attrs,
                    style,
                })
            }
            HtmlNode::Text(text) => NodeKind::Text(String::from(&**text)),
            HtmlNode::Comment(comment) => NodeKind::Comment(String::from(&**comment)),
            HtmlNode::Doctype(doctype) => NodeKind::Doctype(doctype.name().to_string()),
            _ => return None,
        };

        let id = self.push_node(kind);
        self.nodes[id.0].parent = Some(parent);
        self.nodes[parent.0].children.push(id);
        Some(id)
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    fn touch(&mut self) {
        self.mutation_seq += 1;
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(id.0)?.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The `<body>` element, when the document has one.
    pub fn body(&self) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&id| self.tag(id) == Some("body"))
    }

    /// Monotonic counter bumped on every mutation.
    pub fn mutation_seq(&self) -> u64 {
        self.mutation_seq
    }

    pub fn scroll_position(&self) -> ScrollPosition {
        self.scroll
    }

    pub fn set_scroll_position(&mut self, position: ScrollPosition) {
        self.scroll = position;
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.touch();
        self.push_node(NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            style: InlineStyle::default(),
        }))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.touch();
        self.push_node(NodeKind::Text(text.to_string()))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|element| element.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id.0).map_or(&[], |node| node.children.as_slice())
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&child| self.is_element(child))
            .collect()
    }

    /// Index of `id` among its parent's children.
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&child| child == id)
    }

    /// Ancestors of `id`, nearest first. Does not include `id`.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&node| self.parent(node))
    }

    /// `true` when `node` is `ancestor` or lies underneath it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|id| id == ancestor)
    }

    /// `true` while the node is reachable from the document root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len() && self.contains(self.root, id)
    }

    /// Element descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if self.is_element(node) {
                out.push(node);
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    /// Set an attribute. Setting `style` replaces the inline style.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        let Some(element) = self.element_mut(id) else {
            return;
        };

        if name.eq_ignore_ascii_case("style") {
            element.style = InlineStyle::parse(value);
        } else {
            match element.attrs.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
                Some((_, existing)) => *existing = value.to_string(),
                None => element.attrs.push((name.to_ascii_lowercase(), value.to_string())),
            }
        }
        self.touch();
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> bool {
        let Some(element) = self.element_mut(id) else {
            return false;
        };
        let before = element.attrs.len();
        element.attrs.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        let removed = element.attrs.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// First connected element carrying `name="value"`.
    pub fn find_by_attr(&self, name: &str, value: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&id| self.attr(id, name) == Some(value))
    }

    pub fn style(&self, id: NodeId) -> Option<&InlineStyle> {
        self.element(id).map(|element| &element.style)
    }

    pub fn style_mut(&mut self, id: NodeId) -> Option<&mut InlineStyle> {
        self.touch();
        self.element_mut(id).map(|element| &mut element.style)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            match &self.nodes[node.0].kind {
                NodeKind::Text(text) => out.push_str(text),
                _ => stack.extend(self.children(node).iter().rev().copied()),
            }
        }
        out
    }

    /// Replace all children of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        for child in self.children(id).to_vec() {
            self.unlink(child);
        }
        let text_node = self.create_text(text);
        self.append_child(id, text_node);
    }

    fn unlink(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&child| child != id);
        }
    }

    /// Append `child` to `parent`, moving it out of its current position.
    /// Refuses to create a cycle.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` under `parent` before `reference` (or at the end).
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if child == self.root || self.contains(child, parent) {
            return;
        }

        self.unlink(child);
        let siblings = &mut self.nodes[parent.0].children;
        let at = reference
            .and_then(|r| siblings.iter().position(|&s| s == r))
            .unwrap_or(siblings.len());
        siblings.insert(at, child);
        self.nodes[child.0].parent = Some(parent);
        self.touch();
    }

    /// Remove a node from the tree. The node and its subtree stay addressable.
    pub fn detach(&mut self, id: NodeId) {
        if self.nodes[id.0].parent.is_some() {
            self.unlink(id);
            self.touch();
        }
    }

    /// Reattach many nodes under `parent` at recorded child indices in one step.
    ///
    /// Placements are applied in ascending index order, so when the other
    /// children of `parent` are unchanged every node lands exactly at its
    /// recorded index. Out-of-range indices append.
    pub fn restore_children(&mut self, parent: NodeId, placements: &[(NodeId, usize)]) {
        let mut ordered: Vec<(NodeId, usize)> = placements
            .iter()
            .copied()
            .filter(|&(node, _)| node != self.root && !self.contains(node, parent))
            .collect();
        ordered.sort_by_key(|&(_, index)| index);

        for &(node, _) in &ordered {
            self.unlink(node);
        }
        for (node, index) in ordered {
            let siblings = &mut self.nodes[parent.0].children;
            let at = index.min(siblings.len());
            siblings.insert(at, node);
            self.nodes[node.0].parent = Some(parent);
        }
        self.touch();
    }

    /// Serialise a node and its subtree.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out, false);
        out
    }

    /// Serialise the whole document.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for &child in self.children(self.root) {
            self.write_node(child, &mut out, false);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String, raw_text: bool) {
        match &self.nodes[id.0].kind {
            NodeKind::Document => {
                for &child in &self.nodes[id.0].children {
                    self.write_node(child, out, false);
                }
            }
            NodeKind::Doctype(name) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Text(text) => {
                if raw_text {
                    out.push_str(text);
                } else {
                    escape_into(text, out, false);
                }
            }
            NodeKind::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, out, true);
                    out.push('"');
                }
                if !element.style.is_empty() {
                    out.push_str(" style=\"");
                    escape_into(&element.style.to_string(), out, true);
                    out.push('"');
                }
                out.push('>');

                if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                    return;
                }

                let raw = RAW_TEXT_ELEMENTS.contains(&element.tag.as_str());
                for &child in &self.nodes[id.0].children {
                    self.write_node(child, out, raw);
                }
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }
}

fn escape_into(text: &str, out: &mut String, attribute: bool) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}
