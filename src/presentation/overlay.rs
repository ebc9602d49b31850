//! Inline-style overlay: a borrowed node is stretched over a synthetic
//! container, made fully transparent and kept on top so it still receives
//! the pointer input aimed at the container.

use std::collections::HashMap;

use crate::dom::{Document, InlineStyle, NodeId, StyleDecl};
use crate::traits::OverlayManager;

/// Inline properties captured before the first modification.
pub const OVERLAY_PROPERTIES: &[&str] = &[
    "position",
    "top",
    "right",
    "bottom",
    "left",
    "width",
    "height",
    "opacity",
    "pointer-events",
    "z-index",
    "visibility",
    "display",
];

const OVERLAY_STYLE: &[(&str, &str)] = &[
    ("position", "absolute"),
    ("top", "0"),
    ("left", "0"),
    ("right", "0"),
    ("bottom", "0"),
    ("width", "100%"),
    ("height", "100%"),
    ("opacity", "0"),
    ("pointer-events", "auto"),
    ("z-index", "10"),
    ("visibility", "visible"),
    ("display", "block"),
];

/// Pre-pipeline inline positioning of one node, with each property's priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayState {
    properties: Vec<(&'static str, Option<StyleDecl>)>,
}

impl OverlayState {
    pub fn capture(style: Option<&InlineStyle>) -> Self {
        let properties = OVERLAY_PROPERTIES
            .iter()
            .map(|&name| (name, style.and_then(|s| s.get(name)).cloned()))
            .collect();
        Self { properties }
    }

    pub fn get(&self, name: &str) -> Option<&StyleDecl> {
        self.properties
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, decl)| decl.as_ref())
    }

    /// Write the captured values back; properties that were unset are removed.
    pub fn apply(&self, style: &mut InlineStyle) {
        for (name, decl) in &self.properties {
            match decl {
                Some(decl) => style.set(name, &decl.value, decl.important),
                None => {
                    style.remove(name);
                }
            }
        }
    }
}

/// [`OverlayManager`] working on inline styles.
///
/// Snapshots are keyed by node and dropped by [`InlineStyleOverlay::prune`]
/// once a node leaves the page.
#[derive(Debug, Default)]
pub struct InlineStyleOverlay {
    snapshots: HashMap<NodeId, OverlayState>,
}

impl InlineStyleOverlay {
    pub fn state(&self, node: NodeId) -> Option<&OverlayState> {
        self.snapshots.get(&node)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn prune(&mut self, doc: &Document) {
        self.snapshots.retain(|&node, _| doc.is_connected(node));
    }
}

impl OverlayManager for InlineStyleOverlay {
    fn snapshot(&mut self, doc: &Document, node: NodeId) {
        self.snapshots
            .entry(node)
            .or_insert_with(|| OverlayState::capture(doc.style(node)));
    }

    fn present(&mut self, doc: &mut Document, node: NodeId, container: NodeId) {
        self.snapshot(doc, node);
        doc.append_child(container, node);
        if let Some(style) = doc.style_mut(node) {
            for &(name, value) in OVERLAY_STYLE {
                style.set(name, value, true);
            }
        }
    }

    fn restore(&mut self, doc: &mut Document, node: NodeId) -> bool {
        let Some(state) = self.snapshots.get(&node) else {
            return false;
        };
        if let Some(style) = doc.style_mut(node) {
            state.apply(style);
        }
        true
    }

    fn conceal(&mut self, doc: &mut Document, node: NodeId) {
        self.snapshot(doc, node);
        if let Some(style) = doc.style_mut(node) {
            style.set("display", "none", true);
        }
    }

    fn has_snapshot(&self, node: NodeId) -> bool {
        self.snapshots.contains_key(&node)
    }
}

fn effective_pointer_events(doc: &Document, node: NodeId, within: NodeId) -> bool {
    let chain = std::iter::once(node).chain(doc.ancestors(node).take_while(|&a| a != within));
    for id in chain.chain(std::iter::once(within)) {
        if let Some(value) = doc.style(id).and_then(|s| s.value("pointer-events")) {
            return value != "none";
        }
    }
    true
}

fn is_displayed(doc: &Document, node: NodeId, within: NodeId) -> bool {
    std::iter::once(node)
        .chain(doc.ancestors(node).take_while(|&a| a != within))
        .all(|id| doc.style(id).and_then(|s| s.value("display")) != Some("none"))
}

fn stacking_z(doc: &Document, node: NodeId, within: NodeId) -> i64 {
    std::iter::once(node)
        .chain(doc.ancestors(node).take_while(|&a| a != within))
        .find_map(|id| {
            let style = doc.style(id)?;
            let positioned = style.value("position").is_some_and(|p| p != "static");
            let z = style.value("z-index")?.parse::<i64>().ok()?;
            positioned.then_some(z)
        })
        .unwrap_or(0)
}

/// The element inside `within` that a click on `within` would reach:
/// highest stacking order among displayed, pointer-receiving descendants,
/// later elements winning ties.
pub fn hit_target(doc: &Document, within: NodeId) -> Option<NodeId> {
    let mut best: Option<(i64, NodeId)> = None;

    for node in doc.descendants(within) {
        if !is_displayed(doc, node, within) || !effective_pointer_events(doc, node, within) {
            continue;
        }
        let z = stacking_z(doc, node, within);
        if best.is_none_or(|(top, _)| z >= top) {
            best = Some((z, node));
        }
    }

    best.map(|(_, node)| node)
}
