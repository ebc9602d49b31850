use serde::Serialize;

use crate::dom::{Document, NodeId};
use crate::models::Tile;

pub const DEFAULT_PAGE_SIZE: usize = 10;

pub const ROLE_ATTR: &str = "data-offer-deck";
pub const ROW_ATTR: &str = "data-offer-deck-row";
pub const FAV_CELL_ATTR: &str = "data-offer-deck-fav-cell";
pub const TILE_CELL_ATTR: &str = "data-offer-deck-tile-cell";

const HEADERS: [&str; 6] = ["#", "Merchant", "Reward", "Favorite", "", ""];

/// Pagination bookkeeping for the table view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableViewState {
    pub current_page: usize,
    pub page_size: usize,
    pub records: Vec<Tile>,
    pub is_active: bool,
}

impl TableViewState {
    pub fn new(page_size: usize) -> Self {
        Self {
            current_page: 0,
            page_size: page_size.max(1),
            records: Vec::new(),
            is_active: false,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.records.len().div_ceil(self.page_size).max(1)
    }

    /// Pull `current_page` back onto the last page when it ran past it.
    pub fn clamp(&mut self) {
        self.current_page = self.current_page.min(self.total_pages() - 1);
    }

    pub fn window_start(&self) -> usize {
        self.current_page * self.page_size
    }

    /// Records shown on the current page.
    pub fn window(&self) -> &[Tile] {
        let start = self.window_start().min(self.records.len());
        let end = (start + self.page_size).min(self.records.len());
        &self.records[start..end]
    }

    pub fn reset(&mut self) {
        self.current_page = 0;
        self.records.clear();
        self.is_active = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowSummary {
    pub rank: usize,
    pub merchant_key: String,
    pub display_name: String,
    pub reward_text: String,
}

/// What the table shows after a render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePage {
    pub page_index: usize,
    pub total_pages: usize,
    pub total_records: usize,
    pub rows: Vec<RowSummary>,
}

impl TablePage {
    pub fn of(state: &TableViewState) -> Self {
        let start = state.window_start();
        Self {
            page_index: state.current_page,
            total_pages: state.total_pages(),
            total_records: state.records.len(),
            rows: state
                .window()
                .iter()
                .enumerate()
                .map(|(offset, tile)| RowSummary {
                    rank: start + offset + 1,
                    merchant_key: tile.merchant_key.clone(),
                    display_name: tile.display_name.clone(),
                    reward_text: tile.reward_text.clone(),
                })
                .collect(),
        }
    }

    pub fn label(&self) -> String {
        format!("Page {} of {}", self.page_index + 1, self.total_pages)
    }
}

/// Synthetic nodes of the table view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableScaffold {
    pub root: NodeId,
    pub tbody: NodeId,
    pub label: NodeId,
    pub prev: NodeId,
    pub next: NodeId,
    pub holding: NodeId,
}

fn element(doc: &mut Document, parent: NodeId, tag: &str, attrs: &[(&str, &str)], text: Option<&str>) -> NodeId {
    let node = doc.create_element(tag);
    for &(name, value) in attrs {
        doc.set_attr(node, name, value);
    }
    if let Some(text) = text {
        doc.set_text(node, text);
    }
    doc.append_child(parent, node);
    node
}

impl TableScaffold {
    /// Build the table view and insert it in front of `before`.
    pub fn build(doc: &mut Document, parent: NodeId, before: NodeId) -> Self {
        let root = doc.create_element("div");
        doc.set_attr(root, ROLE_ATTR, "table-view");
        doc.set_attr(root, "class", "offer-deck-table-view");

        let table = element(doc, root, "table", &[("class", "offer-deck-table")], None);
        let thead = element(doc, table, "thead", &[], None);
        let header = element(doc, thead, "tr", &[], None);
        for title in HEADERS {
            element(doc, header, "th", &[], Some(title));
        }
        let tbody = element(doc, table, "tbody", &[], None);

        let pager = element(doc, root, "div", &[(ROLE_ATTR, "pager")], None);
        let prev = element(doc, pager, "button", &[(ROLE_ATTR, "prev"), ("type", "button")], Some("Previous"));
        let label = element(doc, pager, "span", &[(ROLE_ATTR, "page-label")], None);
        let next = element(doc, pager, "button", &[(ROLE_ATTR, "next"), ("type", "button")], Some("Next"));

        let holding = element(
            doc,
            root,
            "div",
            &[(ROLE_ATTR, "holding"), ("style", "display: none !important")],
            None,
        );

        doc.insert_before(parent, root, Some(before));

        Self {
            root,
            tbody,
            label,
            prev,
            next,
            holding,
        }
    }

    pub fn rows(&self, doc: &Document) -> Vec<NodeId> {
        doc.element_children(self.tbody)
    }

    /// Update the pager for `page`.
    pub fn update_pager(&self, doc: &mut Document, page: &TablePage) {
        doc.set_text(self.label, &page.label());
        toggle_disabled(doc, self.prev, page.page_index == 0);
        toggle_disabled(doc, self.next, page.page_index + 1 >= page.total_pages);
    }
}

fn toggle_disabled(doc: &mut Document, node: NodeId, disabled: bool) {
    if disabled {
        doc.set_attr(node, "disabled", "");
    } else {
        doc.remove_attr(node, "disabled");
    }
}

/// Append a row for `tile` to `tbody`, returning the row and the cell the
/// tile overlay goes into.
pub fn build_row(doc: &mut Document, tbody: NodeId, tile: &Tile, rank: usize) -> (NodeId, NodeId) {
    let position = (rank - 1).to_string();
    let row = element(
        doc,
        tbody,
        "tr",
        &[(ROW_ATTR, position.as_str()), ("style", "position: relative")],
        None,
    );

    element(doc, row, "td", &[("class", "offer-deck-rank")], Some(rank.to_string().as_str()));

    let merchant = element(doc, row, "td", &[("class", "offer-deck-merchant")], None);
    element(doc, merchant, "strong", &[], Some(tile.display_name.as_str()));
    if !tile.merchant_key.is_empty() {
        element(doc, merchant, "small", &[], Some(tile.merchant_key.as_str()));
    }

    let reward = if tile.reward_text.is_empty() { "-" } else { tile.reward_text.as_str() };
    element(doc, row, "td", &[("class", "offer-deck-reward")], Some(reward));
    element(doc, row, "td", &[(FAV_CELL_ATTR, tile.merchant_key.as_str())], None);

    let action = element(doc, row, "td", &[("class", "offer-deck-action")], None);
    element(doc, action, "span", &[("style", "pointer-events: none")], Some("View offer"));

    let cell = element(
        doc,
        row,
        "td",
        &[(TILE_CELL_ATTR, ""), ("style", "padding: 0; width: 0")],
        None,
    );

    (row, cell)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<Tile> {
        let mut doc = Document::new();
        (0..n)
            .map(|i| Tile {
                merchant_key: format!("shop{i}.com"),
                ..Tile::degraded(doc.create_element("div"))
            })
            .collect()
    }

    #[test]
    fn test_total_pages_never_zero() {
        let mut state = TableViewState::new(10);
        assert_eq!(state.total_pages(), 1);
        assert!(state.window().is_empty());

        state.records = records(23);
        assert_eq!(state.total_pages(), 3);
        state.records = records(20);
        assert_eq!(state.total_pages(), 2);
    }

    #[test]
    fn test_last_window_is_partial() {
        let mut state = TableViewState::new(10);
        state.records = records(23);
        state.current_page = 2;

        let page = TablePage::of(&state);
        assert_eq!(page.rows.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![21, 22, 23]);
        assert_eq!(page.label(), "Page 3 of 3");
    }

    #[test]
    fn test_clamp_to_last_page() {
        let mut state = TableViewState::new(10);
        state.records = records(23);
        state.current_page = 7;
        state.clamp();
        assert_eq!(state.current_page, 2);

        state.records.truncate(4);
        state.clamp();
        assert_eq!(state.current_page, 0);
    }

    #[test]
    fn test_zero_page_size_is_coerced() {
        assert_eq!(TableViewState::new(0).page_size, 1);
    }

    #[test]
    fn test_row_layout() {
        let mut doc = Document::parse("<body><div id=\"grid\"></div></body>");
        let body = doc.body().unwrap();
        let grid = doc.find_by_attr("id", "grid").unwrap();
        let scaffold = TableScaffold::build(&mut doc, body, grid);
        assert_eq!(doc.element_children(body), vec![scaffold.root, grid]);

        let tile = Tile {
            merchant_key: "rei.com".into(),
            display_name: "Rei".into(),
            reward_text: "2X miles".into(),
            reward_value: 2000,
            ..Tile::degraded(doc.create_element("div"))
        };
        let (row, cell) = build_row(&mut doc, scaffold.tbody, &tile, 4);

        assert_eq!(doc.attr(row, ROW_ATTR), Some("3"));
        assert_eq!(doc.element_children(row).len(), 6);
        assert_eq!(doc.parent(cell), Some(row));
        assert_eq!(doc.find_by_attr(FAV_CELL_ATTR, "rei.com").map(|c| doc.parent(c)), Some(Some(row)));
        assert_eq!(scaffold.rows(&doc), vec![row]);
    }
}
