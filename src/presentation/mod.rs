//! Grid and table presentation of the host's own tile nodes.
//!
//! Tiles are never copied. In grid mode they stay where the host put them and
//! only get an `order` hint. In table mode each tile on the current page is
//! moved into a synthetic row as an invisible overlay, so a click on the row
//! still lands on the host's node; tiles off the page are parked in a hidden
//! holding area. Every tile carries its original child index in
//! [`ORIGIN_ATTR`], and the reconciler remembers the parent it came from, so
//! grid mode can put each tile back where it was, one batch per parent.

mod overlay;
mod table;

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, warn};

pub use overlay::{InlineStyleOverlay, OVERLAY_PROPERTIES, OverlayState, hit_target};
pub use table::{
    DEFAULT_PAGE_SIZE, FAV_CELL_ATTR, ROLE_ATTR, ROW_ATTR, RowSummary, TILE_CELL_ATTR, TablePage, TableScaffold,
    TableViewState, build_row,
};

use crate::dom::{Document, NodeId};
use crate::error::PresentationError;
use crate::extract::TileExtractor;
use crate::models::{Tile, ViewMode};
use crate::settle::{self, Settled};
use crate::traits::{HostPage, OverlayManager};

/// Original child index of a tile inside its original parent.
pub const ORIGIN_ATTR: &str = "data-offer-deck-origin";
/// Parked off the current table page. Owned by the reconciler.
pub const PAGED_OUT_ATTR: &str = "data-offer-deck-paged-out";
/// Hidden by the favorites filter. Owned by the filter, never cleared here.
pub const FILTERED_ATTR: &str = "data-offer-deck-filtered";

/// Where a tile lived before the table view borrowed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Home {
    parent: NodeId,
    /// Document order at the time the tile was first seen.
    seq: usize,
}

pub struct PresentationReconciler {
    overlay: InlineStyleOverlay,
    table: TableViewState,
    scaffold: Option<TableScaffold>,
    container: Option<NodeId>,
    homes: HashMap<NodeId, Home>,
    next_seq: usize,
    presented: Vec<NodeId>,
    settle_quiet: Duration,
    settle_ceiling: Duration,
}

/// Nearest node containing every node of `nodes`.
fn common_ancestor(doc: &Document, nodes: impl IntoIterator<Item = NodeId>) -> Option<NodeId> {
    let mut nodes = nodes.into_iter();
    let first = nodes.next()?;
    let mut chain: Vec<NodeId> = std::iter::once(first).chain(doc.ancestors(first)).collect();
    for node in nodes {
        let nearest = chain.iter().position(|&candidate| doc.contains(candidate, node))?;
        chain.drain(..nearest);
    }
    chain.first().copied()
}

impl PresentationReconciler {
    pub fn new(page_size: usize) -> Self {
        Self {
            overlay: InlineStyleOverlay::default(),
            table: TableViewState::new(page_size),
            scaffold: None,
            container: None,
            homes: HashMap::new(),
            next_seq: 0,
            presented: Vec::new(),
            settle_quiet: Duration::from_millis(150),
            settle_ceiling: Duration::from_secs(2),
        }
    }

    pub fn with_settle(mut self, quiet: Duration, ceiling: Duration) -> Self {
        self.settle_quiet = quiet;
        self.settle_ceiling = ceiling;
        self
    }

    pub fn mode(&self) -> ViewMode {
        if self.table.is_active { ViewMode::Table } else { ViewMode::Grid }
    }

    pub fn table(&self) -> &TableViewState {
        &self.table
    }

    pub fn scaffold(&self) -> Option<&TableScaffold> {
        self.scaffold.as_ref()
    }

    pub fn overlay(&self) -> &InlineStyleOverlay {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut InlineStyleOverlay {
        &mut self.overlay
    }

    /// The grid container: the nearest element holding every genuine tile
    /// outside the table view. With a single grid this is the tiles' parent.
    pub fn container(&self, doc: &Document, extractor: &TileExtractor) -> Option<NodeId> {
        if let Some(container) = self.container
            && doc.is_connected(container)
        {
            return Some(container);
        }
        let parents: Vec<NodeId> = extractor
            .locate(doc)
            .into_iter()
            .filter(|&tile| !self.in_scaffold(doc, tile))
            .filter_map(|tile| doc.parent(tile))
            .collect();
        common_ancestor(doc, parents).filter(|&node| doc.is_element(node))
    }

    fn in_scaffold(&self, doc: &Document, node: NodeId) -> bool {
        self.scaffold.is_some_and(|s| doc.contains(s.root, node))
    }

    /// Write `sort_index` of every record as the tile's `order` hint.
    pub fn apply_grid_order(&self, doc: &mut Document, sorted: &[Tile]) {
        for tile in sorted {
            if let Some(style) = doc.style_mut(tile.node) {
                style.set("order", &tile.sort_index.to_string(), false);
            }
        }
        debug!("Applied grid order to {} tiles", sorted.len());
    }

    /// Tiles the table should list: every genuine tile not hidden by the
    /// favorites filter, ordered by the grid `order` hint and then by original
    /// document position.
    fn relevant_records(&self, doc: &Document, extractor: &mut TileExtractor) -> Vec<Tile> {
        let nodes: Vec<NodeId> = extractor
            .locate(doc)
            .into_iter()
            .filter(|&node| !doc.has_attr(node, FILTERED_ATTR))
            .collect();

        let mut records = extractor.extract_all(doc, &nodes);
        records.sort_by_key(|tile| {
            let order = doc
                .style(tile.node)
                .and_then(|s| s.value("order"))
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(i64::MAX);
            let seq = self.homes.get(&tile.node).map_or(usize::MAX, |home| home.seq);
            (order, seq)
        });
        for (index, tile) in records.iter_mut().enumerate() {
            tile.sort_index = index;
        }
        records
    }

    /// Remember the parent and child index of every tile not seen before.
    ///
    /// While the table is active a parent is missing the tiles that sit in
    /// rows, so tiles the host adds then are numbered after the highest
    /// origin recorded for that parent instead.
    fn mark_origins(&mut self, doc: &mut Document, extractor: &TileExtractor) {
        self.homes.retain(|&tile, _| doc.is_connected(tile));

        let unseen: Vec<NodeId> = extractor
            .locate(doc)
            .into_iter()
            .filter(|tile| !self.homes.contains_key(tile) && !self.in_scaffold(doc, *tile))
            .collect();

        let mut next_free: HashMap<NodeId, usize> = HashMap::new();
        for tile in unseen {
            let Some(parent) = doc.parent(tile) else {
                continue;
            };
            let written = doc.attr(tile, ORIGIN_ATTR).and_then(|v| v.parse::<usize>().ok());
            let index = match written {
                Some(index) => index,
                None if self.table.is_active => {
                    let next = match next_free.get(&parent) {
                        Some(&next) => next,
                        None => self.next_origin(doc, parent),
                    };
                    next_free.insert(parent, next + 1);
                    next
                }
                None => doc.index_in_parent(tile).unwrap_or_default(),
            };

            doc.set_attr(tile, ORIGIN_ATTR, &index.to_string());
            self.homes.insert(tile, Home { parent, seq: self.next_seq });
            self.next_seq += 1;
        }
    }

    fn next_origin(&self, doc: &Document, parent: NodeId) -> usize {
        self.homes
            .iter()
            .filter(|(_, home)| home.parent == parent)
            .filter_map(|(&tile, _)| doc.attr(tile, ORIGIN_ATTR)?.parse::<usize>().ok())
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Enter table mode, or refresh it when already active.
    ///
    /// Waits for the page to settle first. Fails before touching the document
    /// when there are no tiles or no grid container.
    pub async fn show_table<P: HostPage + ?Sized>(
        &mut self,
        host: &mut P,
        extractor: &mut TileExtractor,
    ) -> Result<TablePage, PresentationError> {
        if settle::wait_for_quiet(host, self.settle_quiet, self.settle_ceiling).await? == Settled::Ceiling {
            warn!("Page kept changing, entering table view anyway");
        }

        let doc = host.document_mut();
        self.overlay.prune(doc);

        if self.table.is_active {
            return self.refresh(doc, extractor);
        }

        if extractor.locate(doc).is_empty() {
            return Err(PresentationError::NoTiles);
        }
        let container = self.container(doc, extractor).ok_or(PresentationError::ContainerMissing)?;
        let parent = doc.parent(container).ok_or(PresentationError::ContainerMissing)?;

        self.mark_origins(doc, extractor);
        let records = self.relevant_records(doc, extractor);
        let scaffold = TableScaffold::build(doc, parent, container);
        self.overlay.conceal(doc, container);

        self.container = Some(container);
        self.scaffold = Some(scaffold);
        self.table.records = records;
        self.table.current_page = 0;
        self.table.is_active = true;

        let page = self.render_page(doc);
        info!("Table view shows {} records on {} pages", page.total_records, page.total_pages);
        Ok(page)
    }

    /// Re-extract the relevant tiles and re-render the current page.
    ///
    /// Clears the reconciler's own paged-out marks but keeps tiles hidden by
    /// the favorites filter hidden.
    pub fn refresh(&mut self, doc: &mut Document, extractor: &mut TileExtractor) -> Result<TablePage, PresentationError> {
        if !self.table.is_active {
            return Err(PresentationError::TableInactive);
        }
        self.overlay.prune(doc);

        for tile in extractor.locate(doc) {
            doc.remove_attr(tile, PAGED_OUT_ATTR);
        }
        self.mark_origins(doc, extractor);

        self.table.records = self.relevant_records(doc, extractor);
        self.table.clamp();
        debug!("Table refreshed with {} records", self.table.records.len());
        Ok(self.render_page(doc))
    }

    pub fn go_to_page(&mut self, doc: &mut Document, index: usize) -> Result<TablePage, PresentationError> {
        if !self.table.is_active {
            return Err(PresentationError::TableInactive);
        }
        self.table.current_page = index;
        self.table.clamp();
        Ok(self.render_page(doc))
    }

    pub fn next_page(&mut self, doc: &mut Document) -> Result<TablePage, PresentationError> {
        self.go_to_page(doc, self.table.current_page + 1)
    }

    pub fn previous_page(&mut self, doc: &mut Document) -> Result<TablePage, PresentationError> {
        self.go_to_page(doc, self.table.current_page.saturating_sub(1))
    }

    /// Park the previous page's tiles and present the current window.
    fn render_page(&mut self, doc: &mut Document) -> TablePage {
        let page = TablePage::of(&self.table);
        let Some(scaffold) = self.scaffold else {
            return page;
        };
        let scroll = doc.scroll_position();
        let rows = scaffold.rows(doc);

        // Everything presented last time, plus any tile that ended up in a row.
        let mut parked = std::mem::take(&mut self.presented);
        for &row in &rows {
            parked.extend(doc.descendants(row).into_iter().filter(|node| self.homes.contains_key(node)));
        }
        parked.sort();
        parked.dedup();

        for tile in parked {
            if !rows.iter().any(|&row| doc.contains(row, tile)) {
                continue;
            }
            doc.append_child(scaffold.holding, tile);
            self.overlay.conceal(doc, tile);
            doc.set_attr(tile, PAGED_OUT_ATTR, "");
        }
        for row in rows {
            doc.detach(row);
        }

        let start = self.table.window_start();
        for (offset, tile) in self.table.window().iter().enumerate() {
            let (_, cell) = build_row(doc, scaffold.tbody, tile, start + offset + 1);
            self.overlay.present(doc, tile.node, cell);
            doc.remove_attr(tile.node, PAGED_OUT_ATTR);
            self.presented.push(tile.node);
        }

        scaffold.update_pager(doc, &page);
        doc.set_scroll_position(scroll);
        debug!("Rendered {}", page.label());
        page
    }

    /// Leave table mode: restore every tile's inline positioning, put each
    /// tile back at its original index under its original parent and drop the
    /// scaffold.
    pub fn show_grid(&mut self, doc: &mut Document) -> Result<(), PresentationError> {
        if !self.table.is_active {
            return Ok(());
        }
        let container = self.container.ok_or(PresentationError::ContainerMissing)?;

        let mut homed: Vec<(NodeId, Home)> = self
            .homes
            .iter()
            .map(|(&tile, &home)| (tile, home))
            .filter(|&(tile, _)| doc.is_connected(tile))
            .collect();
        homed.sort_by_key(|&(_, home)| home.seq);

        let mut placements: Vec<(NodeId, Vec<(NodeId, usize)>)> = Vec::new();
        for &(tile, home) in &homed {
            self.overlay.restore(doc, tile);
            doc.remove_attr(tile, PAGED_OUT_ATTR);
            if doc.has_attr(tile, FILTERED_ATTR) {
                self.overlay.conceal(doc, tile);
            }

            let Some(index) = doc.attr(tile, ORIGIN_ATTR).and_then(|v| v.parse::<usize>().ok()) else {
                continue;
            };
            // A parent the host dropped meanwhile hands its tiles to the container.
            let parent = if doc.is_connected(home.parent) { home.parent } else { container };
            match placements.iter_mut().find(|(p, _)| *p == parent) {
                Some((_, batch)) => batch.push((tile, index)),
                None => placements.push((parent, vec![(tile, index)])),
            }
        }
        for (parent, batch) in &placements {
            doc.restore_children(*parent, batch);
        }

        if let Some(scaffold) = self.scaffold.take() {
            doc.detach(scaffold.root);
        }
        self.overlay.restore(doc, container);
        self.container = None;
        self.presented.clear();
        self.table.reset();

        info!("Grid view restored with {} tiles under {} parents", homed.len(), placements.len());
        Ok(())
    }

    /// The tile a click on table row `position` of the current page reaches.
    pub fn row_target(&self, doc: &Document, position: usize) -> Result<NodeId, PresentationError> {
        let scaffold = self.scaffold.filter(|_| self.table.is_active).ok_or(PresentationError::TableInactive)?;
        let row = scaffold
            .rows(doc)
            .get(position)
            .copied()
            .ok_or(PresentationError::RowOutOfRange(position))?;

        let hit = hit_target(doc, row).ok_or(PresentationError::RowOutOfRange(position))?;
        Ok(std::iter::once(hit)
            .chain(doc.ancestors(hit).take_while(|&a| a != row))
            .find(|node| self.homes.contains_key(node))
            .unwrap_or(hit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostBehavior, SnapshotHost};
    use crate::traits::SiteConfig;

    fn page(n: usize) -> String {
        let tiles: String = (0..n)
            .map(|i| {
                format!(
                    r#"<div data-testid="feed-tile-{i}" style="position: relative !important; top: {i}px"><a href="/o?merchant=shop{i}.com">{i}X miles</a></div>"#
                )
            })
            .collect();
        format!(r#"<html><body><h1>Offers</h1><div id="grid" style="display: grid">{tiles}</div></body></html>"#)
    }

    fn host(n: usize) -> SnapshotHost {
        SnapshotHost::new(Document::parse(&page(n)), Vec::new(), HostBehavior::default())
    }

    fn extractor() -> TileExtractor {
        TileExtractor::new(SiteConfig::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tiles_fails_closed() {
        let mut host = host(0);
        let before = host.document().to_html();
        let mut reconciler = PresentationReconciler::new(DEFAULT_PAGE_SIZE);

        let err = reconciler.show_table(&mut host, &mut extractor()).await.unwrap_err();
        assert_eq!(err, PresentationError::NoTiles);
        assert_eq!(host.document().to_html(), before);
        assert_eq!(reconciler.mode(), ViewMode::Grid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_pages_and_clamps() {
        let mut host = host(23);
        let mut extractor = extractor();
        let mut reconciler = PresentationReconciler::new(10);

        let first = reconciler.show_table(&mut host, &mut extractor).await.unwrap();
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.rows.len(), 10);

        let doc = host.document_mut();
        let last = reconciler.go_to_page(doc, 9).unwrap();
        assert_eq!(last.page_index, 2);
        assert_eq!(last.rows.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![21, 22, 23]);
        assert_eq!(reconciler.scaffold().unwrap().rows(doc).len(), 3);
        assert_eq!(
            doc.text_content(reconciler.scaffold().unwrap().label),
            "Page 3 of 3"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_restores_grid_exactly() {
        let mut host = host(12);
        let before = host.document().to_html();
        let mut extractor = extractor();
        let mut reconciler = PresentationReconciler::new(5);

        reconciler.show_table(&mut host, &mut extractor).await.unwrap();
        let doc = host.document_mut();
        reconciler.next_page(doc).unwrap();
        reconciler.next_page(doc).unwrap();
        reconciler.previous_page(doc).unwrap();
        reconciler.show_grid(doc).unwrap();

        let grid = doc.find_by_attr("id", "grid").unwrap();
        let tiles = doc.element_children(grid);
        assert_eq!(tiles.len(), 12);
        for (index, &tile) in tiles.iter().enumerate() {
            assert_eq!(doc.attr(tile, ORIGIN_ATTR), Some(index.to_string().as_str()));
            let style = doc.style(tile).unwrap();
            assert_eq!(style.value("top"), Some(format!("{index}px").as_str()));
            assert!(style.is_important("position"));
            assert_eq!(style.value("opacity"), None);
        }
        assert_eq!(doc.style(grid).unwrap().value("display"), Some("grid"));
        assert!(doc.find_by_attr(ROLE_ATTR, "table-view").is_none());

        // Only the origin marks differ from the untouched page.
        let mut cleaned = doc.clone();
        for tile in tiles {
            cleaned.remove_attr(tile, ORIGIN_ATTR);
        }
        assert_eq!(cleaned.to_html(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiles_return_to_their_own_sections() {
        let tile = |i: usize| {
            format!(r#"<div data-testid="feed-tile-{i}"><a href="/o?merchant=shop{i}.com">{i}X miles</a></div>"#)
        };
        let travel: String = (0..5).map(tile).collect();
        let retail: String = (5..12).map(tile).collect();
        let html = format!(
            r#"<html><body><div id="offers"><section id="a"><h2>Travel</h2>{travel}</section><section id="b"><h2>Retail</h2>{retail}</section></div></body></html>"#
        );
        let mut host = SnapshotHost::new(Document::parse(&html), Vec::new(), HostBehavior::default());
        let before = host.document().to_html();
        let mut extractor = extractor();
        let mut reconciler = PresentationReconciler::new(5);

        let first = reconciler.show_table(&mut host, &mut extractor).await.unwrap();
        assert_eq!(first.total_records, 12);

        let doc = host.document_mut();
        let offers = doc.find_by_attr("id", "offers").unwrap();
        assert_eq!(reconciler.container(doc, &extractor), Some(offers));
        assert_eq!(doc.style(offers).unwrap().value("display"), Some("none"));

        reconciler.next_page(doc).unwrap();
        let last = reconciler.next_page(doc).unwrap();
        assert_eq!(last.rows.len(), 2);
        assert_eq!(extractor.locate(doc).len(), 12);

        reconciler.show_grid(doc).unwrap();
        let markers = |id: &str| {
            let section = doc.find_by_attr("id", id).unwrap();
            doc.element_children(section)
                .into_iter()
                .filter_map(|node| doc.attr(node, "data-testid").map(str::to_string))
                .collect::<Vec<_>>()
        };
        let expected = |range: std::ops::Range<usize>| range.map(|i| format!("feed-tile-{i}")).collect::<Vec<_>>();
        assert_eq!(markers("a"), expected(0..5));
        assert_eq!(markers("b"), expected(5..12));

        let mut cleaned = doc.clone();
        for tile in extractor.locate(doc) {
            cleaned.remove_attr(tile, ORIGIN_ATTR);
        }
        assert_eq!(cleaned.to_html(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_receives_row_clicks() {
        let mut host = host(3);
        let mut extractor = extractor();
        let mut reconciler = PresentationReconciler::new(10);
        reconciler.show_table(&mut host, &mut extractor).await.unwrap();

        let doc = host.document();
        let target = reconciler.row_target(doc, 1).unwrap();
        assert_eq!(doc.attr(target, "data-testid"), Some("feed-tile-1"));
        assert_eq!(reconciler.row_target(doc, 7), Err(PresentationError::RowOutOfRange(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_keeps_filtered_tiles_hidden() {
        let mut host = host(4);
        let mut extractor = extractor();
        let mut reconciler = PresentationReconciler::new(10);
        reconciler.show_table(&mut host, &mut extractor).await.unwrap();

        let doc = host.document_mut();
        let hidden = doc.find_by_attr("data-testid", "feed-tile-2").unwrap();
        doc.set_attr(hidden, FILTERED_ATTR, "");

        let page = reconciler.refresh(doc, &mut extractor).unwrap();
        assert_eq!(page.total_records, 3);
        assert!(doc.has_attr(hidden, FILTERED_ATTR));
        assert_eq!(doc.style(hidden).unwrap().value("display"), Some("none"));

        reconciler.show_grid(doc).unwrap();
        assert_eq!(doc.style(hidden).unwrap().value("display"), Some("none"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sorted_order_drives_table() {
        let mut host = host(3);
        let mut extractor = extractor();
        let reconciler_records = {
            let doc = host.document();
            let nodes = extractor.locate(doc);
            extractor.extract_all(doc, &nodes)
        };
        let sorted = crate::sort::sort_tiles(
            &reconciler_records,
            &crate::models::SortSpec::new(crate::models::SortKey::Mileage, crate::models::SortDirection::Descending),
        );

        let mut reconciler = PresentationReconciler::new(10);
        reconciler.apply_grid_order(host.document_mut(), &sorted);
        let page = reconciler.show_table(&mut host, &mut extractor).await.unwrap();

        let keys: Vec<_> = page.rows.iter().map(|r| r.merchant_key.as_str()).collect();
        assert_eq!(keys, vec!["shop2.com", "shop1.com", "shop0.com"]);
    }

    #[test]
    fn test_inactive_table_refuses_page_turns() {
        let mut doc = Document::parse(&page(2));
        let mut reconciler = PresentationReconciler::new(10);
        assert_eq!(reconciler.next_page(&mut doc), Err(PresentationError::TableInactive));
        assert!(reconciler.show_grid(&mut doc).is_ok());
    }
}
