//! Favorite toggles on tiles and the favorites-only filter.

mod store;

use serde::Serialize;
use tracing::debug;

pub use store::MemoryFavoritesStore;

use crate::dom::{Document, NodeId};
use crate::models::{FavoritesSnapshot, Tile};
use crate::presentation::{FAV_CELL_ATTR, FILTERED_ATTR};
use crate::traits::OverlayManager;

pub const FAV_BUTTON_ATTR: &str = "data-offer-deck-fav";

const STAR_ON: &str = "\u{2605}";
const STAR_OFF: &str = "\u{2606}";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSummary {
    pub visible: usize,
    pub hidden: usize,
}

/// Injects, updates and removes the favorite affordances.
#[derive(Debug, Clone, Copy, Default)]
pub struct FavoritesOverlay;

impl FavoritesOverlay {
    fn button_of(doc: &Document, tile: NodeId) -> Option<NodeId> {
        doc.element_children(tile)
            .into_iter()
            .find(|&child| doc.has_attr(child, FAV_BUTTON_ATTR))
    }

    /// Bring every tile's toggle and every table favorite cell in line with
    /// `snapshot`. Removes everything when the feature is disabled.
    pub fn sync(&self, doc: &mut Document, tiles: &[Tile], snapshot: &FavoritesSnapshot) -> usize {
        if !snapshot.enabled {
            self.remove_all(doc);
            return 0;
        }

        let mut synced = 0;
        for tile in tiles.iter().filter(|t| !t.is_degraded()) {
            let favorite = snapshot.is_favorite(&tile.merchant_key);
            let button = match Self::button_of(doc, tile.node) {
                Some(button) => button,
                None => {
                    let button = doc.create_element("button");
                    doc.set_attr(button, "type", "button");
                    doc.set_attr(button, FAV_BUTTON_ATTR, &tile.merchant_key);
                    doc.append_child(tile.node, button);
                    button
                }
            };
            doc.set_attr(button, "aria-pressed", if favorite { "true" } else { "false" });
            doc.set_attr(
                button,
                "title",
                if favorite { "Remove from favorites" } else { "Add to favorites" },
            );
            doc.set_text(button, if favorite { STAR_ON } else { STAR_OFF });
            synced += 1;
        }

        let cells: Vec<NodeId> = doc
            .descendants(doc.root())
            .into_iter()
            .filter(|&node| doc.has_attr(node, FAV_CELL_ATTR))
            .collect();
        for cell in cells {
            let favorite = doc.attr(cell, FAV_CELL_ATTR).is_some_and(|key| snapshot.is_favorite(key));
            doc.set_text(cell, if favorite { STAR_ON } else { STAR_OFF });
        }

        debug!("Synced favorite toggles on {} tiles", synced);
        synced
    }

    /// Remove all injected toggles and clear table favorite cells.
    pub fn remove_all(&self, doc: &mut Document) -> usize {
        let mut removed = 0;
        for node in doc.descendants(doc.root()) {
            if doc.has_attr(node, FAV_BUTTON_ATTR) {
                doc.detach(node);
                removed += 1;
            } else if doc.has_attr(node, FAV_CELL_ATTR) {
                doc.set_text(node, "");
            }
        }
        removed
    }

    /// Hide non-favorite tiles while the filter is on, reveal them otherwise.
    ///
    /// Hidden tiles carry [`FILTERED_ATTR`] so that other passes leave them hidden.
    pub fn apply_filter<O: OverlayManager + ?Sized>(
        &self,
        doc: &mut Document,
        overlay: &mut O,
        tiles: &[Tile],
        snapshot: &FavoritesSnapshot,
    ) -> FilterSummary {
        let active = snapshot.enabled && snapshot.filter_active;
        let mut summary = FilterSummary::default();

        for tile in tiles {
            let hide = active && !snapshot.is_favorite(&tile.merchant_key);
            let hidden = doc.has_attr(tile.node, FILTERED_ATTR);

            if hide && !hidden {
                doc.set_attr(tile.node, FILTERED_ATTR, "");
                overlay.conceal(doc, tile.node);
            } else if !hide && hidden {
                doc.remove_attr(tile.node, FILTERED_ATTR);
                overlay.restore(doc, tile.node);
            }

            if hide {
                summary.hidden += 1;
            } else {
                summary.visible += 1;
            }
        }

        debug!("Favorites filter: {} visible, {} hidden", summary.visible, summary.hidden);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FavoriteEntry;
    use crate::presentation::InlineStyleOverlay;
    use chrono::Utc;

    fn fixture() -> (Document, Vec<Tile>) {
        let doc = Document::parse(
            r#"<body><div id="grid">
                <div id="a" style="display: flex">A</div><div id="b">B</div><div id="c">C</div>
            </div></body>"#,
        );
        let tiles = ["a", "b", "c"]
            .iter()
            .map(|id| Tile {
                merchant_key: format!("{id}.com"),
                display_name: id.to_uppercase(),
                ..Tile::degraded(doc.find_by_attr("id", id).unwrap())
            })
            .collect();
        (doc, tiles)
    }

    fn snapshot(enabled: bool, filter_active: bool, keys: &[&str]) -> FavoritesSnapshot {
        FavoritesSnapshot {
            enabled,
            filter_active,
            favorites: keys
                .iter()
                .map(|key| {
                    let entry = FavoriteEntry {
                        merchant_key: key.to_string(),
                        display_name: key.to_string(),
                        reward_text: String::new(),
                        added_at: Utc::now(),
                    };
                    (key.to_string(), entry)
                })
                .collect(),
        }
    }

    #[test]
    fn test_sync_injects_once_and_updates() {
        let (mut doc, tiles) = fixture();
        let overlay = FavoritesOverlay;

        assert_eq!(overlay.sync(&mut doc, &tiles, &snapshot(true, false, &["b.com"])), 3);
        assert_eq!(overlay.sync(&mut doc, &tiles, &snapshot(true, false, &["a.com"])), 3);

        let a = FavoritesOverlay::button_of(&doc, tiles[0].node).unwrap();
        let b = FavoritesOverlay::button_of(&doc, tiles[1].node).unwrap();
        assert_eq!(doc.attr(a, "aria-pressed"), Some("true"));
        assert_eq!(doc.text_content(a), STAR_ON);
        assert_eq!(doc.attr(b, "aria-pressed"), Some("false"));
        assert_eq!(doc.element_children(tiles[0].node).len(), 1);
    }

    #[test]
    fn test_disabled_removes_toggles() {
        let (mut doc, tiles) = fixture();
        let overlay = FavoritesOverlay;
        overlay.sync(&mut doc, &tiles, &snapshot(true, false, &[]));

        assert_eq!(overlay.sync(&mut doc, &tiles, &snapshot(false, false, &[])), 0);
        assert!(doc.find_by_attr("type", "button").is_none());
    }

    #[test]
    fn test_degraded_tiles_get_no_toggle() {
        let (mut doc, mut tiles) = fixture();
        tiles[2].merchant_key.clear();
        assert_eq!(FavoritesOverlay.sync(&mut doc, &tiles, &snapshot(true, false, &[])), 2);
    }

    #[test]
    fn test_filter_hides_and_reveals() {
        let (mut doc, tiles) = fixture();
        let mut manager = InlineStyleOverlay::default();

        let summary = FavoritesOverlay.apply_filter(&mut doc, &mut manager, &tiles, &snapshot(true, true, &["b.com"]));
        assert_eq!(summary, FilterSummary { visible: 1, hidden: 2 });
        assert!(doc.has_attr(tiles[0].node, FILTERED_ATTR));
        assert_eq!(doc.style(tiles[0].node).unwrap().value("display"), Some("none"));
        assert!(!doc.has_attr(tiles[1].node, FILTERED_ATTR));

        let summary = FavoritesOverlay.apply_filter(&mut doc, &mut manager, &tiles, &snapshot(true, false, &["b.com"]));
        assert_eq!(summary.hidden, 0);
        assert_eq!(doc.style(tiles[0].node).unwrap().value("display"), Some("flex"));
        assert_eq!(doc.style(tiles[2].node).unwrap().value("display"), None);
    }

    #[test]
    fn test_filter_ignored_while_disabled() {
        let (mut doc, tiles) = fixture();
        let mut manager = InlineStyleOverlay::default();
        let summary = FavoritesOverlay.apply_filter(&mut doc, &mut manager, &tiles, &snapshot(false, true, &[]));
        assert_eq!(summary.hidden, 0);
    }
}
