//! End-to-end scenarios against a replayed host page.

use std::time::Duration;

use pretty_assertions::assert_eq;

use offer_deck::activation::Activation;
use offer_deck::dom::{Document, NodeId};
use offer_deck::extract::locate_tiles;
use offer_deck::favorites::{FAV_BUTTON_ATTR, MemoryFavoritesStore};
use offer_deck::host::{HostBehavior, SnapshotHost};
use offer_deck::models::{CommandOutcome, FavoritesSnapshot, Progress, ViewMode};
use offer_deck::presentation::FILTERED_ATTR;
use offer_deck::traits::{FavoritesStore, HostPage, SiteConfig};
use offer_deck::{DeckSettings, OfferDeck};

type Deck = OfferDeck<SnapshotHost, MemoryFavoritesStore>;

fn tile(merchant: &str, multiplier: u32) -> String {
    format!(
        r#"<div data-testid='feed-tile-{{"inventory":{{"merchantTLD":"{merchant}"}}}}' style="position: relative !important; width: 200px"><a href="/offers/{merchant}">{multiplier}X miles</a></div>"#
    )
}

fn tiles(range: std::ops::Range<u32>) -> String {
    range.map(|i| tile(&format!("shop{i:02}.com"), i + 1)).collect()
}

fn page(body: &str) -> Document {
    Document::parse(&format!(
        r#"<html><body><main><h1>Offers</h1><div id="grid" class="offers">{body}</div><button class="more">View More Offers</button></main></body></html>"#
    ))
}

fn deck_with(doc: Document, batches: Vec<String>, behavior: HostBehavior, store: MemoryFavoritesStore) -> Deck {
    let host = SnapshotHost::new(doc, batches, behavior);
    OfferDeck::new(host, store, DeckSettings::default()).unwrap()
}

fn deck(doc: Document, batches: Vec<String>) -> Deck {
    deck_with(doc, batches, HostBehavior::default(), MemoryFavoritesStore::default())
}

/// 23 tiles: 10 on the page, then batches of 10 and 3.
fn deck_of_23() -> Deck {
    deck(page(&tiles(0..10)), vec![tiles(10..20), tiles(20..23)])
}

async fn grid_children(deck: &Deck) -> Vec<NodeId> {
    deck.with_host(|host| {
        let doc = host.document();
        let grid = doc.find_by_attr("id", "grid").unwrap();
        doc.element_children(grid)
    })
    .await
}

async fn section_children(deck: &Deck) -> [Vec<NodeId>; 2] {
    deck.with_host(|host| {
        let doc = host.document();
        ["featured", "more"].map(|id| doc.element_children(doc.find_by_attr("id", id).unwrap()))
    })
    .await
}

async fn tile_styles(deck: &Deck) -> Vec<(String, String)> {
    deck.with_host(|host| {
        let doc = host.document();
        locate_tiles(doc, &SiteConfig::default())
            .into_iter()
            .map(|node| {
                let marker = doc.attr(node, "data-testid").unwrap_or_default().to_string();
                let style = doc.style(node).map(|s| s.to_string()).unwrap_or_default();
                (marker, style)
            })
            .collect()
    })
    .await
}

#[tokio::test(start_paused = true)]
async fn test_sort_loads_everything_and_orders_by_mileage() {
    let deck = deck_of_23();

    let summary = deck.apply_sort("mileage", "desc").await.into_data().unwrap();
    assert_eq!(summary.pagination.pages_loaded, 2);
    assert!(summary.pagination.fully_loaded);
    assert_eq!(summary.tiles, 23);
    assert_eq!(summary.order[..3].to_vec(), vec!["shop22.com", "shop21.com", "shop20.com"]);
    assert_eq!(summary.order[22], "shop00.com");

    assert_eq!(deck.progress(), Progress::Finished { tiles: 23, pages_loaded: 2 });
    assert!(deck.render_html().await.contains("order: 0"));
}

#[tokio::test(start_paused = true)]
async fn test_table_of_23_has_three_pages() {
    let deck = deck_of_23();
    let sorted = deck.apply_sort("mileage", "asc").await.into_data().unwrap();

    let view = deck.set_view_mode(ViewMode::Table).await.into_data().unwrap();
    assert_eq!(view.mode, ViewMode::Table);
    let first = view.table.unwrap();
    assert_eq!(first.total_pages, 3);
    assert_eq!(first.rows.len(), 10);

    let last = deck.turn_table_page(2).await.into_data().unwrap();
    assert_eq!(last.rows.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![21, 22, 23]);
    let keys: Vec<_> = last.rows.iter().map(|r| r.merchant_key.clone()).collect();
    assert_eq!(keys, sorted.order[20..].to_vec());

    let clamped = deck.turn_table_page(9).await.into_data().unwrap();
    assert_eq!(clamped.page_index, 2);
    assert_eq!(clamped.rows.len(), 3);

    let previous = deck.previous_table_page().await.into_data().unwrap();
    assert_eq!(previous.page_index, 1);
}

#[tokio::test(start_paused = true)]
async fn test_table_round_trip_restores_every_tile() {
    let deck = deck_of_23();
    deck.apply_sort("alphabetical", "asc").await.into_data().unwrap();

    let children = grid_children(&deck).await;
    let styles = tile_styles(&deck).await;

    deck.set_view_mode(ViewMode::Table).await.into_data().unwrap();
    deck.next_table_page().await.into_data().unwrap();
    deck.next_table_page().await.into_data().unwrap();
    deck.turn_table_page(0).await.into_data().unwrap();
    deck.set_view_mode(ViewMode::Grid).await.into_data().unwrap();

    assert_eq!(grid_children(&deck).await, children);
    assert_eq!(tile_styles(&deck).await, styles);
    assert!(styles.iter().all(|(_, style)| style.starts_with("position: relative !important;")));
    assert!(!deck.render_html().await.contains("table-view"));
    assert_eq!(deck.view_mode().await, ViewMode::Grid);
}

#[tokio::test(start_paused = true)]
async fn test_table_round_trip_keeps_tiles_in_their_sections() {
    let doc = Document::parse(&format!(
        r#"<html><body><main><div class="feed"><section id="featured"><h2>Featured</h2>{}</section><section id="more"><h2>More offers</h2>{}</section></div></main></body></html>"#,
        tiles(0..5),
        tiles(5..12)
    ));
    let deck = deck(doc, Vec::new());
    deck.apply_sort("mileage", "desc").await.into_data().unwrap();

    let before = section_children(&deck).await;
    let styles = tile_styles(&deck).await;

    let table = deck.set_view_mode(ViewMode::Table).await.into_data().unwrap().table.unwrap();
    assert_eq!(table.total_records, 12);
    assert_eq!(table.rows[0].merchant_key, "shop11.com");
    deck.next_table_page().await.into_data().unwrap();
    let last = deck.next_table_page().await.into_data().unwrap();
    assert_eq!(last.rows.len(), 2);
    assert_eq!(tile_styles(&deck).await.len(), 12);

    deck.set_view_mode(ViewMode::Grid).await.into_data().unwrap();
    assert_eq!(section_children(&deck).await, before);
    assert_eq!(tile_styles(&deck).await, styles);
    assert!(!deck.render_html().await.contains("table-view"));
}

#[tokio::test(start_paused = true)]
async fn test_sequential_sorts_do_not_leak_state() {
    let body = [
        tile("zappos.com", 3),
        tile("adidas.com", 5),
        tile("macys.com", 1),
        tile("nike.com", 5),
        tile("bestBuy.com", 2),
    ]
    .concat();

    let deck = deck(page(&body), Vec::new());
    let by_name = deck.apply_sort("alphabetical", "asc").await.into_data().unwrap();
    assert_eq!(
        by_name.order,
        ["adidas.com", "bestbuy.com", "macys.com", "nike.com", "zappos.com"]
    );

    let by_miles = deck.apply_sort("mileage", "desc").await.into_data().unwrap();
    assert_eq!(
        by_miles.order,
        ["adidas.com", "nike.com", "zappos.com", "bestbuy.com", "macys.com"]
    );

    let fresh = self::deck(page(&body), Vec::new());
    let direct = fresh.apply_sort("mileage", "desc").await.into_data().unwrap();
    assert_eq!(direct.order, by_miles.order);
    assert_eq!(tile_styles(&fresh).await, tile_styles(&deck).await);
}

#[tokio::test(start_paused = true)]
async fn test_same_kind_requests_are_refused_while_in_flight() {
    let deck = deck_of_23();

    let (first, second) = tokio::join!(deck.apply_sort("mileage", "desc"), deck.apply_sort("alphabetical", "asc"));
    assert!(first.is_success());
    assert_eq!(second, CommandOutcome::AlreadyInProgress);

    let (first, second) = tokio::join!(deck.set_view_mode(ViewMode::Table), deck.set_view_mode(ViewMode::Table));
    assert!(first.is_success());
    assert_eq!(second, CommandOutcome::AlreadyInProgress);

    // Once the first request finished the kind is free again.
    assert!(deck.apply_sort("mileage", "asc").await.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_row_click_reaches_the_host_tile() {
    for (internal_handlers, expected) in [
        (true, Activation::InternalHandler),
        (false, Activation::SyntheticPointerSequence),
    ] {
        let behavior = HostBehavior {
            internal_handlers,
            ..HostBehavior::default()
        };
        let deck = deck_with(page(&tiles(0..4)), Vec::new(), behavior, MemoryFavoritesStore::default());
        deck.apply_sort("mileage", "desc").await.into_data().unwrap();
        let table = deck.set_view_mode(ViewMode::Table).await.into_data().unwrap().table.unwrap();

        let click = deck.click_row(1).await.into_data().unwrap();
        assert_eq!(click.merchant_key, table.rows[1].merchant_key);
        assert_eq!(click.activation, expected);

        let opened = deck
            .with_host(|host| {
                let doc = host.document();
                host.opened_offers()
                    .iter()
                    .map(|&node| doc.attr(node, "data-testid").unwrap_or_default().to_string())
                    .collect::<Vec<_>>()
            })
            .await;
        assert_eq!(opened.len(), 1);
        assert!(opened[0].contains("shop02.com"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_click_row_outside_table_fails() {
    let deck = deck(page(&tiles(0..2)), Vec::new());
    assert_eq!(deck.click_row(0).await, CommandOutcome::failed("Table view is not active"));
}

#[tokio::test(start_paused = true)]
async fn test_empty_page_fails_with_user_message() {
    let deck = deck(page(""), Vec::new());
    let before = deck.render_html().await;

    let message = "No offer tiles found on the page";
    assert_eq!(deck.apply_sort("mileage", "desc").await, CommandOutcome::failed(message));
    assert_eq!(deck.set_view_mode(ViewMode::Table).await, CommandOutcome::failed(message));
    assert_eq!(deck.render_html().await, before);
    assert_eq!(deck.progress(), Progress::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_aborts_quietly() {
    let deck = deck_of_23();
    deck.with_host_mut(|host| host.tear_down()).await;

    assert_eq!(deck.apply_sort("mileage", "desc").await, CommandOutcome::Aborted);
    assert_eq!(deck.complete_pagination().await, CommandOutcome::Aborted);
    assert_eq!(deck.set_view_mode(ViewMode::Table).await, CommandOutcome::Aborted);
}

#[tokio::test(start_paused = true)]
async fn test_favorites_filter_survives_table_and_sort() {
    let store = MemoryFavoritesStore::new(FavoritesSnapshot::default());
    let deck = deck_with(page(&tiles(0..6)), Vec::new(), HostBehavior::default(), store.clone());
    deck.apply_sort("mileage", "desc").await.into_data().unwrap();

    let enabled = deck.enable_favorites().await.into_data().unwrap();
    assert_eq!(enabled.toggles, 6);

    let toggled = deck.toggle_favorite("shop03.com").await.into_data().unwrap();
    assert!(toggled.is_favorite);
    deck.toggle_favorite("shop05.com").await.into_data().unwrap();

    let filtered = deck.apply_favorites_filter(true).await.into_data().unwrap();
    assert_eq!((filtered.filter.visible, filtered.filter.hidden), (2, 4));

    let table = deck.set_view_mode(ViewMode::Table).await.into_data().unwrap().table.unwrap();
    let keys: Vec<_> = table.rows.iter().map(|r| r.merchant_key.as_str()).collect();
    assert_eq!(keys, ["shop05.com", "shop03.com"]);

    let resorted = deck.apply_sort("mileage", "asc").await.into_data().unwrap();
    let keys: Vec<_> = resorted.table.unwrap().rows.into_iter().map(|r| r.merchant_key).collect();
    assert_eq!(keys, ["shop03.com", "shop05.com"]);

    deck.set_view_mode(ViewMode::Grid).await.into_data().unwrap();
    let hidden = deck
        .with_host(|host| {
            let doc = host.document();
            locate_tiles(doc, &SiteConfig::default())
                .into_iter()
                .filter(|&n| doc.has_attr(n, FILTERED_ATTR) && doc.style(n).unwrap().value("display") == Some("none"))
                .count()
        })
        .await;
    assert_eq!(hidden, 4);

    let cleared = deck.apply_favorites_filter(false).await.into_data().unwrap();
    assert_eq!(cleared.filter.hidden, 0);
    assert!(!deck.render_html().await.contains(FILTERED_ATTR));
    assert!(store.snapshot().await.unwrap().is_favorite("shop03.com"));
}

#[tokio::test(start_paused = true)]
async fn test_toggle_unknown_merchant_and_disable() {
    let deck = deck(page(&tiles(0..3)), Vec::new());
    deck.enable_favorites().await.into_data().unwrap();

    assert_eq!(
        deck.toggle_favorite("nope.com").await,
        CommandOutcome::failed("No offer from nope.com on the page")
    );

    let toggled = deck.toggle_favorite("shop01.com").await.into_data().unwrap();
    assert_eq!(toggled.favorites.favorites, 1);
    assert!(deck.render_html().await.contains(r#"aria-pressed="true""#));

    deck.disable_favorites().await.into_data().unwrap();
    assert!(!deck.render_html().await.contains(FAV_BUTTON_ATTR));
}

#[tokio::test(start_paused = true)]
async fn test_host_mutations_are_folded_in() {
    let deck = deck(page(&tiles(0..3)), Vec::new());
    deck.apply_sort("mileage", "desc").await.into_data().unwrap();
    deck.set_view_mode(ViewMode::Table).await.into_data().unwrap();

    deck.with_host_mut(|host| {
        let doc = host.document_mut();
        let grid = doc.find_by_attr("id", "grid").unwrap();
        doc.append_html(grid, &tile("latecomer.com", 9));
    })
    .await;

    let reconciled = deck.reconcile_mutations().await.into_data().unwrap();
    assert_eq!(reconciled.tiles, 4);
    let table = reconciled.table.unwrap();
    assert_eq!(table.total_records, 4);
    assert_eq!(table.rows[0].merchant_key, "latecomer.com");
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_published() {
    let deck = deck_of_23();
    let mut progress = deck.subscribe_progress();

    let watcher = tokio::spawn(async move {
        let mut saw_paginating = false;
        while progress.changed().await.is_ok() {
            match *progress.borrow_and_update() {
                Progress::Paginating { .. } => saw_paginating = true,
                Progress::Finished { .. } => break,
                _ => {}
            }
        }
        saw_paginating
    });

    deck.apply_sort("mileage", "desc").await.into_data().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(watcher.await.unwrap());
}
