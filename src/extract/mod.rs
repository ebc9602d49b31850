//! # Tile extraction
//!
//! Turns a live tile node into a [`Tile`] record. Extraction never fails: a
//! tile whose data cannot be read degrades to the sentinel values of
//! [`Tile::degraded`], so that sorting stays total over garbage input.
//!
//! The merchant key is resolved by an ordered list of strategies, each a pure
//! function over a parsed snapshot of the tile's markup. The first strategy
//! returning a valid key wins:
//!
//! 1. the JSON payload embedded in the tile marker
//! 2. a query parameter of the tile's image URL
//! 3. a query parameter of the tile's link URL (percent-decoded)

pub mod merchant;
pub mod reward;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use scraper::{Html, Selector};
use tokio::time::Instant;
use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::models::Tile;
use crate::traits::{SiteConfig, TileKind};

const CACHE_TTL: Duration = Duration::from_secs(30);

/// Parsed view of one tile, handed to the merchant strategies.
pub struct TileMarkup<'a> {
    pub marker: Option<&'a str>,
    pub fragment: &'a Html,
    pub site: &'a SiteConfig,
    pub image: &'a Selector,
    pub link: &'a Selector,
}

pub type MerchantStrategy = fn(&TileMarkup<'_>) -> Option<String>;

/// Merchant key strategies, in the order they are tried.
pub const MERCHANT_STRATEGIES: [(&str, MerchantStrategy); 3] = [
    ("embedded payload", from_marker_payload),
    ("image url", from_image_url),
    ("link url", from_link_url),
];

fn from_marker_payload(markup: &TileMarkup<'_>) -> Option<String> {
    markup
        .marker
        .and_then(|marker| markup.site.payload(marker))
        .and_then(merchant::from_payload)
}

fn from_image_url(markup: &TileMarkup<'_>) -> Option<String> {
    markup.fragment.select(markup.image).find_map(|img| {
        // Lazy-loaded images keep the real URL in data-src
        let src = img.value().attr("data-src").or_else(|| img.value().attr("src"))?;
        merchant::from_query(src, &markup.site.selectors.image_param, false)
    })
}

fn from_link_url(markup: &TileMarkup<'_>) -> Option<String> {
    markup.fragment.select(markup.link).find_map(|link| {
        let href = link.value().attr("href")?;
        merchant::from_query(href, &markup.site.selectors.link_param, true)
    })
}

/// Run the strategies in order and return the first key found, as written
/// on the page.
pub fn resolve_merchant_key(markup: &TileMarkup<'_>) -> String {
    MERCHANT_STRATEGIES
        .iter()
        .find_map(|(name, strategy)| {
            let key = strategy(markup)?;
            debug!("Merchant key {} resolved from {}", key, name);
            Some(key)
        })
        .unwrap_or_default()
}

/// First reward-looking text inside the tile, as displayed.
fn reward_text(fragment: &Html, marks: &[char]) -> String {
    let root = fragment.root_element();

    for chunk in root.text() {
        let chunk = chunk.trim();
        if !chunk.is_empty() && reward::find_reward_span(chunk, marks).is_some() {
            return chunk.to_string();
        }
    }

    let whole = root.text().collect::<Vec<_>>().join(" ");
    reward::find_reward_span(&whole, marks)
        .map(|span| span.trim().to_string())
        .unwrap_or_default()
}

struct CacheEntry {
    fingerprint: md5::Digest,
    tile: Tile,
    stored_at: Instant,
}

/// Last extraction per node, invalidated by content change, age or detachment.
#[derive(Default)]
pub struct ExtractionCache {
    entries: HashMap<NodeId, CacheEntry>,
}

impl ExtractionCache {
    fn get(&self, node: NodeId, fingerprint: md5::Digest) -> Option<Tile> {
        self.entries
            .get(&node)
            .filter(|entry| entry.fingerprint == fingerprint && entry.stored_at.elapsed() < CACHE_TTL)
            .map(|entry| entry.tile.clone())
    }

    fn insert(&mut self, node: NodeId, fingerprint: md5::Digest, tile: Tile) {
        self.entries.insert(
            node,
            CacheEntry {
                fingerprint,
                tile,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop entries for nodes that left the page or have gone stale.
    pub fn prune(&mut self, doc: &Document) {
        self.entries
            .retain(|&node, entry| doc.is_connected(node) && entry.stored_at.elapsed() < CACHE_TTL);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Locates genuine tiles and extracts [`Tile`] records from them
pub struct TileExtractor {
    site: SiteConfig,
    image_selector: Selector,
    link_selector: Selector,
    cache: ExtractionCache,
}

impl TileExtractor {
    pub fn new(site: SiteConfig) -> Result<Self> {
        let image_selector = Selector::parse(&site.selectors.image)
            .map_err(|e| anyhow::anyhow!("Failed to parse image selector: {:?}", e))?;
        let link_selector = Selector::parse(&site.selectors.link)
            .map_err(|e| anyhow::anyhow!("Failed to parse link selector: {:?}", e))?;

        Ok(Self {
            site,
            image_selector,
            link_selector,
            cache: ExtractionCache::default(),
        })
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    pub fn cache(&self) -> &ExtractionCache {
        &self.cache
    }

    /// Genuine offer tiles currently in the page, in document order.
    pub fn locate(&self, doc: &Document) -> Vec<NodeId> {
        locate_tiles(doc, &self.site)
    }

    /// Extract one tile, reusing the cached record when the node is unchanged.
    pub fn extract(&mut self, doc: &Document, node: NodeId) -> Tile {
        if !doc.is_element(node) {
            return Tile::degraded(node);
        }

        let html = doc.outer_html(node);
        let fingerprint = md5::compute(html.as_bytes());
        if let Some(tile) = self.cache.get(node, fingerprint) {
            return tile;
        }

        let tile = self.extract_markup(doc, node, &html);
        self.cache.insert(node, fingerprint, tile.clone());
        tile
    }

    /// Extract every node in `nodes`, in order, pruning stale cache entries first.
    pub fn extract_all(&mut self, doc: &Document, nodes: &[NodeId]) -> Vec<Tile> {
        self.cache.prune(doc);
        nodes.iter().map(|&node| self.extract(doc, node)).collect()
    }

    fn extract_markup(&self, doc: &Document, node: NodeId, html: &str) -> Tile {
        let fragment = Html::parse_fragment(html);
        let markup = TileMarkup {
            marker: doc.attr(node, &self.site.marker_attribute),
            fragment: &fragment,
            site: &self.site,
            image: &self.image_selector,
            link: &self.link_selector,
        };

        let written_key = resolve_merchant_key(&markup);
        let reward_text = reward_text(&fragment, &self.site.decorative_marks);
        let reward_value = reward::parse_reward_with(&reward_text, &self.site.decorative_marks);

        if written_key.is_empty() {
            debug!("No merchant key for tile {:?}", node);
        }

        // Case splits the display name; identity comparisons use the lowercase key.
        Tile {
            node,
            display_name: merchant::display_name(&written_key),
            merchant_key: written_key.to_ascii_lowercase(),
            reward_text,
            reward_value,
            sort_index: 0,
        }
    }
}

/// Genuine offer tiles: marked elements that are neither placeholders nor
/// carousel members, not nested inside another tile, in document order.
pub fn locate_tiles(doc: &Document, site: &SiteConfig) -> Vec<NodeId> {
    doc.descendants(doc.root())
        .into_iter()
        .filter(|&node| site.kind_of(doc, node) == TileKind::Offer)
        .filter(|&node| {
            doc.ancestors(node)
                .all(|ancestor| site.kind_of(doc, ancestor) == TileKind::NotATile)
        })
        .collect()
}
