//! Seams between the pipeline and the things it does not own: the host page,
//! its structural conventions, the styling technique and favorites storage

use async_trait::async_trait;

use crate::dom::{Document, NodeId};
use crate::error::{HostError, StoreError};
use crate::models::{FavoriteEntry, FavoritesSnapshot};

/// Structural assumptions about the host catalog page
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Display name for the catalog
    pub name: String,
    /// Attribute carrying the tile marker
    pub marker_attribute: String,
    /// Prefix every tile marker value starts with
    pub tile_prefix: String,
    /// Marker token flagging a loading placeholder
    pub placeholder_token: String,
    /// Marker token flagging carousel membership
    pub carousel_token: String,
    /// Visible text of the "load more" control
    pub load_more_text: String,
    /// CSS selectors for the fallback extraction strategies
    pub selectors: SiteSelectors,
    /// Decorative marks stripped from reward text before parsing
    pub decorative_marks: Vec<char>,
}

/// CSS selectors and URL parameters used inside a single tile
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    /// Image element whose URL carries the merchant domain
    pub image: String,
    /// Query parameter of the image URL holding the merchant domain
    pub image_param: String,
    /// Link element whose URL carries the merchant domain
    pub link: String,
    /// Query parameter of the link URL holding the merchant domain
    pub link_param: String,
}

/// What a marker value says about the element carrying it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKind {
    Offer,
    Placeholder,
    Carousel,
    NotATile,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "Offer feed".to_string(),
            marker_attribute: "data-testid".to_string(),
            tile_prefix: "feed-tile-".to_string(),
            placeholder_token: "placeholder".to_string(),
            carousel_token: "carousel".to_string(),
            load_more_text: "View More Offers".to_string(),
            selectors: SiteSelectors {
                image: "img[src]".to_string(),
                image_param: "domain".to_string(),
                link: "a[href]".to_string(),
                link_param: "merchant".to_string(),
            },
            decorative_marks: vec!['*', '†', '‡', '§', '®', '™'],
        }
    }
}

impl SiteConfig {
    /// Classify a marker value. Tokens are only looked for ahead of any
    /// embedded payload, so merchant data cannot change the classification.
    pub fn classify(&self, marker: &str) -> TileKind {
        let Some(rest) = marker.strip_prefix(&self.tile_prefix) else {
            return TileKind::NotATile;
        };
        let head = rest.split('{').next().unwrap_or_default().to_ascii_lowercase();

        if head.contains(&self.placeholder_token) {
            TileKind::Placeholder
        } else if head.contains(&self.carousel_token) {
            TileKind::Carousel
        } else {
            TileKind::Offer
        }
    }

    /// Embedded payload of a marker value, if any.
    pub fn payload<'a>(&self, marker: &'a str) -> Option<&'a str> {
        let rest = marker.strip_prefix(&self.tile_prefix)?;
        let start = rest.find('{')?;
        Some(&rest[start..])
    }

    /// Classify the element `node` by its marker attribute.
    pub fn kind_of(&self, doc: &Document, node: NodeId) -> TileKind {
        doc.attr(node, &self.marker_attribute)
            .map_or(TileKind::NotATile, |marker| self.classify(marker))
    }
}

/// Synthetic input events, in the order a real click produces them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    PointerOver,
    PointerEnter,
    MouseOver,
    PointerDown,
    MouseDown,
    PointerUp,
    MouseUp,
    Click,
}

impl PointerEvent {
    pub const CLICK_SEQUENCE: [PointerEvent; 8] = [
        Self::PointerOver,
        Self::PointerEnter,
        Self::MouseOver,
        Self::PointerDown,
        Self::MouseDown,
        Self::PointerUp,
        Self::MouseUp,
        Self::Click,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::PointerOver => "pointerover",
            Self::PointerEnter => "pointerenter",
            Self::MouseOver => "mouseover",
            Self::PointerDown => "pointerdown",
            Self::MouseDown => "mousedown",
            Self::PointerUp => "pointerup",
            Self::MouseUp => "mouseup",
            Self::Click => "click",
        }
    }
}

/// The page the pipeline runs inside but does not control.
///
/// All host-side work (re-rendering, appending newly loaded tiles) happens
/// inside `run_pending` or the activation methods; between those calls the
/// document is stable.
#[async_trait]
pub trait HostPage: Send {
    fn document(&self) -> &Document;

    fn document_mut(&mut self) -> &mut Document;

    /// Apply host work that has come due.
    ///
    /// # Returns
    /// * `Result<usize, HostError>` - Number of host mutations applied
    fn run_pending(&mut self) -> Result<usize, HostError>;

    /// Call the host framework's own click handler for `node`, bypassing DOM events.
    ///
    /// # Returns
    /// * `Result<bool, HostError>` - `false` when the node exposes no internal handler
    async fn invoke_internal_handler(&mut self, node: NodeId) -> Result<bool, HostError>;

    /// Deliver one synthetic input event to `node`.
    async fn dispatch_event(&mut self, node: NodeId, event: PointerEvent) -> Result<(), HostError>;
}

/// Makes a borrowed node take part in a synthetic layout without copying it
pub trait OverlayManager {
    /// Capture the node's inline positioning. No-op when already captured.
    fn snapshot(&mut self, doc: &Document, node: NodeId);

    /// Place `node` inside `container` as an invisible, clickable overlay.
    fn present(&mut self, doc: &mut Document, node: NodeId, container: NodeId);

    /// Put the captured inline positioning back.
    ///
    /// # Returns
    /// * `bool` - `false` when no snapshot exists for the node
    fn restore(&mut self, doc: &mut Document, node: NodeId) -> bool;

    /// Take the node out of display without moving it.
    fn conceal(&mut self, doc: &mut Document, node: NodeId);

    fn has_snapshot(&self, node: NodeId) -> bool;
}

/// Persistence collaborator for the favoriting feature
#[async_trait]
pub trait FavoritesStore: Send + Sync {
    async fn snapshot(&self) -> Result<FavoritesSnapshot, StoreError>;

    async fn set_enabled(&self, enabled: bool) -> Result<(), StoreError>;

    async fn set_filter_active(&self, active: bool) -> Result<(), StoreError>;

    /// Add the merchant if absent, remove it otherwise.
    ///
    /// # Returns
    /// * `Result<bool, StoreError>` - `true` when the merchant is now a favorite
    async fn toggle(&self, entry: FavoriteEntry) -> Result<bool, StoreError>;
}
