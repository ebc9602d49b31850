//! Data model shared by the extraction, sorting and presentation stages

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dom::NodeId;

/// Display name used when no merchant could be identified.
pub const UNKNOWN_MERCHANT: &str = "Unknown Merchant";

/// One offer tile: a live node reference plus the fields derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub node: NodeId,
    pub merchant_key: String,
    pub display_name: String,
    pub reward_text: String,
    pub reward_value: u64,
    pub sort_index: usize,
}

impl Tile {
    /// A tile for which nothing could be extracted.
    pub fn degraded(node: NodeId) -> Self {
        Self {
            node,
            merchant_key: String::new(),
            display_name: UNKNOWN_MERCHANT.to_string(),
            reward_text: String::new(),
            reward_value: 0,
            sort_index: 0,
        }
    }

    /// `true` when no merchant key could be resolved.
    pub fn is_degraded(&self) -> bool {
        self.merchant_key.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Mileage,
    Alphabetical,
    MileageThenMerchant,
}

impl SortKey {
    /// Parse a criteria name. Unknown names sort by mileage.
    pub fn parse_lossy(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "alphabetical" | "merchant" | "name" => Self::Alphabetical,
            "mileagethenmerchant" | "mileagemerchant" => Self::MileageThenMerchant,
            _ => Self::Mileage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    /// Parse a direction name. Anything that is not recognisably ascending is descending.
    pub fn parse_lossy(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "up" => Self::Ascending,
            _ => Self::Descending,
        }
    }
}

/// Requested ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
    /// Only consulted for [`SortKey::MileageThenMerchant`]; defaults to ascending names.
    pub secondary_direction: Option<SortDirection>,
}

impl SortSpec {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self {
            key,
            direction,
            secondary_direction: None,
        }
    }

    pub fn with_secondary(mut self, direction: SortDirection) -> Self {
        self.secondary_direction = Some(direction);
        self
    }

    /// Parse `criteria` and `order` strings as received from the control surface.
    /// `order` may carry a secondary direction after a colon, e.g. `desc:asc`.
    pub fn parse_lossy(criteria: &str, order: &str) -> Self {
        let (primary, secondary) = match order.split_once(':') {
            Some((primary, secondary)) => (primary, Some(SortDirection::parse_lossy(secondary))),
            None => (order, None),
        };
        Self {
            key: SortKey::parse_lossy(criteria),
            direction: SortDirection::parse_lossy(primary),
            secondary_direction: secondary,
        }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.key, self.direction)?;
        if let Some(secondary) = self.secondary_direction {
            write!(f, "/{secondary:?}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewMode {
    #[default]
    Grid,
    Table,
}

impl ViewMode {
    pub fn parse_lossy(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("table") {
            Self::Table
        } else {
            Self::Grid
        }
    }
}

/// A favorited merchant, as held by the favorites store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    pub merchant_key: String,
    pub display_name: String,
    pub reward_text: String,
    pub added_at: DateTime<Utc>,
}

impl FavoriteEntry {
    pub fn from_tile(tile: &Tile) -> Self {
        Self {
            merchant_key: tile.merchant_key.clone(),
            display_name: tile.display_name.clone(),
            reward_text: tile.reward_text.clone(),
            added_at: Utc::now(),
        }
    }
}

/// Favorites state as read from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoritesSnapshot {
    pub enabled: bool,
    pub filter_active: bool,
    #[serde(default)]
    pub favorites: HashMap<String, FavoriteEntry>,
}

impl FavoritesSnapshot {
    pub fn is_favorite(&self, merchant_key: &str) -> bool {
        !merchant_key.is_empty() && self.favorites.contains_key(merchant_key)
    }
}

/// What an in-flight sort or pagination pass is doing, for progress queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum Progress {
    #[default]
    Idle,
    #[serde(rename_all = "camelCase")]
    Paginating {
        pages_loaded: u32,
        attempts: u32,
        tiles: usize,
    },
    Sorting { tiles: usize },
    Presenting,
    #[serde(rename_all = "camelCase")]
    Finished { tiles: usize, pages_loaded: u32 },
}

/// Result shape for every command accepted from the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CommandOutcome<T> {
    /// The command ran and produced data.
    Done { data: T },
    /// A request of the same kind is still running; nothing was done.
    AlreadyInProgress,
    /// The host runtime went away mid-command; nobody is listening any more.
    Aborted,
    /// The command could not run. `message` is short and user-facing.
    Failed { message: String },
}

impl<T> CommandOutcome<T> {
    pub fn done(data: T) -> Self {
        Self::Done { data }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Done { data } => Some(data),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Done { data } => Some(data),
            _ => None,
        }
    }
}
