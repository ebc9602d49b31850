//! # Runtime Configuration
//!
//! Everything the binary needs is read from `OFFER_DECK_*` environment
//! variables, after `.env` has been loaded with `dotenvy`. Every variable is
//! optional; unset or unparsable values fall back to the defaults below.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `OFFER_DECK_SOURCE` | `page.html` | Captured page: a file path or an `http(s)` URL |
//! | `OFFER_DECK_BATCHES` | unset | Comma-separated files or URLs, one per "load more" batch |
//! | `OFFER_DECK_OUTPUT` | unset (stdout) | Where the augmented HTML is written |
//! | `OFFER_DECK_SORT` | `mileage` | Sort criteria (`mileage`, `alphabetical`, `mileage-then-merchant`) |
//! | `OFFER_DECK_ORDER` | `desc` | Sort order, optionally `primary:secondary` |
//! | `OFFER_DECK_VIEW` | `grid` | `grid` or `table` |
//! | `OFFER_DECK_PAGE_SIZE` | `10` | Table rows per page |
//! | `OFFER_DECK_TABLE_PAGE` | `0` | Table page to show after sorting |
//! | `OFFER_DECK_FAVORITES_FILE` | unset | JSON seed for the favorites store |
//! | `OFFER_DECK_ONLY_FAVORITES` | `false` | Turn the favorites-only filter on |
//! | `OFFER_DECK_HOST_LATENCY_MS` | `100` | Simulated host delay before a batch lands |
//! | `OFFER_DECK_INITIAL_DELAY_MS` | `1000` | First wait after a "load more" activation |
//! | `OFFER_DECK_MIN_DELAY_MS` | `250` | Lower bound of the adaptive wait |
//! | `OFFER_DECK_MAX_DELAY_MS` | `4000` | Upper bound of the adaptive wait |
//! | `OFFER_DECK_MAX_ATTEMPTS` | `60` | Activation ceiling per pagination pass |
//! | `OFFER_DECK_FAILURE_CAP` | `3` | Consecutive fruitless attempts before giving up |
//! | `OFFER_DECK_CONTROL_RECHECKS` | `3` | Re-checks before the control counts as gone |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::warn;

use crate::models::{SortSpec, ViewMode};
use crate::offer_deck::DeckSettings;
use crate::pagination::PaginationConfig;
use crate::presentation::DEFAULT_PAGE_SIZE;

const PREFIX: &str = "OFFER_DECK_";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub source: String,
    pub batches: Vec<String>,
    pub output: Option<PathBuf>,
    pub sort_criteria: String,
    pub sort_order: String,
    pub view: ViewMode,
    pub page_size: usize,
    pub table_page: usize,
    pub favorites_file: Option<PathBuf>,
    pub only_favorites: bool,
    pub host_latency: Duration,
    pub pagination: PaginationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: "page.html".to_string(),
            batches: Vec::new(),
            output: None,
            sort_criteria: "mileage".to_string(),
            sort_order: "desc".to_string(),
            view: ViewMode::Grid,
            page_size: DEFAULT_PAGE_SIZE,
            table_page: 0,
            favorites_file: None,
            only_favorites: false,
            host_latency: Duration::from_millis(100),
            pagination: PaginationConfig::default(),
        }
    }
}

struct Reader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Reader<F> {
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{PREFIX}{name}"))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parsed<T: FromStr>(&self, name: &str, default: T) -> T {
        match self.raw(name) {
            Some(value) => value.parse().unwrap_or_else(|_| {
                warn!("Ignoring invalid {}{}={:?}", PREFIX, name, value);
                default
            }),
            None => default,
        }
    }

    fn millis(&self, name: &str, default: Duration) -> Duration {
        Duration::from_millis(self.parsed(name, default.as_millis() as u64))
    }

    fn flag(&self, name: &str) -> bool {
        self.raw(name)
            .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
    }
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let reader = Reader { lookup };
        let defaults = Self::default();
        let pagination_defaults = defaults.pagination.clone();

        let pagination = PaginationConfig {
            initial_delay: reader.millis("INITIAL_DELAY_MS", pagination_defaults.initial_delay),
            min_delay: reader.millis("MIN_DELAY_MS", pagination_defaults.min_delay),
            max_delay: reader.millis("MAX_DELAY_MS", pagination_defaults.max_delay),
            max_attempts: reader.parsed("MAX_ATTEMPTS", pagination_defaults.max_attempts),
            failure_cap: reader.parsed("FAILURE_CAP", pagination_defaults.failure_cap),
            control_rechecks: reader.parsed("CONTROL_RECHECKS", pagination_defaults.control_rechecks),
            ..pagination_defaults
        };

        if pagination.min_delay > pagination.max_delay {
            bail!(
                "{}MIN_DELAY_MS ({:?}) is above {}MAX_DELAY_MS ({:?})",
                PREFIX,
                pagination.min_delay,
                PREFIX,
                pagination.max_delay
            );
        }
        if pagination.failure_cap == 0 {
            bail!("{}FAILURE_CAP must be at least 1", PREFIX);
        }

        let batches = reader
            .raw("BATCHES")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            source: reader.raw("SOURCE").unwrap_or(defaults.source),
            batches,
            output: reader.raw("OUTPUT").map(PathBuf::from),
            sort_criteria: reader.raw("SORT").unwrap_or(defaults.sort_criteria),
            sort_order: reader.raw("ORDER").unwrap_or(defaults.sort_order),
            view: reader.raw("VIEW").map_or(defaults.view, |v| ViewMode::parse_lossy(&v)),
            page_size: reader.parsed("PAGE_SIZE", defaults.page_size).max(1),
            table_page: reader.parsed("TABLE_PAGE", defaults.table_page),
            favorites_file: reader.raw("FAVORITES_FILE").map(PathBuf::from),
            only_favorites: reader.flag("ONLY_FAVORITES"),
            host_latency: reader.millis("HOST_LATENCY_MS", defaults.host_latency),
            pagination,
        })
    }

    pub fn sort_spec(&self) -> SortSpec {
        SortSpec::parse_lossy(&self.sort_criteria, &self.sort_order)
    }

    pub fn deck_settings(&self) -> DeckSettings {
        DeckSettings {
            pagination: self.pagination.clone(),
            page_size: self.page_size,
            ..DeckSettings::default()
        }
    }
}
