//! Client-side sort, pagination completion, table view and favorites for a
//! third-party grid of reward offer tiles.

pub mod activation;
pub mod config;
pub mod dom;
pub mod error;
pub mod extract;
pub mod favorites;
pub mod host;
pub mod models;
pub mod offer_deck;
pub mod pagination;
pub mod presentation;
pub mod settle;
pub mod sort;
pub mod source;
pub mod traits;

pub use config::Config;
pub use offer_deck::{DeckSettings, OfferDeck};
