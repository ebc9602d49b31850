use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use offer_deck::dom::Document;
use offer_deck::favorites::MemoryFavoritesStore;
use offer_deck::host::{HostBehavior, SnapshotHost};
use offer_deck::models::{CommandOutcome, ViewMode};
use offer_deck::source::PageSource;
use offer_deck::{Config, OfferDeck};

#[derive(Serialize)]
struct Printed<'a, T> {
    command: &'a str,
    outcome: &'a CommandOutcome<T>,
}

fn print_outcome<T: Serialize>(command: &str, outcome: &CommandOutcome<T>) -> Result<()> {
    println!("{}", serde_json::to_string(&Printed { command, outcome })?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    info!("Starting offer deck");
    let config = Config::from_env()?;

    let source = PageSource::new()?;
    let page = source.load(&config.source).await?;
    let batches = source.load_all(&config.batches).await?;
    info!("Loaded {} with {} later batches", config.source, batches.len());

    let behavior = HostBehavior {
        latency: config.host_latency,
        ..HostBehavior::default()
    };
    let host = SnapshotHost::new(Document::parse(&page), batches, behavior);

    let store = match &config.favorites_file {
        Some(path) => MemoryFavoritesStore::load(path).await?,
        None => MemoryFavoritesStore::default(),
    };

    let deck = OfferDeck::new(host, store, config.deck_settings())?;

    let sorted = deck.apply_sort(&config.sort_criteria, &config.sort_order).await;
    print_outcome("applySort", &sorted)?;
    if !sorted.is_success() {
        error!("Sorting did not complete, the page is written as loaded");
    }

    if config.only_favorites {
        print_outcome("enableFavorites", &deck.enable_favorites().await)?;
        print_outcome("applyFavoritesFilter", &deck.apply_favorites_filter(true).await)?;
    }

    if config.view == ViewMode::Table {
        print_outcome("setViewMode", &deck.set_view_mode(ViewMode::Table).await)?;
        if config.table_page > 0 {
            print_outcome("turnTablePage", &deck.turn_table_page(config.table_page).await)?;
        }
    }

    let html = deck.render_html().await;
    match &config.output {
        Some(path) => {
            tokio::fs::write(path, &html)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{html}"),
    }

    Ok(())
}
