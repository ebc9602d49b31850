//! The commands the control surface can send, wired through the pipeline:
//! pagination completion, extraction, sorting, presentation and favorites.
//!
//! Every command returns a [`CommandOutcome`]. Only one request per kind
//! (pagination, sort, view transition) runs at a time; a second one gets
//! [`CommandOutcome::AlreadyInProgress`] instead of being queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::activation::{self, Activation};
use crate::dom::Document;
use crate::error::{DeckError, HostError, PresentationError, StoreError};
use crate::extract::TileExtractor;
use crate::favorites::{FavoritesOverlay, FilterSummary};
use crate::models::{CommandOutcome, FavoriteEntry, FavoritesSnapshot, Progress, SortSpec, Tile, ViewMode};
use crate::pagination::{PaginationConfig, PaginationEngine, PaginationReport};
use crate::presentation::{DEFAULT_PAGE_SIZE, PresentationReconciler, TablePage};
use crate::settle::{self, Settled};
use crate::sort;
use crate::traits::{FavoritesStore, HostPage, SiteConfig};

/// Tunables for one [`OfferDeck`]
#[derive(Debug, Clone)]
pub struct DeckSettings {
    pub site: SiteConfig,
    pub pagination: PaginationConfig,
    pub page_size: usize,
    pub settle_quiet: Duration,
    pub settle_ceiling: Duration,
}

impl Default for DeckSettings {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            pagination: PaginationConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            settle_quiet: Duration::from_millis(150),
            settle_ceiling: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSummary {
    pub sort: String,
    pub pagination: PaginationReport,
    pub tiles: usize,
    /// Merchant keys in display order.
    pub order: Vec<String>,
    pub table: Option<TablePage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSummary {
    pub mode: ViewMode,
    pub table: Option<TablePage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoritesSummary {
    pub enabled: bool,
    pub filter_active: bool,
    pub favorites: usize,
    pub toggles: usize,
    pub filter: FilterSummary,
    pub table: Option<TablePage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleSummary {
    pub merchant_key: String,
    pub is_favorite: bool,
    pub favorites: FavoritesSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickSummary {
    pub row: usize,
    pub merchant_key: String,
    pub activation: Activation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub settled: Settled,
    pub tiles: usize,
    pub table: Option<TablePage>,
}

struct Pipeline<P> {
    host: P,
    extractor: TileExtractor,
    reconciler: PresentationReconciler,
    sort: Option<SortSpec>,
}

fn all_records<P: HostPage>(host: &P, extractor: &mut TileExtractor) -> Vec<Tile> {
    let doc = host.document();
    let nodes = extractor.locate(doc);
    extractor.extract_all(doc, &nodes)
}

#[derive(Debug, Default)]
struct InFlight {
    pagination: AtomicBool,
    sort: AtomicBool,
    view: AtomicBool,
}

/// Holds one in-flight flag for as long as it lives.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn busy<T>(kind: &str) -> CommandOutcome<T> {
    debug!("A {} request is already in progress", kind);
    CommandOutcome::AlreadyInProgress
}

fn conclude<T>(command: &str, result: Result<T, DeckError>) -> CommandOutcome<T> {
    match result {
        Ok(data) => CommandOutcome::done(data),
        Err(err) if err.is_teardown() => {
            debug!("{} aborted, host context went away", command);
            CommandOutcome::Aborted
        }
        Err(err) => {
            warn!("{} failed: {}", command, err);
            CommandOutcome::failed(err.to_string())
        }
    }
}

pub struct OfferDeck<P, S> {
    pipeline: Arc<Mutex<Pipeline<P>>>,
    store: Arc<S>,
    pagination: Arc<PaginationConfig>,
    settle_quiet: Duration,
    settle_ceiling: Duration,
    favorites: FavoritesOverlay,
    progress: Arc<watch::Sender<Progress>>,
    in_flight: Arc<InFlight>,
}

impl<P, S> Clone for OfferDeck<P, S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            store: Arc::clone(&self.store),
            pagination: Arc::clone(&self.pagination),
            settle_quiet: self.settle_quiet,
            settle_ceiling: self.settle_ceiling,
            favorites: self.favorites,
            progress: Arc::clone(&self.progress),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<P: HostPage, S: FavoritesStore> OfferDeck<P, S> {
    pub fn new(host: P, store: S, settings: DeckSettings) -> Result<Self> {
        let extractor = TileExtractor::new(settings.site)?;
        let reconciler =
            PresentationReconciler::new(settings.page_size).with_settle(settings.settle_quiet, settings.settle_ceiling);
        let (progress, _) = watch::channel(Progress::Idle);

        Ok(Self {
            pipeline: Arc::new(Mutex::new(Pipeline {
                host,
                extractor,
                reconciler,
                sort: None,
            })),
            store: Arc::new(store),
            pagination: Arc::new(settings.pagination),
            settle_quiet: settings.settle_quiet,
            settle_ceiling: settings.settle_ceiling,
            favorites: FavoritesOverlay,
            progress: Arc::new(progress),
            in_flight: Arc::new(InFlight::default()),
        })
    }

    pub fn progress(&self) -> Progress {
        self.progress.borrow().clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub async fn render_html(&self) -> String {
        self.pipeline.lock().await.host.document().to_html()
    }

    pub async fn view_mode(&self) -> ViewMode {
        self.pipeline.lock().await.reconciler.mode()
    }

    /// Run `f` against the host page.
    pub async fn with_host<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        f(&self.pipeline.lock().await.host)
    }

    /// Run `f` against the host page with write access, as the host itself would.
    pub async fn with_host_mut<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut self.pipeline.lock().await.host)
    }

    async fn paginate(&self, pipeline: &mut Pipeline<P>) -> Result<PaginationReport, HostError> {
        let Pipeline { host, extractor, .. } = pipeline;
        PaginationEngine::new(&self.pagination, extractor.site())
            .with_progress(&self.progress)
            .run(host)
            .await
    }

    /// Load every tile the host will give us.
    pub async fn complete_pagination(&self) -> CommandOutcome<PaginationReport> {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight.pagination) else {
            return busy("pagination");
        };

        let mut pipeline = self.pipeline.lock().await;
        let result = self.paginate(&mut pipeline).await.map_err(DeckError::from);
        match &result {
            Ok(report) => self.progress.send_replace(Progress::Finished {
                tiles: report.tiles_after,
                pages_loaded: report.pages_loaded,
            }),
            Err(_) => self.progress.send_replace(Progress::Idle),
        };
        conclude("complete_pagination", result)
    }

    /// Load everything, sort it by `criteria`/`order` and show it that way.
    pub async fn apply_sort(&self, criteria: &str, order: &str) -> CommandOutcome<SortSummary> {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight.sort) else {
            return busy("sort");
        };
        let spec = SortSpec::parse_lossy(criteria, order);
        info!("Sorting offers by {}", spec);

        let mut pipeline = self.pipeline.lock().await;
        let outcome = conclude("apply_sort", self.sort_pass(&mut pipeline, spec).await);
        if !outcome.is_success() {
            self.progress.send_replace(Progress::Idle);
        }
        outcome
    }

    async fn sort_pass(&self, pipeline: &mut Pipeline<P>, spec: SortSpec) -> Result<SortSummary, DeckError> {
        let report = self.paginate(pipeline).await?;

        let records = all_records(&pipeline.host, &mut pipeline.extractor);
        if records.is_empty() {
            return Err(PresentationError::NoTiles.into());
        }
        self.progress.send_replace(Progress::Sorting { tiles: records.len() });
        let sorted = sort::sort_tiles(&records, &spec);
        pipeline.sort = Some(spec);

        self.progress.send_replace(Progress::Presenting);
        let table = self.present(pipeline, &sorted).await?;

        info!("Sorted {} offers by {}", sorted.len(), spec);
        self.progress.send_replace(Progress::Finished {
            tiles: sorted.len(),
            pages_loaded: report.pages_loaded,
        });

        Ok(SortSummary {
            sort: spec.to_string(),
            pagination: report,
            tiles: sorted.len(),
            order: sorted.iter().map(|t| t.merchant_key.clone()).collect(),
            table,
        })
    }

    /// Apply the grid order (when a sort was requested), then bring favorites
    /// and the table view in line with the page.
    async fn present(&self, pipeline: &mut Pipeline<P>, tiles: &[Tile]) -> Result<Option<TablePage>, DeckError> {
        let Pipeline {
            host,
            extractor,
            reconciler,
            sort,
        } = pipeline;
        let doc = host.document_mut();

        if sort.is_some() {
            reconciler.apply_grid_order(doc, tiles);
        }
        self.sync_favorites(doc, reconciler, tiles).await?;

        if reconciler.mode() == ViewMode::Table {
            Ok(Some(reconciler.refresh(doc, extractor)?))
        } else {
            Ok(None)
        }
    }

    async fn sync_favorites(
        &self,
        doc: &mut Document,
        reconciler: &mut PresentationReconciler,
        tiles: &[Tile],
    ) -> Result<(FavoritesSnapshot, usize, FilterSummary), StoreError> {
        let snapshot = self.store.snapshot().await?;
        let filter = self.favorites.apply_filter(doc, reconciler.overlay_mut(), tiles, &snapshot);
        let toggles = self.favorites.sync(doc, tiles, &snapshot);
        Ok((snapshot, toggles, filter))
    }

    /// Switch between the host grid and the table view.
    pub async fn set_view_mode(&self, mode: ViewMode) -> CommandOutcome<ViewSummary> {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight.view) else {
            return busy("view transition");
        };

        let mut pipeline = self.pipeline.lock().await;
        let result = self.transition(&mut pipeline, mode).await;
        conclude("set_view_mode", result)
    }

    async fn transition(&self, pipeline: &mut Pipeline<P>, mode: ViewMode) -> Result<ViewSummary, DeckError> {
        let Pipeline {
            host,
            extractor,
            reconciler,
            ..
        } = pipeline;

        let table = match mode {
            ViewMode::Table => {
                reconciler.show_table(host, extractor).await?;
                let tiles = all_records(host, extractor);
                self.sync_favorites(host.document_mut(), reconciler, &tiles).await?;
                // Filter changes made while the table was hidden show up here.
                Some(reconciler.refresh(host.document_mut(), extractor)?)
            }
            ViewMode::Grid => {
                reconciler.show_grid(host.document_mut())?;
                None
            }
        };

        info!("View mode is now {:?}", reconciler.mode());
        Ok(ViewSummary {
            mode: reconciler.mode(),
            table,
        })
    }

    pub async fn turn_table_page(&self, index: usize) -> CommandOutcome<TablePage> {
        self.page_turn("turn_table_page", |reconciler, doc| reconciler.go_to_page(doc, index))
            .await
    }

    pub async fn next_table_page(&self) -> CommandOutcome<TablePage> {
        self.page_turn("next_table_page", |reconciler, doc| reconciler.next_page(doc))
            .await
    }

    pub async fn previous_table_page(&self) -> CommandOutcome<TablePage> {
        self.page_turn("previous_table_page", |reconciler, doc| reconciler.previous_page(doc))
            .await
    }

    async fn page_turn(
        &self,
        command: &str,
        turn: impl FnOnce(&mut PresentationReconciler, &mut Document) -> Result<TablePage, PresentationError>,
    ) -> CommandOutcome<TablePage> {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight.view) else {
            return busy("view transition");
        };

        let mut pipeline = self.pipeline.lock().await;
        let Pipeline { host, reconciler, .. } = &mut *pipeline;
        conclude(command, turn(reconciler, host.document_mut()).map_err(DeckError::from))
    }

    /// Click table row `position` of the current page the way a user would.
    pub async fn click_row(&self, position: usize) -> CommandOutcome<ClickSummary> {
        let mut pipeline = self.pipeline.lock().await;
        let Pipeline {
            host,
            extractor,
            reconciler,
            ..
        } = &mut *pipeline;

        let result = async {
            let target = reconciler.row_target(host.document(), position)?;
            let merchant_key = extractor.extract(host.document(), target).merchant_key;
            let activation = activation::activate(host, target).await?;
            info!("Row {} ({}) activated via {:?}", position, merchant_key, activation);
            Ok::<_, DeckError>(ClickSummary {
                row: position,
                merchant_key,
                activation,
            })
        }
        .await;
        conclude("click_row", result)
    }

    async fn set_favorites_flag(
        &self,
        command: &str,
        enabled: Option<bool>,
        filter: Option<bool>,
    ) -> CommandOutcome<FavoritesSummary> {
        let result = async {
            if let Some(enabled) = enabled {
                self.store.set_enabled(enabled).await?;
            }
            if let Some(active) = filter {
                self.store.set_filter_active(active).await?;
            }
            let mut pipeline = self.pipeline.lock().await;
            self.refresh_favorites(&mut pipeline).await
        }
        .await;
        conclude(command, result)
    }

    pub async fn enable_favorites(&self) -> CommandOutcome<FavoritesSummary> {
        self.set_favorites_flag("enable_favorites", Some(true), None).await
    }

    pub async fn disable_favorites(&self) -> CommandOutcome<FavoritesSummary> {
        self.set_favorites_flag("disable_favorites", Some(false), None).await
    }

    /// Show only favorite merchants, or everything again.
    pub async fn apply_favorites_filter(&self, only_favorites: bool) -> CommandOutcome<FavoritesSummary> {
        self.set_favorites_flag("apply_favorites_filter", None, Some(only_favorites))
            .await
    }

    /// Add or remove the merchant behind `merchant_key` from the favorites.
    pub async fn toggle_favorite(&self, merchant_key: &str) -> CommandOutcome<ToggleSummary> {
        let mut guard = self.pipeline.lock().await;
        let pipeline = &mut *guard;
        let result = async {
            let tile = all_records(&pipeline.host, &mut pipeline.extractor)
                .into_iter()
                .find(|t| !t.is_degraded() && t.merchant_key == merchant_key)
                .ok_or_else(|| DeckError::UnknownMerchant(merchant_key.to_string()))?;

            let is_favorite = self.store.toggle(FavoriteEntry::from_tile(&tile)).await?;
            info!("{} is {} a favorite", tile.display_name, if is_favorite { "now" } else { "no longer" });

            Ok::<_, DeckError>(ToggleSummary {
                merchant_key: tile.merchant_key,
                is_favorite,
                favorites: self.refresh_favorites(pipeline).await?,
            })
        }
        .await;
        conclude("toggle_favorite", result)
    }

    async fn refresh_favorites(&self, pipeline: &mut Pipeline<P>) -> Result<FavoritesSummary, DeckError> {
        let Pipeline {
            host,
            extractor,
            reconciler,
            ..
        } = pipeline;

        let tiles = all_records(host, extractor);
        let doc = host.document_mut();
        let (snapshot, toggles, filter) = self.sync_favorites(doc, reconciler, &tiles).await?;
        let table = match reconciler.mode() {
            ViewMode::Table => Some(reconciler.refresh(doc, extractor)?),
            ViewMode::Grid => None,
        };

        Ok(FavoritesSummary {
            enabled: snapshot.enabled,
            filter_active: snapshot.filter_active,
            favorites: snapshot.favorites.len(),
            toggles,
            filter,
            table,
        })
    }

    /// Fold host-driven changes (tiles added outside a pagination pass) into
    /// the current order, favorites and table page, once the page is quiet.
    pub async fn reconcile_mutations(&self) -> CommandOutcome<ReconcileSummary> {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight.sort) else {
            return busy("sort");
        };

        let mut guard = self.pipeline.lock().await;
        let pipeline = &mut *guard;
        let result = async {
            let settled = settle::wait_for_quiet(&mut pipeline.host, self.settle_quiet, self.settle_ceiling).await?;

            let records = all_records(&pipeline.host, &mut pipeline.extractor);
            let ordered = match pipeline.sort {
                Some(spec) => sort::sort_tiles(&records, &spec),
                None => records,
            };
            let table = self.present(pipeline, &ordered).await?;
            debug!("Reconciled {} tiles after host mutations ({:?})", ordered.len(), settled);

            Ok::<_, DeckError>(ReconcileSummary {
                settled,
                tiles: ordered.len(),
                table,
            })
        }
        .await;
        conclude("reconcile_mutations", result)
    }
}
