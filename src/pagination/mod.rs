//! # Pagination completion
//!
//! Drives the host's "load more" control until every tile has been loaded.
//! One [`PaginationEngine::run`] call is one pass:
//!
//! ```text
//! Idle -> Probing -> (Triggering <-> Waiting) -> Done
//! ```
//!
//! The wait after each activation adapts to the host (see [`PaginationState`]).
//! A pass ends when the control disappears, when too many consecutive
//! attempts bring no new tiles, or at the attempt ceiling, so it always
//! finishes in bounded time. Tiles already present are only ever counted.

mod state;

pub use state::{Observation, PaginationConfig, PaginationState};

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Duration, Instant, sleep};
use tracing::{debug, info};

use crate::activation;
use crate::dom::{Document, NodeId};
use crate::error::HostError;
use crate::extract::locate_tiles;
use crate::models::Progress;
use crate::traits::{HostPage, SiteConfig};

/// Why a pagination pass stopped. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Termination {
    /// No load-more control on the first probe.
    NothingToPaginate,
    /// The control went away: everything is loaded.
    ControlGone,
    /// Too many consecutive attempts produced no new tiles.
    Stagnated,
    AttemptCeiling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationReport {
    pub pages_loaded: u32,
    pub attempts: u32,
    pub tiles_before: usize,
    pub tiles_after: usize,
    pub termination: Termination,
    pub fully_loaded: bool,
}

/// The host's "load more" control: an enabled button-like element whose
/// visible text is the configured phrase.
pub fn find_load_more(doc: &Document, site: &SiteConfig) -> Option<NodeId> {
    let wanted = normalize_ws(&site.load_more_text);

    doc.descendants(doc.root()).into_iter().find(|&node| {
        let button_like = matches!(doc.tag(node), Some("button" | "a")) || doc.attr(node, "role") == Some("button");
        let disabled = doc.has_attr(node, "disabled") || doc.attr(node, "aria-disabled") == Some("true");

        button_like && !disabled && normalize_ws(&doc.text_content(node)).eq_ignore_ascii_case(&wanted)
    })
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct PaginationEngine<'a> {
    config: &'a PaginationConfig,
    site: &'a SiteConfig,
    progress: Option<&'a watch::Sender<Progress>>,
}

impl<'a> PaginationEngine<'a> {
    pub fn new(config: &'a PaginationConfig, site: &'a SiteConfig) -> Self {
        Self {
            config,
            site,
            progress: None,
        }
    }

    /// Publish progress on `sender` while running.
    pub fn with_progress(mut self, sender: &'a watch::Sender<Progress>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn count<P: HostPage + ?Sized>(&self, host: &P) -> usize {
        locate_tiles(host.document(), self.site).len()
    }

    fn publish(&self, state: &PaginationState, attempts: u32, tiles: usize) {
        if let Some(sender) = self.progress {
            sender.send_replace(Progress::Paginating {
                pages_loaded: state.pages_loaded,
                attempts,
                tiles,
            });
        }
    }

    /// Run one pass to completion.
    pub async fn run<P: HostPage + ?Sized>(&self, host: &mut P) -> Result<PaginationReport, HostError> {
        host.run_pending()?;
        let tiles_before = self.count(host);
        let mut state = PaginationState::new(self.config);
        let mut attempts = 0;

        let Some(mut control) = find_load_more(host.document(), self.site) else {
            info!("No load-more control on {}, nothing to paginate", self.site.name);
            state.fully_loaded = true;
            return Ok(self.report(&state, attempts, tiles_before, tiles_before, Termination::NothingToPaginate));
        };

        info!("Loading all offers on {} ({} tiles so far)", self.site.name, tiles_before);
        self.publish(&state, attempts, tiles_before);

        let termination = loop {
            if attempts >= self.config.max_attempts {
                break Termination::AttemptCeiling;
            }
            attempts += 1;

            let before = self.count(host);
            let scroll = host.document().scroll_position();
            activation::activate(host, control).await?;
            host.document_mut().set_scroll_position(scroll);

            let (after, round_trip) = self.wait_for_growth(host, before, state.current_delay).await?;
            host.document_mut().set_scroll_position(scroll);

            state = state.observe(
                Observation {
                    tiles_before: before,
                    tiles_after: after,
                    round_trip,
                },
                self.config,
            );
            debug!(
                "Attempt {}: {} -> {} tiles in {:?}, next delay {:?}, {} consecutive failures",
                attempts, before, after, round_trip, state.current_delay, state.consecutive_failures
            );
            self.publish(&state, attempts, after);

            if state.consecutive_failures >= self.config.failure_cap {
                break Termination::Stagnated;
            }

            match self.probe(host).await? {
                Some(next) => control = next,
                None => break Termination::ControlGone,
            }
        };

        state.fully_loaded = termination == Termination::ControlGone;
        let tiles_after = self.count(host);
        info!(
            "Pagination on {} finished ({:?}): {} pages, {} -> {} tiles",
            self.site.name, termination, state.pages_loaded, tiles_before, tiles_after
        );

        Ok(self.report(&state, attempts, tiles_before, tiles_after, termination))
    }

    /// Poll the tile count until it grows or `delay` runs out.
    async fn wait_for_growth<P: HostPage + ?Sized>(
        &self,
        host: &mut P,
        before: usize,
        delay: Duration,
    ) -> Result<(usize, Duration), HostError> {
        let started = Instant::now();

        loop {
            let elapsed = started.elapsed();
            if elapsed >= delay {
                return Ok((self.count(host), elapsed));
            }

            sleep(self.config.poll_interval.min(delay - elapsed)).await;
            host.run_pending()?;

            let now = self.count(host);
            if now > before {
                return Ok((now, started.elapsed()));
            }
        }
    }

    /// Look for the control, re-checking a few times to ride out re-renders.
    async fn probe<P: HostPage + ?Sized>(&self, host: &mut P) -> Result<Option<NodeId>, HostError> {
        for check in 0..=self.config.control_rechecks {
            host.run_pending()?;
            if let Some(control) = find_load_more(host.document(), self.site) {
                return Ok(Some(control));
            }
            if check < self.config.control_rechecks {
                sleep(self.config.recheck_interval).await;
            }
        }
        Ok(None)
    }

    fn report(
        &self,
        state: &PaginationState,
        attempts: u32,
        tiles_before: usize,
        tiles_after: usize,
        termination: Termination,
    ) -> PaginationReport {
        PaginationReport {
            pages_loaded: state.pages_loaded,
            attempts,
            tiles_before,
            tiles_after,
            termination,
            fully_loaded: state.fully_loaded,
        }
    }
}
