//! A host page replayed from HTML snapshots.
//!
//! The first snapshot is the page as it was captured; every later batch is
//! the markup the host appends when its "load more" control is activated.
//! Timing runs on the tokio clock, so paused-clock tests are deterministic.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::dom::{Document, NodeId, ScrollPosition};
use crate::error::HostError;
use crate::extract::locate_tiles;
use crate::pagination::find_load_more;
use crate::traits::{HostPage, PointerEvent, SiteConfig, TileKind};

/// How the simulated host reacts to the pipeline
#[derive(Debug, Clone)]
pub struct HostBehavior {
    /// Controls expose a framework-internal click handler.
    pub internal_handlers: bool,
    /// Delay between activation and the new tiles appearing.
    pub latency: Duration,
    /// Leave the load-more control in place after the last batch.
    pub keep_control_when_exhausted: bool,
    /// Replay the batches forever.
    pub endless: bool,
    /// Briefly remove the load-more control while a batch renders.
    pub rerender_gap: Option<Duration>,
}

impl Default for HostBehavior {
    fn default() -> Self {
        Self {
            internal_handlers: true,
            latency: Duration::from_millis(100),
            keep_control_when_exhausted: false,
            endless: false,
            rerender_gap: None,
        }
    }
}

struct PendingBatch {
    ready_at: Instant,
    html: String,
}

pub struct SnapshotHost {
    doc: Document,
    site: SiteConfig,
    behavior: HostBehavior,
    grid: NodeId,
    all_batches: Vec<String>,
    queue: VecDeque<String>,
    pending: Option<PendingBatch>,
    parked_control: Option<(NodeId, NodeId, Instant)>,
    torn_down: bool,
    internal_activations: usize,
    synthetic_clicks: usize,
    opened: Vec<NodeId>,
}

impl SnapshotHost {
    pub fn new(doc: Document, batches: Vec<String>, behavior: HostBehavior) -> Self {
        Self::with_site(doc, batches, behavior, SiteConfig::default())
    }

    pub fn with_site(doc: Document, batches: Vec<String>, behavior: HostBehavior, site: SiteConfig) -> Self {
        let grid = locate_tiles(&doc, &site)
            .first()
            .and_then(|&tile| doc.parent(tile))
            .or_else(|| doc.body())
            .unwrap_or_else(|| doc.root());

        Self {
            doc,
            site,
            behavior,
            grid,
            queue: batches.iter().cloned().collect(),
            all_batches: batches,
            pending: None,
            parked_control: None,
            torn_down: false,
            internal_activations: 0,
            synthetic_clicks: 0,
            opened: Vec::new(),
        }
    }

    /// Make every further host call fail as if the runtime went away.
    pub fn tear_down(&mut self) {
        self.torn_down = true;
    }

    pub fn internal_activations(&self) -> usize {
        self.internal_activations
    }

    pub fn synthetic_clicks(&self) -> usize {
        self.synthetic_clicks
    }

    /// Tiles whose native click behaviour fired, in order.
    pub fn opened_offers(&self) -> &[NodeId] {
        &self.opened
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    fn check_alive(&self) -> Result<(), HostError> {
        if self.torn_down {
            Err(HostError::ContextInvalidated)
        } else {
            Ok(())
        }
    }

    fn tile_of(&self, node: NodeId) -> Option<NodeId> {
        std::iter::once(node)
            .chain(self.doc.ancestors(node))
            .find(|&n| self.site.kind_of(&self.doc, n) == TileKind::Offer)
    }

    fn is_load_more(&self, node: NodeId) -> bool {
        find_load_more(&self.doc, &self.site) == Some(node)
    }

    /// The host's own reaction to a click on `node`.
    fn handle_click(&mut self, node: NodeId) -> bool {
        if self.is_load_more(node) {
            self.request_batch();
            return true;
        }
        if let Some(tile) = self.tile_of(node) {
            debug!("Host opened offer tile {:?}", tile);
            self.opened.push(tile);
            return true;
        }
        false
    }

    fn request_batch(&mut self) {
        // Host re-renders jump to the top of the page
        self.doc.set_scroll_position(ScrollPosition::default());

        if self.pending.is_some() {
            return;
        }
        if self.queue.is_empty() && self.behavior.endless {
            self.queue.extend(self.all_batches.iter().cloned());
        }
        if let Some(html) = self.queue.pop_front() {
            self.pending = Some(PendingBatch {
                ready_at: Instant::now() + self.behavior.latency,
                html,
            });
        }
    }

    fn apply_batch(&mut self, html: &str) {
        let added = self.doc.append_html(self.grid, html);
        self.doc.set_scroll_position(ScrollPosition::default());
        debug!("Host appended {} nodes", added.len());

        let exhausted = self.queue.is_empty() && !self.behavior.endless;
        let Some(control) = find_load_more(&self.doc, &self.site) else {
            return;
        };

        if exhausted && !self.behavior.keep_control_when_exhausted {
            self.doc.detach(control);
        } else if let Some(gap) = self.behavior.rerender_gap
            && let Some(parent) = self.doc.parent(control)
        {
            self.doc.detach(control);
            self.parked_control = Some((control, parent, Instant::now() + gap));
        }
    }
}

#[async_trait]
impl HostPage for SnapshotHost {
    fn document(&self) -> &Document {
        &self.doc
    }

    fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    fn run_pending(&mut self) -> Result<usize, HostError> {
        self.check_alive()?;
        let now = Instant::now();
        let mut applied = 0;

        if self.pending.as_ref().is_some_and(|batch| batch.ready_at <= now)
            && let Some(batch) = self.pending.take()
        {
            self.apply_batch(&batch.html);
            applied += 1;
        }

        if let Some((control, parent, at)) = self.parked_control
            && at <= now
        {
            self.doc.append_child(parent, control);
            self.parked_control = None;
            applied += 1;
        }

        Ok(applied)
    }

    async fn invoke_internal_handler(&mut self, node: NodeId) -> Result<bool, HostError> {
        self.check_alive()?;
        if !self.behavior.internal_handlers {
            return Ok(false);
        }
        let handled = self.handle_click(node);
        if handled {
            self.internal_activations += 1;
        }
        Ok(handled)
    }

    async fn dispatch_event(&mut self, node: NodeId, event: PointerEvent) -> Result<(), HostError> {
        self.check_alive()?;
        if !self.doc.is_connected(node) {
            return Err(HostError::Detached);
        }
        if event == PointerEvent::Click && self.handle_click(node) {
            self.synthetic_clicks += 1;
        }
        Ok(())
    }
}
