//! Waiting for the host to stop mutating the page.
//!
//! Host-driven mutations arrive in bursts. Rather than reconciling after each
//! one, callers wait until the document has been quiet for a while and then
//! reconcile once.

use serde::Serialize;
use tokio::time::{Duration, Instant, sleep};

use crate::error::HostError;
use crate::traits::HostPage;

const TICK: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Settled {
    /// No mutation for the whole quiet window.
    Quiet,
    /// The ceiling was reached while the page was still changing.
    Ceiling,
}

/// Wait until no mutation has happened for `quiet`, or until `ceiling` has passed.
pub async fn wait_for_quiet<P: HostPage + ?Sized>(
    host: &mut P,
    quiet: Duration,
    ceiling: Duration,
) -> Result<Settled, HostError> {
    let started = Instant::now();
    host.run_pending()?;
    let mut last_seq = host.document().mutation_seq();
    let mut last_change = Instant::now();

    loop {
        if last_change.elapsed() >= quiet {
            return Ok(Settled::Quiet);
        }
        if started.elapsed() >= ceiling {
            return Ok(Settled::Ceiling);
        }

        sleep(TICK.min(quiet)).await;
        host.run_pending()?;

        let seq = host.document().mutation_seq();
        if seq != last_seq {
            last_seq = seq;
            last_change = Instant::now();
        }
    }
}
