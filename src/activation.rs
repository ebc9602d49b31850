//! Activating host-owned controls.
//!
//! Host widgets are often wired through the host framework's own event
//! system rather than plain DOM listeners, so activation tries the framework's
//! internal handler first and falls back to a full synthetic pointer sequence.

use serde::Serialize;
use tracing::debug;

use crate::dom::NodeId;
use crate::error::HostError;
use crate::traits::{HostPage, PointerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Activation {
    InternalHandler,
    SyntheticPointerSequence,
}

/// Activation strategies, in the order they are tried.
pub const ACTIVATION_CHAIN: [Activation; 2] =
    [Activation::InternalHandler, Activation::SyntheticPointerSequence];

async fn try_strategy<P: HostPage + ?Sized>(
    host: &mut P,
    node: NodeId,
    strategy: Activation,
) -> Result<bool, HostError> {
    match strategy {
        Activation::InternalHandler => host.invoke_internal_handler(node).await,
        Activation::SyntheticPointerSequence => {
            for event in PointerEvent::CLICK_SEQUENCE {
                host.dispatch_event(node, event).await?;
            }
            Ok(true)
        }
    }
}

/// Activate `node` with the first strategy that handles it.
pub async fn activate<P: HostPage + ?Sized>(host: &mut P, node: NodeId) -> Result<Activation, HostError> {
    if !host.document().is_connected(node) {
        return Err(HostError::Detached);
    }

    for strategy in ACTIVATION_CHAIN {
        if try_strategy(host, node, strategy).await? {
            debug!("Activated {:?} via {:?}", node, strategy);
            return Ok(strategy);
        }
    }

    Err(HostError::Other(format!("no activation strategy handled {node:?}")))
}
