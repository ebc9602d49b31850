//! Typed failures crossing component boundaries.
//!
//! `Display` output is the short, user-facing message; the orchestrator hands
//! it to the control surface unchanged.

/// Signature the host runtime uses when the surrounding context disappears.
pub const TEARDOWN_SIGNATURE: &str = "context invalidated";

/// Failure reported by the host page boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The runtime hosting the pipeline was torn down.
    #[error("Extension context invalidated.")]
    ContextInvalidated,

    /// The target node is not part of the page any more.
    #[error("element is no longer attached to the page")]
    Detached,

    /// Any other host-side failure.
    #[error("{0}")]
    Other(String),
}

impl HostError {
    /// `true` when the error means there is no longer anyone to report to.
    pub fn is_teardown(&self) -> bool {
        match self {
            Self::ContextInvalidated => true,
            Self::Other(message) => message.to_ascii_lowercase().contains(TEARDOWN_SIGNATURE),
            Self::Detached => false,
        }
    }
}

/// Failure of a presentation entry point. No DOM mutation has been made when
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresentationError {
    #[error("No offer tiles found on the page")]
    NoTiles,

    #[error("Could not locate the offer grid on the page")]
    ContainerMissing,

    #[error("Table view is not active")]
    TableInactive,

    #[error("Table row {0} is not on the current page")]
    RowOutOfRange(usize),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Failure of the favorites persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("favorites storage unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Host(#[from] HostError),
}

impl StoreError {
    pub fn is_teardown(&self) -> bool {
        match self {
            Self::Host(err) => err.is_teardown(),
            Self::Unavailable(message) => message.to_ascii_lowercase().contains(TEARDOWN_SIGNATURE),
        }
    }
}

impl PresentationError {
    pub fn is_teardown(&self) -> bool {
        matches!(self, Self::Host(err) if err.is_teardown())
    }
}

/// Failure of an orchestrated command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeckError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Presentation(#[from] PresentationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No offer from {0} on the page")]
    UnknownMerchant(String),
}

impl DeckError {
    pub fn is_teardown(&self) -> bool {
        match self {
            Self::Host(err) => err.is_teardown(),
            Self::Presentation(err) => err.is_teardown(),
            Self::Store(err) => err.is_teardown(),
            Self::UnknownMerchant(_) => false,
        }
    }
}
