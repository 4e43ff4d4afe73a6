use crate::ids::ConnectionId;

/// A required input field was missing or malformed.
///
/// Every entry point validates its event into a typed request at the boundary
/// and reports any problem with this one kind. Validation failures are never
/// retried.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid input `{field}`: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    pub fn missing(field: &'static str) -> Self {
        Self::new(field, "missing required field")
    }

    pub fn empty(field: &'static str) -> Self {
        Self::new(field, "must not be empty")
    }
}

/// Failure to push a message to a connection.
///
/// These are expected at the edges: a connection can close between the
/// registry lookup and the push.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection is not (or no longer) known to the transport.
    #[error("connection {0} is gone")]
    Gone(ConnectionId),

    /// The connection's outbound queue is full.
    #[error("send queue full for connection {0}")]
    Backpressure(ConnectionId),

    /// The connection exists but its writer has shut down.
    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether the target connection should be considered dead.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone(_) | Self::Closed(_))
    }

    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Gone(_) => "gone",
            Self::Backpressure(_) => "backpressure",
            Self::Closed(_) => "closed",
            Self::Other(_) => "other",
        }
    }
}
