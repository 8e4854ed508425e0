//! Two-tier error taxonomy: everything that can go wrong on a single wire
//! exchange collapses into [`TransportError`]; the session layer converts
//! those and its own addressing/protocol failures into [`DeviceError`] so
//! callers never interpret transport internals.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Connect or receive exceeded the configured deadline.
    #[error("device did not answer within {0:?}")]
    Timeout(std::time::Duration),

    /// Address resolution, connect, send, or receive failure.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream response was shorter than its own length framing.
    #[error("response truncated ({got} bytes)")]
    ShortResponse { got: usize },

    /// The decoded response was not parseable JSON (oversized responses
    /// truncate at the receive buffer and land here).
    #[error("unparseable response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DeviceError {
    /// The initial system-info query failed; no session exists.
    #[error("strip unreachable: {0}")]
    Unreachable(#[source] TransportError),

    /// No outlet matches the given index or alias.
    #[error("no outlet matching {0}")]
    OutletNotFound(String),

    /// A state token other than "on"/"off".
    #[error("invalid outlet state '{0}' (expected on/off)")]
    InvalidState(String),

    /// A command exchange failed after the session was up.
    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),

    /// The response arrived but carried an error code or an unexpected
    /// shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Arming the failsafe failed twice; the outlet was forced OFF as a
    /// fallback and is confirmed off.
    #[error("failsafe arming failed; outlet forced off")]
    SafetyFallbackTriggered,
}
