//! The peer-level error taxonomy (§7): parse/wire errors and kernel-route
//! errors are fatal for the peer; I/O errors during an active connection are
//! surfaced through the error channel and logged, not propagated, except
//! during the Active-mode dial loop where they trigger the 1-second retry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire codec error: {0}")]
    Wire(#[from] bgp_wire::WireError),

    #[error("kernel route error: {0}")]
    Route(#[from] bgp_route::RouteError),

    #[error("peer was cancelled")]
    Cancelled,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("event queue closed unexpectedly")]
    EventChannelClosed,
}
