//! Typed errors for the recoverable external surfaces.

use std::time::Duration;
use thiserror::Error;

/// A source store could not be polled. Always recoverable: the monitor
/// logs it and tries again next tick; it never terminates the loop.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The store file is missing, locked, or the connection failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered but the query or row decoding failed.
    #[error("store query failed: {0}")]
    Query(String),
}

/// An outbound send did not go through. The event stays unmarked in the
/// ledger so it is retried while it remains within the recency window.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("send command exited with failure: {0}")]
    Command(String),

    #[error("could not launch sender: {0}")]
    Spawn(String),
}
