//! Error types
//!
//! Only pulling from an upstream can fail from the caller's point of view.
//! Broadcast, attach and detach are infallible.

use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for group operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport error from the upstream connection
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Upstream did not finish connecting in time
    #[error("connect to {url} timed out after {timeout:?}")]
    ConnectTimeout { url: String, timeout: Duration },

    /// Upstream refused or failed the connect/play sequence
    #[error("connect failed: {0}")]
    Connect(String),

    /// Upstream session ended with an error after it was playing
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The group was disposed while the operation was running
    #[error("group disposed")]
    Disposed,
}
