//! Boundary errors for status lookups
//!
//! A failed lookup must stay distinguishable from a legitimate business
//! failure: the poller treats these as transient and keeps the session
//! alive, while a `Failed` report ends it.

use thiserror::Error;

/// Error returned by a [`StatusSource`](crate::poll::StatusSource) lookup
#[derive(Debug, Error)]
pub enum PollError {
    /// Network-level failure reaching the status endpoint
    #[error("status request failed: {0}")]
    Transport(String),

    /// The endpoint answered outside the 2xx range
    #[error("status endpoint returned HTTP {status}")]
    Http { status: u16 },

    /// The response body could not be decoded
    #[error("malformed status response: {0}")]
    Decode(String),

    /// The response carried a status label this client does not know
    #[error("unrecognized status label `{0}`")]
    UnknownStatus(String),
}

impl PollError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}
