//! Operation status classification
//!
//! Maps the wire labels reported by the order status endpoint onto the
//! closed state set the poller understands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one tracked operation (a payment order id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Observed state of an asynchronous operation
///
/// States only move forward; the poller drops anything that would read as a
/// regression and stops at the first terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Order/QR code is being generated
    Generating,
    /// Waiting for the payer to act
    Waiting,
    /// QR code scanned, payment not yet confirmed
    Scanned,
    /// Payment confirmed
    Succeeded,
    /// Definitive business failure
    Failed,
    /// Payment window closed without a result
    Expired,
}

impl OperationState {
    /// True for states from which no further transition happens
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Expired)
    }

    /// Progress rank used to reject out-of-order poll responses
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Self::Generating => 0,
            Self::Waiting => 1,
            Self::Scanned => 2,
            Self::Succeeded | Self::Failed | Self::Expired => 3,
        }
    }

    /// Classify a wire status label
    ///
    /// Returns `None` for labels this client does not understand; adapters
    /// surface that as a decode error rather than guessing.
    pub fn from_wire(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "created" | "generating" => Some(Self::Generating),
            "pending" | "waiting" | "unpaid" => Some(Self::Waiting),
            "scanned" => Some(Self::Scanned),
            "paid" | "success" | "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "expired" | "timeout" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Generating => "generating",
            Self::Waiting => "waiting",
            Self::Scanned => "scanned",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Expired => "expired",
        };
        f.write_str(label)
    }
}

/// One status lookup result: the classified state plus the server's detail
/// message (failure reason), when it sent one
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub state: OperationState,
    pub detail: Option<String>,
}

impl StatusReport {
    pub fn new(state: OperationState) -> Self {
        Self {
            state,
            detail: None,
        }
    }

    pub fn with_detail(state: OperationState, detail: impl Into<String>) -> Self {
        Self {
            state,
            detail: Some(detail.into()),
        }
    }
}

impl From<OperationState> for StatusReport {
    fn from(state: OperationState) -> Self {
        Self::new(state)
    }
}
