//! Sonar core engine
//!
//! Tracks long-running, externally-driven operations for marketplace
//! clients: token streams delivered over chunked HTTP, and payment orders
//! whose completion is only learnable by polling. Consumers observe either
//! kind as ordered callbacks ending in exactly one terminal outcome.

pub mod config;
pub mod error;
pub mod poll;
pub mod recharge;
pub mod status;
pub mod stream;

pub use config::{PollConfig, StreamConfig};
pub use error::PollError;
pub use poll::{source_fn, PollHandle, PollObserver, StatusPoller, StatusSource};
pub use recharge::{PayMethod, RechargeController, RechargeError, RechargeStep};
pub use status::{OperationId, OperationState, StatusReport};
pub use stream::{Frame, FrameDecoder, FrameKind, StreamEvent, StreamObserver, StreamSession};
