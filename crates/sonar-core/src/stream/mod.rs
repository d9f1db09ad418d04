//! Generation stream decoding and session management

mod decoder;
mod frame;
mod session;

pub use decoder::FrameDecoder;
pub use frame::{Frame, FrameKind};
pub use session::{StreamEvent, StreamObserver, StreamSession};
