//! Transport-link seam for the capture pendant.
//!
//! The capture core only needs two things from the wireless stack: a
//! fire-and-forget text command channel towards the device and a stream of
//! inbound raw frames. Both are modeled here so the decoder never talks to
//! a radio directly: a real BLE backend plugs in behind [`FrameLink`],
//! and tests drive the in-memory [`ChannelLink`].

mod channel;

pub use channel::{ChannelLink, DeviceEnd};

/// Inbound frame capacity before the device side sees backpressure.
pub const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Errors produced by the link crate.
///
/// Link failures are best-effort territory: callers are expected to log
/// them and move on, never to abort an upload over a dropped command.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("link not connected")]
    NotConnected,

    #[error("command channel full")]
    Backpressure,
}

/// Command side of a short-range wireless link.
///
/// Implementations must be cheap to share; the capture engine holds one
/// behind an `Arc` and writes at most a few bytes per capture.
pub trait FrameLink: Send + Sync {
    /// Returns `true` while the peer is reachable.
    fn is_connected(&self) -> bool;

    /// Writes a plain-text command to the link without waiting for
    /// delivery confirmation.
    fn send_text(&self, text: &str) -> Result<(), LinkError>;
}
