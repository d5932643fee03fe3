//! Image capture over the pendant link: frame decoding, reassembly, and
//! JPEG validation.
//!
//! The device announces a capture with an `IMG:<size>:<width>:<height>`
//! header, streams raw JPEG bytes in size-limited frames, and usually
//! closes with `END`. The engine reassembles the stream into a validated
//! [`CapturedImage`], surviving missing `END` frames and lost markers.

mod engine;
mod frame;
mod jpeg;
mod reassembly;
mod repair;
mod session;

pub use engine::{CaptureEngine, CaptureHandle, FINALIZE_GRACE};
pub use frame::{CMD_SNAP, ControlFrame, END_TOKEN, IMG_HEADER_PREFIX};
pub use jpeg::{JpegError, JpegInfo, parse_info};
pub use reassembly::{
    CaptureEvent, CapturedImage, FrameOutcome, Reassembler, TIMER_ARM_PROGRESS,
    TIMER_FORCE_PROGRESS,
};
pub use repair::{JPEG_EOI, JPEG_SOI, repair_jpeg};
pub use session::{SessionState, TransferSession};

/// Errors produced by the capture crate.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The reassembled buffer is not a valid image, even after marker
    /// repair. Terminal for the capture; the session is closed with no
    /// image and no retry.
    #[error("image decode failed after repair: {0}")]
    DecodeFailure(JpegError),
}
