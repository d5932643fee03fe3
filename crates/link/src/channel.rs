//! In-memory link backed by tokio channels.
//!
//! [`ChannelLink::pair`] returns the two halves of a simulated wireless
//! connection: the app side (a [`FrameLink`] plus the inbound frame
//! receiver) and a [`DeviceEnd`] standing in for the pendant firmware.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::{FRAME_CHANNEL_CAPACITY, FrameLink, LinkError};

/// App side of an in-memory link.
pub struct ChannelLink {
    cmds_tx: mpsc::Sender<String>,
    frames_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    connected: Arc<AtomicBool>,
}

/// Device side of an in-memory link.
pub struct DeviceEnd {
    cmds_rx: mpsc::Receiver<String>,
    frames_tx: mpsc::Sender<Vec<u8>>,
    connected: Arc<AtomicBool>,
}

impl ChannelLink {
    /// Creates a connected link pair.
    pub fn pair() -> (ChannelLink, DeviceEnd) {
        let (cmds_tx, cmds_rx) = mpsc::channel(16);
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));

        let link = ChannelLink {
            cmds_tx,
            frames_rx: Mutex::new(Some(frames_rx)),
            connected: Arc::clone(&connected),
        };
        let device = DeviceEnd {
            cmds_rx,
            frames_tx,
            connected,
        };
        (link, device)
    }

    /// Takes the inbound frame receiver. Can only be called once.
    pub async fn take_frames(&self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.frames_rx.lock().await.take()
    }
}

impl FrameLink for ChannelLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn send_text(&self, text: &str) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        match self.cmds_tx.try_send(text.to_string()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(LinkError::Backpressure),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(LinkError::NotConnected),
        }
    }
}

impl DeviceEnd {
    /// Delivers a raw frame to the app side.
    ///
    /// Returns `false` if the app side is gone.
    pub async fn send_frame(&self, bytes: Vec<u8>) -> bool {
        self.frames_tx.send(bytes).await.is_ok()
    }

    /// Receives the next command written by the app side.
    pub async fn next_command(&mut self) -> Option<String> {
        self.cmds_rx.recv().await
    }

    /// Simulates the peer going out of range.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
        debug!("channel link marked disconnected");
    }
}
