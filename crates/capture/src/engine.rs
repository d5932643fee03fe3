//! Async capture engine.
//!
//! One tokio task owns the [`Reassembler`] and is the only mutator of the
//! transfer session. Inbound frames and stall-timer ticks are merged into
//! that task's event stream, so the three completion paths can never race
//! from different threads. Commands (snap, abort) go through the same
//! queue via [`CaptureHandle`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use lumen_link::FrameLink;

use crate::frame::CMD_SNAP;
use crate::reassembly::{CaptureEvent, FrameOutcome, Reassembler};

/// Grace period between arming the stall timer and the forced-finalize
/// check.
pub const FINALIZE_GRACE: Duration = Duration::from_secs(2);

const EVENT_CHANNEL_CAPACITY: usize = 64;

enum EngineMsg {
    /// Stall-timer tick for a session generation.
    FinalizeCheck { generation: u64 },
    Snap,
    Abort,
}

/// Cloneable handle for driving the capture engine.
#[derive(Clone)]
pub struct CaptureHandle {
    tx: mpsc::Sender<EngineMsg>,
}

impl CaptureHandle {
    /// Requests a capture: any in-flight transfer is discarded and the
    /// `SNAP` command is written to the link. Link failures are logged
    /// and swallowed; device communication is best-effort.
    pub async fn snap(&self) {
        let _ = self.tx.send(EngineMsg::Snap).await;
    }

    /// Abandons the in-flight transfer, discarding its buffer.
    pub async fn abort(&self) {
        let _ = self.tx.send(EngineMsg::Abort).await;
    }
}

/// The engine task state. Constructed and spawned via [`CaptureEngine::spawn`].
pub struct CaptureEngine {
    reassembler: Reassembler,
    link: Arc<dyn FrameLink>,
    frames: mpsc::Receiver<Vec<u8>>,
    msgs: mpsc::Receiver<EngineMsg>,
    msgs_tx: mpsc::Sender<EngineMsg>,
    events_tx: mpsc::Sender<CaptureEvent>,
}

impl CaptureEngine {
    /// Spawns the engine over an inbound frame stream.
    ///
    /// Returns the command handle, the capture event stream, and the task
    /// handle. The engine stops when the frame stream closes.
    pub fn spawn(
        link: Arc<dyn FrameLink>,
        frames: mpsc::Receiver<Vec<u8>>,
    ) -> (
        CaptureHandle,
        mpsc::Receiver<CaptureEvent>,
        JoinHandle<()>,
    ) {
        let (msgs_tx, msgs) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let engine = CaptureEngine {
            reassembler: Reassembler::new(),
            link,
            frames,
            msgs,
            msgs_tx: msgs_tx.clone(),
            events_tx,
        };
        let task = tokio::spawn(engine.run());
        (CaptureHandle { tx: msgs_tx }, events_rx, task)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                // Commands and timer ticks take priority over buffered
                // frames; frames still get processed strictly in arrival
                // order relative to each other.
                biased;
                msg = self.msgs.recv() => match msg {
                    Some(EngineMsg::FinalizeCheck { generation }) => {
                        let out = self.reassembler.handle_timer(generation);
                        self.dispatch(out).await;
                    }
                    Some(EngineMsg::Snap) => self.on_snap(),
                    Some(EngineMsg::Abort) => {
                        self.reassembler.abort();
                    }
                    // Unreachable while we hold msgs_tx ourselves.
                    None => break,
                },
                frame = self.frames.recv() => match frame {
                    Some(bytes) => {
                        let out = self.reassembler.handle_frame(&bytes);
                        self.dispatch(out).await;
                    }
                    None => {
                        debug!("frame stream closed, capture engine stopping");
                        break;
                    }
                },
            }
        }
    }

    fn on_snap(&mut self) {
        // A new capture starts from a clean slate, like the reset the
        // device performs on its side.
        self.reassembler.abort();
        if let Err(err) = self.link.send_text(CMD_SNAP) {
            warn!(error = %err, "link unavailable, capture request dropped");
        }
    }

    async fn dispatch(&mut self, out: FrameOutcome) {
        if let Some(generation) = out.arm_timer {
            let tx = self.msgs_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(FINALIZE_GRACE).await;
                let _ = tx.send(EngineMsg::FinalizeCheck { generation }).await;
            });
        }
        for event in out.events {
            let _ = self.events_tx.send(event).await;
        }
    }
}
