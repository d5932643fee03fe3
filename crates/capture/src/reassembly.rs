//! Frame classification and image reassembly.
//!
//! [`Reassembler`] is the synchronous core of the capture engine: it is
//! driven with inbound frames and timer ticks by a single owner, mutates
//! the transfer session, and reports what happened as [`CaptureEvent`]s.
//! Keeping it free of I/O makes the whole protocol testable without a
//! runtime.

use tracing::{debug, info, warn};

use crate::CaptureError;
use crate::frame::ControlFrame;
use crate::jpeg;
use crate::repair::repair_jpeg;
use crate::session::{SessionState, TransferSession};

/// Progress at which the stall timer is armed.
pub const TIMER_ARM_PROGRESS: f32 = 0.97;

/// Minimum progress for the stall timer to force a finalize.
pub const TIMER_FORCE_PROGRESS: f32 = 0.95;

/// A validated image published by a finalized transfer.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// The reassembled (possibly repaired) JPEG bytes.
    pub bytes: Vec<u8>,
    /// Width parsed from the JPEG frame header.
    pub width: u32,
    /// Height parsed from the JPEG frame header.
    pub height: u32,
    /// Whether marker repair was needed before the bytes validated.
    pub repaired: bool,
}

/// Events reported by the reassembler.
#[derive(Debug)]
pub enum CaptureEvent {
    /// A header frame opened a transfer session.
    TransferStarted {
        expected_size: usize,
        width: u32,
        height: u32,
    },
    /// Payload arrived; fraction of the expected bytes received.
    Progress(f32),
    /// The transfer finalized into a valid image.
    ImageReady(CapturedImage),
    /// The transfer finalized but the bytes never validated. Terminal for
    /// this capture; there is no retry.
    TransferFailed(CaptureError),
    /// Decodable text received while no session was open.
    Info(String),
}

/// What a frame or timer tick produced.
#[derive(Debug, Default)]
pub struct FrameOutcome {
    pub events: Vec<CaptureEvent>,
    /// When set, the owner must schedule a stall check for this session
    /// generation after [`crate::engine::FINALIZE_GRACE`].
    pub arm_timer: Option<u64>,
}

/// Reassembles inbound frames into complete images.
#[derive(Debug, Default)]
pub struct Reassembler {
    session: Option<TransferSession>,
    next_generation: u64,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session state (`Idle` when no session is open).
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, TransferSession::state)
    }

    /// Processes one inbound frame.
    ///
    /// Classification: UTF-8 text matching the control grammar is a
    /// control frame; other text is informational while idle but payload
    /// while receiving; non-text is always payload.
    pub fn handle_frame(&mut self, bytes: &[u8]) -> FrameOutcome {
        let mut out = FrameOutcome::default();

        if let Ok(text) = std::str::from_utf8(bytes) {
            match ControlFrame::parse(text) {
                Some(ControlFrame::ImageHeader {
                    expected_size,
                    width,
                    height,
                }) => {
                    self.open_session(expected_size, width, height, &mut out);
                    return out;
                }
                Some(ControlFrame::End) => {
                    if self.session.is_some() {
                        self.finalize(&mut out.events);
                    } else {
                        debug!("END frame with no open session, ignored");
                    }
                    return out;
                }
                None => {
                    if self.session.is_none() {
                        debug!(text, "informational frame");
                        out.events.push(CaptureEvent::Info(text.to_string()));
                        return out;
                    }
                    // Unrecognized text during a transfer is payload.
                }
            }
        }

        self.append_payload(bytes, &mut out);
        out
    }

    /// Processes a stall-timer tick armed for `generation`.
    ///
    /// Stale ticks (session replaced or already finalized) are ignored.
    pub fn handle_timer(&mut self, generation: u64) -> FrameOutcome {
        let mut out = FrameOutcome::default();
        let Some(session) = self.session.as_ref() else {
            return out;
        };
        if session.generation() != generation || session.state() != SessionState::Receiving {
            return out;
        }
        if session.received() > 0 && session.progress() >= TIMER_FORCE_PROGRESS {
            warn!(
                received = session.received(),
                expected = session.expected_size(),
                "transfer stalled near completion, forcing finalize"
            );
            self.finalize(&mut out.events);
        }
        out
    }

    /// Discards any in-flight session without publishing anything.
    pub fn abort(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                info!(received = session.received(), "transfer aborted");
                true
            }
            None => false,
        }
    }

    fn open_session(&mut self, expected_size: usize, width: u32, height: u32, out: &mut FrameOutcome) {
        // Last header wins: a mid-transfer restart silently discards the
        // bytes received so far.
        if let Some(old) = self.session.take() {
            warn!(
                discarded = old.received(),
                "image header while receiving, discarding previous buffer"
            );
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        info!(expected_size, width, height, "image transfer started");
        self.session = Some(TransferSession::new(expected_size, width, height, generation));
        out.events.push(CaptureEvent::TransferStarted {
            expected_size,
            width,
            height,
        });
    }

    fn append_payload(&mut self, bytes: &[u8], out: &mut FrameOutcome) {
        let Some(session) = self.session.as_mut() else {
            debug!(len = bytes.len(), "payload frame with no open session, dropped");
            return;
        };
        let progress = session.append(bytes);
        out.events.push(CaptureEvent::Progress(progress));

        if session.complete_by_size() {
            debug!(
                received = session.received(),
                "expected size reached without END"
            );
            self.finalize(&mut out.events);
        } else if progress >= TIMER_ARM_PROGRESS && session.arm_timer_once() {
            out.arm_timer = Some(session.generation());
        }
    }

    /// Finalizes the open session: strict decode, one repair retry, then
    /// publish or fail. Exactly one completion path gets past the
    /// session's finalize barrier.
    fn finalize(&mut self, events: &mut Vec<CaptureEvent>) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if !session.try_begin_finalize() {
            return;
        }

        let was_full = session.progress() >= 1.0;
        let buffer = session.take_buffer();
        let received = buffer.len();

        match jpeg::parse_info(&buffer) {
            Ok(info) => {
                publish(events, buffer, info, false, was_full);
            }
            Err(err) => {
                debug!(%err, received, "strict decode failed, attempting repair");
                let repaired = repair_jpeg(buffer);
                match jpeg::parse_info(&repaired) {
                    Ok(info) => {
                        publish(events, repaired, info, true, was_full);
                    }
                    Err(err) => {
                        warn!(%err, received, "image decode failed even after repair");
                        events.push(CaptureEvent::TransferFailed(CaptureError::DecodeFailure(
                            err,
                        )));
                    }
                }
            }
        }

        session.close();
    }
}

fn publish(
    events: &mut Vec<CaptureEvent>,
    bytes: Vec<u8>,
    info: jpeg::JpegInfo,
    repaired: bool,
    was_full: bool,
) {
    info!(
        len = bytes.len(),
        width = info.width,
        height = info.height,
        repaired,
        "image ready"
    );
    // Progress is pinned to 1.0 on publish, but only if an append didn't
    // already report it there.
    if !was_full {
        events.push(CaptureEvent::Progress(1.0));
    }
    events.push(CaptureEvent::ImageReady(CapturedImage {
        bytes,
        width: info.width,
        height: info.height,
        repaired,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::jpeg_of_len;

    fn drain_events(outs: impl IntoIterator<Item = FrameOutcome>) -> Vec<CaptureEvent> {
        outs.into_iter().flat_map(|o| o.events).collect()
    }

    fn image_from(events: &[CaptureEvent]) -> Option<&CapturedImage> {
        events.iter().find_map(|e| match e {
            CaptureEvent::ImageReady(img) => Some(img),
            _ => None,
        })
    }

    fn progress_values(events: &[CaptureEvent]) -> Vec<f32> {
        events
            .iter()
            .filter_map(|e| match e {
                CaptureEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn header_payload_end_completes_once() {
        let payload = jpeg_of_len(100);
        let mut r = Reassembler::new();

        let mut outs = vec![r.handle_frame(b"IMG:100:8:8")];
        for chunk in payload.chunks(20) {
            outs.push(r.handle_frame(chunk));
        }
        // The size path fires on the last append; the END that follows
        // must be absorbed by the finalize-once barrier.
        let end = r.handle_frame(b"END");
        assert!(end.events.is_empty());

        let events = drain_events(outs);
        let img = image_from(&events).expect("image published");
        assert_eq!(img.bytes.len(), 100);
        assert_eq!(img.bytes, payload);
        assert!(!img.repaired);

        let ones = progress_values(&events)
            .iter()
            .filter(|p| **p >= 1.0)
            .count();
        assert_eq!(ones, 1, "progress must reach 1.0 exactly once");
        assert_eq!(r.state(), SessionState::Idle);
    }

    #[test]
    fn size_path_without_end_yields_identical_buffer() {
        let payload = jpeg_of_len(100);
        let mut r = Reassembler::new();
        r.handle_frame(b"IMG:100:8:8");

        let mut outs = Vec::new();
        for chunk in payload.chunks(33) {
            outs.push(r.handle_frame(chunk));
        }
        let events = drain_events(outs);
        let img = image_from(&events).expect("image published without END");
        assert_eq!(img.bytes, payload);
        assert_eq!(r.state(), SessionState::Idle);
    }

    #[test]
    fn end_frame_finalizes_partial_transfer() {
        // Announced size larger than what arrives: only END completes it.
        let payload = jpeg_of_len(100);
        let mut r = Reassembler::new();
        r.handle_frame(b"IMG:200:8:8");
        let mut outs = Vec::new();
        for chunk in payload.chunks(25) {
            outs.push(r.handle_frame(chunk));
        }
        assert_eq!(r.state(), SessionState::Receiving);

        outs.push(r.handle_frame(b"END"));
        let events = drain_events(outs);
        let img = image_from(&events).expect("END must finalize");
        assert_eq!(img.bytes, payload);
        // Publish pins progress to 1.0 even though only half arrived.
        assert_eq!(progress_values(&events).last().copied(), Some(1.0));
    }

    #[test]
    fn progress_sequence_is_monotonic() {
        let mut r = Reassembler::new();
        r.handle_frame(b"IMG:1000:8:8");
        let mut outs = Vec::new();
        for size in [1usize, 7, 100, 3, 250, 89, 400] {
            outs.push(r.handle_frame(&vec![0x11; size]));
        }
        let progress = progress_values(&drain_events(outs));
        assert!(!progress.is_empty());
        for pair in progress.windows(2) {
            assert!(pair[1] >= pair[0], "progress regressed: {pair:?}");
        }
    }

    #[test]
    fn new_header_discards_previous_buffer() {
        let payload = jpeg_of_len(80);
        let mut r = Reassembler::new();
        r.handle_frame(b"IMG:500:8:8");
        r.handle_frame(&[0xAAu8; 64]);

        // Restart mid-transfer: last header wins.
        r.handle_frame(b"IMG:80:8:8");
        let out = r.handle_frame(&payload);
        let img = image_from(&out.events).expect("fresh session completes");
        assert_eq!(img.bytes, payload, "old bytes must not be retained");
    }

    #[test]
    fn stall_timer_forces_finalize() {
        let payload = jpeg_of_len(98);
        let mut r = Reassembler::new();
        r.handle_frame(b"IMG:100:8:8");
        let out = r.handle_frame(&payload);
        let generation = out.arm_timer.expect("timer armed at 98%");

        let tick = r.handle_timer(generation);
        let img = image_from(&tick.events).expect("forced finalize publishes");
        assert_eq!(img.bytes, payload);
        assert_eq!(progress_values(&tick.events), vec![1.0]);
    }

    #[test]
    fn timer_arms_only_once_per_session() {
        let mut r = Reassembler::new();
        r.handle_frame(b"IMG:100:8:8");
        let first = r.handle_frame(&[0x11; 97]);
        assert!(first.arm_timer.is_some());
        let second = r.handle_frame(&[0x11; 1]);
        assert!(second.arm_timer.is_none());
    }

    #[test]
    fn stale_timer_tick_is_ignored() {
        let payload = jpeg_of_len(100);
        let mut r = Reassembler::new();
        r.handle_frame(b"IMG:100:8:8");
        let out = r.handle_frame(&payload[..98]);
        let generation = out.arm_timer.expect("timer armed");

        // Transfer completes before the timer fires.
        r.handle_frame(&payload[98..]);
        assert_eq!(r.state(), SessionState::Idle);

        let tick = r.handle_timer(generation);
        assert!(tick.events.is_empty(), "stale tick must not re-finalize");
    }

    #[test]
    fn timer_tick_for_replaced_session_is_ignored() {
        let mut r = Reassembler::new();
        r.handle_frame(b"IMG:100:8:8");
        let out = r.handle_frame(&[0x11; 98]);
        let old_generation = out.arm_timer.unwrap();

        r.handle_frame(b"IMG:100:8:8");
        r.handle_frame(&[0x22; 10]);

        let tick = r.handle_timer(old_generation);
        assert!(tick.events.is_empty());
        assert_eq!(r.state(), SessionState::Receiving);
    }

    #[test]
    fn undecodable_buffer_fails_terminally() {
        let mut r = Reassembler::new();
        r.handle_frame(b"IMG:10:8:8");
        let out = r.handle_frame(&[0x00u8; 10]);
        let failed = out
            .events
            .iter()
            .any(|e| matches!(e, CaptureEvent::TransferFailed(_)));
        assert!(failed);
        assert!(image_from(&out.events).is_none());
        assert_eq!(r.state(), SessionState::Idle);

        // Terminal: later payload for the dead capture is dropped.
        let after = r.handle_frame(&[0x01u8; 4]);
        assert!(after.events.is_empty());
    }

    #[test]
    fn truncated_transfer_is_repaired() {
        // Lose the EOI in transit; repair must patch it back.
        let mut truncated = jpeg_of_len(100);
        truncated.truncate(98);

        let mut r = Reassembler::new();
        r.handle_frame(b"IMG:98:8:8");
        let out = r.handle_frame(&truncated);
        let img = image_from(&out.events).expect("repair makes it decodable");
        assert!(img.repaired);
        assert_eq!(&img.bytes[img.bytes.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn end_without_session_is_ignored() {
        let mut r = Reassembler::new();
        let out = r.handle_frame(b"END");
        assert!(out.events.is_empty());
    }

    #[test]
    fn text_while_idle_is_informational() {
        let mut r = Reassembler::new();
        let out = r.handle_frame(b"battery: 87%");
        assert!(matches!(
            out.events.as_slice(),
            [CaptureEvent::Info(msg)] if msg == "battery: 87%"
        ));
        assert_eq!(r.state(), SessionState::Idle);
    }

    #[test]
    fn text_while_receiving_is_payload() {
        let mut r = Reassembler::new();
        r.handle_frame(b"IMG:20:8:8");
        let out = r.handle_frame(b"hello");
        assert_eq!(progress_values(&out.events), vec![0.25]);
    }

    #[test]
    fn binary_frame_while_idle_is_dropped() {
        let mut r = Reassembler::new();
        let out = r.handle_frame(&[0xFF, 0xFE, 0x00, 0x80]);
        assert!(out.events.is_empty());
    }

    #[test]
    fn end_with_empty_buffer_fails() {
        let mut r = Reassembler::new();
        r.handle_frame(b"IMG:100:8:8");
        let out = r.handle_frame(b"END");
        assert!(out
            .events
            .iter()
            .any(|e| matches!(e, CaptureEvent::TransferFailed(_))));
        assert_eq!(r.state(), SessionState::Idle);
    }

    #[test]
    fn abort_discards_session() {
        let mut r = Reassembler::new();
        r.handle_frame(b"IMG:100:8:8");
        r.handle_frame(&[0x11; 50]);
        assert!(r.abort());
        assert_eq!(r.state(), SessionState::Idle);
        assert!(!r.abort());
    }
}
