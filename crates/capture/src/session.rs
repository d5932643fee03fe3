//! Transfer session state for one in-flight image capture.

/// Lifecycle of the decoder relative to a capture.
///
/// `Idle` means no session is open. A session never leaves `Closed`; the
/// decoder drops it and opens a fresh one for the next capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Receiving,
    Finalizing,
    Closed,
}

/// Mutable state tracking one in-flight image reassembly.
///
/// Single-writer: only the decoder mutates a session, and only in frame
/// arrival order. The buffer is append-only until finalize takes it.
#[derive(Debug)]
pub struct TransferSession {
    expected_size: usize,
    width: u32,
    height: u32,
    buffer: Vec<u8>,
    state: SessionState,
    /// Single-execution barrier for finalize.
    finalized: bool,
    timer_armed: bool,
    generation: u64,
}

impl TransferSession {
    pub(crate) fn new(expected_size: usize, width: u32, height: u32, generation: u64) -> Self {
        Self {
            expected_size,
            width,
            height,
            buffer: Vec::with_capacity(expected_size),
            state: SessionState::Receiving,
            finalized: false,
            timer_armed: false,
            generation,
        }
    }

    /// Appends payload bytes and returns the updated progress.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> f32 {
        debug_assert_eq!(self.state, SessionState::Receiving);
        self.buffer.extend_from_slice(bytes);
        self.progress()
    }

    /// Fraction of the expected bytes received, in `[0, 1]`.
    ///
    /// 0 when the header did not announce a size. Monotonic non-decreasing
    /// while receiving: the buffer only grows and the expected size is
    /// fixed at open.
    pub fn progress(&self) -> f32 {
        if self.expected_size > 0 {
            (self.buffer.len() as f32 / self.expected_size as f32).min(1.0)
        } else {
            0.0
        }
    }

    /// True once at least the announced number of bytes has arrived.
    pub(crate) fn complete_by_size(&self) -> bool {
        self.expected_size > 0 && self.buffer.len() >= self.expected_size
    }

    /// Claims the right to finalize. Returns `false` if some other path
    /// already did.
    pub(crate) fn try_begin_finalize(&mut self) -> bool {
        if self.finalized || self.state != SessionState::Receiving {
            return false;
        }
        self.finalized = true;
        self.state = SessionState::Finalizing;
        true
    }

    /// Arms the stall timer. Returns `true` only on the first call.
    pub(crate) fn arm_timer_once(&mut self) -> bool {
        if self.timer_armed {
            return false;
        }
        self.timer_armed = true;
        true
    }

    pub(crate) fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    pub(crate) fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    pub fn expected_size(&self) -> usize {
        self.expected_size
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}
