//! Single-slot, drop-oldest-pending frame queue (spec.md §4.5).
//!
//! Grounded on the teacher's `src/web/generation_queue.rs`: a single pending
//! slot, a single owner, and a counter tracking work that never got
//! consumed. Unlike the teacher's queue (which drops a *new* request when
//! one is already pending), spec.md §4.5 has the newest capture win: camera
//! frames age out fast, so `enqueue` always replaces whatever was waiting
//! and counts the replaced frame as dropped. A `processing` flag — absent
//! from the teacher's queue, added here because vision description is slow
//! relative to frame capture — keeps a second `dequeue` from handing out a
//! frame while the previous one is still being described.

use std::sync::Mutex;

/// One captured frame awaiting vision-model description.
#[derive(Debug, Clone)]
pub struct Frame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at_ms: i64,
}

#[derive(Debug, Default)]
struct State {
    pending: Option<Frame>,
    processing: bool,
    dropped_count: u64,
    accepted_count: u64,
}

/// A single-slot queue: enqueuing while a frame is already pending replaces
/// it with the new arrival and counts the replaced one as dropped, rather
/// than blocking or growing unbounded (spec.md §4.5 "backpressure").
#[derive(Default)]
pub struct FrameQueue {
    state: Mutex<State>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a frame, replacing any pending one. Returns `true` if
    /// nothing was dropped, `false` if a still-unconsumed frame was
    /// overwritten.
    pub fn enqueue(&self, frame: Frame) -> bool {
        let mut state = self.state.lock().unwrap();
        let replaced = state.pending.replace(frame).is_some();
        state.accepted_count += 1;
        if replaced {
            state.dropped_count += 1;
        }
        !replaced
    }

    /// Takes the pending frame, if any, and marks the queue as processing —
    /// a further `dequeue` call returns `None` until `mark_done` clears it,
    /// even if a new frame has since been enqueued.
    pub fn dequeue(&self) -> Option<Frame> {
        let mut state = self.state.lock().unwrap();
        if state.processing {
            return None;
        }
        let frame = state.pending.take()?;
        state.processing = true;
        Some(frame)
    }

    /// Clears the processing flag set by `dequeue`, allowing the next
    /// pending frame to be taken.
    pub fn mark_done(&self) {
        self.state.lock().unwrap().processing = false;
    }

    /// Clears the pending frame and processing flag without touching the
    /// accepted/dropped counters.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.pending = None;
        state.processing = false;
    }

    /// Zeroes the accepted/dropped counters without disturbing the pending
    /// frame or processing flag.
    pub fn reset_counters(&self) {
        let mut state = self.state.lock().unwrap();
        state.dropped_count = 0;
        state.accepted_count = 0;
    }

    pub fn has_pending(&self) -> bool {
        self.state.lock().unwrap().pending.is_some()
    }

    pub fn is_processing(&self) -> bool {
        self.state.lock().unwrap().processing
    }

    pub fn dropped_count(&self) -> u64 {
        self.state.lock().unwrap().dropped_count
    }

    pub fn accepted_count(&self) -> u64 {
        self.state.lock().unwrap().accepted_count
    }
}
