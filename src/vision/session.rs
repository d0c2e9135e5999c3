//! Vision session: submit frames, describe the most recent one (spec.md §4.5).

use std::sync::Arc;

use crate::error::{RuntimeError, VisionError};
use crate::ffi::backend::NativeGenParams;
use crate::ffi::InferenceBackend;
use crate::types::GenerationOptions;

use super::frame_queue::{Frame, FrameQueue};

/// Pairs a loaded vision-capable handle with a frame queue. Frames are
/// submitted from a capture thread via `submit_frame`; `describe_pending`
/// pulls the one pending frame (if any) and runs it through the backend.
pub struct VisionSession<B: InferenceBackend> {
    backend: Arc<B>,
    handle: B::Handle,
    queue: FrameQueue,
}

impl<B: InferenceBackend> VisionSession<B> {
    pub fn new(backend: Arc<B>, handle: B::Handle) -> Self {
        Self { backend, handle, queue: FrameQueue::new() }
    }

    /// Enqueues a captured frame. Returns `false` if a still-pending frame
    /// was dropped to make room for it (spec.md §4.5).
    pub fn submit_frame(&self, frame: Frame) -> bool {
        self.queue.enqueue(frame)
    }

    pub fn pending_frame_count(&self) -> u64 {
        u64::from(self.queue.has_pending())
    }

    pub fn dropped_frame_count(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// Describes the pending frame, if any, with the given prompt. Returns
    /// `Ok(None)` when no frame is pending (not an error: callers poll this
    /// on a timer and an empty queue is the common case).
    pub fn describe_pending(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Option<String>, RuntimeError> {
        let Some(frame) = self.queue.dequeue() else {
            return Ok(None);
        };
        let expected = (frame.width as usize) * (frame.height as usize) * 3;
        if frame.rgb.len() != expected {
            self.queue.mark_done();
            return Err(VisionError::WrongByteCount {
                got: frame.rgb.len(),
                expected,
                width: frame.width,
                height: frame.height,
            }
            .into());
        }
        let params = NativeGenParams {
            max_tokens: options.max_new_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            repeat_penalty: options.repeat_penalty,
            stop_sequences: options.stop_sequences.clone(),
            grammar: None,
        };
        let result = self
            .backend
            .vision_describe(&self.handle, &frame.rgb, frame.width, frame.height, prompt, &params)
            .map_err(|_| RuntimeError::Vision(VisionError::MmprojMissing));
        self.queue.mark_done();
        Ok(Some(result?))
    }
}
