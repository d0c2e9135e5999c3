//! Client-facing handle to a spawned worker (spec.md §5).
//!
//! Grounded on the teacher's `WorkerBridge::send_and_wait` (`src/web/worker/
//! worker_bridge.rs`): a monotonic request id, a blocking call that sends a
//! request and waits for the response carrying the same id. The teacher
//! matches by racing a `pending` map against an async reader task; this
//! handle doesn't need that because `crossbeam_channel::Receiver::recv` on an
//! in-process thread already delivers responses in request order with no
//! interleaving to de-multiplex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::error::{InitError, RuntimeError};
use crate::ffi::{InferenceBackend, NativeMemoryStats};
use crate::types::{GenerationOptions, RuntimeConfig};

use super::messages::{RequestId, WorkerCommand, WorkerPayload, WorkerRequest};
use super::worker;

pub struct WorkerHandle {
    requests: Sender<WorkerRequest>,
    responses: Receiver<super::messages::WorkerResponse>,
    next_id: AtomicU64,
}

impl WorkerHandle {
    pub fn spawn<B: InferenceBackend + 'static>(backend: Arc<B>) -> Self {
        let (req_tx, req_rx) = crossbeam_channel::unbounded();
        let (resp_tx, resp_rx) = crossbeam_channel::unbounded();
        worker::spawn(backend, req_rx, resp_tx);
        Self {
            requests: req_tx,
            responses: resp_rx,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_request_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn call(&self, command: WorkerCommand) -> Result<WorkerPayload, RuntimeError> {
        let id = self.next_request_id();
        self.requests
            .send(WorkerRequest { id, command })
            .map_err(|_| RuntimeError::Initialization(InitError::NotInitialized))?;
        loop {
            let response = self
                .responses
                .recv()
                .map_err(|_| RuntimeError::Initialization(InitError::NotInitialized))?;
            if response.id != id {
                continue;
            }
            return match response.payload {
                WorkerPayload::Error(err) => Err(err),
                other => Ok(other),
            };
        }
    }

    pub fn init(&self, config: RuntimeConfig) -> Result<(), RuntimeError> {
        match self.call(WorkerCommand::Init(config))? {
            WorkerPayload::Initialized => Ok(()),
            other => unexpected(other),
        }
    }

    pub fn start_stream(&self, prompt: String, options: GenerationOptions) -> Result<(), RuntimeError> {
        match self.call(WorkerCommand::StartStream { prompt, options })? {
            WorkerPayload::StreamStarted => Ok(()),
            other => unexpected(other),
        }
    }

    /// Returns `Some(text)` for each token, `None` once the stream ends
    /// normally. An in-flight cancellation surfaces as `Ok(None)` too; callers
    /// that need to distinguish cancel-vs-done should watch their own cancel
    /// token rather than inspect this return value (spec.md §5 keeps stream
    /// termination reasons on the session layer, not the worker protocol).
    pub fn next_token(&self) -> Result<Option<String>, RuntimeError> {
        match self.call(WorkerCommand::NextToken)? {
            WorkerPayload::Token { text, .. } => Ok(Some(text)),
            WorkerPayload::StreamEnded { reason: _ } => Ok(None),
            other => unexpected(other),
        }
    }

    pub fn cancel(&self) -> Result<(), RuntimeError> {
        match self.call(WorkerCommand::Cancel)? {
            WorkerPayload::Cancelled => Ok(()),
            other => unexpected(other),
        }
    }

    pub fn memory_stats(&self) -> Result<NativeMemoryStats, RuntimeError> {
        match self.call(WorkerCommand::MemoryStats)? {
            WorkerPayload::MemoryStats(stats) => Ok(stats),
            other => unexpected(other),
        }
    }

    pub fn embed(&self, text: String) -> Result<Vec<f32>, RuntimeError> {
        match self.call(WorkerCommand::Embed(text))? {
            WorkerPayload::Embedding(vector) => Ok(vector),
            other => unexpected(other),
        }
    }

    pub fn dispose(&self) -> Result<(), RuntimeError> {
        match self.call(WorkerCommand::Dispose)? {
            WorkerPayload::Disposed => Ok(()),
            other => unexpected(other),
        }
    }

    pub fn ping(&self) -> Result<(), RuntimeError> {
        match self.call(WorkerCommand::Ping)? {
            WorkerPayload::Pong => Ok(()),
            other => unexpected(other),
        }
    }
}

fn unexpected<T>(payload: WorkerPayload) -> Result<T, RuntimeError> {
    Err(RuntimeError::Generation(crate::error::GenerationError::InferenceFailed)).inspect_err(|_| {
        log::error!("worker returned an unexpected payload for this command: {payload:?}");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::backend::fake::FakeBackend;
    use crate::types::{BackendSelector, FlashAttentionMode, KvQuant};

    fn test_handle() -> WorkerHandle {
        WorkerHandle::spawn(Arc::new(FakeBackend::new()))
    }

    fn test_config() -> RuntimeConfig {
        RuntimeConfig::new(
            "model.gguf",
            4,
            2048,
            false,
            512,
            KvQuant::F16,
            KvQuant::F16,
            FlashAttentionMode::Auto,
            None,
            BackendSelector::Cpu,
        )
        .unwrap()
    }

    #[test]
    fn full_lifecycle_via_handle() {
        let handle = test_handle();
        handle.ping().unwrap();
        handle.init(test_config()).unwrap();
        handle.start_stream("a b c".into(), GenerationOptions::defaults()).unwrap();
        let mut tokens = Vec::new();
        while let Some(token) = handle.next_token().unwrap() {
            tokens.push(token);
        }
        assert!(!tokens.is_empty());
        let stats = handle.memory_stats().unwrap();
        assert!(stats.limit_bytes > 0);
        handle.dispose().unwrap();
    }

    #[test]
    fn embed_before_init_errors() {
        let handle = test_handle();
        assert!(handle.embed("hi".into()).is_err());
    }
}
