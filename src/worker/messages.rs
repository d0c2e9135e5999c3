//! Worker wire protocol (spec.md §5).
//!
//! Shape mirrors the teacher's `src/web/worker/ipc_types.rs` almost exactly
//! (`WorkerRequest{id,command}` / `WorkerResponse{id,payload}`, a command enum
//! with `LoadModel`/`UnloadModel`/`Generate`/`CancelGeneration`/`Ping`/
//! `Shutdown`), with `Generate` split into the `spawn/init/startStream/
//! nextToken/cancel/memoryStats/dispose` operations spec.md §5 names instead
//! of a single fire-and-collect call. The teacher carries this protocol over
//! stdin/stdout JSON-Lines to a child process; this crate carries the same
//! typed enums directly over a `crossbeam_channel` to a worker OS thread
//! (SPEC_FULL.md §4.1) — no process boundary, no serialization in the
//! in-process path.

use crate::types::{GenerationOptions, RuntimeConfig};

pub type RequestId = u64;

#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub id: RequestId,
    pub command: WorkerCommand,
}

#[derive(Debug, Clone)]
pub enum WorkerCommand {
    Init(RuntimeConfig),
    StartStream { prompt: String, options: GenerationOptions },
    NextToken,
    Cancel,
    MemoryStats,
    Embed(String),
    Dispose,
    Ping,
}

#[derive(Debug, Clone)]
pub struct WorkerResponse {
    pub id: RequestId,
    pub payload: WorkerPayload,
}

#[derive(Debug, Clone)]
pub enum WorkerPayload {
    Initialized,
    StreamStarted,
    Token { text: String, index: u32 },
    StreamEnded { reason: crate::types::TerminalReason },
    Cancelled,
    MemoryStats(crate::ffi::NativeMemoryStats),
    Embedding(Vec<f32>),
    Disposed,
    Pong,
    Error(crate::error::RuntimeError),
}

impl WorkerResponse {
    pub fn ok(id: RequestId, payload: WorkerPayload) -> Self {
        Self { id, payload }
    }

    pub fn error(id: RequestId, err: crate::error::RuntimeError) -> Self {
        Self {
            id,
            payload: WorkerPayload::Error(err),
        }
    }
}
