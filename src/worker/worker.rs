//! Worker thread loop (spec.md §5).
//!
//! State machine: `Spawned → Initialised → Idle ⇄ Streaming → Disposed`.
//! Grounded on the teacher's `run_worker`/`WorkerCommand` match in
//! `src/web/worker/worker_main.rs`: one thread owns the native handle for its
//! entire lifetime and every command is handled in strict sequence off a
//! single channel, so there is never a data race on the handle. The teacher
//! additionally spawns a *second* thread per generation to avoid blocking its
//! command loop while tokens stream; this worker instead treats streaming as
//! pull-based (`NextToken` is itself a queued command), so no second thread
//! is needed — the caller controls the pace.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::error::{GenerationError, RuntimeError};
use crate::ffi::backend::{NativeGenParams, NativeStreamStep};
use crate::ffi::{error_map, InferenceBackend};
use crate::types::{GenerationOptions, RuntimeConfig, TerminalReason};

use super::messages::{WorkerCommand, WorkerPayload, WorkerRequest, WorkerResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Spawned,
    Initialised,
    Streaming,
    Disposed,
}

fn to_native_gen_params(options: &GenerationOptions) -> NativeGenParams {
    NativeGenParams {
        max_tokens: options.max_new_tokens,
        temperature: options.temperature,
        top_p: options.top_p,
        top_k: options.top_k,
        repeat_penalty: options.repeat_penalty,
        stop_sequences: options.stop_sequences.clone(),
        grammar: options.grammar.as_ref().map(|g| g.grammar.clone()),
    }
}

struct WorkerLoop<B: InferenceBackend> {
    backend: Arc<B>,
    handle: Option<B::Handle>,
    stream: Option<B::Stream>,
    active_prompt: Option<String>,
    state: State,
}

impl<B: InferenceBackend> WorkerLoop<B> {
    fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            handle: None,
            stream: None,
            active_prompt: None,
            state: State::Spawned,
        }
    }

    fn dispatch(&mut self, command: WorkerCommand) -> WorkerPayload {
        match command {
            WorkerCommand::Init(config) => self.handle_init(config),
            WorkerCommand::StartStream { prompt, options } => self.handle_start_stream(prompt, options),
            WorkerCommand::NextToken => self.handle_next_token(),
            WorkerCommand::Cancel => self.handle_cancel(),
            WorkerCommand::MemoryStats => self.handle_memory_stats(),
            WorkerCommand::Embed(text) => self.handle_embed(text),
            WorkerCommand::Dispose => self.handle_dispose(),
            WorkerCommand::Ping => WorkerPayload::Pong,
        }
    }

    fn handle_init(&mut self, config: RuntimeConfig) -> WorkerPayload {
        let native = crate::ffi::backend::NativeConfig {
            model_path: config.model_path.clone(),
            backend: config.backend,
            n_threads: config.threads,
            context_size: config.context_length,
            batch_size: 512,
            memory_limit_bytes: config.memory_budget_mib as u64 * 1024 * 1024,
            gpu_layers: if config.gpu { u32::MAX } else { 0 },
            use_mmap: true,
            use_mlock: false,
            seed: config.seed,
            flash_attention: config.flash_attention,
            kv_quant_k: config.kv_quant_k,
            kv_quant_v: config.kv_quant_v,
        };
        match self.backend.init(&native) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = State::Initialised;
                WorkerPayload::Initialized
            }
            Err(code) => WorkerPayload::Error(error_map::map_init_error(code, &config.model_path)),
        }
    }

    fn handle_start_stream(&mut self, prompt: String, options: GenerationOptions) -> WorkerPayload {
        if self.state == State::Streaming {
            return WorkerPayload::Error(RuntimeError::Generation(GenerationError::StreamAlreadyActive));
        }
        let Some(handle) = self.handle.as_ref() else {
            return WorkerPayload::Error(RuntimeError::Initialization(crate::error::InitError::NotInitialized));
        };
        if prompt.is_empty() {
            return WorkerPayload::Error(RuntimeError::Generation(GenerationError::PromptEmpty));
        }
        let params = to_native_gen_params(&options);
        match self.backend.generate_stream(handle, &prompt, &params) {
            Ok(stream) => {
                self.stream = Some(stream);
                self.active_prompt = Some(prompt);
                self.state = State::Streaming;
                WorkerPayload::StreamStarted
            }
            Err(code) => WorkerPayload::Error(error_map::map_generation_error(code)),
        }
    }

    fn handle_next_token(&mut self) -> WorkerPayload {
        let Some(stream) = self.stream.as_mut() else {
            return WorkerPayload::Error(RuntimeError::Generation(GenerationError::StreamEnded));
        };
        match self.backend.stream_next(stream) {
            Ok(NativeStreamStep::Token(text)) => WorkerPayload::Token { text, index: 0 },
            Ok(NativeStreamStep::EndOfStream) => {
                self.finish_stream();
                WorkerPayload::StreamEnded { reason: TerminalReason::Done }
            }
            Err(code) => {
                self.finish_stream();
                WorkerPayload::Error(error_map::map_generation_error(code))
            }
        }
    }

    fn handle_cancel(&mut self) -> WorkerPayload {
        if let Some(stream) = self.stream.as_mut() {
            self.backend.stream_cancel(stream);
        }
        self.finish_stream();
        WorkerPayload::Cancelled
    }

    fn finish_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.backend.stream_free(stream);
        }
        self.active_prompt = None;
        if self.state == State::Streaming {
            self.state = State::Initialised;
        }
    }

    fn handle_memory_stats(&self) -> WorkerPayload {
        let Some(handle) = self.handle.as_ref() else {
            return WorkerPayload::Error(RuntimeError::Initialization(crate::error::InitError::NotInitialized));
        };
        match self.backend.memory_usage(handle) {
            Ok(stats) => WorkerPayload::MemoryStats(stats),
            Err(code) => WorkerPayload::Error(error_map::map_generation_error(code)),
        }
    }

    fn handle_embed(&self, text: String) -> WorkerPayload {
        let Some(handle) = self.handle.as_ref() else {
            return WorkerPayload::Error(RuntimeError::Initialization(crate::error::InitError::NotInitialized));
        };
        match self.backend.embed(handle, &text) {
            Ok(vector) => WorkerPayload::Embedding(vector),
            Err(code) => WorkerPayload::Error(error_map::map_generation_error(code)),
        }
    }

    fn handle_dispose(&mut self) -> WorkerPayload {
        self.finish_stream();
        if let Some(handle) = self.handle.take() {
            self.backend.free(handle);
        }
        self.state = State::Disposed;
        WorkerPayload::Disposed
    }
}

/// Spawns the worker thread and returns the channel endpoints plus a join
/// handle. `shutdown` is polled between commands; disposing cleanly also
/// stops the loop.
pub fn spawn<B: InferenceBackend + 'static>(
    backend: Arc<B>,
    requests: Receiver<WorkerRequest>,
    responses: Sender<WorkerResponse>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    let join = std::thread::Builder::new()
        .name("edge-veda-worker".into())
        .spawn(move || {
            let mut worker = WorkerLoop::new(backend);
            while !shutdown_flag.load(Ordering::SeqCst) {
                let Ok(request) = requests.recv() else {
                    break;
                };
                let disposing = matches!(request.command, WorkerCommand::Dispose);
                let payload = worker.dispatch(request.command);
                let done = matches!(payload, WorkerPayload::Disposed);
                if responses.send(WorkerResponse::ok(request.id, payload)).is_err() {
                    break;
                }
                if disposing && done {
                    break;
                }
            }
        })
        .expect("failed to spawn worker thread");
    (join, shutdown)
}
