//! Generation options, cancel tokens, and token chunks (spec.md §3).
//!
//! The cancel-token listener pattern is grounded on the teacher's worker
//! re-entrancy guard style (`generation_thread: Option<JoinHandle<()>>` in
//! `src/web/worker/worker_main.rs`): a single flag inspected at suspension
//! points, never torn down mid-flight. Here the flag additionally carries a
//! synchronous listener list per spec.md §3's "Listeners fire synchronously
//! on cancellation."

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{ConfigError, RuntimeError};

/// Per-request generation options (spec.md §3 "Generation options").
///
/// Passed by value per request; immutable within a request.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub stop_sequences: Vec<String>,
    pub grammar: Option<GrammarSpec>,
    pub confidence_threshold: Option<f32>,
}

/// A compiled-or-literal grammar plus its root rule name.
#[derive(Debug, Clone)]
pub struct GrammarSpec {
    pub grammar: String,
    pub root_rule: String,
}

impl GenerationOptions {
    pub fn new(
        max_new_tokens: u32,
        temperature: f32,
        top_p: f32,
        top_k: u32,
        repeat_penalty: f32,
        stop_sequences: Vec<String>,
        grammar: Option<GrammarSpec>,
        confidence_threshold: Option<f32>,
    ) -> Result<Self, RuntimeError> {
        if !(1..=32768).contains(&max_new_tokens) {
            return Err(ConfigError::OutOfRange {
                name: "max_new_tokens".into(),
                value: max_new_tokens.to_string(),
                expected: "1..=32768".into(),
            }
            .into());
        }
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::OutOfRange {
                name: "temperature".into(),
                value: temperature.to_string(),
                expected: "0.0..=2.0".into(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&top_p) {
            return Err(ConfigError::OutOfRange {
                name: "top_p".into(),
                value: top_p.to_string(),
                expected: "0.0..=1.0".into(),
            }
            .into());
        }
        if !(1..=100).contains(&top_k) {
            return Err(ConfigError::OutOfRange {
                name: "top_k".into(),
                value: top_k.to_string(),
                expected: "1..=100".into(),
            }
            .into());
        }
        if !(0.0..=2.0).contains(&repeat_penalty) {
            return Err(ConfigError::OutOfRange {
                name: "repeat_penalty".into(),
                value: repeat_penalty.to_string(),
                expected: "0.0..=2.0".into(),
            }
            .into());
        }
        Ok(Self {
            max_new_tokens,
            temperature,
            top_p,
            top_k,
            repeat_penalty,
            stop_sequences,
            grammar,
            confidence_threshold,
        })
    }

    /// Default generation options: 512 tokens, temperature 0.8, top-p 0.95, top-k 40.
    pub fn defaults() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: 0.8,
            top_p: 0.95,
            top_k: 40,
            repeat_penalty: 1.1,
            stop_sequences: Vec::new(),
            grammar: None,
            confidence_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelState {
    Live,
    Cancelled,
}

struct Inner {
    state: AtomicBool, // false = live, true = cancelled
    listeners: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

/// A process-local cancellation signal (spec.md §3 "Cancel token").
///
/// Once transitioned to cancelled it never reverts for that instance;
/// `reset` yields a fresh instance. Listeners fire synchronously in
/// registration order; adding a listener to an already-cancelled token fires
/// it immediately.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns a fresh, live token — does not mutate `self`.
    pub fn reset(&self) -> Self {
        Self::new()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.load(Ordering::SeqCst)
    }

    fn state(&self) -> CancelState {
        if self.is_cancelled() {
            CancelState::Cancelled
        } else {
            CancelState::Live
        }
    }

    /// Transition live → cancelled at most once. A second call is a no-op.
    /// Listeners fire synchronously, in registration order, on the call that
    /// performs the transition.
    pub fn cancel(&self) {
        // compare_exchange so concurrent cancel() calls only fire listeners once.
        if self
            .inner
            .state
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let listeners = self.inner.listeners.lock().unwrap();
            for listener in listeners.iter() {
                listener();
            }
        }
    }

    /// Register a listener. If the token is already cancelled, the listener
    /// fires immediately (synchronously, before this call returns).
    pub fn on_cancel<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.state() == CancelState::Cancelled {
            listener();
            return;
        }
        let mut listeners = self.inner.listeners.lock().unwrap();
        // Re-check under the lock: cancel() may have raced us between the
        // state() read above and acquiring the lock.
        if self.is_cancelled() {
            drop(listeners);
            listener();
            return;
        }
        listeners.push(Box::new(listener));
    }
}

/// Why a stream's terminal chunk was emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalReason {
    Done,
    Cancelled,
    Error(String),
}

/// One unit of streamed output (spec.md §3 "Token chunk").
#[derive(Debug, Clone)]
pub struct TokenChunk {
    pub text: String,
    pub index: u32,
    pub terminal: bool,
    pub terminal_reason: Option<TerminalReason>,
    pub confidence: Option<f32>,
    pub cloud_handoff: bool,
}

impl TokenChunk {
    pub fn token(text: impl Into<String>, index: u32, confidence: Option<f32>, cloud_handoff: bool) -> Self {
        Self {
            text: text.into(),
            index,
            terminal: false,
            terminal_reason: None,
            confidence,
            cloud_handoff,
        }
    }

    pub fn terminal(index: u32, reason: TerminalReason) -> Self {
        Self {
            text: String::new(),
            index,
            terminal: true,
            terminal_reason: Some(reason),
            confidence: None,
            cloud_handoff: false,
        }
    }
}
