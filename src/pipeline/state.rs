//! Shared state between the worker threads (writers) and the confined
//! thread's per-frame poll (reader).
//!
//! Three independently locked regions so a cheap phase read never waits
//! behind a large streaming-buffer append. Each region is single-writer /
//! single-reader. Failures cross this boundary as data, never as panics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Coarse pipeline stage, polled once per UI frame for progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisPhase {
    #[default]
    Idle,
    Rendering,
    RunningDsp,
    CallingRemote,
}

impl AnalysisPhase {
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisPhase::Idle => "idle",
            AnalysisPhase::Rendering => "rendering",
            AnalysisPhase::RunningDsp => "analyzing",
            AnalysisPhase::CallingRemote => "generating feedback",
        }
    }
}

/// Live text-streaming status. Reset per request, appended by the worker,
/// drained and cleared by the UI.
#[derive(Debug, Clone, Default)]
pub struct StreamingState {
    pub is_streaming: bool,
    pub stream_complete: bool,
    pub stream_error: bool,
    pub text_buffer: String,
    pub error_message: String,
}

/// Terminal outcome of one request. Published once by the worker, then
/// read and cleared by its consumer.
#[derive(Debug, Clone)]
pub struct PendingResult {
    pub success: bool,
    pub report_text: String,
    pub actions_json: String,
}

#[derive(Default)]
pub struct SharedState {
    phase: Mutex<AnalysisPhase>,
    streaming: Mutex<StreamingState>,
    result: Mutex<Option<PendingResult>>,
    cancelled: AtomicBool,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> AnalysisPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_phase(&self, phase: AnalysisPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Reset per-request state before a new workflow starts.
    pub fn begin_request(&self, phase: AnalysisPhase) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.set_phase(phase);
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = None;
        *self.streaming.lock().unwrap_or_else(PoisonError::into_inner) = StreamingState::default();
    }

    pub fn begin_streaming(&self) {
        let mut s = self.streaming.lock().unwrap_or_else(PoisonError::into_inner);
        *s = StreamingState {
            is_streaming: true,
            ..StreamingState::default()
        };
    }

    pub fn append_stream_text(&self, text: &str) {
        self.streaming
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .text_buffer
            .push_str(text);
    }

    pub fn complete_streaming(&self, success: bool, error: &str) {
        let mut s = self.streaming.lock().unwrap_or_else(PoisonError::into_inner);
        s.is_streaming = false;
        s.stream_complete = true;
        s.stream_error = !success;
        s.error_message = error.to_string();
    }

    /// Snapshot of the streaming region; `None` when no stream is active or
    /// finished (nothing for the UI to show).
    pub fn streaming(&self) -> Option<StreamingState> {
        let s = self.streaming.lock().unwrap_or_else(PoisonError::into_inner);
        if !s.is_streaming && !s.stream_complete {
            return None;
        }
        Some(s.clone())
    }

    pub fn clear_streaming(&self) {
        *self.streaming.lock().unwrap_or_else(PoisonError::into_inner) = StreamingState::default();
    }

    /// Publish the terminal outcome of a request and return the pipeline to
    /// idle.
    pub fn publish_result(&self, result: PendingResult) {
        self.set_phase(AnalysisPhase::Idle);
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
    }

    pub fn result(&self) -> Option<PendingResult> {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_result(&self) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Cooperative cancellation: workers check this at every streaming
    /// chunk and stop mutating shared state once set. The worker itself
    /// runs to completion silently.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.set_phase(AnalysisPhase::Idle);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_lifecycle() {
        let state = SharedState::new();
        assert!(state.streaming().is_none());

        state.begin_streaming();
        state.append_stream_text("hello ");
        state.append_stream_text("world");

        let snap = state.streaming().expect("active stream");
        assert!(snap.is_streaming);
        assert_eq!(snap.text_buffer, "hello world");

        state.complete_streaming(true, "");
        let snap = state.streaming().expect("completed stream");
        assert!(!snap.is_streaming);
        assert!(snap.stream_complete);
        assert!(!snap.stream_error);

        state.clear_streaming();
        assert!(state.streaming().is_none());
    }

    #[test]
    fn result_is_read_and_cleared() {
        let state = SharedState::new();
        assert!(state.result().is_none());

        state.set_phase(AnalysisPhase::CallingRemote);
        state.publish_result(PendingResult {
            success: true,
            report_text: "sounds great".into(),
            actions_json: String::new(),
        });

        // Publishing returns the phase to idle.
        assert_eq!(state.phase(), AnalysisPhase::Idle);
        assert!(state.result().expect("result").success);

        state.clear_result();
        assert!(state.result().is_none());
    }

    #[test]
    fn begin_request_resets_previous_run() {
        let state = SharedState::new();
        state.begin_streaming();
        state.append_stream_text("stale");
        state.publish_result(PendingResult {
            success: false,
            report_text: "old".into(),
            actions_json: String::new(),
        });
        state.cancel();

        state.begin_request(AnalysisPhase::Rendering);
        assert_eq!(state.phase(), AnalysisPhase::Rendering);
        assert!(state.result().is_none());
        assert!(state.streaming().is_none());
        assert!(!state.is_cancelled());
    }
}
