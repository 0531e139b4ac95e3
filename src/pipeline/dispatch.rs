//! Background analysis and report dispatch.
//!
//! One detached worker per request. The worker owns the moved audio buffer,
//! runs the engine, and talks to the remote service; everything it tells
//! the rest of the system goes through [`SharedState`] and the command
//! inbox. It never holds a host reference.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::analysis::{engine, report};
use crate::audio::buffer::AudioBuffer;
use crate::remote::InferenceClient;

use super::acquire::AcquireError;
use super::command::{AnalyzeRequest, CleanupTarget, CommandInbox};
use super::state::{AnalysisPhase, PendingResult, SharedState};

pub struct DispatchJob {
    pub acquisition: Result<AudioBuffer, AcquireError>,
    pub request: AnalyzeRequest,
    pub cleanup: Option<CleanupTarget>,
}

/// Spawn the worker thread for one request. The handle is returned for
/// embedders that want to join on shutdown; the scheduler just drops it.
pub fn spawn(
    job: DispatchJob,
    shared: Arc<SharedState>,
    inbox: Arc<CommandInbox>,
    client: Arc<dyn InferenceClient>,
) -> JoinHandle<()> {
    thread::spawn(move || run(job, &shared, &inbox, client.as_ref()))
}

/// Worker body, callable inline for deterministic tests.
pub fn run(
    job: DispatchJob,
    shared: &SharedState,
    inbox: &CommandInbox,
    client: &dyn InferenceClient,
) {
    let queue_cleanup = |inbox: &CommandInbox| {
        if let Some(target) = job.cleanup {
            inbox.push(target.into_command());
        }
    };

    let buffer = match &job.acquisition {
        Ok(buffer) => buffer,
        Err(e) => {
            log::error!("sample acquisition failed: {e}");
            queue_cleanup(inbox);
            shared.publish_result(PendingResult {
                success: false,
                report_text: format!("Failed to read audio samples: {e}"),
                actions_json: String::new(),
            });
            return;
        }
    };

    log::info!(
        "running analysis on {} frames ({} ch) for '{}'",
        buffer.frames(),
        buffer.channels,
        job.request.context.track_name
    );

    let result = engine::analyze(buffer, &job.request.config);
    if !result.success {
        log::error!("analysis failed: {}", result.error);
        queue_cleanup(inbox);
        shared.publish_result(PendingResult {
            success: false,
            report_text: format!("Analysis failed: {}", result.error),
            actions_json: String::new(),
        });
        return;
    }

    let report_json = match report::render(&result) {
        Ok(json) => json,
        Err(e) => {
            queue_cleanup(inbox);
            shared.publish_result(PendingResult {
                success: false,
                report_text: format!("Failed to serialize analysis report: {e}"),
                actions_json: String::new(),
            });
            return;
        }
    };

    // Cleanup goes into the queue before the network call on purpose: a
    // hung remote call must never delay restoring the track's takes.
    queue_cleanup(inbox);

    shared.set_phase(AnalysisPhase::CallingRemote);
    shared.begin_streaming();

    let context_json = serde_json::to_string(&job.request.context).unwrap_or_else(|e| {
        log::warn!("context serialization failed: {e}");
        String::new()
    });

    // The UI may drain and clear the shared buffer at any point, so the
    // final result is assembled from this local copy.
    let mut accumulated = String::new();
    let mut on_chunk = |text: &str| -> bool {
        if shared.is_cancelled() {
            return false;
        }
        accumulated.push_str(text);
        shared.append_stream_text(text);
        true
    };

    let outcome = client.generate(
        &report_json,
        &context_json,
        &job.request.context.user_query,
        &mut on_chunk,
    );

    if shared.is_cancelled() {
        log::debug!("request cancelled; worker exiting silently");
        return;
    }

    match outcome {
        Ok(()) => {
            shared.complete_streaming(true, "");
            shared.publish_result(PendingResult {
                success: true,
                report_text: accumulated,
                actions_json: String::new(),
            });
        }
        Err(e) => {
            let message = e.to_string();
            log::error!("remote call failed: {message}");
            shared.complete_streaming(false, &message);
            shared.publish_result(PendingResult {
                success: false,
                report_text: message,
                actions_json: String::new(),
            });
        }
    }
}
