use std::sync::{Mutex, PoisonError};

use crate::analysis::engine::AnalysisConfig;
use crate::host::{FxInfo, TakeIndex, TrackIndex};

use super::readiness::StabilityProbe;

/// Everything the remote service needs to know about where the audio came
/// from, carried alongside the request from enqueue to dispatch.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RequestContext {
    pub track_index: TrackIndex,
    pub track_name: String,
    pub track_type: String,
    /// Sent to the remote service as its own message, not inside the
    /// context object.
    #[serde(skip)]
    pub user_query: String,
    pub existing_fx: Vec<FxInfo>,
}

#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    pub context: RequestContext,
    pub config: AnalysisConfig,
}

/// What to remove once the rendered audio has been consumed: the rendered
/// take for an in-place bounce, or the whole temporary track for a
/// master-stem render.
#[derive(Debug, Clone, Copy)]
pub enum CleanupTarget {
    Take { track: TrackIndex, take: TakeIndex },
    Track { track: TrackIndex },
}

impl CleanupTarget {
    pub fn into_command(self) -> PendingCommand {
        match self {
            CleanupTarget::Take { track, take } => PendingCommand::DeleteTake { track, take },
            CleanupTarget::Track { track } => PendingCommand::DeleteTrack { track },
        }
    }
}

/// One queued host operation. Commands live in the scheduler queue, are
/// stepped once per tick, and are removed when they complete; a command
/// that cannot finish yet re-queues itself by spending defer budget.
#[derive(Debug)]
pub enum PendingCommand {
    /// Apply-FX render of a track's item; optionally chains an analyze.
    RenderItem {
        track: TrackIndex,
        follow_up: Option<AnalyzeRequest>,
    },
    /// Wait for the rendered file to stabilize, then acquire samples and
    /// hand them to a worker.
    AnalyzeTrack {
        track: TrackIndex,
        take: TakeIndex,
        probe: StabilityProbe,
        defer_budget: u32,
        cleanup: CleanupTarget,
        request: AnalyzeRequest,
    },
    DeleteTake {
        track: TrackIndex,
        take: TakeIndex,
    },
    DeleteTrack {
        track: TrackIndex,
    },
}

impl PendingCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            PendingCommand::RenderItem { .. } => "render",
            PendingCommand::AnalyzeTrack { .. } => "analyze",
            PendingCommand::DeleteTake { .. } => "delete-take",
            PendingCommand::DeleteTrack { .. } => "delete-track",
        }
    }
}

/// Hand-off point for commands produced away from the scheduler's tick:
/// confined-thread entry points push here, and so do worker threads queueing
/// cleanup. The scheduler drains it at the top of each tick, which is what
/// makes mid-tick appends visible only on the next tick.
#[derive(Default)]
pub struct CommandInbox {
    queue: Mutex<Vec<PendingCommand>>,
}

impl CommandInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: PendingCommand) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }

    pub fn drain(&self) -> Vec<PendingCommand> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_drain_empties_in_order() {
        let inbox = CommandInbox::new();
        inbox.push(PendingCommand::DeleteTrack { track: 3 });
        inbox.push(PendingCommand::DeleteTake { track: 1, take: 2 });
        assert_eq!(inbox.len(), 2);

        let drained = inbox.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].kind(), "delete-track");
        assert_eq!(drained[1].kind(), "delete-take");
        assert!(inbox.is_empty());
    }
}
