//! Tick-driven command scheduler for the confined thread.
//!
//! The host calls [`ConfinedExecutor::tick`] once per frame. Multi-step
//! work is paced across ticks instead of blocking: renders complete in one
//! tick, analyses defer until the rendered file stabilizes, and cleanup
//! commands queued by workers are picked up on the next tick.

use std::sync::Arc;

use crate::analysis::engine::AnalysisConfig;
use crate::host::{HostError, HostProject, TakeIndex, TimeRange, TrackIndex};
use crate::remote::InferenceClient;

use super::acquire::acquire_samples;
use super::command::{AnalyzeRequest, CleanupTarget, CommandInbox, PendingCommand, RequestContext};
use super::dispatch::{self, DispatchJob};
use super::readiness::StabilityProbe;
use super::state::{AnalysisPhase, SharedState};

/// What to bounce for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceTarget {
    Track(TrackIndex),
    Master,
}

/// How much of the timeline the bounce covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceMode {
    FullTrack,
    /// Requires an existing time selection.
    TimeSelection,
    /// Uses the loop range; falls back to the full track without one.
    Loop,
}

/// Tuning knobs that were empirically matched to host render latency; kept
/// configurable instead of hard-coded.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Consecutive identical size readings before a rendered file is ready.
    pub stable_reads: u32,
    /// Ticks an analyze command may defer before proceeding degraded.
    pub defer_budget: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            stable_reads: StabilityProbe::DEFAULT_REQUIRED,
            defer_budget: 100,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub processed: usize,
    pub deferred: usize,
    pub dropped: usize,
    pub remaining: usize,
}

enum Disposition {
    Done,
    Dropped,
    Defer(PendingCommand),
}

/// Owner of all host-bound references. Everything here runs on the host's
/// single confined thread; cross-thread traffic goes through the shared
/// state blocks and the command inbox, never through host handles.
pub struct ConfinedExecutor {
    host: Box<dyn HostProject>,
    shared: Arc<SharedState>,
    inbox: Arc<CommandInbox>,
    client: Arc<dyn InferenceClient>,
    queue: Vec<PendingCommand>,
    settings: SchedulerSettings,
    analysis_defaults: AnalysisConfig,
}

impl ConfinedExecutor {
    pub fn new(
        host: Box<dyn HostProject>,
        shared: Arc<SharedState>,
        client: Arc<dyn InferenceClient>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            host,
            shared,
            inbox: Arc::new(CommandInbox::new()),
            client,
            queue: Vec::new(),
            settings,
            analysis_defaults: AnalysisConfig::default(),
        }
    }

    pub fn set_analysis_defaults(&mut self, config: AnalysisConfig) {
        self.analysis_defaults = config;
    }

    pub fn shared(&self) -> Arc<SharedState> {
        self.shared.clone()
    }

    pub fn inbox(&self) -> Arc<CommandInbox> {
        self.inbox.clone()
    }

    pub fn host(&self) -> &dyn HostProject {
        self.host.as_ref()
    }

    /// Bounce a target and chain an analysis onto the rendered take.
    pub fn enqueue_render_workflow(
        &mut self,
        target: BounceTarget,
        mode: BounceMode,
        mut context: RequestContext,
    ) -> Result<(), HostError> {
        self.shared.begin_request(AnalysisPhase::Rendering);

        let outcome = (|| match target {
            BounceTarget::Track(track) => {
                let name = self.host.track_name(track)?;
                if context.track_name.is_empty() {
                    context.track_name = name;
                }
                context.track_index = track;
                self.apply_bounce_mode(mode)?;
                self.inbox.push(PendingCommand::RenderItem {
                    track,
                    follow_up: Some(AnalyzeRequest {
                        context,
                        config: self.analysis_defaults.clone(),
                    }),
                });
                Ok(())
            }
            BounceTarget::Master => {
                // The stem render happens right here on the confined thread;
                // the stem track already carries post-fader audio, so no
                // per-item render command is needed.
                let stem = self.host.render_master_stem()?;
                let take = self.host.active_take(stem)?;
                context.track_index = stem;
                if context.track_name.is_empty() {
                    context.track_name = "Master".to_string();
                }
                if context.track_type.is_empty() {
                    context.track_type = "master".to_string();
                }
                // The stem track is temporary; cleanup removes it whole.
                let command =
                    self.analyze_command(stem, take, CleanupTarget::Track { track: stem }, context);
                self.inbox.push(command);
                Ok(())
            }
        })();

        if outcome.is_err() {
            self.shared.set_phase(AnalysisPhase::Idle);
        }
        outcome
    }

    /// Analyze a track's current take without rendering first.
    pub fn enqueue_analyze_workflow(
        &mut self,
        track: TrackIndex,
        mut context: RequestContext,
    ) -> Result<(), HostError> {
        self.shared.begin_request(AnalysisPhase::RunningDsp);

        let outcome = (|| {
            let name = self.host.track_name(track)?;
            let take = self.host.active_take(track)?;
            if context.track_name.is_empty() {
                context.track_name = name;
            }
            context.track_index = track;
            let command =
                self.analyze_command(track, take, CleanupTarget::Take { track, take }, context);
            self.inbox.push(command);
            Ok(())
        })();

        if outcome.is_err() {
            self.shared.set_phase(AnalysisPhase::Idle);
        }
        outcome
    }

    /// Fan one render workflow out per track so their reports can be
    /// compared against each other.
    pub fn enqueue_compare_workflow(
        &mut self,
        tracks: &[TrackIndex],
        context: RequestContext,
    ) -> Result<(), HostError> {
        if tracks.len() < 2 {
            return Err(HostError::Unavailable(
                "comparison needs at least two tracks",
            ));
        }

        self.shared.begin_request(AnalysisPhase::Rendering);

        let mut names = Vec::with_capacity(tracks.len());
        for &track in tracks {
            names.push(self.host.track_name(track).map_err(|e| {
                self.shared.set_phase(AnalysisPhase::Idle);
                e
            })?);
        }

        for (i, &track) in tracks.iter().enumerate() {
            let mut ctx = context.clone();
            ctx.track_index = track;
            ctx.track_name = names[i].clone();
            ctx.track_type = format!("compare_track{}", i + 1);
            if ctx.user_query.is_empty() {
                let others: Vec<&str> = names
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .map(|(_, n)| n.as_str())
                    .collect();
                ctx.user_query = format!("Compare this track with {}", others.join(", "));
            }
            self.inbox.push(PendingCommand::RenderItem {
                track,
                follow_up: Some(AnalyzeRequest {
                    context: ctx,
                    config: self.analysis_defaults.clone(),
                }),
            });
        }
        Ok(())
    }

    /// Drain one frame's worth of work. Never blocks: anything that cannot
    /// finish now is deferred to a later tick. Commands pushed while this
    /// runs (by this tick's own processing or by workers) become visible on
    /// the next tick.
    pub fn tick(&mut self) -> TickReport {
        self.queue.extend(self.inbox.drain());
        if self.queue.is_empty() {
            return TickReport::default();
        }

        let mut report = TickReport::default();
        let mut kept: Vec<PendingCommand> = Vec::new();
        let mut next_tick: Vec<PendingCommand> = Vec::new();

        for command in std::mem::take(&mut self.queue) {
            match self.process(command, &mut next_tick) {
                Disposition::Done => report.processed += 1,
                Disposition::Dropped => report.dropped += 1,
                Disposition::Defer(command) => {
                    report.deferred += 1;
                    kept.push(command);
                }
            }
        }

        self.queue = kept;
        for command in next_tick {
            self.inbox.push(command);
        }
        report.remaining = self.queue.len() + self.inbox.len();
        report
    }

    fn analyze_command(
        &self,
        track: TrackIndex,
        take: TakeIndex,
        cleanup: CleanupTarget,
        context: RequestContext,
    ) -> PendingCommand {
        PendingCommand::AnalyzeTrack {
            track,
            take,
            probe: StabilityProbe::new(self.settings.stable_reads),
            defer_budget: self.settings.defer_budget,
            cleanup,
            request: AnalyzeRequest {
                context,
                config: self.analysis_defaults.clone(),
            },
        }
    }

    fn apply_bounce_mode(&mut self, mode: BounceMode) -> Result<(), HostError> {
        match mode {
            BounceMode::FullTrack => Ok(()),
            BounceMode::TimeSelection => {
                let selection = self
                    .host
                    .time_selection()
                    .filter(TimeRange::is_meaningful);
                if selection.is_none() {
                    return Err(HostError::Unavailable(
                        "time selection required but none set",
                    ));
                }
                Ok(())
            }
            BounceMode::Loop => {
                if self
                    .host
                    .time_selection()
                    .filter(TimeRange::is_meaningful)
                    .is_some()
                {
                    return Ok(());
                }
                if let Some(range) = self.host.loop_range().filter(TimeRange::is_meaningful) {
                    self.host.set_time_selection(Some(range));
                } else {
                    log::info!("no loop range set, bouncing the full track instead");
                }
                Ok(())
            }
        }
    }

    fn process(
        &mut self,
        command: PendingCommand,
        next_tick: &mut Vec<PendingCommand>,
    ) -> Disposition {
        match command {
            PendingCommand::RenderItem { track, follow_up } => {
                self.process_render(track, follow_up, next_tick)
            }
            PendingCommand::AnalyzeTrack {
                track,
                take,
                probe,
                defer_budget,
                cleanup,
                request,
            } => self.process_analyze(track, take, probe, defer_budget, cleanup, request),
            PendingCommand::DeleteTake { track, take } => {
                if let Err(e) = self.host.delete_take(track, take) {
                    log::warn!("take cleanup failed: {e}");
                } else {
                    log::debug!("deleted rendered take {take} on track {track}");
                }
                Disposition::Done
            }
            PendingCommand::DeleteTrack { track } => {
                if let Err(e) = self.host.delete_track(track) {
                    log::warn!("track cleanup failed: {e}");
                } else {
                    log::debug!("deleted track {track}");
                }
                Disposition::Done
            }
        }
    }

    fn process_render(
        &mut self,
        track: TrackIndex,
        follow_up: Option<AnalyzeRequest>,
        next_tick: &mut Vec<PendingCommand>,
    ) -> Disposition {
        let track_name = match self.host.track_name(track) {
            Ok(name) => name,
            Err(e) => {
                log::warn!("dropping render command: {e}");
                return Disposition::Dropped;
            }
        };
        let take = match self.host.active_take(track) {
            Ok(take) => take,
            Err(e) => {
                log::warn!("dropping render command for '{track_name}': {e}");
                return Disposition::Dropped;
            }
        };

        // A nameless take yields a garbage render filename on some hosts;
        // give it one before rendering.
        match self.host.take_name(track, take) {
            Ok(name) if name.is_empty() => {
                let fallback = if track_name.is_empty() {
                    format!("Track_{}", track + 1)
                } else {
                    track_name.clone()
                };
                if let Err(e) = self.host.set_take_name(track, take, &fallback) {
                    log::warn!("could not name take before render: {e}");
                } else {
                    log::debug!("set default take name '{fallback}'");
                }
            }
            Err(e) => log::warn!("could not read take name: {e}"),
            _ => {}
        }

        match self.host.render_track_item(track) {
            Ok(new_take) => {
                log::info!("rendered track {track} ('{track_name}') into take {new_take}");
                if let Some(mut request) = follow_up {
                    if request.context.track_name.is_empty() {
                        request.context.track_name = track_name;
                    }
                    next_tick.push(PendingCommand::AnalyzeTrack {
                        track,
                        take: new_take,
                        probe: StabilityProbe::new(self.settings.stable_reads),
                        defer_budget: self.settings.defer_budget,
                        cleanup: CleanupTarget::Take {
                            track,
                            take: new_take,
                        },
                        request,
                    });
                }
                Disposition::Done
            }
            Err(e) => {
                log::error!("render failed on track {track} ('{track_name}'): {e}");
                Disposition::Dropped
            }
        }
    }

    fn process_analyze(
        &mut self,
        track: TrackIndex,
        take: TakeIndex,
        mut probe: StabilityProbe,
        defer_budget: u32,
        cleanup: CleanupTarget,
        mut request: AnalyzeRequest,
    ) -> Disposition {
        self.shared.set_phase(AnalysisPhase::RunningDsp);

        let size = self
            .host
            .source_path(track, take)
            .ok()
            .and_then(|path| std::fs::metadata(path).ok())
            .map(|meta| meta.len())
            .unwrap_or(0);
        let ready = probe.observe(size);

        if !ready {
            if defer_budget > 0 {
                return Disposition::Defer(PendingCommand::AnalyzeTrack {
                    track,
                    take,
                    probe,
                    defer_budget: defer_budget - 1,
                    cleanup,
                    request,
                });
            }
            log::warn!(
                "rendered file for track {track} never stabilized, analyzing it anyway"
            );
        } else {
            log::debug!(
                "rendered file for track {track} ready ({size} bytes, {} stable reads)",
                probe.stable_reads()
            );
        }

        // FX context and the sample read both need host access, so they
        // happen here; everything after this point runs off-thread.
        request.context.existing_fx = self.host.track_fx(track);
        let acquisition = acquire_samples(self.host.as_mut(), track, take, &request.config);

        let job = DispatchJob {
            acquisition,
            request,
            cleanup: Some(cleanup),
        };
        let _worker = dispatch::spawn(
            job,
            self.shared.clone(),
            self.inbox.clone(),
            self.client.clone(),
        );
        Disposition::Done
    }
}
