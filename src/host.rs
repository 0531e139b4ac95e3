pub mod file;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub type TrackIndex = usize;
pub type TakeIndex = usize;

/// Errors surfaced by a host implementation. A failed host call drops the
/// command that issued it; the rest of the queue keeps going.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("host operation not available: {0}")]
    Unavailable(&'static str),
    #[error("track {0} not found")]
    TrackNotFound(TrackIndex),
    #[error("track {0} has no media items")]
    NoItems(TrackIndex),
    #[error("take {take} not found on track {track}")]
    TakeNotFound { track: TrackIndex, take: TakeIndex },
    #[error("render failed: {0}")]
    RenderFailed(String),
    #[error("source error: {0}")]
    Source(String),
}

/// Status of a bounded sample read. Only `Success` means the returned
/// buffer may be analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Success,
    NoAudio,
    Error,
}

#[derive(Debug, Clone, Copy)]
pub struct SourceInfo {
    pub sample_rate: u32,
    pub channels: u32,
    pub duration_secs: f64,
}

/// Opaque handle to a decodable source owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// Ranges shorter than 100 ms are treated as no selection at all.
    pub fn is_meaningful(&self) -> bool {
        self.length() > 0.1
    }
}

/// Effect summary attached to the remote request context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FxInfo {
    pub name: String,
    pub enabled: bool,
}

/// The host surface the pipeline is allowed to touch, and only from the
/// confined thread. Implementations own every host-bound reference; nothing
/// returned here may cross into a worker.
pub trait HostProject {
    fn track_count(&self) -> usize;
    fn track_name(&self, track: TrackIndex) -> Result<String, HostError>;
    fn project_length(&self) -> f64;

    fn time_selection(&self) -> Option<TimeRange>;
    fn loop_range(&self) -> Option<TimeRange>;
    fn set_time_selection(&mut self, range: Option<TimeRange>);

    fn active_take(&self, track: TrackIndex) -> Result<TakeIndex, HostError>;
    fn take_name(&self, track: TrackIndex, take: TakeIndex) -> Result<String, HostError>;
    fn set_take_name(
        &mut self,
        track: TrackIndex,
        take: TakeIndex,
        name: &str,
    ) -> Result<(), HostError>;

    /// Apply track FX to the item as a new take; returns the new take index.
    fn render_track_item(&mut self, track: TrackIndex) -> Result<TakeIndex, HostError>;

    /// Materialize the master bus as a stem track; returns its index.
    fn render_master_stem(&mut self) -> Result<TrackIndex, HostError>;

    fn source_path(&self, track: TrackIndex, take: TakeIndex) -> Result<PathBuf, HostError>;
    fn source_info(&self, track: TrackIndex, take: TakeIndex) -> Result<SourceInfo, HostError>;

    /// Build a fresh source handle by decoding the file at `path`.
    fn create_source_from_file(&mut self, path: &Path) -> Result<SourceId, HostError>;

    /// Swap a take's source, returning the previous handle so the caller can
    /// restore it.
    fn swap_take_source(
        &mut self,
        track: TrackIndex,
        take: TakeIndex,
        source: SourceId,
    ) -> Result<SourceId, HostError>;

    /// Drop any cached decode state for the take's source.
    fn invalidate_source_cache(&mut self, track: TrackIndex, take: TakeIndex);

    /// Read up to `frames` interleaved sample frames from the take's source.
    fn read_source_samples(
        &mut self,
        track: TrackIndex,
        take: TakeIndex,
        frames: usize,
    ) -> Result<(ReadStatus, Vec<f32>), HostError>;

    fn delete_take(&mut self, track: TrackIndex, take: TakeIndex) -> Result<(), HostError>;
    fn delete_track(&mut self, track: TrackIndex) -> Result<(), HostError>;

    fn track_fx(&self, track: TrackIndex) -> Vec<FxInfo>;
}
