//! Sample acquisition: pull decoded samples out of the host into an owned
//! buffer. Confined-thread only; the buffer is then moved to a worker.

use thiserror::Error;

use crate::analysis::engine::AnalysisConfig;
use crate::audio::buffer::AudioBuffer;
use crate::host::{HostError, HostProject, ReadStatus, TakeIndex, TrackIndex};

/// Hard ceiling on the read window, independent of configuration.
pub const MAX_ANALYSIS_SECS: f32 = 30.0;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("source reported no decodable audio")]
    NoAudio,
    #[error("host sample read failed")]
    ReadFailed,
    #[error("source window is empty")]
    EmptyWindow,
}

/// Read a bounded window of interleaved samples from a take.
///
/// When `fresh_decode` is set, a new source handle is built from the backing
/// file and swapped in for the duration of the read; rendered files are
/// otherwise prone to serving a stale pre-render cache. The swapped source
/// is restored on every path before this returns.
pub fn acquire_samples(
    host: &mut dyn HostProject,
    track: TrackIndex,
    take: TakeIndex,
    config: &AnalysisConfig,
) -> Result<AudioBuffer, AcquireError> {
    let path = host.source_path(track, take)?;

    let mut swapped_out = None;
    if config.fresh_decode {
        match host.create_source_from_file(&path) {
            Ok(fresh) => match host.swap_take_source(track, take, fresh) {
                Ok(previous) => swapped_out = Some(previous),
                Err(e) => log::warn!("could not swap in fresh source: {e}"),
            },
            Err(e) => log::warn!("fresh decode of {} unavailable: {e}", path.display()),
        }
    }

    host.invalidate_source_cache(track, take);

    let outcome = read_window(host, track, take, config);

    if let Some(previous) = swapped_out {
        if let Err(e) = host.swap_take_source(track, take, previous) {
            log::warn!("failed to restore original source: {e}");
        }
    }

    outcome
}

fn read_window(
    host: &mut dyn HostProject,
    track: TrackIndex,
    take: TakeIndex,
    config: &AnalysisConfig,
) -> Result<AudioBuffer, AcquireError> {
    let info = host.source_info(track, take)?;

    let cap = config.max_seconds.min(MAX_ANALYSIS_SECS) as f64;
    let duration = info.duration_secs.min(cap);
    let frames = (duration * info.sample_rate as f64) as usize;
    if frames == 0 {
        return Err(AcquireError::EmptyWindow);
    }

    log::debug!(
        "acquiring {frames} frames ({duration:.2}s) from track {track} take {take}"
    );

    let (status, samples) = host.read_source_samples(track, take, frames)?;
    match status {
        ReadStatus::Success => {
            debug_assert_eq!(samples.len(), frames * info.channels as usize);
            Ok(AudioBuffer::new(samples, info.sample_rate, info.channels))
        }
        ReadStatus::NoAudio => Err(AcquireError::NoAudio),
        ReadStatus::Error => Err(AcquireError::ReadFailed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::file::FileProject;

    fn long_tone(secs: f32, sample_rate: u32) -> AudioBuffer {
        let n = (secs * sample_rate as f32) as usize;
        AudioBuffer::new(vec![0.1; n * 2], sample_rate, 2)
    }

    #[test]
    fn read_window_is_capped_at_thirty_seconds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = FileProject::new(dir.path());
        let track = project.add_track("Long", long_tone(45.0, 8000)).expect("add");

        let config = AnalysisConfig {
            max_seconds: 60.0, // asks for more than the hard cap
            fresh_decode: false,
            ..AnalysisConfig::default()
        };
        let buffer = acquire_samples(&mut project, track, 0, &config).expect("acquire");
        assert_eq!(buffer.frames(), 8000 * 30);
    }

    #[test]
    fn config_can_narrow_the_window_further() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = FileProject::new(dir.path());
        let track = project.add_track("Long", long_tone(10.0, 8000)).expect("add");

        let config = AnalysisConfig {
            max_seconds: 2.0,
            fresh_decode: false,
            ..AnalysisConfig::default()
        };
        let buffer = acquire_samples(&mut project, track, 0, &config).expect("acquire");
        assert_eq!(buffer.frames(), 8000 * 2);
    }

    #[test]
    fn cache_invalidation_unsticks_a_fresh_render() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = FileProject::new(dir.path());
        let track = project.add_track("Drums", long_tone(1.0, 8000)).expect("add");
        let take = project.render_track_item(track).expect("render");

        // The rendered take starts with a stale cache; acquisition always
        // invalidates, so even the no-swap path reads successfully.
        let config = AnalysisConfig {
            fresh_decode: false,
            ..AnalysisConfig::default()
        };
        let buffer = acquire_samples(&mut project, track, take, &config).expect("acquire");
        assert_eq!(buffer.frames(), 8000);
    }

    #[test]
    fn fresh_decode_swaps_and_restores() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = FileProject::new(dir.path());
        let track = project.add_track("Keys", long_tone(1.0, 8000)).expect("add");
        let take = project.render_track_item(track).expect("render");

        let config = AnalysisConfig::default();
        let buffer = acquire_samples(&mut project, track, take, &config).expect("acquire");
        assert_eq!(buffer.sample_rate, 8000);
        assert_eq!(buffer.channels, 2);
        assert_eq!(buffer.frames(), 8000);

        // Source was restored: reading again still works against the
        // original handle.
        let buffer2 = acquire_samples(&mut project, track, take, &config).expect("acquire");
        assert_eq!(buffer2.frames(), buffer.frames());
    }

    #[test]
    fn missing_take_is_a_host_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = FileProject::new(dir.path());
        let err = acquire_samples(&mut project, 0, 0, &AnalysisConfig::default())
            .expect_err("no such track");
        assert!(matches!(err, AcquireError::Host(_)));
    }
}
