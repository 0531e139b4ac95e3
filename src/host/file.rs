//! File-backed host implementation.
//!
//! Used by the CLI harness and the integration tests. Tracks wrap decoded
//! audio files; a "render" materializes a new take as a real WAV on disk so
//! the readiness poller has something to stat. Freshly rendered takes start
//! with a stale decode cache, which the acquisition path clears by swapping
//! in a fresh source and invalidating the cache, same dance as a real host.

use std::path::{Path, PathBuf};

use crate::audio::buffer::AudioBuffer;
use crate::audio::decode;

use super::{
    FxInfo, HostError, HostProject, ReadStatus, SourceId, SourceInfo, TakeIndex, TimeRange,
    TrackIndex,
};

struct SourceData {
    path: PathBuf,
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u32,
}

struct FileTake {
    name: String,
    source: SourceId,
    cache_stale: bool,
}

struct FileTrack {
    name: String,
    takes: Vec<FileTake>,
    active: usize,
    fx: Vec<FxInfo>,
}

pub struct FileProject {
    tracks: Vec<FileTrack>,
    sources: Vec<SourceData>,
    render_dir: PathBuf,
    render_counter: usize,
    time_selection: Option<TimeRange>,
    loop_range: Option<TimeRange>,
}

impl FileProject {
    pub fn new(render_dir: impl Into<PathBuf>) -> Self {
        Self {
            tracks: Vec::new(),
            sources: Vec::new(),
            render_dir: render_dir.into(),
            render_counter: 0,
            time_selection: None,
            loop_range: None,
        }
    }

    /// Register a track whose take points at an existing audio file.
    pub fn add_file_track(
        &mut self,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        buffer: AudioBuffer,
    ) -> TrackIndex {
        let source = self.push_source(path.into(), buffer);
        self.push_track(name.into(), source)
    }

    /// Register a track from an in-memory buffer; the backing WAV is written
    /// into the render directory so size polling works.
    pub fn add_track(
        &mut self,
        name: impl Into<String>,
        buffer: AudioBuffer,
    ) -> Result<TrackIndex, HostError> {
        let name = name.into();
        let path = self.next_render_path(&name);
        write_wav(&path, &buffer)?;
        let source = self.push_source(path, buffer);
        Ok(self.push_track(name, source))
    }

    pub fn set_track_fx(&mut self, track: TrackIndex, fx: Vec<FxInfo>) {
        if let Some(t) = self.tracks.get_mut(track) {
            t.fx = fx;
        }
    }

    pub fn set_loop_range(&mut self, range: Option<TimeRange>) {
        self.loop_range = range;
    }

    fn push_source(&mut self, path: PathBuf, buffer: AudioBuffer) -> SourceId {
        self.sources.push(SourceData {
            path,
            samples: buffer.samples,
            sample_rate: buffer.sample_rate,
            channels: buffer.channels,
        });
        SourceId(self.sources.len() - 1)
    }

    fn push_track(&mut self, name: String, source: SourceId) -> TrackIndex {
        self.tracks.push(FileTrack {
            takes: vec![FileTake {
                name: name.clone(),
                source,
                cache_stale: false,
            }],
            name,
            active: 0,
            fx: Vec::new(),
        });
        self.tracks.len() - 1
    }

    fn next_render_path(&mut self, base: &str) -> PathBuf {
        self.render_counter += 1;
        let stem: String = base
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.render_dir.join(format!("{}-{:03}.wav", stem, self.render_counter))
    }

    fn track(&self, track: TrackIndex) -> Result<&FileTrack, HostError> {
        self.tracks.get(track).ok_or(HostError::TrackNotFound(track))
    }

    fn track_mut(&mut self, track: TrackIndex) -> Result<&mut FileTrack, HostError> {
        self.tracks
            .get_mut(track)
            .ok_or(HostError::TrackNotFound(track))
    }

    fn take(&self, track: TrackIndex, take: TakeIndex) -> Result<&FileTake, HostError> {
        self.track(track)?
            .takes
            .get(take)
            .ok_or(HostError::TakeNotFound { track, take })
    }

    fn source(&self, id: SourceId) -> &SourceData {
        &self.sources[id.0]
    }
}

impl HostProject for FileProject {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_name(&self, track: TrackIndex) -> Result<String, HostError> {
        Ok(self.track(track)?.name.clone())
    }

    fn project_length(&self) -> f64 {
        self.tracks
            .iter()
            .filter_map(|t| t.takes.get(t.active))
            .map(|take| {
                let src = self.source(take.source);
                src.samples.len() as f64 / (src.sample_rate as f64 * src.channels as f64)
            })
            .fold(0.0, f64::max)
    }

    fn time_selection(&self) -> Option<TimeRange> {
        self.time_selection
    }

    fn loop_range(&self) -> Option<TimeRange> {
        self.loop_range
    }

    fn set_time_selection(&mut self, range: Option<TimeRange>) {
        self.time_selection = range;
    }

    fn active_take(&self, track: TrackIndex) -> Result<TakeIndex, HostError> {
        let t = self.track(track)?;
        if t.takes.is_empty() {
            return Err(HostError::NoItems(track));
        }
        Ok(t.active)
    }

    fn take_name(&self, track: TrackIndex, take: TakeIndex) -> Result<String, HostError> {
        Ok(self.take(track, take)?.name.clone())
    }

    fn set_take_name(
        &mut self,
        track: TrackIndex,
        take: TakeIndex,
        name: &str,
    ) -> Result<(), HostError> {
        self.take(track, take)?;
        self.tracks[track].takes[take].name = name.to_string();
        Ok(())
    }

    fn render_track_item(&mut self, track: TrackIndex) -> Result<TakeIndex, HostError> {
        let (base, source_id) = {
            let t = self.track(track)?;
            let take = t
                .takes
                .get(t.active)
                .ok_or(HostError::NoItems(track))?;
            (take.name.clone(), take.source)
        };

        // "Apply FX" renders the active take's audio to a new file-backed
        // take. FileProject has no real FX chain, so the render is identity.
        let src = self.source(source_id);
        let buffer = AudioBuffer::new(src.samples.clone(), src.sample_rate, src.channels);

        let path = self.next_render_path(&base);
        write_wav(&path, &buffer)?;

        let new_source = self.push_source(path, buffer);
        let t = self.track_mut(track)?;
        t.takes.push(FileTake {
            name: format!("{base} (rendered)"),
            source: new_source,
            cache_stale: true,
        });
        t.active = t.takes.len() - 1;
        Ok(t.active)
    }

    fn render_master_stem(&mut self) -> Result<TrackIndex, HostError> {
        let first = self
            .tracks
            .first()
            .ok_or(HostError::Unavailable("master stem render on empty project"))?;
        let reference = self.source(first.takes[first.active].source);
        let sample_rate = reference.sample_rate;
        let channels = reference.channels;

        let mut mix: Vec<f32> = Vec::new();
        for t in &self.tracks {
            let Some(take) = t.takes.get(t.active) else {
                continue;
            };
            let src = self.source(take.source);
            if src.sample_rate != sample_rate || src.channels != channels {
                log::warn!(
                    "skipping track '{}' in master stem: format mismatch",
                    t.name
                );
                continue;
            }
            if src.samples.len() > mix.len() {
                mix.resize(src.samples.len(), 0.0);
            }
            for (acc, s) in mix.iter_mut().zip(&src.samples) {
                *acc += s;
            }
        }

        let buffer = AudioBuffer::new(mix, sample_rate, channels);
        let path = self.next_render_path("master_stem");
        write_wav(&path, &buffer)?;
        let source = self.push_source(path, buffer);
        Ok(self.push_track("Master Stem".to_string(), source))
    }

    fn source_path(&self, track: TrackIndex, take: TakeIndex) -> Result<PathBuf, HostError> {
        Ok(self.source(self.take(track, take)?.source).path.clone())
    }

    fn source_info(&self, track: TrackIndex, take: TakeIndex) -> Result<SourceInfo, HostError> {
        let src = self.source(self.take(track, take)?.source);
        Ok(SourceInfo {
            sample_rate: src.sample_rate,
            channels: src.channels,
            duration_secs: src.samples.len() as f64
                / (src.sample_rate as f64 * src.channels.max(1) as f64),
        })
    }

    fn create_source_from_file(&mut self, path: &Path) -> Result<SourceId, HostError> {
        let buffer = decode::decode_file(path).map_err(|e| HostError::Source(e.to_string()))?;
        Ok(self.push_source(path.to_path_buf(), buffer))
    }

    fn swap_take_source(
        &mut self,
        track: TrackIndex,
        take: TakeIndex,
        source: SourceId,
    ) -> Result<SourceId, HostError> {
        self.take(track, take)?;
        let slot = &mut self.tracks[track].takes[take];
        let previous = slot.source;
        slot.source = source;
        slot.cache_stale = false;
        Ok(previous)
    }

    fn invalidate_source_cache(&mut self, track: TrackIndex, take: TakeIndex) {
        if let Some(t) = self.tracks.get_mut(track) {
            if let Some(slot) = t.takes.get_mut(take) {
                slot.cache_stale = false;
            }
        }
    }

    fn read_source_samples(
        &mut self,
        track: TrackIndex,
        take: TakeIndex,
        frames: usize,
    ) -> Result<(ReadStatus, Vec<f32>), HostError> {
        let slot = self.take(track, take)?;
        if slot.cache_stale {
            // A real host hands back silence from a stale decode cache; we
            // make the failure explicit instead.
            return Ok((ReadStatus::NoAudio, Vec::new()));
        }
        let src = self.source(slot.source);
        if src.samples.is_empty() {
            return Ok((ReadStatus::NoAudio, Vec::new()));
        }
        let wanted = frames * src.channels as usize;
        if wanted > src.samples.len() {
            return Ok((ReadStatus::Error, Vec::new()));
        }
        Ok((ReadStatus::Success, src.samples[..wanted].to_vec()))
    }

    fn delete_take(&mut self, track: TrackIndex, take: TakeIndex) -> Result<(), HostError> {
        let t = self.track_mut(track)?;
        if take >= t.takes.len() {
            return Err(HostError::TakeNotFound { track, take });
        }
        if t.takes.len() <= 1 {
            log::debug!("only one take on track {track}, skipping take deletion");
            return Ok(());
        }
        t.takes.remove(take);
        t.active = 0;
        Ok(())
    }

    fn delete_track(&mut self, track: TrackIndex) -> Result<(), HostError> {
        if track >= self.tracks.len() {
            return Err(HostError::TrackNotFound(track));
        }
        self.tracks.remove(track);
        Ok(())
    }

    fn track_fx(&self, track: TrackIndex) -> Vec<FxInfo> {
        self.tracks.get(track).map(|t| t.fx.clone()).unwrap_or_default()
    }
}

fn write_wav(path: &Path, buffer: &AudioBuffer) -> Result<(), HostError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| HostError::RenderFailed(e.to_string()))?;
    }
    let spec = hound::WavSpec {
        channels: buffer.channels as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| HostError::RenderFailed(e.to_string()))?;
    for &s in &buffer.samples {
        writer
            .write_sample(s)
            .map_err(|e| HostError::RenderFailed(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| HostError::RenderFailed(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(secs: f32) -> AudioBuffer {
        let n = (secs * 8000.0) as usize;
        let samples = (0..n * 2)
            .map(|i| (i as f32 * 0.01).sin() * 0.25)
            .collect();
        AudioBuffer::new(samples, 8000, 2)
    }

    #[test]
    fn render_creates_take_and_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = FileProject::new(dir.path());
        let track = project.add_track("Drums", tone(0.5)).expect("add track");

        let take = project.render_track_item(track).expect("render");
        assert_eq!(take, 1);
        assert_eq!(project.active_take(track).expect("active"), 1);

        let path = project.source_path(track, take).expect("path");
        assert!(path.exists());
        assert!(std::fs::metadata(&path).expect("metadata").len() > 0);
    }

    #[test]
    fn rendered_take_reads_stale_until_invalidated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = FileProject::new(dir.path());
        let track = project.add_track("Bass", tone(0.5)).expect("add track");
        let take = project.render_track_item(track).expect("render");

        let (status, _) = project.read_source_samples(track, take, 100).expect("read");
        assert_eq!(status, ReadStatus::NoAudio);

        project.invalidate_source_cache(track, take);
        let (status, samples) = project.read_source_samples(track, take, 100).expect("read");
        assert_eq!(status, ReadStatus::Success);
        assert_eq!(samples.len(), 200);
    }

    #[test]
    fn swap_restores_previous_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = FileProject::new(dir.path());
        let track = project.add_track("Keys", tone(0.25)).expect("add track");
        let take = project.render_track_item(track).expect("render");

        let path = project.source_path(track, take).expect("path");
        let fresh = project.create_source_from_file(&path).expect("decode");
        let previous = project.swap_take_source(track, take, fresh).expect("swap");

        let (status, _) = project.read_source_samples(track, take, 10).expect("read");
        assert_eq!(status, ReadStatus::Success);

        let swapped_back = project.swap_take_source(track, take, previous).expect("swap");
        assert_eq!(swapped_back, fresh);
    }

    #[test]
    fn delete_take_keeps_last_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = FileProject::new(dir.path());
        let track = project.add_track("Vox", tone(0.25)).expect("add track");

        // Single take survives deletion.
        project.delete_take(track, 0).expect("delete");
        assert_eq!(project.active_take(track).expect("active"), 0);

        let rendered = project.render_track_item(track).expect("render");
        project.delete_take(track, rendered).expect("delete");
        assert_eq!(project.active_take(track).expect("active"), 0);
    }

    #[test]
    fn master_stem_mixes_all_tracks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = FileProject::new(dir.path());
        project.add_track("A", tone(0.25)).expect("add");
        project.add_track("B", tone(0.5)).expect("add");

        let stem = project.render_master_stem().expect("stem");
        assert_eq!(stem, 2);
        let info = project.source_info(stem, 0).expect("info");
        assert!((info.duration_secs - 0.5).abs() < 0.01);
    }
}
