use crate::audio::buffer::AudioBuffer;

use super::level::{self, Dynamics, Loudness, StereoImage, Transients};
use super::spectrum::{
    self, BandLevels, EqProfile, Resonance, SpectralFeatures, SpectralPeak, Spectrum,
    PEAK_THRESHOLD_DB,
};

/// Immutable parameters for one analysis request.
#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    /// FFT window size; hop is half of this.
    pub window_size: usize,
    /// Read-window cap in seconds, for cost control.
    pub max_seconds: f32,
    /// Force a fresh decode of the backing file before reading samples.
    pub fresh_decode: bool,
    pub analyze_spectrum: bool,
    pub analyze_resonances: bool,
    pub analyze_spectral_features: bool,
    pub analyze_loudness: bool,
    pub analyze_dynamics: bool,
    pub analyze_stereo: bool,
    pub analyze_transients: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: 4096,
            max_seconds: 30.0,
            fresh_decode: true,
            analyze_spectrum: true,
            analyze_resonances: true,
            analyze_spectral_features: true,
            analyze_loudness: true,
            analyze_dynamics: true,
            analyze_stereo: true,
            analyze_transients: true,
        }
    }
}

/// Aggregate of all sub-analyses. Immutable once produced; failures are
/// carried as data (`success` + `error`), never as a panic.
#[derive(Clone, Debug, Default)]
pub struct AnalysisResult {
    pub success: bool,
    pub error: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub length_secs: f32,
    pub spectrum: Spectrum,
    pub bands: BandLevels,
    pub eq_profile: EqProfile,
    pub peaks: Vec<SpectralPeak>,
    pub resonances: Vec<Resonance>,
    pub features: SpectralFeatures,
    pub loudness: Loudness,
    pub dynamics: Dynamics,
    pub stereo: StereoImage,
    pub transients: Transients,
}

impl AnalysisResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            ..Self::default()
        }
    }
}

/// Run every enabled sub-analysis over an in-memory buffer.
///
/// Pure and thread-agnostic: no I/O, no shared state. Individual
/// sub-analyses degrade to zeroed defaults on degenerate input instead of
/// failing the whole result.
pub fn analyze(buffer: &AudioBuffer, config: &AnalysisConfig) -> AnalysisResult {
    if buffer.is_empty() {
        return AnalysisResult::failed("no audio samples to analyze");
    }
    if buffer.sample_rate == 0 || buffer.channels == 0 {
        return AnalysisResult::failed("audio buffer has invalid format metadata");
    }

    let mut result = AnalysisResult {
        success: true,
        sample_rate: buffer.sample_rate,
        channels: buffer.channels,
        length_secs: buffer.duration_secs(),
        ..AnalysisResult::default()
    };

    log::debug!(
        "analyzing {} frames, {} Hz, {} ch, {:.2}s",
        buffer.frames(),
        buffer.sample_rate,
        buffer.channels,
        result.length_secs
    );

    if config.analyze_spectrum {
        let mono = buffer.mono_mixdown();
        result.spectrum = spectrum::compute_spectrum(&mono, buffer.sample_rate, config.window_size);
        result.bands = spectrum::compute_bands(&result.spectrum);
        result.eq_profile = spectrum::compute_eq_profile(&result.spectrum);
        result.peaks = spectrum::detect_peaks(&result.spectrum, PEAK_THRESHOLD_DB);

        if config.analyze_resonances && !result.peaks.is_empty() {
            result.resonances =
                spectrum::detect_resonances(&result.peaks, &result.eq_profile.magnitudes);
        }

        if config.analyze_spectral_features {
            result.features = spectrum::compute_features(&result.spectrum);
        }
    }

    if config.analyze_loudness {
        result.loudness = level::compute_loudness(&buffer.samples);
    }

    if config.analyze_dynamics {
        result.dynamics = level::compute_dynamics(&buffer.samples);
    }

    if config.analyze_stereo {
        if let Some(image) = level::compute_stereo(&buffer.samples, buffer.channels) {
            result.stereo = image;
        }
    }

    if config.analyze_transients {
        result.transients =
            level::compute_transients(&buffer.samples, buffer.sample_rate, buffer.channels);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_sine(freq: f32, amplitude: f32, secs: f32, sample_rate: u32) -> AudioBuffer {
        let n = (secs * sample_rate as f32) as usize;
        let mut samples = Vec::with_capacity(n * 2);
        for i in 0..n {
            let s = amplitude
                * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin();
            samples.push(s);
            samples.push(s);
        }
        AudioBuffer::new(samples, sample_rate, 2)
    }

    #[test]
    fn sine_scenario() {
        // 2s, 1 kHz sine at -6 dBFS, 44100 Hz, stereo.
        let buffer = stereo_sine(1000.0, 0.5, 2.0, 44100);
        let result = analyze(&buffer, &AnalysisConfig::default());

        assert!(result.success);
        let levels = result.bands.as_array();
        let max = levels.iter().copied().fold(f32::MIN, f32::max);
        assert_eq!(result.bands.mid, max);

        let bin_width = 44100.0 / 4096.0;
        assert!((result.features.spectral_centroid - 1000.0).abs() < 4.0 * bin_width);
        assert!((result.length_secs - 2.0).abs() < 0.01);
    }

    #[test]
    fn silence_scenario() {
        let buffer = AudioBuffer::new(vec![0.0; 88200], 44100, 2);
        let result = analyze(&buffer, &AnalysisConfig::default());

        assert!(result.success);
        assert_eq!(result.loudness.rms, -96.0);
        assert!(result.peaks.is_empty());
        assert!(result.resonances.is_empty());
    }

    #[test]
    fn empty_buffer_fails_with_message() {
        let buffer = AudioBuffer::new(Vec::new(), 44100, 2);
        let result = analyze(&buffer, &AnalysisConfig::default());
        assert!(!result.success);
        assert!(!result.error.is_empty());
    }

    #[test]
    fn toggles_skip_sub_analyses() {
        let buffer = stereo_sine(440.0, 0.5, 0.5, 44100);
        let config = AnalysisConfig {
            analyze_spectrum: false,
            analyze_loudness: false,
            ..AnalysisConfig::default()
        };
        let result = analyze(&buffer, &config);
        assert!(result.success);
        assert!(result.spectrum.magnitudes.is_empty());
        assert!(result.peaks.is_empty());
        assert_eq!(result.loudness.rms, -96.0);
        // Dynamics still ran.
        assert!(result.dynamics.crest_factor > 0.0);
    }

    #[test]
    fn mono_input_keeps_zeroed_stereo() {
        let buffer = AudioBuffer::new(vec![0.5; 44100], 44100, 1);
        let result = analyze(&buffer, &AnalysisConfig::default());
        assert!(result.success);
        assert_eq!(result.stereo.width, 0.0);
        assert_eq!(result.stereo.correlation, 0.0);
    }
}
