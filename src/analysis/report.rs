use serde::Serialize;

use super::engine::AnalysisResult;
use super::level::{Dynamics, Loudness, StereoImage, Transients};
use super::spectrum::{BandLevels, EqProfile, Resonance, SpectralFeatures, SpectralPeak};

/// Wire format consumed by the remote inference service. All magnitudes are
/// dB unless a field name says otherwise.
#[derive(Serialize)]
struct FullReport<'a> {
    success: bool,
    sample_rate: u32,
    channels: u32,
    length: f32,
    frequency_spectrum: FrequencySpectrum<'a>,
    resonances: &'a [Resonance],
    spectral_features: &'a SpectralFeatures,
    loudness: &'a Loudness,
    dynamics: &'a Dynamics,
    stereo: &'a StereoImage,
    transients: &'a Transients,
}

#[derive(Serialize)]
struct FrequencySpectrum<'a> {
    fft_size: usize,
    bands: &'a BandLevels,
    eq_profile: &'a EqProfile,
    peaks: &'a [SpectralPeak],
}

#[derive(Serialize)]
struct ErrorReport<'a> {
    success: bool,
    error: &'a str,
}

/// Serialize a result to the report JSON. A failed analysis emits only
/// `{success: false, error}`.
pub fn render(result: &AnalysisResult) -> Result<String, serde_json::Error> {
    if !result.success {
        return serde_json::to_string(&ErrorReport {
            success: false,
            error: &result.error,
        });
    }

    serde_json::to_string(&FullReport {
        success: true,
        sample_rate: result.sample_rate,
        channels: result.channels,
        length: result.length_secs,
        frequency_spectrum: FrequencySpectrum {
            fft_size: result.spectrum.window_size,
            bands: &result.bands,
            eq_profile: &result.eq_profile,
            peaks: &result.peaks,
        },
        resonances: &result.resonances,
        spectral_features: &result.features,
        loudness: &result.loudness,
        dynamics: &result.dynamics,
        stereo: &result.stereo,
        transients: &result.transients,
    })
}

/// Same report, indented for terminal output.
pub fn render_pretty(result: &AnalysisResult) -> Result<String, serde_json::Error> {
    let compact = render(result)?;
    let value: serde_json::Value = serde_json::from_str(&compact)?;
    serde_json::to_string_pretty(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::engine::{analyze, AnalysisConfig};
    use crate::audio::buffer::AudioBuffer;

    fn analyzed_sine() -> AnalysisResult {
        let sample_rate = 44100u32;
        let samples: Vec<f32> = (0..sample_rate as usize)
            .flat_map(|i| {
                let s = 0.5
                    * (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / sample_rate as f32).sin();
                [s, s]
            })
            .collect();
        analyze(&AudioBuffer::new(samples, sample_rate, 2), &AnalysisConfig::default())
    }

    #[test]
    fn report_shape_matches_contract() {
        let json = render(&analyzed_sine()).expect("serializable");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");

        assert_eq!(value["success"], true);
        assert_eq!(value["sample_rate"], 44100);
        assert_eq!(value["channels"], 2);

        let spectrum = &value["frequency_spectrum"];
        assert_eq!(spectrum["fft_size"], 4096);
        for band in ["sub", "bass", "low_mid", "mid", "high_mid", "presence", "brilliance"] {
            assert!(spectrum["bands"][band].is_number(), "missing band {band}");
        }
        assert!(spectrum["eq_profile"]["frequencies"].as_array().is_some_and(|a| a.len() == 31));
        assert!(spectrum["peaks"].as_array().is_some_and(|a| !a.is_empty()));
        assert!(spectrum["peaks"][0]["q"].is_number());

        for field in [
            "spectral_centroid",
            "spectral_rolloff",
            "spectral_slope",
            "spectral_flatness",
            "spectral_contrast",
            "low_freq_energy",
            "mid_freq_energy",
            "high_freq_energy",
        ] {
            assert!(value["spectral_features"][field].is_number(), "missing {field}");
        }

        assert!(value["loudness"]["lufs_short_term"].is_number());
        assert!(value["dynamics"]["crest_factor"].is_number());
        assert!(value["stereo"]["width"].is_number());
        assert!(value["transients"]["attack_time"].is_number());
        assert!(value["resonances"].is_array());
    }

    #[test]
    fn failed_result_emits_only_error() {
        let result = AnalysisResult {
            success: false,
            error: "no audio samples to analyze".into(),
            ..AnalysisResult::default()
        };
        let json = render(&result).expect("serializable");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "no audio samples to analyze");
        assert!(value.get("loudness").is_none());
    }

    #[test]
    fn resonance_kind_serializes_snake_case() {
        use crate::analysis::spectrum::{ResonanceKind, Severity};
        let res = Resonance {
            frequency: 60.0,
            magnitude: 14.0,
            q: 9.0,
            severity: Severity::High,
            kind: ResonanceKind::RoomMode,
        };
        let json = serde_json::to_string(&res).expect("serializable");
        assert!(json.contains("\"severity\":\"high\""));
        assert!(json.contains("\"type\":\"room_mode\""));
    }
}
