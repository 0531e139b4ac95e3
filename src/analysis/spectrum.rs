use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::Serialize;

use super::{db_to_linear, linear_to_db, DB_FLOOR};

/// Local maxima below this level are not reported as peaks.
pub const PEAK_THRESHOLD_DB: f32 = -60.0;
const MAX_PEAKS: usize = 20;
const MAX_RESONANCES: usize = 10;

/// Standard 1/3 octave center frequencies (ISO).
pub const THIRD_OCTAVE_FREQS: [f32; 31] = [
    20.0, 25.0, 31.5, 40.0, 50.0, 63.0, 80.0, 100.0, 125.0, 160.0, 200.0, 250.0, 315.0, 400.0,
    500.0, 630.0, 800.0, 1000.0, 1250.0, 1600.0, 2000.0, 2500.0, 3150.0, 4000.0, 5000.0, 6300.0,
    8000.0, 10000.0, 12500.0, 16000.0, 20000.0,
];

/// The seven mixing bands, exhaustive and non-overlapping over 20-20000 Hz.
/// Lower edge inclusive, upper edge exclusive; the last band includes 20 kHz.
pub const BAND_RANGES: [(f32, f32); 7] = [
    (20.0, 60.0),      // sub
    (60.0, 250.0),     // bass
    (250.0, 500.0),    // low mid
    (500.0, 2000.0),   // mid
    (2000.0, 4000.0),  // high mid
    (4000.0, 6000.0),  // presence
    (6000.0, 20000.0), // brilliance
];

/// Which of the seven bands a frequency falls into, if any.
pub fn band_index(freq: f32) -> Option<usize> {
    BAND_RANGES
        .iter()
        .position(|&(lo, hi)| freq >= lo && (freq < hi || (hi == 20000.0 && freq <= hi)))
}

/// Averaged magnitude spectrum in dB.
#[derive(Clone, Debug, Default)]
pub struct Spectrum {
    pub frequencies: Vec<f32>,
    pub magnitudes: Vec<f32>,
    pub window_size: usize,
}

/// RMS level per mixing band, in dB.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct BandLevels {
    pub sub: f32,
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub high_mid: f32,
    pub presence: f32,
    pub brilliance: f32,
}

impl Default for BandLevels {
    fn default() -> Self {
        Self {
            sub: DB_FLOOR,
            bass: DB_FLOOR,
            low_mid: DB_FLOOR,
            mid: DB_FLOOR,
            high_mid: DB_FLOOR,
            presence: DB_FLOOR,
            brilliance: DB_FLOOR,
        }
    }
}

impl BandLevels {
    pub fn as_array(&self) -> [f32; 7] {
        [
            self.sub,
            self.bass,
            self.low_mid,
            self.mid,
            self.high_mid,
            self.presence,
            self.brilliance,
        ]
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct EqProfile {
    pub frequencies: Vec<f32>,
    pub magnitudes: Vec<f32>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct SpectralPeak {
    pub frequency: f32,
    pub magnitude: f32,
    pub q: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResonanceKind {
    RoomMode,
    Ringing,
    Resonance,
}

/// A narrow peak that stands out enough from the overall EQ profile to be
/// worth pointing at. `magnitude` is the prominence over the mean EQ level.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Resonance {
    pub frequency: f32,
    pub magnitude: f32,
    pub q: f32,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub kind: ResonanceKind,
}

/// Eight scalar descriptors of the spectrum shape.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct SpectralFeatures {
    pub spectral_centroid: f32,
    pub spectral_rolloff: f32,
    pub spectral_slope: f32,
    pub spectral_flatness: f32,
    pub spectral_contrast: f32,
    pub low_freq_energy: f32,
    pub mid_freq_energy: f32,
    pub high_freq_energy: f32,
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

/// Average the magnitude spectrum over Hann-windowed frames (hop = window/2).
///
/// Frames are independent, so the FFT fans out across cores; each rayon task
/// gets its own planner.
pub fn compute_spectrum(mono: &[f32], sample_rate: u32, window: usize) -> Spectrum {
    if window == 0 {
        return Spectrum::default();
    }

    let num_bins = window / 2 + 1;
    let frequencies: Vec<f32> = (0..num_bins)
        .map(|i| i as f32 * sample_rate as f32 / window as f32)
        .collect();

    if mono.len() < window {
        return Spectrum {
            frequencies,
            magnitudes: vec![DB_FLOOR; num_bins],
            window_size: window,
        };
    }

    let hann = hann_window(window);
    let hop = window / 2;
    let starts: Vec<usize> = (0..=mono.len() - window).step_by(hop).collect();

    let frame_mags: Vec<Vec<f32>> = starts
        .par_iter()
        .map(|&start| {
            let mut buf: Vec<Complex<f32>> = mono[start..start + window]
                .iter()
                .enumerate()
                .map(|(i, &s)| Complex::new(s * hann[i], 0.0))
                .collect();

            let mut planner = FftPlanner::<f32>::new();
            let fft = planner.plan_fft_forward(window);
            fft.process(&mut buf);

            buf[..num_bins].iter().map(|c| c.norm()).collect()
        })
        .collect();

    let num_frames = frame_mags.len() as f32;
    let norm = window as f32 / 2.0;
    let magnitudes: Vec<f32> = (0..num_bins)
        .map(|bin| {
            let avg = frame_mags.iter().map(|f| f[bin]).sum::<f32>() / num_frames;
            linear_to_db(avg / norm)
        })
        .collect();

    Spectrum {
        frequencies,
        magnitudes,
        window_size: window,
    }
}

/// RMS-in-dB of the linear-energy average of each band's bins.
pub fn compute_bands(spectrum: &Spectrum) -> BandLevels {
    let mut energy = [0.0f64; 7];
    let mut count = [0usize; 7];

    for (freq, mag) in spectrum.frequencies.iter().zip(&spectrum.magnitudes) {
        if let Some(b) = band_index(*freq) {
            let linear = db_to_linear(*mag) as f64;
            energy[b] += linear * linear;
            count[b] += 1;
        }
    }

    let level = |b: usize| -> f32 {
        if count[b] > 0 {
            linear_to_db((energy[b] / count[b] as f64).sqrt() as f32)
        } else {
            DB_FLOOR
        }
    };

    BandLevels {
        sub: level(0),
        bass: level(1),
        low_mid: level(2),
        mid: level(3),
        high_mid: level(4),
        presence: level(5),
        brilliance: level(6),
    }
}

/// 1/3-octave profile over the ISO centers; edges are center * 2^(+-1/6).
pub fn compute_eq_profile(spectrum: &Spectrum) -> EqProfile {
    let ratio = 2.0f32.powf(1.0 / 6.0);
    let mut magnitudes = Vec::with_capacity(THIRD_OCTAVE_FREQS.len());

    for &center in &THIRD_OCTAVE_FREQS {
        let lo = center / ratio;
        let hi = center * ratio;

        let mut energy = 0.0f64;
        let mut count = 0usize;
        for (freq, mag) in spectrum.frequencies.iter().zip(&spectrum.magnitudes) {
            if *freq >= lo && *freq <= hi {
                let linear = db_to_linear(*mag) as f64;
                energy += linear * linear;
                count += 1;
            }
        }

        magnitudes.push(if count > 0 {
            linear_to_db((energy / count as f64).sqrt() as f32)
        } else {
            DB_FLOOR
        });
    }

    EqProfile {
        frequencies: THIRD_OCTAVE_FREQS.to_vec(),
        magnitudes,
    }
}

/// Strict local maxima above `threshold_db`, loudest first, capped at 20.
/// Q is estimated from the -3 dB bandwidth around the peak.
pub fn detect_peaks(spectrum: &Spectrum, threshold_db: f32) -> Vec<SpectralPeak> {
    let mags = &spectrum.magnitudes;
    let freqs = &spectrum.frequencies;
    if mags.len() < 3 {
        return Vec::new();
    }

    let mut peaks = Vec::new();
    for i in 1..mags.len() - 1 {
        if mags[i] > threshold_db && mags[i] > mags[i - 1] && mags[i] > mags[i + 1] {
            let target = mags[i] - 3.0;
            let mut left = i;
            while left > 0 && mags[left] > target {
                left -= 1;
            }
            let mut right = i;
            while right < mags.len() - 1 && mags[right] > target {
                right += 1;
            }

            let bandwidth = freqs[right] - freqs[left];
            let q = if bandwidth > 0.0 {
                freqs[i] / bandwidth
            } else {
                10.0
            };

            peaks.push(SpectralPeak {
                frequency: freqs[i],
                magnitude: mags[i],
                q,
            });
        }
    }

    peaks.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
    peaks.truncate(MAX_PEAKS);
    peaks
}

/// A peak qualifies as a resonance when its Q exceeds 5 and it stands more
/// than 6 dB proud of the mean EQ level.
pub fn detect_resonances(peaks: &[SpectralPeak], eq_mags: &[f32]) -> Vec<Resonance> {
    let mean_level = if eq_mags.is_empty() {
        DB_FLOOR
    } else {
        eq_mags.iter().sum::<f32>() / eq_mags.len() as f32
    };

    let mut out = Vec::new();
    for peak in peaks {
        let prominence = peak.magnitude - mean_level;
        if peak.q <= 5.0 || prominence <= 6.0 {
            continue;
        }

        let severity = if prominence > 12.0 || peak.q > 20.0 {
            Severity::High
        } else if prominence > 9.0 || peak.q > 12.0 {
            Severity::Medium
        } else {
            Severity::Low
        };

        let kind = if peak.frequency < 100.0 {
            ResonanceKind::RoomMode
        } else if peak.q > 15.0 {
            ResonanceKind::Ringing
        } else {
            ResonanceKind::Resonance
        };

        out.push(Resonance {
            frequency: peak.frequency,
            magnitude: prominence,
            q: peak.q,
            severity,
            kind,
        });
        if out.len() >= MAX_RESONANCES {
            break;
        }
    }
    out
}

pub fn compute_features(spectrum: &Spectrum) -> SpectralFeatures {
    let freqs = &spectrum.frequencies;
    let mags = &spectrum.magnitudes;
    let mut features = SpectralFeatures::default();
    if freqs.is_empty() {
        return features;
    }

    let mut total_energy = 0.0f64;
    let mut weighted = 0.0f64;
    let mut low = 0.0f64;
    let mut mid = 0.0f64;
    let mut high = 0.0f64;

    for (freq, mag) in freqs.iter().zip(mags) {
        let linear = db_to_linear(*mag) as f64;
        let energy = linear * linear;
        total_energy += energy;
        weighted += *freq as f64 * energy;

        if *freq < 250.0 {
            low += energy;
        } else if *freq < 4000.0 {
            mid += energy;
        } else {
            high += energy;
        }
    }

    if total_energy > 0.0 {
        features.spectral_centroid = (weighted / total_energy) as f32;
        features.low_freq_energy = (low / total_energy * 100.0) as f32;
        features.mid_freq_energy = (mid / total_energy * 100.0) as f32;
        features.high_freq_energy = (high / total_energy * 100.0) as f32;

        // 85% energy rolloff
        let threshold = total_energy * 0.85;
        let mut cumulative = 0.0f64;
        for (freq, mag) in freqs.iter().zip(mags) {
            let linear = db_to_linear(*mag) as f64;
            cumulative += linear * linear;
            if cumulative >= threshold {
                features.spectral_rolloff = *freq;
                break;
            }
        }
    }

    // Slope: linear regression of dB against log2(frequency), skipping the
    // DC region and anything at the noise floor.
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    let mut sum_xy = 0.0f64;
    let mut sum_x2 = 0.0f64;
    let mut n = 0u32;
    for (freq, mag) in freqs.iter().zip(mags) {
        if *freq > 20.0 && *mag > -90.0 {
            let x = (*freq as f64).log2();
            let y = *mag as f64;
            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            sum_x2 += x * x;
            n += 1;
        }
    }
    if n > 2 {
        let nf = n as f64;
        let denom = nf * sum_x2 - sum_x * sum_x;
        if denom.abs() > f64::EPSILON {
            features.spectral_slope = ((nf * sum_xy - sum_x * sum_y) / denom) as f32;
        }
    }

    // Flatness: geometric over arithmetic mean of linear magnitudes.
    let mut log_sum = 0.0f64;
    let mut lin_sum = 0.0f64;
    let mut count = 0u32;
    for mag in mags {
        let linear = db_to_linear(*mag) as f64;
        if linear > 0.0 {
            log_sum += linear.ln();
            lin_sum += linear;
            count += 1;
        }
    }
    if count > 0 && lin_sum > 0.0 {
        let geometric = (log_sum / count as f64).exp();
        let arithmetic = lin_sum / count as f64;
        features.spectral_flatness = (geometric / arithmetic) as f32;
    }

    // Contrast: mean of the loudest decile of bins minus the quietest decile.
    let mut sorted: Vec<f32> = mags.clone();
    sorted.sort_by(f32::total_cmp);
    let decile = (sorted.len() / 10).max(1);
    let bottom: f32 = sorted[..decile].iter().sum::<f32>() / decile as f32;
    let top: f32 = sorted[sorted.len() - decile..].iter().sum::<f32>() / decile as f32;
    features.spectral_contrast = top - bottom;

    features
}
