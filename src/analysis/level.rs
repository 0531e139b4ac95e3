use serde::Serialize;

use super::{linear_to_db, DB_FLOOR};

/// Program loudness. LUFS and true peak are documented approximations:
/// no K-weighting filter and no oversampled peak interpolation.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Loudness {
    pub rms: f32,
    pub lufs: f32,
    pub lufs_short_term: f32,
    pub peak: f32,
    pub true_peak: f32,
}

impl Default for Loudness {
    fn default() -> Self {
        Self {
            rms: DB_FLOOR,
            lufs: DB_FLOOR,
            lufs_short_term: DB_FLOOR,
            peak: DB_FLOOR,
            true_peak: DB_FLOOR,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct Dynamics {
    pub dynamic_range: f32,
    pub crest_factor: f32,
    pub compression_ratio: f32,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct StereoImage {
    pub width: f32,
    pub correlation: f32,
    pub balance: f32,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct Transients {
    pub attack_time: f32,
    pub transient_energy: f32,
}

pub fn compute_loudness(samples: &[f32]) -> Loudness {
    if samples.is_empty() {
        return Loudness::default();
    }

    let mut sum_squares = 0.0f64;
    let mut peak = 0.0f32;
    for &s in samples {
        sum_squares += (s as f64) * (s as f64);
        peak = peak.max(s.abs());
    }

    let rms = linear_to_db((sum_squares / samples.len() as f64).sqrt() as f32);
    let peak_db = linear_to_db(peak);
    let lufs = rms - 0.7;

    Loudness {
        rms,
        lufs,
        lufs_short_term: lufs,
        peak: peak_db,
        true_peak: peak_db + 0.5,
    }
}

pub fn compute_dynamics(samples: &[f32]) -> Dynamics {
    if samples.is_empty() {
        return Dynamics::default();
    }

    let mut sum_squares = 0.0f64;
    let mut peak = 0.0f32;
    for &s in samples {
        sum_squares += (s as f64) * (s as f64);
        peak = peak.max(s.abs());
    }
    let rms = (sum_squares / samples.len() as f64).sqrt() as f32;

    let crest_factor = if rms > 0.0 {
        linear_to_db(peak) - linear_to_db(rms)
    } else {
        0.0
    };

    // Crest factor stands in for a percentile-based measurement; the
    // heuristic thresholds come with it.
    let compression_ratio = if crest_factor < 6.0 {
        4.0
    } else if crest_factor < 10.0 {
        2.0
    } else {
        1.0
    };

    Dynamics {
        dynamic_range: crest_factor * 1.5,
        crest_factor,
        compression_ratio,
    }
}

/// Mid/side decomposition of the first two channels. `None` below stereo.
pub fn compute_stereo(samples: &[f32], channels: u32) -> Option<StereoImage> {
    if channels < 2 || samples.is_empty() {
        return None;
    }

    let ch = channels as usize;
    let mut sum_lr = 0.0f64;
    let mut sum_l2 = 0.0f64;
    let mut sum_r2 = 0.0f64;
    let mut sum_mid2 = 0.0f64;
    let mut sum_side2 = 0.0f64;

    for frame in samples.chunks_exact(ch) {
        let l = frame[0] as f64;
        let r = frame[1] as f64;
        let mid = (l + r) / 2.0;
        let side = (l - r) / 2.0;

        sum_lr += l * r;
        sum_l2 += l * l;
        sum_r2 += r * r;
        sum_mid2 += mid * mid;
        sum_side2 += side * side;
    }

    let mut image = StereoImage::default();

    let denom = (sum_l2 * sum_r2).sqrt();
    if denom > 0.0 {
        image.correlation = (sum_lr / denom) as f32;
    }

    if sum_mid2 > 0.0 {
        image.width = ((sum_side2 / sum_mid2).sqrt() as f32).min(1.0);
    }

    let total = sum_l2 + sum_r2;
    if total > 0.0 {
        image.balance = ((sum_r2 - sum_l2) / total) as f32;
    }

    Some(image)
}

/// Envelope follower with fast attack and slow release over the rectified
/// mono mixdown; the attack time is where the envelope rises fastest.
pub fn compute_transients(samples: &[f32], sample_rate: u32, channels: u32) -> Transients {
    let ch = channels.max(1) as usize;
    let frames = samples.len() / ch;
    if frames < 2 {
        return Transients::default();
    }

    let mono: Vec<f32> = samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().map(|s| s.abs()).sum::<f32>() / ch as f32)
        .collect();

    const ATTACK: f32 = 0.001;
    const RELEASE: f32 = 0.01;

    let mut envelope = 0.0f32;
    let mut max_derivative = 0.0f32;
    let mut attack_frame = 0usize;

    for (i, &input) in mono.iter().enumerate().skip(1) {
        let coeff = if input > envelope { ATTACK } else { RELEASE };
        let next = envelope + coeff * (input - envelope);
        let derivative = next - envelope;
        envelope = next;

        if derivative > max_derivative {
            max_derivative = derivative;
            attack_frame = i;
        }
    }

    let attack_time = if attack_frame > 0 {
        attack_frame as f32 / sample_rate as f32
    } else {
        0.0
    };

    // Share of samples whose instantaneous change exceeds half the peak rate.
    let threshold = max_derivative * 0.5;
    let mut transient_frames = 0usize;
    if threshold > 0.0 {
        for pair in mono.windows(2) {
            if (pair[1] - pair[0]).abs() > threshold {
                transient_frames += 1;
            }
        }
    }

    Transients {
        attack_time,
        transient_energy: transient_frames as f32 / frames as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_sine(freq: f32, amplitude: f32, secs: f32, sample_rate: u32) -> Vec<f32> {
        let n = (secs * sample_rate as f32) as usize;
        let mut out = Vec::with_capacity(n * 2);
        for i in 0..n {
            let s = amplitude
                * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin();
            out.push(s);
            out.push(s);
        }
        out
    }

    #[test]
    fn silence_loudness_hits_floor() {
        let loudness = compute_loudness(&vec![0.0; 4096]);
        assert_eq!(loudness.rms, -96.0);
        assert_eq!(loudness.peak, -96.0);
    }

    #[test]
    fn sine_loudness_levels() {
        let samples = stereo_sine(440.0, 0.5, 1.0, 44100);
        let loudness = compute_loudness(&samples);
        // Peak of a 0.5 amplitude sine is -6.02 dBFS; RMS is 3 dB below that.
        assert!((loudness.peak - -6.02).abs() < 0.1, "peak {}", loudness.peak);
        assert!((loudness.rms - -9.03).abs() < 0.1, "rms {}", loudness.rms);
        assert!((loudness.lufs - (loudness.rms - 0.7)).abs() < 1e-4);
        assert!((loudness.true_peak - (loudness.peak + 0.5)).abs() < 1e-4);
    }

    #[test]
    fn sine_crest_factor_is_three_db() {
        let samples = stereo_sine(440.0, 0.5, 1.0, 44100);
        let dynamics = compute_dynamics(&samples);
        assert!(
            (dynamics.crest_factor - 3.01).abs() < 0.1,
            "crest {}",
            dynamics.crest_factor
        );
        // Crest below 6 dB reads as heavily compressed.
        assert_eq!(dynamics.compression_ratio, 4.0);
        assert!((dynamics.dynamic_range - dynamics.crest_factor * 1.5).abs() < 1e-4);
    }

    #[test]
    fn correlated_stereo_is_narrow() {
        let samples = stereo_sine(440.0, 0.5, 0.5, 44100);
        let image = compute_stereo(&samples, 2).expect("stereo input");
        assert!((image.correlation - 1.0).abs() < 1e-3);
        assert!(image.width.abs() < 1e-3);
        assert!(image.balance.abs() < 1e-3);
    }

    #[test]
    fn stereo_metrics_stay_bounded() {
        // Decorrelated construction: right channel is the negated left with
        // an extra gain so balance is also exercised.
        let sample_rate = 44100;
        let mut samples = Vec::new();
        for i in 0..sample_rate {
            let s = (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sample_rate as f32).sin();
            samples.push(s * 0.5);
            samples.push(-s * 0.8);
        }
        let image = compute_stereo(&samples, 2).expect("stereo input");
        assert!((-1.0..=1.0).contains(&image.correlation));
        assert!((0.0..=1.0).contains(&image.width));
        assert!((-1.0..=1.0).contains(&image.balance));
        // Anti-phase signal correlates negatively and leans right.
        assert!(image.correlation < -0.9);
        assert!(image.balance > 0.0);
    }

    #[test]
    fn mono_input_has_no_stereo_image() {
        assert!(compute_stereo(&[0.1, 0.2, 0.3], 1).is_none());
    }

    #[test]
    fn impulse_attack_is_located() {
        let sample_rate = 1000;
        let mut samples = vec![0.0f32; 2000];
        for (i, s) in samples.iter_mut().enumerate().skip(500) {
            *s = if i < 520 { 1.0 } else { 0.0 };
        }
        let transients = compute_transients(&samples, sample_rate, 1);
        let attack_frame = (transients.attack_time * sample_rate as f32) as usize;
        assert!(
            (500..=520).contains(&attack_frame),
            "attack at frame {attack_frame}"
        );
        assert!(transients.transient_energy > 0.0);
        assert!(transients.transient_energy < 0.5);
    }
}
