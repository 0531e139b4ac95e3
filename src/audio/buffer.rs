/// Owned, decoded audio: interleaved f32 samples plus format metadata.
///
/// Produced by sample acquisition on the confined thread and moved into a
/// worker thread for analysis. Invariants: `samples.len()` is a multiple of
/// `channels`, `sample_rate > 0`, `channels >= 1`.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u32) -> Self {
        debug_assert!(sample_rate > 0);
        debug_assert!(channels >= 1);
        debug_assert_eq!(samples.len() % channels.max(1) as usize, 0);
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Number of sample frames (one sample per channel each).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Average all channels down to a mono signal.
    pub fn mono_mixdown(&self) -> Vec<f32> {
        let ch = self.channels as usize;
        if ch == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    }
}
