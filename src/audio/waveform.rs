//! Waveform levels for the live visualizer.

/// Which side of the conversation a waveform belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Microphone audio sent to the remote.
    Outbound,
    /// Synthesized audio received for playback.
    Inbound,
}

/// Split `samples` into `bars` buckets and return each bucket's peak in `[0, 1]`.
pub fn peak_bars(samples: &[i16], bars: usize) -> Vec<f32> {
    if bars == 0 {
        return Vec::new();
    }
    if samples.is_empty() {
        return vec![0.0; bars];
    }
    (0..bars)
        .map(|i| {
            let start = i * samples.len() / bars;
            let end = ((i + 1) * samples.len() / bars).max(start + 1).min(samples.len());
            samples[start..end]
                .iter()
                .map(|&s| (s as i32).unsigned_abs())
                .max()
                .map_or(0.0, |peak| (peak as f32 / 32768.0).min(1.0))
        })
        .collect()
}

/// Root-mean-square level in `[0, 1]`.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / 32768.0;
            v * v
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}
