//! Channel and sample-rate conversion between device formats and the
//! fixed mono rates the live stream uses.

use super::frame::i16_to_f32;

/// Average interleaved channels down to mono floats.
pub fn downmix_to_mono(interleaved: &[i16], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.iter().map(|&s| i16_to_f32(s)).collect();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            i16_to_f32((sum / channels as i32) as i16)
        })
        .collect()
}

/// Duplicate mono samples across `channels` interleaved outputs.
pub fn upmix_from_mono(mono: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return mono.to_vec();
    }
    let mut out = Vec::with_capacity(mono.len() * channels);
    for &s in mono {
        out.extend(std::iter::repeat_n(s, channels));
    }
    out
}

/// Streaming linear-interpolation resampler for mono floats.
///
/// Keeps the fractional read position and last input sample across calls so
/// consecutive chunks join without clicks.
pub struct LinearResampler {
    step: f64,
    position: f64,
    last: f32,
}

impl LinearResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            step: input_rate as f64 / output_rate.max(1) as f64,
            position: 0.0,
            last: 0.0,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.step == 1.0
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return input.to_vec();
        }
        let mut out = Vec::with_capacity((input.len() as f64 / self.step) as usize + 1);
        // position is relative to `last`, which sits at index -1
        while self.position < input.len() as f64 {
            let idx = self.position.floor() as isize - 1;
            let frac = (self.position - self.position.floor()) as f32;
            let a = if idx < 0 { self.last } else { input[idx as usize] };
            let b = input[(idx + 1) as usize];
            out.push(a + (b - a) * frac);
            self.position += self.step;
        }
        self.position -= input.len() as f64;
        if let Some(&tail) = input.last() {
            self.last = tail;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_is_averaged() {
        let mono = downmix_to_mono(&[16384, 0, -16384, -16384], 2);
        assert_eq!(mono, vec![0.25, -0.5]);
    }

    #[test]
    fn mono_passes_through_downmix() {
        assert_eq!(downmix_to_mono(&[0, -32768], 1), vec![0.0, -1.0]);
    }

    #[test]
    fn upmix_duplicates_samples() {
        assert_eq!(upmix_from_mono(&[1, 2], 2), vec![1, 1, 2, 2]);
        assert_eq!(upmix_from_mono(&[1, 2], 1), vec![1, 2]);
    }

    #[test]
    fn same_rate_is_passthrough() {
        let mut r = LinearResampler::new(16_000, 16_000);
        assert_eq!(r.process(&[0.1, 0.2]), vec![0.1, 0.2]);
    }

    #[test]
    fn downsampling_by_three_keeps_length_ratio() {
        let mut r = LinearResampler::new(48_000, 16_000);
        let mut total = 0;
        for _ in 0..10 {
            total += r.process(&[0.5; 480]).len();
        }
        assert_eq!(total, 1600);
    }

    #[test]
    fn upsampling_interpolates_between_samples() {
        let mut r = LinearResampler::new(8_000, 16_000);
        let out = r.process(&[1.0, 1.0]);
        assert_eq!(out.len(), 4);
        // first output leans on the zero-initialised history
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert_eq!(out[3], 1.0);
    }
}
