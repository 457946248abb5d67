use super::frame::AudioFrame;

/// Cuts a continuous capture stream into fixed-size frames.
///
/// The platform hands over samples in whatever period size it negotiated;
/// leftovers stay in the accumulation buffer until the next push.
pub struct Framer {
    frame_samples: usize,
    sample_rate: u32,
    accum_buf: Vec<f32>,
}

impl Framer {
    pub fn new(frame_samples: usize, sample_rate: u32) -> Self {
        let frame_samples = frame_samples.max(1);
        Self {
            frame_samples,
            sample_rate,
            accum_buf: Vec::with_capacity(frame_samples * 2),
        }
    }

    /// Append samples and return every frame completed by them, oldest first.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.accum_buf.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.accum_buf.len() >= self.frame_samples {
            frames.push(AudioFrame::from_f32(
                &self.accum_buf[..self.frame_samples],
                self.sample_rate,
            ));
            self.accum_buf.drain(..self.frame_samples);
        }
        frames
    }

    pub fn pending(&self) -> usize {
        self.accum_buf.len()
    }

    pub fn clear(&mut self) {
        self.accum_buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_only_complete_frames() {
        let mut framer = Framer::new(4, 16_000);
        assert!(framer.push(&[0.1, 0.2, 0.3]).is_empty());
        assert_eq!(framer.pending(), 3);

        let frames = framer.push(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(frames.len(), 2);
        assert_eq!(framer.pending(), 1);
        assert!(frames.iter().all(|f| f.len() == 4 && f.sample_rate() == 16_000));
    }

    #[test]
    fn frames_keep_capture_order() {
        let mut framer = Framer::new(2, 16_000);
        let frames = framer.push(&[0.0, 0.25, 0.5, 0.75]);
        assert!(frames[0].samples()[1] < frames[1].samples()[0]);
    }

    #[test]
    fn clear_discards_partial_frame() {
        let mut framer = Framer::new(4, 16_000);
        framer.push(&[0.1, 0.2]);
        framer.clear();
        assert_eq!(framer.pending(), 0);
        assert!(framer.push(&[0.3, 0.4]).is_empty());
    }
}
