//! Sample-accurate output timeline shared by a playback thread and the
//! session side of an output. Positions are frames at the output rate.

use std::collections::BTreeMap;
use std::time::Duration;

use super::frame::AudioFrame;
use super::scheduler::BufferId;

/// Nearest frame at `rate` for a point on the playback clock.
pub fn frame_at(at: Duration, rate: u32) -> u64 {
    ((at.as_nanos() * rate as u128 + 500_000_000) / 1_000_000_000) as u64
}

/// Playback clock reading for a frame position.
pub fn time_at(frame: u64, rate: u32) -> Duration {
    if rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos((frame as u128 * 1_000_000_000 / rate as u128) as u64)
}

#[derive(Default)]
pub struct Timeline {
    position: u64,
    buffers: BTreeMap<BufferId, (u64, AudioFrame)>,
}

impl Timeline {
    /// Frames rendered so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// End of the last placed buffer still pending, or the current position.
    fn tail(&self) -> u64 {
        self.buffers
            .values()
            .map(|(start, frame)| start + frame.len() as u64)
            .max()
            .unwrap_or(0)
            .max(self.position)
    }

    /// Place `frame` at `start` or, if that would overlap what is already
    /// pending or already rendered, right after it. Returns the start used.
    pub fn place(&mut self, id: BufferId, start: u64, frame: AudioFrame) -> u64 {
        let start = start.max(self.tail());
        self.buffers.insert(id, (start, frame));
        start
    }

    /// Drop a pending buffer, including the unplayed rest of one mid-render.
    pub fn remove(&mut self, id: BufferId) -> bool {
        self.buffers.remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    /// Render `len` frames starting at the current position and advance.
    pub fn render(&mut self, len: usize) -> Vec<i16> {
        let mut out = vec![0i16; len];
        let from = self.position;
        let to = from + len as u64;
        for (start, frame) in self.buffers.values() {
            let end = start + frame.len() as u64;
            if end <= from || *start >= to {
                continue;
            }
            for t in (*start).max(from)..end.min(to) {
                let slot = &mut out[(t - from) as usize];
                *slot = slot.saturating_add(frame.samples()[(t - start) as usize]);
            }
        }
        self.position = to;
        self.buffers
            .retain(|_, (start, frame)| *start + frame.len() as u64 > to);
        out
    }
}
