//! Gapless playback scheduling against a monotonic output clock.
//!
//! Each inbound chunk starts at `max(next_start_time, now)` and pushes
//! `next_start_time` forward by its duration, so bursty delivery plays back
//! to back and late delivery inserts silence instead of overlapping.

use std::collections::BTreeMap;
use std::time::Duration;

pub type BufferId = u64;

/// A buffer placed on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledBuffer {
    pub id: BufferId,
    pub start: Duration,
    pub end: Duration,
}

impl ScheduledBuffer {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start_time: Duration,
    active: BTreeMap<BufferId, ScheduledBuffer>,
    next_id: BufferId,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_start_time(&self) -> Duration {
        self.next_start_time
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Place a buffer of `duration` on the timeline.
    pub fn schedule(&mut self, duration: Duration, now: Duration) -> ScheduledBuffer {
        self.reap(now);
        let start = self.next_start_time.max(now);
        let buffer = ScheduledBuffer {
            id: self.next_id,
            start,
            end: start + duration,
        };
        self.next_id += 1;
        self.next_start_time = buffer.end;
        self.active.insert(buffer.id, buffer);
        buffer
    }

    /// Barge-in: drop every unfinished buffer and restart the timeline at `now`.
    ///
    /// Returns the buffers the output must stop.
    pub fn interrupt(&mut self, now: Duration) -> Vec<ScheduledBuffer> {
        self.reap(now);
        self.next_start_time = now;
        std::mem::take(&mut self.active).into_values().collect()
    }

    /// Forget buffers that finished playing by `now`.
    pub fn reap(&mut self, now: Duration) -> usize {
        let before = self.active.len();
        self.active.retain(|_, b| b.end > now);
        before - self.active.len()
    }

    /// Teardown: hand back everything still scheduled.
    pub fn clear(&mut self) -> Vec<ScheduledBuffer> {
        std::mem::take(&mut self.active).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn back_to_back_chunks_do_not_overlap() {
        let mut s = PlaybackScheduler::new();
        let durations = [120, 40, 500, 1, 300, 75];
        let mut now = ms(10);
        let mut prev: Option<ScheduledBuffer> = None;
        for (i, d) in durations.iter().enumerate() {
            // clock advances irregularly, sometimes past the queued audio
            now += ms((i as u64 * 37) % 200);
            let b = s.schedule(ms(*d), now);
            assert!(b.start >= now);
            if let Some(p) = prev {
                assert!(b.start >= p.end);
                assert!(b.start >= p.start);
            }
            prev = Some(b);
        }
    }

    #[test]
    fn two_chunks_span_exactly_their_sum() {
        let mut s = PlaybackScheduler::new();
        let now = ms(1000);
        let a = s.schedule(ms(500), now);
        let b = s.schedule(ms(300), now);
        assert_eq!(a.end, b.start);
        assert_eq!(b.end - a.start, ms(800));
        assert_eq!(s.next_start_time(), now + ms(800));
    }

    #[test]
    fn late_delivery_inserts_silence() {
        let mut s = PlaybackScheduler::new();
        let a = s.schedule(ms(100), ms(0));
        let b = s.schedule(ms(100), ms(250));
        assert_eq!(a.end, ms(100));
        assert_eq!(b.start, ms(250));
    }

    #[test]
    fn interrupt_stops_backlog_and_resets_timeline() {
        let mut s = PlaybackScheduler::new();
        for _ in 0..3 {
            s.schedule(ms(400), ms(0));
        }
        let stopped = s.interrupt(ms(100));
        assert_eq!(stopped.len(), 3);
        assert_eq!(s.active_len(), 0);
        assert_eq!(s.next_start_time(), ms(100));

        let next = s.schedule(ms(50), ms(100));
        assert!(next.start <= ms(100) + Duration::from_micros(1));
    }

    #[test]
    fn finished_buffers_are_reaped() {
        let mut s = PlaybackScheduler::new();
        s.schedule(ms(100), ms(0));
        s.schedule(ms(100), ms(0));
        assert_eq!(s.reap(ms(150)), 1);
        assert_eq!(s.active_len(), 1);
        let stopped = s.interrupt(ms(250));
        assert!(stopped.is_empty());
    }

    #[test]
    fn ids_are_unique_across_interrupts() {
        let mut s = PlaybackScheduler::new();
        let a = s.schedule(ms(10), ms(0));
        s.interrupt(ms(0));
        let b = s.schedule(ms(10), ms(0));
        assert_ne!(a.id, b.id);
    }
}
