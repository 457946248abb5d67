//! Platform audio boundary.
//!
//! The session owns whatever these return and releases it through `close()`
//! on every exit path.

use std::time::Duration;

use tokio::sync::mpsc;

use super::frame::AudioFrame;
use super::scheduler::{BufferId, ScheduledBuffer};
use crate::error::Result;

/// Mono float samples at the requested capture rate, in capture order.
pub type CaptureSender = mpsc::Sender<Vec<f32>>;

pub trait Microphone: Send + Sync {
    /// Acquire the input device and start a continuous capture stream.
    ///
    /// Fails with `PermissionDenied` or `DeviceUnavailable`. The stream must
    /// never block on `tx`: chunks the consumer can't take are dropped.
    fn open(&self, sample_rate: u32, tx: CaptureSender) -> Result<Box<dyn CaptureStream>>;
}

pub trait CaptureStream: Send {
    /// Stop capturing and release the device. Idempotent.
    fn close(&mut self);
}

pub trait Speaker: Send + Sync {
    /// Acquire the output device for mono playback at `sample_rate`.
    fn open(&self, sample_rate: u32) -> Result<Box<dyn AudioOutput>>;
}

pub trait AudioOutput: Send {
    /// Monotonic playback clock, zero when the output was opened.
    fn now(&self) -> Duration;

    /// Play `frame` starting at `buffer.start` on the playback clock.
    fn play(&mut self, buffer: ScheduledBuffer, frame: AudioFrame);

    /// Stop a scheduled buffer immediately. Unknown or finished ids are ignored.
    fn stop(&mut self, id: BufferId);

    /// Stop everything and release the device. Idempotent.
    fn close(&mut self);
}
