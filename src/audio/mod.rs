//! audio - Capture framing, playback scheduling, and the device boundary
//!
//! Frames are mono PCM16: 16 kHz towards the remote, 24 kHz back from it.
//! With the `alsa` feature, ALSA backs the device traits; capture and
//! playback then run on dedicated OS threads.

mod convert;
pub mod device;
pub mod frame;
pub mod framer;
pub mod scheduler;
pub mod stream_decoder;
#[cfg_attr(not(feature = "alsa"), allow(dead_code))]
mod timeline;
pub mod waveform;

#[cfg(feature = "alsa")]
mod alsa_device;
#[cfg(feature = "alsa")]
mod play;
#[cfg(feature = "alsa")]
mod record;

pub use device::{AudioOutput, CaptureSender, CaptureStream, Microphone, Speaker};
pub use frame::AudioFrame;
pub use framer::Framer;
pub use scheduler::{BufferId, PlaybackScheduler, ScheduledBuffer};
pub use stream_decoder::{Pcm16Decoder, StreamDecoder};
pub use waveform::Direction;

use crate::config::Config;
use crate::error::Result;

/// The platform microphone and speaker named in the config.
#[cfg(feature = "alsa")]
pub fn default_devices(config: &Config) -> Result<(Box<dyn Microphone>, Box<dyn Speaker>)> {
    Ok((
        Box::new(record::AlsaMicrophone::new(
            config.capture_device,
            config.capture_channels,
        )),
        Box::new(play::AlsaSpeaker::new(
            config.playback_device,
            config.playback_channels,
            config.playback_period_size,
        )),
    ))
}

#[cfg(not(feature = "alsa"))]
pub fn default_devices(_config: &Config) -> Result<(Box<dyn Microphone>, Box<dyn Speaker>)> {
    Err(crate::error::SessionError::DeviceUnavailable(
        "built without an audio backend, rebuild with `--features alsa`".into(),
    ))
}
