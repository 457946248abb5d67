//! Fixed-rate PCM16 frames and their byte/base64 encodings.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, SessionError};

/// One immutable chunk of mono signed 16-bit PCM at a fixed sample rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Arc<[i16]>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Convert float samples in `[-1.0, 1.0]` to PCM16, clamping out-of-range input.
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let pcm = samples.iter().map(|&s| f32_to_i16(s)).collect::<Vec<_>>();
        Self::new(pcm, sample_rate)
    }

    /// Parse little-endian PCM16 bytes.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> Result<Self> {
        if bytes.len() % 2 != 0 {
            return Err(SessionError::DecodeError(format!(
                "PCM16 payload has odd length {}",
                bytes.len()
            )));
        }
        let mut buf = bytes;
        let mut samples = Vec::with_capacity(bytes.len() / 2);
        while buf.has_remaining() {
            samples.push(buf.get_i16_le());
        }
        Ok(Self::new(samples, sample_rate))
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Exact playback duration, rounded down to the nanosecond.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.samples.len() as u128 * 1_000_000_000 / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }

    pub fn to_le_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.samples.len() * 2);
        for &s in self.samples.iter() {
            buf.put_i16_le(s);
        }
        buf.freeze()
    }

    /// Base64 of the little-endian PCM bytes, as the realtime input expects.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_le_bytes())
    }
}

pub fn f32_to_i16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}
