//! Decoders for inbound audio payloads.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::frame::AudioFrame;
use crate::error::{Result, SessionError};

/// A decoder that turns one inbound payload into a playback frame at the
/// fixed output rate.
pub trait StreamDecoder: Send {
    fn decode(&mut self, mime_type: &str, payload_b64: &str) -> Result<AudioFrame>;
}

/// Base64 little-endian PCM16 mono, the format the remote speaks.
pub struct Pcm16Decoder {
    sample_rate: u32,
}

impl Pcm16Decoder {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl StreamDecoder for Pcm16Decoder {
    fn decode(&mut self, mime_type: &str, payload_b64: &str) -> Result<AudioFrame> {
        if !mime_type.is_empty() {
            check_mime(mime_type, self.sample_rate)?;
        }
        let bytes = STANDARD
            .decode(payload_b64)
            .map_err(|e| SessionError::DecodeError(format!("invalid base64: {}", e)))?;
        AudioFrame::from_le_bytes(&bytes, self.sample_rate)
    }
}

/// Accepts `audio/pcm` with an optional `rate=` parameter matching the output rate.
fn check_mime(mime_type: &str, expected_rate: u32) -> Result<()> {
    let mut parts = mime_type.split(';').map(str::trim);
    let essence = parts.next().unwrap_or_default();
    if !essence.eq_ignore_ascii_case("audio/pcm") {
        return Err(SessionError::DecodeError(format!(
            "unsupported audio type {}",
            mime_type
        )));
    }
    for param in parts {
        if let Some(rate) = param.strip_prefix("rate=") {
            let rate: u32 = rate
                .parse()
                .map_err(|_| SessionError::DecodeError(format!("bad rate in {}", mime_type)))?;
            if rate != expected_rate {
                return Err(SessionError::DecodeError(format!(
                    "payload rate {} does not match output rate {}",
                    rate, expected_rate
                )));
            }
        }
    }
    Ok(())
}
