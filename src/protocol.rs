//! Wire types for the Live API bidirectional stream.
//!
//! Outbound: one `setup` message right after connect, then `realtimeInput`
//! messages carrying base64 PCM16 frames. Inbound: `setupComplete`, then
//! `serverContent` messages carrying transcripts, audio and turn signals.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

// ======================== Outbound ========================

/// Parameters for the setup message, taken from the config.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSetup {
    pub model: String,
    pub voice_name: String,
    pub system_instruction: Option<String>,
    pub input_transcription: bool,
    pub output_transcription: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupMessage<'a> {
    setup: Setup<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup<'a> {
    model: &'a str,
    generation_config: GenerationConfig<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    // 空对象即表示开启转写
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<TranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<TranscriptionConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct TranscriptionConfig {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputMessage<'a> {
    realtime_input: RealtimeInput<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput<'a> {
    media_chunks: [OutboundBlob<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundBlob<'a> {
    mime_type: &'a str,
    data: &'a str,
}

impl LiveSetup {
    /// Serialize the setup message sent right after the socket opens.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let message = SetupMessage {
            setup: Setup {
                model: &self.model,
                generation_config: GenerationConfig {
                    response_modalities: ["AUDIO"],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: &self.voice_name,
                            },
                        },
                    },
                },
                system_instruction: self
                    .system_instruction
                    .as_deref()
                    .map(|text| Content { parts: [TextPart { text }] }),
                input_audio_transcription: self.input_transcription.then_some(TranscriptionConfig {}),
                output_audio_transcription: self
                    .output_transcription
                    .then_some(TranscriptionConfig {}),
            },
        };
        serde_json::to_string(&message)
    }
}

/// MIME type for outbound PCM16 mono audio at `sample_rate`.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Serialize one base64 audio frame as a `realtimeInput` message.
pub fn realtime_audio_json(mime_type: &str, data_b64: &str) -> serde_json::Result<String> {
    serde_json::to_string(&RealtimeInputMessage {
        realtime_input: RealtimeInput {
            media_chunks: [OutboundBlob {
                mime_type,
                data: data_b64,
            }],
        },
    })
}

// ======================== Inbound ========================

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
    go_away: Option<GoAway>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    interrupted: bool,
}

#[derive(Deserialize, Debug, Default)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<InboundPart>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InboundPart {
    inline_data: Option<InboundBlob>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InboundBlob {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Debug)]
struct Transcription {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GoAway {
    time_left: Option<String>,
}

/// One tagged event extracted from a server message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    SetupComplete,
    Interrupted,
    LocalTranscript(String),
    RemoteTranscript(String),
    Audio { mime_type: String, data: String },
    TurnComplete,
    GoAway { time_left: Option<String> },
}

/// Split a server message into events, in the order they must be applied.
///
/// An interruption is emitted before any audio carried by the same message.
/// Messages with no recognised content yield no events.
pub fn parse_server_message(text: &str) -> Result<Vec<InboundEvent>> {
    let msg: ServerMessage = serde_json::from_str(text)
        .map_err(|e| SessionError::ProtocolError(format!("malformed server message: {}", e)))?;

    let mut events = Vec::new();

    if msg.setup_complete.is_some() {
        events.push(InboundEvent::SetupComplete);
    }

    if let Some(content) = msg.server_content {
        if content.interrupted {
            events.push(InboundEvent::Interrupted);
        }
        if let Some(t) = content.input_transcription {
            if !t.text.is_empty() {
                events.push(InboundEvent::LocalTranscript(t.text));
            }
        }
        if let Some(t) = content.output_transcription {
            if !t.text.is_empty() {
                events.push(InboundEvent::RemoteTranscript(t.text));
            }
        }
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(blob) = part.inline_data {
                    events.push(InboundEvent::Audio {
                        mime_type: blob.mime_type,
                        data: blob.data,
                    });
                }
            }
        }
        if content.turn_complete {
            events.push(InboundEvent::TurnComplete);
        }
    }

    if let Some(go_away) = msg.go_away {
        events.push(InboundEvent::GoAway {
            time_left: go_away.time_left,
        });
    }

    Ok(events)
}
