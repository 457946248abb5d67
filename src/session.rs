//! One duplex live conversation.
//!
//! `Session` owns every resource of the conversation (capture stream,
//! playback output, network link) from `start()` until a single idempotent
//! teardown releases them. It never blocks: the controller loop feeds it
//! capture chunks and network events one at a time.
//!
//! ```text
//! idle ─start()─▶ connecting ─setupComplete─▶ open ─▶ closed | error
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::audio::waveform::{peak_bars, rms};
use crate::audio::{
    AudioFrame, AudioOutput, CaptureStream, Direction, Framer, Microphone, Pcm16Decoder,
    PlaybackScheduler, Speaker, StreamDecoder,
};
use crate::error::{Result, SessionError};
use crate::net_link::{Connector, NetEvent, NetLink};
use crate::protocol::{self, InboundEvent, LiveSetup};

/// 采集通道容量（以平台周期为单位）
const CAPTURE_QUEUE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closed => "closed",
            SessionState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error)
    }
}

/// A completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub local: String,
    pub remote: String,
}

/// Observable session events for live display.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    State(SessionState),
    /// `text` is everything heard from the local speaker this turn.
    LocalTranscript { delta: String, text: String },
    RemoteTranscript { delta: String, text: String },
    TurnComplete(Turn),
    Interrupted { stopped: usize },
    /// Per-bar peaks plus the overall RMS level of one frame.
    Waveform {
        direction: Direction,
        bars: Vec<f32>,
        level: f32,
    },
    Error(SessionError),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub frame_samples: usize,
    pub outbound_queue: usize,
    /// Zero disables waveform updates.
    pub waveform_bars: usize,
    pub setup: LiveSetup,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16000,
            playback_sample_rate: 24000,
            frame_samples: 4096,
            outbound_queue: 8,
            waveform_bars: 32,
            setup: LiveSetup {
                model: "models/gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
                voice_name: "Zephyr".to_string(),
                system_instruction: None,
                input_transcription: true,
                output_transcription: true,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub chunks_scheduled: u64,
    pub chunks_skipped: u64,
    pub interruptions: u64,
}

/// Event sources the controller loop consumes after a successful `start()`.
pub struct SessionIo {
    pub capture_rx: mpsc::Receiver<Vec<f32>>,
    pub net_rx: mpsc::Receiver<NetEvent>,
}

pub struct Session {
    id: Uuid,
    config: SessionConfig,
    state: SessionState,
    mime_type: String,

    framer: Framer,
    decoder: Box<dyn StreamDecoder>,
    scheduler: PlaybackScheduler,

    local: String,
    remote: String,
    turns: Vec<Turn>,
    stats: SessionStats,
    error: Option<SessionError>,

    updates: mpsc::UnboundedSender<SessionUpdate>,

    capture: Option<Box<dyn CaptureStream>>,
    output: Option<Box<dyn AudioOutput>>,
    link: Option<NetLink>,
}

impl Session {
    pub fn new(config: SessionConfig, updates: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mime_type: protocol::pcm_mime_type(config.capture_sample_rate),
            framer: Framer::new(config.frame_samples, config.capture_sample_rate),
            decoder: Box::new(Pcm16Decoder::new(config.playback_sample_rate)),
            scheduler: PlaybackScheduler::new(),
            config,
            state: SessionState::Idle,
            local: String::new(),
            remote: String::new(),
            turns: Vec::new(),
            stats: SessionStats::default(),
            error: None,
            updates,
            capture: None,
            output: None,
            link: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Completed turns, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// In-progress (local, remote) transcript of the current turn.
    pub fn pending_turn(&self) -> (&str, &str) {
        (&self.local, &self.remote)
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn next_start_time(&self) -> Duration {
        self.scheduler.next_start_time()
    }

    pub fn scheduled_buffers(&self) -> usize {
        self.scheduler.active_len()
    }

    /// `Err` with the terminal error if the session failed.
    pub fn outcome(&self) -> Result<()> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Acquire the microphone and output, then open the link.
    ///
    /// Device failures leave the session `idle` without touching the network.
    /// A connection failure releases the devices and leaves it in `error`.
    /// If this future is dropped mid-connect the session stays `connecting`
    /// with its devices held; `stop()` releases them.
    pub async fn start(
        &mut self,
        mic: &dyn Microphone,
        speaker: &dyn Speaker,
        connector: &dyn Connector,
    ) -> Result<SessionIo> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState(self.state.as_str()));
        }

        let (capture_tx, capture_rx) = mpsc::channel(CAPTURE_QUEUE);
        self.capture = Some(mic.open(self.config.capture_sample_rate, capture_tx)?);

        match speaker.open(self.config.playback_sample_rate) {
            Ok(output) => self.output = Some(output),
            Err(e) => {
                self.release_resources();
                return Err(e);
            }
        }

        log::info!("[{}] Microphone and speaker acquired, connecting", self.id);
        self.set_state(SessionState::Connecting);

        match connector
            .connect(&self.config.setup, self.config.outbound_queue)
            .await
        {
            Ok((link, net_rx)) => {
                // stop() may not run while we hold &mut self, so the state is still connecting
                self.link = Some(link);
                Ok(SessionIo { capture_rx, net_rx })
            }
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    // ======================== Capture path ========================

    /// Feed platform samples; every completed frame is sent if the session is
    /// open and dropped otherwise.
    pub fn handle_capture(&mut self, samples: &[f32]) {
        if self.state.is_terminal() {
            return;
        }
        for frame in self.framer.push(samples) {
            self.send_frame(frame);
        }
        if self.state != SessionState::Open {
            // partial frames from before open are dropped too
            self.framer.clear();
        }
    }

    fn send_frame(&mut self, frame: AudioFrame) {
        let link = match (&self.link, self.state) {
            (Some(link), SessionState::Open) => link,
            _ => {
                self.stats.frames_dropped += 1;
                log::debug!("[{}] Frame dropped while {}", self.id, self.state.as_str());
                return;
            }
        };

        let message = match protocol::realtime_audio_json(&self.mime_type, &frame.to_base64()) {
            Ok(m) => m,
            Err(e) => {
                log::error!("[{}] Failed to encode audio frame: {}", self.id, e);
                return;
            }
        };

        match link.try_send_text(message) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                self.emit_waveform(Direction::Outbound, &frame);
            }
            Err(TrySendError::Full(_)) => {
                self.stats.frames_dropped += 1;
                log::debug!("[{}] Link busy, frame dropped", self.id);
            }
            Err(TrySendError::Closed(_)) => {
                // the link task reports why it ended through net events
                self.stats.frames_dropped += 1;
            }
        }
    }

    // ======================== Receive path ========================

    pub fn handle_net_event(&mut self, event: NetEvent) {
        if self.state.is_terminal() {
            return;
        }
        match event {
            NetEvent::Text(text) => self.handle_server_text(&text),
            NetEvent::Binary(data) => match String::from_utf8(data) {
                Ok(text) => self.handle_server_text(&text),
                Err(_) => self.fail(SessionError::ProtocolError(
                    "binary message is not UTF-8 JSON".to_string(),
                )),
            },
            NetEvent::Closed { reason } => {
                log::info!(
                    "[{}] Remote closed the session: {}",
                    self.id,
                    reason.as_deref().unwrap_or("no reason")
                );
                self.teardown(SessionState::Closed);
            }
            NetEvent::Error(msg) => self.fail(SessionError::ConnectionError(msg)),
        }
    }

    fn handle_server_text(&mut self, text: &str) {
        let events = match protocol::parse_server_message(text) {
            Ok(events) => events,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        for event in events {
            // a terminal event may arrive mid-message
            if self.state.is_terminal() {
                break;
            }
            self.apply(event);
        }
    }

    fn apply(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::SetupComplete => {
                if self.state == SessionState::Connecting {
                    log::info!("[{}] Setup complete, streaming", self.id);
                    self.set_state(SessionState::Open);
                } else {
                    log::warn!("[{}] Unexpected setupComplete while {}", self.id, self.state.as_str());
                }
            }
            InboundEvent::LocalTranscript(delta) => {
                self.local.push_str(&delta);
                self.emit(SessionUpdate::LocalTranscript {
                    delta,
                    text: self.local.clone(),
                });
            }
            InboundEvent::RemoteTranscript(delta) => {
                self.remote.push_str(&delta);
                self.emit(SessionUpdate::RemoteTranscript {
                    delta,
                    text: self.remote.clone(),
                });
            }
            InboundEvent::Audio { mime_type, data } => {
                match self.decoder.decode(&mime_type, &data) {
                    Ok(frame) if frame.is_empty() => {}
                    Ok(frame) => self.schedule(frame),
                    Err(e) if !e.is_terminal() => {
                        self.stats.chunks_skipped += 1;
                        log::warn!("[{}] Skipping audio chunk: {}", self.id, e);
                    }
                    Err(e) => self.fail(e),
                }
            }
            InboundEvent::TurnComplete => {
                let turn = Turn {
                    local: std::mem::take(&mut self.local),
                    remote: std::mem::take(&mut self.remote),
                };
                log::info!("[{}] Turn {} complete", self.id, self.turns.len() + 1);
                self.turns.push(turn.clone());
                self.emit(SessionUpdate::TurnComplete(turn));
            }
            InboundEvent::Interrupted => self.interrupt(),
            InboundEvent::GoAway { time_left } => {
                log::warn!(
                    "[{}] Server going away, time left: {}",
                    self.id,
                    time_left.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    fn schedule(&mut self, frame: AudioFrame) {
        let Some(now) = self.output.as_ref().map(|o| o.now()) else {
            return;
        };
        let buffer = self.scheduler.schedule(frame.duration(), now);
        log::debug!(
            "[{}] Chunk {} scheduled at {:?} for {:?} ({}Hz)",
            self.id,
            buffer.id,
            buffer.start,
            buffer.duration(),
            frame.sample_rate()
        );
        self.stats.chunks_scheduled += 1;
        self.emit_waveform(Direction::Inbound, &frame);
        if let Some(output) = self.output.as_mut() {
            output.play(buffer, frame);
        }
    }

    /// Barge-in: cut every pending buffer and restart the timeline now.
    fn interrupt(&mut self) {
        let now = self.output.as_ref().map_or(Duration::ZERO, |o| o.now());
        let stopped = self.scheduler.interrupt(now);
        if let Some(output) = self.output.as_mut() {
            for buffer in &stopped {
                output.stop(buffer.id);
            }
        }
        self.stats.interruptions += 1;
        log::info!("[{}] Interrupted, {} buffers stopped", self.id, stopped.len());
        self.emit(SessionUpdate::Interrupted {
            stopped: stopped.len(),
        });
    }

    // ======================== Teardown ========================

    /// Close the session from any state. Repeated calls are no-ops.
    pub fn stop(&mut self) {
        self.teardown(SessionState::Closed);
    }

    /// Terminal failure: record it, surface it, and tear down.
    pub fn fail(&mut self, error: SessionError) {
        if self.state.is_terminal() {
            return;
        }
        log::error!("[{}] Session failed: {}", self.id, error);
        self.error = Some(error.clone());
        self.emit(SessionUpdate::Error(error));
        self.teardown(SessionState::Error);
    }

    fn teardown(&mut self, final_state: SessionState) {
        if self.state.is_terminal() {
            return;
        }
        self.release_resources();
        self.local.clear();
        self.remote.clear();
        self.set_state(final_state);
        log::info!("[{}] Session {}: {:?}", self.id, final_state.as_str(), self.stats);
    }

    fn release_resources(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        if let Some(mut capture) = self.capture.take() {
            capture.close();
        }
        let pending = self.scheduler.clear();
        if let Some(mut output) = self.output.take() {
            for buffer in &pending {
                output.stop(buffer.id);
            }
            output.close();
        }
        self.framer.clear();
    }

    // ======================== Updates ========================

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            self.state = state;
            self.emit(SessionUpdate::State(state));
        }
    }

    fn emit(&self, update: SessionUpdate) {
        // nobody listening is fine
        let _ = self.updates.send(update);
    }

    fn emit_waveform(&self, direction: Direction, frame: &AudioFrame) {
        if self.config.waveform_bars == 0 {
            return;
        }
        self.emit(SessionUpdate::Waveform {
            direction,
            bars: peak_bars(frame.samples(), self.config.waveform_bars),
            level: rms(frame.samples()),
        });
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
