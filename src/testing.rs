//! In-memory devices and connector for session tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::{
    AudioFrame, AudioOutput, BufferId, CaptureSender, CaptureStream, Microphone, ScheduledBuffer,
    Speaker,
};
use crate::error::{Result, SessionError};
use crate::net_link::{Connector, NetCommand, NetEvent, NetLink};
use crate::protocol::LiveSetup;

/// Base64 PCM payload of `samples` constant samples.
pub fn pcm_b64(samples: usize) -> String {
    AudioFrame::new(vec![1000; samples], 24_000).to_base64()
}

#[derive(Default)]
struct MicState {
    opened: AtomicUsize,
    close_calls: AtomicUsize,
    sender: Mutex<Option<CaptureSender>>,
}

#[derive(Clone, Default)]
pub struct FakeMicrophone {
    deny: bool,
    state: Arc<MicState>,
}

impl FakeMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    /// Opened and later closed.
    pub fn released(&self) -> bool {
        self.state.opened.load(Ordering::SeqCst) > 0 && self.close_calls() > 0
    }

    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// The channel the session listens on, while the stream is open.
    pub fn sender(&self) -> Option<CaptureSender> {
        self.state.sender.lock().unwrap().clone()
    }
}

impl Microphone for FakeMicrophone {
    fn open(&self, _sample_rate: u32, tx: CaptureSender) -> Result<Box<dyn CaptureStream>> {
        if self.deny {
            return Err(SessionError::PermissionDenied("microphone access denied".into()));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        *self.state.sender.lock().unwrap() = Some(tx);
        Ok(Box::new(FakeCapture {
            state: self.state.clone(),
        }))
    }
}

struct FakeCapture {
    state: Arc<MicState>,
}

impl CaptureStream for FakeCapture {
    fn close(&mut self) {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.sender.lock().unwrap().take();
    }
}

/// Manually driven playback clock.
#[derive(Clone, Default)]
pub struct FakeClock(Arc<Mutex<Duration>>);

impl FakeClock {
    pub fn set(&self, at: Duration) {
        *self.0.lock().unwrap() = at;
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }

    pub fn now(&self) -> Duration {
        *self.0.lock().unwrap()
    }
}

#[derive(Default)]
struct SpeakerState {
    opened: AtomicUsize,
    close_calls: AtomicUsize,
    played: Mutex<Vec<ScheduledBuffer>>,
    stopped: Mutex<Vec<BufferId>>,
}

#[derive(Clone, Default)]
pub struct FakeSpeaker {
    unavailable: bool,
    clock: FakeClock,
    state: Arc<SpeakerState>,
}

impl FakeSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn clock(&self) -> FakeClock {
        self.clock.clone()
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.opened() > 0 && self.close_calls() > 0
    }

    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    pub fn played(&self) -> Vec<ScheduledBuffer> {
        self.state.played.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<BufferId> {
        self.state.stopped.lock().unwrap().clone()
    }
}

impl Speaker for FakeSpeaker {
    fn open(&self, _sample_rate: u32) -> Result<Box<dyn AudioOutput>> {
        if self.unavailable {
            return Err(SessionError::DeviceUnavailable("no output device".into()));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeOutput {
            clock: self.clock.clone(),
            state: self.state.clone(),
        }))
    }
}

struct FakeOutput {
    clock: FakeClock,
    state: Arc<SpeakerState>,
}

impl AudioOutput for FakeOutput {
    fn now(&self) -> Duration {
        self.clock.now()
    }

    fn play(&mut self, buffer: ScheduledBuffer, _frame: AudioFrame) {
        self.state.played.lock().unwrap().push(buffer);
    }

    fn stop(&mut self, id: BufferId) {
        self.state.stopped.lock().unwrap().push(id);
    }

    fn close(&mut self) {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Remote side of a fake link.
pub struct Wire {
    /// What the session queued for sending.
    pub outbound: mpsc::Receiver<NetCommand>,
    /// Inject server events.
    pub events: mpsc::Sender<NetEvent>,
}

enum Behavior {
    Accept,
    Fail(SessionError),
    Hang,
}

pub struct FakeConnector {
    behavior: Behavior,
    attempts: AtomicUsize,
    wire: Mutex<Option<Wire>>,
    saw_setup: AtomicBool,
}

impl FakeConnector {
    fn with(behavior: Behavior) -> Self {
        Self {
            behavior,
            attempts: AtomicUsize::new(0),
            wire: Mutex::new(None),
            saw_setup: AtomicBool::new(false),
        }
    }

    pub fn new() -> Self {
        Self::with(Behavior::Accept)
    }

    pub fn failing(error: SessionError) -> Self {
        Self::with(Behavior::Fail(error))
    }

    pub fn hanging() -> Self {
        Self::with(Behavior::Hang)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn saw_setup(&self) -> bool {
        self.saw_setup.load(Ordering::SeqCst)
    }

    /// Panics if no connection was made.
    pub fn take_wire(&self) -> Wire {
        self.wire.lock().unwrap().take().expect("no connection made")
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        setup: &LiveSetup,
        outbound_queue: usize,
    ) -> Result<(NetLink, mpsc::Receiver<NetEvent>)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.saw_setup
            .store(setup.to_json().is_ok(), Ordering::SeqCst);
        match &self.behavior {
            Behavior::Accept => {}
            Behavior::Fail(e) => return Err(e.clone()),
            Behavior::Hang => std::future::pending::<()>().await,
        }

        let (tx_cmd, rx_cmd) = mpsc::channel(outbound_queue.max(1));
        let (tx_event, rx_event) = mpsc::channel(16);
        *self.wire.lock().unwrap() = Some(Wire {
            outbound: rx_cmd,
            events: tx_event,
        });
        Ok((NetLink::new(tx_cmd, None), rx_event))
    }
}
