//! ALSA speaker: a playback thread mixes scheduled buffers onto a sample
//! timeline and writes it out one period at a time. The timeline position
//! (frames handed to ALSA) is the playback clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use alsa::pcm::PCM;

use super::alsa_device::{self, AlsaParams};
use super::convert::upmix_from_mono;
use super::device::{AudioOutput, Speaker};
use super::frame::AudioFrame;
use super::scheduler::{BufferId, ScheduledBuffer};
use super::timeline::{Timeline, frame_at, time_at};
use crate::error::{Result, SessionError};

pub struct AlsaSpeaker {
    device: String,
    channels: u32,
    period_size: Option<usize>,
}

impl AlsaSpeaker {
    pub fn new(device: impl Into<String>, channels: u32, period_size: usize) -> Self {
        Self {
            device: device.into(),
            channels,
            period_size: (period_size > 0).then_some(period_size),
        }
    }
}

impl Speaker for AlsaSpeaker {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn AudioOutput>> {
        let (pcm, params) =
            alsa_device::open_playback(&self.device, sample_rate, self.channels, self.period_size)?;
        if params.sample_rate != sample_rate {
            return Err(SessionError::DeviceUnavailable(format!(
                "playback device '{}' runs at {}Hz, need {}Hz",
                self.device, params.sample_rate, sample_rate
            )));
        }

        let timeline = Arc::new(Mutex::new(Timeline::default()));
        let running = Arc::new(AtomicBool::new(true));
        let handle = {
            let timeline = timeline.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("audio-play".into())
                .spawn(move || {
                    if let Err(e) = play_thread(pcm, params, &timeline, &running) {
                        log::error!("Playback thread error: {}", e);
                    }
                })
                .map_err(|e| SessionError::DeviceUnavailable(format!("playback thread: {}", e)))?
        };

        Ok(Box::new(AlsaOutput {
            sample_rate,
            timeline,
            running,
            handle: Some(handle),
        }))
    }
}

fn lock(timeline: &Mutex<Timeline>) -> MutexGuard<'_, Timeline> {
    timeline.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct AlsaOutput {
    sample_rate: u32,
    timeline: Arc<Mutex<Timeline>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AudioOutput for AlsaOutput {
    fn now(&self) -> Duration {
        time_at(lock(&self.timeline).position(), self.sample_rate)
    }

    fn play(&mut self, buffer: ScheduledBuffer, frame: AudioFrame) {
        let wanted = frame_at(buffer.start, self.sample_rate);
        let start = lock(&self.timeline).place(buffer.id, wanted, frame);
        if start != wanted {
            log::debug!("Buffer {} moved from frame {} to {}", buffer.id, wanted, start);
        }
    }

    fn stop(&mut self, id: BufferId) {
        lock(&self.timeline).remove(id);
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let dropped = {
            let mut timeline = lock(&self.timeline);
            let pending = timeline.pending();
            timeline.clear();
            pending
        };
        if let Some(h) = self.handle.take() {
            let _ = h.join();
            log::info!("Speaker released, {} pending buffers dropped", dropped);
        }
    }
}

impl Drop for AlsaOutput {
    fn drop(&mut self) {
        self.close();
    }
}

fn play_thread(
    pcm: PCM,
    params: AlsaParams,
    timeline: &Mutex<Timeline>,
    running: &AtomicBool,
) -> std::result::Result<(), alsa::Error> {
    let channels = params.channels as usize;
    let period = params.period_size.max(1);
    let io = pcm.io_i16()?;

    log::info!(
        "Playback started: rate={}, ch={}, period={}",
        params.sample_rate,
        channels,
        period,
    );

    while running.load(Ordering::Relaxed) {
        let mono = lock(timeline).render(period);
        let pcm_data = upmix_from_mono(&mono, channels);

        // Write with retry loop to handle short writes and XRUN recovery.
        let mut frames_written = 0;
        let mut retry_count = 0u32;
        while frames_written < period && running.load(Ordering::Relaxed) {
            let offset = frames_written * channels;
            match io.writei(&pcm_data[offset..]) {
                Ok(n) => {
                    frames_written += n;
                    retry_count = 0;
                }
                Err(e) => {
                    log::warn!("ALSA XRUN or error: {}, recovering...", e);
                    retry_count += 1;
                    if let Err(e2) = pcm.prepare() {
                        log::error!("Failed to recover PCM playback: {}", e2);
                        return Err(e2);
                    }
                    if retry_count >= 3 {
                        log::error!(
                            "Max recovery retries ({}) reached. Dropping {} unwritten frames.",
                            retry_count,
                            period - frames_written
                        );
                        break;
                    }
                }
            }
        }
    }

    log::info!("Playback stopped");
    Ok(())
}
