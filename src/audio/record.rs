//! ALSA microphone: a dedicated OS thread reads periods from the capture
//! device and hands mono float chunks to the session loop.
//!
//! Uses std::thread (NOT tokio tasks) for real-time audio I/O to avoid
//! contention with async network tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use alsa::pcm::PCM;
use tokio::sync::mpsc::error::TrySendError;

use super::alsa_device::{self, AlsaParams};
use super::convert::{LinearResampler, downmix_to_mono};
use super::device::{CaptureSender, CaptureStream, Microphone};
use crate::error::{Result, SessionError};

pub struct AlsaMicrophone {
    device: String,
    channels: u32,
}

impl AlsaMicrophone {
    pub fn new(device: impl Into<String>, channels: u32) -> Self {
        Self {
            device: device.into(),
            channels,
        }
    }
}

impl Microphone for AlsaMicrophone {
    fn open(&self, sample_rate: u32, tx: CaptureSender) -> Result<Box<dyn CaptureStream>> {
        // Open on the caller's thread so permission/device failures reach start()
        let (pcm, params) = alsa_device::open_capture(&self.device, sample_rate, self.channels)?;

        let running = Arc::new(AtomicBool::new(true));
        let handle = {
            let running = running.clone();
            thread::Builder::new()
                .name("audio-record".into())
                .spawn(move || {
                    if let Err(e) = record_thread(pcm, params, sample_rate, tx, &running) {
                        log::error!("Recording thread error: {}", e);
                    }
                })
                .map_err(|e| SessionError::DeviceUnavailable(format!("capture thread: {}", e)))?
        };

        Ok(Box::new(AlsaCapture {
            running,
            handle: Some(handle),
        }))
    }
}

pub struct AlsaCapture {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureStream for AlsaCapture {
    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            // readi returns within one period
            let _ = h.join();
            log::info!("Microphone released");
        }
    }
}

impl Drop for AlsaCapture {
    fn drop(&mut self) {
        self.close();
    }
}

fn record_thread(
    pcm: PCM,
    params: AlsaParams,
    target_rate: u32,
    tx: CaptureSender,
    running: &AtomicBool,
) -> std::result::Result<(), alsa::Error> {
    let channels = params.channels as usize;
    let mut resampler = LinearResampler::new(params.sample_rate, target_rate);

    // ALSA read buffer (interleaved i16, one period)
    let mut read_buf = vec![0i16; params.period_size * channels];

    let io = pcm.io_i16()?;

    log::info!(
        "Recording started: rate={}, ch={}, period={}, target_rate={}",
        params.sample_rate,
        channels,
        params.period_size,
        target_rate,
    );

    let mut dropped = 0u64;
    while running.load(Ordering::Relaxed) {
        match io.readi(&mut read_buf) {
            Ok(frames) => {
                let mono = downmix_to_mono(&read_buf[..frames * channels], channels);
                let chunk = resampler.process(&mono);
                match tx.try_send(chunk) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped += 1;
                        log::debug!("Capture chunk dropped, session loop busy ({} so far)", dropped);
                    }
                    Err(TrySendError::Closed(_)) => {
                        log::warn!("Capture receiver dropped, stopping");
                        break;
                    }
                }
            }
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                if let Err(e2) = pcm.prepare() {
                    log::error!("Failed to recover PCM capture: {}", e2);
                    break;
                }
            }
        }
    }

    log::info!("Recording stopped");
    Ok(())
}
