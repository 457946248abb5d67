use serde::Serialize;
use url::Url;

use crate::protocol::LiveSetup;
use crate::session::SessionConfig;

/// 运行时覆盖 API key 的环境变量
pub const API_KEY_ENV: &str = "CLIFTON_API_KEY";

#[derive(Debug, Serialize, Clone)]
pub struct Config {
    // 音频设备配置
    pub capture_device: &'static str,
    pub playback_device: &'static str,
    pub capture_sample_rate: u32,
    pub capture_channels: u32,
    pub playback_sample_rate: u32,
    pub playback_channels: u32,
    pub playback_period_size: usize,

    // 采集分帧与发送队列
    pub frame_samples: usize,
    pub outbound_queue: usize,
    pub waveform_bars: usize,

    // 网络配置
    pub ws_url: &'static str,
    #[serde(skip_serializing)]
    pub api_key: String,

    // Live 会话参数
    pub model: &'static str,
    pub voice_name: &'static str,
    pub system_instruction: &'static str,
    pub input_transcription: bool,
    pub output_transcription: bool,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取，API key 可在运行时覆盖
    pub fn new() -> Result<Self, &'static str> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| env!("API_KEY").to_string());

        Ok(Self {
            capture_device: env!("CAPTURE_DEVICE"),
            playback_device: env!("PLAYBACK_DEVICE"),
            capture_sample_rate: env!("CAPTURE_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse CAPTURE_SAMPLE_RATE")?,
            capture_channels: env!("CAPTURE_CHANNELS").parse()
                .map_err(|_| "Failed to parse CAPTURE_CHANNELS")?,
            playback_sample_rate: env!("PLAYBACK_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse PLAYBACK_SAMPLE_RATE")?,
            playback_channels: env!("PLAYBACK_CHANNELS").parse()
                .map_err(|_| "Failed to parse PLAYBACK_CHANNELS")?,
            playback_period_size: env!("PLAYBACK_PERIOD_SIZE").parse()
                .map_err(|_| "Failed to parse PLAYBACK_PERIOD_SIZE")?,

            frame_samples: env!("FRAME_SAMPLES").parse()
                .map_err(|_| "Failed to parse FRAME_SAMPLES")?,
            outbound_queue: env!("OUTBOUND_QUEUE").parse()
                .map_err(|_| "Failed to parse OUTBOUND_QUEUE")?,
            waveform_bars: env!("WAVEFORM_BARS").parse()
                .map_err(|_| "Failed to parse WAVEFORM_BARS")?,

            ws_url: env!("WS_URL"),
            api_key,

            model: env!("LIVE_MODEL"),
            voice_name: env!("LIVE_VOICE_NAME"),
            system_instruction: env!("LIVE_SYSTEM_INSTRUCTION"),
            input_transcription: env!("LIVE_INPUT_TRANSCRIPTION").parse()
                .map_err(|_| "Failed to parse LIVE_INPUT_TRANSCRIPTION")?,
            output_transcription: env!("LIVE_OUTPUT_TRANSCRIPTION").parse()
                .map_err(|_| "Failed to parse LIVE_OUTPUT_TRANSCRIPTION")?,
        })
    }

    /// WebSocket 地址，API key 以 `key` 查询参数附加
    pub fn endpoint(&self) -> anyhow::Result<Url> {
        let mut url = Url::parse(self.ws_url)?;
        if !self.api_key.is_empty() {
            url.query_pairs_mut().append_pair("key", &self.api_key);
        }
        Ok(url)
    }

    pub fn live_setup(&self) -> LiveSetup {
        let instruction = self.system_instruction.trim();
        LiveSetup {
            model: self.model.to_string(),
            voice_name: self.voice_name.to_string(),
            system_instruction: (!instruction.is_empty()).then(|| instruction.to_string()),
            input_transcription: self.input_transcription,
            output_transcription: self.output_transcription,
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            capture_sample_rate: self.capture_sample_rate,
            playback_sample_rate: self.playback_sample_rate,
            frame_samples: self.frame_samples,
            outbound_queue: self.outbound_queue.max(1),
            waveform_bars: self.waveform_bars,
            setup: self.live_setup(),
        }
    }
}
