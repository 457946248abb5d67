use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    audio: Audio,
    network: Network,
    live: Live,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
    capture_sample_rate: u32,
    capture_channels: u32,
    playback_sample_rate: u32,
    playback_channels: u32,
    playback_period_size: usize,
    frame_samples: usize,
    outbound_queue: usize,
    waveform_bars: usize,
}

#[derive(Deserialize)]
struct Network {
    ws_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct Live {
    model: String,
    voice_name: String,
    system_instruction: String,
    input_transcription: bool,
    output_transcription: bool,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    // 应用信息
    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 音频配置
    println!("cargo:rustc-env=CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=CAPTURE_SAMPLE_RATE={}", config.audio.capture_sample_rate);
    println!("cargo:rustc-env=CAPTURE_CHANNELS={}", config.audio.capture_channels);
    println!("cargo:rustc-env=PLAYBACK_SAMPLE_RATE={}", config.audio.playback_sample_rate);
    println!("cargo:rustc-env=PLAYBACK_CHANNELS={}", config.audio.playback_channels);
    println!("cargo:rustc-env=PLAYBACK_PERIOD_SIZE={}", config.audio.playback_period_size);
    println!("cargo:rustc-env=FRAME_SAMPLES={}", config.audio.frame_samples);
    println!("cargo:rustc-env=OUTBOUND_QUEUE={}", config.audio.outbound_queue);
    println!("cargo:rustc-env=WAVEFORM_BARS={}", config.audio.waveform_bars);

    // 网络配置
    println!("cargo:rustc-env=WS_URL={}", config.network.ws_url);
    println!("cargo:rustc-env=API_KEY={}", config.network.api_key);

    // Live 会话配置
    println!("cargo:rustc-env=LIVE_MODEL={}", config.live.model);
    println!("cargo:rustc-env=LIVE_VOICE_NAME={}", config.live.voice_name);
    println!(
        "cargo:rustc-env=LIVE_SYSTEM_INSTRUCTION={}",
        config.live.system_instruction.replace('\n', " ")
    );
    println!("cargo:rustc-env=LIVE_INPUT_TRANSCRIPTION={}", config.live.input_transcription);
    println!("cargo:rustc-env=LIVE_OUTPUT_TRANSCRIPTION={}", config.live.output_transcription);
}
