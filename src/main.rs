mod audio;
mod config;
mod controller;
mod error;
mod net_link;
mod protocol;
mod session;
#[cfg(test)]
mod testing;

use anyhow::Context;
use config::Config;
use controller::Controller;
use net_link::WsConnector;
use session::{Session, SessionUpdate};
use tokio::signal;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();
    log::info!("{} v{} starting", env!("APP_NAME"), env!("APP_VERSION"));

    // 加载配置
    let config = Config::new().map_err(anyhow::Error::msg)?;
    if config.api_key.is_empty() {
        anyhow::bail!(
            "No API key configured: set [network].api_key in config.toml or {}",
            config::API_KEY_ENV
        );
    }
    log::debug!("Config: {}", serde_json::to_string(&config)?);

    // 会话更新通道，由显示任务消费
    let (tx_update, rx_update) = mpsc::unbounded_channel::<SessionUpdate>();
    let display = tokio::spawn(display_updates(rx_update));

    let mut session = Session::new(config.session(), tx_update);
    println!("Session {} (model {})", session.id(), config.model);

    let connector = WsConnector::new(config.endpoint().context("invalid ws_url")?);
    let (mic, speaker) = audio::default_devices(&config)?;

    // 连接阶段也响应 Ctrl+C
    let started = tokio::select! {
        result = session.start(mic.as_ref(), speaker.as_ref(), &connector) => Some(result),
        _ = signal::ctrl_c() => None,
    };
    let io = match started {
        Some(result) => result?,
        None => {
            println!("Received Ctrl+C, shutting down...");
            session.stop();
            return Ok(());
        }
    };

    let session = Controller::new(session, io)
        .run(async {
            let _ = signal::ctrl_c().await;
            println!("Received Ctrl+C, shutting down...");
        })
        .await;

    for (i, turn) in session.turns().iter().enumerate() {
        println!("#{} you: {}", i + 1, turn.local);
        println!("#{} model: {}", i + 1, turn.remote);
    }
    log::info!("Stats: {:?}", session.stats());

    let outcome = session.outcome();
    drop(session);
    let _ = display.await;
    outcome?;
    Ok(())
}

/// 打印会话状态与转写；波形只在 debug 日志中输出
async fn display_updates(mut rx: mpsc::UnboundedReceiver<SessionUpdate>) {
    while let Some(update) = rx.recv().await {
        match update {
            SessionUpdate::State(state) => println!("[{}]", state.as_str()),
            SessionUpdate::LocalTranscript { text, .. } => println!("you: {}", text),
            SessionUpdate::RemoteTranscript { text, .. } => println!("model: {}", text),
            SessionUpdate::TurnComplete(_) => println!("--- turn complete ---"),
            SessionUpdate::Interrupted { stopped } => {
                println!("(interrupted, {} chunks cut)", stopped)
            }
            SessionUpdate::Waveform { direction, level, .. } => {
                log::debug!("{:?} level {:.3}", direction, level);
            }
            SessionUpdate::Error(e) => eprintln!("Error: {}", e),
        }
    }
}
