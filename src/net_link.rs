//! WebSocket link to the Live endpoint.
//!
//! The link task owns the socket; the session talks to it only through
//! `NetCommand`s and receives everything back as `NetEvent`s, so the session
//! never sees the transport library.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message};
use url::Url;

use crate::error::{Result, SessionError};
use crate::protocol::LiveSetup;

/// 入站事件通道容量
const EVENT_QUEUE: usize = 100;

#[derive(Debug)]
pub enum NetEvent {
    Text(String),
    Binary(Vec<u8>),
    /// Remote or local close without error.
    Closed { reason: Option<String> },
    /// Transport failure or a close carrying an error code.
    Error(String),
}

#[derive(Debug)]
pub enum NetCommand {
    SendText(String),
    Close,
}

/// Session-side handle of an open link.
pub struct NetLink {
    tx: mpsc::Sender<NetCommand>,
    task: Option<JoinHandle<()>>,
}

impl NetLink {
    pub fn new(tx: mpsc::Sender<NetCommand>, task: Option<JoinHandle<()>>) -> Self {
        Self { tx, task }
    }

    /// Queue a text message without waiting. A full queue hands the command back.
    pub fn try_send_text(&self, text: String) -> std::result::Result<(), TrySendError<NetCommand>> {
        self.tx.try_send(NetCommand::SendText(text))
    }

    /// Best-effort close. Safe to call on an already closed link.
    pub fn close(&mut self) {
        let queued = self.tx.try_send(NetCommand::Close).is_ok();
        if let Some(task) = self.task.take() {
            if !queued {
                // queue full or task already gone, no close frame then
                task.abort();
            }
        }
    }
}

impl Drop for NetLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens links. The session only depends on this seam.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect, send the setup message and start delivering events.
    ///
    /// Network and handshake failures (including rejected keys) are
    /// `ConnectionError`s.
    async fn connect(
        &self,
        setup: &LiveSetup,
        outbound_queue: usize,
    ) -> Result<(NetLink, mpsc::Receiver<NetEvent>)>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsConnector {
    endpoint: Url,
}

impl WsConnector {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        setup: &LiveSetup,
        outbound_queue: usize,
    ) -> Result<(NetLink, mpsc::Receiver<NetEvent>)> {
        let setup_json = setup
            .to_json()
            .map_err(|e| SessionError::ProtocolError(format!("setup message: {}", e)))?;

        // 日志中不打印带 key 的完整地址
        log::info!(
            "Connecting to {}{}...",
            self.endpoint.host_str().unwrap_or("?"),
            self.endpoint.path()
        );
        let (ws_stream, _) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| SessionError::ConnectionError(e.to_string()))?;
        log::info!("Connected!");

        let (mut write, read) = ws_stream.split();

        log::debug!("Sending setup: {}", setup_json);
        write
            .send(Message::Text(setup_json.into()))
            .await
            .map_err(|e| SessionError::ConnectionError(format!("sending setup: {}", e)))?;

        let (tx_cmd, rx_cmd) = mpsc::channel(outbound_queue.max(1));
        let (tx_event, rx_event) = mpsc::channel(EVENT_QUEUE);
        let task = tokio::spawn(pump(write, read, rx_cmd, tx_event));

        Ok((NetLink::new(tx_cmd, Some(task)), rx_event))
    }
}

/// 链路任务：结束时总是投递一个终止事件（Closed 或 Error）
async fn pump(
    mut write: SplitSink<WsStream, Message>,
    mut read: SplitStream<WsStream>,
    mut rx_cmd: mpsc::Receiver<NetCommand>,
    tx: mpsc::Sender<NetEvent>,
) {
    let last = match run_link(&mut write, &mut read, &mut rx_cmd, &tx).await {
        Ok(event) => event,
        Err(e) => NetEvent::Error(e.to_string()),
    };
    log::info!("Link finished: {:?}", last);
    let _ = tx.send(last).await;
}

async fn run_link(
    write: &mut SplitSink<WsStream, Message>,
    read: &mut SplitStream<WsStream>,
    rx_cmd: &mut mpsc::Receiver<NetCommand>,
    tx: &mpsc::Sender<NetEvent>,
) -> anyhow::Result<NetEvent> {
    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        tx.send(NetEvent::Text(text.to_string())).await?;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        tx.send(NetEvent::Binary(data.to_vec())).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        log::info!("Server closed connection: {:?}", frame);
                        return Ok(close_event(frame));
                    }
                    // ping/pong 由 tungstenite 自动处理
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Ok(NetEvent::Closed {
                            reason: Some("stream ended".to_string()),
                        });
                    }
                }
            }
            cmd = rx_cmd.recv() => {
                match cmd {
                    Some(NetCommand::SendText(text)) => {
                        write.send(Message::Text(text.into())).await?;
                    }
                    Some(NetCommand::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(NetEvent::Closed { reason: None });
                    }
                }
            }
        }
    }
}

/// A normal close ends the session quietly; any other code is an error.
fn close_event(frame: Option<CloseFrame>) -> NetEvent {
    match frame {
        None => NetEvent::Closed { reason: None },
        Some(f) if f.code == CloseCode::Normal || f.code == CloseCode::Away => NetEvent::Closed {
            reason: (!f.reason.is_empty()).then(|| f.reason.to_string()),
        },
        Some(f) => NetEvent::Error(format!(
            "closed by remote ({}): {}",
            u16::from(f.code),
            f.reason
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn setup() -> LiveSetup {
        LiveSetup {
            model: "models/test".into(),
            voice_name: "Puck".into(),
            system_instruction: None,
            input_transcription: true,
            output_transcription: true,
        }
    }

    #[test]
    fn close_codes_map_to_events() {
        assert!(matches!(close_event(None), NetEvent::Closed { reason: None }));
        let normal = CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        };
        assert!(matches!(
            close_event(Some(normal)),
            NetEvent::Closed { reason: Some(r) } if r == "bye"
        ));
        let policy = CloseFrame {
            code: CloseCode::Policy,
            reason: "API key not valid".into(),
        };
        match close_event(Some(policy)) {
            NetEvent::Error(msg) => assert!(msg.contains("1008") && msg.contains("API key")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WsConnector::new(Url::parse(&format!("ws://{}/", addr)).unwrap());
        let err = connector.connect(&setup(), 4).await.err().unwrap();
        assert!(matches!(err, SessionError::ConnectionError(_)));
    }

    #[tokio::test]
    async fn link_sends_setup_and_relays_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let first = ws.next().await.unwrap().unwrap();
            let setup: serde_json::Value = serde_json::from_str(first.to_text().unwrap()).unwrap();
            assert_eq!(setup["setup"]["model"], "models/test");

            ws.send(Message::Text(r#"{"setupComplete":{}}"#.into())).await.unwrap();
            ws.send(Message::Binary(br#"{"serverContent":{"turnComplete":true}}"#.to_vec().into()))
                .await
                .unwrap();

            let audio = ws.next().await.unwrap().unwrap();
            assert!(audio.to_text().unwrap().contains("realtimeInput"));

            // wait for the client's close
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let connector = WsConnector::new(Url::parse(&format!("ws://{}/", addr)).unwrap());
        let (mut link, mut events) = connector.connect(&setup(), 4).await.unwrap();

        match events.recv().await.unwrap() {
            NetEvent::Text(t) => assert!(t.contains("setupComplete")),
            other => panic!("unexpected {:?}", other),
        }
        match events.recv().await.unwrap() {
            NetEvent::Binary(b) => assert!(String::from_utf8(b).unwrap().contains("turnComplete")),
            other => panic!("unexpected {:?}", other),
        }

        link.try_send_text(r#"{"realtimeInput":{"mediaChunks":[]}}"#.to_string())
            .unwrap();
        link.close();
        link.close();

        assert!(matches!(
            events.recv().await.unwrap(),
            NetEvent::Closed { reason: None }
        ));
        server.await.unwrap();
    }
}
