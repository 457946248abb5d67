use std::future::Future;

use crate::error::SessionError;
use crate::session::{Session, SessionIo};

/// Drives a started session: capture chunks and link events go in one at a
/// time until the session ends or shutdown is requested.
pub struct Controller {
    session: Session,
    io: SessionIo,
}

impl Controller {
    pub fn new(session: Session, io: SessionIo) -> Self {
        Self { session, io }
    }

    /// Run until the session is closed or failed, or `shutdown` resolves.
    /// The session is always torn down on return.
    pub async fn run<F>(mut self, shutdown: F) -> Session
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        log::info!("[{}] Controller running", self.session.id());

        while !self.session.state().is_terminal() {
            tokio::select! {
                // 退出信号优先
                biased;

                _ = &mut shutdown => {
                    log::info!("Shutdown requested, closing session...");
                    self.session.stop();
                }

                chunk = self.io.capture_rx.recv() => {
                    match chunk {
                        Some(samples) => self.session.handle_capture(&samples),
                        None => self.session.fail(SessionError::DeviceUnavailable(
                            "microphone stream ended".to_string(),
                        )),
                    }
                }

                event = self.io.net_rx.recv() => {
                    match event {
                        Some(event) => self.session.handle_net_event(event),
                        // 链路任务总会先发终止事件，这里只是兜底
                        None => self.session.stop(),
                    }
                }
            }
        }

        log::info!(
            "[{}] Controller finished in state {}",
            self.session.id(),
            self.session.state().as_str()
        );
        self.session
    }
}
