//! WebSocket transport with reconnect and heartbeat.
//!
//! [`WsTransport::spawn`] starts a connection actor and returns a cheap,
//! cloneable handle plus the inbound event stream. The actor owns the socket;
//! the handle only enqueues commands. Connection state is published on a
//! `watch` channel so callers can observe it without polling the actor.

mod reconnect;

pub use reconnect::{ReconnectPolicy, MIN_RECONNECT_DELAY};

use crate::error::TransportError;
use crate::rpc::FrameSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings for [`WsTransport::spawn`].
#[derive(Clone, Debug)]
pub struct TransportOptions {
    pub url: String,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Ping period. `None` disables heartbeats.
    pub heartbeat: Option<Duration>,
}

impl TransportOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            heartbeat: Some(Duration::from_secs(30)),
        }
    }
}

/// Everything the transport reports upstream, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: String },
    /// One inbound text frame.
    Frame(String),
    Error(TransportError),
    /// Reconnection stopped; only an explicit `reconnect()` restarts it.
    GaveUp { attempts: u32 },
}

pub type TransportEventStream = mpsc::UnboundedReceiver<TransportEvent>;

enum Command {
    Send(String),
    Reconnect,
    Disconnect,
}

/// Handle to the connection actor. Dropping every clone shuts it down.
#[derive(Clone, Debug)]
pub struct WsTransport {
    commands: mpsc::UnboundedSender<Command>,
    connected: watch::Receiver<bool>,
}

impl WsTransport {
    /// Start connecting in the background. Must be called inside a tokio
    /// runtime.
    pub fn spawn(options: TransportOptions) -> (Self, TransportEventStream) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = watch::channel(false);
        tokio::spawn(connection_loop(options, command_rx, event_tx, connected_tx));
        (
            Self {
                commands: command_tx,
                connected: connected_rx,
            },
            event_rx,
        )
    }

    /// Queue a text frame. `false` when not connected; the frame is dropped.
    pub fn send(&self, data: impl Into<String>) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.commands.send(Command::Send(data.into())).is_ok()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Observable connection flag.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Drop the current connection (if any) and connect again immediately,
    /// resetting the attempt counter.
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Close the connection and stop reconnecting until [`Self::reconnect`].
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }
}

impl FrameSink for WsTransport {
    fn send_frame(&self, frame: String) -> bool {
        self.send(frame)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Why a connection attempt or a live connection ended.
enum Exit {
    /// The socket never opened.
    Unreachable(String),
    Lost(String),
    Reconnect,
    Disconnect,
    Shutdown,
}

/// What ended a pause between connections.
enum Resume {
    Retry,
    Fresh,
    Shutdown,
}

async fn connection_loop(
    options: TransportOptions,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
    connected: watch::Sender<bool>,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send(event);
    };
    let policy = options.reconnect;
    // Number of the next retry; 0 while a connection is healthy.
    let mut retry = 0u32;

    loop {
        let exit = match open(&options).await {
            Ok(ws) => {
                info!(url = %options.url, "connected");
                retry = 0;
                connected.send_replace(true);
                emit(TransportEvent::Connected);
                let exit = drive(ws, &mut commands, &emit, options.heartbeat).await;
                connected.send_replace(false);
                exit
            }
            Err(err) => {
                warn!(url = %options.url, error = %err, "connect failed");
                emit(TransportEvent::Error(err.clone()));
                Exit::Unreachable(err.to_string())
            }
        };

        // Only a connection that was up can be lost.
        if let Exit::Lost(reason) = &exit {
            emit(TransportEvent::Disconnected {
                reason: reason.clone(),
            });
        }

        let resume = match exit {
            Exit::Shutdown => break,
            Exit::Reconnect => {
                emit(TransportEvent::Disconnected {
                    reason: "reconnect requested".to_string(),
                });
                Resume::Fresh
            }
            Exit::Disconnect => {
                info!("disconnected by client");
                emit(TransportEvent::Disconnected {
                    reason: "closed by client".to_string(),
                });
                pause(&mut commands, None).await
            }
            Exit::Lost(reason) | Exit::Unreachable(reason) => {
                retry = retry.saturating_add(1);
                if policy.should_retry(retry) {
                    let delay = policy.delay_for(retry);
                    info!(
                        attempt = retry,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "reconnecting"
                    );
                    pause(&mut commands, Some(delay)).await
                } else {
                    let attempts = retry - 1;
                    warn!(attempts, "giving up on reconnect");
                    emit(TransportEvent::GaveUp { attempts });
                    pause(&mut commands, None).await
                }
            }
        };

        match resume {
            Resume::Retry => {}
            Resume::Fresh => retry = 0,
            Resume::Shutdown => break,
        }
    }
    debug!("transport actor stopped");
}

async fn open(options: &TransportOptions) -> Result<WsStream, TransportError> {
    let connecting = connect_async(options.url.as_str());
    match tokio::time::timeout(options.connect_timeout, connecting).await {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(err)) => Err(TransportError::Connect(err.to_string())),
        Err(_) => Err(TransportError::Connect(format!(
            "timed out after {} ms",
            options.connect_timeout.as_millis()
        ))),
    }
}

/// Pump one live connection until it ends.
async fn drive(
    ws: WsStream,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    emit: &impl Fn(TransportEvent),
    heartbeat: Option<Duration>,
) -> Exit {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut heartbeat = heartbeat
        .filter(|period| !period.is_zero())
        .and_then(|period| Some((Instant::now().checked_add(period)?, period)))
        .map(|(start, period)| {
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(frame)) => {
                    if let Err(err) = ws_tx.send(Message::Text(frame.into())).await {
                        emit(TransportEvent::Error(TransportError::Send(err.to_string())));
                        return Exit::Lost(err.to_string());
                    }
                }
                Some(Command::Reconnect) => {
                    let _ = ws_tx.close().await;
                    return Exit::Reconnect;
                }
                Some(Command::Disconnect) => {
                    let _ = ws_tx.close().await;
                    return Exit::Disconnect;
                }
                None => {
                    let _ = ws_tx.close().await;
                    return Exit::Shutdown;
                }
            },
            inbound = ws_rx.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEvent::Frame(text.as_str().to_string()))
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => emit(TransportEvent::Frame(text)),
                    Err(_) => debug!(len = bytes.len(), "dropping non-utf8 binary frame"),
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws_tx.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| TransportError::Closed.to_string());
                    return Exit::Lost(reason);
                }
                Some(Err(err)) => return Exit::Lost(err.to_string()),
                None => return Exit::Lost(TransportError::Closed.to_string()),
            },
            _ = next_tick(&mut heartbeat) => {
                if let Err(err) = ws_tx.send(Message::Ping(Default::default())).await {
                    return Exit::Lost(format!("heartbeat failed: {err}"));
                }
            }
        }
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Wait out a reconnect delay, or idle when `delay` is `None`.
///
/// Frames sent while down are dropped. A disconnect during the wait turns it
/// into an idle wait.
async fn pause(commands: &mut mpsc::UnboundedReceiver<Command>, delay: Option<Duration>) -> Resume {
    let mut deadline = delay.and_then(|delay| Instant::now().checked_add(delay));
    loop {
        let wake_at = deadline;
        let sleep = async move {
            match wake_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = sleep => return Resume::Retry,
            command = commands.recv() => match command {
                Some(Command::Send(_)) => debug!("dropping frame while disconnected"),
                Some(Command::Reconnect) => return Resume::Fresh,
                Some(Command::Disconnect) => deadline = None,
                None => return Resume::Shutdown,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts_against_dead_endpoint() {
        let options = TransportOptions {
            // Reserved port on localhost; connection is refused immediately.
            url: "ws://127.0.0.1:9".to_string(),
            connect_timeout: Duration::from_millis(200),
            reconnect: ReconnectPolicy {
                enabled: true,
                min_delay: Duration::from_millis(50),
                max_delay: Duration::from_millis(100),
                max_attempts: 2,
                jitter: 0.0,
            },
            heartbeat: None,
        };
        let (transport, mut events) = WsTransport::spawn(options);
        assert!(!transport.send("x"));

        let mut errors = 0;
        let mut disconnects = 0;
        loop {
            match events.recv().await.expect("event") {
                TransportEvent::Error(TransportError::Connect(_)) => errors += 1,
                TransportEvent::Disconnected { .. } => disconnects += 1,
                TransportEvent::GaveUp { attempts } => {
                    assert_eq!(attempts, 2);
                    break;
                }
                _ => {}
            }
        }
        // Initial attempt plus two retries.
        assert_eq!(errors, 3);
        assert_eq!(disconnects, 0);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn send_fails_while_disconnected() {
        let mut options = TransportOptions::new("ws://127.0.0.1:9");
        options.reconnect.enabled = false;
        let (transport, mut events) = WsTransport::spawn(options);
        assert!(!transport.send("frame"));
        while let Some(event) = events.recv().await {
            if let TransportEvent::GaveUp { attempts } = event {
                assert_eq!(attempts, 0);
                break;
            }
        }
        transport.disconnect();
    }
}
