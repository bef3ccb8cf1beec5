//! Transport and session against a real WebSocket server on localhost.

use futures::{SinkExt, StreamExt};
use runwire::protocol::step::ControlCode;
use runwire::session::{Inbound, RunSession, SessionOptions};
use runwire::transport::{
    ReconnectPolicy, TransportEvent, TransportEventStream, TransportOptions, WsTransport,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

enum ServerCmd {
    Send(Value),
    /// Close the current connection; the server keeps accepting.
    Drop,
}

struct Server {
    url: String,
    commands: mpsc::UnboundedSender<ServerCmd>,
    received: mpsc::UnboundedReceiver<Value>,
    pings: mpsc::UnboundedReceiver<()>,
}

impl Server {
    fn send(&self, frame: Value) {
        self.commands.send(ServerCmd::Send(frame)).expect("server alive");
    }

    fn drop_connection(&self) {
        self.commands.send(ServerCmd::Drop).expect("server alive");
    }

    async fn recv(&mut self) -> Value {
        timeout(WAIT, self.received.recv())
            .await
            .expect("frame from client in time")
            .expect("server alive")
    }

    async fn ping(&mut self) {
        timeout(WAIT, self.pings.recv())
            .await
            .expect("ping from client in time")
            .expect("server alive");
    }
}

/// Accept connections one at a time, forwarding scripted frames out and
/// client text frames and pings back.
async fn spawn_server() -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    let (recv_tx, recv_rx) = mpsc::unbounded_channel();
    let (ping_tx, ping_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(ws) = accept_async(stream).await else {
                continue;
            };
            let (mut tx, mut rx) = ws.split();
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(ServerCmd::Send(frame)) => {
                            if tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        Some(ServerCmd::Drop) => {
                            let _ = tx.close().await;
                            break;
                        }
                        None => return,
                    },
                    inbound = rx.next() => match inbound {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(value) = serde_json::from_str(text.as_str()) {
                                let _ = recv_tx.send(value);
                            }
                        }
                        Some(Ok(Message::Ping(_))) => {
                            let _ = ping_tx.send(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(_)) | None => break,
                    },
                }
            }
        }
    });

    Server {
        url: format!("ws://{addr}"),
        commands: cmd_tx,
        received: recv_rx,
        pings: ping_rx,
    }
}

fn options(url: &str) -> TransportOptions {
    TransportOptions {
        url: url.to_string(),
        connect_timeout: Duration::from_secs(2),
        reconnect: ReconnectPolicy {
            enabled: true,
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            max_attempts: 5,
            jitter: 0.0,
        },
        heartbeat: None,
    }
}

async fn next_event(events: &mut TransportEventStream) -> TransportEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("transport event in time")
        .expect("transport alive")
}

/// Skip events until one matches.
async fn wait_for<F>(events: &mut TransportEventStream, mut pred: F) -> TransportEvent
where
    F: FnMut(&TransportEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn frames_round_trip_through_transport() {
    let mut server = spawn_server().await;
    let (transport, mut events) = WsTransport::spawn(options(&server.url));
    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    assert!(transport.is_connected());

    server.send(json!({"type": "print", "data": "hello"}));
    let TransportEvent::Frame(frame) = next_event(&mut events).await else {
        panic!("expected frame");
    };
    assert_eq!(serde_json::from_str::<Value>(&frame).unwrap()["data"], json!("hello"));

    assert!(transport.send(json!({"type": "ping_probe"}).to_string()));
    assert_eq!(server.recv().await["type"], json!("ping_probe"));
    transport.disconnect();
}

#[tokio::test]
async fn session_answers_debug_prompt_and_correlates_ack() {
    let mut server = spawn_server().await;
    let (transport, mut events) = WsTransport::spawn(options(&server.url));
    let mut session =
        RunSession::new(transport.clone(), SessionOptions::default()).expect("session");
    let connected = next_event(&mut events).await;
    session.handle_event(connected).expect("connected");
    assert!(session.conversation().show);

    server.send(json!({"type": "debug_input_request", "request_id": "d1", "prompt": "[c/s/q]"}));
    let frame = wait_for(&mut events, |e| matches!(e, TransportEvent::Frame(_))).await;
    session.handle_event(frame).expect("frame");
    assert!(session.step_debug().active_request.is_some());

    let ack = session.send_control(&ControlCode::Step).expect("sent");
    let sent = server.recv().await;
    assert_eq!(
        sent,
        json!({"type": "debug_input_response", "request_id": "d1", "data": "s"})
    );

    server.send(json!({"type": "debug_ack", "request_id": "d1"}));
    server.send(json!({
        "type": "text",
        "id": "m1",
        "content": {"sender": "Planner", "recipient": "Coder", "content": "next"}
    }));
    let mut routed = Vec::new();
    while routed.len() < 2 {
        let event = wait_for(&mut events, |e| matches!(e, TransportEvent::Frame(_))).await;
        routed.push(session.handle_event(event).expect("frame").inbound);
    }
    assert_eq!(routed[0], Some(Inbound::Reply { id: "d1".into() }));
    assert!(matches!(routed[1], Some(Inbound::Chat(_))));
    assert_eq!(ack.await.expect("ack")["type"], json!("debug_ack"));
    assert_eq!(session.conversation().messages.len(), 1);
    assert_eq!(session.rpc().pending_count(), 0);
    transport.disconnect();
}

#[tokio::test]
async fn reconnects_after_server_drops_connection() {
    let server = spawn_server().await;
    let (transport, mut events) = WsTransport::spawn(options(&server.url));
    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    let mut connected = transport.connected();
    assert!(*connected.borrow());

    server.drop_connection();
    timeout(WAIT, connected.wait_for(|up| !*up))
        .await
        .expect("flag cleared in time")
        .expect("transport alive");
    assert!(!transport.is_connected());
    assert!(!transport.send("dropped while down"));
    let lost = wait_for(&mut events, |e| matches!(e, TransportEvent::Disconnected { .. })).await;
    assert!(matches!(lost, TransportEvent::Disconnected { .. }));
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, TransportEvent::Connected)).await,
        TransportEvent::Connected
    );
    assert!(transport.is_connected());

    server.send(json!({"type": "print", "data": "after reconnect"}));
    let TransportEvent::Frame(frame) =
        wait_for(&mut events, |e| matches!(e, TransportEvent::Frame(_))).await
    else {
        unreachable!();
    };
    assert!(frame.contains("after reconnect"));
    transport.disconnect();
}

#[tokio::test]
async fn pending_control_is_cancelled_when_session_resets() {
    let mut server = spawn_server().await;
    let (transport, mut events) = WsTransport::spawn(options(&server.url));
    let mut session =
        RunSession::new(transport.clone(), SessionOptions::default()).expect("session");
    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);

    server.send(json!({"type": "debug_input_request", "request_id": "d9", "prompt": "?"}));
    let frame = wait_for(&mut events, |e| matches!(e, TransportEvent::Frame(_))).await;
    session.handle_event(frame).expect("frame");
    let ack = session.send_control(&ControlCode::Continue).expect("sent");
    server.recv().await;

    session.reset();
    assert!(ack.await.unwrap_err().is_cancelled());
    transport.disconnect();
}

#[tokio::test]
async fn heartbeat_pings_the_server_while_idle() {
    let mut server = spawn_server().await;
    let mut opts = options(&server.url);
    opts.heartbeat = Some(Duration::from_millis(50));
    let (transport, mut events) = WsTransport::spawn(opts);
    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);

    server.ping().await;
    server.ping().await;
    assert!(transport.is_connected());
    transport.disconnect();
}

#[tokio::test]
async fn unreachable_runner_never_reports_a_lost_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}", listener.local_addr().expect("addr"));
    drop(listener);
    let mut opts = options(&url);
    opts.reconnect.max_attempts = 1;
    let (transport, mut events) = WsTransport::spawn(opts);
    let mut session =
        RunSession::new(transport.clone(), SessionOptions::default()).expect("session");

    loop {
        let event = next_event(&mut events).await;
        assert!(
            !matches!(event, TransportEvent::Disconnected { .. }),
            "unexpected {event:?}"
        );
        let gave_up = matches!(event, TransportEvent::GaveUp { .. });
        session.handle_event(event).expect("event");
        if gave_up {
            break;
        }
    }
    assert_eq!(
        session.conversation().error.as_deref(),
        Some("unable to reconnect after 1 attempts")
    );
    transport.disconnect();
}
