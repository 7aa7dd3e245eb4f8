//! Full sessions against an in-process mock manager over `tokio::io::duplex`.

use asterisk_ami_tokio::{
    AmiConnectOptions, AmiError, AmiParser, AmiSession, ConfbridgeList, ConnectionStatus,
    DisconnectReason, Handler, Message,
};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

const GREETING: &str = "Asterisk Call Manager/7.0.3\r\n";
const WAIT: Duration = Duration::from_secs(5);

/// Server end of the connection.
struct MockManager {
    stream: DuplexStream,
    parser: AmiParser,
}

impl MockManager {
    async fn next_packet(&mut self) -> Message {
        let mut buf = [0u8; 1024];
        loop {
            if let Some(m) = self
                .parser
                .parse_message()
                .unwrap()
            {
                return m;
            }
            let n = tokio::time::timeout(WAIT, self.stream.read(&mut buf))
                .await
                .expect("timeout waiting for client packet")
                .unwrap();
            assert!(n > 0, "client closed the connection");
            self.parser
                .add_data(&buf[..n]);
        }
    }

    async fn send(&mut self, raw: &str) {
        self.stream
            .write_all(raw.as_bytes())
            .await
            .unwrap();
    }

    /// Answer the login with `Response: Success`.
    async fn accept_login(&mut self) -> Message {
        let login = self
            .next_packet()
            .await;
        let reply = format!(
            "Response: Success\r\nActionID: {}\r\nMessage: Authentication accepted\r\n\r\n",
            login
                .action_id()
                .unwrap()
        );
        self.send(&reply)
            .await;
        login
    }
}

fn pair() -> (AmiSession, MockManager) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let session = AmiSession::with_options(
        client,
        AmiConnectOptions {
            hostname: Some("h".into()),
            ..Default::default()
        },
    );
    let manager = MockManager {
        stream: server,
        parser: AmiParser::new(),
    };
    (session, manager)
}

async fn logged_in() -> (AmiSession, MockManager) {
    let (session, mut manager) = pair();
    manager
        .send(GREETING)
        .await;
    let login = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .login("u", "p")
                .await
        })
    };
    manager
        .accept_login()
        .await;
    tokio::time::timeout(WAIT, login)
        .await
        .expect("login timed out")
        .unwrap()
        .unwrap();
    (session, manager)
}

/// Client stream whose reads fail with `ConnectionReset` once `broken` is set.
struct BreakableStream {
    inner: DuplexStream,
    broken: Arc<AtomicBool>,
}

impl AsyncRead for BreakableStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self
            .broken
            .load(Ordering::SeqCst)
        {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for BreakableStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

fn forward(tx: mpsc::UnboundedSender<Message>) -> Handler {
    Arc::new(move |m: &Message| {
        let _ = tx.send(m.clone());
    })
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timeout waiting for handler")
        .expect("handler dropped")
}

#[tokio::test]
async fn login_success_authorizes_session() {
    let (session, mut manager) = pair();
    manager
        .send(GREETING)
        .await;

    let login = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .login("u", "p")
                .await
        })
    };

    let packet = manager
        .next_packet()
        .await;
    assert_eq!(packet.get("Action"), Some("Login"));
    assert_eq!(packet.get("Username"), Some("u"));
    assert_eq!(packet.get("Secret"), Some("p"));
    assert_eq!(packet.action_id(), Some("h-1"));

    manager
        .send("Response:Success\r\nActionID:h-1\r\n\r\n")
        .await;
    login
        .await
        .unwrap()
        .unwrap();

    assert!(session.is_authorized());
    assert!(session.is_connected());
    assert_eq!(session.server_banner(), Some("Asterisk Call Manager/7.0.3"));
}

#[tokio::test]
async fn login_rejected_carries_server_message() {
    let (session, mut manager) = pair();
    let login = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .login("u", "wrong")
                .await
        })
    };

    let packet = manager
        .next_packet()
        .await;
    let reply = format!(
        "Response: Error\r\nActionID: {}\r\nMessage: Authentication failed\r\n\r\n",
        packet
            .action_id()
            .unwrap()
    );
    manager
        .send(&reply)
        .await;

    match login
        .await
        .unwrap()
    {
        Err(AmiError::LoginRejected { message }) => assert_eq!(message, "Authentication failed"),
        other => panic!("expected LoginRejected, got {:?}", other),
    }
    assert!(!session.is_authorized());
    assert_eq!(session.server_banner(), None);
}

#[tokio::test]
async fn second_login_is_rejected() {
    let (session, _manager) = logged_in().await;
    let err = session
        .login("u", "p")
        .await
        .unwrap_err();
    assert!(matches!(err, AmiError::AlreadyStarted));
}

#[tokio::test]
async fn action_handler_fires_once() {
    let (session, mut manager) = logged_in().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let id = session
        .send_action(Message::action("Ping"), Some(forward(tx)))
        .await
        .unwrap();
    assert_eq!(id, "h-2");

    let packet = manager
        .next_packet()
        .await;
    assert_eq!(packet.get("Action"), Some("Ping"));
    assert_eq!(packet.action_id(), Some("h-2"));

    manager
        .send("Response: Success\r\nActionID: h-2\r\nPing: Pong\r\n\r\n")
        .await;
    manager
        .send("Response: Success\r\nActionID: h-2\r\nPing: Again\r\n\r\n")
        .await;

    let reply = recv(&mut rx).await;
    assert_eq!(reply.get("Ping"), Some("Pong"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx
        .try_recv()
        .is_err());
}

#[tokio::test]
async fn command_output_is_folded() {
    let (session, mut manager) = logged_in().await;

    let call = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .command("core show version")
                .await
        })
    };

    let packet = manager
        .next_packet()
        .await;
    assert_eq!(packet.get("Action"), Some("Command"));
    assert_eq!(packet.get("Command"), Some("core show version"));

    let reply = format!(
        "Response: Follows\r\nPrivilege: Command\r\nActionID: {}\r\nAsterisk 20.5.0 built by root\r\n--END COMMAND--\r\n\r\n",
        packet
            .action_id()
            .unwrap()
    );
    manager
        .send(&reply)
        .await;

    let reply = call
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.cmd_data(), Some("Asterisk 20.5.0 built by root"));
    assert!(reply
        .iter()
        .all(|(_, v)| !v.contains("--END COMMAND--")));
}

#[tokio::test]
async fn events_reach_event_and_default_handlers() {
    let (session, mut manager) = logged_in().await;
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (all_tx, mut all_rx) = mpsc::unbounded_channel();

    session
        .register_handler("Hangup", forward(event_tx))
        .unwrap();
    session.default_handler(Some(forward(all_tx)));

    manager
        .send("Event: Newchannel\r\nChannel: SIP/100-0001\r\n\r\n")
        .await;
    manager
        .send("Event: Hangup\r\nChannel: SIP/100-0001\r\nCause: 16\r\n\r\n")
        .await;

    let hangup = recv(&mut event_rx).await;
    assert_eq!(hangup.get("Cause"), Some("16"));

    let mut seen = vec![
        recv(&mut all_rx)
            .await
            .event()
            .unwrap()
            .to_string(),
        recv(&mut all_rx)
            .await
            .event()
            .unwrap()
            .to_string(),
    ];
    seen.sort();
    assert_eq!(seen, ["Hangup", "Newchannel"]);
    assert!(event_rx
        .try_recv()
        .is_err());
}

#[tokio::test]
async fn retained_handler_sees_every_packet_until_removed() {
    let (session, mut manager) = logged_in().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let id = session
        .hold_callback_action(Message::action("Status"), Some(forward(tx)))
        .await
        .unwrap();
    manager
        .next_packet()
        .await;

    for n in 0..3 {
        manager
            .send(&format!("Event: Status\r\nN: {}\r\nActionID: {}\r\n\r\n", n, id))
            .await;
    }
    for n in 0..3 {
        let m = recv(&mut rx).await;
        assert_eq!(m.get("N"), Some(n.to_string().as_str()));
    }

    assert!(session.del_callback_id(&id));
    assert!(!session.del_callback_id(&id));

    manager
        .send(&format!("Event: StatusComplete\r\nActionID: {}\r\n\r\n", id))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx
        .try_recv()
        .is_err());
}

#[tokio::test]
async fn list_collects_three_items() {
    let (session, mut manager) = logged_in().await;

    let call = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .list(ConfbridgeList::new("1000"))
                .await
        })
    };

    let packet = manager
        .next_packet()
        .await;
    assert_eq!(packet.get("Action"), Some("ConfbridgeList"));
    assert_eq!(packet.get("Conference"), Some("1000"));
    let id = packet
        .action_id()
        .unwrap()
        .to_string();

    manager
        .send(&format!(
            "Response: Success\r\nActionID: {id}\r\nEventList: start\r\nMessage: Confbridge user list will follow\r\n\r\n"
        ))
        .await;
    for caller in ["101", "102", "103"] {
        manager
            .send(&format!(
                "Event: ConfbridgeList\r\nActionID: {id}\r\nConference: 1000\r\nCallerIDNum: {caller}\r\n\r\n"
            ))
            .await;
    }
    manager
        .send(&format!(
            "Event: ConfbridgeListComplete\r\nActionID: {id}\r\nEventList: Complete\r\nListItems: 3\r\n\r\n"
        ))
        .await;

    let members = tokio::time::timeout(WAIT, call)
        .await
        .expect("list timed out")
        .unwrap()
        .unwrap();
    let callers: Vec<&str> = members
        .iter()
        .map(|m| m.get("CallerIDNum").unwrap())
        .collect();
    assert_eq!(callers, ["101", "102", "103"]);
    assert!(!session.del_callback_id(&id));
}

#[tokio::test]
async fn eof_fires_network_error_hook_once() {
    let (session, manager) = logged_in().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.on_network_error(move |e| {
        let _ = tx.send(e);
    });

    drop(manager);

    let err = tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("hook not called")
        .expect("hook dropped without firing");
    assert!(matches!(err, AmiError::ConnectionClosed));
    assert!(err.is_connection_error());

    assert!(!session.is_authorized());
    assert!(!session.is_connected());
    assert_eq!(
        session.status(),
        ConnectionStatus::Disconnected(DisconnectReason::ConnectionClosed)
    );

    let err = session
        .send_action(Message::action("Ping"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AmiError::NotAuthenticated));
}

#[tokio::test]
async fn oversized_packet_fails_session() {
    let (client, mut server) = tokio::io::duplex(64 * 1024);
    let session = AmiSession::with_options(
        client,
        AmiConnectOptions {
            hostname: Some("h".into()),
            max_packet_size: 256,
            ..Default::default()
        },
    );
    let mut status = session.status_watch();
    let login = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .login("u", "p")
                .await
        })
    };

    let junk = "X".repeat(1024);
    server
        .write_all(junk.as_bytes())
        .await
        .unwrap();

    tokio::time::timeout(WAIT, status.wait_for(|s| *s != ConnectionStatus::Connected))
        .await
        .expect("session stayed connected")
        .unwrap();
    assert!(matches!(
        session.status(),
        ConnectionStatus::Disconnected(DisconnectReason::IoError(_))
    ));
    login.abort();
}

#[tokio::test]
async fn cleared_default_handler_sees_no_later_packets() {
    let (session, mut manager) = logged_in().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.default_handler(Some(forward(tx)));

    manager
        .send("Event: FullyBooted\r\nStatus: Fully Booted\r\n\r\n")
        .await;
    let first = recv(&mut rx).await;
    assert_eq!(first.event(), Some("FullyBooted"));

    session.default_handler(None);

    // Registered event handler marks when the next packet has been dispatched.
    let (marker_tx, mut marker_rx) = mpsc::unbounded_channel();
    session
        .register_handler("Reload", forward(marker_tx))
        .unwrap();
    manager
        .send("Event: Reload\r\nModule: manager\r\n\r\n")
        .await;
    recv(&mut marker_rx).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(rx
        .try_recv()
        .is_err());
}

#[tokio::test]
async fn read_error_fires_network_error_hook() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let broken = Arc::new(AtomicBool::new(false));
    let session = AmiSession::with_options(
        BreakableStream {
            inner: client,
            broken: broken.clone(),
        },
        AmiConnectOptions {
            hostname: Some("h".into()),
            ..Default::default()
        },
    );
    let mut manager = MockManager {
        stream: server,
        parser: AmiParser::new(),
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.on_network_error(move |e| {
        let _ = tx.send(e);
    });

    let login = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .login("u", "p")
                .await
        })
    };
    manager
        .accept_login()
        .await;
    tokio::time::timeout(WAIT, login)
        .await
        .expect("login timed out")
        .unwrap()
        .unwrap();
    assert!(session.is_authorized());

    // Wake the pending read so it observes the failure.
    broken.store(true, Ordering::SeqCst);
    manager
        .send("Event: Heartbeat\r\n\r\n")
        .await;

    let err = tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("hook not called")
        .expect("hook dropped without firing");
    match err {
        AmiError::Io(ref e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
        ref other => panic!("expected Io, got {:?}", other),
    }
    assert!(!session.is_authorized());
    assert!(matches!(
        session.status(),
        ConnectionStatus::Disconnected(DisconnectReason::IoError(_))
    ));
}
