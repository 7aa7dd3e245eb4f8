//! AMI session: connection, correlation and handler registration

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::{
    action::{Command, Logoff, Ping},
    action_id::{local_hostname, ActionIdGenerator},
    constants::{
        DEFAULT_CHUNK_QUEUE_SIZE, HEADER_ACTION, HEADER_ACTION_ID, HEADER_SECRET, HEADER_USERNAME,
        MAX_PACKET_SIZE,
    },
    dispatcher,
    error::{AmiError, AmiResult},
    message::Message,
    protocol::{encode_message, write_packet, AmiParser},
    registry::{CallbackRegistry, Handler},
};

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Called once with the error that ended the read side of a session.
pub type NetworkErrorHandler = Box<dyn FnOnce(AmiError) + Send + 'static>;

/// Connection status for an AMI session
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// Connection is usable.
    Connected,
    /// The read side failed; the session is finished.
    Disconnected(DisconnectReason),
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Transport or framing error (io::Error is not Clone, so we store the message)
    IoError(String),
    /// Clean EOF on the connection
    ConnectionClosed,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
        }
    }
}

/// Options for an AMI session.
///
/// Use [`Default::default()`] for standard settings.
#[derive(Debug, Clone)]
pub struct AmiConnectOptions {
    /// Prefix for generated ActionIDs. `None` uses the local hostname.
    pub hostname: Option<String>,
    /// Capacity of the channel between the reader and framing tasks. Default: 64.
    pub chunk_queue_size: usize,
    /// Bytes tolerated without a packet terminator before the session fails. Default: 4MB.
    pub max_packet_size: usize,
}

impl Default for AmiConnectOptions {
    fn default() -> Self {
        Self {
            hostname: None,
            chunk_queue_size: DEFAULT_CHUNK_QUEUE_SIZE,
            max_packet_size: MAX_PACKET_SIZE,
        }
    }
}

/// State shared between the session handles and the dispatcher tasks
pub(crate) struct SessionShared {
    pub(crate) authorized: AtomicBool,
    pub(crate) actions: CallbackRegistry,
    pub(crate) events: CallbackRegistry,
    default_handler: RwLock<Option<Handler>>,
    network_error_handler: Mutex<Option<NetworkErrorHandler>>,
    banner: OnceLock<String>,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl SessionShared {
    pub(crate) fn default_handler(&self) -> Option<Handler> {
        self.default_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_banner(&self, banner: String) {
        let _ = self
            .banner
            .set(banner);
    }

    /// Read side is gone: publish the status, drop authorization and fire the
    /// network error hook. Only the first failure is reported.
    pub(crate) fn connection_failed(&self, err: AmiError, reason: DisconnectReason) {
        let changed = self
            .status_tx
            .send_if_modified(|status| {
                if *status == ConnectionStatus::Connected {
                    *status = ConnectionStatus::Disconnected(reason);
                    true
                } else {
                    false
                }
            });
        self.authorized
            .store(false, Ordering::SeqCst);
        if !changed {
            debug!("session already failed, ignoring: {}", err);
            return;
        }
        warn!("AMI session lost: {}", err);
        let hook = self
            .network_error_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook(err);
        }
    }
}

/// One-shot, single-slot handoff from a handler back to a waiting caller.
pub(crate) struct Handoff<T>(Mutex<Option<oneshot::Sender<T>>>);

impl<T> Handoff<T> {
    pub(crate) fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self(Mutex::new(Some(tx))), rx)
    }

    /// Deliver `value`; later calls are ignored.
    pub(crate) fn resolve(&self, value: T) {
        let tx = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = tx {
            let _ = tx.send(value);
        }
    }
}

/// AMI session handle (Clone + Send)
///
/// Wraps an established manager connection. [`login`](Self::login) starts the
/// background dispatcher and authenticates; after that, actions can be sent
/// from any task and their responses are routed to the handler registered
/// with them.
///
/// A session lives as long as its connection: once the read side fails it is
/// unauthorized for good and a new session is needed.
#[derive(Clone)]
pub struct AmiSession {
    writer: Arc<tokio::sync::Mutex<BoxedWriter>>,
    reader: Arc<Mutex<Option<BoxedReader>>>,
    pub(crate) shared: Arc<SessionShared>,
    ids: Arc<ActionIdGenerator>,
    options: AmiConnectOptions,
}

impl std::fmt::Debug for AmiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiSession")
            .field("authorized", &self.is_authorized())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl AmiSession {
    /// Wrap a connected stream with default options.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_options(stream, AmiConnectOptions::default())
    }

    /// Wrap a connected stream.
    ///
    /// Nothing is read or written until [`login`](Self::login).
    pub fn with_options<S>(stream: S, options: AmiConnectOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let reader: BoxedReader = Box::new(read_half);
        let writer: BoxedWriter = Box::new(write_half);
        let host = options
            .hostname
            .clone()
            .unwrap_or_else(local_hostname);
        let (status_tx, _) = watch::channel(ConnectionStatus::Connected);

        let shared = Arc::new(SessionShared {
            authorized: AtomicBool::new(false),
            actions: CallbackRegistry::new(),
            events: CallbackRegistry::new(),
            default_handler: RwLock::new(None),
            network_error_handler: Mutex::new(None),
            banner: OnceLock::new(),
            status_tx,
        });

        AmiSession {
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            reader: Arc::new(Mutex::new(Some(reader))),
            shared,
            ids: Arc::new(ActionIdGenerator::with_host(host)),
            options,
        }
    }

    /// Install the hook called when the read side fails.
    ///
    /// It runs at most once per session, right before the dispatcher stops.
    /// Install it before [`login`](Self::login) to be sure not to miss the failure.
    pub fn on_network_error<F>(&self, hook: F)
    where
        F: FnOnce(AmiError) + Send + 'static,
    {
        *self
            .shared
            .network_error_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    /// Start the dispatcher and authenticate.
    ///
    /// Waits for the server's answer without a deadline; wrap the call in
    /// [`tokio::time::timeout`] if the server may never reply. On
    /// `Response: Success` the session becomes authorized; anything else is
    /// returned as [`AmiError::LoginRejected`] carrying the server's `Message`.
    ///
    /// ```rust,no_run
    /// # async fn example() -> Result<(), asterisk_ami_tokio::AmiError> {
    /// use asterisk_ami_tokio::AmiSession;
    /// use tokio::net::TcpStream;
    ///
    /// let stream = TcpStream::connect(("127.0.0.1", asterisk_ami_tokio::DEFAULT_AMI_PORT)).await?;
    /// let session = AmiSession::new(stream);
    /// session.login("admin", "secret").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn login(&self, username: &str, secret: &str) -> AmiResult<()> {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(AmiError::AlreadyStarted)?;
        let parser = AmiParser::with_max_packet_size(self.options.max_packet_size);
        dispatcher::start(
            reader,
            parser,
            self.shared.clone(),
            self.options.chunk_queue_size,
        );

        let action_id = self
            .ids
            .generate();
        let message = Message::action("Login")
            .with(HEADER_USERNAME, username)
            .with(HEADER_SECRET, secret)
            .with(HEADER_ACTION_ID, action_id.as_str());
        let wire = encode_message(&message)?;

        let (handoff, rx) = Handoff::new();
        let handler: Handler = Arc::new(move |m: &Message| {
            let result = if m.is_success() {
                Ok(())
            } else {
                Err(AmiError::LoginRejected {
                    message: m
                        .message_text()
                        .unwrap_or_default()
                        .to_string(),
                })
            };
            handoff.resolve(result);
        });
        self.shared
            .actions
            .set(action_id.as_str(), handler, false);

        debug!("Sending action: Login {} [REDACTED] ({})", username, action_id);
        if let Err(e) = self
            .write_wire(&wire)
            .await
        {
            self.shared
                .actions
                .del(&action_id);
            return Err(e);
        }

        rx.await
            .map_err(|_| AmiError::DispatcherStopped)??;

        // `connection_failed` flips the status before clearing `authorized`.
        self.shared
            .authorized
            .store(true, Ordering::SeqCst);
        if !self.is_connected() {
            self.shared
                .authorized
                .store(false, Ordering::SeqCst);
            warn!("connection lost before login completed");
            return Err(AmiError::ConnectionClosed);
        }
        info!("Logged in to AMI as {}", username);
        Ok(())
    }

    /// Send an action; the reply is routed to `handler` once, then dropped.
    ///
    /// Any `ActionID` on `message` is replaced by a fresh one, which is
    /// returned. If the write fails after `handler` was registered, the
    /// handler is never called nor removed.
    pub async fn send_action(&self, message: Message, handler: Option<Handler>) -> AmiResult<String> {
        self.send_with_retain(message, handler, false)
            .await
    }

    /// Send an action whose answer spans several packets.
    ///
    /// `handler` stays registered after its first call and sees every packet
    /// carrying this action's ID, in wire order. It is the caller's job to
    /// remove it with [`del_callback`](Self::del_callback) once the exchange
    /// is over.
    pub async fn hold_callback_action(
        &self,
        message: Message,
        handler: Option<Handler>,
    ) -> AmiResult<String> {
        if !self.is_authorized() {
            return Err(AmiError::NotAuthenticated);
        }
        if handler.is_none() {
            return Err(AmiError::MissingHandler);
        }
        self.send_with_retain(message, handler, true)
            .await
    }

    async fn send_with_retain(
        &self,
        mut message: Message,
        handler: Option<Handler>,
        retain: bool,
    ) -> AmiResult<String> {
        if !self.is_authorized() {
            return Err(AmiError::NotAuthenticated);
        }

        let action_id = self
            .ids
            .generate();
        message.set(HEADER_ACTION_ID, action_id.as_str());
        let wire = encode_message(&message)?;

        if let Some(handler) = handler {
            self.shared
                .actions
                .set(action_id.as_str(), handler, retain);
        }

        debug!(
            "Sending action: {} ({})",
            message
                .get(HEADER_ACTION)
                .unwrap_or("?"),
            action_id
        );
        self.write_wire(&wire)
            .await?;
        Ok(action_id)
    }

    async fn write_wire(&self, wire: &str) -> AmiResult<()> {
        let mut writer = self
            .writer
            .lock()
            .await;
        write_packet(&mut *writer, wire.as_bytes()).await
    }

    /// Send an action and wait for its single reply.
    ///
    /// Like [`login`](Self::login), this waits without a deadline.
    pub async fn request(&self, message: Message) -> AmiResult<Message> {
        let (handoff, rx) = Handoff::new();
        let handler: Handler = Arc::new(move |m: &Message| handoff.resolve(m.clone()));
        self.send_action(message, Some(handler))
            .await?;
        rx.await
            .map_err(|_| AmiError::DispatcherStopped)
    }

    /// `Ping` the server and wait for its reply.
    pub async fn ping(&self) -> AmiResult<Message> {
        self.request(Ping.into())
            .await
    }

    /// Ask the server to end the manager session.
    ///
    /// The server answers `Response: Goodbye` and then closes the connection,
    /// which fires the network error hook like any other disconnect.
    pub async fn logoff(&self) -> AmiResult<Message> {
        self.request(Logoff.into())
            .await
    }

    /// Run a CLI command; the output is in [`Message::cmd_data`].
    pub async fn command(&self, cli: &str) -> AmiResult<Message> {
        self.request(Command::new(cli).into())
            .await
    }

    /// Remove the action handler registered under `message`'s ActionID.
    pub fn del_callback(&self, message: &Message) -> bool {
        match message.action_id() {
            Some(id) => self.del_callback_id(id),
            None => false,
        }
    }

    /// Remove the action handler registered under `action_id`.
    pub fn del_callback_id(&self, action_id: &str) -> bool {
        self.shared
            .actions
            .del(action_id)
    }

    /// Register the handler for an event name.
    ///
    /// Fails with [`AmiError::HandlerExists`] if one is already registered;
    /// unregister it first to replace it.
    pub fn register_handler(&self, event: &str, handler: Handler) -> AmiResult<()> {
        if !self
            .shared
            .events
            .try_set(event, handler, true)
        {
            return Err(AmiError::HandlerExists {
                event: event.to_string(),
            });
        }
        debug!("Registered handler for event {}", event);
        Ok(())
    }

    /// Remove the handler for an event name. Returns whether one existed.
    pub fn unregister_handler(&self, event: &str) -> bool {
        self.shared
            .events
            .del(event)
    }

    /// Set or clear the catch-all handler, called for every packet.
    pub fn default_handler(&self, handler: Option<Handler>) {
        *self
            .shared
            .default_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = handler;
    }

    /// Whether login succeeded and the connection is still up.
    pub fn is_authorized(&self) -> bool {
        self.shared
            .authorized
            .load(Ordering::SeqCst)
    }

    /// Whether the read side is still alive.
    pub fn is_connected(&self) -> bool {
        matches!(
            *self
                .shared
                .status_tx
                .borrow(),
            ConnectionStatus::Connected
        )
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.shared
            .status_tx
            .borrow()
            .clone()
    }

    /// Watch connection status changes.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared
            .status_tx
            .subscribe()
    }

    /// Greeting line sent by the server (`Asterisk Call Manager/x.y.z`), once seen.
    pub fn server_banner(&self) -> Option<&str> {
        self.shared
            .banner
            .get()
            .map(|s| s.as_str())
    }

    /// Prefix of the ActionIDs this session generates.
    pub fn action_id_prefix(&self) -> &str {
        self.ids
            .host()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn session() -> (AmiSession, tokio::io::DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        let options = AmiConnectOptions {
            hostname: Some("h".into()),
            ..Default::default()
        };
        (AmiSession::with_options(client, options), server)
    }

    #[tokio::test]
    async fn send_action_requires_login() {
        let (session, mut server) = session();
        let err = session
            .send_action(Message::action("Ping"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AmiError::NotAuthenticated));

        // Nothing reached the wire.
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(Duration::from_millis(50), server.read(&mut buf)).await;
        assert!(read.is_err(), "unexpected bytes written");
    }

    #[tokio::test]
    async fn hold_callback_checks_auth_then_handler() {
        let (session, _server) = session();
        let err = session
            .hold_callback_action(Message::action("CoreShowChannels"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AmiError::NotAuthenticated));

        session
            .shared
            .authorized
            .store(true, Ordering::SeqCst);
        let err = session
            .hold_callback_action(Message::action("CoreShowChannels"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AmiError::MissingHandler));
    }

    #[tokio::test]
    async fn duplicate_event_registration_rejected() {
        let (session, _server) = session();
        let h1: Handler = Arc::new(|_m: &Message| {});
        let h2: Handler = Arc::new(|_m: &Message| {});

        session
            .register_handler("Hangup", h1.clone())
            .unwrap();
        let err = session
            .register_handler("Hangup", h2)
            .unwrap_err();
        assert!(matches!(err, AmiError::HandlerExists { ref event } if event == "Hangup"));

        let (current, _) = session
            .shared
            .events
            .get("Hangup")
            .unwrap();
        assert!(Arc::ptr_eq(&current, &h1));

        assert!(session.unregister_handler("Hangup"));
        session
            .register_handler("Hangup", Arc::new(|_m: &Message| {}))
            .unwrap();
    }

    #[tokio::test]
    async fn send_action_overwrites_action_id() {
        let (session, mut server) = session();
        session
            .shared
            .authorized
            .store(true, Ordering::SeqCst);

        let id = session
            .send_action(Message::action("Ping").with("ActionID", "mine"), None)
            .await
            .unwrap();
        assert_eq!(id, "h-1");

        let mut buf = vec![0u8; 256];
        let n = server
            .read(&mut buf)
            .await
            .unwrap();
        let wire = String::from_utf8_lossy(&buf[..n]);
        assert!(wire.contains("ActionID:h-1\r\n"));
        assert!(!wire.contains("mine"));
        assert!(wire.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn login_reply_after_disconnect_is_an_error() {
        let (session, mut server) = session();
        let login = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .login("u", "p")
                    .await
            })
        };

        let mut parser = AmiParser::new();
        let mut buf = [0u8; 256];
        let request = loop {
            if let Some(m) = parser
                .parse_message()
                .unwrap()
            {
                break m;
            }
            let n = server
                .read(&mut buf)
                .await
                .unwrap();
            parser.add_data(&buf[..n]);
        };

        // The read side fails while the Success reply is still in flight.
        session
            .shared
            .connection_failed(
                AmiError::ConnectionClosed,
                DisconnectReason::ConnectionClosed,
            );
        let reply = format!(
            "Response: Success\r\nActionID: {}\r\n\r\n",
            request
                .action_id()
                .unwrap()
        );
        server
            .write_all(reply.as_bytes())
            .await
            .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), login)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, AmiError::ConnectionClosed));
        assert!(!session.is_authorized());
    }

    #[tokio::test]
    async fn second_login_rejected() {
        let (session, _server) = session();
        session
            .reader
            .lock()
            .unwrap()
            .take();
        let err = session
            .login("u", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, AmiError::AlreadyStarted));
    }

    #[test]
    fn failure_reported_once() {
        let (session, _server) = session();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        session.on_network_error(move |_e| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        session
            .shared
            .authorized
            .store(true, Ordering::SeqCst);

        session
            .shared
            .connection_failed(AmiError::ConnectionClosed, DisconnectReason::ConnectionClosed);
        session
            .shared
            .connection_failed(
                AmiError::protocol_error("late"),
                DisconnectReason::IoError("late".into()),
            );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!session.is_authorized());
        assert_eq!(
            session.status(),
            ConnectionStatus::Disconnected(DisconnectReason::ConnectionClosed)
        );
    }
}
